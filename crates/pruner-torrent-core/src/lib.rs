#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    dead_code,
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Back-end neutral torrent model, structural filtering and client contract.
//!
//! Layout: `model/` (torrent snapshot and status flags), `filter/` (structural
//! filter), `service/` (client trait and removal protocol), `units.rs`,
//! `cancel.rs`, `error.rs`.

pub mod cancel;
pub mod error;
pub mod filter;
pub mod model;
pub mod service;
pub mod units;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use error::{ClientError, ClientResult, StatusError, UnitError};
pub use filter::{Filters, apply_filters};
pub use model::{
    SessionStats, Status, Torrent, TorrentTracker, average_rate, contains_status, hashes,
    parse_status,
};
pub use service::{ProtocolTimings, RemoveRequest, TorrentClient, run_removal_protocol};
pub use units::{Bytes, RateLimit, parse_bytes, parse_duration};
