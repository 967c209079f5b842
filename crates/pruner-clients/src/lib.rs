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

//! HTTP adapters that implement [`pruner_torrent_core::TorrentClient`] for
//! concrete torrent daemons.
//!
//! Layout: `qbittorrent.rs` (WebAPI v2), `transmission.rs` (JSON-RPC),
//! `deluge.rs` (Web UI JSON-RPC),
//! `registry.rs` (building adapters from the `clients:` section),
//! `http.rs` (shared reqwest plumbing), `error.rs`.

pub mod deluge;
pub mod error;
mod http;
pub mod qbittorrent;
pub mod registry;
pub mod transmission;

pub use deluge::{DelugeClient, DelugeSettings};
pub use error::{AdapterError, AdapterResult};
pub use qbittorrent::{QbittorrentClient, QbittorrentSettings};
pub use registry::{ClientRegistry, build_client, build_clients};
pub use transmission::{TransmissionClient, TransmissionSettings};
