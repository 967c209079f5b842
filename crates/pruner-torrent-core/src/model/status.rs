//! Lifecycle and activity flags shared by every back-end.
//!
//! Activity flags occupy the low bits, lifecycle flags the high bits, so a
//! torrent can be `PAUSED | UPLOADING` at the same time.

use std::fmt;

use bitflags::bitflags;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::StatusError;

bitflags! {
    /// Bit-flag status of a torrent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u16 {
        /// Payload is being downloaded.
        const DOWNLOADING = 1;
        /// Payload is being seeded.
        const UPLOADING = 1 << 1;
        /// The back-end reports an error for the torrent.
        const ERROR = 1 << 2;
        /// Pieces are being verified.
        const CHECKING = 1 << 3;
        /// Stopped by the user, resumable.
        const PAUSED = 1 << 12;
        /// Waiting for a free slot.
        const QUEUED = 1 << 13;
        /// Active but no peers are transferring.
        const STALLED = 1 << 14;
        /// Fully stopped.
        const STOPPED = 1 << 15;
    }
}

/// Lowercase native name to flag mapping.
const STATUS_TABLE: &[(&str, Status)] = &[
    ("downloading", Status::DOWNLOADING),
    ("uploading", Status::UPLOADING),
    ("seeding", Status::UPLOADING),
    ("error", Status::ERROR),
    ("checking", Status::CHECKING),
    ("paused", Status::PAUSED),
    ("queued", Status::QUEUED),
    ("stalled", Status::STALLED),
    ("stopped", Status::STOPPED),
];

/// Lifecycle prefixes that combine with an `up`/`dl` activity suffix.
const LIFECYCLE_PREFIXES: &[(&str, Status)] = &[
    ("paused", Status::PAUSED),
    ("queued", Status::QUEUED),
    ("stopped", Status::STOPPED),
    ("stalled", Status::STALLED),
    ("checking", Status::CHECKING),
];

const ACTIVITY_SUFFIXES: &[(&str, Status)] = &[
    ("upload", Status::UPLOADING),
    ("up", Status::UPLOADING),
    ("download", Status::DOWNLOADING),
    ("dl", Status::DOWNLOADING),
];

impl Status {
    /// True when every bit of `flag` is present in `self`.
    #[must_use]
    pub const fn has_flag(self, flag: Self) -> bool {
        self.bits() & flag.bits() == flag.bits()
    }
}

/// Map a native status string onto flags.
///
/// Matching is case-insensitive. Compound names such as `pausedUP` or
/// `queuedDL` OR the lifecycle flag with the activity flag, and several names
/// may be joined with `|`. Empty input yields the empty status.
///
/// # Errors
///
/// Returns [`StatusError::InvalidStatus`] for any unrecognised non-empty name.
pub fn parse_status(value: &str) -> Result<Status, StatusError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Status::empty());
    }

    trimmed.split('|').try_fold(Status::empty(), |acc, part| {
        lookup(&part.trim().to_ascii_lowercase())
            .map(|flags| acc | flags)
            .ok_or_else(|| StatusError::InvalidStatus {
                value: value.to_string(),
            })
    })
}

fn lookup(name: &str) -> Option<Status> {
    if let Some((_, flags)) = STATUS_TABLE.iter().find(|(key, _)| *key == name) {
        return Some(*flags);
    }
    LIFECYCLE_PREFIXES.iter().find_map(|(prefix, lifecycle)| {
        let suffix = name.strip_prefix(prefix)?;
        ACTIVITY_SUFFIXES
            .iter()
            .find(|(key, _)| *key == suffix)
            .map(|(_, activity)| *lifecycle | *activity)
    })
}

/// True when any non-empty entry of `set` is fully contained in `status`.
///
/// An empty entry never matches, so a criterion parsed from `""` selects
/// nothing.
#[must_use]
pub fn contains_status(set: &[Status], status: Status) -> bool {
    set.iter()
        .any(|flags| !flags.is_empty() && status.has_flag(*flags))
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(&name.to_ascii_lowercase())?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatusVisitor;

        impl Visitor<'_> for StatusVisitor {
            type Value = Status;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a torrent status name such as `pausedUP`")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Status, E> {
                if value == "none" {
                    return Ok(Status::empty());
                }
                parse_status(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(StatusVisitor)
    }
}
