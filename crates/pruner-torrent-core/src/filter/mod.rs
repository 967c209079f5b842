//! Structural include/exclude filtering applied ahead of rule evaluation.
//!
//! # Design
//!
//! - The disk gate is checked once per call and short-circuits the whole set.
//! - Exclusions run before inclusions, so an exclusion always wins.
//! - Empty fields impose no constraint; input order is preserved.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::model::{Status, Torrent, contains_status};
use crate::units::Bytes;

/// Structural predicate for one strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Filters {
    /// Categories to keep (exact match).
    #[serde(deserialize_with = "one_or_many")]
    pub categories: Vec<String>,
    /// Categories to drop (exact match).
    #[serde(deserialize_with = "one_or_many")]
    pub excluded_categories: Vec<String>,
    /// Tags to keep (any overlap).
    #[serde(deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
    /// Tags to drop (any overlap).
    #[serde(deserialize_with = "one_or_many")]
    pub excluded_tags: Vec<String>,
    /// Substrings of tracker URLs to keep.
    #[serde(deserialize_with = "one_or_many")]
    pub trackers: Vec<String>,
    /// Substrings of tracker URLs to drop.
    #[serde(deserialize_with = "one_or_many")]
    pub excluded_trackers: Vec<String>,
    /// Flag sets to keep (bit containment).
    #[serde(deserialize_with = "one_or_many")]
    pub status: Vec<Status>,
    /// Flag sets to drop (bit containment).
    #[serde(deserialize_with = "one_or_many")]
    pub excluded_status: Vec<Status>,
    /// Free-space threshold; `0` disables the gate.
    pub disk: Bytes,
}

impl Filters {
    /// Whether `torrent` survives every include/exclude criterion.
    #[must_use]
    pub fn matches(&self, torrent: &Torrent) -> bool {
        if self.excluded_categories.contains(&torrent.category) {
            return false;
        }
        if shares_tag(&self.excluded_tags, torrent) {
            return false;
        }
        if contains_status(&self.excluded_status, torrent.status) {
            return false;
        }
        if tracker_matches(&self.excluded_trackers, torrent) {
            return false;
        }

        if !self.categories.is_empty() && !self.categories.contains(&torrent.category) {
            return false;
        }
        if !self.tags.is_empty() && !shares_tag(&self.tags, torrent) {
            return false;
        }
        if !self.status.is_empty() && !contains_status(&self.status, torrent.status) {
            return false;
        }
        if !self.trackers.is_empty() && !tracker_matches(&self.trackers, torrent) {
            return false;
        }
        true
    }

    /// True when free space already exceeds the configured threshold.
    #[must_use]
    pub fn disk_gate_trips(&self, free_space: Bytes) -> bool {
        !self.disk.is_zero() && free_space > self.disk
    }
}

fn shares_tag(tags: &[String], torrent: &Torrent) -> bool {
    tags.iter().any(|tag| torrent.tags.contains(tag))
}

fn tracker_matches(patterns: &[String], torrent: &Torrent) -> bool {
    torrent
        .tracker_urls()
        .any(|url| patterns.iter().any(|pattern| url.contains(pattern.as_str())))
}

/// Reduce `torrents` to those passing the disk gate and every criterion.
#[must_use]
pub fn apply_filters(filters: &Filters, free_space: Bytes, torrents: &[Torrent]) -> Vec<Torrent> {
    if filters.disk_gate_trips(free_space) {
        return Vec::new();
    }
    torrents
        .iter()
        .filter(|torrent| filters.matches(torrent))
        .cloned()
        .collect()
}

/// Accept either a single scalar or a sequence for list-valued fields.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OneOrMany<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OneOrMany<T> {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Vec<T>, E> {
            T::deserialize(de::value::StrDeserializer::<E>::new(value)).map(|item| vec![item])
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Vec<T>, E> {
            self.visit_str(&value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Vec<T>, E> {
            self.visit_str(&value.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<Vec<T>, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Vec<T>, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<T>, A::Error> {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element()? {
                items.push(item);
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(OneOrMany(PhantomData))
}
