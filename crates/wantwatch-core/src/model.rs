//! Value types shared by every stage of a run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, source-stable identifier of a tracked item.
///
/// Discogs release ids are numeric, but nothing here relies on that; the id is
/// stored and compared as text so the baseline document keys stay stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A catalog entry the user asked to monitor.
///
/// Only `id` takes part in identity; the rest is used for composing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    pub url: String,
}

impl TrackedItem {
    /// Contributor names joined for display, or `"Unknown Artist"` when empty.
    #[must_use]
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }
}

/// Last-recorded listing count per item.
///
/// Always replaced as a whole; keys are never purged, so entries for items no
/// longer tracked are carried forward from run to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Baseline {
    counts: BTreeMap<ItemId, u64>,
}

impl Baseline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<u64> {
        self.counts.get(id).copied()
    }

    /// Record `count` for `id`, returning the value it replaced.
    pub fn insert(&mut self, id: ItemId, count: u64) -> Option<u64> {
        self.counts.insert(id, count)
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, u64)> {
        self.counts.iter().map(|(id, count)| (id, *count))
    }
}

impl FromIterator<(ItemId, u64)> for Baseline {
    fn from_iter<T: IntoIterator<Item = (ItemId, u64)>>(iter: T) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// A freshly fetched listing count for one item. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub item: TrackedItem,
    pub count: u64,
}

/// Per-item, per-run outcome of comparing the fresh count to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Very first run: the baseline was empty when the run started.
    Bootstrap,
    /// Item missing from a non-empty baseline.
    FirstSeen,
    /// Fresh count strictly greater than the recorded one.
    Increased,
    /// Fresh count equal to or lower than the recorded one.
    UnchangedOrDecreased,
}

impl Classification {
    /// Only strict increases end up in a notification.
    #[must_use]
    pub const fn is_reportable(self) -> bool {
        matches!(self, Self::Increased)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "BOOTSTRAP",
            Self::FirstSeen => "FIRST_SEEN",
            Self::Increased => "INCREASED",
            Self::UnchangedOrDecreased => "UNCHANGED_OR_DECREASED",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one item together with the counts it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub id: ItemId,
    pub previous: Option<u64>,
    pub current: u64,
    pub classification: Classification,
}

/// A reportable increase, carrying the metadata needed to describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncreasedItem {
    pub item: TrackedItem,
    pub previous: u64,
    pub current: u64,
}

/// Complete output of the diff stage of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Snapshot to persist; the complete input of the next run.
    pub next_baseline: Baseline,
    /// Increases in the order the items were processed.
    pub increased: Vec<IncreasedItem>,
    /// One entry per processed item, in processing order.
    pub outcomes: Vec<ItemOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_serializes_as_flat_string_keyed_object() {
        let baseline: Baseline = [(ItemId::from(123_u64), 4), (ItemId::from(7_u64), 0)]
            .into_iter()
            .collect();

        let json = serde_json::to_value(&baseline).expect("serialize");
        assert_eq!(json, serde_json::json!({"123": 4, "7": 0}));

        let back: Baseline = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, baseline);
    }

    #[test]
    fn baseline_rejects_negative_counts() {
        let raw = serde_json::json!({"1": -3});
        assert!(serde_json::from_value::<Baseline>(raw).is_err());
    }

    #[test]
    fn artist_line_falls_back_when_empty() {
        let mut item = TrackedItem {
            id: ItemId::from("1"),
            title: "Kind of Blue".to_string(),
            artists: vec![],
            url: "https://www.discogs.com/release/1".to_string(),
        };
        assert_eq!(item.artist_line(), "Unknown Artist");

        item.artists = vec!["Miles Davis".to_string(), "John Coltrane".to_string()];
        assert_eq!(item.artist_line(), "Miles Davis, John Coltrane");
    }

    #[test]
    fn only_increased_is_reportable() {
        assert!(Classification::Increased.is_reportable());
        assert!(!Classification::Bootstrap.is_reportable());
        assert!(!Classification::FirstSeen.is_reportable());
        assert!(!Classification::UnchangedOrDecreased.is_reportable());
        assert_eq!(Classification::FirstSeen.to_string(), "FIRST_SEEN");
    }
}
