//! Classification of fresh listing counts against the previous baseline.
//!
//! The engine is pure: it reads the baseline the run started with and builds
//! the next one in memory. Every observed item gets exactly one
//! [`Classification`] and its fresh count is written to the next baseline
//! unconditionally, so a later increase is always measured against the most
//! recent count and never against a historical peak.

use crate::model::{
    Baseline, Classification, IncreasedItem, ItemOutcome, Observation, RunResult, TrackedItem,
};

/// Classify one count.
///
/// `bootstrap` is true when the run started from an empty baseline.
#[must_use]
pub const fn classify(bootstrap: bool, previous: Option<u64>, fresh: u64) -> Classification {
    if bootstrap {
        return Classification::Bootstrap;
    }
    match previous {
        None => Classification::FirstSeen,
        Some(prev) if fresh > prev => Classification::Increased,
        Some(_) => Classification::UnchangedOrDecreased,
    }
}

/// Incremental diff over one run.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    previous: &'a Baseline,
    bootstrap: bool,
    next: Baseline,
    increased: Vec<IncreasedItem>,
    outcomes: Vec<ItemOutcome>,
}

impl<'a> DiffEngine<'a> {
    /// Start a run against `previous`. An empty baseline makes this a bootstrap run.
    #[must_use]
    pub fn new(previous: &'a Baseline) -> Self {
        Self {
            previous,
            bootstrap: previous.is_empty(),
            next: previous.clone(),
            increased: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// True when the run started without any history.
    #[must_use]
    pub const fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Classify `item` at `fresh` and record it in the next baseline.
    pub fn observe(&mut self, item: &TrackedItem, fresh: u64) -> Classification {
        let previous = self.previous.get(&item.id);
        let classification = classify(self.bootstrap, previous, fresh);

        if let (Classification::Increased, Some(previous)) = (classification, previous) {
            self.increased.push(IncreasedItem {
                item: item.clone(),
                previous,
                current: fresh,
            });
        }

        self.next.insert(item.id.clone(), fresh);
        self.outcomes.push(ItemOutcome {
            id: item.id.clone(),
            previous,
            current: fresh,
            classification,
        });

        classification
    }

    /// Close the run and hand back the next baseline and the increases.
    #[must_use]
    pub fn finish(self) -> RunResult {
        RunResult {
            next_baseline: self.next,
            increased: self.increased,
            outcomes: self.outcomes,
        }
    }
}

/// Diff a whole batch of observations against `previous`, in order.
#[must_use]
pub fn diff(previous: &Baseline, observations: &[Observation]) -> RunResult {
    let mut engine = DiffEngine::new(previous);
    for observation in observations {
        engine.observe(&observation.item, observation.count);
    }
    engine.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn item(id: &str) -> TrackedItem {
        TrackedItem {
            id: ItemId::from(id),
            title: format!("Title {id}"),
            artists: vec![format!("Artist {id}")],
            url: format!("https://www.discogs.com/release/{id}"),
        }
    }

    fn obs(id: &str, count: u64) -> Observation {
        Observation {
            item: item(id),
            count,
        }
    }

    fn baseline(entries: &[(&str, u64)]) -> Baseline {
        entries
            .iter()
            .map(|(id, count)| (ItemId::from(*id), *count))
            .collect()
    }

    #[test]
    fn classify_table() {
        assert_eq!(classify(true, None, 3), Classification::Bootstrap);
        assert_eq!(classify(true, Some(1), 3), Classification::Bootstrap);
        assert_eq!(classify(false, None, 0), Classification::FirstSeen);
        assert_eq!(classify(false, Some(3), 5), Classification::Increased);
        assert_eq!(classify(false, Some(3), 3), Classification::UnchangedOrDecreased);
        assert_eq!(classify(false, Some(3), 0), Classification::UnchangedOrDecreased);
    }

    #[test]
    fn bootstrap_run_records_everything_silently() {
        let result = diff(&Baseline::new(), &[obs("A", 3), obs("B", 0)]);

        assert_eq!(result.next_baseline, baseline(&[("A", 3), ("B", 0)]));
        assert!(result.increased.is_empty());
        assert!(
            result
                .outcomes
                .iter()
                .all(|o| o.classification == Classification::Bootstrap)
        );
    }

    #[test]
    fn increase_is_reported_with_previous_count() {
        let previous = baseline(&[("A", 3), ("B", 0)]);
        let result = diff(&previous, &[obs("A", 5), obs("B", 0)]);

        assert_eq!(result.next_baseline, baseline(&[("A", 5), ("B", 0)]));
        assert_eq!(result.increased.len(), 1);
        assert_eq!(result.increased[0].item.id, ItemId::from("A"));
        assert_eq!(result.increased[0].previous, 3);
        assert_eq!(result.increased[0].current, 5);
        assert_eq!(
            result.outcomes[1].classification,
            Classification::UnchangedOrDecreased
        );
    }

    #[test]
    fn decrease_and_new_item_are_silent_but_recorded() {
        let previous = baseline(&[("A", 5)]);
        let result = diff(&previous, &[obs("A", 2), obs("C", 7)]);

        assert_eq!(result.next_baseline, baseline(&[("A", 2), ("C", 7)]));
        assert!(result.increased.is_empty());
        assert_eq!(
            result.outcomes[0].classification,
            Classification::UnchangedOrDecreased
        );
        assert_eq!(result.outcomes[1].classification, Classification::FirstSeen);
        assert_eq!(result.outcomes[1].previous, None);
    }

    #[test]
    fn untracked_entries_are_carried_forward() {
        let previous = baseline(&[("A", 1), ("gone", 4)]);
        let result = diff(&previous, &[obs("A", 1)]);
        assert_eq!(result.next_baseline.get(&ItemId::from("gone")), Some(4));
    }

    #[test]
    fn outcomes_follow_processing_order() {
        let previous = baseline(&[("Z", 0), ("A", 0), ("M", 0)]);
        let result = diff(&previous, &[obs("Z", 1), obs("A", 2), obs("M", 3)]);

        let order: Vec<_> = result.increased.iter().map(|i| i.item.id.to_string()).collect();
        assert_eq!(order, vec!["Z", "A", "M"]);
    }

    #[test]
    fn duplicates_compare_against_run_start_and_last_write_wins() {
        let previous = baseline(&[("A", 1)]);
        let result = diff(&previous, &[obs("A", 4), obs("A", 2)]);

        assert_eq!(result.outcomes[0].previous, Some(1));
        assert_eq!(result.outcomes[1].previous, Some(1));
        assert_eq!(result.next_baseline.get(&ItemId::from("A")), Some(2));
    }

    #[test]
    fn engine_reports_bootstrap_state() {
        let empty = Baseline::new();
        assert!(DiffEngine::new(&empty).is_bootstrap());
        let seeded = baseline(&[("A", 0)]);
        assert!(!DiffEngine::new(&seeded).is_bootstrap());
    }
}
