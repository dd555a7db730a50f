use tracing::debug;

use crate::error::ErrorCode;
use crate::model::TrackedItem;

/// Largest page the tracked-item source hands out.
pub const PAGE_SIZE: usize = 100;

/// Upper bound on pages read in one run, so a misbehaving source cannot
/// keep the run paging forever.
pub const MAX_PAGES: u32 = 1_000;

/// The tracked-item list could not be read. Fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tracked-item source unavailable: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::SourceUnavailable
    }
}

/// Produces the items to check, in a stable order.
pub trait TrackedItemSource {
    fn tracked_items(&self) -> Result<Vec<TrackedItem>, SourceError>;
}

impl TrackedItemSource for Vec<TrackedItem> {
    fn tracked_items(&self) -> Result<Vec<TrackedItem>, SourceError> {
        Ok(self.clone())
    }
}

/// Read pages `1..` until one comes back shorter than `page_size`.
///
/// Any page failure fails the whole read; a partial list is never returned.
pub fn collect_pages<F>(page_size: usize, mut fetch_page: F) -> Result<Vec<TrackedItem>, SourceError>
where
    F: FnMut(u32) -> Result<Vec<TrackedItem>, SourceError>,
{
    let mut items = Vec::new();

    for page in 1..=MAX_PAGES {
        let batch = fetch_page(page)?;
        let len = batch.len();
        debug!(page, len, "tracked-item page read");
        items.extend(batch);

        if len < page_size {
            return Ok(items);
        }
    }

    Err(SourceError(format!(
        "pagination did not terminate after {MAX_PAGES} pages"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn items(start: u64, n: u64) -> Vec<TrackedItem> {
        (start..start + n)
            .map(|id| TrackedItem {
                id: ItemId::from(id),
                title: format!("Release {id}"),
                artists: vec![],
                url: format!("https://www.discogs.com/release/{id}"),
            })
            .collect()
    }

    #[test]
    fn stops_on_short_page() {
        let mut calls = Vec::new();
        let all = collect_pages(3, |page| {
            calls.push(page);
            Ok(match page {
                1 => items(1, 3),
                2 => items(4, 1),
                _ => items(100, 3),
            })
        })
        .expect("pages");

        assert_eq!(calls, vec![1, 2]);
        let ids: Vec<_> = all.iter().map(|i| i.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn stops_on_empty_page_after_full_pages() {
        let all = collect_pages(2, |page| Ok(if page == 1 { items(1, 2) } else { vec![] }))
            .expect("pages");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn failure_on_any_page_fails_the_read() {
        let err = collect_pages(2, |page| {
            if page == 2 {
                Err(SourceError("HTTP 502".to_string()))
            } else {
                Ok(items(1, 2))
            }
        })
        .expect_err("second page fails");
        assert_eq!(err.code(), ErrorCode::SourceUnavailable);
    }

    #[test]
    fn endless_source_is_cut_off() {
        let err = collect_pages(1, |page| Ok(items(u64::from(page), 1))).expect_err("bounded");
        assert!(err.0.contains("did not terminate"));
    }
}
