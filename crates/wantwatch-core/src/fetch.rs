//! Listing-count retrieval with bounded retry and fail-open degradation.
//!
//! A single bad item never aborts the run: anything the fetcher cannot
//! resolve within its retry budget is reported as a count of 0 and the
//! reason is carried alongside so the coordinator can surface it.

use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::model::ItemId;
use crate::retry::RetryPolicy;

/// Signals from the upstream listing-count source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("item not found upstream")]
    NotFound,
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("unexpected upstream status {0}")]
    Status(u16),
}

impl UpstreamError {
    /// Rate limits and connection failures are worth another attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Connection(_))
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        if self.is_transient() {
            ErrorCode::TransientUpstream
        } else {
            ErrorCode::ItemUnavailable
        }
    }
}

/// Source of the current number of active listings for one item.
pub trait ListingSource {
    fn listing_count(&self, id: &ItemId) -> Result<u64, UpstreamError>;
}

/// Why an item's count was degraded to 0.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("item unavailable: {0}")]
    Unavailable(UpstreamError),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: UpstreamError },
}

/// Result of fetching one item. `count` is 0 whenever `degraded` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub count: u64,
    pub degraded: Option<FetchError>,
}

impl FetchOutcome {
    const fn fetched(count: u64) -> Self {
        Self {
            count,
            degraded: None,
        }
    }

    const fn degraded(reason: FetchError) -> Self {
        Self {
            count: 0,
            degraded: Some(reason),
        }
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Wraps a [`ListingSource`] with the retry policy.
pub struct CountFetcher<'a> {
    source: &'a dyn ListingSource,
    policy: RetryPolicy,
}

impl<'a> CountFetcher<'a> {
    #[must_use]
    pub fn new(source: &'a dyn ListingSource, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch the listing count for `id`, retrying transient failures.
    pub fn fetch(&self, id: &ItemId) -> FetchOutcome {
        let attempts = self.policy.attempts();
        let result = self.policy.run(
            |attempt| {
                self.source.listing_count(id).inspect_err(|err| {
                    warn!(item = %id, attempt, attempts, error = %err, "listing count failed");
                })
            },
            UpstreamError::is_transient,
        );

        match result {
            Ok(count) => {
                debug!(item = %id, count, "listing count fetched");
                FetchOutcome::fetched(count)
            }
            Err((attempts, last)) if last.is_transient() => {
                warn!(item = %id, attempts, error = %last, "retry ceiling reached, counting as 0");
                FetchOutcome::degraded(FetchError::RetriesExhausted { attempts, last })
            }
            Err((_, err)) => {
                warn!(item = %id, error = %err, "item unavailable, counting as 0");
                FetchOutcome::degraded(FetchError::Unavailable(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted {
        replies: RefCell<VecDeque<Result<u64, UpstreamError>>>,
        calls: RefCell<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<u64, UpstreamError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: RefCell::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.borrow()
        }
    }

    impl ListingSource for Scripted {
        fn listing_count(&self, _id: &ItemId) -> Result<u64, UpstreamError> {
            *self.calls.borrow_mut() += 1;
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(UpstreamError::Status(500)))
        }
    }

    fn id() -> ItemId {
        ItemId::from(42_u64)
    }

    #[test]
    fn zero_is_a_real_count() {
        let source = Scripted::new(vec![Ok(0)]);
        let outcome = CountFetcher::new(&source, RetryPolicy::immediate(3)).fetch(&id());
        assert_eq!(outcome.count, 0);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn rate_limit_then_success_is_retried() {
        let source = Scripted::new(vec![Err(UpstreamError::RateLimited), Ok(6)]);
        let outcome = CountFetcher::new(&source, RetryPolicy::immediate(3)).fetch(&id());
        assert_eq!(outcome, FetchOutcome::fetched(6));
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn three_rate_limits_degrade_to_zero() {
        let source = Scripted::new(vec![
            Err(UpstreamError::RateLimited),
            Err(UpstreamError::RateLimited),
            Err(UpstreamError::RateLimited),
            Ok(9),
        ]);
        let outcome = CountFetcher::new(&source, RetryPolicy::immediate(3)).fetch(&id());

        assert_eq!(outcome.count, 0);
        assert_eq!(
            outcome.degraded,
            Some(FetchError::RetriesExhausted {
                attempts: 3,
                last: UpstreamError::RateLimited,
            })
        );
        assert_eq!(source.calls(), 3, "ceiling must bound the attempts");
    }

    #[test]
    fn connection_failures_are_retried() {
        let source = Scripted::new(vec![
            Err(UpstreamError::Connection("reset".to_string())),
            Ok(2),
        ]);
        let outcome = CountFetcher::new(&source, RetryPolicy::immediate(3)).fetch(&id());
        assert_eq!(outcome.count, 2);
    }

    #[test]
    fn not_found_degrades_without_retry() {
        let source = Scripted::new(vec![Err(UpstreamError::NotFound), Ok(5)]);
        let outcome = CountFetcher::new(&source, RetryPolicy::immediate(3)).fetch(&id());

        assert_eq!(outcome.count, 0);
        assert_eq!(
            outcome.degraded,
            Some(FetchError::Unavailable(UpstreamError::NotFound))
        );
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn malformed_and_unexpected_status_are_not_transient() {
        assert!(!UpstreamError::Malformed("x".to_string()).is_transient());
        assert!(!UpstreamError::Status(503).is_transient());
        assert_eq!(UpstreamError::RateLimited.code(), ErrorCode::TransientUpstream);
        assert_eq!(UpstreamError::NotFound.code(), ErrorCode::ItemUnavailable);
    }
}
