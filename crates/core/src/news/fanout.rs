use crate::error::ClassificationError;
use serde::{Serialize, Serializer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const DEFAULT_CONCURRENCY: usize = 4;
// Covers one model request with its retries and backoff.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How per-article capability calls are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutPolicy {
    pub concurrency: usize,
    /// Applies to each call once it holds a permit; queueing time is not counted.
    pub per_item_timeout: Duration,
}

impl Default for FanoutPolicy {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            per_item_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// An article a stage had to leave out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub title: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: ClassificationError,
}

fn serialize_display<S: Serializer>(err: &ClassificationError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

/// Runs `f` over every item on a bounded set of tasks and returns the outcomes
/// in input order.
///
/// A slow, failing or panicking item only affects its own slot. Dropping the
/// returned future drops the `JoinSet`, which aborts whatever is still pending.
pub async fn run_each<I, T, F, Fut>(
    items: Vec<I>,
    policy: FanoutPolicy,
    f: F,
) -> Vec<Result<T, ClassificationError>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, ClassificationError>> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(policy.concurrency.max(1)));
    let timeout = policy.per_item_timeout;

    let mut tasks = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let call = f(item);
        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => match tokio::time::timeout(timeout, call).await {
                    Ok(res) => res,
                    Err(_) => Err(ClassificationError::TimedOut(timeout)),
                },
                Err(_) => Err(ClassificationError::Aborted("semaphore closed".to_string())),
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<Result<T, ClassificationError>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(err) => tracing::warn!(error = %err, "classification task did not complete"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(ClassificationError::Aborted(
                    "task panicked or was cancelled".to_string(),
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn policy(concurrency: usize, timeout_ms: u64) -> FanoutPolicy {
        FanoutPolicy {
            concurrency,
            per_item_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn preserves_input_order() {
        let items: Vec<u64> = vec![30, 5, 20, 1];
        let out = run_each(items, policy(4, 1_000), |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms * 2)
        })
        .await;

        let values: Vec<u64> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![60, 10, 40, 2]);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let out = run_each(vec![1, 2, 3], policy(2, 1_000), |i| async move {
            if i == 2 {
                Err(ClassificationError::Request("boom".into()))
            } else {
                Ok(i)
            }
        })
        .await;

        assert_eq!(out[0], Ok(1));
        assert_eq!(out[1], Err(ClassificationError::Request("boom".into())));
        assert_eq!(out[2], Ok(3));
    }

    #[tokio::test]
    async fn slow_item_times_out_alone() {
        let out = run_each(vec![1u64, 500], policy(2, 50), |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        })
        .await;

        assert_eq!(out[0], Ok(1));
        assert_eq!(
            out[1],
            Err(ClassificationError::TimedOut(Duration::from_millis(50)))
        );
    }

    #[tokio::test]
    async fn panicking_item_becomes_a_failure() {
        let out = run_each(vec![1, 2], policy(2, 1_000), |i| async move {
            if i == 2 {
                panic!("classifier bug");
            }
            Ok(i)
        })
        .await;

        assert_eq!(out[0], Ok(1));
        assert!(matches!(out[1], Err(ClassificationError::Aborted(_))));
    }

    #[tokio::test]
    async fn respects_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = run_each((0..10).collect::<Vec<_>>(), policy(3, 1_000), |i| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await;

        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn dropping_the_request_cancels_pending_calls() {
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        let request = run_each(vec![()], policy(1, 5_000), move |()| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        // Caller gives up (e.g. client disconnect) well before the call completes.
        let res = tokio::time::timeout(Duration::from_millis(20), request).await;
        assert!(res.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_input() {
        let out = run_each(Vec::<u8>::new(), policy(2, 10), |i| async move { Ok(i) }).await;
        assert!(out.is_empty());
    }

    #[test]
    fn item_failure_serializes_error_message() {
        let failure = ItemFailure {
            index: 2,
            title: "t".into(),
            error: ClassificationError::Request("down".into()),
        };
        let v = serde_json::to_value(&failure).unwrap();
        assert_eq!(v["error"], "classifier request failed: down");
    }
}
