//! Bounded retry combinator.
//!
//! [`retry_bounded`] drives a [`RetryOperation`] (an action, a classifier
//! for its raw result and a session refresh hook) under a
//! [`RetryPolicy`] of `max_retries` additional attempts separated by a
//! fixed delay:
//!
//! * **Expired** → refresh the session, wait, retry the same request.
//! * **Transient** (timeouts, connection failures, unusable payloads) →
//!   wait and retry; the session is only refreshed once the failure
//!   repeats back to back.
//!
//! When the budget is spent the caller receives
//! [`RetryOutcome::Exhausted`] with the last failure. The combinator knows
//! nothing about HTTP, which keeps the policy testable on its own.

use std::future::Future;
use std::time::Duration;

/// Number of consecutive transient failures after which the session is
/// refreshed as well.
const TRANSIENT_REFRESH_THRESHOLD: u32 = 2;

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Fixed wait before every retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(5),
        }
    }
}

/// Classification of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// The attempt produced a usable value.
    Success(T),
    /// The remote side no longer accepts the session.
    Expired(String),
    /// A network-level or payload failure that may go away on its own.
    Transient(String),
}

/// Why the last attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Session expiry.
    Expired(String),
    /// Transient failure.
    Transient(String),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired(reason) => write!(f, "session expired ({reason})"),
            Self::Transient(reason) => write!(f, "transient failure ({reason})"),
        }
    }
}

/// Final result of [`retry_bounded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Completed(T),
    /// Every attempt failed.
    Exhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Failure of the final attempt.
        last: Failure,
    },
}

/// An operation that can be attempted repeatedly.
pub trait RetryOperation: Send {
    /// What one attempt produces before classification.
    type Raw: Send;
    /// The value a successful attempt yields.
    type Output: Send;

    /// Performs one attempt.
    fn call(&mut self) -> impl Future<Output = Self::Raw> + Send;

    /// Decides whether an attempt succeeded, expired or failed transiently.
    fn classify(&self, raw: Self::Raw) -> Verdict<Self::Output>;

    /// Re-establishes the session before the next attempt.
    fn refresh(&mut self) -> impl Future<Output = ()> + Send;
}

/// Runs `op` until it succeeds or `policy.max_retries` retries are spent.
pub async fn retry_bounded<Op: RetryOperation>(
    op: &mut Op,
    policy: &RetryPolicy,
) -> RetryOutcome<Op::Output> {
    let mut retries = 0u32;
    let mut consecutive_transient = 0u32;

    loop {
        let raw = op.call().await;

        let failure = match op.classify(raw) {
            Verdict::Success(value) => return RetryOutcome::Completed(value),
            Verdict::Expired(reason) => {
                consecutive_transient = 0;
                Failure::Expired(reason)
            }
            Verdict::Transient(reason) => {
                consecutive_transient += 1;
                Failure::Transient(reason)
            }
        };

        if retries >= policy.max_retries {
            log::error!(
                "Giving up after {} attempt(s): {failure}",
                retries + 1
            );
            return RetryOutcome::Exhausted {
                attempts: retries + 1,
                last: failure,
            };
        }
        retries += 1;

        match &failure {
            Failure::Expired(_) => {
                log::warn!(
                    "{failure}, refreshing session (retry {retries}/{})",
                    policy.max_retries
                );
                op.refresh().await;
            }
            Failure::Transient(_) if consecutive_transient >= TRANSIENT_REFRESH_THRESHOLD => {
                log::warn!(
                    "{failure} repeated {consecutive_transient} times, refreshing session \
                     (retry {retries}/{})",
                    policy.max_retries
                );
                op.refresh().await;
            }
            Failure::Transient(_) => {
                log::warn!("{failure} (retry {retries}/{})", policy.max_retries);
            }
        }

        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Plays back a fixed script of verdicts and records what happened.
    struct Scripted {
        script: VecDeque<Verdict<u32>>,
        calls: u32,
        refreshes: u32,
        refresh_after_call: Vec<u32>,
        called_at: Vec<tokio::time::Instant>,
    }

    impl Scripted {
        fn new(script: Vec<Verdict<u32>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
                refreshes: 0,
                refresh_after_call: Vec::new(),
                called_at: Vec::new(),
            }
        }
    }

    impl RetryOperation for Scripted {
        type Raw = Verdict<u32>;
        type Output = u32;

        async fn call(&mut self) -> Self::Raw {
            self.calls += 1;
            self.called_at.push(tokio::time::Instant::now());
            self.script
                .pop_front()
                .unwrap_or_else(|| Verdict::Transient("script exhausted".to_string()))
        }

        fn classify(&self, raw: Self::Raw) -> Verdict<u32> {
            raw
        }

        async fn refresh(&mut self) {
            self.refreshes += 1;
            self.refresh_after_call.push(self.calls);
        }
    }

    const fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn first_success_needs_no_retry() {
        let mut op = Scripted::new(vec![Verdict::Success(7)]);
        assert_eq!(
            retry_bounded(&mut op, &policy(2)).await,
            RetryOutcome::Completed(7)
        );
        assert_eq!(op.calls, 1);
        assert_eq!(op.refreshes, 0);
    }

    #[tokio::test]
    async fn expiry_refreshes_then_retries_same_operation() {
        let mut op = Scripted::new(vec![
            Verdict::Expired("403".to_string()),
            Verdict::Success(1),
        ]);
        assert_eq!(
            retry_bounded(&mut op, &policy(2)).await,
            RetryOutcome::Completed(1)
        );
        assert_eq!(op.calls, 2);
        assert_eq!(op.refresh_after_call, vec![1]);
    }

    #[tokio::test]
    async fn single_transient_failure_does_not_refresh() {
        let mut op = Scripted::new(vec![
            Verdict::Transient("timeout".to_string()),
            Verdict::Success(3),
        ]);
        assert_eq!(
            retry_bounded(&mut op, &policy(2)).await,
            RetryOutcome::Completed(3)
        );
        assert_eq!(op.refreshes, 0);
    }

    #[tokio::test]
    async fn repeated_transient_failure_refreshes() {
        let mut op = Scripted::new(vec![
            Verdict::Transient("timeout".to_string()),
            Verdict::Transient("timeout".to_string()),
            Verdict::Success(3),
        ]);
        assert_eq!(
            retry_bounded(&mut op, &policy(2)).await,
            RetryOutcome::Completed(3)
        );
        assert_eq!(op.refresh_after_call, vec![2]);
    }

    #[tokio::test]
    async fn budget_is_max_retries_additional_attempts() {
        let mut op = Scripted::new(vec![
            Verdict::Expired("a".to_string()),
            Verdict::Expired("b".to_string()),
            Verdict::Expired("c".to_string()),
            Verdict::Success(9),
        ]);
        assert_eq!(
            retry_bounded(&mut op, &policy(2)).await,
            RetryOutcome::Exhausted {
                attempts: 3,
                last: Failure::Expired("c".to_string()),
            }
        );
        assert_eq!(op.calls, 3);
        // No refresh after the final, unretried failure.
        assert_eq!(op.refreshes, 2);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let mut op = Scripted::new(vec![Verdict::Transient("reset".to_string())]);
        assert_eq!(
            retry_bounded(&mut op, &policy(0)).await,
            RetryOutcome::Exhausted {
                attempts: 1,
                last: Failure::Transient("reset".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn expiry_resets_transient_streak() {
        let mut op = Scripted::new(vec![
            Verdict::Transient("t".to_string()),
            Verdict::Expired("e".to_string()),
            Verdict::Transient("t".to_string()),
            Verdict::Success(5),
        ]);
        assert_eq!(
            retry_bounded(&mut op, &policy(3)).await,
            RetryOutcome::Completed(5)
        );
        // Only the expiry forced a refresh.
        assert_eq!(op.refresh_after_call, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_delay_before_each_retry_but_not_after_the_last() {
        let delay = Duration::from_secs(5);
        let mut op = Scripted::new(vec![
            Verdict::Transient("timeout".to_string()),
            Verdict::Expired("403".to_string()),
            Verdict::Transient("timeout".to_string()),
        ]);
        let start = tokio::time::Instant::now();

        let outcome = retry_bounded(
            &mut op,
            &RetryPolicy {
                max_retries: 2,
                delay,
            },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 3, .. }));
        let slack = Duration::from_millis(10);
        for pair in op.called_at.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= delay && gap < delay + slack, "gap {gap:?}");
        }
        let total = start.elapsed();
        assert!(total >= delay * 2 && total < delay * 2 + slack, "total {total:?}");
    }
}
