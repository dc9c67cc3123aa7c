//! Bounded, cancellable polling of the second-factor status endpoint.

use std::future::Future;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::config::PollPolicy;
use crate::error::AuthError;

/// Provider verdict for one status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeStatus {
    /// The user approved; the result cookie can be fetched.
    Allow,
    /// The user (or provider) rejected the challenge.
    Deny,
    /// No decision yet; carries the provider's status code.
    Pending(String),
}

impl ChallengeStatus {
    /// Maps the provider's `status_code` field.
    #[must_use]
    pub fn from_status_code(code: &str) -> Self {
        match code {
            "allow" => Self::Allow,
            "deny" => Self::Deny,
            other => Self::Pending(other.to_string()),
        }
    }
}

/// Calls `check` until it reports a decision.
///
/// Returns `Ok(true)` on [`ChallengeStatus::Allow`] and `Ok(false)` on
/// [`ChallengeStatus::Deny`]. The first check runs immediately; later checks
/// wait `policy.interval`. The token is checked before every request and
/// raced against every wait.
///
/// # Errors
///
/// - [`AuthError::Cancelled`] when `cancel` fires
/// - [`AuthError::PollExhausted`] when the attempt cap or deadline is reached
/// - any error returned by `check`
pub async fn poll_until_decided<F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<bool, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ChallengeStatus, AuthError>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        attempts += 1;
        match check().await? {
            ChallengeStatus::Allow => {
                debug!(attempts, "second factor approved");
                return Ok(true);
            }
            ChallengeStatus::Deny => {
                debug!(attempts, "second factor denied");
                return Ok(false);
            }
            ChallengeStatus::Pending(code) => trace!(attempts, code = %code, "still waiting"),
        }

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(AuthError::PollExhausted { attempts });
        }
        if policy
            .deadline
            .is_some_and(|deadline| started.elapsed() + policy.interval > deadline)
        {
            return Err(AuthError::PollExhausted { attempts });
        }

        tokio::select! {
            () = cancel.cancelled() => return Err(AuthError::Cancelled),
            () = sleep(policy.interval) => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;

    fn fast_policy() -> PollPolicy {
        PollPolicy::default().with_interval(Duration::from_millis(1))
    }

    async fn run_script(
        policy: &PollPolicy,
        cancel: &CancellationToken,
        script: &[&str],
    ) -> (Result<bool, AuthError>, usize) {
        let mut remaining: VecDeque<String> = script.iter().map(ToString::to_string).collect();
        let calls = Cell::new(0usize);
        let result = poll_until_decided(policy, cancel, || {
            calls.set(calls.get() + 1);
            let code = remaining.pop_front().unwrap_or_else(|| "pending".to_string());
            async move { Ok(ChallengeStatus::from_status_code(&code)) }
        })
        .await;
        (result, calls.get())
    }

    #[tokio::test]
    async fn test_allow_after_two_pending_checks_three_times() {
        let (result, calls) = run_script(
            &fast_policy(),
            &CancellationToken::new(),
            &["pending", "pending", "allow"],
        )
        .await;
        assert!(result.unwrap());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_deny_stops_after_one_check() {
        let (result, calls) =
            run_script(&fast_policy(), &CancellationToken::new(), &["deny"]).await;
        assert!(!result.unwrap());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_max_attempts_bounds_the_loop() {
        let policy = fast_policy().with_max_attempts(4);
        let (result, calls) = run_script(&policy, &CancellationToken::new(), &[]).await;
        assert!(matches!(result, Err(AuthError::PollExhausted { attempts: 4 })));
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_deadline_bounds_the_loop() {
        let policy = PollPolicy::default()
            .with_interval(Duration::from_millis(20))
            .with_deadline(Duration::from_millis(50));
        let (result, calls) = run_script(&policy, &CancellationToken::new(), &[]).await;
        assert!(matches!(result, Err(AuthError::PollExhausted { .. })));
        assert!((1..=3).contains(&calls), "unexpected call count {calls}");
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_check() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (result, calls) = run_script(&fast_policy(), &cancel, &["allow"]).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let policy = PollPolicy::default().with_interval(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let (result, calls) = run_script(&policy, &cancel, &[]).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_check_error_propagates() {
        let result = poll_until_decided(&fast_policy(), &CancellationToken::new(), || async {
            Err(AuthError::protocol("second-factor status", "missing status_code"))
        })
        .await;
        assert!(matches!(result, Err(AuthError::Protocol { .. })));
    }
}
