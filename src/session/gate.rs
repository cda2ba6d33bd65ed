// src/session/gate.rs

use crate::{config::MAX_ATTEMPTS, error::AppError, repository::Repository};

/// Whether a student may start another attempt on a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Start attempt number `attempt_no` (1-based).
    Permitted { attempt_no: i32 },
    /// The student already used every allowed attempt.
    LimitExceeded { prior_attempts: i32 },
}

/// Decides from the stored attempt counter; no record means no prior attempts.
pub fn evaluate(prior_attempts: Option<i32>) -> GateDecision {
    let prior = prior_attempts.unwrap_or(0);
    if prior >= MAX_ATTEMPTS {
        GateDecision::LimitExceeded {
            prior_attempts: prior,
        }
    } else {
        GateDecision::Permitted {
            attempt_no: prior + 1,
        }
    }
}

/// Reads the attempt counter for (test, email) and evaluates it.
///
/// The check is advisory: two concurrent starts may both pass, and the later result
/// write wins. Backend failures come back as `AppError::Unavailable` so the caller
/// aborts instead of starting an ungated attempt.
pub async fn check_attempt(
    repo: &dyn Repository,
    test_id: i64,
    email: &str,
) -> Result<GateDecision, AppError> {
    let prior = repo.fetch_attempt_count(test_id, email).await.map_err(|e| {
        tracing::error!("Attempt gate query failed for test {}: {}", test_id, e);
        AppError::Unavailable(e.to_string())
    })?;

    let decision = evaluate(prior);
    tracing::debug!(test_id, email, ?decision, "attempt gate evaluated");
    Ok(decision)
}
