//! Pure transition planner.
//!
//! Given a prospect and a requested status, the planner validates the move
//! against the transition table and returns the updated prospect, the audit
//! row to append and the effects to run after commit. It performs no I/O;
//! the server's store persists the plan atomically.
//!
//! - `linkedin`: LinkedIn channel planner
//! - `email`: email channel planner

mod email;
mod linkedin;

pub use email::{plan_email_transition, EmailTransitionPlan};
pub use linkedin::{plan_linkedin_transition, TransitionPlan};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::effect::{Effect, LogLevel};
use crate::model::{ProspectId, PurgatoryOutOfRange};
use crate::status::{ProspectEmailOutreachStatus, ProspectStatus};
use crate::table::{valid_next_email_statuses, valid_next_linkedin_statuses};

/// Default purgatory length after a bump.
pub const DEFAULT_BUMP_PURGATORY_DAYS: i64 = 2;

/// How a demo was booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemoSetType {
    /// Booked by the SDR for an account executive to run.
    Handoff,
    /// Booked directly on the SDR's own calendar.
    Direct,
}

/// A caller's request to move a prospect to a new status on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest<S> {
    pub new_status: S,
    /// Skip table validation.
    #[serde(default)]
    pub override_status: bool,
    /// Suppress every effect.
    #[serde(default)]
    pub quietly: bool,
    /// Transition was made by automation rather than a person.
    #[serde(default)]
    pub automated: bool,
    #[serde(default)]
    pub demo_set_type: Option<DemoSetType>,
}

impl<S> TransitionRequest<S> {
    pub fn to(new_status: S) -> Self {
        Self {
            new_status,
            override_status: false,
            quietly: false,
            automated: false,
            demo_set_type: None,
        }
    }

    pub fn with_override(mut self) -> Self {
        self.override_status = true;
        self
    }

    pub fn quietly(mut self) -> Self {
        self.quietly = true;
        self
    }

    pub fn automated(mut self) -> Self {
        self.automated = true;
        self
    }

    pub fn with_demo_set_type(mut self, demo_set_type: DemoSetType) -> Self {
        self.demo_set_type = Some(demo_set_type);
        self
    }
}

/// Tunables for the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerSettings {
    pub bump_purgatory_days: i64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            bump_purgatory_days: DEFAULT_BUMP_PURGATORY_DAYS,
        }
    }
}

/// Errors returned by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid status transition from {from} to {to}: {to} is not a valid next status")]
    NotAllowed { from: String, to: String },

    #[error("Prospect {0} has no email record")]
    NoEmailRecord(ProspectId),

    #[error(transparent)]
    Purgatory(#[from] PurgatoryOutOfRange),
}

impl TransitionError {
    fn not_allowed(from: impl ToString, to: impl ToString) -> Self {
        Self::NotAllowed {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Accepts iff `requested` is a listed next status of `current` or
/// `override_status` is set.
pub fn validate_linkedin_transition(
    current: ProspectStatus,
    requested: ProspectStatus,
    override_status: bool,
) -> Result<(), TransitionError> {
    if override_status || valid_next_linkedin_statuses(current).contains(&requested) {
        Ok(())
    } else {
        Err(TransitionError::not_allowed(current, requested))
    }
}

/// Email counterpart of [`validate_linkedin_transition`]. An email record
/// without a status behaves as `UNKNOWN`.
pub fn validate_email_transition(
    current: Option<ProspectEmailOutreachStatus>,
    requested: ProspectEmailOutreachStatus,
    override_status: bool,
) -> Result<(), TransitionError> {
    let current = current.unwrap_or(ProspectEmailOutreachStatus::Unknown);
    if override_status || valid_next_email_statuses(current).contains(&requested) {
        Ok(())
    } else {
        Err(TransitionError::not_allowed(current, requested))
    }
}

fn transition_log(
    prospect_id: ProspectId,
    channel: &str,
    from: impl std::fmt::Display,
    to: impl std::fmt::Display,
    override_status: bool,
) -> Effect {
    let suffix = if override_status { " (override)" } else { "" };
    Effect::Log {
        level: LogLevel::Info,
        message: format!("Prospect {prospect_id} {channel} status {from} -> {to}{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_linkedin() -> impl Strategy<Value = ProspectStatus> {
        proptest::sample::select(ProspectStatus::ALL.to_vec())
    }

    fn any_email() -> impl Strategy<Value = ProspectEmailOutreachStatus> {
        proptest::sample::select(ProspectEmailOutreachStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn linkedin_validator_accepts_iff_listed_or_override(
            current in any_linkedin(),
            requested in any_linkedin(),
            override_status in any::<bool>(),
        ) {
            let listed = valid_next_linkedin_statuses(current).contains(&requested);
            let result = validate_linkedin_transition(current, requested, override_status);
            prop_assert_eq!(result.is_ok(), listed || override_status);
        }

        #[test]
        fn email_validator_accepts_iff_listed_or_override(
            current in any_email(),
            requested in any_email(),
            override_status in any::<bool>(),
        ) {
            let listed = valid_next_email_statuses(current).contains(&requested);
            let result = validate_email_transition(Some(current), requested, override_status);
            prop_assert_eq!(result.is_ok(), listed || override_status);
        }

        #[test]
        fn terminal_statuses_reject_everything_without_override(requested in any_linkedin()) {
            for terminal in [ProspectStatus::DemoWon, ProspectStatus::NotQualified] {
                prop_assert!(validate_linkedin_transition(terminal, requested, false).is_err());
                prop_assert!(validate_linkedin_transition(terminal, requested, true).is_ok());
            }
        }
    }

    #[test]
    fn test_rejection_message_names_target() {
        let err = validate_linkedin_transition(
            ProspectStatus::SentOutreach,
            ProspectStatus::DemoWon,
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("DEMO_WON"));
        assert_eq!(
            err,
            TransitionError::NotAllowed {
                from: "SENT_OUTREACH".to_string(),
                to: "DEMO_WON".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_email_status_behaves_as_unknown() {
        assert!(validate_email_transition(
            None,
            ProspectEmailOutreachStatus::SentOutreach,
            false
        )
        .is_ok());
        assert!(validate_email_transition(
            None,
            ProspectEmailOutreachStatus::DemoWon,
            false
        )
        .is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: TransitionRequest<ProspectStatus> =
            serde_json::from_str(r#"{"new_status":"ACCEPTED"}"#).unwrap();
        assert_eq!(request, TransitionRequest::to(ProspectStatus::Accepted));
    }
}
