//! Core prospect outreach state machine.
//!
//! Everything here is pure: status vocabularies, transition tables, the
//! transition planner, effects as data and bump-framework rules. Persistence
//! and effect execution live in `sellscale-server`.

pub mod bump;
pub mod effect;
pub mod model;
pub mod status;
pub mod table;
pub mod transition;

pub use effect::{Effect, LogLevel, Notification, NotifyChannel, OutreachChannel};
pub use model::{ArchetypeId, ClientSdrId, MessageId, Prospect, ProspectEmail, ProspectId};
pub use status::{
    overall_status_for, ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus,
    StatusDescriptor,
};
pub use table::{valid_next_email_statuses, valid_next_linkedin_statuses};
pub use transition::{
    plan_email_transition, plan_linkedin_transition, validate_email_transition,
    validate_linkedin_transition, DemoSetType, EmailTransitionPlan, PlannerSettings,
    TransitionError, TransitionPlan, TransitionRequest,
};
