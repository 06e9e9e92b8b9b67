//! Runtime half of the prospect state machine.
//!
//! The pure planner lives in `sellscale-core`. This module persists its plans
//! and executes their effects:
//! - **Repository**: storage of prospects, audit logs and the effect outbox
//! - **Store**: load, authorize, plan, commit, dispatch
//! - **Interpreter**: executes effects against storage and Slack
//! - **Outbox**: dispatch bookkeeping and the background retry loop

pub mod interpreter;
pub mod outbox;
pub mod repository;
pub mod store;

pub use interpreter::{execute_effect, execute_effects, EffectError, InterpreterContext};
pub use outbox::{outbox_retry_loop, DispatchReport, OutboxSettings};
pub use repository::{
    InMemoryRepository, ProspectRepository, RepositoryError, SqliteRepository,
};
pub use store::{
    AppliedTransition, CreateProspect, NextStatuses, ProspectStore, StatusOption, StoreError,
    StoreSettings,
};
