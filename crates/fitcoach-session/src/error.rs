//! Session error types.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The referenced task was never scheduled.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },

    /// The scheduler has been shut down and will not accept new work.
    #[error("scheduler is shut down")]
    SchedulerShutdown,

    /// A zero period would spin the runtime.
    #[error("invalid period for task `{name}`: must be greater than zero")]
    InvalidPeriod { name: String },

    #[error("internal session error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
