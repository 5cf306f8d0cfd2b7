//! Control-plane error types.
//!
//! These cover status and cancel calls only; they never affect job
//! execution. Failures inside a job are modeled by
//! [`crate::pipeline::types::JobFailure`] on the job itself.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),

    #[error("Job queue is shut down")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_job() {
        let id = Uuid::new_v4();
        assert!(PipelineError::NotFound(id).to_string().contains(&id.to_string()));
        assert!(PipelineError::AlreadyTerminal(id).to_string().contains("terminal"));
    }
}
