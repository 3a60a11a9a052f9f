//! Job execution: the per-job dispatcher and the supervisor that owns the
//! job lifecycle.

pub mod dispatcher;
pub mod supervisor;

pub use dispatcher::Dispatcher;
pub use supervisor::{CancelAck, JobSnapshot, JobSupervisor, SupervisorSettings};
