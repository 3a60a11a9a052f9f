use crewcast_core::log_message::LogMessage;

/// Destination for the log messages of one job.
///
/// Implementations must be callable from any thread: the translator and
/// the output capture run on the job's execution context, not on the one
/// serving observers.
pub trait LogSink: Send + Sync {
    fn emit(&self, message: LogMessage);
}
