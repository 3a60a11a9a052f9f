/// Opaque job identifier handed out when a start request is accepted.
pub type JobId = uuid::Uuid;

/// Identifier of one attached observer connection.
pub type ConnId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Number of id characters shown in per-job log prefixes.
const SHORT_ID_LEN: usize = 8;

/// Short, human-friendly form of a job id (first eight hex digits).
pub fn short_id(id: &JobId) -> String {
    let mut s = id.simple().to_string();
    s.truncate(SHORT_ID_LEN);
    s
}
