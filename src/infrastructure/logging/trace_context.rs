/// Trace ids tying together the log lines of one sweep or reload
pub struct TraceContext;

impl TraceContext {
    /// New trace id (UUID v4)
    pub fn new_trace_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Trace id for a named background job, e.g. `checker-1f0c...`
    pub fn for_job(job: &str) -> String {
        format!("{}-{}", job, Self::new_trace_id())
    }
}
