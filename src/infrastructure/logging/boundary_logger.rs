use std::time::Instant;
use tracing::{info, warn, error};

/// BoundaryLogger - logs every crossing between checker, storages and collaborators
///
/// Format: [trace_id] [caller→callee] operation [STAGE] details
#[derive(Clone)]
pub struct BoundaryLogger;

impl BoundaryLogger {
    pub fn new() -> Self {
        Self
    }

    /// Service call started
    /// e.g. [3f2a..] [Worker→WebhookChecker] sweep [ENTRY] remove_orphans=true
    pub fn service_entry(&self, trace_id: &str, from: &str, service: &str, method: &str, params: &str) {
        info!(
            trace_id = %trace_id,
            from = %from,
            service = %service,
            method = %method,
            flow = format!("{}→{}", from, service),
            stage = "ENTRY",
            params = %params,
            "[{}] [{}→{}] {} [ENTRY] {}",
            trace_id, from, service, method, params
        );
    }

    /// Service call finished
    pub fn service_exit(&self, trace_id: &str, from: &str, service: &str, method: &str, duration_ms: f64) {
        info!(
            trace_id = %trace_id,
            from = %from,
            service = %service,
            method = %method,
            flow = format!("{}→{}", from, service),
            stage = "←DONE",
            duration_ms = %duration_ms,
            "[{}] [{}→{}] {} [←DONE] {:.2}ms",
            trace_id, from, service, method, duration_ms
        );
    }

    pub fn service_error<E: std::fmt::Display>(&self, trace_id: &str, from: &str, service: &str, method: &str, error: &E) {
        error!(
            trace_id = %trace_id,
            from = %from,
            service = %service,
            method = %method,
            flow = format!("{}→{}", from, service),
            stage = "←FAIL",
            error = %error,
            "[{}] [{}→{}] {} [←FAIL] error={}",
            trace_id, from, service, method, error
        );
    }

    /// Storage / repository call
    /// e.g. [3f2a..] [WebhookChecker→AuthDataRepo] delete [CALL] key=abc
    pub fn repo_call(&self, trace_id: &str, from: &str, repo: &str, method: &str, target: &str) {
        info!(
            trace_id = %trace_id,
            from = %from,
            repo = %repo,
            method = %method,
            target = %target,
            flow = format!("{}→{}", from, repo),
            stage = "CALL",
            "[{}] [{}→{}] {} [CALL] {}",
            trace_id, from, repo, method, target
        );
    }

    pub fn repo_error<E: std::fmt::Display>(&self, trace_id: &str, from: &str, repo: &str, method: &str, error: &E) {
        warn!(
            trace_id = %trace_id,
            from = %from,
            repo = %repo,
            method = %method,
            flow = format!("{}→{}", from, repo),
            stage = "←FAIL",
            error = %error,
            "[{}] [{}→{}] {} [←FAIL] error={}",
            trace_id, from, repo, method, error
        );
    }

    /// Collaborator lookup (VCS roots, OAuth connections)
    pub fn external_call(&self, trace_id: &str, from: &str, system: &str, operation: &str) {
        info!(
            trace_id = %trace_id,
            from = %from,
            system = %system,
            operation = %operation,
            flow = format!("{}→{}", from, system),
            stage = "EXT→",
            "[{}] [{}→{}] {} [EXT→]",
            trace_id, from, system, operation
        );
    }

    pub fn external_done(&self, trace_id: &str, from: &str, system: &str, operation: &str, duration_ms: f64) {
        info!(
            trace_id = %trace_id,
            from = %from,
            system = %system,
            operation = %operation,
            flow = format!("{}→{}", from, system),
            stage = "←DONE",
            duration_ms = %duration_ms,
            "[{}] [{}→{}] {} [←DONE] {:.2}ms",
            trace_id, from, system, operation, duration_ms
        );
    }

    pub fn external_error<E: std::fmt::Display>(&self, trace_id: &str, from: &str, system: &str, operation: &str, error: &E) {
        warn!(
            trace_id = %trace_id,
            from = %from,
            system = %system,
            operation = %operation,
            flow = format!("{}→{}", from, system),
            stage = "←FAIL",
            error = %error,
            "[{}] [{}→{}] {} [←FAIL] error={}",
            trace_id, from, system, operation, error
        );
    }
}

impl Default for BoundaryLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for boundary durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
