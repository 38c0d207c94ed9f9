//! Monitor capability: where reportable errors and unsolicited protocol
//! traffic end up.

/// Sink for errors and notices. Calls are fire-and-forget.
pub trait Monitor: Send + Sync {
    /// Report an error together with structured context.
    fn report_error(&self, error: &(dyn std::error::Error + Send + Sync), context: serde_json::Value);

    /// Record an informational notice (e.g. an unhandled server message).
    fn notice(&self, message: &str);
}

/// Monitor that emits everything through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl TracingMonitor {
    pub fn new() -> Self {
        Self
    }
}

impl Monitor for TracingMonitor {
    fn report_error(&self, error: &(dyn std::error::Error + Send + Sync), context: serde_json::Value) {
        tracing::error!(error = %error, context = %context, "Reported error");
    }

    fn notice(&self, message: &str) {
        tracing::info!(notice = message, "Monitor notice");
    }
}
