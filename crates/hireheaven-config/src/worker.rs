// ============================================================================
// Mail Worker Configuration
// ============================================================================

/// Runtime knobs for the mail worker process.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// How long shutdown waits for the in-flight handler and the final
    /// offset commit before terminating with a warning.
    pub drain_timeout_secs: u64,
    /// Flush budget for the producer side during shutdown.
    pub flush_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
            flush_timeout_secs: 10,
        }
    }
}

impl WorkerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            drain_timeout_secs: std::env::var("WORKER_DRAIN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            flush_timeout_secs: std::env::var("WORKER_FLUSH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
        }
    }
}
