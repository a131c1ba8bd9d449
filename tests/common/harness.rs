//! tests/common/harness.rs
use merlin_acceptor::config::ManagerConfig;
use merlin_acceptor::timer::start_timer_facility;
use merlin_acceptor::{Managed, ManagedConnection, ManagerContext};
use std::fmt;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "merlin_acceptor=debug,lifecycle=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::FULL)
            .with_test_writer()
            .init();
    });
}

/// A shared, ordered record of every lifecycle hook invocation across a
/// test population.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Returns a snapshot of the log entries.
pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().map(|entries| entries.clone()).unwrap_or_default()
}

/// A scripted connection for integration tests: records every hook
/// invocation into a shared log, with configurable busy/idle reporting.
pub struct ScriptedConnection {
    pub name: String,
    pub log: CallLog,
    pub busy: bool,
    pub idle_for: Duration,
}

impl ScriptedConnection {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            busy: false,
            idle_for: Duration::ZERO,
        }
    }

    fn record(&self, hook: &str) {
        if let Ok(mut entries) = self.log.lock() {
            entries.push(format!("{}:{}", self.name, hook));
        }
    }
}

impl ManagedConnection for ScriptedConnection {
    fn timeout_expired(&mut self) {
        self.record("timeout_expired");
    }

    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn idle_time(&self) -> Duration {
        self.idle_for
    }

    fn notify_pending_shutdown(&mut self) {
        self.record("notify_pending_shutdown");
    }

    fn close_when_idle(&mut self) {
        self.record("close_when_idle");
    }

    fn drop_connection(&mut self) {
        self.record("drop_connection");
    }

    fn dump_state(&self, _level: u8) {
        self.record("dump_state");
    }
}

/// A test harness bundling a manager context with a running timeout
/// scheduling facility.
pub struct LifecycleHarness {
    pub ctx: Arc<ManagerContext>,
}

impl LifecycleHarness {
    /// Creates a harness with the given manager configuration.
    pub fn new(config: &ManagerConfig) -> Self {
        init_tracing();
        let timer = start_timer_facility(config.timer_channel_capacity);
        Self {
            ctx: ManagerContext::new(config, timer),
        }
    }

    /// Creates a harness with the given default idle timeout.
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self::new(&ManagerConfig {
            default_idle_timeout: idle_timeout,
            ..Default::default()
        })
    }

    /// Creates and attaches `count` scripted connections sharing one log.
    pub async fn population(
        &self,
        count: usize,
        log: &CallLog,
    ) -> Vec<Managed<ScriptedConnection>> {
        let mut connections = Vec::with_capacity(count);
        for index in 0..count {
            let conn = ScriptedConnection::new(format!("conn{}", index), log.clone());
            connections.push(Managed::attached(conn, &self.ctx).await);
        }
        connections
    }

    /// Stops the timeout scheduling facility.
    pub async fn shutdown(self) {
        let _ = self.ctx.timer().shutdown().await;
    }
}
