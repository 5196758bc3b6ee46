//! Background payment monitors.
//!
//! A monitor is a re-entrant driver around [`PaymentStateMachine::check_order`]:
//! it checks once immediately, then on a fixed interval until the payment is
//! terminal or the monitor is stopped. All durable state lives in the store,
//! so monitors can be dropped and respawned freely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::payment::PaymentStateMachine;
use super::retry::calculate_backoff;
use crate::domain::{AppError, DatabaseClient, DatabaseError, PaymentCheckResult};

/// Default polling interval
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);
/// Longest delay after repeated failures, as a multiple of the interval
pub const MAX_BACKOFF_MULTIPLIER: u32 = 8;

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub max_backoff_multiplier: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            max_backoff_multiplier: MAX_BACKOFF_MULTIPLIER,
        }
    }
}

impl MonitorConfig {
    /// Delay before the next check after `consecutive_failures` failed ticks
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let multiplier = calculate_backoff(consecutive_failures).min(self.max_backoff_multiplier.max(1));
        self.interval * multiplier
    }
}

/// One monitor tick, delivered to the observer callback
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Checked(PaymentCheckResult),
    Failed {
        order_id: String,
        error: String,
        transient: bool,
        /// The monitor exits after this event
        stopped: bool,
    },
}

pub type MonitorCallback = Arc<dyn Fn(MonitorEvent) + Send + Sync>;

/// Callback that writes every tick to the log
pub fn logging_callback() -> MonitorCallback {
    Arc::new(|event| match event {
        MonitorEvent::Checked(result) => info!(
            order_id = %result.order_id,
            status = %result.status,
            confirmations = result.confirmations,
            "{}",
            result.message
        ),
        MonitorEvent::Failed {
            order_id,
            error,
            transient,
            stopped,
        } => warn!(order_id = %order_id, transient, stopped, error = %error, "Payment check failed"),
    })
}

/// Spawn a monitor for the payment attached to `order_id`.
///
/// Send `true` on the returned sender, or drop it, to stop the monitor.
pub fn spawn_monitor(
    machine: Arc<PaymentStateMachine>,
    order_id: String,
    config: MonitorConfig,
    callback: MonitorCallback,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_monitor(machine, order_id, config, callback, shutdown_rx));
    (handle, shutdown_tx)
}

#[instrument(skip_all, fields(order_id = %order_id))]
async fn run_monitor(
    machine: Arc<PaymentStateMachine>,
    order_id: String,
    config: MonitorConfig,
    callback: MonitorCallback,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(interval_ms = config.interval.as_millis() as u64, "Payment monitor started");
    let mut failures: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match machine.check_order(&order_id).await {
            Ok(result) => {
                failures = 0;
                let terminal = result.is_terminal();
                callback(MonitorEvent::Checked(result));
                if terminal {
                    break;
                }
            }
            Err(e) => {
                let transient = e.is_transient();
                let missing = matches!(e, AppError::Database(DatabaseError::NotFound(_)));
                callback(MonitorEvent::Failed {
                    order_id: order_id.clone(),
                    error: e.to_string(),
                    transient,
                    stopped: missing,
                });
                if missing {
                    error!("Payment disappeared, stopping monitor");
                    break;
                }
                failures = failures.saturating_add(1);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.delay_after(failures)) => {}
            changed = shutdown_rx.changed() => {
                // Sender dropped
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Payment monitor stopped");
}

struct MonitorHandle {
    generation: u64,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Keeps at most one live monitor per order
pub struct MonitorSupervisor {
    machine: Arc<PaymentStateMachine>,
    db_client: Arc<dyn DatabaseClient>,
    config: MonitorConfig,
    callback: MonitorCallback,
    monitors: Arc<DashMap<String, MonitorHandle>>,
    next_generation: AtomicU64,
}

impl MonitorSupervisor {
    #[must_use]
    pub fn new(
        machine: Arc<PaymentStateMachine>,
        db_client: Arc<dyn DatabaseClient>,
        config: MonitorConfig,
    ) -> Self {
        Self::with_callback(machine, db_client, config, logging_callback())
    }

    #[must_use]
    pub fn with_callback(
        machine: Arc<PaymentStateMachine>,
        db_client: Arc<dyn DatabaseClient>,
        config: MonitorConfig,
        callback: MonitorCallback,
    ) -> Self {
        Self {
            machine,
            db_client,
            config,
            callback,
            monitors: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Start monitoring `order_id` unless a live monitor already exists.
    /// Returns whether a new monitor was spawned.
    pub fn watch(&self, order_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        let entry = self.monitors.entry(order_id.to_string());
        if let Entry::Occupied(existing) = &entry
            && !existing.get().handle.is_finished()
        {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let monitors = Arc::clone(&self.monitors);
        let callback = Arc::clone(&self.callback);
        let key = order_id.to_string();
        let deregister: MonitorCallback = Arc::new(move |event| {
            let done = match &event {
                MonitorEvent::Checked(result) => result.is_terminal(),
                MonitorEvent::Failed { stopped, .. } => *stopped,
            };
            callback(event);
            if done {
                monitors.remove_if(&key, |_, h| h.generation == generation);
            }
        });

        let (handle, shutdown_tx) = spawn_monitor(
            Arc::clone(&self.machine),
            order_id.to_string(),
            self.config.clone(),
            deregister,
        );
        entry.insert(MonitorHandle {
            generation,
            handle,
            shutdown_tx,
        });
        info!(order_id = %order_id, "Payment monitor registered");
        true
    }

    /// Stop the monitor for `order_id`, if any
    pub fn stop(&self, order_id: &str) -> bool {
        match self.monitors.remove(order_id) {
            Some((_, monitor)) => {
                let _ = monitor.shutdown_tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Number of monitors still running
    pub fn active_count(&self) -> usize {
        self.monitors
            .iter()
            .filter(|m| !m.value().handle.is_finished())
            .count()
    }

    /// Registry entries, including monitors that exited without deregistering
    pub fn registered_count(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_watching(&self, order_id: &str) -> bool {
        self.monitors
            .get(order_id)
            .is_some_and(|m| !m.handle.is_finished())
    }

    /// Respawn monitors for every payment still awaiting funds or confirmations
    #[instrument(skip(self))]
    pub async fn resume_in_flight(&self) -> Result<usize, AppError> {
        let payments = self.db_client.list_in_flight_payments().await?;
        let resumed = payments
            .iter()
            .filter(|payment| self.watch(&payment.order_id))
            .count();
        info!(resumed, "Resumed in-flight payment monitors");
        Ok(resumed)
    }

    /// Stop every monitor and wait for them to exit
    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.monitors.iter().map(|m| m.key().clone()).collect();
        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, monitor)) = self.monitors.remove(&key) {
                let _ = monitor.shutdown_tx.send(true);
                handles.push(monitor.handle);
            }
        }

        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Payment monitor task failed");
            }
        }
        info!(count, "Payment monitors shut down");
    }
}
