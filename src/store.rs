use crate::errors::{BackendError, StoreError};
use crate::models::{DailyAggregate, NutritionEntry, SleepEntry, WorkoutUpdate};
use crate::storage::StatBackend;
use chrono::{Local, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

pub const AGGREGATE_COLLECTION: &str = "daily_stats";
pub const WORKOUT_LOGS: &str = "workout_logs";
pub const SLEEP_LOGS: &str = "sleep_logs";
pub const NUTRITION_LOGS: &str = "nutrition_logs";

const OP_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Notification delivered to subscribers, in commit order.
#[derive(Debug, Clone)]
pub enum StatEvent {
    /// The day's aggregate after a successful commit.
    Aggregate(DailyAggregate),
    /// A commit left the aggregate stale (merge failed after the log
    /// append); observers should show a recoverable error state.
    Unavailable(String),
}

type Registry = StdMutex<HashMap<u64, UnboundedSender<StatEvent>>>;

/// Owns the current-day aggregate and the append-only entry logs.
///
/// All mutations run behind one commit lock, so the log append and the
/// aggregate merge of a single entry form one logical unit and notifications
/// go out in commit order. Constructed explicitly and passed to consumers;
/// there is no process-wide instance.
pub struct StatStore<B: StatBackend> {
    backend: Arc<B>,
    commit: Mutex<()>,
    subscribers: Arc<Registry>,
    next_subscriber: AtomicU64,
}

impl<B: StatBackend> StatStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            commit: Mutex::new(()),
            subscribers: Arc::new(StdMutex::new(HashMap::new())),
            next_subscriber: AtomicU64::new(0),
        }
    }

    /// Appends a workout log entry and merges its mentioned fields into
    /// today's aggregate. Rejects an update that mentions nothing before any
    /// write happens. A merge failure after the append succeeded comes back
    /// as the distinct [`StoreError::PartialWrite`]; the appended log is not
    /// rolled back (the entry itself is true history) and subscribers get an
    /// [`StatEvent::Unavailable`] so dashboards can show the degraded state.
    pub async fn record_workout(&self, update: WorkoutUpdate) -> Result<(), StoreError> {
        self.record_workout_at(update, Local::now().date_naive()).await
    }

    pub async fn record_workout_at(
        &self,
        update: WorkoutUpdate,
        day: NaiveDate,
    ) -> Result<(), StoreError> {
        let update = update.normalized();
        if update.mentions_nothing() {
            return Err(StoreError::validation("enter at least one value"));
        }

        let _commit = self.commit.lock().await;
        let now = Utc::now();
        let backend = Arc::clone(&self.backend);

        with_retry("workout log append", || {
            let backend = Arc::clone(&backend);
            let fields = update.log_fields(now);
            async move { backend.append(WORKOUT_LOGS, fields).await }
        })
        .await?;

        let key = day.to_string();
        let merged = async {
            let stored = with_retry("aggregate read", || {
                let backend = Arc::clone(&backend);
                let key = key.clone();
                async move { backend.read(AGGREGATE_COLLECTION, &key).await }
            })
            .await?;

            let mut aggregate = match stored {
                Some(fields) => DailyAggregate::from_fields(day, &fields),
                None => DailyAggregate::empty(day),
            };
            update.apply(&mut aggregate, now);

            with_retry("aggregate merge", || {
                let backend = Arc::clone(&backend);
                let key = key.clone();
                let fields = update.merge_fields(now);
                async move { backend.write(AGGREGATE_COLLECTION, &key, fields, true).await }
            })
            .await?;

            Ok::<_, StoreError>(aggregate)
        }
        .await;

        match merged {
            Ok(aggregate) => {
                info!(
                    steps = aggregate.steps,
                    calories = aggregate.calories,
                    minutes = aggregate.workout_minutes,
                    "workout recorded"
                );
                self.publish(StatEvent::Aggregate(aggregate));
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                self.publish(StatEvent::Unavailable(reason.clone()));
                Err(StoreError::PartialWrite(reason))
            }
        }
    }

    /// History only: a sleep entry never touches the day's aggregate.
    pub async fn record_sleep(&self, entry: SleepEntry) -> Result<(), StoreError> {
        if !entry.hours_slept.is_finite() || entry.hours_slept <= 0.0 {
            return Err(StoreError::validation("enter hours slept"));
        }

        let _commit = self.commit.lock().await;
        let now = Utc::now();
        let backend = Arc::clone(&self.backend);
        with_retry("sleep log append", || {
            let backend = Arc::clone(&backend);
            let fields = entry.log_fields(now);
            async move { backend.append(SLEEP_LOGS, fields).await }
        })
        .await?;

        info!(hours = entry.hours_slept, "sleep entry recorded");
        Ok(())
    }

    /// History only, like [`record_sleep`](Self::record_sleep).
    pub async fn record_nutrition(&self, entry: NutritionEntry) -> Result<(), StoreError> {
        if entry.meal_name.trim().is_empty() || entry.calories == 0 {
            return Err(StoreError::validation("enter meal name and calories"));
        }

        let _commit = self.commit.lock().await;
        let now = Utc::now();
        let backend = Arc::clone(&self.backend);
        with_retry("nutrition log append", || {
            let backend = Arc::clone(&backend);
            let fields = entry.log_fields(now);
            async move { backend.append(NUTRITION_LOGS, fields).await }
        })
        .await?;

        info!(meal = %entry.meal_name, "nutrition entry recorded");
        Ok(())
    }

    /// Today's aggregate. Absence is not an error: a day nothing was written
    /// to reads as the all-zero aggregate with no timestamp.
    pub async fn aggregate(&self) -> Result<DailyAggregate, StoreError> {
        self.aggregate_at(Local::now().date_naive()).await
    }

    pub async fn aggregate_at(&self, day: NaiveDate) -> Result<DailyAggregate, StoreError> {
        let backend = Arc::clone(&self.backend);
        let key = day.to_string();
        let stored = with_retry("aggregate read", || {
            let backend = Arc::clone(&backend);
            let key = key.clone();
            async move { backend.read(AGGREGATE_COLLECTION, &key).await }
        })
        .await?;

        Ok(match stored {
            Some(fields) => DailyAggregate::from_fields(day, &fields),
            None => DailyAggregate::empty(day),
        })
    }

    /// Registers a subscriber. Events arrive in commit order, one at a time;
    /// the handle stops delivery when cancelled or dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock_registry(&self.subscribers).insert(id, tx);
        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
            events: rx,
        }
    }

    fn publish(&self, event: StatEvent) {
        let mut subscribers = lock_registry(&self.subscribers);
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// Handle for one subscriber. Cancellation is idempotent and may happen from
/// any thread; dropping the handle cancels too.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
    events: UnboundedReceiver<StatEvent>,
}

impl Subscription {
    /// Next event in commit order; `None` once the subscription is cancelled
    /// (or the store is gone) and the queue is drained.
    pub async fn next(&mut self) -> Option<StatEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock_registry(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<u64, UnboundedSender<StatEvent>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs a backend operation with a per-attempt timeout and bounded
/// exponential backoff. Only transport-level failures are retried; the
/// caller validates before getting here.
async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let failure = match timeout(OP_TIMEOUT, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("{what} timed out"),
        };
        if attempt >= WRITE_ATTEMPTS {
            return Err(StoreError::Transport(failure));
        }
        warn!("{what} failed (attempt {attempt}): {failure}");
        sleep(delay).await;
        delay *= 2;
    }
}
