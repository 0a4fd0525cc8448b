use crate::errors::StoreError;
use crate::models::{DailyAggregate, DashboardResponse};
use crate::storage::StatBackend;
use crate::store::{StatEvent, StatStore};
use chrono::{DateTime, Local, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::task::JoinHandle;

const UPDATED_AT_FORMAT: &str = "%d %b %Y, %H:%M";
const NO_UPDATE_MARKER: &str = "—";

/// What the dashboard currently shows. A day with no writes renders as
/// all-zero with the placeholder "last updated" marker.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub steps: u32,
    pub calories: u32,
    pub workout_minutes: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DashboardSnapshot {
    fn zero() -> Self {
        Self {
            steps: 0,
            calories: 0,
            workout_minutes: 0,
            updated_at: None,
            error: None,
        }
    }

    fn apply(&mut self, aggregate: &DailyAggregate) {
        self.steps = aggregate.steps;
        self.calories = aggregate.calories;
        self.workout_minutes = aggregate.workout_minutes;
        self.updated_at = aggregate.updated_at;
        self.error = None;
    }

    pub fn last_updated_text(&self) -> String {
        match self.updated_at {
            Some(ts) => ts.with_timezone(&Local).format(UPDATED_AT_FORMAT).to_string(),
            None => NO_UPDATE_MARKER.to_owned(),
        }
    }

    pub fn to_response(&self) -> DashboardResponse {
        DashboardResponse {
            date: Local::now().date_naive().to_string(),
            steps: self.steps,
            calories: self.calories,
            workout_minutes: self.workout_minutes,
            last_updated: self.last_updated_text(),
            error: self.error.clone(),
        }
    }
}

struct SnapshotCell {
    snapshot: DashboardSnapshot,
    refresh_applied: u64,
}

/// Subscribes to the store and folds its events into a render-ready
/// snapshot. One consumer task per dashboard; closing (or dropping) it
/// cancels the subscription, so no listener outlives its dashboard.
pub struct Dashboard<B: StatBackend> {
    store: Arc<StatStore<B>>,
    shared: Arc<StdMutex<SnapshotCell>>,
    refresh_seq: AtomicU64,
    consumer: JoinHandle<()>,
}

impl<B: StatBackend> Dashboard<B> {
    pub fn attach(store: Arc<StatStore<B>>) -> Self {
        let shared = Arc::new(StdMutex::new(SnapshotCell {
            snapshot: DashboardSnapshot::zero(),
            refresh_applied: 0,
        }));

        let mut subscription = store.subscribe();
        let fold = Arc::clone(&shared);
        let consumer = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let mut cell = lock_cell(&fold);
                match event {
                    StatEvent::Aggregate(aggregate) => cell.snapshot.apply(&aggregate),
                    StatEvent::Unavailable(reason) => cell.snapshot.error = Some(reason),
                }
            }
        });

        Self {
            store,
            shared,
            refresh_seq: AtomicU64::new(0),
            consumer,
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        lock_cell(&self.shared).snapshot.clone()
    }

    /// One aggregate read on demand. Concurrent refreshes are safe: each
    /// carries a sequence number and a stale result never overwrites the
    /// snapshot a newer refresh already produced (last write wins).
    pub async fn refresh(&self) -> Result<DashboardSnapshot, StoreError> {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        match self.store.aggregate().await {
            Ok(aggregate) => {
                let mut cell = lock_cell(&self.shared);
                if seq > cell.refresh_applied {
                    cell.refresh_applied = seq;
                    cell.snapshot.apply(&aggregate);
                }
                Ok(cell.snapshot.clone())
            }
            Err(err) => {
                let mut cell = lock_cell(&self.shared);
                if seq > cell.refresh_applied {
                    cell.refresh_applied = seq;
                    cell.snapshot.error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    pub fn close(&self) {
        self.consumer.abort();
    }
}

impl<B: StatBackend> Drop for Dashboard<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_cell(cell: &StdMutex<SnapshotCell>) -> MutexGuard<'_, SnapshotCell> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BackendError;
    use crate::models::WorkoutUpdate;
    use crate::storage::{FieldMap, MemoryBackend};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn wait_for(dashboard: &Dashboard<impl StatBackend>, check: impl Fn(&DashboardSnapshot) -> bool) {
        for _ in 0..100 {
            if check(&dashboard.snapshot()) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("snapshot never reached expected state: {:?}", dashboard.snapshot());
    }

    #[tokio::test]
    async fn absent_aggregate_renders_zero_with_placeholder() {
        let store = Arc::new(StatStore::new(Arc::new(MemoryBackend::default())));
        let dashboard = Dashboard::attach(store);

        let snapshot = dashboard.snapshot();
        assert_eq!(
            (snapshot.steps, snapshot.calories, snapshot.workout_minutes),
            (0, 0, 0)
        );
        assert_eq!(snapshot.last_updated_text(), "—");
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn commit_pushes_into_snapshot() {
        let store = Arc::new(StatStore::new(Arc::new(MemoryBackend::default())));
        let dashboard = Dashboard::attach(Arc::clone(&store));

        store
            .record_workout(WorkoutUpdate::new(5000, 300, 45))
            .await
            .unwrap();

        wait_for(&dashboard, |snapshot| snapshot.steps == 5000).await;
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.calories, 300);
        assert_eq!(snapshot.workout_minutes, 45);
        assert_ne!(snapshot.last_updated_text(), "—");
    }

    #[tokio::test]
    async fn refresh_returns_the_current_aggregate() {
        let store = Arc::new(StatStore::new(Arc::new(MemoryBackend::default())));
        let dashboard = Dashboard::attach(Arc::clone(&store));

        store
            .record_workout(WorkoutUpdate::new(1000, 50, 10))
            .await
            .unwrap();

        let snapshot = dashboard.refresh().await.unwrap();
        assert_eq!(snapshot.steps, 1000);
        assert!(snapshot.error.is_none());
    }

    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_writes: AtomicBool,
    }

    impl StatBackend for FlakyBackend {
        async fn read(
            &self,
            collection: &str,
            key: &str,
        ) -> Result<Option<FieldMap>, BackendError> {
            self.inner.read(collection, key).await
        }

        async fn write(
            &self,
            collection: &str,
            key: &str,
            fields: FieldMap,
            merge: bool,
        ) -> Result<(), BackendError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("injected outage".into()));
            }
            self.inner.write(collection, key, fields, merge).await
        }

        async fn append(&self, collection: &str, fields: FieldMap) -> Result<String, BackendError> {
            self.inner.append(collection, fields).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_state_is_recoverable_by_refresh() {
        let backend = Arc::new(FlakyBackend::default());
        backend.fail_writes.store(true, Ordering::SeqCst);
        let store = Arc::new(StatStore::new(Arc::clone(&backend)));
        let dashboard = Dashboard::attach(Arc::clone(&store));

        let err = store
            .record_workout(WorkoutUpdate::new(1000, 50, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PartialWrite(_)));
        wait_for(&dashboard, |snapshot| snapshot.error.is_some()).await;

        backend.fail_writes.store(false, Ordering::SeqCst);
        let snapshot = dashboard.refresh().await.unwrap();
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn closed_dashboard_stops_listening() {
        let store = Arc::new(StatStore::new(Arc::new(MemoryBackend::default())));
        let dashboard = Dashboard::attach(Arc::clone(&store));
        dashboard.close();
        sleep(Duration::from_millis(20)).await;

        store
            .record_workout(WorkoutUpdate::new(5000, 300, 45))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(dashboard.snapshot().steps, 0);
    }
}
