use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

type Job = BoxFuture<'static, ()>;

/// Named FIFO queue drained by a single worker task.
///
/// Jobs submitted to the same lane run strictly one after another in
/// submission order. A job that panics is logged and the lane keeps going.
#[derive(Clone)]
pub struct SerialLane {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialLane {
    fn spawn(name: &str) -> Self {
        let name: Arc<str> = Arc::from(name);
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker_name = name.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!(lane = %worker_name, "job panicked");
                }
            }
            debug!(lane = %worker_name, "lane drained");
        });

        Self { name, tx }
    }

    /// A lane whose queue is already shut; every submit is dropped.
    fn closed(name: &str) -> Self {
        let (tx, _) = mpsc::unbounded_channel::<Job>();
        Self {
            name: Arc::from(name),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job behind everything already submitted to this lane.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).is_err() {
            warn!(lane = %self.name, "lane closed, job dropped");
        }
    }
}

impl std::fmt::Debug for SerialLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLane").field("name", &self.name).finish()
    }
}

/// Deferred and periodic execution plus named serialization guards.
///
/// Callbacks scheduled here never run inline in the caller; a slow or
/// failing callback only occupies its own task. After [`shutdown`](Self::shutdown)
/// new work is dropped with a warning.
#[derive(Default)]
pub struct Scheduler {
    lanes: Mutex<HashMap<String, SerialLane>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    periodic: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fire-and-forget a single invocation, optionally after `delay`.
    pub fn run_once<F>(&self, job: F, delay: Option<Duration>)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            warn!("scheduler shut down, one-shot job dropped");
            return;
        }
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            job.await;
        });
    }

    /// Invoke `callback` every `every` until [`shutdown`](Self::shutdown).
    ///
    /// The first call happens one interval from now. Invocations never overlap;
    /// a late tick is delayed rather than bunched.
    pub fn run_periodic<F, Fut>(&self, every: Duration, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            warn!("scheduler shut down, periodic job dropped");
            return;
        }
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback().await;
            }
        });
        self.periodic.lock().push(handle);
    }

    /// Number of periodic tasks still registered.
    pub fn periodic_count(&self) -> usize {
        self.periodic.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// The lane registered under `name`, created on first use.
    ///
    /// After shutdown this is a closed lane that drops whatever it is given.
    pub fn lane(&self, name: &str) -> SerialLane {
        let mut lanes = self.lanes.lock();
        if self.is_shut_down() {
            return SerialLane::closed(name);
        }
        lanes
            .entry(name.to_string())
            .or_insert_with(|| SerialLane::spawn(name))
            .clone()
    }

    /// Run `job` while holding the guard named `name`.
    ///
    /// Concurrent callers under the same name are admitted in FIFO order.
    pub async fn with_lock<F>(&self, name: &str, job: F) -> F::Output
    where
        F: Future,
    {
        let lock = self
            .locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;
        job.await
    }

    /// Abort periodic tasks and close every lane once its queue drains.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        for handle in self.periodic.lock().drain(..) {
            handle.abort();
        }
        self.lanes.lock().clear();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("lanes", &self.lanes.lock().len())
            .field("periodic", &self.periodic.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lane_survives_panicking_job() {
        let scheduler = Scheduler::new();
        let lane = scheduler.lane("test.panic");
        let (tx, rx) = tokio::sync::oneshot::channel();

        lane.submit(async { panic!("boom") });
        lane.submit(async move {
            let _ = tx.send(());
        });

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_same_name_returns_same_lane() {
        let scheduler = Scheduler::new();
        let a = scheduler.lane("x");
        let b = scheduler.lane("x");
        assert!(a.tx.same_channel(&b.tx));
    }

    #[tokio::test]
    async fn test_no_new_work_after_shutdown() {
        let scheduler = Scheduler::new();
        scheduler.shutdown();
        assert!(scheduler.is_shut_down());

        let ran = Arc::new(AtomicUsize::new(0));
        let lane_ran = ran.clone();
        scheduler.lane("bus.orderbook.zb.EOS/QC").submit(async move {
            lane_ran.fetch_add(1, Ordering::SeqCst);
        });
        let once_ran = ran.clone();
        scheduler.run_once(
            async move {
                once_ran.fetch_add(1, Ordering::SeqCst);
            },
            None,
        );
        let periodic_ran = ran.clone();
        scheduler.run_periodic(Duration::from_millis(5), move || {
            let periodic_ran = periodic_ran.clone();
            async move {
                periodic_ran.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.periodic_count(), 0);
        assert!(format!("{:?}", scheduler).contains("lanes: 0"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_periodic() {
        let scheduler = Scheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        scheduler.run_periodic(Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_shutdown = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(after_shutdown > 0);
        assert_eq!(hits.load(Ordering::SeqCst), after_shutdown);
        assert_eq!(scheduler.periodic_count(), 0);
    }
}
