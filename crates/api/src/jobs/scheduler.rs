//! Job scheduler infrastructure for background tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Job frequency for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    /// Run every N seconds.
    Seconds(u64),
    /// Run every hour.
    Hourly,
    /// Run every day at midnight UTC.
    Daily,
}

impl JobFrequency {
    /// Time to wait from `now` until the next run.
    ///
    /// Daily jobs are aligned to the next UTC midnight so a restart does not
    /// shift them.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            JobFrequency::Seconds(secs) => Duration::from_secs(*secs),
            JobFrequency::Hourly => Duration::from_secs(3600),
            JobFrequency::Daily => {
                let next_midnight = now
                    .date_naive()
                    .checked_add_days(Days::new(1))
                    .and_then(|day| day.and_hms_opt(0, 0, 0))
                    .map(|midnight| midnight.and_utc());
                next_midnight
                    .and_then(|at| (at - now).to_std().ok())
                    .unwrap_or(Duration::from_secs(86400))
            }
        }
    }
}

/// Trait for implementing background jobs.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// The name of this job (used for logging).
    fn name(&self) -> &'static str;

    /// The frequency at which this job should run.
    fn frequency(&self) -> JobFrequency;

    /// One run. The error message is logged; the job is scheduled again
    /// either way.
    async fn execute(&self) -> Result<(), String>;
}

/// Runs registered jobs on their own tasks until shut down.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawns one task per registered job.
    pub fn start(&mut self) {
        info!(jobs = self.jobs.len(), "Starting job scheduler");
        for job in &self.jobs {
            let handle = tokio::spawn(job_loop(Arc::clone(job), self.shutdown_rx.clone()));
            self.handles.push(handle);
        }
    }

    /// Signals every job loop to stop. A run in progress finishes first.
    pub fn shutdown(&self) {
        info!("Stopping job scheduler");
        // Fails only when no loop is listening any more.
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits up to `timeout` for the job loops to exit.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        let drained = tokio::time::timeout(timeout, async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "Jobs still running at shutdown deadline");
        } else {
            info!("Job scheduler stopped");
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps until each scheduled run and executes it, until shutdown is signalled.
async fn job_loop(job: Arc<dyn Job>, mut shutdown_rx: watch::Receiver<bool>) {
    let name = job.name();
    let frequency = job.frequency();
    info!(job = name, frequency = ?frequency, "Job scheduled");

    loop {
        let delay = frequency.next_delay(Utc::now());
        tokio::select! {
            _ = tokio::time::sleep(delay) => run_once(job.as_ref()).await,
            changed = shutdown_rx.changed() => {
                // A dropped sender also means the scheduler is gone.
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(job = name, "Job shutting down");
                    return;
                }
            }
        }
    }
}

async fn run_once(job: &dyn Job) {
    let name = job.name();
    let start = std::time::Instant::now();
    info!(job = name, "Job starting");

    match job.execute().await {
        Ok(()) => {
            counter!("job_runs_total", "job" => name, "outcome" => "success").increment(1);
            info!(
                job = name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Job completed successfully"
            );
        }
        Err(e) => {
            counter!("job_runs_total", "job" => name, "outcome" => "failure").increment(1);
            error!(
                job = name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Job failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestJob {
        run_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Job for TestJob {
        fn name(&self) -> &'static str {
            "test_job"
        }

        fn frequency(&self) -> JobFrequency {
            JobFrequency::Seconds(1)
        }

        async fn execute(&self) -> Result<(), String> {
            self.run_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err("Test failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_fixed_delays() {
        let now = Utc::now();
        assert_eq!(
            JobFrequency::Seconds(30).next_delay(now),
            Duration::from_secs(30)
        );
        assert_eq!(JobFrequency::Hourly.next_delay(now), Duration::from_secs(3600));
    }

    #[test]
    fn test_daily_aligns_to_next_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 22, 30, 0).unwrap();
        assert_eq!(
            JobFrequency::Daily.next_delay(now),
            Duration::from_secs(90 * 60)
        );

        let midnight = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(
            JobFrequency::Daily.next_delay(midnight),
            Duration::from_secs(86400)
        );
    }

    #[test]
    fn test_scheduler_register() {
        let mut scheduler = JobScheduler::new();
        scheduler.register(TestJob {
            run_count: Arc::new(AtomicUsize::new(0)),
            should_fail: false,
        });
        assert_eq!(scheduler.job_count(), 1);
        assert!(scheduler.handles.is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_is_contained() {
        let run_count = Arc::new(AtomicUsize::new(0));
        let job = TestJob {
            run_count: Arc::clone(&run_count),
            should_fail: true,
        };
        run_once(&job).await;
        run_once(&job).await;
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scheduler_runs_and_shuts_down() {
        let mut scheduler = JobScheduler::new();
        let run_count = Arc::new(AtomicUsize::new(0));
        scheduler.register(TestJob {
            run_count: Arc::clone(&run_count),
            should_fail: false,
        });
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(run_count.load(Ordering::SeqCst) >= 1);

        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(5)).await;
    }
}
