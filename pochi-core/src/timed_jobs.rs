use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    token: u64,
    timer: JoinHandle<()>,
    job: Job,
}

struct JobTable<K> {
    jobs: HashMap<K, Scheduled>,
    next_token: u64,
}

/// Keyed debounce queue.
///
/// Each key holds at most one pending job. Pushing a job for a key that is
/// already pending cancels the old job and restarts the delay; `trigger` runs
/// a pending job right away. Must be used from within a Tokio runtime.
pub struct TimedJobList<K> {
    table: Arc<Mutex<JobTable<K>>>,
}

impl<K> TimedJobList<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(JobTable {
                jobs: HashMap::new(),
                next_token: 0,
            })),
        }
    }

    pub fn push<F>(&self, key: K, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.table.lock();
        let token = table.next_token;
        table.next_token = table.next_token.wrapping_add(1);

        let weak = Arc::downgrade(&self.table);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(&weak, &timer_key, token);
        });

        let replaced = table.jobs.insert(
            key,
            Scheduled {
                token,
                timer,
                job: Box::new(job),
            },
        );
        if let Some(previous) = replaced {
            previous.timer.abort();
        }
    }

    /// Runs the pending job for `key` now. Returns `false` if nothing was pending.
    pub fn trigger(&self, key: &K) -> bool {
        let scheduled = self.table.lock().jobs.remove(key);
        match scheduled {
            Some(scheduled) => {
                scheduled.timer.abort();
                (scheduled.job)();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.table.lock().jobs.contains_key(key)
    }

    pub fn ids(&self) -> Vec<K> {
        self.table.lock().jobs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every pending job without running it.
    pub fn dispose(&self) {
        let drained: Vec<Scheduled> = self.table.lock().jobs.drain().map(|(_, job)| job).collect();
        for scheduled in drained {
            scheduled.timer.abort();
        }
    }
}

impl<K> Default for TimedJobList<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for TimedJobList<K> {
    fn drop(&mut self) {
        for (_, scheduled) in self.table.lock().jobs.drain() {
            scheduled.timer.abort();
        }
    }
}

fn fire<K: Eq + Hash>(table: &Weak<Mutex<JobTable<K>>>, key: &K, token: u64) {
    let Some(table) = table.upgrade() else {
        return;
    };
    let job = {
        let mut table = table.lock();
        match table.jobs.get(key) {
            Some(scheduled) if scheduled.token == token => table.jobs.remove(key),
            _ => None,
        }
    };
    if let Some(scheduled) = job {
        (scheduled.job)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_job(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repushing_coalesces_and_restarts_delay() {
        let jobs = TimedJobList::new();
        let runs = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for id in 0..5 {
            let runs = Arc::clone(&runs);
            jobs.push("tab", Duration::from_millis(100), move || runs.lock().push(id));
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        assert!(runs.lock().is_empty());
        assert_eq!(jobs.ids(), vec!["tab"]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*runs.lock(), vec![4]);
        assert!(jobs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_runs_immediately_and_only_once() {
        let jobs = TimedJobList::new();
        let runs = Arc::new(AtomicUsize::new(0));

        jobs.push(7_u64, Duration::from_millis(100), counter_job(&runs));
        assert!(jobs.contains(&7));
        assert!(jobs.trigger(&7));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!jobs.trigger(&7));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let jobs = TimedJobList::new();
        let runs = Arc::new(AtomicUsize::new(0));

        jobs.push(1_u64, Duration::from_millis(100), counter_job(&runs));
        jobs.push(2_u64, Duration::from_millis(100), counter_job(&runs));
        assert_eq!(jobs.len(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_jobs() {
        let jobs = TimedJobList::new();
        let runs = Arc::new(AtomicUsize::new(0));

        jobs.push("terminal", Duration::from_millis(100), counter_job(&runs));
        jobs.dispose();
        assert!(jobs.ids().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
