//! Bounded worker pool that runs submitted requests in FIFO order.
//!
//! A request that cannot claim an idle worker at submit time gets a queue
//! deadline of `max_queue_time`; if no worker picks it up by then it is
//! failed with `QueueTimeout`. A worker is claimed as soon as it pops a
//! request, so a burst of submissions before any worker runs still counts
//! every queued request ahead. Stopping the scheduler fails everything
//! still queued with `CoreShutdown`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use genomen_common::SchedulerConfig;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;
use crate::request::{AnalysisRequest, ErrorKind, RequestError};

struct Queued {
    request: Arc<AnalysisRequest>,
    deadline: Option<Instant>,
}

struct Shared {
    queue: Mutex<VecDeque<Queued>>,
    wakeup: Notify,
    accepting: AtomicBool,
    busy: AtomicUsize,
    workers: usize,
    max_queue_time: Duration,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Queued>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next request that may still run, failing expired ones. The
    /// caller owns one `busy` slot for the returned request and must
    /// release it with [`Shared::release`].
    fn pop(&self) -> Option<Arc<AnalysisRequest>> {
        let now = Instant::now();
        let mut queue = self.queue();
        while let Some(queued) = queue.pop_front() {
            if queued.deadline.is_some_and(|d| d <= now) {
                queued.request.reject(RequestError::new(ErrorKind::QueueTimeout));
                continue;
            }
            self.busy.fetch_add(1, Ordering::SeqCst);
            return Some(queued.request);
        }
        None
    }

    fn release(&self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
        // Another request may have been queued while this one ran.
        self.wakeup.notify_one();
    }

    /// Fail every queued request whose deadline has passed.
    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut queue = self.queue();
        let before = queue.len();
        queue.retain(|queued| {
            let expired = queued.deadline.is_some_and(|d| d <= now);
            if expired {
                queued.request.reject(RequestError::new(ErrorKind::QueueTimeout));
            }
            !expired
        });
        before - queue.len()
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
    orchestrator: Orchestrator,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator, config: &SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                wakeup: Notify::new(),
                accepting: AtomicBool::new(false),
                busy: AtomicUsize::new(0),
                workers: config.max_concurrent_requests.max(1),
                max_queue_time: config.max_queue_time(),
            }),
            orchestrator,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue().len()
    }

    /// Spawn the workers and accept requests. Calling it on a running
    /// scheduler does nothing.
    pub fn start(&self) {
        let mut handles = self.handles();
        if self.shared.accepting.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(false);
        for worker in 0..self.shared.workers {
            let shared = self.shared.clone();
            let orchestrator = self.orchestrator.clone();
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(worker_loop(worker, shared, orchestrator, shutdown)));
        }
        info!(workers = self.shared.workers, "Scheduler started");
    }

    /// Queue a request. A stopped scheduler fails it with `CoreShutdown`.
    pub fn submit(&self, request: Arc<AnalysisRequest>) {
        let deadline = {
            // Checked under the queue lock so `stop` cannot drain in between.
            let mut queue = self.shared.queue();
            if !self.shared.accepting.load(Ordering::SeqCst) {
                debug!(request = %request.name(), "Rejecting request, scheduler stopped");
                request.reject(RequestError::new(ErrorKind::CoreShutdown));
                return;
            }
            let claimed = self.shared.busy.load(Ordering::SeqCst) + queue.len();
            let saturated = claimed >= self.shared.workers;
            let deadline = saturated.then(|| Instant::now() + self.shared.max_queue_time);
            queue.push_back(Queued { request, deadline });
            deadline
        };

        if let Some(deadline) = deadline {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let evicted = shared.evict_expired();
                if evicted > 0 {
                    warn!(evicted, "Requests timed out in queue");
                }
            });
        }
        self.shared.wakeup.notify_one();
    }

    /// Stop accepting, fail everything still queued, and wait for running
    /// requests to finish.
    pub async fn stop(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);

        let drained: Vec<Queued> = self.shared.queue().drain(..).collect();
        for queued in &drained {
            queued.request.shut_down();
        }
        if !drained.is_empty() {
            info!(drained = drained.len(), "Cancelled queued requests");
        }

        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.handles().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn worker_loop(
    worker: usize,
    shared: Arc<Shared>,
    orchestrator: Orchestrator,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(request) = shared.pop() else {
            tokio::select! {
                _ = shared.wakeup.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        if request.is_cancelled() {
            debug!(worker, request = %request.name(), "Skipping cancelled request");
        } else if !shared.accepting.load(Ordering::SeqCst) {
            request.shut_down();
        } else {
            orchestrator.run(&request).await;
        }
        shared.release();
    }
    debug!(worker, "Worker stopped");
}
