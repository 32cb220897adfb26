//! Schedulers that hold suspended invocations until they are due
//!
//! [`TickScheduler`] keeps a logical clock advanced by the host tick loop
//! and hands due continuations back in due order. [`TokioScheduler`] uses
//! tokio timers and delivers continuations through an mpsc channel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::executor::Continuation;

pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Hand `continuation` back once `delay` has elapsed
    fn schedule_delayed(&self, continuation: Continuation, delay: Duration);

    /// Hand `continuation` back to run on a worker
    fn schedule_async(&self, continuation: Continuation);

    /// Move the clock forward and return every continuation now due
    fn advance(&self, _elapsed: Duration) -> Vec<Continuation> {
        Vec::new()
    }

    /// Continuations waiting to be handed back
    fn pending(&self) -> usize;

    /// Drop every pending continuation, returning how many were dropped
    fn clear(&self) -> usize;
}

#[derive(Default)]
struct TickState {
    now: Duration,
    seq: u64,
    queue: BTreeMap<(Duration, u64), Continuation>,
}

/// Deterministic scheduler driven by [`Scheduler::advance`]
///
/// Continuations due at the same time come back in scheduling order.
#[derive(Default)]
pub struct TickScheduler {
    state: Mutex<TickState>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the logical clock
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn push(&self, continuation: Continuation, delay: Duration) {
        let mut state = self.state.lock();
        let due = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        trace!(invocation = continuation.id(), ?due, "Scheduled continuation");
        state.queue.insert((due, seq), continuation);
    }
}

impl Scheduler for TickScheduler {
    fn schedule_delayed(&self, continuation: Continuation, delay: Duration) {
        self.push(continuation, delay);
    }

    fn schedule_async(&self, mut continuation: Continuation) {
        continuation.worker = true;
        self.push(continuation, Duration::ZERO);
    }

    fn advance(&self, elapsed: Duration) -> Vec<Continuation> {
        let mut state = self.state.lock();
        state.now += elapsed;
        let now = state.now;
        let later = state.queue.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut state.queue, later);
        due.into_values().collect()
    }

    fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TickScheduler")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

/// Scheduler backed by tokio timers
///
/// Due continuations arrive on the receiver returned by [`TokioScheduler::new`];
/// the host resumes them, on a blocking worker when `worker` is set.
/// Scheduling requires a running tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    sender: mpsc::UnboundedSender<Continuation>,
    pending: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Continuation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            sender,
            pending: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (scheduler, receiver)
    }

    fn deliver(&self, continuation: Continuation) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.sender.send(continuation) {
            debug!(invocation = e.0.id(), "Continuation receiver is gone");
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_delayed(&self, continuation: Continuation, delay: Duration) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(invocation = continuation.id(), error = %e, "No runtime to schedule on");
                return;
            }
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        let scheduler = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.pending.fetch_sub(1, Ordering::SeqCst);
            scheduler.deliver(continuation);
        });
    }

    fn schedule_async(&self, mut continuation: Continuation) {
        continuation.worker = true;
        self.deliver(continuation);
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Sleeping continuations are dropped when they wake
    fn clear(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{Trigger, TriggerEvent};
    use sk_syntax::{EventMatcher, ExecutionContext};

    fn continuation(label: &str) -> Continuation {
        let trigger = Arc::new(Trigger::new(
            label,
            "test",
            1,
            TriggerEvent::Event(EventMatcher::new("test", "test")),
            Vec::new(),
        ));
        Continuation::start(trigger, ExecutionContext::detached(label))
    }

    fn names(continuations: &[Continuation]) -> Vec<&str> {
        continuations.iter().map(|c| c.trigger.name.as_str()).collect()
    }

    #[test]
    fn test_tick_scheduler_orders_by_due_time() {
        let scheduler = TickScheduler::new();
        scheduler.schedule_delayed(continuation("late"), Duration::from_millis(200));
        scheduler.schedule_delayed(continuation("early"), Duration::from_millis(100));
        scheduler.schedule_delayed(continuation("early too"), Duration::from_millis(100));
        assert_eq!(scheduler.pending(), 3);

        assert!(scheduler.advance(Duration::from_millis(50)).is_empty());
        let due = scheduler.advance(Duration::from_millis(50));
        assert_eq!(names(&due), vec!["early", "early too"]);
        assert_eq!(scheduler.now(), Duration::from_millis(100));

        let due = scheduler.advance(Duration::from_millis(150));
        assert_eq!(names(&due), vec!["late"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_tick_scheduler_async_runs_next_tick_on_worker() {
        let scheduler = TickScheduler::new();
        scheduler.schedule_async(continuation("io"));
        let due = scheduler.advance(Duration::ZERO);
        assert_eq!(due.len(), 1);
        assert!(due[0].worker);
    }

    #[test]
    fn test_tick_scheduler_clear() {
        let scheduler = TickScheduler::new();
        scheduler.schedule_delayed(continuation("a"), Duration::from_secs(1));
        scheduler.schedule_delayed(continuation("b"), Duration::from_secs(2));
        assert_eq!(scheduler.clear(), 2);
        assert!(scheduler.advance(Duration::from_secs(5)).is_empty());
    }

    #[tokio::test]
    async fn test_tokio_scheduler_delivers_after_delay() {
        let (scheduler, mut receiver) = TokioScheduler::new();
        scheduler.schedule_delayed(continuation("later"), Duration::from_millis(20));
        scheduler.schedule_async(continuation("now"));

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.trigger.name, "now");
        assert!(first.worker);

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.trigger.name, "later");
        assert!(!second.worker);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_clear_drops_sleepers() {
        let (scheduler, mut receiver) = TokioScheduler::new();
        scheduler.schedule_delayed(continuation("dropped"), Duration::from_millis(10));
        assert_eq!(scheduler.clear(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.try_recv().is_err());
    }
}
