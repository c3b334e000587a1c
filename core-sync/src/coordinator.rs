//! # Coordinator
//!
//! Generic throttle → queue → drain → retry pipeline shared by auto-sync and
//! auto-export.
//!
//! ## Pipeline
//!
//! 1. [`Coordinator::enqueue`] checks the enabled flag and the handler's
//!    eligibility rule, then puts the event in the queue. A queued event for
//!    the same key has its payload replaced (last write wins) and its
//!    throttle timer restarted.
//! 2. When a throttle timer fires it calls [`Coordinator::process_queue`],
//!    which drains the whole queue snapshot one action at a time.
//! 3. A failed action is re-pushed after `retry_delay * attempt` until
//!    `max_retries` is reached, then recorded as a permanent failure.
//!
//! ## Concurrency
//!
//! Mutable state sits behind a `parking_lot::Mutex` that is never held across
//! an `.await`. Drains are serialized by a `tokio::sync::Mutex<()>`: a
//! `process_queue` call that cannot take it sets a rerun flag and returns,
//! and the running drain makes another pass before releasing.
//!
//! Every queued event carries the epoch it was enqueued in. Disabling the
//! coordinator bumps the epoch, so outcomes of actions that were in flight at
//! that moment are discarded instead of committed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = Coordinator::new(handler, CoordinatorConfig::sync_defaults(), None, clock)?;
//! coordinator.enqueue(ActionKey::new(EntityKind::Note, "n1"), snapshot)?;
//! let status = coordinator.status();
//! ```

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::config::CoordinatorConfig;
use core_runtime::events::{CoordinatorEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::action::{ActionHandler, ActionKey, ActionOutcome, Disposition, QueuedEvent, SkipReason};
use crate::error::{ActionError, Result};
use crate::results::{ActionResult, ResultLog};
use crate::retry::{RetryDecision, RetryPolicy, RetryTracker};
use crate::status::CoordinatorStatus;

struct ScheduledTimer {
    id: u64,
    handle: AbortHandle,
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Throttle,
    Retry,
}

struct State<P> {
    enabled: bool,
    epoch: u64,
    queue: VecDeque<QueuedEvent<P>>,
    throttle_timers: HashMap<String, ScheduledTimer>,
    retry_timers: HashMap<String, ScheduledTimer>,
    next_timer_id: u64,
    retries: RetryTracker,
    results: ResultLog,
    last_action_time: Option<DateTime<Utc>>,
    failed_count: u64,
    is_processing: bool,
    last_error: Option<String>,
    rerun_requested: bool,
}

impl<P> State<P> {
    fn new(config: &CoordinatorConfig) -> Self {
        Self {
            enabled: config.enabled,
            epoch: 0,
            queue: VecDeque::new(),
            throttle_timers: HashMap::new(),
            retry_timers: HashMap::new(),
            next_timer_id: 0,
            retries: RetryTracker::new(RetryPolicy::from_config(config)),
            results: ResultLog::new(config.result_log_capacity),
            last_action_time: None,
            failed_count: 0,
            is_processing: false,
            last_error: None,
            rerun_requested: false,
        }
    }

    /// Outcomes are committed only while enabled and in the same epoch.
    fn accepts(&self, epoch: u64) -> bool {
        self.enabled && self.epoch == epoch
    }

    fn allocate_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    fn timers(&mut self, kind: TimerKind) -> &mut HashMap<String, ScheduledTimer> {
        match kind {
            TimerKind::Throttle => &mut self.throttle_timers,
            TimerKind::Retry => &mut self.retry_timers,
        }
    }

    /// Stores a timer handle, aborting the one it replaces.
    fn store_timer(&mut self, kind: TimerKind, key: String, timer: ScheduledTimer) {
        if let Some(previous) = self.timers(kind).insert(key, timer) {
            previous.handle.abort();
        }
    }

    /// Called by a timer task once it has fired.
    ///
    /// Returns false when the entry now belongs to a newer timer, in which
    /// case the caller must not run.
    fn take_timer(&mut self, kind: TimerKind, key: &str, id: u64) -> bool {
        let timers = self.timers(kind);
        let current = timers.get(key).is_some_and(|timer| timer.id == id);
        if current {
            timers.remove(key);
        }
        current
    }

    fn cancel_timer(&mut self, kind: TimerKind, key: &str) {
        if let Some(timer) = self.timers(kind).remove(key) {
            timer.handle.abort();
        }
    }

    /// Hard reset. Returns the number of queued events dropped.
    fn reset(&mut self) -> usize {
        self.enabled = false;
        self.epoch += 1;

        let dropped = self.queue.len();
        self.queue.clear();
        for (_, timer) in self.throttle_timers.drain() {
            timer.handle.abort();
        }
        for (_, timer) in self.retry_timers.drain() {
            timer.handle.abort();
        }
        self.retries.clear();
        self.is_processing = false;
        self.rerun_requested = false;
        dropped
    }

    /// Consumes the rerun flag after a drain has released the drain lock.
    fn take_rerun(&mut self) -> bool {
        std::mem::take(&mut self.rerun_requested) && self.enabled && !self.queue.is_empty()
    }
}

struct Inner<H: ActionHandler> {
    handler: H,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
    state: Mutex<State<H::Payload>>,
    drain_lock: Arc<AsyncMutex<()>>,
}

/// Throttled, retrying action runner for one handler.
///
/// Cheap to clone; clones share state.
pub struct Coordinator<H: ActionHandler> {
    inner: Arc<Inner<H>>,
}

impl<H: ActionHandler> Clone for Coordinator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ActionHandler> Coordinator<H> {
    /// Creates a coordinator after validating `config`.
    ///
    /// Outcome events are published on `events` when a bus is given.
    pub fn new(
        handler: H,
        config: CoordinatorConfig,
        events: Option<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            coordinator = handler.name(),
            throttle_delay_ms = config.throttle_delay_ms,
            retry_delay_ms = config.retry_delay_ms,
            max_retries = config.max_retries,
            enabled = config.enabled,
            "Coordinator created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(&config)),
                handler,
                config,
                clock,
                events,
                drain_lock: Arc::new(AsyncMutex::new(())),
            }),
        })
    }

    pub fn name(&self) -> &'static str {
        self.inner.handler.name()
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Queues `payload` under `key` and (re)starts the key's throttle timer.
    ///
    /// Disabled coordinators and ineligible payloads are rejected here and
    /// never reach the queue. Must be called from within a tokio runtime.
    pub fn enqueue(&self, key: ActionKey, payload: H::Payload) -> std::result::Result<(), SkipReason> {
        let handler = &self.inner.handler;
        let mut state = self.inner.state.lock();

        if !state.enabled {
            trace!(coordinator = handler.name(), key = %key, "Coordinator disabled, ignoring event");
            return Err(SkipReason::Disabled);
        }
        if let Err(reason) = handler.check_eligible(&key, &payload) {
            debug!(coordinator = handler.name(), key = %key, reason = %reason, "Event not eligible");
            return Err(reason);
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!(coordinator = handler.name(), key = %key, "Event scheduled outside a tokio runtime");
                return Err(SkipReason::RuntimeUnavailable);
            }
        };

        let key_str = key.to_string();
        let event = QueuedEvent::new(key, payload, self.inner.clock.now(), state.epoch);

        state.cancel_timer(TimerKind::Throttle, &key_str);
        match state.queue.iter().position(|queued| queued.key == event.key) {
            Some(index) => {
                trace!(coordinator = handler.name(), key = %key_str, "Replacing queued payload");
                state.queue[index] = event;
            }
            None => state.queue.push_back(event),
        }

        let timer_id = state.allocate_timer_id();
        let delay = self.inner.config.throttle_delay();
        let coordinator = self.clone();
        let timer_key = key_str.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !coordinator
                .inner
                .state
                .lock()
                .take_timer(TimerKind::Throttle, &timer_key, timer_id)
            {
                return;
            }
            coordinator.process_queue().await;
        });
        state.store_timer(
            TimerKind::Throttle,
            key_str.clone(),
            ScheduledTimer {
                id: timer_id,
                handle: task.abort_handle(),
            },
        );

        debug!(
            coordinator = handler.name(),
            key = %key_str,
            pending = state.queue.len(),
            delay_ms = self.inner.config.throttle_delay_ms,
            "Event queued"
        );
        Ok(())
    }

    /// Drains the queue, one action at a time.
    ///
    /// Returns immediately if another drain holds the lock; that drain will
    /// pick up anything queued in the meantime.
    #[instrument(skip(self), fields(coordinator = self.inner.handler.name()))]
    pub async fn process_queue(&self) {
        loop {
            let (guard, batch, epoch) = {
                let mut state = self.inner.state.lock();
                let guard = match Arc::clone(&self.inner.drain_lock).try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        trace!("Drain in progress, requesting another pass");
                        state.rerun_requested = true;
                        return;
                    }
                };
                if !state.enabled || state.queue.is_empty() {
                    return;
                }
                state.is_processing = true;
                let batch: Vec<_> = state.queue.drain(..).collect();
                (guard, batch, state.epoch)
            };

            debug!(batch_size = batch.len(), "Draining queue");
            for event in batch {
                self.run_action(event).await;
            }

            let rerun = {
                let mut state = self.inner.state.lock();
                if state.epoch == epoch {
                    state.is_processing = false;
                    state.last_action_time = Some(self.inner.clock.now());
                }
                drop(guard);
                state.take_rerun()
            };
            if !rerun {
                break;
            }
        }
    }

    /// Runs an action for `key` right away, bypassing the throttle.
    ///
    /// Waits for any in-progress drain to finish first. A failure still goes
    /// through the retry policy.
    #[instrument(skip(self, key, payload), fields(coordinator = self.inner.handler.name(), key = %key))]
    pub async fn trigger_manual(&self, key: ActionKey, payload: H::Payload) -> Disposition {
        let event = {
            let state = self.inner.state.lock();
            if !state.enabled {
                debug!("Manual trigger ignored, coordinator disabled");
                return Disposition::Skipped(SkipReason::Disabled);
            }
            QueuedEvent::new(key, payload, self.inner.clock.now(), state.epoch)
        };

        let guard = Arc::clone(&self.inner.drain_lock).lock_owned().await;
        let epoch = event.epoch;
        {
            let mut state = self.inner.state.lock();
            if state.accepts(epoch) {
                state.is_processing = true;
            }
        }

        info!("Manual trigger");
        let disposition = self.run_action(event).await;

        let rerun = {
            let mut state = self.inner.state.lock();
            if state.epoch == epoch {
                state.is_processing = false;
                state.last_action_time = Some(self.inner.clock.now());
            }
            drop(guard);
            state.take_rerun()
        };
        if rerun {
            self.process_queue().await;
        }
        disposition
    }

    /// Enables the coordinator, or disables it with a hard reset.
    ///
    /// Disabling drops the queue, aborts every throttle and retry timer,
    /// clears retry counters and invalidates in-flight actions.
    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            let mut state = self.inner.state.lock();
            if !state.enabled {
                state.enabled = true;
                info!(coordinator = self.name(), "Coordinator enabled");
            }
            return;
        }

        let dropped = self.inner.state.lock().reset();
        info!(coordinator = self.name(), dropped, "Coordinator disabled");
        self.publish(CoordinatorEvent::Reset {
            coordinator: self.name().to_string(),
            dropped,
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    pub fn status(&self) -> CoordinatorStatus {
        let state = self.inner.state.lock();
        CoordinatorStatus {
            is_enabled: state.enabled,
            last_action_time: state.last_action_time,
            pending_count: state.queue.len(),
            failed_count: state.failed_count,
            is_processing: state.is_processing,
            last_error: state.last_error.clone(),
        }
    }

    /// All logged results, newest first.
    pub fn results(&self) -> Vec<ActionResult> {
        self.inner.state.lock().results.all()
    }

    pub fn recent_results(&self, limit: usize) -> Vec<ActionResult> {
        self.inner.state.lock().results.recent(limit)
    }

    pub fn failed_results(&self) -> Vec<ActionResult> {
        self.inner.state.lock().results.failed()
    }

    /// Empties the result log and resets the error fields.
    ///
    /// Queued events and retry counters are left alone.
    pub fn clear_results(&self) {
        let mut state = self.inner.state.lock();
        state.results.clear();
        state.failed_count = 0;
        state.last_error = None;
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Throttle and retry timers that have not fired yet.
    pub fn scheduled_timer_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.throttle_timers.len() + state.retry_timers.len()
    }

    pub fn retry_attempts(&self, key: &ActionKey) -> u32 {
        self.inner.state.lock().retries.attempts(&key.to_string())
    }

    async fn run_action(&self, event: QueuedEvent<H::Payload>) -> Disposition {
        let handler = &self.inner.handler;

        if !self.inner.state.lock().accepts(event.epoch) {
            return Disposition::Discarded;
        }
        if let Err(reason) = handler.check_eligible(&event.key, &event.payload) {
            return self.skip(&event, reason);
        }

        // The readiness probe talks to the provider too, so it shares the deadline.
        let timeout = self.inner.config.action_timeout();
        let ready = tokio::time::timeout(timeout, handler.check_ready(&event.payload)).await;
        match ready {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return self.skip(&event, reason),
            Err(_) => {
                let err = ActionError::Timeout(self.inner.config.action_timeout_ms);
                return self.commit_failure(event, err);
            }
        }
        if !self.inner.state.lock().accepts(event.epoch) {
            return Disposition::Discarded;
        }

        let result = match tokio::time::timeout(timeout, handler.perform(&event.key, &event.payload)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.inner.config.action_timeout_ms)),
        };

        match result {
            Ok(outcome) => self.commit_success(&event, outcome),
            Err(err) => self.commit_failure(event, err),
        }
    }

    /// Skips `event`. A skipped retry ends the retry chain, so its counter
    /// is dropped and the next save starts from attempt 1.
    fn skip(&self, event: &QueuedEvent<H::Payload>, reason: SkipReason) -> Disposition {
        let key_str = event.key.to_string();
        {
            let mut state = self.inner.state.lock();
            if !state.accepts(event.epoch) {
                return Disposition::Discarded;
            }
            let dropped = state.retries.reset(&key_str);
            if dropped > 0 {
                debug!(key = %key_str, attempts = dropped, "Retry chain ended by skip");
            }
        }
        debug!(key = %key_str, reason = %reason, "Skipping action");
        Disposition::Skipped(reason)
    }

    fn commit_success(&self, event: &QueuedEvent<H::Payload>, outcome: ActionOutcome) -> Disposition {
        let key_str = event.key.to_string();
        let retry_count = {
            let mut state = self.inner.state.lock();
            if !state.accepts(event.epoch) {
                debug!(key = %key_str, "Discarding outcome from a previous epoch");
                return Disposition::Discarded;
            }
            let retry_count = state.retries.on_success(&key_str);
            // A pending retry would re-run an older payload.
            state.cancel_timer(TimerKind::Retry, &key_str);
            state.results.push(ActionResult::success(
                &event.key,
                outcome.target.clone(),
                outcome.location.clone(),
                retry_count,
                self.inner.clock.now(),
            ));
            retry_count
        };

        info!(
            key = %key_str,
            target = %outcome.target,
            location = outcome.location.as_deref().unwrap_or(""),
            retry_count,
            "Action succeeded"
        );
        self.publish(CoordinatorEvent::ActionSucceeded {
            coordinator: self.name().to_string(),
            key: key_str,
            target: outcome.target,
            retry_count,
        });
        Disposition::Succeeded { retry_count }
    }

    fn commit_failure(&self, event: QueuedEvent<H::Payload>, err: ActionError) -> Disposition {
        let key_str = event.key.to_string();
        let message = err.to_string();
        let target = self.inner.handler.target(&event.payload);

        let (disposition, notification) = {
            let mut state = self.inner.state.lock();
            if !state.accepts(event.epoch) {
                debug!(key = %key_str, error = %message, "Discarding failure from a previous epoch");
                return Disposition::Discarded;
            }
            state.last_error = Some(format!("{}: {}", key_str, message));

            match state.retries.on_failure(&key_str) {
                RetryDecision::Retry { attempt, delay } => {
                    self.schedule_retry(&mut state, event, delay);
                    (
                        Disposition::RetryScheduled { attempt, delay },
                        CoordinatorEvent::RetryScheduled {
                            coordinator: self.name().to_string(),
                            key: key_str.clone(),
                            attempt,
                            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            message: message.clone(),
                        },
                    )
                }
                RetryDecision::GiveUp { retry_count } => {
                    state.results.push(ActionResult::failure(
                        &event.key,
                        target,
                        message.clone(),
                        retry_count,
                        self.inner.clock.now(),
                    ));
                    state.failed_count += 1;
                    (
                        Disposition::Failed { retry_count },
                        CoordinatorEvent::ActionFailed {
                            coordinator: self.name().to_string(),
                            key: key_str.clone(),
                            message: message.clone(),
                            retry_count,
                        },
                    )
                }
            }
        };

        match &disposition {
            Disposition::RetryScheduled { attempt, delay } => warn!(
                key = %key_str,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Action failed, retry scheduled"
            ),
            Disposition::Failed { retry_count } => error!(
                key = %key_str,
                retry_count,
                error = %message,
                "Action failed permanently"
            ),
            _ => {}
        }
        self.publish(notification);
        disposition
    }

    /// Re-pushes `event` after `delay`, then drains.
    fn schedule_retry(&self, state: &mut State<H::Payload>, event: QueuedEvent<H::Payload>, delay: Duration) {
        let key_str = event.key.to_string();
        let timer_id = state.allocate_timer_id();
        let coordinator = self.clone();
        let timer_key = key_str.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = coordinator.inner.state.lock();
                if !state.take_timer(TimerKind::Retry, &timer_key, timer_id) || !state.accepts(event.epoch) {
                    return;
                }
                if state.queue.iter().any(|queued| queued.key == event.key) {
                    debug!(key = %timer_key, "Newer event already queued, dropping retry payload");
                } else {
                    state.queue.push_back(event);
                }
            }
            coordinator.process_queue().await;
        });

        state.store_timer(
            TimerKind::Retry,
            key_str,
            ScheduledTimer {
                id: timer_id,
                handle: task.abort_handle(),
            },
        );
    }

    fn publish(&self, event: CoordinatorEvent) {
        if let Some(bus) = &self.inner.events {
            bus.emit(CoreEvent::Coordinator(event));
        }
    }
}
