// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Tokio driver for a [`SpellRegistry`].
//!
//! This module is only compiled when the `async` feature flag is enabled.
//!
//! # Design
//!
//! [`SpellRuntime`] owns one timer task and one worker task per active
//! spell:
//!
//! 1. The timer task sleeps until the earliest armed deadline (capped at
//!    `idle_wakeup_ms`), pops every due timer and queues it on the owning
//!    spell's worker.  The registry's wake hook interrupts the sleep when
//!    timers are armed or disarmed.
//! 2. Each spell's worker drains its queue in order, running every job on
//!    the blocking pool.  Jobs for one spell never overlap; jobs for
//!    different spells run in parallel.
//! 3. Peer and block events are routed synchronously and queued the same
//!    way.
//! 4. Removing a spell drops its queue through the registry's removal hook;
//!    the worker finishes the jobs already queued and exits.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use spellbook_core::config::EngineConfig;
//! use spellbook_core::registry::SpellRegistry;
//! use spellbook_core::runner::NoopRunner;
//! use spellbook_core::runtime::SpellRuntime;
//! use spellbook_core::trigger::TriggerConfigInput;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner)));
//!     let runtime = SpellRuntime::start(Arc::clone(&registry));
//!
//!     registry.install("worker", "(null)", &TriggerConfigInput::periodic(0, 5), &[]).unwrap();
//!     tokio::time::sleep(std::time::Duration::from_secs(11)).await;
//!
//!     runtime.shutdown().await;
//! }
//! ```

#![cfg(feature = "async")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hashbrown::HashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SpellError;
use crate::registry::{lock, SpellRegistry};
use crate::router::PeerEvent;
use crate::scheduler::DueTimer;
use crate::storage::Storage;
use crate::types::{BlockTrigger, SpellId, TriggerPayload};

enum Job {
    Timer(DueTimer),
    Event(TriggerPayload),
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Dispatcher<S: Storage + 'static> {
    registry: Arc<SpellRegistry<S>>,
    handle: Handle,
    queues: Mutex<HashMap<SpellId, UnboundedSender<Job>>>,
    /// Worker tasks that have not returned yet.
    workers: AtomicUsize,
}

impl<S: Storage + 'static> Dispatcher<S> {
    /// Queue `job` on the worker of `id`, starting one if needed.
    fn enqueue(self: &Arc<Self>, id: SpellId, job: Job) {
        let mut queues = lock(&self.queues);
        let job = match queues.get(&id) {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(job).is_err() {
            return;
        }
        queues.insert(id.clone(), tx);
        self.workers.fetch_add(1, Ordering::SeqCst);
        debug!(spell_id = %id, "spell worker started");
        self.handle.spawn(Arc::clone(self).drain(id, rx));
    }

    async fn drain(self: Arc<Self>, id: SpellId, mut rx: UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            let dispatcher = Arc::clone(&self);
            let spell_id = id.clone();
            let outcome = tokio::task::spawn_blocking(move || dispatcher.run(&spell_id, job)).await;
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(err)) if err.is_not_found() => break,
                Ok(Err(err)) => warn!(spell_id = %id, error = %err, "spell job failed"),
                Err(err) => warn!(spell_id = %id, error = %err, "spell job aborted"),
            }
        }
        drop(rx);

        let mut queues = lock(&self.queues);
        if queues.get(&id).is_some_and(|tx| tx.is_closed()) {
            queues.remove(&id);
        }
        drop(queues);
        self.workers.fetch_sub(1, Ordering::SeqCst);
        debug!(spell_id = %id, "spell worker stopped");
    }

    /// Drop the queue of a removed spell so its worker runs dry.
    fn retire(&self, id: &SpellId) {
        if lock(&self.queues).remove(id).is_some() {
            debug!(spell_id = %id, "spell queue closed");
        }
    }

    fn run(&self, id: &SpellId, job: Job) -> Result<bool, SpellError> {
        match job {
            Job::Timer(due)      => self.registry.fire_timer(&due),
            Job::Event(payload)  => self.registry.deliver(id, payload),
        }
    }

    fn sleep_budget(&self, idle: Duration) -> Duration {
        match self.registry.next_timer_deadline_sec() {
            Some(deadline_sec) => {
                let now_ms = self.registry.clock().now_ms();
                let wait_ms = deadline_sec.saturating_mul(1_000).saturating_sub(now_ms);
                Duration::from_millis(wait_ms).min(idle)
            }
            None => idle,
        }
    }
}

async fn timer_loop<S: Storage + 'static>(
    dispatcher: Arc<Dispatcher<S>>,
    notify: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let idle = Duration::from_millis(dispatcher.registry.config().idle_wakeup_ms);
    info!(idle_ms = idle.as_millis() as u64, "spell timer loop started");

    loop {
        for due in dispatcher.registry.take_due_timers() {
            dispatcher.enqueue(due.spell_id.clone(), Job::Timer(due));
        }

        tokio::select! {
            _ = tokio::time::sleep(dispatcher.sleep_budget(idle)) => {}
            _ = notify.notified() => {
                debug!("armed timers changed");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("spell timer loop stopped");
}

// ---------------------------------------------------------------------------
// SpellRuntime
// ---------------------------------------------------------------------------

/// Running driver for a shared [`SpellRegistry`].
pub struct SpellRuntime<S: Storage + 'static> {
    dispatcher: Arc<Dispatcher<S>>,
    shutdown: watch::Sender<bool>,
    timer_task: JoinHandle<()>,
}

impl<S: Storage + 'static> SpellRuntime<S> {
    /// Start driving `registry` on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(registry: Arc<SpellRegistry<S>>) -> Self {
        let notify = Arc::new(Notify::new());
        let hook = Arc::clone(&notify);
        registry.set_wake_hook(move || hook.notify_one());

        let handle = Handle::current();
        let dispatcher = Arc::new(Dispatcher {
            registry,
            handle: handle.clone(),
            queues: Mutex::new(HashMap::new()),
            workers: AtomicUsize::new(0),
        });
        let weak = Arc::downgrade(&dispatcher);
        dispatcher.registry.set_removal_hook(move |id: &SpellId| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.retire(id);
            }
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let timer_task = handle.spawn(timer_loop(Arc::clone(&dispatcher), notify, shutdown_rx));

        Self {
            dispatcher,
            shutdown,
            timer_task,
        }
    }

    pub fn registry(&self) -> &Arc<SpellRegistry<S>> {
        &self.dispatcher.registry
    }

    /// Per-spell worker tasks currently alive.
    pub fn worker_count(&self) -> usize {
        self.dispatcher.workers.load(Ordering::SeqCst)
    }

    /// Queue a connectivity change for every subscribed spell.  Returns how
    /// many spells it was queued for.
    pub fn peer_event(&self, event: &PeerEvent) -> usize {
        let payload = event.to_payload();
        let targets = self.dispatcher.registry.route_peer_event(event);
        for id in &targets {
            self.dispatcher.enqueue(id.clone(), Job::Event(payload.clone()));
        }
        targets.len()
    }

    /// Queue a new block height for every spell whose window covers it.
    pub fn block(&self, height: u64) -> usize {
        let payload = TriggerPayload::Blockchain(BlockTrigger { height });
        let targets = self.dispatcher.registry.route_block(height);
        for id in &targets {
            self.dispatcher.enqueue(id.clone(), Job::Event(payload.clone()));
        }
        targets.len()
    }

    /// Stop the timer task.  Jobs already queued still run.
    pub async fn shutdown(self) {
        self.dispatcher.registry.clear_wake_hook();
        self.dispatcher.registry.clear_removal_hook();
        let _ = self.shutdown.send(true);
        if let Err(err) = self.timer_task.await {
            warn!(error = %err, "spell timer loop ended abnormally");
        }
        lock(&self.dispatcher.queues).clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::config::EngineConfig;
    use crate::runner::{runner_fn, Invocation, NoopRunner, ScriptHost};
    use crate::storage::InMemoryStorage;
    use crate::trigger::TriggerConfigInput;

    async fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn periodic_spell_fires_on_wall_clock() {
        let registry = Arc::new(SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner)));
        let runtime = SpellRuntime::start(Arc::clone(&registry));

        let id = registry
            .install("worker", "", &TriggerConfigInput::periodic(0, 1), &[])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        runtime.shutdown().await;

        let events = registry.get_all_trigger_events(&id, 0).unwrap();
        assert!(events.len() >= 2, "only {} events", events.len());
        let stamps: Vec<u64> = events
            .iter()
            .filter_map(|event| event.payload.as_timer().map(|timer| timer.timestamp))
            .collect();
        for pair in stamps.windows(2) {
            assert!((1..=2).contains(&(pair[1] - pair[0])));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn block_events_reach_subscribers_only() {
        let registry = Arc::new(SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner)));
        let runtime = SpellRuntime::start(Arc::clone(&registry));

        let watcher = registry
            .install("worker", "", &TriggerConfigInput::blocks(10, 20), &[])
            .unwrap();
        let idle = registry
            .install("worker", "", &TriggerConfigInput::disabled(), &[])
            .unwrap();

        assert_eq!(runtime.block(9), 0);
        assert_eq!(runtime.block(15), 1);
        assert!(wait_for(|| registry.get_counter(&watcher).unwrap() == 1).await);
        assert_eq!(registry.get_counter(&idle).unwrap(), 0);

        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn removed_spell_releases_its_worker() {
        let registry = Arc::new(SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner)));
        let runtime = SpellRuntime::start(Arc::clone(&registry));

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                registry
                    .install("worker", "", &TriggerConfigInput::disabled().on_connect(), &[])
                    .unwrap(),
            );
        }
        assert_eq!(runtime.peer_event(&PeerEvent::connected("12D3KooWPeer")), 3);
        assert!(wait_for(|| ids.iter().all(|id| registry.get_counter(id).unwrap() == 1)).await);
        assert_eq!(lock(&runtime.dispatcher.queues).len(), 3);
        assert_eq!(runtime.worker_count(), 3);

        for id in &ids {
            registry.remove("worker", id).unwrap();
        }
        assert_eq!(lock(&runtime.dispatcher.queues).len(), 0);
        assert!(wait_for(|| runtime.worker_count() == 0).await);

        runtime.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_spell_runs_its_events_in_order() {
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let (active_in, overlap_in) = (Arc::clone(&active), Arc::clone(&overlap));
        let runner = runner_fn(move |_: &Invocation, _: &ScriptHost<'_, InMemoryStorage>| {
            if active_in.fetch_add(1, Ordering::SeqCst) > 0 {
                overlap_in.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(5));
            active_in.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        let registry = Arc::new(SpellRegistry::in_memory(EngineConfig::default(), runner));
        let runtime = SpellRuntime::start(Arc::clone(&registry));

        let id = registry
            .install("worker", "", &TriggerConfigInput::disabled().on_connect(), &[])
            .unwrap();
        for n in 0..10 {
            runtime.peer_event(&PeerEvent::connected(format!("peer-{n}")));
        }

        assert!(wait_for(|| registry.get_counter(&id).unwrap() == 10).await);
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        let peers: Vec<String> = registry
            .get_all_trigger_events(&id, 0)
            .unwrap()
            .iter()
            .filter_map(|event| event.payload.as_peer().map(|peer| peer.peer_id.clone()))
            .collect();
        let expected: Vec<String> = (0..10).map(|n| format!("peer-{n}")).collect();
        assert_eq!(peers, expected);

        runtime.shutdown().await;
    }
}
