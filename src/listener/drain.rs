/*
 * Copyright 2021 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Graceful retirement of listeners that were removed or replaced.
//!
//! A retired listener stops accepting before it is handed over, then stays
//! [`ListenerState::Draining`] until its last connection closes or its drain
//! deadline passes. At the deadline, or on a failed health check for
//! [`DrainType::Default`] listeners, the remaining connections are signalled
//! [`ListenerState::Closing`], and the listener is closed once they are gone.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::watch, time::Instant};
use tracing_futures::Instrument;

use crate::config::DrainType;

/// Lifecycle of a listener instance. States only ever advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerState {
    Active,
    Draining,
    /// The drain deadline passed, or health failed, and open connections are
    /// being closed.
    Closing,
    Closed,
}

/// Sender side of a listener's [`ListenerState`].
#[derive(Debug)]
pub(crate) struct StateTx(watch::Sender<ListenerState>);

impl StateTx {
    pub(crate) fn new() -> Self {
        Self(watch::channel(ListenerState::Active).0)
    }

    /// Moves to `state` unless the listener is already at or past it.
    pub(crate) fn advance(&self, state: ListenerState) -> bool {
        self.0.send_if_modified(|current| {
            if state > *current {
                *current = state;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn get(&self) -> ListenerState {
        *self.0.borrow()
    }

    pub(crate) fn signal(&self) -> DrainSignal {
        DrainSignal(self.0.subscribe())
    }
}

/// Lets a connection observe the drain state of the listener that accepted
/// it.
#[derive(Clone, Debug)]
pub struct DrainSignal(watch::Receiver<ListenerState>);

impl DrainSignal {
    pub fn state(&self) -> ListenerState {
        *self.0.borrow()
    }

    pub fn is_draining(&self) -> bool {
        self.state() >= ListenerState::Draining
    }

    /// Resolves once the listener has started draining. Connections should
    /// finish their current work and close.
    pub async fn draining(&mut self) {
        self.wait_for(ListenerState::Draining).await
    }

    /// Resolves once open connections are being forcibly closed.
    pub async fn closing(&mut self) {
        self.wait_for(ListenerState::Closing).await
    }

    /// Resolves once the listener reached `state`.
    pub async fn wait_for(&mut self, state: ListenerState) {
        // The sender is only dropped with the listener, which is then closed.
        let _ = self.0.wait_for(|current| *current >= state).await;
    }
}

/// Counts the open connections of one listener instance.
#[derive(Debug)]
pub(crate) struct Connections {
    open: watch::Sender<usize>,
    gauge: prometheus::IntGauge,
}

impl Connections {
    pub(crate) fn new(listener: &str) -> Arc<Self> {
        Arc::new(Self {
            open: watch::channel(0).0,
            gauge: crate::metrics::active_connections(listener),
        })
    }

    pub(crate) fn open(self: &Arc<Self>) -> ConnectionGuard {
        self.open.send_modify(|open| *open += 1);
        self.gauge.inc();
        ConnectionGuard(self.clone())
    }

    pub(crate) fn count(&self) -> usize {
        *self.open.borrow()
    }

    pub(crate) async fn idle(&self) {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open == 0).await;
    }
}

/// Keeps a connection counted as open until dropped.
#[derive(Debug)]
pub struct ConnectionGuard(Arc<Connections>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.open.send_modify(|open| *open = open.saturating_sub(1));
        self.0.gauge.dec();
    }
}

/// What the coordinator needs from a retired listener. The listener has
/// already stopped accepting when it is handed over.
pub(crate) trait Retired: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn drain_type(&self) -> DrainType;
    fn state(&self) -> &StateTx;
    fn connections(&self) -> &Arc<Connections>;
}

/// A snapshot of one draining listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrainingListener {
    pub name: String,
    pub drain_type: DrainType,
    pub state: ListenerState,
    pub connections_remaining: usize,
    pub drain_deadline: Instant,
}

struct Entry {
    listener: Arc<dyn Retired>,
    deadline: Instant,
}

/// Owns every retired listener until it is closed.
pub struct DrainCoordinator {
    timeout: Duration,
    health_failed: watch::Sender<bool>,
    draining: parking_lot::Mutex<HashMap<u64, Entry>>,
    remaining: watch::Sender<usize>,
    next_id: AtomicU64,
}

impl DrainCoordinator {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            health_failed: watch::channel(false).0,
            draining: <_>::default(),
            remaining: watch::channel(0).0,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Takes sole ownership of `listener`, moves it to draining and closes
    /// it once it has no connections left or its deadline passes.
    pub(crate) fn begin_drain(self: &Arc<Self>, listener: Arc<dyn Retired>) {
        listener.state().advance(ListenerState::Draining);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.timeout;
        self.draining.lock().insert(
            id,
            Entry {
                listener: listener.clone(),
                deadline,
            },
        );
        self.remaining.send_modify(|remaining| *remaining += 1);
        crate::metrics::draining_listeners().inc();

        tracing::info!(
            listener = %listener.name(),
            connections = listener.connections().count(),
            timeout = ?self.timeout,
            "draining listener"
        );

        let coordinator = self.clone();
        let mut health_failed = self.health_failed.subscribe();
        let span = tracing::debug_span!("drain", listener = %listener.name());
        tokio::spawn(
            async move {
                let accelerate = async {
                    match listener.drain_type() {
                        DrainType::Default => {
                            let _ = health_failed.wait_for(|failed| *failed).await;
                        }
                        DrainType::ModifyOnly => std::future::pending().await,
                    }
                };

                tokio::select! {
                    _ = listener.connections().idle() => {
                        tracing::debug!("all connections closed");
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::info!(
                            connections = listener.connections().count(),
                            "drain deadline reached, closing remaining connections"
                        );
                    }
                    _ = accelerate => {
                        tracing::info!(
                            connections = listener.connections().count(),
                            "health check failed, closing remaining connections"
                        );
                    }
                }

                if listener.state().advance(ListenerState::Closing) {
                    // connections drop themselves on the signal
                    listener.connections().idle().await;
                }
                listener.state().advance(ListenerState::Closed);
                coordinator.finish(id);
            }
            .instrument(span),
        );
    }

    fn finish(&self, id: u64) {
        if self.draining.lock().remove(&id).is_some() {
            self.remaining.send_modify(|remaining| *remaining -= 1);
            crate::metrics::draining_listeners().dec();
        }
    }

    /// Accelerates every draining [`DrainType::Default`] listener, and every
    /// one retired afterwards, to closing its connections.
    pub fn fail_health(&self) {
        if self.health_failed.send_if_modified(|failed| !std::mem::replace(failed, true)) {
            tracing::warn!("health check failed, accelerating drains");
        }
    }

    pub fn health_failed(&self) -> bool {
        *self.health_failed.borrow()
    }

    /// The listeners currently draining.
    pub fn draining(&self) -> Vec<DrainingListener> {
        let mut listeners = self
            .draining
            .lock()
            .values()
            .map(|entry| DrainingListener {
                name: entry.listener.name().to_owned(),
                drain_type: entry.listener.drain_type(),
                state: entry.listener.state().get(),
                connections_remaining: entry.listener.connections().count(),
                drain_deadline: entry.deadline,
            })
            .collect::<Vec<_>>();
        listeners.sort_by(|a, b| a.drain_deadline.cmp(&b.drain_deadline));
        listeners
    }

    /// Resolves once no listener is draining.
    pub async fn all_closed(&self) {
        let mut remaining = self.remaining.subscribe();
        let _ = remaining.wait_for(|remaining| *remaining == 0).await;
    }
}
