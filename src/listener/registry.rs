/*
 * Copyright 2020 Google LLC
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

//! The authoritative set of active listeners.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use arc_swap::ArcSwap;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};
use tracing_futures::Instrument;

use super::{
    drain::{Connections, ConnectionGuard, DrainCoordinator, ListenerState, Retired, StateTx},
    filters::{FilterError, ListenerFilter, ListenerFilterRegistry},
    matcher::{ConnectionInfo, FilterChainMatcher},
    ConnectionHandler, RoutedConnection,
};
use crate::{
    config::{DrainType, Listener, ManagerConfig, ValidationError},
    net::{socket::apply_buffer_limit, BindError, ListenSocket},
    signal::{ShutdownKind, ShutdownRx},
};

type ListenerMap = HashMap<String, Arc<ActiveListener>>;

/// What [`ListenerManager::upsert`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Modified,
    /// The listener is already active with the same configuration.
    Unchanged,
}

impl UpsertOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Failure to create a listener. Any previous listener of the same name
/// keeps running.
#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Bind(#[from] BindError),
}

/// Owns every active listener, replacing them atomically as their
/// configuration changes and handing retired ones to the
/// [`DrainCoordinator`].
pub struct ListenerManager {
    config: ManagerConfig,
    listeners: ArcSwap<ListenerMap>,
    write_lock: tokio::sync::Mutex<()>,
    drain: Arc<DrainCoordinator>,
    handler: Arc<dyn ConnectionHandler>,
    filters: ListenerFilterRegistry,
}

impl ListenerManager {
    pub fn new(config: ManagerConfig, handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            drain: DrainCoordinator::new(config.drain_timeout()),
            config,
            listeners: <_>::default(),
            write_lock: <_>::default(),
            handler,
            filters: <_>::default(),
        }
    }

    /// Replaces the listener filters available to listeners.
    pub fn with_listener_filters(mut self, filters: ListenerFilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn drain_coordinator(&self) -> &Arc<DrainCoordinator> {
        &self.drain
    }

    /// Checks everything about `listener` that does not need a socket.
    pub fn validate(&self, listener: &Listener) -> Result<(), ValidationError> {
        self.filters.create_all(&listener.listener_filters).map(drop)
    }

    /// Adds `listener`, or replaces the listener of the same name.
    ///
    /// The new instance is bound and registered before it is published. The
    /// previous instance stops accepting, is handed to the drain coordinator,
    /// and only then does the new instance start accepting. Connections that
    /// arrive in between wait in the backlog of the shared socket when the
    /// address is unchanged.
    pub async fn upsert(&self, listener: Listener) -> Result<UpsertOutcome, UpsertError> {
        let _write = self.write_lock.lock().await;
        let current = self.listeners.load_full();
        let previous = current.get(&listener.name).cloned();

        if previous
            .as_ref()
            .map_or(false, |previous| *previous.config == listener)
        {
            tracing::trace!(listener = %listener.name, "listener unchanged");
            return Ok(UpsertOutcome::Unchanged);
        }

        let filters = self.filters.create_all(&listener.listener_filters)?;

        let active = match self.build(listener, previous.as_deref(), &current, filters) {
            Ok(active) => Arc::new(active),
            Err(error) => {
                crate::metrics::bind_errors(&error.listener).inc();
                tracing::warn!(listener = %error.listener, error = %error.source, "failed to create listener");
                return Err(error.source.into());
            }
        };

        let mut listeners = ListenerMap::clone(&current);
        listeners.insert(active.name().to_owned(), active.clone());
        let len = listeners.len();
        self.listeners.store(Arc::new(listeners));

        let outcome = match previous {
            Some(previous) => {
                self.retire(previous).await;
                UpsertOutcome::Modified
            }
            None => UpsertOutcome::Added,
        };

        active.start(self.handler.clone());

        for lint in active.matcher.lint() {
            crate::metrics::ambiguous_chains(&lint.listener).inc();
            tracing::warn!(%lint, "ambiguous filter chains");
        }

        crate::metrics::listener_updates(outcome.as_str()).inc();
        crate::metrics::active_listeners().set(len as i64);
        tracing::info!(
            listener = %active.name(),
            address = %active.local_addr,
            outcome = outcome.as_str(),
            "listener applied"
        );

        Ok(outcome)
    }

    fn build(
        &self,
        config: Listener,
        previous: Option<&ActiveListener>,
        current: &ListenerMap,
        filters: Vec<Arc<dyn ListenerFilter>>,
    ) -> Result<ActiveListener, NamedBindError> {
        let address = config.address;
        let named = |source| NamedBindError {
            listener: config.name.clone(),
            source,
        };

        if address.port() != 0 {
            if let Some(owner) = current
                .values()
                .find(|other| other.config.address == address && other.name() != config.name)
            {
                return Err(named(BindError::AddressOwned {
                    address,
                    owner: owner.name().to_owned(),
                }));
            }
        }

        let adopted = previous
            .filter(|previous| {
                previous.config.address == address && previous.config.socket == config.socket
            })
            .and_then(|previous| previous.socket.lock().as_ref().map(ListenSocket::try_clone));

        let socket = match adopted {
            Some(socket) => {
                tracing::debug!(listener = %config.name, %address, "reusing listening socket");
                socket.map_err(|source| named(BindError::Create { address, source }))?
            }
            None => ListenSocket::bind(address, &config.socket).map_err(named)?,
        };

        let local_addr = socket
            .local_addr()
            .map_err(|source| named(BindError::Bind { address, source }))?;
        let tokio_listener = socket
            .try_clone()
            .and_then(ListenSocket::into_tokio)
            .map_err(|source| named(BindError::Register { address, source }))?;

        Ok(ActiveListener {
            matcher: Arc::new(FilterChainMatcher::from_listener(&config)),
            connections: Connections::new(&config.name),
            config: Arc::new(config),
            local_addr,
            filters,
            socket: parking_lot::Mutex::new(Some(socket)),
            pending: parking_lot::Mutex::new(Some(tokio_listener)),
            state: StateTx::new(),
            accept: <_>::default(),
        })
    }

    /// Removes the listener named `name`. It stops accepting immediately and
    /// its open connections are drained.
    pub async fn remove(&self, name: &str) -> bool {
        let _write = self.write_lock.lock().await;
        let current = self.listeners.load_full();
        if !current.contains_key(name) {
            return false;
        }

        let mut listeners = ListenerMap::clone(&current);
        let removed = listeners.remove(name);
        let len = listeners.len();
        self.listeners.store(Arc::new(listeners));

        if let Some(removed) = removed {
            self.retire(removed).await;
        }

        crate::metrics::listener_updates("removed").inc();
        crate::metrics::active_listeners().set(len as i64);
        tracing::info!(listener = %name, "listener removed");
        true
    }

    /// Retires every listener.
    pub async fn drain_all(&self) {
        let _write = self.write_lock.lock().await;
        let listeners = self.listeners.swap(<_>::default());
        crate::metrics::active_listeners().set(0);

        for listener in listeners.values() {
            self.retire(listener.clone()).await;
        }
    }

    /// Marks the process unhealthy, accelerating the drain of listeners with
    /// [`DrainType::Default`].
    pub fn fail_health(&self) {
        self.drain.fail_health();
    }

    async fn retire(&self, listener: Arc<ActiveListener>) {
        listener.stop_accepting().await;
        self.drain.begin_drain(listener);
    }

    /// The filter chains of the listener named `name`, as currently
    /// published.
    pub fn snapshot(&self, name: &str) -> Option<Arc<FilterChainMatcher>> {
        self.listeners
            .load()
            .get(name)
            .map(|listener| listener.matcher.clone())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ActiveListener>> {
        self.listeners.load().get(name).cloned()
    }

    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.listeners.load().get(name).map(|listener| listener.local_addr)
    }

    /// Every active listener, ordered by name.
    pub fn listeners(&self) -> Vec<Arc<ActiveListener>> {
        let mut listeners = self.listeners.load().values().cloned().collect::<Vec<_>>();
        listeners.sort_by(|a, b| a.name().cmp(b.name()));
        listeners
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.load().is_empty()
    }

    /// Waits for `shutdown`, then drains every listener. Unless testing,
    /// resolves once all of them are closed.
    pub async fn run_until_shutdown(&self, mut shutdown: ShutdownRx) -> crate::Result<()> {
        shutdown.changed().await?;
        let kind = *shutdown.borrow();
        tracing::info!(?kind, listeners = self.len(), "draining all listeners");

        self.drain_all().await;
        if kind != ShutdownKind::Testing {
            self.drain.all_closed().await;
        }

        Ok(())
    }
}

struct NamedBindError {
    listener: String,
    source: BindError,
}

struct AcceptTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// One bound listener.
pub struct ActiveListener {
    config: Arc<Listener>,
    local_addr: SocketAddr,
    matcher: Arc<FilterChainMatcher>,
    filters: Vec<Arc<dyn ListenerFilter>>,
    /// Kept so a replacement with the same address can take over the socket.
    socket: parking_lot::Mutex<Option<ListenSocket>>,
    pending: parking_lot::Mutex<Option<TcpListener>>,
    state: StateTx,
    connections: Arc<Connections>,
    accept: parking_lot::Mutex<Option<AcceptTask>>,
}

impl std::fmt::Debug for ActiveListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveListener")
            .field("name", &self.config.name)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state.get())
            .finish()
    }
}

impl ActiveListener {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &Listener {
        &self.config
    }

    /// The bound address, which differs from the configured one for port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn matcher(&self) -> &Arc<FilterChainMatcher> {
        &self.matcher
    }

    pub fn listener_state(&self) -> ListenerState {
        self.state.get()
    }

    pub fn open_connections(&self) -> usize {
        self.connections.count()
    }

    fn start(self: &Arc<Self>, handler: Arc<dyn ConnectionHandler>) {
        let Some(listener) = self.pending.lock().take() else {
            return;
        };

        let (stop, stopped) = oneshot::channel();
        let span = tracing::info_span!("listener", name = %self.name(), address = %self.local_addr);
        let handle = tokio::spawn(
            self.clone()
                .accept_loop(listener, handler, stopped)
                .instrument(span),
        );
        *self.accept.lock() = Some(AcceptTask { stop, handle });
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        handler: Arc<dyn ConnectionHandler>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let accepted = crate::metrics::connections_accepted(self.name());

        loop {
            tokio::select! {
                biased;

                _ = &mut stop => break,
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        accepted.inc();
                        let guard = self.connections.open();
                        let span = tracing::debug_span!("connection", %peer);
                        tokio::spawn(
                            self.clone()
                                .serve(handler.clone(), stream, peer, guard)
                                .instrument(span),
                        );
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to accept connection");
                    }
                },
            }
        }

        tracing::debug!("stopped accepting");
    }

    async fn serve(
        self: Arc<Self>,
        handler: Arc<dyn ConnectionHandler>,
        stream: TcpStream,
        peer: SocketAddr,
        guard: ConnectionGuard,
    ) {
        let buffer_limit = self.config.per_connection_buffer_limit;
        if let Err(error) = apply_buffer_limit(&stream, buffer_limit) {
            tracing::debug!(%error, "failed to apply buffer limit");
        }

        let destination = match stream.local_addr() {
            Ok(address) => address,
            Err(error) => {
                tracing::debug!(%error, "connection closed before routing");
                return;
            }
        };

        let mut drain = self.state.signal();
        let mut info = ConnectionInfo::new(peer, destination);
        let inspected = tokio::select! {
            inspected = self.inspect(&stream, &mut info) => inspected,
            _ = drain.closing() => {
                tracing::debug!("connection closed by drain during inspection");
                false
            }
        };
        if !inspected {
            return;
        }

        let chain = match self.matcher.select(&info) {
            Ok(selection) => {
                if selection.ambiguous {
                    crate::metrics::ambiguous_matches(self.name()).inc();
                    tracing::debug!(chain = %selection.chain.name, "several chains match equally, using the first");
                }
                selection.chain.clone()
            }
            Err(error) => {
                crate::metrics::routing_failures(self.name(), "no_match").inc();
                tracing::warn!(%error, "closing connection");
                return;
            }
        };

        tracing::trace!(chain = %chain.name, ?info, "routed connection");
        let connection = RoutedConnection {
            stream,
            info,
            chain,
            listener: self.name().to_owned(),
            buffer_limit,
            drain: drain.clone(),
            _guard: guard,
        };

        tokio::select! {
            _ = handler.on_connection(connection) => {}
            _ = drain.closing() => {
                tracing::debug!("connection closed by drain");
            }
        }
    }

    /// Runs the listener filters, returning whether the connection should be
    /// routed.
    async fn inspect(&self, stream: &TcpStream, info: &mut ConnectionInfo) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        let filters = async {
            for filter in &self.filters {
                filter.on_accept(stream, info).await?;
            }
            Ok::<_, FilterError>(())
        };

        let result = match self.config.listener_filters_timeout {
            Some(timeout) => tokio::time::timeout(timeout, filters).await,
            None => Ok(filters.await),
        };

        match result {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                crate::metrics::routing_failures(self.name(), "listener_filter").inc();
                tracing::debug!(%error, "listener filter closed connection");
                false
            }
            Err(_) if self.config.continue_on_listener_filters_timeout => {
                tracing::debug!("listener filters timed out, continuing");
                true
            }
            Err(_) => {
                crate::metrics::routing_failures(self.name(), "listener_filter_timeout").inc();
                tracing::debug!("listener filters timed out, closing connection");
                false
            }
        }
    }

    /// Stops the accept loop and releases the listening socket. Connections
    /// already accepted are unaffected.
    async fn stop_accepting(&self) {
        let task = self.accept.lock().take();
        if let Some(AcceptTask { stop, handle }) = task {
            let _ = stop.send(());
            if let Err(error) = handle.await {
                tracing::warn!(listener = %self.name(), %error, "accept task failed");
            }
        }

        self.pending.lock().take();
        self.socket.lock().take();
    }
}

impl Retired for ActiveListener {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn drain_type(&self) -> DrainType {
        self.config.drain_type
    }

    fn state(&self) -> &StateTx {
        &self.state
    }

    fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }
}
