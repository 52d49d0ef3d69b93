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

//! Active listeners, their graceful retirement and per connection filter
//! chain selection.

pub mod drain;
pub mod filters;
pub mod matcher;
pub mod registry;

use std::sync::Arc;

use tokio::net::TcpStream;

pub use self::{
    drain::{ConnectionGuard, DrainCoordinator, DrainSignal, DrainingListener, ListenerState},
    filters::{ListenerFilter, ListenerFilterFactory, ListenerFilterRegistry},
    matcher::{AmbiguousMatch, ConnectionInfo, FilterChainMatcher, NoMatchError},
    registry::{ListenerManager, UpsertOutcome},
};

use crate::config::FilterChain;

/// Runs the filter pipeline of the chain a connection was routed to.
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles `connection` until it is done. The future is dropped, closing
    /// the connection, if the listener that accepted it is forcibly closed.
    async fn on_connection(&self, connection: RoutedConnection);
}

/// An accepted connection together with everything known about it.
#[derive(Debug)]
pub struct RoutedConnection {
    pub stream: TcpStream,
    pub info: ConnectionInfo,
    /// The selected filter chain.
    pub chain: Arc<FilterChain>,
    /// The name of the listener that accepted the connection.
    pub listener: String,
    pub buffer_limit: u32,
    pub drain: DrainSignal,
    _guard: ConnectionGuard,
}

impl RoutedConnection {
    /// The name of the selected filter chain.
    pub fn chain_name(&self) -> &str {
        &self.chain.name
    }
}
