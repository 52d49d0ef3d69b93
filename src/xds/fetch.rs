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

use std::sync::Arc;

use super::{
    session::{Ack, ListenerSink, StateOfTheWorld},
    TransportError, VersionStore,
};
use crate::{
    config::ManagerConfig,
    generated::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse},
};

/// A unary discovery transport, such as `FetchListeners`.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: DiscoveryRequest) -> Result<DiscoveryResponse, tonic::Status>;
}

/// Pulls the complete set of listeners once and applies it like a full-state
/// response. Nothing but `versions` outlives the call.
#[tracing::instrument(skip_all, fields(node = %config.node_id))]
pub async fn fetch(
    transport: &dyn Fetch,
    sink: Arc<dyn ListenerSink>,
    versions: VersionStore,
    config: &ManagerConfig,
) -> Result<Ack<DiscoveryRequest>, TransportError> {
    let mut session = StateOfTheWorld::new(sink, versions, config);
    let response = transport.fetch(session.initial_request()).await?;
    tracing::debug!(version = %response.version_info, "fetched listeners");
    session.on_response(response).await
}
