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

//! Drives discovery sessions over a stream of responses from the transport,
//! producing the stream of requests to send back.

use futures::{Stream, StreamExt};
use tracing_futures::Instrument;

use super::{
    session::{Incremental, StateOfTheWorld},
    TransportError,
};
use crate::{
    generated::envoy::service::discovery::v3::{
        DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
    },
    metrics::SessionMetricsGuard,
};

/// Yields the initial request of `session`, then one acknowledgment for
/// every response. Ends with a [`TransportError`] when `responses` fails,
/// and without error when it ends.
pub fn handle_discovery_responses<S>(
    mut session: StateOfTheWorld,
    responses: S,
) -> impl Stream<Item = Result<DiscoveryRequest, TransportError>> + Send
where
    S: Stream<Item = Result<DiscoveryResponse, tonic::Status>> + Send + 'static,
{
    let span = tracing::info_span!("discovery_session", node = %session.node_id(), mode = "sotw");

    async_stream::try_stream! {
        let _guard = SessionMetricsGuard::new();
        futures::pin_mut!(responses);

        yield session.initial_request();

        while let Some(response) = responses.next().await {
            let response = match response {
                Ok(response) => response,
                Err(status) => {
                    tracing::warn!(%status, "discovery stream failed, discarding session");
                    session.close();
                    Err(TransportError::from(status))?
                }
            };

            yield session.on_response(response).await?.request;
        }

        tracing::info!("discovery stream ended");
        session.close();
    }
    .instrument(span)
}

/// The incremental counterpart of [`handle_discovery_responses`].
pub fn handle_delta_discovery_responses<S>(
    mut session: Incremental,
    responses: S,
) -> impl Stream<Item = Result<DeltaDiscoveryRequest, TransportError>> + Send
where
    S: Stream<Item = Result<DeltaDiscoveryResponse, tonic::Status>> + Send + 'static,
{
    let span = tracing::info_span!("discovery_session", node = %session.node_id(), mode = "delta");

    async_stream::try_stream! {
        let _guard = SessionMetricsGuard::new();
        futures::pin_mut!(responses);

        yield session.initial_request();

        while let Some(response) = responses.next().await {
            let response = match response {
                Ok(response) => response,
                Err(status) => {
                    tracing::warn!(%status, "discovery stream failed, discarding session");
                    session.close();
                    Err(TransportError::from(status))?
                }
            };

            yield session.on_response(response).await?.request;
        }

        tracing::info!("discovery stream ended");
        session.close();
    }
    .instrument(span)
}
