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

//! Discovery sessions for listener resources.
//!
//! [`StateOfTheWorld`] and [`Incremental`] differ only in how they work out
//! what changed. Both apply changes through the same [`Applier`], against
//! the same [`VersionStore`].

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

use super::{
    resource::ListenerResource, ResourceError, TransportError, VersionStore, LISTENER_TYPE,
};
use crate::{
    config::{Listener, ListenerDefaults, ManagerConfig},
    generated::{
        envoy::{
            config::core::v3::Node,
            service::discovery::v3::{
                DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
            },
        },
        google::rpc::Status,
    },
    listener::registry::{ListenerManager, UpsertError},
};

/// `google.rpc.Code.INVALID_ARGUMENT`
pub const INVALID_ARGUMENT: i32 = 3;
const USER_AGENT: &str = "lds";

/// Where discovered listeners are applied.
#[async_trait::async_trait]
pub trait ListenerSink: Send + Sync {
    async fn upsert(&self, listener: Listener) -> Result<(), UpsertError>;
    /// Returns whether a listener named `name` existed.
    async fn remove(&self, name: &str) -> bool;
}

#[async_trait::async_trait]
impl ListenerSink for ListenerManager {
    async fn upsert(&self, listener: Listener) -> Result<(), UpsertError> {
        ListenerManager::upsert(self, listener).await.map(drop)
    }

    async fn remove(&self, name: &str) -> bool {
        ListenerManager::remove(self, name).await
    }
}

/// The result for one resource named in a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceAck {
    Applied { version: String },
    /// The same content was already applied.
    Unchanged { version: String },
    Rejected { reason: String },
    Removed,
    /// Not subscribed to, or removal of an unknown resource.
    Ignored,
}

/// The acknowledgment for one discovery response: the request to send back
/// and the result for every resource it named.
#[derive(Clone, Debug, PartialEq)]
pub struct Ack<R> {
    pub request: R,
    pub resources: BTreeMap<String, ResourceAck>,
}

impl<R> Ack<R> {
    /// Resources that were rejected, with the reason.
    pub fn rejected(&self) -> impl Iterator<Item = (&str, &str)> {
        self.resources.iter().filter_map(|(name, ack)| match ack {
            ResourceAck::Rejected { reason } => Some((&**name, &**reason)),
            _ => None,
        })
    }

    pub fn is_nack(&self) -> bool {
        self.rejected().next().is_some()
    }

    fn error_detail(&self) -> Option<Status> {
        let message = self
            .rejected()
            .map(|(name, reason)| format!("{name}: {reason}"))
            .collect::<Vec<_>>();

        (!message.is_empty()).then(|| Status {
            code: INVALID_ARGUMENT,
            message: message.join("\n"),
            details: Vec::new(),
        })
    }
}

fn whole_nack(type_url: &str) -> Status {
    Status {
        code: INVALID_ARGUMENT,
        message: format!("unexpected type_url `{type_url}`, expected `{LISTENER_TYPE}`"),
        details: Vec::new(),
    }
}

fn count(type_url: &str, nack: bool) {
    if nack {
        crate::metrics::nacks(type_url).inc();
    } else {
        crate::metrics::acks(type_url).inc();
    }
}

/// Applies resource changes to a [`ListenerSink`], keeping the
/// [`VersionStore`] up to date.
#[derive(Clone)]
pub struct Applier {
    sink: Arc<dyn ListenerSink>,
    versions: VersionStore,
    defaults: ListenerDefaults,
}

impl Applier {
    pub fn new(
        sink: Arc<dyn ListenerSink>,
        versions: VersionStore,
        defaults: ListenerDefaults,
    ) -> Self {
        Self {
            sink,
            versions,
            defaults,
        }
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Applies `version` of a resource, named `fallback_name` in the result
    /// when it cannot be decoded.
    async fn apply(
        &self,
        any: &prost_types::Any,
        version: &str,
        expected_name: Option<&str>,
        fallback_name: String,
    ) -> (String, ResourceAck) {
        match ListenerResource::decode(any, expected_name) {
            Ok(resource) => self.apply_resource(resource, version).await,
            Err(error) => (fallback_name, self.reject(error)),
        }
    }

    async fn apply_resource(
        &self,
        resource: ListenerResource,
        version: &str,
    ) -> (String, ResourceAck) {
        let name = resource.name.clone();
        self.versions.observe(&name, version);

        if self.versions.is_applied(&name, resource.hash) {
            tracing::trace!(listener = %name, version, "resource unchanged");
            return (
                name,
                ResourceAck::Unchanged {
                    version: version.to_owned(),
                },
            );
        }

        let hash = resource.hash;
        let applied = match resource.into_listener(&self.defaults) {
            Ok(listener) => self.sink.upsert(listener).await.map_err(ResourceError::from),
            Err(error) => Err(error),
        };

        match applied {
            Ok(()) => {
                self.versions.applied(&name, version, hash);
                tracing::debug!(listener = %name, version, "applied resource");
                (
                    name,
                    ResourceAck::Applied {
                        version: version.to_owned(),
                    },
                )
            }
            Err(error) => {
                tracing::warn!(listener = %name, version, %error, "rejected resource");
                (name, self.reject(error))
            }
        }
    }

    fn reject(&self, error: ResourceError) -> ResourceAck {
        let reason = match &error {
            ResourceError::UnexpectedType(_) => "unexpected_type",
            ResourceError::NameMismatch { .. } => "name_mismatch",
            ResourceError::Missing => "missing",
            ResourceError::Invalid(_) => "invalid",
            ResourceError::Upsert(UpsertError::Validation(_)) => "invalid",
            ResourceError::Upsert(UpsertError::Bind(_)) => "bind",
        };
        crate::metrics::rejected_resources(reason).inc();

        ResourceAck::Rejected {
            reason: error.to_string(),
        }
    }

    async fn remove(&self, name: &str) -> ResourceAck {
        let record = self.versions.remove(name);
        if record
            .as_ref()
            .map_or(false, |record| record.acked_version.is_none())
        {
            tracing::trace!(listener = %name, "ignoring removal of unapplied resource");
            return ResourceAck::Ignored;
        }

        let removed = self.sink.remove(name).await;
        if record.is_some() || removed {
            tracing::debug!(listener = %name, "removed resource");
            ResourceAck::Removed
        } else {
            tracing::trace!(listener = %name, "ignoring removal of unknown resource");
            ResourceAck::Ignored
        }
    }
}

fn node(config: &ManagerConfig) -> Node {
    Node {
        id: config.node_id.clone(),
        user_agent_name: USER_AGENT.into(),
        ..<_>::default()
    }
}

/// A full-state session: every response carries the complete set of
/// desired listeners.
pub struct StateOfTheWorld {
    applier: Applier,
    node: Node,
    last_acked_version: String,
    /// The fingerprint of the last applied response and its acknowledgment.
    last: Option<(u64, Ack<DiscoveryRequest>)>,
    closed: bool,
}

impl StateOfTheWorld {
    pub fn new(sink: Arc<dyn ListenerSink>, versions: VersionStore, config: &ManagerConfig) -> Self {
        Self::with_applier(
            Applier::new(sink, versions, config.listener_defaults()),
            config,
        )
    }

    pub fn with_applier(applier: Applier, config: &ManagerConfig) -> Self {
        Self {
            applier,
            node: node(config),
            last_acked_version: String::new(),
            last: None,
            closed: false,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn last_acked_version(&self) -> &str {
        &self.last_acked_version
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Discards the session. Applied listeners are unaffected.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// The first request of the session, subscribing to every listener.
    pub fn initial_request(&self) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(self.node.clone()),
            type_url: LISTENER_TYPE.into(),
            version_info: self.last_acked_version.clone(),
            ..<_>::default()
        }
    }

    /// Applies the complete set of listeners in `response`, returning the
    /// acknowledgment to send. Fails once the session is closed.
    pub async fn on_response(
        &mut self,
        response: DiscoveryResponse,
    ) -> Result<Ack<DiscoveryRequest>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        crate::metrics::discovery_responses(&response.type_url).inc();
        tracing::debug!(
            version = %response.version_info,
            nonce = %response.nonce,
            resources = response.resources.len(),
            "received discovery response"
        );

        if response.type_url != LISTENER_TYPE {
            tracing::warn!(type_url = %response.type_url, "rejecting response of unexpected type");
            count(&response.type_url, true);
            return Ok(Ack {
                request: DiscoveryRequest {
                    type_url: response.type_url.clone(),
                    version_info: self.last_acked_version.clone(),
                    response_nonce: response.nonce,
                    error_detail: Some(whole_nack(&response.type_url)),
                    ..<_>::default()
                },
                resources: BTreeMap::new(),
            });
        }

        let fingerprint = fingerprint(&response);
        if let Some((last, ack)) = &self.last {
            if *last == fingerprint {
                tracing::debug!(version = %response.version_info, "response already applied");
                let mut ack = ack.clone();
                ack.request.response_nonce = response.nonce;
                count(LISTENER_TYPE, ack.is_nack());
                return Ok(ack);
            }
        }

        let decoded = response
            .resources
            .iter()
            .enumerate()
            .map(|(index, any)| {
                ListenerResource::decode(any, None)
                    .map_err(|error| (format!("resources[{index}]"), error))
            })
            .collect::<Vec<_>>();

        // Names that were sent, even if rejected, keep their last good
        // version.
        let sent = decoded
            .iter()
            .map(|resource| match resource {
                Ok(resource) => resource.name.clone(),
                Err((name, _)) => name.clone(),
            })
            .collect::<HashSet<_>>();

        // Removals go first, so a listener renamed on the same address can
        // take it over.
        let mut resources = BTreeMap::new();
        for name in self.applier.versions.names() {
            if !sent.contains(&name) {
                let ack = self.applier.remove(&name).await;
                resources.insert(name, ack);
            }
        }

        for resource in decoded {
            let (name, ack) = match resource {
                Ok(resource) => {
                    self.applier
                        .apply_resource(resource, &response.version_info)
                        .await
                }
                Err((name, error)) => (name, self.applier.reject(error)),
            };
            resources.insert(name, ack);
        }

        let mut ack = Ack {
            request: DiscoveryRequest {
                type_url: LISTENER_TYPE.into(),
                version_info: response.version_info.clone(),
                response_nonce: response.nonce,
                ..<_>::default()
            },
            resources,
        };
        ack.request.error_detail = ack.error_detail();

        count(LISTENER_TYPE, ack.is_nack());
        self.last_acked_version = response.version_info;
        self.last = Some((fingerprint, ack.clone()));
        Ok(ack)
    }
}

/// Fingerprint of a response's version and content, without its nonce.
fn fingerprint(response: &DiscoveryResponse) -> u64 {
    let mut bytes = response.version_info.as_bytes().to_vec();
    for any in &response.resources {
        bytes.extend(seahash::hash(&any.value).to_be_bytes());
    }
    seahash::hash(&bytes)
}

/// Which resources an incremental session receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subscription {
    Wildcard,
    Names(BTreeSet<String>),
}

impl Subscription {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Names(names) => names.contains(name),
        }
    }
}

/// An incremental session: responses carry only added, updated and
/// removed listeners.
pub struct Incremental {
    applier: Applier,
    node: Node,
    subscription: Subscription,
    closed: bool,
}

impl Incremental {
    pub fn new(
        sink: Arc<dyn ListenerSink>,
        versions: VersionStore,
        config: &ManagerConfig,
        subscription: Subscription,
    ) -> Self {
        Self::with_applier(
            Applier::new(sink, versions, config.listener_defaults()),
            config,
            subscription,
        )
    }

    pub fn with_applier(applier: Applier, config: &ManagerConfig, subscription: Subscription) -> Self {
        Self {
            applier,
            node: node(config),
            subscription,
            closed: false,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Discards the session. Applied listeners are unaffected.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// The first request of the session, resuming from the versions already
    /// applied.
    pub fn initial_request(&self) -> DeltaDiscoveryRequest {
        let resource_names_subscribe = match &self.subscription {
            Subscription::Wildcard => Vec::new(),
            Subscription::Names(names) => names.iter().cloned().collect(),
        };

        let mut initial_resource_versions = self.applier.versions.initial_resource_versions();
        initial_resource_versions.retain(|name, _| self.subscription.contains(name));

        DeltaDiscoveryRequest {
            node: Some(self.node.clone()),
            type_url: LISTENER_TYPE.into(),
            resource_names_subscribe,
            initial_resource_versions,
            ..<_>::default()
        }
    }

    /// Adds `names` to the subscription.
    pub fn subscribe(&mut self, names: impl IntoIterator<Item = String>) -> DeltaDiscoveryRequest {
        let names = names.into_iter().collect::<Vec<_>>();
        if let Subscription::Names(subscribed) = &mut self.subscription {
            subscribed.extend(names.iter().cloned());
        }

        DeltaDiscoveryRequest {
            type_url: LISTENER_TYPE.into(),
            resource_names_subscribe: names,
            ..<_>::default()
        }
    }

    /// Removes `names` from the subscription, removing the listeners that
    /// were applied for them.
    pub async fn unsubscribe(
        &mut self,
        names: impl IntoIterator<Item = String>,
    ) -> DeltaDiscoveryRequest {
        let names = names.into_iter().collect::<Vec<_>>();
        if let Subscription::Names(subscribed) = &mut self.subscription {
            for name in &names {
                if subscribed.remove(name) {
                    self.applier.remove(name).await;
                }
            }
        }

        DeltaDiscoveryRequest {
            type_url: LISTENER_TYPE.into(),
            resource_names_unsubscribe: names,
            ..<_>::default()
        }
    }

    /// Applies the changes in `response`, returning the acknowledgment to
    /// send. Fails once the session is closed.
    pub async fn on_response(
        &mut self,
        response: DeltaDiscoveryResponse,
    ) -> Result<Ack<DeltaDiscoveryRequest>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        crate::metrics::discovery_responses(&response.type_url).inc();
        tracing::debug!(
            nonce = %response.nonce,
            resources = response.resources.len(),
            removed = response.removed_resources.len(),
            "received delta discovery response"
        );

        if response.type_url != LISTENER_TYPE {
            tracing::warn!(type_url = %response.type_url, "rejecting response of unexpected type");
            count(&response.type_url, true);
            return Ok(Ack {
                request: DeltaDiscoveryRequest {
                    type_url: response.type_url.clone(),
                    response_nonce: response.nonce,
                    error_detail: Some(whole_nack(&response.type_url)),
                    ..<_>::default()
                },
                resources: BTreeMap::new(),
            });
        }

        let mut resources = BTreeMap::new();
        for name in &response.removed_resources {
            let ack = if self.subscription.contains(name) {
                self.applier.remove(name).await
            } else {
                ResourceAck::Ignored
            };
            resources.insert(name.clone(), ack);
        }

        for resource in &response.resources {
            if !self.subscription.contains(&resource.name) {
                tracing::trace!(listener = %resource.name, "ignoring unsubscribed resource");
                resources.insert(resource.name.clone(), ResourceAck::Ignored);
                continue;
            }

            let (name, ack) = match &resource.resource {
                Some(any) => {
                    let expected = (!resource.name.is_empty()).then_some(&*resource.name);
                    self.applier
                        .apply(any, &resource.version, expected, resource.name.clone())
                        .await
                }
                None => (
                    resource.name.clone(),
                    self.applier.reject(ResourceError::Missing),
                ),
            };
            resources.insert(name, ack);
        }

        let mut ack = Ack {
            request: DeltaDiscoveryRequest {
                type_url: LISTENER_TYPE.into(),
                response_nonce: response.nonce,
                ..<_>::default()
            },
            resources,
        };
        ack.request.error_detail = ack.error_detail();
        count(LISTENER_TYPE, ack.is_nack());
        Ok(ack)
    }
}
