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

//! Listener discovery: full-state and incremental sessions, their stream
//! drivers and one-shot fetch.

mod error;
pub mod fetch;
pub mod resource;
pub mod session;
pub mod stream;
pub mod versions;

pub use self::{
    error::{ResourceError, TransportError},
    fetch::{fetch, Fetch},
    resource::LISTENER_TYPE,
    session::{
        Ack, Applier, Incremental, ListenerSink, ResourceAck, StateOfTheWorld, Subscription,
    },
    stream::{handle_delta_discovery_responses, handle_discovery_responses},
    versions::{ResourceVersionRecord, VersionStore},
};

pub use crate::generated::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse, Resource,
};
