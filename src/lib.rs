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

//! Listener discovery and connection routing for an xDS driven proxy.
//!
//! Listener resources arrive from a control plane through a discovery
//! session ([`xds`]), are applied to the [`ListenerManager`] which owns the
//! bound sockets, and every accepted connection is routed to the most
//! specific filter chain of the listener that accepted it.

#![deny(unused_must_use)]

pub mod config;
pub mod generated;
pub mod listener;
pub mod log;
pub mod metrics;
pub mod net;
pub mod signal;
pub mod xds;


pub type Result<T, E = eyre::Error> = std::result::Result<T, E>;

#[doc(inline)]
pub use self::{
    config::{Listener, ManagerConfig},
    listener::{ConnectionHandler, ListenerManager, RoutedConnection},
    signal::{ShutdownKind, ShutdownRx, ShutdownTx},
};
