/*
 * Copyright 2020 Google LLC All Rights Reserved.
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

//! Listener resource model and the configuration of the listener manager.

mod error;
mod listener;

use std::{io, time::Duration};

use serde::{Deserialize, Serialize};

pub use self::{
    error::{ValidationError, ValueInvalidArgs},
    listener::{
        DrainType, Filter, FilterChain, FilterChainMatch, Listener, ListenerDefaults,
        ListenerFilterConfig, ServerName, SocketConfig, SocketOption, SocketOptionValue,
        SocketState, DEFAULT_BACKLOG, DEFAULT_BUFFER_LIMIT, DEFAULT_LISTENER_FILTERS_TIMEOUT,
        RAW_BUFFER,
    },
};

/// Overrides [`ManagerConfig::drain_timeout`] when set to a number of seconds.
pub const DRAIN_TIMEOUT_ENV: &str = "LDS_DRAIN_TIMEOUT_SECS";
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for a [`crate::ListenerManager`] and the discovery sessions
/// feeding it, supplied by the host process.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Identifier sent to the control plane in the discovery `Node`.
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Upper bound on how long a retired listener waits for its connections.
    #[serde(default = "default_drain_timeout", rename = "drain_timeout_secs", with = "secs")]
    pub drain_timeout: Duration,
    #[serde(default = "default_backlog")]
    pub listen_backlog: u32,
    #[serde(default = "default_buffer_limit")]
    pub default_buffer_limit: u32,
    #[serde(
        default = "default_listener_filters_timeout",
        rename = "default_listener_filters_timeout_secs",
        with = "secs"
    )]
    pub default_listener_filters_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            drain_timeout: default_drain_timeout(),
            listen_backlog: default_backlog(),
            default_buffer_limit: default_buffer_limit(),
            default_listener_filters_timeout: default_listener_filters_timeout(),
        }
    }
}

impl ManagerConfig {
    /// Reads the configuration from YAML (or JSON, which is valid YAML).
    pub fn from_reader<R: io::Read>(input: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(input)
    }

    /// The drain timeout, taking [`DRAIN_TIMEOUT_ENV`] into account.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout_or(std::env::var(DRAIN_TIMEOUT_ENV).ok().as_deref())
    }

    fn drain_timeout_or(&self, env: Option<&str>) -> Duration {
        match env.map(str::parse::<u64>) {
            Some(Ok(secs)) => Duration::from_secs(secs),
            Some(Err(error)) => {
                tracing::warn!(%error, "ignoring invalid {DRAIN_TIMEOUT_ENV}");
                self.drain_timeout
            }
            None => self.drain_timeout,
        }
    }

    pub fn listener_defaults(&self) -> ListenerDefaults {
        ListenerDefaults {
            buffer_limit: self.default_buffer_limit,
            listener_filters_timeout: self.default_listener_filters_timeout,
            backlog: self.listen_backlog,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.node_id.is_empty() {
            return Err(ValueInvalidArgs::new("node_id", "cannot be empty").into());
        }

        if self.listen_backlog == 0 {
            return Err(ValueInvalidArgs::new("listen_backlog", "must be at least 1").into());
        }

        Ok(())
    }
}

fn default_node_id() -> String {
    uuid::Uuid::new_v4().as_hyphenated().to_string()
}

fn default_drain_timeout() -> Duration {
    DEFAULT_DRAIN_TIMEOUT
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_buffer_limit() -> u32 {
    DEFAULT_BUFFER_LIMIT
}

fn default_listener_filters_timeout() -> Duration {
    DEFAULT_LISTENER_FILTERS_TIMEOUT
}

/// (De)serializes a [`Duration`] as a whole number of seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
