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

use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use ipnetwork::IpNetwork;
use prost::Message;

use super::{ValidationError, ValueInvalidArgs};
use crate::generated::envoy::config::{core::v3 as core, listener::v3 as proto};

/// Per connection read/write buffer limit used when a listener leaves it unset.
pub const DEFAULT_BUFFER_LIMIT: u32 = 1024 * 1024;
/// Listener filter timeout used when a listener leaves it unset.
pub const DEFAULT_LISTENER_FILTERS_TIMEOUT: Duration = Duration::from_secs(15);
/// `listen(2)` backlog used when a listener leaves it unset.
pub const DEFAULT_BACKLOG: u32 = 1024;
/// Transport protocol of a connection no listener filter has classified.
pub const RAW_BUFFER: &str = "raw_buffer";

/// Values applied to fields a listener resource leaves unset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerDefaults {
    pub buffer_limit: u32,
    pub listener_filters_timeout: Duration,
    pub backlog: u32,
}

impl Default for ListenerDefaults {
    fn default() -> Self {
        Self {
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            listener_filters_timeout: DEFAULT_LISTENER_FILTERS_TIMEOUT,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

/// How a listener reacts to drain triggers once retired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DrainType {
    /// Drains on removal or modification, and also on a failed health check.
    #[default]
    Default,
    /// Drains on removal or modification only.
    ModifyOnly,
}

/// A validated listener resource. Listeners are replaced as a whole on
/// every update, never mutated in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Listener {
    pub name: String,
    pub address: SocketAddr,
    pub filter_chains: Vec<FilterChain>,
    pub default_filter_chain: Option<FilterChain>,
    pub listener_filters: Vec<ListenerFilterConfig>,
    pub drain_type: DrainType,
    pub per_connection_buffer_limit: u32,
    pub socket: SocketConfig,
    /// `None` disables the timeout.
    pub listener_filters_timeout: Option<Duration>,
    pub continue_on_listener_filters_timeout: bool,
}

/// Options applied to the listening socket when it is created. Two listeners
/// with the same address and equal socket configuration can share a socket.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocketConfig {
    pub transparent: Option<bool>,
    pub freebind: Option<bool>,
    pub tcp_fast_open_queue_length: Option<u32>,
    pub backlog: u32,
    pub options: Vec<SocketOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketOption {
    pub description: String,
    pub level: i32,
    pub name: i32,
    pub value: SocketOptionValue,
    pub state: SocketState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketOptionValue {
    Int(i64),
    Bytes(Vec<u8>),
}

/// The point in the socket's lifecycle at which an option is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SocketState {
    Prebind,
    Bound,
    Listening,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListenerFilterConfig {
    pub name: String,
    pub typed_config: Option<prost_types::Any>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterChain {
    pub name: String,
    pub filter_chain_match: FilterChainMatch,
    /// Opaque to routing, handed to the connection handler as is.
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub name: String,
    pub typed_config: Option<prost_types::Any>,
}

/// The criteria a connection must satisfy for a filter chain to be selected.
/// Empty fields match any connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilterChainMatch {
    pub destination_port: Option<u16>,
    pub prefix_ranges: Vec<IpNetwork>,
    pub server_names: Vec<ServerName>,
    pub transport_protocol: Option<String>,
    pub application_protocols: Vec<String>,
    pub source_prefix_ranges: Vec<IpNetwork>,
    pub source_ports: Vec<u16>,
}

impl FilterChainMatch {
    /// Whether no criterion is declared at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A server name criterion, either exact (`example.com`) or a wildcard
/// matching any subdomain (`*.example.com`). Names are stored lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServerName {
    Exact(String),
    /// Holds the suffix including its leading `.`
    Wildcard(String),
}

impl FromStr for ServerName {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let name = input.to_ascii_lowercase();
        let invalid = || ValidationError::InvalidServerName(input.to_owned());

        match name.strip_prefix('*') {
            Some(suffix) if suffix.len() > 1 && suffix.starts_with('.') && !suffix.contains('*') => {
                Ok(Self::Wildcard(suffix.to_owned()))
            }
            Some(_) => Err(invalid()),
            None if name.is_empty() || name.contains('*') => Err(invalid()),
            None => Ok(Self::Exact(name)),
        }
    }
}

impl std::fmt::Display for ServerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Wildcard(suffix) => write!(f, "*{suffix}"),
        }
    }
}

impl Listener {
    /// The name given to a listener resource that arrives without one.
    /// Derived from the resource content so re-delivery yields the same name.
    pub fn generated_name(content_hash: u64) -> String {
        format!("listener-{content_hash:016x}")
    }

    /// Validates a listener resource, filling unset fields from `defaults`.
    pub fn from_proto(
        listener: proto::Listener,
        defaults: &ListenerDefaults,
    ) -> Result<Self, ValidationError> {
        let name = if listener.name.is_empty() {
            Self::generated_name(seahash::hash(&listener.encode_to_vec()))
        } else {
            listener.name.clone()
        };

        if listener.use_original_dst.is_some()
            || listener.bind_to_port.is_some()
            || listener
                .deprecated_v1
                .as_ref()
                .map_or(false, |v1| v1.bind_to_port.is_some())
        {
            tracing::debug!(listener = %name, "ignoring deprecated listener flags");
        }

        let address = socket_addr(listener.address)?;
        let drain_type = match proto::listener::DrainType::try_from(listener.drain_type) {
            Ok(proto::listener::DrainType::Default) => DrainType::Default,
            Ok(proto::listener::DrainType::ModifyOnly) => DrainType::ModifyOnly,
            Err(_) => {
                return Err(ValueInvalidArgs::new(
                    "drain_type",
                    format!("unknown enum value {}", listener.drain_type),
                )
                .into())
            }
        };

        let listener_filters_timeout = match listener.listener_filters_timeout {
            None => Some(defaults.listener_filters_timeout),
            Some(duration) => duration_from_proto("listener_filters_timeout", duration)?,
        }
        .filter(|timeout| !timeout.is_zero());

        let filter_chains = listener
            .filter_chains
            .into_iter()
            .map(FilterChain::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut chain_names = std::collections::HashSet::new();
        for chain in filter_chains.iter().filter(|c| !c.name.is_empty()) {
            if !chain_names.insert(&chain.name) {
                return Err(ValidationError::NotUnique(format!(
                    "filter_chains.name `{}`",
                    chain.name
                )));
            }
        }

        Ok(Self {
            name,
            address,
            filter_chains,
            default_filter_chain: listener
                .default_filter_chain
                .map(FilterChain::try_from)
                .transpose()?,
            listener_filters: listener
                .listener_filters
                .into_iter()
                .map(|filter| ListenerFilterConfig {
                    name: filter.name,
                    typed_config: filter.config_type.map(
                        |proto::listener_filter::ConfigType::TypedConfig(any)| any,
                    ),
                })
                .collect(),
            drain_type,
            per_connection_buffer_limit: listener
                .per_connection_buffer_limit_bytes
                .unwrap_or(defaults.buffer_limit),
            socket: SocketConfig {
                transparent: listener.transparent,
                freebind: listener.freebind,
                tcp_fast_open_queue_length: listener.tcp_fast_open_queue_length,
                backlog: listener.tcp_backlog_size.unwrap_or(defaults.backlog),
                options: listener
                    .socket_options
                    .into_iter()
                    .map(SocketOption::try_from)
                    .collect::<Result<_, _>>()?,
            },
            listener_filters_timeout,
            continue_on_listener_filters_timeout: listener.continue_on_listener_filters_timeout,
        })
    }
}

impl TryFrom<proto::Listener> for Listener {
    type Error = ValidationError;

    fn try_from(listener: proto::Listener) -> Result<Self, Self::Error> {
        Self::from_proto(listener, &ListenerDefaults::default())
    }
}

impl TryFrom<proto::FilterChain> for FilterChain {
    type Error = ValidationError;

    fn try_from(chain: proto::FilterChain) -> Result<Self, Self::Error> {
        Ok(Self {
            name: chain.name,
            filter_chain_match: chain
                .filter_chain_match
                .map(FilterChainMatch::try_from)
                .transpose()?
                .unwrap_or_default(),
            filters: chain
                .filters
                .into_iter()
                .map(|filter| Filter {
                    name: filter.name,
                    typed_config: filter
                        .config_type
                        .map(|proto::filter::ConfigType::TypedConfig(any)| any),
                })
                .collect(),
        })
    }
}

impl TryFrom<proto::FilterChainMatch> for FilterChainMatch {
    type Error = ValidationError;

    fn try_from(criteria: proto::FilterChainMatch) -> Result<Self, Self::Error> {
        Ok(Self {
            destination_port: criteria
                .destination_port
                .map(|port| port_from_proto("destination_port", port))
                .transpose()?,
            prefix_ranges: criteria
                .prefix_ranges
                .into_iter()
                .map(cidr_from_proto)
                .collect::<Result<_, _>>()?,
            server_names: criteria
                .server_names
                .iter()
                .map(|name| name.parse())
                .collect::<Result<_, _>>()?,
            transport_protocol: Some(criteria.transport_protocol).filter(|p| !p.is_empty()),
            application_protocols: criteria.application_protocols,
            source_prefix_ranges: criteria
                .source_prefix_ranges
                .into_iter()
                .map(cidr_from_proto)
                .collect::<Result<_, _>>()?,
            source_ports: criteria
                .source_ports
                .into_iter()
                .map(|port| port_from_proto("source_ports", port))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl TryFrom<core::SocketOption> for SocketOption {
    type Error = ValidationError;

    fn try_from(option: core::SocketOption) -> Result<Self, Self::Error> {
        let state = match core::socket_option::SocketState::try_from(option.state) {
            Ok(core::socket_option::SocketState::StatePrebind) => SocketState::Prebind,
            Ok(core::socket_option::SocketState::StateBound) => SocketState::Bound,
            Ok(core::socket_option::SocketState::StateListening) => SocketState::Listening,
            Err(_) => {
                return Err(ValueInvalidArgs {
                    field: "socket_options.state".into(),
                    clarification: Some(format!("unknown enum value {}", option.state)),
                    examples: Some(vec![
                        "STATE_PREBIND".into(),
                        "STATE_BOUND".into(),
                        "STATE_LISTENING".into(),
                    ]),
                }
                .into())
            }
        };

        let value = match option.value {
            Some(core::socket_option::Value::IntValue(value)) => SocketOptionValue::Int(value),
            Some(core::socket_option::Value::BufValue(value)) => SocketOptionValue::Bytes(value),
            None => {
                return Err(ValueInvalidArgs::new(
                    "socket_options.value",
                    format!("option `{}` has no value", option.description),
                )
                .into())
            }
        };

        let int = |field: &str, value: i64| {
            i32::try_from(value).map_err(|_| {
                ValidationError::from(ValueInvalidArgs::new(
                    field,
                    format!("{value} is out of range"),
                ))
            })
        };

        Ok(Self {
            level: int("socket_options.level", option.level)?,
            name: int("socket_options.name", option.name)?,
            description: option.description,
            value,
            state,
        })
    }
}

fn socket_addr(address: Option<core::Address>) -> Result<SocketAddr, ValidationError> {
    let address = match address.and_then(|address| address.address) {
        Some(core::address::Address::SocketAddress(address)) => address,
        Some(core::address::Address::Pipe(pipe)) => {
            return Err(ValueInvalidArgs::new(
                "address",
                format!("pipe `{}` is not supported", pipe.path),
            )
            .into())
        }
        None => return Err(ValidationError::MissingAddress),
    };

    if address.protocol() != core::socket_address::Protocol::Tcp {
        return Err(ValueInvalidArgs::new("address.protocol", "only TCP is supported").into());
    }

    if !address.resolver_name.is_empty() {
        return Err(ValueInvalidArgs::new(
            "address.resolver_name",
            "custom resolvers are not supported",
        )
        .into());
    }

    if address.address.is_empty() {
        return Err(ValidationError::MissingAddress);
    }

    let ip = address
        .address
        .parse::<IpAddr>()
        .map_err(|_| ValidationError::InvalidAddress(address.address.clone()))?;

    let port = match address.port_specifier {
        Some(core::socket_address::PortSpecifier::PortValue(port)) => {
            port_from_proto("address.port_value", port)?
        }
        Some(core::socket_address::PortSpecifier::NamedPort(name)) => {
            return Err(ValueInvalidArgs::new(
                "address.named_port",
                format!("named port `{name}` cannot be bound"),
            )
            .into())
        }
        None => 0,
    };

    Ok(SocketAddr::new(ip, port))
}

fn port_from_proto(field: &'static str, port: u32) -> Result<u16, ValidationError> {
    u16::try_from(port).map_err(|_| ValidationError::InvalidPort { field, value: port })
}

fn cidr_from_proto(range: core::CidrRange) -> Result<IpNetwork, ValidationError> {
    let len = range.prefix_len.unwrap_or(0);
    let invalid = || ValidationError::InvalidCidr {
        prefix: range.address_prefix.clone(),
        len,
    };

    let ip = range.address_prefix.parse::<IpAddr>().map_err(|_| invalid())?;
    let len = u8::try_from(len).map_err(|_| invalid())?;
    IpNetwork::new(ip, len).map_err(|_| invalid())
}

fn duration_from_proto(
    field: &str,
    duration: prost_types::Duration,
) -> Result<Option<Duration>, ValidationError> {
    match (u64::try_from(duration.seconds), u32::try_from(duration.nanos)) {
        (Ok(seconds), Ok(nanos)) if nanos < 1_000_000_000 => {
            Ok(Some(Duration::new(seconds, nanos)))
        }
        _ => Err(ValueInvalidArgs::new(field, "duration must be positive").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn address(ip: &str, port: u32) -> Option<core::Address> {
        Some(core::Address {
            address: Some(core::address::Address::SocketAddress(core::SocketAddress {
                address: ip.into(),
                port_specifier: Some(core::socket_address::PortSpecifier::PortValue(port)),
                ..<_>::default()
            })),
        })
    }

    #[test]
    fn defaults_are_applied() {
        let listener = Listener::try_from(proto::Listener {
            name: "a".into(),
            address: address("127.0.0.1", 8080),
            ..<_>::default()
        })
        .unwrap();

        assert_eq!("127.0.0.1:8080".parse::<SocketAddr>().unwrap(), listener.address);
        assert_eq!(DEFAULT_BUFFER_LIMIT, listener.per_connection_buffer_limit);
        assert_eq!(
            Some(DEFAULT_LISTENER_FILTERS_TIMEOUT),
            listener.listener_filters_timeout
        );
        assert_eq!(DEFAULT_BACKLOG, listener.socket.backlog);
        assert_eq!(DrainType::Default, listener.drain_type);
        assert_eq!(None, listener.socket.transparent);
    }

    #[test]
    fn zero_timeout_disables_listener_filter_timeout() {
        let listener = Listener::try_from(proto::Listener {
            name: "a".into(),
            address: address("127.0.0.1", 8080),
            listener_filters_timeout: Some(prost_types::Duration {
                seconds: 0,
                nanos: 0,
            }),
            ..<_>::default()
        })
        .unwrap();

        assert_eq!(None, listener.listener_filters_timeout);
    }

    #[test]
    fn missing_address_is_rejected() {
        assert_eq!(
            ValidationError::MissingAddress,
            Listener::try_from(proto::Listener {
                name: "a".into(),
                ..<_>::default()
            })
            .unwrap_err()
        );

        assert_eq!(
            ValidationError::InvalidAddress("not-an-ip".into()),
            Listener::try_from(proto::Listener {
                name: "a".into(),
                address: address("not-an-ip", 80),
                ..<_>::default()
            })
            .unwrap_err()
        );

        assert_eq!(
            ValidationError::InvalidPort {
                field: "address.port_value",
                value: 70000
            },
            Listener::try_from(proto::Listener {
                name: "a".into(),
                address: address("127.0.0.1", 70000),
                ..<_>::default()
            })
            .unwrap_err()
        );
    }

    #[test]
    fn unnamed_listener_gets_stable_name() {
        let resource = proto::Listener {
            address: address("10.0.0.1", 80),
            ..<_>::default()
        };

        let first = Listener::try_from(resource.clone()).unwrap();
        let second = Listener::try_from(resource).unwrap();

        assert!(first.name.starts_with("listener-"));
        assert_eq!(first.name, second.name);
    }

    #[test]
    fn filter_chain_match_conversion() {
        let chain = FilterChain::try_from(proto::FilterChain {
            name: "tls".into(),
            filter_chain_match: Some(proto::FilterChainMatch {
                destination_port: Some(443),
                prefix_ranges: vec![core::CidrRange {
                    address_prefix: "10.0.0.0".into(),
                    prefix_len: Some(8),
                }],
                server_names: vec!["*.Example.com".into(), "example.com".into()],
                transport_protocol: "tls".into(),
                source_ports: vec![5000],
                ..<_>::default()
            }),
            filters: vec![],
        })
        .unwrap();

        assert_eq!(
            FilterChainMatch {
                destination_port: Some(443),
                prefix_ranges: vec!["10.0.0.0/8".parse().unwrap()],
                server_names: vec![
                    ServerName::Wildcard(".example.com".into()),
                    ServerName::Exact("example.com".into()),
                ],
                transport_protocol: Some("tls".into()),
                application_protocols: vec![],
                source_prefix_ranges: vec![],
                source_ports: vec![5000],
            },
            chain.filter_chain_match
        );
    }

    #[test]
    fn invalid_cidr_is_rejected() {
        let result = FilterChainMatch::try_from(proto::FilterChainMatch {
            prefix_ranges: vec![core::CidrRange {
                address_prefix: "10.0.0.0".into(),
                prefix_len: Some(33),
            }],
            ..<_>::default()
        });

        assert_eq!(
            ValidationError::InvalidCidr {
                prefix: "10.0.0.0".into(),
                len: 33
            },
            result.unwrap_err()
        );
    }

    #[test]
    fn server_names() {
        assert_eq!(
            ServerName::Exact("a.com".into()),
            "A.com".parse::<ServerName>().unwrap()
        );
        assert_eq!(
            ServerName::Wildcard(".a.com".into()),
            "*.a.com".parse::<ServerName>().unwrap()
        );
        assert!("*".parse::<ServerName>().is_err());
        assert!("*a.com".parse::<ServerName>().is_err());
        assert!("a.*.com".parse::<ServerName>().is_err());
        assert!("".parse::<ServerName>().is_err());
    }

    #[test]
    fn socket_options() {
        let option = SocketOption::try_from(core::SocketOption {
            description: "keepalive".into(),
            level: 1,
            name: 9,
            state: core::socket_option::SocketState::StateListening as i32,
            value: Some(core::socket_option::Value::IntValue(1)),
        })
        .unwrap();

        assert_eq!(SocketState::Listening, option.state);
        assert_eq!(SocketOptionValue::Int(1), option.value);

        assert!(SocketOption::try_from(core::SocketOption {
            level: 1,
            name: 9,
            value: None,
            ..<_>::default()
        })
        .is_err());
    }

    #[test]
    fn duplicate_chain_names_are_rejected() {
        let chain = proto::FilterChain {
            name: "same".into(),
            ..<_>::default()
        };

        let result = Listener::try_from(proto::Listener {
            name: "a".into(),
            address: address("127.0.0.1", 80),
            filter_chains: vec![chain.clone(), chain],
            ..<_>::default()
        });

        assert!(matches!(result, Err(ValidationError::NotUnique(_))));
    }
}
