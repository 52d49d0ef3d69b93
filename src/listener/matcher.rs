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

//! Selection of the most specific filter chain for a connection.
//!
//! Every criterion of a chain must match for the chain to be a candidate.
//! Each field of a candidate is scored as a [`Specificity`], and candidates
//! are ranked first by how many fields they narrow and then field by field in
//! priority order: destination port, destination address, server name,
//! transport protocol, application protocol, source address, source port.
//! Candidates of equal rank are resolved by configuration order and reported
//! as ambiguous.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use ipnetwork::IpNetwork;

use crate::config::{FilterChain, FilterChainMatch, ServerName, RAW_BUFFER};

/// Metadata of an accepted connection, filled in by listener filters before
/// a filter chain is selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub destination: SocketAddr,
    pub source: SocketAddr,
    pub transport_protocol: String,
    /// Lowercase server name (SNI) if one was found.
    pub server_name: Option<String>,
    pub application_protocols: Vec<String>,
}

impl ConnectionInfo {
    /// Creates metadata for a `raw_buffer` connection. IPv4 mapped IPv6
    /// addresses, as reported by dual stack sockets, are stored as IPv4.
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            destination: canonical(destination),
            source: canonical(source),
            transport_protocol: RAW_BUFFER.into(),
            server_name: None,
            application_protocols: Vec::new(),
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.set_server_name(name);
        self
    }

    pub fn with_transport_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.transport_protocol = protocol.into();
        self
    }

    pub fn with_application_protocols(
        mut self,
        protocols: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.application_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_server_name(&mut self, name: impl Into<String>) {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.server_name = Some(name);
    }

    pub fn set_destination(&mut self, destination: SocketAddr) {
        self.destination = canonical(destination);
    }
}

fn canonical(address: SocketAddr) -> SocketAddr {
    match address {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => address,
        },
        SocketAddr::V4(_) => address,
    }
}

/// How narrowly one field of a chain's criteria matched a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    /// No criterion was declared.
    Wildcard,
    /// A prefix or suffix matched, graded by its length.
    Partial(u32),
    Exact,
}

impl Specificity {
    fn is_narrowed(self) -> bool {
        self != Self::Wildcard
    }
}

const FIELDS: usize = 7;

/// The ordering key of a candidate chain. Higher ranks are more specific.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rank {
    narrowed: u8,
    fields: [Specificity; FIELDS],
}

impl Rank {
    /// Ranks `criteria` against `info`, or `None` if any declared criterion
    /// does not match.
    pub fn of(criteria: &FilterChainMatch, info: &ConnectionInfo) -> Option<Self> {
        let fields = [
            destination_port(criteria, info)?,
            prefix(&criteria.prefix_ranges, info.destination.ip())?,
            server_name(&criteria.server_names, info.server_name.as_deref())?,
            transport_protocol(criteria, info)?,
            application_protocol(&criteria.application_protocols, info)?,
            prefix(&criteria.source_prefix_ranges, info.source.ip())?,
            source_port(&criteria.source_ports, info.source.port())?,
        ];

        let narrowed = fields.iter().filter(|field| field.is_narrowed()).count() as u8;
        Some(Self { narrowed, fields })
    }
}

fn destination_port(criteria: &FilterChainMatch, info: &ConnectionInfo) -> Option<Specificity> {
    match criteria.destination_port {
        None => Some(Specificity::Wildcard),
        Some(port) if port == info.destination.port() => Some(Specificity::Exact),
        Some(_) => None,
    }
}

fn prefix(ranges: &[IpNetwork], ip: IpAddr) -> Option<Specificity> {
    if ranges.is_empty() {
        return Some(Specificity::Wildcard);
    }

    ranges
        .iter()
        .filter(|range| range.contains(ip))
        .map(|range| {
            let full = match range {
                IpNetwork::V4(_) => 32,
                IpNetwork::V6(_) => 128,
            };

            if range.prefix() == full {
                Specificity::Exact
            } else {
                Specificity::Partial(range.prefix().into())
            }
        })
        .max()
}

fn server_name(names: &[ServerName], sni: Option<&str>) -> Option<Specificity> {
    if names.is_empty() {
        return Some(Specificity::Wildcard);
    }

    let sni = sni?;
    names
        .iter()
        .filter_map(|name| match name {
            ServerName::Exact(name) if name == sni => Some(Specificity::Exact),
            ServerName::Wildcard(suffix) if sni.len() > suffix.len() && sni.ends_with(&**suffix) => {
                Some(Specificity::Partial(suffix.len() as u32))
            }
            _ => None,
        })
        .max()
}

fn transport_protocol(criteria: &FilterChainMatch, info: &ConnectionInfo) -> Option<Specificity> {
    match &criteria.transport_protocol {
        None => Some(Specificity::Wildcard),
        Some(protocol) if *protocol == info.transport_protocol => Some(Specificity::Exact),
        Some(_) => None,
    }
}

fn application_protocol(protocols: &[String], info: &ConnectionInfo) -> Option<Specificity> {
    if protocols.is_empty() {
        Some(Specificity::Wildcard)
    } else if protocols
        .iter()
        .any(|protocol| info.application_protocols.contains(protocol))
    {
        Some(Specificity::Exact)
    } else {
        None
    }
}

fn source_port(ports: &[u16], port: u16) -> Option<Specificity> {
    if ports.is_empty() {
        Some(Specificity::Wildcard)
    } else if ports.contains(&port) {
        Some(Specificity::Exact)
    } else {
        None
    }
}

/// Raised when a connection matches no filter chain and the listener has no
/// fallback. The connection is closed, the listener is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no filter chain of listener `{listener}` matches connection from {peer} to {destination}")]
pub struct NoMatchError {
    pub listener: String,
    pub peer: SocketAddr,
    pub destination: SocketAddr,
}

/// Two filter chains of one listener declare identical match criteria, so
/// the later one is only reachable when the earlier one is removed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("filter chains #{first} and #{second} of listener `{listener}` have identical match criteria, #{first} takes precedence")]
pub struct AmbiguousMatch {
    pub listener: String,
    pub first: usize,
    pub second: usize,
}

/// The chain selected for a connection.
#[derive(Debug)]
pub struct Selection<'matcher> {
    pub chain: &'matcher Arc<FilterChain>,
    /// More than one chain had the selected chain's rank.
    pub ambiguous: bool,
    /// The listener's default chain was used.
    pub fallback: bool,
}

/// An immutable, ready to query view of a listener's filter chains.
#[derive(Debug)]
pub struct FilterChainMatcher {
    listener: String,
    chains: Vec<Arc<FilterChain>>,
    default_chain: Option<Arc<FilterChain>>,
}

impl FilterChainMatcher {
    pub fn new(
        listener: impl Into<String>,
        chains: impl IntoIterator<Item = FilterChain>,
        default_chain: Option<FilterChain>,
    ) -> Self {
        Self {
            listener: listener.into(),
            chains: chains.into_iter().map(Arc::new).collect(),
            default_chain: default_chain.map(Arc::new),
        }
    }

    pub fn from_listener(listener: &crate::config::Listener) -> Self {
        Self::new(
            listener.name.clone(),
            listener.filter_chains.iter().cloned(),
            listener.default_filter_chain.clone(),
        )
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    pub fn chains(&self) -> &[Arc<FilterChain>] {
        &self.chains
    }

    pub fn default_chain(&self) -> Option<&Arc<FilterChain>> {
        self.default_chain.as_ref()
    }

    /// Selects the most specific chain matching `info`, falling back to the
    /// default chain. Does not allocate.
    pub fn select(&self, info: &ConnectionInfo) -> Result<Selection<'_>, NoMatchError> {
        let mut best: Option<(Rank, &Arc<FilterChain>)> = None;
        let mut ambiguous = false;

        for chain in &self.chains {
            let Some(rank) = Rank::of(&chain.filter_chain_match, info) else {
                continue;
            };

            match &best {
                Some((best_rank, _)) if rank < *best_rank => {}
                Some((best_rank, _)) if rank == *best_rank => ambiguous = true,
                _ => {
                    best = Some((rank, chain));
                    ambiguous = false;
                }
            }
        }

        match (best, &self.default_chain) {
            (Some((_, chain)), _) => Ok(Selection {
                chain,
                ambiguous,
                fallback: false,
            }),
            (None, Some(chain)) => Ok(Selection {
                chain,
                ambiguous: false,
                fallback: true,
            }),
            (None, None) => Err(NoMatchError {
                listener: self.listener.clone(),
                peer: info.source,
                destination: info.destination,
            }),
        }
    }

    /// Reports chains whose criteria are identical to an earlier chain's,
    /// including several chains without any criteria.
    pub fn lint(&self) -> Vec<AmbiguousMatch> {
        let mut seen = HashMap::<&FilterChainMatch, usize>::new();
        let mut lints = Vec::new();

        for (index, chain) in self.chains.iter().enumerate() {
            match seen.get(&chain.filter_chain_match) {
                Some(first) => lints.push(AmbiguousMatch {
                    listener: self.listener.clone(),
                    first: *first,
                    second: index,
                }),
                None => {
                    seen.insert(&chain.filter_chain_match, index);
                }
            }
        }

        lints
    }
}
