/// Specifies the match criteria for selecting a specific filter chain for a
/// listener.
///
/// In order for a filter chain to be selected, *all* of its criteria must be
/// fulfilled by the incoming connection, properties of which are set by the
/// networking stack and/or listener filters.
/// \[#next-free-field: 14\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilterChainMatch {
    /// Optional destination port to consider when use_original_dst is set on the
    /// listener in determining a filter chain match.
    #[prost(message, optional, tag = "8")]
    pub destination_port: ::core::option::Option<u32>,
    /// If non-empty, an IP address and prefix length to match addresses when the
    /// listener is bound to 0.0.0.0/:: or when use_original_dst is specified.
    #[prost(message, repeated, tag = "3")]
    pub prefix_ranges: ::prost::alloc::vec::Vec<super::super::core::v3::CidrRange>,
    /// The criteria is satisfied if the source IP address of the downstream
    /// connection is contained in at least one of the specified subnets.
    #[prost(message, repeated, tag = "6")]
    pub source_prefix_ranges: ::prost::alloc::vec::Vec<
        super::super::core::v3::CidrRange,
    >,
    /// The criteria is satisfied if the source port of the downstream connection
    /// is contained in at least one of the specified ports.
    #[prost(uint32, repeated, packed = "false", tag = "7")]
    pub source_ports: ::prost::alloc::vec::Vec<u32>,
    /// If non-empty, a list of server names (e.g. SNI for TLS protocol) to consider
    /// when determining a filter chain match. Wildcard names such as
    /// ``*.example.com`` match any subdomain.
    #[prost(string, repeated, tag = "11")]
    pub server_names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// If non-empty, a transport protocol to consider when determining a filter
    /// chain match. Suggested values include ``raw_buffer`` and ``tls``.
    #[prost(string, tag = "9")]
    pub transport_protocol: ::prost::alloc::string::String,
    /// If non-empty, a list of application protocols (e.g. ALPN for TLS protocol)
    /// to consider when determining a filter chain match.
    #[prost(string, repeated, tag = "10")]
    pub application_protocols: ::prost::alloc::vec::Vec<
        ::prost::alloc::string::String,
    >,
}
/// A filter chain wraps a set of match criteria and the filters to build for
/// connections matching them.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilterChain {
    /// The criteria to use when matching a connection to this filter chain.
    #[prost(message, optional, tag = "1")]
    pub filter_chain_match: ::core::option::Option<FilterChainMatch>,
    /// A list of individual network filters that make up the filter chain for
    /// connections established with the listener.
    #[prost(message, repeated, tag = "3")]
    pub filters: ::prost::alloc::vec::Vec<Filter>,
    /// The unique name (or empty) by which this filter chain is known.
    #[prost(string, tag = "7")]
    pub name: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Filter {
    /// The name of the filter configuration.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(oneof = "filter::ConfigType", tags = "4")]
    pub config_type: ::core::option::Option<filter::ConfigType>,
}
/// Nested message and enum types in `Filter`.
pub mod filter {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ConfigType {
        /// Filter specific configuration which depends on the filter being
        /// instantiated.
        #[prost(message, tag = "4")]
        TypedConfig(::prost_types::Any),
    }
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListenerFilter {
    /// The name of the filter configuration.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(oneof = "listener_filter::ConfigType", tags = "3")]
    pub config_type: ::core::option::Option<listener_filter::ConfigType>,
}
/// Nested message and enum types in `ListenerFilter`.
pub mod listener_filter {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ConfigType {
        #[prost(message, tag = "3")]
        TypedConfig(::prost_types::Any),
    }
}
/// \[#next-free-field: 29\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Listener {
    /// The unique name by which this listener is known. If no name is provided,
    /// one is assigned.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    /// The address that the listener should listen on. This field is required.
    #[prost(message, optional, tag = "2")]
    pub address: ::core::option::Option<super::super::core::v3::Address>,
    /// A list of filter chains to consider for this listener.
    #[prost(message, repeated, tag = "3")]
    pub filter_chains: ::prost::alloc::vec::Vec<FilterChain>,
    /// Deprecated. Superseded by filter chain matching on the original
    /// destination.
    #[prost(message, optional, tag = "4")]
    pub use_original_dst: ::core::option::Option<bool>,
    /// Soft limit on size of the listener’s new connection read and write buffers.
    /// If unspecified, an implementation defined default is applied (1MiB).
    #[prost(message, optional, tag = "5")]
    pub per_connection_buffer_limit_bytes: ::core::option::Option<u32>,
    #[prost(message, optional, tag = "7")]
    pub deprecated_v1: ::core::option::Option<listener::DeprecatedV1>,
    /// The type of draining to perform at a listener-wide level.
    #[prost(enumeration = "listener::DrainType", tag = "8")]
    pub drain_type: i32,
    /// Listener filters have the opportunity to manipulate and augment the
    /// connection metadata that is used in connection filter chain matching.
    #[prost(message, repeated, tag = "9")]
    pub listener_filters: ::prost::alloc::vec::Vec<ListenerFilter>,
    /// Whether the listener should be set as a transparent socket.
    #[prost(message, optional, tag = "10")]
    pub transparent: ::core::option::Option<bool>,
    /// Whether the listener should set the IP_FREEBIND socket option.
    #[prost(message, optional, tag = "11")]
    pub freebind: ::core::option::Option<bool>,
    /// Whether the listener should accept TCP Fast Open (TFO) connections, and
    /// the length of the TFO pending queue.
    #[prost(message, optional, tag = "12")]
    pub tcp_fast_open_queue_length: ::core::option::Option<u32>,
    /// Additional socket options that may not be present in the proxy source
    /// code or precompiled binaries.
    #[prost(message, repeated, tag = "13")]
    pub socket_options: ::prost::alloc::vec::Vec<super::super::core::v3::SocketOption>,
    /// The timeout to wait for all listener filters to complete operation. If
    /// the timeout is reached, the accepted socket is closed without a
    /// connection being created unless
    /// ``continue_on_listener_filters_timeout`` is set. Specify 0 to disable the
    /// timeout. If not specified, a default timeout of 15s is used.
    #[prost(message, optional, tag = "15")]
    pub listener_filters_timeout: ::core::option::Option<::prost_types::Duration>,
    /// Whether a connection should be created when listener filters timeout.
    #[prost(bool, tag = "17")]
    pub continue_on_listener_filters_timeout: bool,
    /// The maximum length a tcp listener's pending connections queue can grow
    /// to.
    #[prost(message, optional, tag = "24")]
    pub tcp_backlog_size: ::core::option::Option<u32>,
    /// The default filter chain if none of the filter chain matches.
    #[prost(message, optional, tag = "25")]
    pub default_filter_chain: ::core::option::Option<FilterChain>,
    /// Whether the listener should bind to the port.
    #[prost(message, optional, tag = "26")]
    pub bind_to_port: ::core::option::Option<bool>,
    /// If given, the stat prefix used for listener stats.
    #[prost(string, tag = "28")]
    pub stat_prefix: ::prost::alloc::string::String,
}
/// Nested message and enum types in `Listener`.
pub mod listener {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeprecatedV1 {
        /// Whether the listener should bind to the port.
        #[prost(message, optional, tag = "1")]
        pub bind_to_port: ::core::option::Option<bool>,
    }
    #[derive(
        Clone,
        Copy,
        Debug,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        ::prost::Enumeration
    )]
    #[repr(i32)]
    pub enum DrainType {
        /// Drain in response to calling /healthcheck/fail admin endpoint (along
        /// with the health check filter), listener removal/modification, and
        /// hot restart.
        Default = 0,
        /// Drain in response to listener removal/modification and hot restart.
        /// This setting does not include /healthcheck/fail.
        ModifyOnly = 1,
    }
}
