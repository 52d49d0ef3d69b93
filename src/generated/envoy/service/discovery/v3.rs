/// A DiscoveryRequest requests a set of versioned resources of the same type
/// for a given Envoy node on some API.
/// \[#next-free-field: 7\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryRequest {
    /// The version_info provided in the request messages will be the version_info
    /// received with the most recent successfully processed response or empty on
    /// the first request.
    #[prost(string, tag = "1")]
    pub version_info: ::prost::alloc::string::String,
    /// The node making the request.
    #[prost(message, optional, tag = "2")]
    pub node: ::core::option::Option<super::super::super::config::core::v3::Node>,
    /// List of resources to subscribe to, e.g. list of cluster names or a route
    /// configuration name. If this is empty, all resources for the API are
    /// returned.
    #[prost(string, repeated, tag = "3")]
    pub resource_names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Type of the resource that is being requested.
    #[prost(string, tag = "4")]
    pub type_url: ::prost::alloc::string::String,
    /// nonce corresponding to DiscoveryResponse being ACK/NACKed.
    #[prost(string, tag = "5")]
    pub response_nonce: ::prost::alloc::string::String,
    /// This is populated when the previous DiscoveryResponse failed to update
    /// configuration.
    #[prost(message, optional, tag = "6")]
    pub error_detail: ::core::option::Option<super::super::super::super::google::rpc::Status>,
}
/// \[#next-free-field: 7\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryResponse {
    /// The version of the response data.
    #[prost(string, tag = "1")]
    pub version_info: ::prost::alloc::string::String,
    /// The response resources.
    #[prost(message, repeated, tag = "2")]
    pub resources: ::prost::alloc::vec::Vec<::prost_types::Any>,
    /// Canary is used to support two Envoy command line flags. Ignored.
    #[prost(bool, tag = "3")]
    pub canary: bool,
    /// Type URL for resources.
    #[prost(string, tag = "4")]
    pub type_url: ::prost::alloc::string::String,
    /// For gRPC based subscriptions, the nonce provides a way to explicitly ack a
    /// specific DiscoveryResponse in a following DiscoveryRequest.
    #[prost(string, tag = "5")]
    pub nonce: ::prost::alloc::string::String,
    /// The control plane instance that sent the response.
    #[prost(message, optional, tag = "6")]
    pub control_plane: ::core::option::Option<
        super::super::super::config::core::v3::ControlPlane,
    >,
}
/// DeltaDiscoveryRequest and DeltaDiscoveryResponse are used in a new gRPC
/// endpoint for Delta xDS.
/// \[#next-free-field: 8\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeltaDiscoveryRequest {
    /// The node making the request.
    #[prost(message, optional, tag = "1")]
    pub node: ::core::option::Option<super::super::super::config::core::v3::Node>,
    /// Type of the resource that is being requested.
    #[prost(string, tag = "2")]
    pub type_url: ::prost::alloc::string::String,
    /// DeltaDiscoveryRequests allow the client to add or remove individual
    /// resources to the set of tracked resources in the context of a stream.
    #[prost(string, repeated, tag = "3")]
    pub resource_names_subscribe: ::prost::alloc::vec::Vec<
        ::prost::alloc::string::String,
    >,
    /// A list of Resource names to remove from the list of tracked resources.
    #[prost(string, repeated, tag = "4")]
    pub resource_names_unsubscribe: ::prost::alloc::vec::Vec<
        ::prost::alloc::string::String,
    >,
    /// Informs the server of the versions of the resources the xDS client knows
    /// of, to enable the client to continue the same logical xDS session even in
    /// the face of gRPC stream reconnection.
    #[prost(map = "string, string", tag = "5")]
    pub initial_resource_versions: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
    /// When the DeltaDiscoveryRequest is a ACK or NACK message in response
    /// to a previous DeltaDiscoveryResponse, the response_nonce must be the
    /// nonce in the DeltaDiscoveryResponse.
    #[prost(string, tag = "6")]
    pub response_nonce: ::prost::alloc::string::String,
    /// This is populated when the previous DeltaDiscoveryResponse failed to
    /// update configuration.
    #[prost(message, optional, tag = "7")]
    pub error_detail: ::core::option::Option<super::super::super::super::google::rpc::Status>,
}
/// \[#next-free-field: 8\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeltaDiscoveryResponse {
    /// The version of the response data (used for debugging).
    #[prost(string, tag = "1")]
    pub system_version_info: ::prost::alloc::string::String,
    /// The response resources. These are typed resources, whose types must match
    /// the type_url field.
    #[prost(message, repeated, tag = "2")]
    pub resources: ::prost::alloc::vec::Vec<Resource>,
    /// Type URL for resources.
    #[prost(string, tag = "4")]
    pub type_url: ::prost::alloc::string::String,
    /// Resources names of resources that have be deleted and to be removed from
    /// the xDS Client. Removed resources for missing resources can be ignored.
    #[prost(string, repeated, tag = "6")]
    pub removed_resources: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// The nonce provides a way for DeltaDiscoveryRequests to uniquely
    /// reference a DeltaDiscoveryResponse when (N)ACKing.
    #[prost(string, tag = "5")]
    pub nonce: ::prost::alloc::string::String,
    /// The control plane instance that sent the response.
    #[prost(message, optional, tag = "7")]
    pub control_plane: ::core::option::Option<
        super::super::super::config::core::v3::ControlPlane,
    >,
}
/// \[#next-free-field: 8\]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    /// The resource's name, to distinguish it from others of the same type of
    /// resource.
    #[prost(string, tag = "3")]
    pub name: ::prost::alloc::string::String,
    /// The aliases are a list of other names that this resource can go by.
    #[prost(string, repeated, tag = "4")]
    pub aliases: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// The resource level version. It allows xDS to track the state of individual
    /// resources.
    #[prost(string, tag = "1")]
    pub version: ::prost::alloc::string::String,
    /// The resource being tracked.
    #[prost(message, optional, tag = "2")]
    pub resource: ::core::option::Option<::prost_types::Any>,
}
