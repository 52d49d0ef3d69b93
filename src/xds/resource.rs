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

use prost::Message;

use super::ResourceError;
use crate::{
    config::{Listener, ListenerDefaults},
    generated::envoy::config::listener::v3 as proto,
};

pub const LISTENER_TYPE: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// A listener resource decoded from the wire, before validation.
#[derive(Clone, Debug)]
pub struct ListenerResource {
    pub name: String,
    /// Fingerprint of the resource content.
    pub hash: u64,
    proto: proto::Listener,
}

impl ListenerResource {
    /// Decodes `any`. When `expected_name` is set, the resource must either
    /// carry that name or none at all.
    pub fn decode(
        any: &prost_types::Any,
        expected_name: Option<&str>,
    ) -> Result<Self, ResourceError> {
        if any.type_url != LISTENER_TYPE {
            return Err(ResourceError::UnexpectedType(any.type_url.clone()));
        }

        let mut proto = proto::Listener::decode(&*any.value)?;
        match expected_name {
            Some(expected) if proto.name.is_empty() => proto.name = expected.to_owned(),
            Some(expected) if proto.name != expected => {
                return Err(ResourceError::NameMismatch {
                    expected: expected.to_owned(),
                    actual: proto.name,
                })
            }
            _ => {}
        }

        let hash = seahash::hash(&proto.encode_to_vec());
        let name = if proto.name.is_empty() {
            Listener::generated_name(hash)
        } else {
            proto.name.clone()
        };

        Ok(Self { name, hash, proto })
    }

    /// Validates the resource into a [`Listener`].
    pub fn into_listener(self, defaults: &ListenerDefaults) -> Result<Listener, ResourceError> {
        Ok(Listener::from_proto(self.proto, defaults)?)
    }
}

/// Wraps `listener` for a discovery response.
pub fn to_any(listener: &proto::Listener) -> prost_types::Any {
    prost_types::Any {
        type_url: LISTENER_TYPE.into(),
        value: listener.encode_to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;
    use pretty_assertions::assert_eq;

    fn listener(name: &str) -> proto::Listener {
        proto::Listener {
            name: name.into(),
            address: Some(crate::test::socket_address("127.0.0.1", 0)),
            ..<_>::default()
        }
    }

    #[test]
    fn decodes_named_listener() {
        let resource = ListenerResource::decode(&to_any(&listener("a")), None).unwrap();
        assert_eq!("a", resource.name);

        let listener = resource.into_listener(&<_>::default()).unwrap();
        assert_eq!("a", listener.name);
    }

    #[test]
    fn unnamed_listener_gets_stable_name() {
        let any = to_any(&listener(""));
        let first = ListenerResource::decode(&any, None).unwrap();
        let second = ListenerResource::decode(&any, None).unwrap();

        assert_eq!(first.name, second.name);
        assert!(first.name.starts_with("listener-"));
        assert_eq!(first.name.clone(), first.into_listener(&<_>::default()).unwrap().name);
    }

    #[test]
    fn expected_name() {
        let resource = ListenerResource::decode(&to_any(&listener("")), Some("b")).unwrap();
        assert_eq!("b", resource.name);

        assert!(matches!(
            ListenerResource::decode(&to_any(&listener("a")), Some("b")),
            Err(ResourceError::NameMismatch { .. })
        ));
    }

    #[test]
    fn rejects_other_types_and_garbage() {
        let mut any = to_any(&listener("a"));
        any.type_url = "type.googleapis.com/envoy.config.cluster.v3.Cluster".into();
        assert!(matches!(
            ListenerResource::decode(&any, None),
            Err(ResourceError::UnexpectedType(_))
        ));

        let any = prost_types::Any {
            type_url: LISTENER_TYPE.into(),
            value: vec![0xff, 0xff, 0xff],
        };
        assert!(matches!(
            ListenerResource::decode(&any, None),
            Err(ResourceError::Invalid(ValidationError::Decode(_)))
        ));
    }

    #[test]
    fn content_changes_hash() {
        let a = ListenerResource::decode(&to_any(&listener("a")), None).unwrap();
        let mut changed = listener("a");
        changed.tcp_backlog_size = Some(10);
        let b = ListenerResource::decode(&to_any(&changed), None).unwrap();
        assert_ne!(a.hash, b.hash);
    }
}
