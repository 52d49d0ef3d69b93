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

//! Listener filters inspect a freshly accepted connection, without consuming
//! any of its bytes, and fill in the [`ConnectionInfo`] used to select a
//! filter chain.

pub mod original_dst;
pub mod tls_inspector;

use std::{collections::HashMap, sync::Arc};

use tokio::net::TcpStream;

use super::matcher::ConnectionInfo;
use crate::config::{ListenerFilterConfig, ValidationError};

/// An owned pointer to a dynamic [`ListenerFilterFactory`] instance.
pub type DynListenerFilterFactory = Arc<dyn ListenerFilterFactory>;

/// An error a listener filter raises while inspecting a connection. The
/// connection is closed.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Inspects an accepted connection before filter chain selection.
#[async_trait::async_trait]
pub trait ListenerFilter: Send + Sync {
    /// Enriches `info`. Implementations may peek at `stream` but must not
    /// read from it.
    async fn on_accept(&self, stream: &TcpStream, info: &mut ConnectionInfo)
        -> Result<(), FilterError>;
}

/// Provides the name and creation function for a given [`ListenerFilter`].
pub trait ListenerFilterFactory: Sync + Send {
    /// The name listener resources refer to the filter by, e.g.
    /// `envoy.filters.listener.tls_inspector`.
    fn name(&self) -> &'static str;

    /// Returns a filter based on its typed configuration.
    fn create_filter(
        &self,
        config: Option<&prost_types::Any>,
    ) -> Result<Arc<dyn ListenerFilter>, ValidationError>;
}

/// The listener filters available to listener resources, keyed by name.
#[derive(Clone)]
pub struct ListenerFilterRegistry {
    factories: HashMap<&'static str, DynListenerFilterFactory>,
}

impl Default for ListenerFilterRegistry {
    /// The built in filters:
    /// - [`tls_inspector`]
    /// - [`original_dst`]
    fn default() -> Self {
        Self::with([tls_inspector::factory(), original_dst::factory()])
    }
}

impl std::fmt::Debug for ListenerFilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ListenerFilterRegistry {
    /// A registry with only `factories`, without the built in filters.
    pub fn with(factories: impl IntoIterator<Item = DynListenerFilterFactory>) -> Self {
        Self {
            factories: factories
                .into_iter()
                .map(|factory| (factory.name(), factory))
                .collect(),
        }
    }

    /// Adds `factory`, replacing any factory of the same name.
    pub fn register(&mut self, factory: DynListenerFilterFactory) {
        self.factories.insert(factory.name(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Creates the filter a listener resource refers to.
    pub fn create(
        &self,
        config: &ListenerFilterConfig,
    ) -> Result<Arc<dyn ListenerFilter>, ValidationError> {
        self.factories
            .get(&*config.name)
            .ok_or_else(|| ValidationError::UnknownListenerFilter(config.name.clone()))?
            .create_filter(config.typed_config.as_ref())
    }

    /// Creates every filter of a listener, in order.
    pub fn create_all(
        &self,
        configs: &[ListenerFilterConfig],
    ) -> Result<Vec<Arc<dyn ListenerFilter>>, ValidationError> {
        configs.iter().map(|config| self.create(config)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagger;

    #[async_trait::async_trait]
    impl ListenerFilter for Tagger {
        async fn on_accept(
            &self,
            _: &TcpStream,
            info: &mut ConnectionInfo,
        ) -> Result<(), FilterError> {
            info.transport_protocol = "tagged".into();
            Ok(())
        }
    }

    struct TaggerFactory;

    impl ListenerFilterFactory for TaggerFactory {
        fn name(&self) -> &'static str {
            "test.tagger"
        }

        fn create_filter(
            &self,
            _: Option<&prost_types::Any>,
        ) -> Result<Arc<dyn ListenerFilter>, ValidationError> {
            Ok(Arc::new(Tagger))
        }
    }

    fn config(name: &str) -> ListenerFilterConfig {
        ListenerFilterConfig {
            name: name.into(),
            typed_config: None,
        }
    }

    #[test]
    fn defaults() {
        let registry = ListenerFilterRegistry::default();
        assert!(registry.contains(tls_inspector::NAME));
        assert!(registry.contains(original_dst::NAME));
    }

    #[test]
    fn unknown_filter() {
        let registry = ListenerFilterRegistry::default();
        assert_eq!(
            ValidationError::UnknownListenerFilter("not.found".into()),
            registry.create(&config("not.found")).err().unwrap()
        );
    }

    #[tokio::test]
    async fn custom_filter() {
        let mut registry = ListenerFilterRegistry::default();
        registry.register(Arc::new(TaggerFactory));

        let filters = registry
            .create_all(&[config(tls_inspector::NAME), config("test.tagger")])
            .unwrap();
        assert_eq!(2, filters.len());

        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let address = listener.local_addr().unwrap();
        let (_client, accepted) =
            tokio::join!(TcpStream::connect(address), listener.accept());
        let (stream, peer) = accepted.unwrap();

        let mut info = ConnectionInfo::new(peer, address);
        filters[1].on_accept(&stream, &mut info).await.unwrap();
        assert_eq!("tagged", info.transport_protocol);
    }
}
