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

//! Restores the destination of connections redirected to the listener by
//! netfilter (`iptables -j REDIRECT` or `TPROXY`).

use std::sync::Arc;

use tokio::net::TcpStream;

use super::{DynListenerFilterFactory, FilterError, ListenerFilter, ListenerFilterFactory};
use crate::{config::ValidationError, listener::matcher::ConnectionInfo};

pub const NAME: &str = "envoy.filters.listener.original_dst";

pub fn factory() -> DynListenerFilterFactory {
    Arc::new(OriginalDstFactory)
}

struct OriginalDstFactory;

impl ListenerFilterFactory for OriginalDstFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    #[cfg(target_os = "linux")]
    fn create_filter(
        &self,
        _: Option<&prost_types::Any>,
    ) -> Result<Arc<dyn ListenerFilter>, ValidationError> {
        Ok(Arc::new(OriginalDst))
    }

    #[cfg(not(target_os = "linux"))]
    fn create_filter(
        &self,
        _: Option<&prost_types::Any>,
    ) -> Result<Arc<dyn ListenerFilter>, ValidationError> {
        Err(crate::config::ValueInvalidArgs::new(
            "listener_filters",
            format!("`{NAME}` is only supported on linux"),
        )
        .into())
    }
}

#[derive(Debug, Default)]
pub struct OriginalDst;

#[async_trait::async_trait]
impl ListenerFilter for OriginalDst {
    async fn on_accept(
        &self,
        stream: &TcpStream,
        info: &mut ConnectionInfo,
    ) -> Result<(), FilterError> {
        match original_destination(stream, info.destination.is_ipv4()) {
            Ok(destination) if destination != info.destination => {
                tracing::trace!(%destination, local = %info.destination, "restored original destination");
                info.set_destination(destination);
            }
            Ok(_) => {}
            // Connections that were not redirected have no original
            // destination and keep their local address.
            Err(error) => {
                tracing::trace!(%error, "no original destination");
            }
        }

        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn original_destination(stream: &TcpStream, ipv4: bool) -> std::io::Result<std::net::SocketAddr> {
    let socket = socket2::SockRef::from(stream);
    let address = if ipv4 {
        socket.original_dst()?
    } else {
        socket.original_dst_ipv6()?
    };

    address.as_socket().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "original destination is not an inet address",
        )
    })
}

#[cfg(not(target_os = "linux"))]
fn original_destination(_: &TcpStream, _: bool) -> std::io::Result<std::net::SocketAddr> {
    Err(std::io::ErrorKind::Unsupported.into())
}
