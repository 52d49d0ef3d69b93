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

//! Detects TLS connections by peeking at the ClientHello, recording the
//! `tls` transport protocol, the server name and the offered ALPN protocols.

use std::{sync::Arc, time::Duration};

use tokio::net::TcpStream;

use super::{DynListenerFilterFactory, FilterError, ListenerFilter, ListenerFilterFactory};
use crate::{config::ValidationError, listener::matcher::ConnectionInfo};

pub const NAME: &str = "envoy.filters.listener.tls_inspector";
pub const TLS: &str = "tls";

const RECORD_HEADER_LEN: usize = 5;
/// The largest plaintext TLS record.
const MAX_RECORD_LEN: usize = 1 << 14;
const HANDSHAKE: u8 = 0x16;
const CLIENT_HELLO: u8 = 0x01;
const SERVER_NAME: u16 = 0x0000;
const HOST_NAME: u8 = 0x00;
const ALPN: u16 = 0x0010;
const MAX_BACKOFF: Duration = Duration::from_millis(50);

pub fn factory() -> DynListenerFilterFactory {
    Arc::new(TlsInspectorFactory)
}

struct TlsInspectorFactory;

impl ListenerFilterFactory for TlsInspectorFactory {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create_filter(
        &self,
        _: Option<&prost_types::Any>,
    ) -> Result<Arc<dyn ListenerFilter>, ValidationError> {
        Ok(Arc::new(TlsInspector))
    }
}

#[derive(Debug, Default)]
pub struct TlsInspector;

#[async_trait::async_trait]
impl ListenerFilter for TlsInspector {
    async fn on_accept(
        &self,
        stream: &TcpStream,
        info: &mut ConnectionInfo,
    ) -> Result<(), FilterError> {
        let mut buf = vec![0; RECORD_HEADER_LEN + MAX_RECORD_LEN];
        let mut seen = 0;
        let mut backoff = Duration::from_millis(1);

        loop {
            let peeked = stream.peek(&mut buf).await?;
            if peeked == 0 {
                return Ok(());
            }

            match parse(&buf[..peeked]) {
                Parsed::ClientHello(hello) => {
                    tracing::trace!(server_name = ?hello.server_name, alpn = ?hello.alpn, "found tls client hello");
                    info.transport_protocol = TLS.into();
                    if let Some(name) = hello.server_name {
                        info.set_server_name(name);
                    }
                    info.application_protocols = hello.alpn;
                    return Ok(());
                }
                Parsed::NotTls => return Ok(()),
                Parsed::Incomplete if peeked == buf.len() => return Ok(()),
                Parsed::Incomplete => {
                    // peeked data keeps the socket readable, so wait for more
                    // data by polling with a backoff.
                    if peeked == seen {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                    seen = peeked;
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ClientHello {
    pub server_name: Option<String>,
    pub alpn: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Parsed {
    ClientHello(ClientHello),
    NotTls,
    Incomplete,
}

/// Parses the first TLS record of a connection.
pub(crate) fn parse(data: &[u8]) -> Parsed {
    match data.first() {
        None => return Parsed::Incomplete,
        Some(&HANDSHAKE) => {}
        Some(_) => return Parsed::NotTls,
    }

    if data.len() < RECORD_HEADER_LEN {
        return Parsed::Incomplete;
    }

    // SSLv3 and every TLS version share major version 3.
    if data[1] != 3 {
        return Parsed::NotTls;
    }

    let record_len = usize::from(u16::from_be_bytes([data[3], data[4]]));
    if record_len > MAX_RECORD_LEN {
        return Parsed::NotTls;
    }

    let Some(record) = data.get(RECORD_HEADER_LEN..RECORD_HEADER_LEN + record_len) else {
        return Parsed::Incomplete;
    };

    match parse_client_hello(&mut Reader(record)) {
        Some(hello) => Parsed::ClientHello(hello),
        None => Parsed::NotTls,
    }
}

fn parse_client_hello(record: &mut Reader<'_>) -> Option<ClientHello> {
    if record.u8()? != CLIENT_HELLO {
        return None;
    }

    // A client hello spanning several records is inspected up to the end of
    // the first one.
    let len = record.u24()?;
    let mut hello = Reader(record.take(len).unwrap_or(record.0));

    // legacy_version, random
    hello.skip(2 + 32)?;
    let session_id = usize::from(hello.u8()?);
    hello.skip(session_id)?;
    let cipher_suites = usize::from(hello.u16()?);
    hello.skip(cipher_suites)?;
    let compression_methods = usize::from(hello.u8()?);
    hello.skip(compression_methods)?;

    let mut parsed = ClientHello {
        server_name: None,
        alpn: Vec::new(),
    };

    if hello.0.is_empty() {
        return Some(parsed);
    }

    let extensions_len = usize::from(hello.u16()?);
    let mut extensions = Reader(hello.take(extensions_len).unwrap_or(hello.0));

    while let (Some(kind), Some(len)) = (extensions.u16(), extensions.u16()) {
        let Some(data) = extensions.take(usize::from(len)) else {
            break;
        };

        match kind {
            SERVER_NAME => parsed.server_name = server_name(&mut Reader(data)),
            ALPN => parsed.alpn = alpn(&mut Reader(data)).unwrap_or_default(),
            _ => {}
        }
    }

    Some(parsed)
}

fn server_name(data: &mut Reader<'_>) -> Option<String> {
    let len = usize::from(data.u16()?);
    let mut names = Reader(data.take(len)?);

    while !names.0.is_empty() {
        let kind = names.u8()?;
        let len = usize::from(names.u16()?);
        let name = names.take(len)?;

        if kind == HOST_NAME {
            let name = std::str::from_utf8(name).ok()?;
            return Some(name.trim_end_matches('.').to_ascii_lowercase());
        }
    }

    None
}

fn alpn(data: &mut Reader<'_>) -> Option<Vec<String>> {
    let len = usize::from(data.u16()?);
    let mut list = Reader(data.take(len)?);
    let mut protocols = Vec::new();

    while !list.0.is_empty() {
        let len = usize::from(list.u8()?);
        let protocol = list.take(len)?;
        protocols.push(String::from_utf8_lossy(protocol).into_owned());
    }

    Some(protocols)
}

/// A bounds checked big endian cursor.
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.0.len() < len {
            return None;
        }

        let (head, tail) = self.0.split_at(len);
        self.0 = tail;
        Some(head)
    }

    fn skip(&mut self, len: usize) -> Option<()> {
        self.take(len).map(drop)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|bytes| bytes[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u24(&mut self) -> Option<usize> {
        self.take(3)
            .map(|bytes| usize::from(bytes[0]) << 16 | usize::from(bytes[1]) << 8 | usize::from(bytes[2]))
    }
}
