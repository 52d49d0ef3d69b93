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

//! Creation of listening sockets from a listener's [`SocketConfig`].

use std::{io, net::SocketAddr};

use socket2::{Domain, Protocol, Type};

use crate::config::{SocketConfig, SocketOption, SocketOptionValue, SocketState};

/// Failure to create a listener's socket. Only the listener being created is
/// affected, every other listener keeps running.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to create socket for {address}: {source}")]
    Create {
        address: SocketAddr,
        source: io::Error,
    },
    #[error("failed to set {option} on {address}: {source}")]
    Option {
        address: SocketAddr,
        option: String,
        source: io::Error,
    },
    #[error("{option} is not supported on this platform")]
    Unsupported {
        address: SocketAddr,
        option: String,
    },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: io::Error,
    },
    #[error("failed to listen on {address}: {source}")]
    Listen {
        address: SocketAddr,
        source: io::Error,
    },
    #[error("{address} is already owned by listener `{owner}`")]
    AddressOwned { address: SocketAddr, owner: String },
    #[error("failed to register {address} with the runtime: {source}")]
    Register {
        address: SocketAddr,
        source: io::Error,
    },
}

/// A bound, listening TCP socket, configured but not yet registered with
/// the async runtime.
#[derive(Debug)]
#[repr(transparent)]
pub struct ListenSocket(socket2::Socket);

impl ListenSocket {
    /// Creates, configures, binds and listens on `address`. Socket options
    /// are applied in the state they are declared for, fields left unset keep
    /// the OS default.
    pub fn bind(address: SocketAddr, config: &SocketConfig) -> Result<Self, BindError> {
        let socket = socket2::Socket::new(
            Domain::for_address(address),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(|source| BindError::Create { address, source })?;

        let option_error = |option: &str| {
            let option = option.to_owned();
            move |source: io::Error| BindError::Option {
                address,
                option,
                source,
            }
        };

        socket
            .set_reuse_address(true)
            .map_err(option_error("SO_REUSEADDR"))?;

        // A replacement listener binds next to the one it retires.
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket
            .set_reuse_port(true)
            .map_err(option_error("SO_REUSEPORT"))?;

        if let SocketAddr::V6(v6) = address {
            if v6.ip().is_unspecified() {
                // be explicit so we can have dual stack sockets.
                socket
                    .set_only_v6(false)
                    .map_err(option_error("IPV6_V6ONLY"))?;
            }
        }

        if let Some(transparent) = config.transparent {
            set_transparent(&socket, address, transparent)?;
        }

        if let Some(freebind) = config.freebind {
            set_freebind(&socket, address, freebind)?;
        }

        apply_options(&socket, address, &config.options, SocketState::Prebind)?;

        socket
            .bind(&address.into())
            .map_err(|source| BindError::Bind { address, source })?;

        apply_options(&socket, address, &config.options, SocketState::Bound)?;

        if let Some(queue_length) = config.tcp_fast_open_queue_length {
            set_tcp_fast_open(&socket, address, queue_length)?;
        }

        let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
        socket
            .listen(backlog)
            .map_err(|source| BindError::Listen { address, source })?;

        apply_options(&socket, address, &config.options, SocketState::Listening)?;

        socket
            .set_nonblocking(true)
            .map_err(option_error("O_NONBLOCK"))?;

        tracing::debug!(%address, backlog, "listening socket created");
        Ok(Self(socket))
    }

    /// The address the socket is actually bound to, which differs from the
    /// configured one for port `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "not an inet socket"))
    }

    /// Another handle to the same listening socket.
    pub fn try_clone(&self) -> io::Result<Self> {
        self.0.try_clone().map(Self)
    }

    /// Registers the socket with the current tokio runtime.
    pub fn into_tokio(self) -> io::Result<tokio::net::TcpListener> {
        tokio::net::TcpListener::from_std(std::net::TcpListener::from(self.0))
    }

    pub fn into_inner(self) -> socket2::Socket {
        self.0
    }
}

impl std::ops::Deref for ListenSocket {
    type Target = socket2::Socket;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Sizes the kernel buffers of an accepted connection.
pub fn apply_buffer_limit(stream: &tokio::net::TcpStream, limit: u32) -> io::Result<()> {
    let socket = socket2::SockRef::from(stream);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    socket.set_recv_buffer_size(limit)?;
    socket.set_send_buffer_size(limit)
}

fn apply_options(
    socket: &socket2::Socket,
    address: SocketAddr,
    options: &[SocketOption],
    state: SocketState,
) -> Result<(), BindError> {
    for option in options.iter().filter(|option| option.state == state) {
        let name = if option.description.is_empty() {
            format!("socket option {}/{}", option.level, option.name)
        } else {
            format!("socket option `{}`", option.description)
        };

        let value = match &option.value {
            SocketOptionValue::Int(value) => i32::try_from(*value)
                .map(|value| value.to_ne_bytes().to_vec())
                .map_err(|_| BindError::Option {
                    address,
                    option: name.clone(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{value} does not fit a C int"),
                    ),
                })?,
            SocketOptionValue::Bytes(bytes) => bytes.clone(),
        };

        setsockopt(socket, address, &name, option.level, option.name, &value)?;
        tracing::trace!(%address, option = %name, ?state, "applied socket option");
    }

    Ok(())
}

#[cfg(unix)]
fn setsockopt(
    socket: &socket2::Socket,
    address: SocketAddr,
    option: &str,
    level: i32,
    name: i32,
    value: &[u8],
) -> Result<(), BindError> {
    use std::os::fd::AsRawFd;

    let len = libc::socklen_t::try_from(value.len()).map_err(|_| BindError::Option {
        address,
        option: option.to_owned(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "value is too large"),
    })?;

    // SAFETY: the pointer and length describe `value`, which outlives the call.
    let result = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            value.as_ptr().cast(),
            len,
        )
    };

    if result == -1 {
        Err(BindError::Option {
            address,
            option: option.to_owned(),
            source: io::Error::last_os_error(),
        })
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
fn setsockopt(
    _: &socket2::Socket,
    address: SocketAddr,
    option: &str,
    _: i32,
    _: i32,
    _: &[u8],
) -> Result<(), BindError> {
    Err(BindError::Unsupported {
        address,
        option: option.to_owned(),
    })
}

#[cfg(target_os = "linux")]
fn set_transparent(
    socket: &socket2::Socket,
    address: SocketAddr,
    transparent: bool,
) -> Result<(), BindError> {
    match address {
        SocketAddr::V4(_) => socket
            .set_ip_transparent(transparent)
            .map_err(|source| BindError::Option {
                address,
                option: "IP_TRANSPARENT".into(),
                source,
            }),
        SocketAddr::V6(_) => setsockopt(
            socket,
            address,
            "IPV6_TRANSPARENT",
            libc::SOL_IPV6,
            libc::IPV6_TRANSPARENT,
            &i32::from(transparent).to_ne_bytes(),
        ),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_transparent(_: &socket2::Socket, address: SocketAddr, _: bool) -> Result<(), BindError> {
    Err(BindError::Unsupported {
        address,
        option: "IP_TRANSPARENT".into(),
    })
}

#[cfg(target_os = "linux")]
fn set_freebind(
    socket: &socket2::Socket,
    address: SocketAddr,
    freebind: bool,
) -> Result<(), BindError> {
    let (option, result) = match address {
        SocketAddr::V4(_) => ("IP_FREEBIND", socket.set_freebind(freebind)),
        SocketAddr::V6(_) => ("IPV6_FREEBIND", socket.set_freebind_ipv6(freebind)),
    };

    result.map_err(|source| BindError::Option {
        address,
        option: option.into(),
        source,
    })
}

#[cfg(not(target_os = "linux"))]
fn set_freebind(_: &socket2::Socket, address: SocketAddr, _: bool) -> Result<(), BindError> {
    Err(BindError::Unsupported {
        address,
        option: "IP_FREEBIND".into(),
    })
}

#[cfg(target_os = "linux")]
fn set_tcp_fast_open(
    socket: &socket2::Socket,
    address: SocketAddr,
    queue_length: u32,
) -> Result<(), BindError> {
    let queue_length = i32::try_from(queue_length).unwrap_or(i32::MAX);
    setsockopt(
        socket,
        address,
        "TCP_FASTOPEN",
        libc::IPPROTO_TCP,
        libc::TCP_FASTOPEN,
        &queue_length.to_ne_bytes(),
    )
}

#[cfg(not(target_os = "linux"))]
fn set_tcp_fast_open(_: &socket2::Socket, address: SocketAddr, _: u32) -> Result<(), BindError> {
    Err(BindError::Unsupported {
        address,
        option: "TCP_FASTOPEN".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BACKLOG;

    fn config() -> SocketConfig {
        SocketConfig {
            backlog: DEFAULT_BACKLOG,
            ..<_>::default()
        }
    }

    #[test]
    fn bind_ephemeral_port() {
        let socket = ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config())
            .unwrap();

        let address = socket.local_addr().unwrap();
        assert_ne!(0, address.port());
        assert!(socket.reuse_address().unwrap());
    }

    #[test]
    fn address_in_use() {
        let first = std::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).unwrap();
        let address = first.local_addr().unwrap();

        let error = ListenSocket::bind(address, &config()).unwrap_err();
        assert!(matches!(error, BindError::Bind { .. }), "{error}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn replacement_binds_next_to_listening_socket() {
        let first = ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config())
            .unwrap();
        let address = first.local_addr().unwrap();

        let second = ListenSocket::bind(
            address,
            &SocketConfig {
                backlog: 10,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(address, second.local_addr().unwrap());
    }

    #[test]
    fn clone_shares_address() {
        let socket = ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config())
            .unwrap();
        let clone = socket.try_clone().unwrap();
        assert_eq!(socket.local_addr().unwrap(), clone.local_addr().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn generic_options_apply_in_state() {
        let config = SocketConfig {
            options: vec![SocketOption {
                description: "keepalive".into(),
                level: libc::SOL_SOCKET,
                name: libc::SO_KEEPALIVE,
                value: SocketOptionValue::Int(1),
                state: SocketState::Listening,
            }],
            ..config()
        };

        let socket =
            ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config).unwrap();
        assert!(socket.keepalive().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failing_option_names_the_option() {
        let config = SocketConfig {
            options: vec![SocketOption {
                description: "bogus".into(),
                level: libc::SOL_SOCKET,
                name: 0x7fff,
                value: SocketOptionValue::Int(1),
                state: SocketState::Prebind,
            }],
            ..config()
        };

        let error =
            ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config).unwrap_err();
        assert!(error.to_string().contains("`bogus`"), "{error}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn tcp_fast_open() {
        let config = SocketConfig {
            tcp_fast_open_queue_length: Some(16),
            ..config()
        };

        ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config).unwrap();
    }

    #[tokio::test]
    async fn accepts_after_registration() {
        let socket = ListenSocket::bind((std::net::Ipv4Addr::LOCALHOST, 0).into(), &config())
            .unwrap();
        let address = socket.local_addr().unwrap();
        let listener = socket.into_tokio().unwrap();

        let (client, accepted) =
            tokio::join!(tokio::net::TcpStream::connect(address), listener.accept());
        let (stream, _) = accepted.unwrap();
        client.unwrap();

        apply_buffer_limit(&stream, 64 * 1024).unwrap();
        assert!(socket2::SockRef::from(&stream).recv_buffer_size().unwrap() >= 64 * 1024);
    }
}
