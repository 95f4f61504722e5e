// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relay
//!
//! Moving bytes between the client and the upstream once the request
//! head has been sent. Plain requests get a one-way copy of the
//! upstream response. CONNECT requests get a [`Tunnel`] that first
//! checks the upstream's answer and then pumps both directions.

use crate::config::ForwarderConfig;
use crate::error::{Error, Result};
use crate::header::{parse_status, read_header_block, HeadKind};
use log::{debug, trace};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Copies from `reader` to `writer` in `buffer_size` chunks.
///
/// With a `limit`, stops after that many bytes and treats an earlier
/// EOF as `PeerClosed`. Without one, copies until EOF. Each read is
/// bounded by `read_timeout`.
pub async fn copy_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: Option<u64>,
    buffer_size: usize,
    read_timeout: Duration,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let want = match limit {
            Some(limit) if total >= limit => break,
            Some(limit) => buf.len().min((limit - total) as usize),
            None => buf.len(),
        };
        let n = match timeout(read_timeout, reader.read(&mut buf[..want])).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::IdleTimeout),
        };
        if n == 0 {
            if limit.is_some() {
                return Err(Error::PeerClosed);
            }
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Forwards the upstream response to the client until the upstream
/// closes. No re-framing is done.
pub async fn relay_plain<U, C>(
    upstream: &mut U,
    client: &mut C,
    config: &ForwarderConfig,
) -> Result<u64>
where
    U: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    let total = copy_chunks(upstream, client, None, config.buffer_size, config.read_timeout).await?;
    trace!("Relayed {} response bytes", total);
    Ok(total)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunnelState {
    AwaitingUpstreamHeaders,
    Piping,
    Closed,
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

/// A CONNECT tunnel between a client and the upstream proxy.
///
/// Owns both streams; dropping the tunnel closes them.
pub struct Tunnel<'a, C, U> {
    client: C,
    upstream: U,
    config: &'a ForwarderConfig,
    state: TunnelState,
}

impl<'a, C, U> Tunnel<'a, C, U>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a client and an upstream that has already been sent the
    /// CONNECT request.
    pub fn new(client: C, upstream: U, config: &'a ForwarderConfig) -> Self {
        Tunnel { client, upstream, config, state: TunnelState::AwaitingUpstreamHeaders }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Reads the upstream's response head and forwards it, plus any
    /// bytes that came with it, to the client. Succeeds only for a
    /// 2xx status.
    pub async fn establish(&mut self) -> Result<()> {
        let result = self.read_upstream_response().await;
        self.state = if result.is_ok() { TunnelState::Piping } else { TunnelState::Closed };
        result
    }

    async fn read_upstream_response(&mut self) -> Result<()> {
        let (head, early) = read_header_block(
            &mut self.upstream,
            HeadKind::Response,
            self.config.max_response_header_size,
            self.config.read_timeout,
        )
        .await?;
        self.client.write_all(&head).await?;
        if !early.is_empty() {
            self.client.write_all(&early).await?;
        }
        self.client.flush().await?;

        let (code, status_line) = parse_status(&head)?;
        if !(200..300).contains(&code) {
            return Err(Error::UpstreamAuthRejected(status_line));
        }
        debug!("Tunnel established: {}", status_line);
        Ok(())
    }

    /// Copies bytes both ways until a peer closes, a write fails or
    /// neither side has sent anything for the idle timeout.
    ///
    /// Always ends with an error naming the reason; `PeerClosed` is the
    /// normal end of a tunnel.
    pub async fn pump(&mut self) -> Result<()> {
        if self.state != TunnelState::Piping {
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::NotConnected,
                "tunnel is not established",
            )));
        }
        let result = self.pipe().await;
        self.state = TunnelState::Closed;
        result
    }

    async fn pipe(&mut self) -> Result<()> {
        let idle = self.config.idle_timeout;
        let mut client_buf = vec![0u8; self.config.buffer_size];
        let mut upstream_buf = vec![0u8; self.config.buffer_size];
        let (mut to_upstream, mut to_client) = (0u64, 0u64);

        let result = loop {
            let client = &mut self.client;
            let upstream = &mut self.upstream;
            let event = timeout(idle, async {
                tokio::select! {
                    r = client.read(&mut client_buf) => (Direction::ClientToUpstream, r),
                    r = upstream.read(&mut upstream_buf) => (Direction::UpstreamToClient, r),
                }
            })
            .await;

            let (direction, n) = match event {
                Err(_) => break Error::IdleTimeout,
                Ok((_, Err(err))) => break Error::IoError(err),
                Ok((_, Ok(0))) => break Error::PeerClosed,
                Ok((direction, Ok(n))) => (direction, n),
            };

            let written = match direction {
                Direction::ClientToUpstream => {
                    to_upstream += n as u64;
                    timeout(idle, self.upstream.write_all(&client_buf[..n])).await
                }
                Direction::UpstreamToClient => {
                    to_client += n as u64;
                    timeout(idle, self.client.write_all(&upstream_buf[..n])).await
                }
            };
            match written {
                Ok(Ok(())) => {}
                Ok(Err(err)) => break Error::IoError(err),
                Err(_) => break Error::IdleTimeout,
            }
        };

        trace!("Tunnel closed after {} bytes up, {} bytes down: {}", to_upstream, to_client, result);
        Err(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn test_config() -> ForwarderConfig {
        ForwarderConfig {
            read_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_copy_chunks_with_limit() {
        let mut reader: &[u8] = b"0123456789";
        let mut out = Vec::new();
        let n = copy_chunks(&mut reader, &mut out, Some(4), 3, Duration::from_secs(1)).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, b"0123");
    }

    #[tokio::test]
    async fn test_copy_chunks_short_body() {
        let mut reader: &[u8] = b"01";
        let mut out = Vec::new();
        let result = copy_chunks(&mut reader, &mut out, Some(4), 8, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::PeerClosed)));
    }

    #[tokio::test]
    async fn test_relay_plain_until_eof() {
        let mut upstream: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";
        let mut client = Vec::new();
        let n = relay_plain(&mut upstream, &mut client, &test_config()).await.unwrap();
        assert_eq!(n, client.len() as u64);
        assert_eq!(client, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
    }

    #[tokio::test]
    async fn test_tunnel_pipes_both_ways() {
        let config = test_config();
        let (client, mut client_peer) = duplex(1024);
        let (upstream, mut upstream_peer) = duplex(1024);
        let mut tunnel = Tunnel::new(client, upstream, &config);

        upstream_peer.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await.unwrap();
        tunnel.establish().await.unwrap();
        assert_eq!(tunnel.state(), TunnelState::Piping);

        let peers = tokio::spawn(async move {
            let mut head = [0u8; 39];
            client_peer.read_exact(&mut head).await.unwrap();
            assert_eq!(&head, b"HTTP/1.1 200 Connection established\r\n\r\n");

            client_peer.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            upstream_peer.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");

            upstream_peer.write_all(b"pong").await.unwrap();
            client_peer.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");
            drop(client_peer);
            upstream_peer
        });

        let result = tunnel.pump().await;
        assert!(matches!(result, Err(Error::PeerClosed)));
        assert_eq!(tunnel.state(), TunnelState::Closed);
        peers.await.unwrap();
    }

    #[tokio::test]
    async fn test_tunnel_rejected() {
        let config = test_config();
        let (client, mut client_peer) = duplex(1024);
        let (upstream, mut upstream_peer) = duplex(1024);
        let mut tunnel = Tunnel::new(client, upstream, &config);

        let response = b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic\r\n\r\n";
        upstream_peer.write_all(response).await.unwrap();
        match tunnel.establish().await {
            Err(Error::UpstreamAuthRejected(line)) => {
                assert_eq!(line, "HTTP/1.1 407 Proxy Authentication Required")
            }
            other => panic!("Expected UpstreamAuthRejected, got {:?}", other),
        }
        assert_eq!(tunnel.state(), TunnelState::Closed);
        assert!(tunnel.pump().await.is_err());

        // The rejection is still shown to the client.
        drop(tunnel);
        let mut forwarded = Vec::new();
        client_peer.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, response.to_vec());
    }

    #[tokio::test]
    async fn test_tunnel_idle_timeout() {
        let config = test_config();
        let (client, _client_peer) = duplex(1024);
        let (upstream, mut upstream_peer) = duplex(1024);
        let mut tunnel = Tunnel::new(client, upstream, &config);

        upstream_peer.write_all(b"HTTP/1.0 200 OK\r\n\r\n").await.unwrap();
        tunnel.establish().await.unwrap();
        let result = tunnel.pump().await;
        assert!(matches!(result, Err(Error::IdleTimeout)));
        assert_eq!(tunnel.state(), TunnelState::Closed);
    }

    #[tokio::test]
    async fn test_tunnel_forwards_early_data() {
        let config = test_config();
        let (client, mut client_peer) = duplex(1024);
        let (upstream, mut upstream_peer) = duplex(1024);
        let mut tunnel = Tunnel::new(client, upstream, &config);

        upstream_peer.write_all(b"HTTP/1.1 200 OK\r\n\r\nserver-hello").await.unwrap();
        tunnel.establish().await.unwrap();
        drop(tunnel);

        let mut forwarded = Vec::new();
        client_peer.read_to_end(&mut forwarded).await.unwrap();
        assert_eq!(forwarded, b"HTTP/1.1 200 OK\r\n\r\nserver-hello".to_vec());
    }
}
