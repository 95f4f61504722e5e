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

use crate::config::ForwarderConfig;
use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::handler::handle_connection;
use crate::target::ProxyTarget;
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Handle to a running forwarder.
pub struct Forwarder {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Forwarder {
    /// The bound local port, to be used as the client's HTTP proxy.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Asks the accept loop to exit. It notices within one accept poll
    /// interval. Connections already being served run to completion.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the accept loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|err| Error::IoError(io::Error::new(io::ErrorKind::Other, err)))
    }
}

/// Binds the local listener and starts accepting connections on the
/// current tokio runtime.
///
/// Each accepted connection is forwarded to `target` on its own task.
pub async fn start(target: ProxyTarget, config: ForwarderConfig) -> Result<Forwarder> {
    let listener = TcpListener::bind((config.bind_address, config.port)).await?;
    let local_addr = listener.local_addr()?;
    info!("Forwarding {} to upstream proxy {}", local_addr, target);

    let connector = Connector::new(Arc::new(target), config.connect_timeout);
    let stop = Arc::new(AtomicBool::new(false));
    let task = tokio::spawn(accept_loop(listener, connector, Arc::new(config), stop.clone()));

    Ok(Forwarder { local_addr, stop, task })
}

async fn accept_loop(
    listener: TcpListener,
    connector: Connector,
    config: Arc<ForwarderConfig>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match timeout(config.accept_poll_interval, listener.accept()).await {
            Err(_) => continue,
            Ok(Ok((stream, peer))) => {
                tokio::spawn(serve(stream, peer, connector.clone(), config.clone()));
            }
            Ok(Err(err)) => {
                warn!("Failed to accept connection: {}", err);
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
    info!("Stopped listening on {:?}", listener.local_addr());
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    connector: Connector,
    config: Arc<ForwarderConfig>,
) {
    debug!("Accepted connection from {}", peer);
    match handle_connection(stream, &connector, &config).await {
        Ok(()) | Err(Error::PeerClosed) => debug!("Connection from {} closed", peer),
        Err(err @ (Error::UpstreamAuthRejected(_) | Error::UpstreamUnreachable(..))) => {
            warn!("Connection from {} aborted: {}", peer, err)
        }
        Err(err) => debug!("Connection from {} aborted: {}", peer, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ForwarderConfig {
        ForwarderConfig { accept_poll_interval: Duration::from_millis(50), ..Default::default() }
    }

    #[tokio::test]
    async fn test_start_on_os_assigned_port() {
        let target = ProxyTarget::new("127.0.0.1", 3128, "user", "password");
        let forwarder = start(target, test_config()).await.unwrap();
        assert_ne!(forwarder.port(), 0);
        assert!(forwarder.local_addr().ip().is_loopback());

        TcpStream::connect(forwarder.local_addr()).await.unwrap();
        forwarder.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_accept_loop() {
        let target = ProxyTarget::new("127.0.0.1", 3128, "user", "password");
        let forwarder = start(target, test_config()).await.unwrap();
        let addr = forwarder.local_addr();

        forwarder.stop();
        tokio::time::timeout(Duration::from_secs(5), forwarder.join()).await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
