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

use crate::error::{Error, Result};
use crate::target::ProxyTarget;
use log::trace;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Opens TCP connections to the upstream proxy.
///
/// Every client connection gets its own upstream connection; nothing
/// is pooled or reused.
#[derive(Clone)]
pub struct Connector {
    target: Arc<ProxyTarget>,
    connect_timeout: Duration,
}

impl Connector {
    pub fn new(target: Arc<ProxyTarget>, connect_timeout: Duration) -> Self {
        Connector { target, connect_timeout }
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    pub async fn connect(&self) -> Result<TcpStream> {
        let addr = (self.target.host.as_str(), self.target.port);
        let stream = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(Error::UpstreamUnreachable(self.target.authority(), err)),
            Err(_) => {
                return Err(Error::UpstreamUnreachable(
                    self.target.authority(),
                    io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                ))
            }
        };
        stream.set_nodelay(true)?;
        trace!("Connected to upstream {} from {:?}", self.target, stream.local_addr());
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            listener.accept().await.unwrap();
        });

        let target = Arc::new(ProxyTarget::new("127.0.0.1", port, "user", "password"));
        let connector = Connector::new(target, Duration::from_secs(5));
        let stream = connector.connect().await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let target = Arc::new(ProxyTarget::new("127.0.0.1", port, "user", "password"));
        let connector = Connector::new(target, Duration::from_secs(5));
        match connector.connect().await {
            Err(Error::UpstreamUnreachable(addr, _)) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port))
            }
            other => panic!("Expected UpstreamUnreachable, got {:?}", other.map(|_| ())),
        }
    }
}
