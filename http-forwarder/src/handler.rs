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
use crate::error::Result;
use crate::header::{read_header_block, HeadKind, HeaderBlock};
use crate::injector::{inject, PROXY_AUTHORIZATION};
use crate::relay::{copy_chunks, relay_plain, Tunnel};
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Serves one client connection end to end.
///
/// Reads the request head, adds credentials, dials the upstream and
/// relays according to the request method. Both sockets are owned
/// here and closed on return, whatever the outcome.
pub async fn handle_connection(
    mut client: TcpStream,
    connector: &Connector,
    config: &ForwarderConfig,
) -> Result<()> {
    let (head, body) = read_header_block(
        &mut client,
        HeadKind::Request,
        config.max_header_size,
        config.read_timeout,
    )
    .await?;
    let block = HeaderBlock::parse(&head)?;
    debug!("{} request for {}", block.method(), String::from_utf8_lossy(block.request_line()));

    // A client-supplied header is forwarded byte for byte.
    let outgoing = match connector.target().credentials.as_ref() {
        Some(credentials) if !block.contains(PROXY_AUTHORIZATION) => {
            inject(&block, credentials).to_bytes()
        }
        _ => head,
    };

    let mut upstream = connector.connect().await?;
    upstream.write_all(&outgoing).await?;
    if !body.is_empty() {
        upstream.write_all(&body).await?;
    }

    if block.is_connect() {
        let mut tunnel = Tunnel::new(client, upstream, config);
        tunnel.establish().await?;
        return tunnel.pump().await;
    }

    if let Some(remaining) =
        block.content_length().map(|len| len.saturating_sub(body.len() as u64)).filter(|n| *n > 0)
    {
        copy_chunks(
            &mut client,
            &mut upstream,
            Some(remaining),
            config.buffer_size,
            config.read_timeout,
        )
        .await?;
    }
    relay_plain(&mut upstream, &mut client, config).await?;
    Ok(())
}
