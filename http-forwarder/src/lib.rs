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

//! # HTTP Forwarder
//!
//! This crate provides a local HTTP proxy that forwards every request
//! to an authenticated upstream HTTP proxy, adding a Basic
//! `Proxy-Authorization` header on the way. Clients point their proxy
//! setting at the local listener and never see a credential prompt.
//!
//! Plain requests are relayed as a single request/response exchange.
//! CONNECT requests become tunnels once the upstream answers with a
//! success status.
//!
//! ## Example
//!
//! ```
//! use http_forwarder::{ForwarderConfig, ProxyTarget};
//!
//! #[tokio::main]
//! async fn main() -> http_forwarder::Result<()> {
//!     let target = ProxyTarget::from_string("user:pass@proxy.example.com:3128")?;
//!     let forwarder = http_forwarder::start(target, ForwarderConfig::default()).await?;
//!     println!("HTTP proxy at 127.0.0.1:{}", forwarder.port());
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! * Only Basic authentication is supported.
//! * Request bodies are forwarded as declared by `Content-Length`;
//!   chunked request bodies are only forwarded as far as already read
//!   with the head.

mod config;
mod connector;
mod error;
mod handler;
mod header;
mod injector;
mod listener;
mod relay;
mod target;

pub use config::ForwarderConfig;
pub use connector::Connector;
pub use error::{Error, Result};
pub use handler::handle_connection;
pub use header::{find_terminator, parse_status, read_header_block, HeadKind, HeaderBlock, HeaderField};
pub use injector::{inject, PROXY_AUTHORIZATION};
pub use listener::{start, Forwarder};
pub use relay::{relay_plain, Tunnel, TunnelState};
pub use target::{Credentials, ProxyTarget};
