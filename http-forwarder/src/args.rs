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

use clap::Parser;
use http_forwarder::{Credentials, Error, ForwarderConfig, ProxyTarget};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(about = "Local HTTP proxy that adds upstream proxy credentials")]
pub struct ForwarderArgs {
    /// Upstream proxy as `user:pass@host:port` or `host:port:user:pass`
    #[arg(long, conflicts_with_all = ["upstream_host", "upstream_port", "username", "password"])]
    pub upstream: Option<String>,

    /// Upstream proxy host
    #[arg(long, requires = "upstream_port")]
    pub upstream_host: Option<String>,

    /// Upstream proxy port
    #[arg(long, requires = "upstream_host")]
    pub upstream_port: Option<u16>,

    /// Upstream proxy username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Upstream proxy password
    #[arg(short, long, requires = "username")]
    pub password: Option<String>,

    /// Local address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Local port to listen on, 0 picks a free one
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Seconds of inactivity before a tunnel is closed
    #[arg(long, default_value_t = 60)]
    pub idle_timeout_secs: u64,

    /// Seconds allowed for connecting to the upstream proxy
    #[arg(long, default_value_t = 60)]
    pub connect_timeout_secs: u64,
}

impl ForwarderArgs {
    pub fn proxy_target(&self) -> Result<ProxyTarget, Error> {
        if let Some(upstream) = &self.upstream {
            return ProxyTarget::from_string(upstream);
        }
        let (host, port) = match (&self.upstream_host, self.upstream_port) {
            (Some(host), Some(port)) if !host.is_empty() => (host.clone(), port),
            _ => return Err(Error::MalformedConfigString),
        };
        if port == 0 {
            return Err(Error::InvalidPortNumber);
        }
        let credentials = self
            .username
            .as_ref()
            .map(|username| Credentials::new(username, self.password.clone().unwrap_or_default()));
        Ok(ProxyTarget { host, port, credentials })
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            bind_address: self.bind,
            port: self.port,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..Default::default()
        }
    }
}
