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

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Settings for one forwarder instance.
///
/// Everything is passed in by the caller; nothing is read from files
/// or the environment.
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    /// Address the local listener binds to.
    pub bind_address: IpAddr,
    /// Local port, `0` lets the OS pick one.
    pub port: u16,
    /// Bound on a client request head.
    pub max_header_size: usize,
    /// Bound on the upstream's CONNECT response head.
    pub max_response_header_size: usize,
    pub connect_timeout: Duration,
    /// Bound on any single read while waiting for a head or a plain response.
    pub read_timeout: Duration,
    /// Inactivity after which an established tunnel is torn down.
    pub idle_timeout: Duration,
    /// Relay chunk size.
    pub buffer_size: usize,
    /// How long the accept loop waits before checking for a stop request.
    pub accept_poll_interval: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        ForwarderConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_header_size: 65536,
            max_response_header_size: 8192,
            connect_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
            buffer_size: 8192,
            accept_poll_interval: Duration::from_secs(1),
        }
    }
}
