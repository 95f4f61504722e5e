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

// # Upstream proxy target
//
// `ProxyTarget` names the authenticated upstream proxy every accepted
// connection is forwarded to. It is built once per forwarder, either
// from explicit parameters or from one of the proxy-list string
// formats, and shared read-only between connections.

use crate::Error;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::OnceLock;

/// Basic credentials for the upstream proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials { username: username.into(), password: password.into() }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The `Proxy-Authorization` value: `Basic base64(username:password)`.
    pub fn basic_auth_value(&self) -> String {
        let encoded = base64_encode(format!("{}:{}", self.username, self.password).as_bytes());
        format!("Basic {}", encoded)
    }
}

// The password is never printed, not even in debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn base64_encode(src: &[u8]) -> String {
    general_purpose::STANDARD.encode(src)
}

/// The upstream proxy and the credentials injected for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Hostname or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
}

impl ProxyTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ProxyTarget {
            host: host.into(),
            port,
            credentials: Some(Credentials::new(username, password)),
        }
    }

    /// Parses a proxy target string.
    ///
    /// Accepted formats, each with an optional `http://` prefix:
    ///
    /// ```text
    /// username:password@host:port
    /// host:port:username:password
    /// host:port
    /// ```
    ///
    /// `host` may be a bracketed IPv6 literal (e.g. `[::1]`). The
    /// password may contain `:`. Nothing is resolved here; the host is
    /// looked up when the upstream is dialed.
    ///
    /// # Errors
    /// Returns `MalformedConfigString` when the string matches none of
    /// the formats, `InvalidPortNumber` for ports outside `1..=65535`
    /// and `InvalidHost` for a bracketed host that is not IPv6.
    pub fn from_string(config_string: &str) -> Result<ProxyTarget, Error> {
        let config_string = config_string.trim();
        let rest = strip_scheme(config_string)?;

        let (server_part, credentials) = match rest.rsplit_once('@') {
            Some((auth_part, server_part)) => {
                let (username, password) =
                    auth_part.split_once(':').ok_or(Error::MalformedConfigString)?;
                if username.is_empty() {
                    return Err(Error::MalformedConfigString);
                }
                (server_part, Some(Credentials::new(username, password)))
            }
            None => (rest, None),
        };

        let caps = server_regex().captures(server_part).ok_or(Error::MalformedConfigString)?;

        let credentials = match (caps.name("user"), caps.name("pass")) {
            (Some(_), _) if credentials.is_some() => return Err(Error::MalformedConfigString),
            (Some(user), Some(pass)) => Some(Credentials::new(user.as_str(), pass.as_str())),
            _ => credentials,
        };

        let host = parse_host(caps.name("host").ok_or(Error::MalformedConfigString)?.as_str())?;
        let port = caps
            .name("port")
            .ok_or(Error::MalformedConfigString)?
            .as_str()
            .parse::<u16>()
            .map_err(|_| Error::InvalidPortNumber)?;
        if port == 0 {
            return Err(Error::InvalidPortNumber);
        }

        Ok(ProxyTarget { host, port, credentials })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// Credentials are left out so the target can be logged.
impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

fn strip_scheme(config_string: &str) -> Result<&str, Error> {
    match config_string.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => Ok(rest),
        Some(_) => Err(Error::MalformedConfigString),
        None => Ok(config_string),
    }
}

fn server_regex() -> &'static Regex {
    static SERVER_RE: OnceLock<Regex> = OnceLock::new();
    SERVER_RE.get_or_init(|| {
        Regex::new(
            r"^(?P<host>[\w.-]+|\[[^\]]+\]):(?P<port>\d+)(?::(?P<user>[^:]+):(?P<pass>.*))?$",
        )
        .expect("server regex is valid")
    })
}

fn parse_host(host: &str) -> Result<String, Error> {
    match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(literal) => literal
            .parse::<Ipv6Addr>()
            .map(|addr| addr.to_string())
            .map_err(|_| Error::InvalidHost),
        None => Ok(host.to_string()),
    }
}
