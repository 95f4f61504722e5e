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

//! This module defines the forwarder error types.
//!
//! Every connection-level error terminates only the connection it
//! occurred on. None of them reach the listener.

use std::fmt;
use std::io;

/// An enumeration of possible errors.
#[derive(Debug)]
pub enum Error {
    /// The client header block had no terminator within the size bound
    /// or could not be parsed as a request head.
    MalformedRequest,
    /// The upstream CONNECT response head had no terminator within the
    /// size bound or could not be parsed as a response head.
    MalformedResponse,
    /// Dialing the upstream proxy failed or timed out.
    UpstreamUnreachable(String, io::Error),
    /// The upstream answered CONNECT with a non-success status line.
    UpstreamAuthRejected(String),
    /// A peer closed its socket.
    PeerClosed,
    /// A read or write failed mid-relay.
    IoError(io::Error),
    /// No traffic was seen for longer than the configured timeout.
    IdleTimeout,
    MalformedConfigString,
    InvalidPortNumber,
    InvalidHost,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedRequest => write!(f, "Malformed request header block"),
            Error::MalformedResponse => write!(f, "Malformed upstream response header block"),
            Error::UpstreamUnreachable(addr, err) => {
                write!(f, "Failed to connect to upstream {}: {}", addr, err)
            }
            Error::UpstreamAuthRejected(status) => {
                write!(f, "Upstream rejected CONNECT: {}", status)
            }
            Error::PeerClosed => write!(f, "Peer closed the connection"),
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::IdleTimeout => write!(f, "Connection idle timeout"),
            Error::MalformedConfigString => {
                write!(f, "Invalid proxy configuration string")
            }
            Error::InvalidPortNumber => write!(f, "Invalid port number"),
            Error::InvalidHost => write!(f, "Invalid host"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::UpstreamUnreachable(_, err) | Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
