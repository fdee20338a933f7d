// DON: Diagnosing OpenStack Networking
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing all error types

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// An external command exited with a non-zero status
    #[error("Command `{cmd}` failed with {status}:\n{output}")]
    ExternalCommand {
        /// Command line that was executed
        cmd: String,
        /// Exit status as reported by the OS
        status: String,
        /// Combined output of the process
        output: String,
    },
    /// An external command could not be spawned at all
    #[error("Cannot spawn `{cmd}`: {source}")]
    Spawn {
        /// Command line that was executed
        cmd: String,
        /// Reason why the spawn failed
        source: std::io::Error,
    },
    /// The IP address is not known in the snapshot
    #[error("Endpoint {0} not found on the network")]
    EndpointNotFound(String),
    /// The router has no namespace in the snapshot
    #[error("No such router information found on the network: {0}")]
    RouterNotFound(String),
    /// Login to a remote host failed
    #[error("Could not ssh to {0}")]
    LoginFailed(String),
    /// No credentials are configured for the given host
    #[error("No credentials found for {0}")]
    MissingCredentials(String),
    /// IO error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// JSON error
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// YAML error
    #[error("YAML Error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type of this crate
pub type Result<T> = core::result::Result<T, Error>;
