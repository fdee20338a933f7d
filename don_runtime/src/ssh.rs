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

//! Remote command execution over ssh, using password login through `sshpass`.

use crate::process::check_output;

use don::credentials::LoginInfo;
use don::{Error, Result};

use log::*;

use std::process::Command;

/// Default ssh connect timeout in seconds
pub const CONNECT_TIMEOUT_S: u32 = 3;

/// Shell on a remote host, reachable with a username and password.
pub trait RemoteShell {
    /// Run `cmd` on `host` and return its combined output. If the login fails, the error is
    /// [`Error::LoginFailed`]. If the command exits with a non-zero status, the error is
    /// [`Error::ExternalCommand`], which still carries the output.
    fn run_remote(&mut self, host: &str, login: &LoginInfo, cmd: &str) -> Result<String>;
}

/// [`RemoteShell`] using the local `ssh` client through `sshpass`.
#[derive(Debug, Clone)]
pub struct SshClient {
    connect_timeout: u32,
}

impl Default for SshClient {
    fn default() -> Self {
        Self { connect_timeout: CONNECT_TIMEOUT_S }
    }
}

impl SshClient {
    /// Create a new client with a custom connect timeout (in seconds)
    pub fn with_timeout(connect_timeout: u32) -> Self {
        Self { connect_timeout }
    }
}

impl RemoteShell for SshClient {
    fn run_remote(&mut self, host: &str, login: &LoginInfo, cmd: &str) -> Result<String> {
        let argv = ssh_argv(host, login, cmd, self.connect_timeout);
        debug!("Running on {}@{}: {}", login.username, host, cmd);
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|source| Error::Spawn { cmd: format!("ssh {}", host), source })?;
        // sshpass reports a wrong password with 5, ssh reports connection errors with 255
        match output.status.code() {
            Some(5) | Some(255) => {
                warn!("Could not ssh to {}", host);
                Err(Error::LoginFailed(host.to_string()))
            }
            _ => check_output(cmd.to_string(), output),
        }
    }
}

/// Arguments of the `sshpass` process logging in to `host` and running `cmd`.
pub fn ssh_argv(host: &str, login: &LoginInfo, cmd: &str, connect_timeout: u32) -> Vec<String> {
    vec![
        "sshpass".to_string(),
        "-p".to_string(),
        login.password.clone(),
        "ssh".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout),
        format!("{}@{}", login.username, host),
        cmd.to_string(),
    ]
}

/// Quote a string for `sh`, using single quotes.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn argv() {
        let login = LoginInfo { username: "cirros".to_string(), password: "gocubsgo".to_string() };
        let argv = ssh_argv("10.0.2.3", &login, "ip route get 10.0.3.3", 3);
        assert_eq!(argv[0], "sshpass");
        assert_eq!(argv[2], "gocubsgo");
        assert!(argv.contains(&"ConnectTimeout=3".to_string()));
        assert_eq!(argv[10], "cirros@10.0.2.3");
        assert_eq!(argv[11], "ip route get 10.0.3.3");
    }

    #[test]
    fn quote() {
        assert_eq!(shell_quote("cirros"), "cirros");
        assert_eq!(shell_quote("10.0.2.3"), "10.0.2.3");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("ip route get 1.2.3.4"), "'ip route get 1.2.3.4'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
