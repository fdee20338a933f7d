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

//! # Probes
//!
//! Probes are executed from inside a router namespace, since only from there the VMs of a tenant
//! network are reachable. The binary calls itself with `ip netns exec <ns> don probe ...`, and the
//! probe prints a [`ProbeReport`] as JSON on stdout.

use crate::ssh::{shell_quote, RemoteShell};

use don::credentials::LoginInfo;
use don::{Error, Result};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref PING_SUMMARY: Regex =
        Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").unwrap();
}

/// Minimal ratio of received over transmitted packets for a ping to pass
pub const PING_PASS_RATIO: f64 = 0.75;

/// Result of a probe, as printed by `don probe`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Short description of the probe
    pub comment: Option<String>,
    /// Overall result
    pub pass: bool,
    /// All steps that were executed
    pub command_list: Vec<ProbeCommand>,
    /// Error messages
    #[serde(default)]
    pub errors: Vec<String>,
    /// Debug messages
    #[serde(default)]
    pub debugs: Vec<String>,
}

/// A single step of a probe
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProbeCommand {
    /// Command that was executed
    pub cmd: String,
    /// Output lines
    #[serde(default)]
    pub output: Vec<String>,
    /// Whether the step passed
    pub pass: bool,
}

impl ProbeCommand {
    /// Create a new step from the command and its raw output
    pub fn new(cmd: impl Into<String>, output: &str, pass: bool) -> Self {
        let output = if output.is_empty() {
            Vec::new()
        } else {
            output.split('\n').map(String::from).collect()
        };
        Self { cmd: cmd.into(), output, pass }
    }
}

impl ProbeReport {
    /// Parse the JSON output of a probe. Lines printed before the JSON object are skipped.
    pub fn from_json(s: &str) -> Result<Self> {
        let start = s
            .match_indices('{')
            .map(|(i, _)| i)
            .find(|i| *i == 0 || s[..*i].ends_with('\n'))
            .unwrap_or(0);
        Ok(serde_json::from_str(&s[start..])?)
    }

    /// Pretty printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns true if the login step to `ip` is recorded and passed.
    pub fn login_passed(&self, ip: &str) -> bool {
        let step = login_step(ip);
        self.command_list.iter().find(|c| c.cmd == step).map(|c| c.pass).unwrap_or(false)
    }

    /// Output of the first step whose command contains `pattern`.
    pub fn output_of(&self, pattern: &str) -> Option<&[String]> {
        self.command_list.iter().find(|c| c.cmd.contains(pattern)).map(|c| c.output.as_slice())
    }
}

/// Name of the login step
pub fn login_step(ip: &str) -> String {
    format!("ssh {} with provided username and passwd", ip)
}

/// Run `cmd` on `host`, recording the login step and the command itself. If the login fails, the
/// command step is missing. The output of a command exiting with a non-zero status is still
/// returned.
fn run_steps(
    shell: &mut dyn RemoteShell,
    host: &str,
    login: &LoginInfo,
    cmd: &str,
    report: &mut ProbeReport,
) -> Option<String> {
    match shell.run_remote(host, login, cmd) {
        Err(Error::LoginFailed(_)) => {
            let msg = format!("Could not ssh to {}", host);
            report.command_list.push(ProbeCommand::new(login_step(host), &msg, false));
            report.errors.push(msg);
            None
        }
        Err(Error::ExternalCommand { output, status, .. }) => {
            report.command_list.push(ProbeCommand::new(login_step(host), "", true));
            report.debugs.push(format!("`{}` exited with {}", cmd, status));
            Some(output)
        }
        Err(e) => {
            report.command_list.push(ProbeCommand::new(login_step(host), &e.to_string(), false));
            report.errors.push(e.to_string());
            None
        }
        Ok(output) => {
            report.command_list.push(ProbeCommand::new(login_step(host), "", true));
            Some(output)
        }
    }
}

/// Ping `dst_ip` from the VM with address `src_ip`. The probe passes if at least 75% of the
/// packets are received.
pub fn ping_test(
    shell: &mut dyn RemoteShell,
    src_ip: &str,
    dst_ip: &str,
    login: &LoginInfo,
    count: u32,
    timeout: u32,
) -> ProbeReport {
    let mut report = ProbeReport {
        comment: Some(format!("PING {} to {}", src_ip, dst_ip)),
        ..Default::default()
    };
    let cmd = format!("ping -c {} -W {} {}", count, timeout, dst_ip);
    if let Some(output) = run_steps(shell, src_ip, login, &cmd, &mut report) {
        let pass = parse_ping(&output).map(|(tx, rx)| ping_passed(tx, rx)).unwrap_or(false);
        debug!("{} -> {}: {}", src_ip, dst_ip, if pass { "PASS" } else { "FAIL" });
        report.command_list.push(ProbeCommand::new(cmd, &output, pass));
        report.pass = pass;
    }
    report
}

/// Run an arbitrary command on `host_ip`. The probe passes if the login succeeded.
pub fn remote_command(
    shell: &mut dyn RemoteShell,
    host_ip: &str,
    login: &LoginInfo,
    cmd: &str,
) -> ProbeReport {
    let mut report = ProbeReport {
        comment: Some(format!("{} on {}", cmd, host_ip)),
        ..Default::default()
    };
    if let Some(output) = run_steps(shell, host_ip, login, cmd, &mut report) {
        report.command_list.push(ProbeCommand::new(cmd, &output, true));
        report.pass = true;
    }
    report
}

/// Extract the number of transmitted and received packets from the ping summary.
pub fn parse_ping(output: &str) -> Option<(u32, u32)> {
    output.lines().find_map(|l| PING_SUMMARY.captures(l)).and_then(|caps| {
        let tx = caps[1].parse().ok()?;
        let rx = caps[2].parse().ok()?;
        Some((tx, rx))
    })
}

/// Returns true if enough packets were received
pub fn ping_passed(transmitted: u32, received: u32) -> bool {
    transmitted > 0 && received as f64 / transmitted as f64 >= PING_PASS_RATIO
}

/// Builder for the command lines invoking the probes from inside a namespace.
#[derive(Debug, Clone)]
pub struct ProbeInvocation {
    exe: String,
    namespace: String,
}

impl ProbeInvocation {
    /// Probes are run with the executable `exe`, inside `namespace`.
    pub fn new(exe: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { exe: exe.into(), namespace: namespace.into() }
    }

    fn prefix(&self) -> String {
        format!(
            "sudo ip netns exec {} {} probe",
            shell_quote(&self.namespace),
            shell_quote(&self.exe)
        )
    }

    /// Command line of a ping probe
    pub fn ping(
        &self,
        src_ip: &str,
        dst_ip: &str,
        login: &LoginInfo,
        count: u32,
        timeout: u32,
    ) -> String {
        format!(
            "{} ping --src-ip {} --dst-ip {} --username {} --password {} --count {} --timeout {}",
            self.prefix(),
            shell_quote(src_ip),
            shell_quote(dst_ip),
            shell_quote(&login.username),
            shell_quote(&login.password),
            count,
            timeout
        )
    }

    /// Command line of a remote command probe
    pub fn cmd(&self, host_ip: &str, login: &LoginInfo, cmd: &str) -> String {
        format!(
            "{} cmd --host-ip {} --username {} --password {} --cmd {}",
            self.prefix(),
            shell_quote(host_ip),
            shell_quote(&login.username),
            shell_quote(&login.password),
            shell_quote(cmd)
        )
    }
}
