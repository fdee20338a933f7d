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

//! Shared fixtures of the integration tests: a small deployment with three VMs, and a fake process
//! host which answers probes, captures and OVS traces without touching the system.

#![allow(dead_code)]

use don::credentials::LoginInfo;
use don::topology::*;
use don::{Error, Result};
use don_runtime::probe::{ping_test, ProbeReport};
use don_runtime::process::{BackgroundProcess, ProcessHost};
use don_runtime::ssh::RemoteShell;

use maplit::btreemap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ROUTER_ID: &str = "8c981cdb-6a7b-4f2c-9d3e-1a2b3c4d5e6f";

/// vm1 (10.0.2.3) and vm2 (10.0.2.4) share the segment with tag 1 behind router1. vm3 (10.0.5.3)
/// is on an isolated segment with tag 3, without any router.
pub fn topology() -> Topology {
    let mut topo = Topology::new();
    let vms = [
        ("vm1", "10.0.2.3", "6ce314cb-a5", "private1"),
        ("vm2", "10.0.2.4", "b0f5cfc8-4d", "private1"),
        ("vm3", "10.0.5.3", "9a8b7c6d-5e", "isolated"),
    ];
    let mut ofport = 5;
    for (name, ip, suffix, network) in vms.iter() {
        let vm = topo.vm_entry(name);
        vm.interfaces.insert(ip.to_string(), VmInterface { network: network.to_string() });
        vm.attach_bridge(format!("qbr{}", suffix));
        topo.record_linuxbridge(
            &format!("qbr{}", suffix),
            vec![format!("qvb{}", suffix), format!("tap{}", suffix)],
        );
        topo.tap_to_ip.insert(suffix.to_string(), ip.to_string());
        let tag = if *network == "isolated" { "3" } else { "1" };
        topo.bridges.br_int.ports.insert(
            format!("qvo{}", suffix),
            OvsPort {
                id: Some(ofport.to_string()),
                tag: Some(tag.to_string()),
                interfaces: btreemap! {format!("qvo{}", suffix) => OvsInterface::default()},
                ..Default::default()
            },
        );
        ofport += 1;
    }
    topo.tap_to_ip.insert("56cf8a2d-27".to_string(), "10.0.2.1".to_string());
    topo.routers.insert(
        "router1".to_string(),
        Router { id: ROUTER_ID.to_string(), ..Default::default() },
    );
    topo.namespaces.insert(
        format!("qrouter-{}", ROUTER_ID),
        Namespace {
            interfaces: btreemap! {"qr-56cf8a2d-27".to_string() => "10.0.2.1".to_string()},
        },
    );
    topo.resolve_vm_routers();
    topo
}

pub fn login() -> LoginInfo {
    LoginInfo { username: "cirros".to_string(), password: "gocubsgo".to_string() }
}

/// VMs answering ssh with a fixed ping result
struct FakeVms<'a> {
    reachable: &'a HashSet<String>,
    ping_output: &'a str,
}

impl<'a> RemoteShell for FakeVms<'a> {
    fn run_remote(&mut self, host: &str, _login: &LoginInfo, _cmd: &str) -> Result<String> {
        if self.reachable.contains(host) {
            Ok(self.ping_output.to_string())
        } else {
            Err(Error::LoginFailed(host.to_string()))
        }
    }
}

#[derive(Debug)]
pub struct Finished(pub u32);

impl BackgroundProcess for Finished {
    fn id(&self) -> u32 {
        self.0
    }

    fn terminate(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Process host simulating the deployment
#[derive(Debug, Default)]
pub struct FakeHost {
    /// IPs of the VMs accepting the login
    pub reachable: HashSet<String>,
    /// Output of `ping` on the VMs
    pub ping_output: String,
    /// Devices on which tcpdump captures nothing
    pub silent: HashSet<String>,
    /// Output of `ovs-appctl fdb/show`
    pub fdb: String,
    /// Output of the reply trace
    pub reply: String,
    /// All foreground commands
    pub runs: Vec<String>,
    /// All background commands with their log file
    pub spawns: Vec<(String, PathBuf)>,
    /// Total time waited
    pub waited: Duration,
}

/// Value following `flag` in a command line, without quotes
pub fn arg<'a>(cmd: &'a str, flag: &str) -> Option<&'a str> {
    let mut tokens = cmd.split_whitespace();
    tokens.find(|t| *t == flag)?;
    tokens.next().map(|t| t.trim_matches('\''))
}

impl FakeHost {
    pub fn new(ping_output: &str, reachable: &[&str]) -> Self {
        Self {
            reachable: reachable.iter().map(|s| s.to_string()).collect(),
            ping_output: ping_output.to_string(),
            ..Default::default()
        }
    }

    fn probe(&self, cmd: &str) -> String {
        let src = arg(cmd, "--src-ip").unwrap_or_default();
        let dst = arg(cmd, "--dst-ip").unwrap_or_default();
        let count = arg(cmd, "--count").and_then(|c| c.parse().ok()).unwrap_or(2);
        let mut vms = FakeVms { reachable: &self.reachable, ping_output: &self.ping_output };
        let report: ProbeReport = ping_test(&mut vms, src, dst, &login(), count, 2);
        report.to_json().unwrap()
    }
}

impl ProcessHost for FakeHost {
    fn run(&mut self, cmd: &str) -> Result<String> {
        self.runs.push(cmd.to_string());
        if cmd.contains(" probe ping ") {
            Ok(self.probe(cmd))
        } else if cmd.contains("fdb/show") {
            Ok(self.fdb.clone())
        } else if cmd.contains("dl_src=AA:BB:CC:DD:EE:22") {
            Ok(self.reply.clone())
        } else {
            Ok(String::new())
        }
    }

    fn spawn(&mut self, cmd: &str, log: &Path) -> Result<Box<dyn BackgroundProcess>> {
        self.spawns.push((cmd.to_string(), log.to_path_buf()));
        if cmd.contains(" probe ping ") {
            std::fs::write(log, self.probe(cmd))?;
        } else if let Some(dev) = arg(cmd, "-i") {
            if self.silent.contains(dev) {
                std::fs::write(log, format!("tcpdump: listening on {}\n", dev))?;
            } else {
                std::fs::write(log, "10 packets captured\n10 packets received by filter\n")?;
            }
        }
        Ok(Box::new(Finished(self.spawns.len() as u32)))
    }

    fn settle(&mut self, duration: Duration) {
        self.waited += duration;
    }
}
