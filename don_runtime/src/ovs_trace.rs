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

//! # OVS MAC learning trace
//!
//! Checks that two ports of an OVS bridge with the same tag can reach each other: a packet from
//! the source port teaches the bridge a MAC address, and a reply from the destination port must
//! then be forwarded back to the source port.

use crate::probe::{ProbeCommand, ProbeReport};
use crate::process::ProcessHost;

use don::Error;

use lazy_static::lazy_static;
use log::*;
use regex::Regex;

/// MAC address used as source of the learning packet
pub const SRC_MAC: &str = "AA:BB:CC:DD:EE:11";
/// MAC address used as destination of the learning packet
pub const DST_MAC: &str = "AA:BB:CC:DD:EE:22";

lazy_static! {
    static ref FDB_ENTRY: Regex = Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\S+)\s+\d+").unwrap();
    static ref DATAPATH_ACTIONS: Regex = Regex::new(r"Datapath actions: (.*)").unwrap();
}

/// Run a command, record it as a step, and return its output. A failing command still yields its
/// output.
fn step(host: &mut dyn ProcessHost, cmd: String, report: &mut ProbeReport) -> String {
    let (output, pass) = match host.run(&cmd) {
        Ok(output) => (output, true),
        Err(Error::ExternalCommand { output, .. }) => (output, false),
        Err(e) => (e.to_string(), false),
    };
    report.command_list.push(ProbeCommand::new(cmd, &output, pass));
    output
}

fn trace_command(bridge: &str, in_port: &str, src_mac: &str, dst_mac: &str) -> String {
    format!(
        "sudo ovs-appctl ofproto/trace {} in_port={},dl_src={},dl_dst={} -generate",
        bridge, in_port, src_mac, dst_mac
    )
}

/// Find the port and VLAN on which `mac` is learned, in the output of `ovs-appctl fdb/show`.
pub fn learned_entry(output: &str, mac: &str) -> Option<(String, String)> {
    output
        .lines()
        .filter_map(|l| FDB_ENTRY.captures(l))
        .find(|caps| caps[3].eq_ignore_ascii_case(mac))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Run the MAC learning trace between the OpenFlow ports `src_port` and `dst_port` of `bridge`,
/// which are expected to use the VLAN `tag`.
pub fn ovs_test(
    host: &mut dyn ProcessHost,
    bridge: &str,
    src_port: &str,
    dst_port: &str,
    tag: &str,
) -> ProbeReport {
    let mut report = ProbeReport {
        comment: Some(format!("ovs {} port {} --> {}", bridge, src_port, dst_port)),
        ..Default::default()
    };

    step(host, format!("sudo ovs-appctl fdb/flush {}", bridge), &mut report);
    step(host, trace_command(bridge, src_port, SRC_MAC, DST_MAC), &mut report);
    let fdb = step(host, format!("sudo ovs-appctl fdb/show {}", bridge), &mut report);

    let (port, vlan) = match learned_entry(&fdb, SRC_MAC) {
        Some(entry) => entry,
        None => {
            report.errors.push(format!("{} not learnt on port {}", SRC_MAC, src_port));
            return report;
        }
    };
    if vlan != tag {
        report.errors.push(format!(
            "{} learnt on vlan {} but should have been learnt on vlan {} on port {}",
            SRC_MAC, vlan, tag, port
        ));
        return report;
    }
    report.debugs.push(format!("{} learnt on expected vlan {} on port {}", SRC_MAC, vlan, port));

    let reply = step(host, trace_command(bridge, dst_port, DST_MAC, SRC_MAC), &mut report);
    let forwarded = reply.lines().any(|l| l.contains("forwarding to learned port"));
    let egress = reply
        .lines()
        .find_map(|l| DATAPATH_ACTIONS.captures(l))
        .map(|c| c[1].trim().to_string());

    let mut pass = true;
    if forwarded {
        report.debugs.push("Packet for learnt mac forwarded properly".to_string());
    } else {
        report.errors.push("Packet for learnt mac not forwarded!".to_string());
        pass = false;
    }
    match egress {
        Some(port) if port == src_port => {
            report.debugs.push(format!("Packet forwarded to correct port {}", port))
        }
        Some(port) => {
            report.errors.push(format!(
                "Packet forwarded to incorrect port {}, expected {}",
                port, src_port
            ));
            pass = false;
        }
        None => {
            report.errors.push(format!("No egress port assigned to packet! Expected {}", src_port));
            pass = false;
        }
    }
    debug!(
        "ovs test {} port {} -> {}: {}",
        bridge,
        src_port,
        dst_port,
        if pass { "PASS" } else { "FAIL" }
    );
    report.pass = pass;
    report
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::process::BackgroundProcess;
    use don::Result;
    use std::path::Path;
    use std::time::Duration;

    struct Ovs {
        fdb: &'static str,
        reply: &'static str,
        commands: Vec<String>,
    }

    impl ProcessHost for Ovs {
        fn run(&mut self, cmd: &str) -> Result<String> {
            self.commands.push(cmd.to_string());
            if cmd.contains("fdb/show") {
                Ok(self.fdb.to_string())
            } else if cmd.contains("dl_src=AA:BB:CC:DD:EE:22") {
                Ok(self.reply.to_string())
            } else {
                Ok(String::new())
            }
        }

        fn spawn(&mut self, cmd: &str, _log: &Path) -> Result<Box<dyn BackgroundProcess>> {
            panic!("unexpected spawn: {}", cmd)
        }

        fn settle(&mut self, _duration: Duration) {}
    }

    const FDB: &str = " port  VLAN  MAC                Age\n    5     1  aa:bb:cc:dd:ee:11    0\n";
    const REPLY: &str = "Flow: in_port=6,dl_src=aa:bb:cc:dd:ee:22,dl_dst=aa:bb:cc:dd:ee:11\n\
                         bridge(\"br-int\")\n\
                         -> forwarding to learned port\n\
                         \n\
                         Final flow: unchanged\n\
                         Datapath actions: 5\n";

    #[test]
    fn learning_passes() {
        let mut host = Ovs { fdb: FDB, reply: REPLY, commands: vec![] };
        let report = ovs_test(&mut host, "br-int", "5", "6", "1");
        assert!(report.pass, "{:?}", report.errors);
        assert_eq!(
            host.commands,
            vec![
                "sudo ovs-appctl fdb/flush br-int",
                "sudo ovs-appctl ofproto/trace br-int in_port=5,dl_src=AA:BB:CC:DD:EE:11,dl_dst=AA:BB:CC:DD:EE:22 -generate",
                "sudo ovs-appctl fdb/show br-int",
                "sudo ovs-appctl ofproto/trace br-int in_port=6,dl_src=AA:BB:CC:DD:EE:22,dl_dst=AA:BB:CC:DD:EE:11 -generate",
            ]
        );
        assert_eq!(report.command_list.len(), 4);
    }

    #[test]
    fn wrong_vlan() {
        let mut host = Ovs { fdb: FDB, reply: REPLY, commands: vec![] };
        let report = ovs_test(&mut host, "br-int", "5", "6", "2");
        assert!(!report.pass);
        assert_eq!(host.commands.len(), 3);
        assert!(report.errors[0].contains("learnt on vlan 1"));
    }

    #[test]
    fn not_learnt() {
        let mut host = Ovs { fdb: " port  VLAN  MAC                Age\n", reply: REPLY, commands: vec![] };
        let report = ovs_test(&mut host, "br-int", "5", "6", "1");
        assert!(!report.pass);
        assert_eq!(report.errors, vec!["AA:BB:CC:DD:EE:11 not learnt on port 5".to_string()]);
    }

    #[test]
    fn wrong_egress() {
        let reply = "-> forwarding to learned port\nDatapath actions: 7\n";
        let mut host = Ovs { fdb: FDB, reply, commands: vec![] };
        let report = ovs_test(&mut host, "br-int", "5", "6", "1");
        assert!(!report.pass);
        assert_eq!(report.errors, vec!["Packet forwarded to incorrect port 7, expected 5".to_string()]);
    }
}
