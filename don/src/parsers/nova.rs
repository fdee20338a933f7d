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

//! Parsers for the output of the nova client.

use super::table_row;
use crate::topology::{FloatingIp, Topology, VmInterface};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref IPV4: Regex = Regex::new(r"\d+\.\d+\.\d+\.\d+").unwrap();
}

/// Parse `nova list`. Every VM is created with its interfaces (IP and network name).
///
/// ```text
/// +------+------+--------+------------+-------------+---------------------------------+
/// | ID   | Name | Status | Task State | Power State | Networks                        |
/// +------+------+--------+------------+-------------+---------------------------------+
/// | 5e7c | vm1  | ACTIVE | -          | Running     | private=10.0.2.3; public=172... |
/// ```
pub fn nova_list(lines: &[&str], topo: &mut Topology) {
    for line in lines {
        if line.contains("Networks") {
            continue;
        }
        let parts = match table_row(line) {
            Some(parts) if parts.len() > 6 => parts,
            _ => continue,
        };
        let vm = topo.vm_entry(parts[2]);
        for entry in parts[6].split(';').map(|e| e.trim()).filter(|e| !e.is_empty()) {
            match network_entry(entry) {
                Some((network, ip)) => {
                    vm.interfaces.insert(ip, VmInterface { network });
                }
                None => debug!("Skipping network entry {} of VM {}", entry, parts[2]),
            }
        }
    }
}

/// Parse `network=ip[, ip...]` and return the network with its first IPv4 address.
fn network_entry(entry: &str) -> Option<(String, String)> {
    let (network, ips) = entry.split_once('=')?;
    let ip = ips.split(',').map(|ip| ip.trim()).find(|ip| IPV4.is_match(ip))?;
    Some((network.trim().to_string(), ip.to_string()))
}

/// Parse `nova floating-ip-list`. Floating IPs without a VM are ignored.
pub fn floating_ip_list(lines: &[&str], topo: &mut Topology) {
    let mut floating_ips = BTreeMap::new();
    for line in lines {
        if line.contains("Pool") {
            continue;
        }
        let parts = match table_row(line) {
            Some(parts) if parts.len() > 5 => parts,
            _ => continue,
        };
        let (floating_ip, vm_id, pool) = (parts[2], parts[3], parts[5]);
        if vm_id == "-" || vm_id.is_empty() {
            continue;
        }
        floating_ips.insert(
            vm_id.to_string(),
            FloatingIp { floating_ip: floating_ip.to_string(), pool: pool.to_string() },
        );
    }
    topo.floating_ips = floating_ips;
}

/// Parse `nova hypervisor-list` and return the hostnames of all hypervisors.
pub fn hypervisor_list(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !line.contains("Hypervisor hostname"))
        .filter_map(|line| table_row(line))
        .filter(|parts| parts.len() > 2 && !parts[2].is_empty())
        .map(|parts| parts[2].to_string())
        .collect()
}
