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

//! Parsers for namespaces and their interfaces.

use crate::topology::{Namespace, Topology};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref NAMESPACE: Regex = Regex::new(r"^namespace: (\S+)").unwrap();
    static ref INTERFACE: Regex = Regex::new(r"^\d+: ([^:@\s]+)[:@]").unwrap();
    static ref INET: Regex = Regex::new(r"inet (\d+\.\d+\.\d+\.\d+)/\d+").unwrap();
}

/// Parse `ip netns`. Every namespace starting with `q` is created without interfaces.
pub fn ip_netns(lines: &[&str], topo: &mut Topology) {
    let namespaces = lines
        .iter()
        .filter(|line| line.starts_with('q'))
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| (name.to_string(), Namespace::default()))
        .collect::<BTreeMap<_, _>>();
    debug!("Found {} namespaces", namespaces.len());
    topo.namespaces = namespaces;
}

/// Parse `ip a` of a router namespace, recording the IP of every `qr-` and `qg-` interface.
pub fn router_namespace(lines: &[&str], topo: &mut Topology) {
    namespace_interfaces(lines, topo, &["qr-", "qg-"])
}

/// Parse `ip a` of a DHCP namespace, recording the IP of every `tap` interface.
pub fn dhcp_namespace(lines: &[&str], topo: &mut Topology) {
    namespace_interfaces(lines, topo, &["tap"])
}

/// The output starts with `namespace: <name>`, followed by the interface dump. Only the first
/// IPv4 address of each interface is recorded, without prefix length.
fn namespace_interfaces(lines: &[&str], topo: &mut Topology, prefixes: &[&str]) {
    let mut namespace: Option<String> = None;
    let mut interface: Option<String> = None;
    for line in lines {
        if let Some(caps) = NAMESPACE.captures(line) {
            namespace = Some(caps[1].to_string());
            interface = None;
            continue;
        }
        if let Some(caps) = INTERFACE.captures(line) {
            let name = &caps[1];
            interface = if prefixes.iter().any(|p| name.starts_with(p)) {
                Some(name.to_string())
            } else {
                None
            };
            continue;
        }
        if let Some(caps) = INET.captures(line) {
            if let (Some(nms), Some(intf)) = (namespace.as_ref(), interface.take()) {
                debug!("{}: {} has IP {}", nms, intf, &caps[1]);
                topo.namespaces
                    .entry(nms.clone())
                    .or_default()
                    .interfaces
                    .insert(intf, caps[1].to_string());
            }
        }
    }
}
