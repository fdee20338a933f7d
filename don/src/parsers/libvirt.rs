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

//! Parser for the libvirt instance definitions.

use crate::topology::Topology;

use lazy_static::lazy_static;
use log::*;
use regex::Regex;

lazy_static! {
    static ref UUID: Regex = Regex::new(r"<uuid>(\S+)</uuid>").unwrap();
    static ref NAME: Regex = Regex::new(r"<nova:name>(\S+)</nova:name>").unwrap();
    static ref SOURCE_BRIDGE: Regex = Regex::new(r"<source bridge='(\S+)'/>").unwrap();
}

/// Parse the `uuid`, `nova:name` and `source bridge` lines of all instance definitions. Each
/// source bridge is attached to the VM named before it.
pub fn instances(lines: &[&str], topo: &mut Topology) {
    let mut uuid: Option<String> = None;
    let mut name: Option<String> = None;
    for line in lines {
        if let Some(caps) = UUID.captures(line) {
            uuid = caps.get(1).map(|m| m.as_str().to_string());
            continue;
        }
        if let Some(caps) = NAME.captures(line) {
            name = caps.get(1).map(|m| m.as_str().to_string());
            continue;
        }
        if let Some(caps) = SOURCE_BRIDGE.captures(line) {
            let name = match name.as_ref() {
                Some(name) => name,
                None => {
                    warn!("Found source bridge {} without an instance name", &caps[1]);
                    continue;
                }
            };
            let vm = topo.vm_entry(name);
            vm.uuid = uuid.clone();
            vm.attach_bridge(&caps[1]);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_instances() {
        let output = vec![
            "  <uuid>5e7c1a2b-0000-4000-8000-000000000001</uuid>",
            "      <nova:name>vm1</nova:name>",
            "      <source bridge='qbr0f1e2d3c-4b'/>",
            "      <source bridge='qbr1a2b3c4d-5e'/>",
            "  <uuid>5e7c1a2b-0000-4000-8000-000000000002</uuid>",
            "      <nova:name>vm2</nova:name>",
            "      <source bridge='qbr6ce314cb-a5'/>",
        ];
        let mut topo = Topology::new();
        instances(&output, &mut topo);

        let vm1 = &topo.vms["vm1"];
        assert_eq!(vm1.uuid.as_deref(), Some("5e7c1a2b-0000-4000-8000-000000000001"));
        assert_eq!(vm1.src_bridge, vec!["qbr0f1e2d3c-4b", "qbr1a2b3c4d-5e"]);
        assert_eq!(vm1.tap_dev, vec!["tap0f1e2d3c-4b", "tap1a2b3c4d-5e"]);
        let vm2 = &topo.vms["vm2"];
        assert_eq!(vm2.uuid.as_deref(), Some("5e7c1a2b-0000-4000-8000-000000000002"));
        assert_eq!(vm2.tap_dev, vec!["tap6ce314cb-a5"]);
    }

    #[test]
    fn bridge_without_name_is_skipped() {
        let output = vec!["      <source bridge='qbr0f1e2d3c-4b'/>"];
        let mut topo = Topology::new();
        instances(&output, &mut topo);
        assert!(topo.vms.is_empty());
    }
}
