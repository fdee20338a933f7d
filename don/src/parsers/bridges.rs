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

//! Parsers for the Linux bridges and the OVS bridges.

use crate::topology::{OvsBridge, OvsBridgeKind, OvsInterface, Topology};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref QBR_BRIDGE: Regex = Regex::new(r"^(qbr\S+)\s+\S+\s+\S+(?:\s+(\S+))?").unwrap();
    static ref BRIDGE_MEMBER: Regex = Regex::new(r"^\s+(\S+)").unwrap();
    static ref OVS_BRIDGE: Regex = Regex::new(r#"^\s*Bridge\s+"?([^"\s]+)"?"#).unwrap();
    static ref OVS_FAIL_MODE: Regex = Regex::new(r"^\s*fail_mode:\s+(\S+)").unwrap();
    static ref OVS_PORT: Regex = Regex::new(r#"^\s*Port\s+"?([^"\s]+)"?"#).unwrap();
    static ref OVS_TAG: Regex = Regex::new(r"^\s*tag:\s+(\d+)").unwrap();
    static ref OVS_INTERFACE: Regex = Regex::new(r#"^\s*Interface\s+"?([^"\s]+)"?"#).unwrap();
    static ref OVS_TYPE: Regex = Regex::new(r"^\s*type:\s+(\S+)").unwrap();
    static ref OVS_OPTIONS: Regex = Regex::new(r"^\s*options:\s+\{(.*)\}").unwrap();
    static ref OFCTL_PORT: Regex = Regex::new(r"^\s*(\w+)\(([^)\s]+)\):\s+addr:(\S+)").unwrap();
}

/// Parse `brctl show`. Only the `qbr` bridges of neutron are recorded.
///
/// ```text
/// bridge name     bridge id               STP enabled     interfaces
/// qbr6ce314cb-a5  8000.9255d5550cf8       no              qvb6ce314cb-a5
///                                                         tap6ce314cb-a5
/// virbr0          8000.000000000000       yes
/// ```
pub fn brctl_show(lines: &[&str], topo: &mut Topology) {
    let mut current: Option<(String, Vec<String>)> = None;
    for line in lines {
        if let Some(caps) = QBR_BRIDGE.captures(line) {
            if let Some((bridge, interfaces)) = current.take() {
                topo.record_linuxbridge(&bridge, interfaces);
            }
            let interfaces = caps.get(2).map(|m| vec![m.as_str().to_string()]).unwrap_or_default();
            current = Some((caps[1].to_string(), interfaces));
            continue;
        }
        if let Some(caps) = BRIDGE_MEMBER.captures(line) {
            if let Some((_, interfaces)) = current.as_mut() {
                interfaces.push(caps[1].to_string());
            }
            continue;
        }
        // any other top-level line ends the current bridge
        if !line.trim().is_empty() {
            if let Some((bridge, interfaces)) = current.take() {
                topo.record_linuxbridge(&bridge, interfaces);
            }
        }
    }
    if let Some((bridge, interfaces)) = current.take() {
        topo.record_linuxbridge(&bridge, interfaces);
    }
}

/// Parse `ovs-vsctl show`. Ports with their tag and interfaces are recorded for the three known
/// bridges. All other bridges are skipped.
pub fn ovs_vsctl_show(lines: &[&str], topo: &mut Topology) {
    let mut bridge: Option<OvsBridgeKind> = None;
    let mut port: Option<String> = None;
    let mut interface: Option<String> = None;

    for line in lines {
        if let Some(caps) = OVS_BRIDGE.captures(line) {
            bridge = match topo.get_bridge_entry(&caps[1]) {
                Some(_) => OvsBridgeKind::from_name(&caps[1]),
                None => None,
            };
            port = None;
            interface = None;
            continue;
        }
        let entry = match bridge {
            Some(kind) => topo.bridge_mut(kind),
            None => continue,
        };
        if let Some(caps) = OVS_FAIL_MODE.captures(line) {
            entry.fail_mode = Some(caps[1].to_string());
        } else if let Some(caps) = OVS_PORT.captures(line) {
            entry.ports.entry(caps[1].to_string()).or_default();
            port = Some(caps[1].to_string());
            interface = None;
        } else if let Some(caps) = OVS_TAG.captures(line) {
            if let Some(p) = port.as_ref().and_then(|p| entry.ports.get_mut(p)) {
                p.tag = Some(caps[1].to_string());
            }
        } else if let Some(caps) = OVS_INTERFACE.captures(line) {
            if let Some(p) = port.as_ref().and_then(|p| entry.ports.get_mut(p)) {
                p.interfaces.entry(caps[1].to_string()).or_default();
                interface = Some(caps[1].to_string());
            }
        } else if let Some(caps) = OVS_TYPE.captures(line) {
            if let Some(i) = interface_entry(entry, &port, &interface) {
                i.kind = Some(caps[1].to_string());
            }
        } else if let Some(caps) = OVS_OPTIONS.captures(line) {
            if let Some(i) = interface_entry(entry, &port, &interface) {
                i.options = Some(caps[1].to_string());
            }
        }
    }
}

fn interface_entry<'a>(
    bridge: &'a mut OvsBridge,
    port: &Option<String>,
    interface: &Option<String>,
) -> Option<&'a mut OvsInterface> {
    let port = bridge.ports.get_mut(port.as_ref()?)?;
    port.interfaces.get_mut(interface.as_ref()?)
}

/// Parse `ovs-ofctl show <bridge>`, setting the OpenFlow port number and MAC address of every
/// port. The local port is recorded with the id `LOCAL`.
pub fn ovs_ofctl_show(bridge: OvsBridgeKind, lines: &[&str], topo: &mut Topology) {
    let entry = topo.bridge_mut(bridge);
    for line in lines {
        if let Some(caps) = OFCTL_PORT.captures(line) {
            let port = entry.ports.entry(caps[2].to_string()).or_default();
            port.id = Some(caps[1].to_string());
            port.mac = Some(caps[3].to_string());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::{LinuxBridge, OvsPort};
    use maplit::btreemap;

    #[test]
    fn parse_brctl_show() {
        let output = vec![
            "bridge name     bridge id               STP enabled     interfaces",
            "qbr6ce314cb-a5          8000.9255d5550cf8       no              qvb6ce314cb-a5",
            "                                                        tap6ce314cb-a5",
            "qbrb0f5cfc8-4d          8000.b2277f2c981b       no              qvbb0f5cfc8-4d",
            "                                                        tapb0f5cfc8-4d",
            "virbr0          8000.000000000000       yes",
            "                                                        virbr0-nic",
            "qbr00000000-00          8000.000000000000       no",
        ];
        let mut topo = Topology::new();
        brctl_show(&output, &mut topo);
        assert_eq!(
            topo.brctl,
            btreemap! {
                "qbr6ce314cb-a5".to_string() => LinuxBridge {
                    interfaces: vec!["qvb6ce314cb-a5".to_string(), "tap6ce314cb-a5".to_string()],
                },
                "qbrb0f5cfc8-4d".to_string() => LinuxBridge {
                    interfaces: vec!["qvbb0f5cfc8-4d".to_string(), "tapb0f5cfc8-4d".to_string()],
                },
                "qbr00000000-00".to_string() => LinuxBridge { interfaces: vec![] },
            }
        );
    }

    #[test]
    fn parse_ovs_vsctl_show() {
        let output = vec![
            "0a4f5b3c-1d2e-4f5a-8b9c-0d1e2f3a4b5c",
            "    Manager \"ptcp:6640:127.0.0.1\"",
            "        is_connected: true",
            "    Bridge br-int",
            "        Controller \"tcp:127.0.0.1:6633\"",
            "            is_connected: true",
            "        fail_mode: secure",
            "        Port \"qvo6ce314cb-a5\"",
            "            tag: 1",
            "            Interface \"qvo6ce314cb-a5\"",
            "        Port patch-tun",
            "            Interface patch-tun",
            "                type: patch",
            "                options: {peer=patch-int}",
            "    Bridge br-eth1",
            "        Port phy-br-eth1",
            "            Interface phy-br-eth1",
            "    Bridge \"br-tun\"",
            "        Port \"vxlan-0a000002\"",
            "            Interface \"vxlan-0a000002\"",
            "                type: vxlan",
            "                options: {df_default=\"true\", in_key=flow, local_ip=\"10.0.0.1\"}",
            "    ovs_version: \"2.5.0\"",
        ];
        let mut topo = Topology::new();
        ovs_vsctl_show(&output, &mut topo);

        assert_eq!(topo.bridges.br_int.fail_mode.as_deref(), Some("secure"));
        assert_eq!(
            topo.bridges.br_int.ports,
            btreemap! {
                "qvo6ce314cb-a5".to_string() => OvsPort {
                    tag: Some("1".to_string()),
                    interfaces: btreemap! {"qvo6ce314cb-a5".to_string() => OvsInterface::default()},
                    ..Default::default()
                },
                "patch-tun".to_string() => OvsPort {
                    interfaces: btreemap! {"patch-tun".to_string() => OvsInterface {
                        kind: Some("patch".to_string()),
                        options: Some("peer=patch-int".to_string()),
                    }},
                    ..Default::default()
                },
            }
        );
        assert_eq!(
            topo.bridges.br_tun.ports["vxlan-0a000002"].interfaces["vxlan-0a000002"],
            OvsInterface {
                kind: Some("vxlan".to_string()),
                options: Some("df_default=\"true\", in_key=flow, local_ip=\"10.0.0.1\"".to_string()),
            }
        );
        assert!(topo.bridges.br_ex.ports.is_empty());
    }

    #[test]
    fn parse_ovs_ofctl_show() {
        let output = vec![
            "OFPT_FEATURES_REPLY (xid=0x2): dpid:0000be1d5d3ef14b",
            "n_tables:254, n_buffers:256",
            " 1(patch-tun): addr:9a:6f:6e:42:97:4c",
            "     config:     0",
            "     state:      0",
            " 2(qvo6ce314cb-a5): addr:3e:1c:11:22:33:44",
            " LOCAL(br-int): addr:be:1d:5d:3e:f1:4b",
            "OFPT_GET_CONFIG_REPLY (xid=0x4): frags=normal miss_send_len=0",
        ];
        let mut topo = Topology::new();
        topo.bridges.br_int.ports.insert(
            "qvo6ce314cb-a5".to_string(),
            OvsPort { tag: Some("1".to_string()), ..Default::default() },
        );
        ovs_ofctl_show(OvsBridgeKind::Integration, &output, &mut topo);

        let ports = &topo.bridges.br_int.ports;
        assert_eq!(ports.len(), 3);
        assert_eq!(ports["patch-tun"].id.as_deref(), Some("1"));
        assert_eq!(ports["qvo6ce314cb-a5"].id.as_deref(), Some("2"));
        assert_eq!(ports["qvo6ce314cb-a5"].mac.as_deref(), Some("3e:1c:11:22:33:44"));
        assert_eq!(ports["qvo6ce314cb-a5"].tag.as_deref(), Some("1"));
        assert_eq!(ports["br-int"].id.as_deref(), Some("LOCAL"));
    }
}
