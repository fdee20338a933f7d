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

//! Parsers for the output of the neutron client.

use super::{table_row, Discovery};
use crate::topology::{Network, NamespaceKind, Router, Topology, UNKNOWN_IP, UNKNOWN_NETWORK};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::collections::BTreeMap;

/// Length of the port id prefix used in the device names (`tap` + 11 characters).
const PORT_SUFFIX_LEN: usize = 11;

lazy_static! {
    static ref FIXED_IP: Regex =
        Regex::new(r#"ip_address["']?\s*[:=]\s*["']([^"'\s]+)["']"#).unwrap();
    static ref GATEWAY_NETWORK: Regex = Regex::new(r#""network_id":\s*"([^"]+)""#).unwrap();
    static ref GATEWAY_IP: Regex =
        Regex::new(r#""ip_address":\s*"(\d+\.\d+\.\d+\.\d+)""#).unwrap();
    static ref NETWORK_ROW: Regex = Regex::new(r"^\| (\S+) \| (\S+)\s+\| \S+ (\S+)").unwrap();
    static ref SUBNET_ROW: Regex = Regex::new(r"^\|\s+\|\s+\| \S+ (\S+)").unwrap();
}

/// Parse `neutron port-list` and build the `tap_to_ip` index. The key is the prefix of the port
/// id which appears in the names of the tap, qbr, qvb and qvo devices.
pub fn neutron_port_list(lines: &[&str], topo: &mut Topology) {
    let mut tap_to_ip = BTreeMap::new();
    for line in lines {
        if line.contains("fixed_ips") {
            continue;
        }
        let parts = match table_row(line) {
            Some(parts) if parts.len() > 4 && !parts[1].is_empty() => parts,
            _ => continue,
        };
        let tap = parts[1].chars().take(PORT_SUFFIX_LEN).collect::<String>();
        match FIXED_IP.captures(parts[4]) {
            Some(caps) => {
                tap_to_ip.insert(tap, caps[1].to_string());
            }
            None => debug!("Port {} has no fixed IP", parts[1]),
        }
    }
    if !topo.tap_to_ip.is_empty() {
        warn!("Replacing the existing tap_to_ip index");
    }
    topo.tap_to_ip = tap_to_ip;
}

/// Parse `neutron router-list`. Every router announces its namespace `qrouter-<id>`.
pub fn neutron_router_list(lines: &[&str], topo: &mut Topology) -> Vec<Discovery> {
    let mut routers = BTreeMap::new();
    for line in lines {
        if line.contains("external_gateway_info") {
            continue;
        }
        let parts = match table_row(line) {
            Some(parts) if parts.len() > 3 && !parts[1].is_empty() => parts,
            _ => continue,
        };
        let network_id = GATEWAY_NETWORK
            .captures(parts[3])
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| UNKNOWN_NETWORK.to_string());
        let ip_address = GATEWAY_IP
            .captures(parts[3])
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| UNKNOWN_IP.to_string());
        routers.insert(
            parts[2].to_string(),
            Router { id: parts[1].to_string(), ip_address, network_id },
        );
    }
    let discoveries = routers
        .values()
        .map(|r| Discovery::Namespace(format!("{}{}", NamespaceKind::ROUTER_PREFIX, r.id)))
        .collect();
    topo.routers = routers;
    discoveries
}

/// Parse `neutron net-list`. Only networks with an IPv4 subnet are recorded. Every network,
/// except the one named `public`, announces its DHCP namespace `qdhcp-<id>`.
pub fn neutron_net_list(lines: &[&str], topo: &mut Topology) -> Vec<Discovery> {
    let mut networks = BTreeMap::new();
    let mut current: Option<(String, String)> = None;
    for line in lines {
        if line.starts_with('+') || line.trim().is_empty() || line.contains("subnets") {
            continue;
        }
        let subnet = if let Some(caps) = NETWORK_ROW.captures(line) {
            current = Some((caps[1].to_string(), caps[2].to_string()));
            caps[3].to_string()
        } else if let Some(caps) = SUBNET_ROW.captures(line) {
            caps[1].to_string()
        } else {
            continue;
        };
        // IPv6 subnets are skipped
        if !subnet.contains('.') {
            continue;
        }
        if let Some((id, name)) = current.as_ref() {
            networks.insert(id.clone(), Network { name: name.clone(), ip: subnet });
        }
    }
    let discoveries = networks
        .iter()
        .filter(|(_, net)| net.name != "public")
        .map(|(id, _)| Discovery::Namespace(format!("{}{}", NamespaceKind::DHCP_PREFIX, id)))
        .collect();
    topo.networks = networks;
    discoveries
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn parse_port_list() {
        let output = vec![
            "+--------------------------------------+------+-------------------+-----------------------------------------------------------------------------------+",
            "| id                                   | name | mac_address       | fixed_ips                                                                         |",
            "+--------------------------------------+------+-------------------+-----------------------------------------------------------------------------------+",
            r#"| 1dd820b1-98bd-4f39-b1ab-e89ecc67ae43 |      | fa:16:3e:0f:36:26 | {"subnet_id": "75ae4ce8-495d-4f53-93d1-bf98e55d6658", "ip_address": "172.24.4.4"} |"#,
            r#"| 56cf8a2d-27b7-4eab-a334-349c70520868 |      | fa:16:3e:8a:ce:cb | {"subnet_id": "1083b740-45ce-49be-b603-73cbc26af5d7", "ip_address": "10.0.2.1"}   |"#,
            r#"| b0f5cfc8-4da0-42ad-8c18-6f29870bfb2a |      | fa:16:3e:ae:a2:17 | ip_address='10.0.2.3', subnet_id='1083b740-45ce-49be-b603-73cbc26af5d7'           |"#,
            "| c03437a8-8a44-4615-b160-e1ef227d63c5 |      | fa:16:3e:7f:b6:a5 |                                                                                   |",
            "+--------------------------------------+------+-------------------+-----------------------------------------------------------------------------------+",
        ];
        let mut topo = Topology::new();
        neutron_port_list(&output, &mut topo);
        assert_eq!(
            topo.tap_to_ip,
            btreemap! {
                "1dd820b1-98".to_string() => "172.24.4.4".to_string(),
                "56cf8a2d-27".to_string() => "10.0.2.1".to_string(),
                "b0f5cfc8-4d".to_string() => "10.0.2.3".to_string(),
            }
        );
    }

    #[test]
    fn parse_router_list() {
        let output = vec![
            "+--------------------------------------+---------+--------------------------------------------------------------+-------------+-------+",
            "| id                                   | name    | external_gateway_info                                        | distributed | ha    |",
            "+--------------------------------------+---------+--------------------------------------------------------------+-------------+-------+",
            r#"| 8c981cdb-c19f-47c1-8149-f85a506c486c | router1 | {"network_id": "5c2d6e1f-aaaa", "enable_snat": true, "external_fixed_ips": [{"subnet_id": "75ae", "ip_address": "172.24.4.2"}]} | False | False |"#,
            "| ac41aab2-f9c3-4a06-8eef-f909ee1e6e50 | router2 | null                                                         | False       | False |",
            "+--------------------------------------+---------+--------------------------------------------------------------+-------------+-------+",
        ];
        let mut topo = Topology::new();
        let discoveries = neutron_router_list(&output, &mut topo);
        assert_eq!(
            topo.routers,
            btreemap! {
                "router1".to_string() => Router {
                    id: "8c981cdb-c19f-47c1-8149-f85a506c486c".to_string(),
                    ip_address: "172.24.4.2".to_string(),
                    network_id: "5c2d6e1f-aaaa".to_string(),
                },
                "router2".to_string() => Router {
                    id: "ac41aab2-f9c3-4a06-8eef-f909ee1e6e50".to_string(),
                    ip_address: UNKNOWN_IP.to_string(),
                    network_id: UNKNOWN_NETWORK.to_string(),
                },
            }
        );
        assert_eq!(
            discoveries,
            vec![
                Discovery::Namespace("qrouter-8c981cdb-c19f-47c1-8149-f85a506c486c".to_string()),
                Discovery::Namespace("qrouter-ac41aab2-f9c3-4a06-8eef-f909ee1e6e50".to_string()),
            ]
        );
    }

    #[test]
    fn parse_net_list() {
        let output = vec![
            "+--------------------------------------+----------+-------------------------------------------------------+",
            "| id                                   | name     | subnets                                               |",
            "+--------------------------------------+----------+-------------------------------------------------------+",
            "| 0a355cf0-00d0-45e1-9a3a-9aca436510d5 | private1 | 8393a2da-09dd-46e8-a26f-caf9f12c48f5 fd2e:a3d5::/64   |",
            "|                                      |          | 1083b740-45ce-49be-b603-73cbc26af5d7 10.0.2.0/24      |",
            "| 5c2d6e1f-aaaa-4bbb-8ccc-dddddddddddd | public   | 75ae4ce8-495d-4f53-93d1-bf98e55d6658 172.24.4.0/24    |",
            "| 6f7e8d9c-0000-4000-8000-000000000000 | private6 | 0b1b2b3b-45ce-49be-b603-73cbc26af5d7 2001:db8::/64    |",
            "+--------------------------------------+----------+-------------------------------------------------------+",
        ];
        let mut topo = Topology::new();
        let discoveries = neutron_net_list(&output, &mut topo);
        assert_eq!(
            topo.networks,
            btreemap! {
                "0a355cf0-00d0-45e1-9a3a-9aca436510d5".to_string() => Network {
                    name: "private1".to_string(),
                    ip: "10.0.2.0/24".to_string(),
                },
                "5c2d6e1f-aaaa-4bbb-8ccc-dddddddddddd".to_string() => Network {
                    name: "public".to_string(),
                    ip: "172.24.4.0/24".to_string(),
                },
            }
        );
        assert_eq!(
            discoveries,
            vec![Discovery::Namespace("qdhcp-0a355cf0-00d0-45e1-9a3a-9aca436510d5".to_string())]
        );
    }
}
