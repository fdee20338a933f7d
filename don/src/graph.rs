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

//! # Topology Graph
//!
//! Graph view on a [`Topology`]. Every VM, IP, interface, OVS bridge and namespace becomes a node.
//! Edges connect a VM to its IPs and tap devices, a Linux bridge to its members, a `qvb` device to
//! its `qvo` peer, an OVS port to its bridge, patch ports to their peer, and a namespace to its
//! interfaces.

use crate::topology::{strip_interface, OvsBridgeKind, Topology};

use log::*;
use petgraph::algo::has_path_connecting;
use petgraph::prelude::*;
use std::collections::HashMap;
use std::fmt;

type IndexType = u32;
/// Index of a node in the graph
pub type NodeId = NodeIndex<IndexType>;

/// Node of the topology graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    /// Virtual machine
    Vm(String),
    /// IP address of a VM
    Ip(String),
    /// Network device, like a tap device, a Linux bridge, a veth end or an OVS port
    Device(String),
    /// One of the three OVS bridges
    Bridge(OvsBridgeKind),
    /// Network namespace
    Namespace(String),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vm(name) => write!(f, "vm:{}", name),
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Device(name) | Self::Namespace(name) => write!(f, "{}", name),
            Self::Bridge(kind) => write!(f, "{}", kind),
        }
    }
}

/// Wiring of a single VM port from the tap device to br-int
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortWiring {
    /// Name of the VM
    pub vm: String,
    /// Tap device of the port
    pub tap: String,
    /// Tag of the `qvo` port on br-int
    pub tag: Option<String>,
    /// Links which are missing in the graph
    pub missing: Vec<String>,
}

impl PortWiring {
    /// Returns true if the port is fully wired and tagged
    pub fn pass(&self) -> bool {
        self.missing.is_empty() && self.tag.is_some()
    }
}

/// Graph built from a topology
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    graph: UnGraph<Node, (), IndexType>,
    indices: HashMap<Node, NodeId>,
}

impl TopologyGraph {
    /// Build the graph of the topology
    pub fn build(topo: &Topology) -> Self {
        let mut g = Self { graph: UnGraph::default(), indices: HashMap::new() };

        for (name, vm) in topo.vms.iter() {
            let vm_node = Node::Vm(name.clone());
            g.node(&vm_node);
            for ip in vm.interfaces.keys() {
                g.connect(&vm_node, &Node::Ip(ip.clone()));
            }
            for (bridge, tap) in vm.src_bridge.iter().zip(vm.tap_dev.iter()) {
                let tap_node = Node::Device(tap.clone());
                g.connect(&vm_node, &tap_node);
                g.connect(&tap_node, &Node::Device(bridge.clone()));
                if let Some(ip) = topo.tap_to_ip.get(strip_interface(tap)) {
                    g.connect(&Node::Ip(ip.clone()), &tap_node);
                }
            }
        }

        for (name, bridge) in topo.brctl.iter() {
            let bridge_node = Node::Device(name.clone());
            for intf in bridge.interfaces.iter() {
                let member = Node::Device(intf.clone());
                g.connect(&bridge_node, &member);
                if let Some(suffix) = intf.strip_prefix("qvb") {
                    g.connect(&member, &Node::Device(format!("qvo{}", suffix)));
                }
            }
        }

        for kind in OvsBridgeKind::ALL.iter() {
            let bridge_node = Node::Bridge(*kind);
            g.node(&bridge_node);
            for (port_name, port) in topo.bridge(*kind).ports.iter() {
                let port_node = Node::Device(port_name.clone());
                g.connect(&bridge_node, &port_node);
                for (intf_name, intf) in port.interfaces.iter() {
                    let intf_node = Node::Device(intf_name.clone());
                    if intf_node != port_node {
                        g.connect(&port_node, &intf_node);
                    }
                    if let Some(peer) = intf.options.as_deref().and_then(patch_peer) {
                        g.connect(&intf_node, &Node::Device(peer));
                    }
                }
            }
        }

        for (name, namespace) in topo.namespaces.iter() {
            let ns_node = Node::Namespace(name.clone());
            g.node(&ns_node);
            for intf in namespace.interfaces.keys() {
                g.connect(&ns_node, &Node::Device(intf.clone()));
            }
        }

        debug!(
            "Topology graph has {} nodes and {} edges",
            g.graph.node_count(),
            g.graph.edge_count()
        );
        g
    }

    /// Get the index of a node, adding it if it does not yet exist
    fn node(&mut self, node: &Node) -> NodeId {
        if let Some(id) = self.indices.get(node) {
            return *id;
        }
        let id = self.graph.add_node(node.clone());
        self.indices.insert(node.clone(), id);
        id
    }

    fn connect(&mut self, a: &Node, b: &Node) {
        let a = self.node(a);
        let b = self.node(b);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true if the node exists in the graph
    pub fn contains(&self, node: &Node) -> bool {
        self.indices.contains_key(node)
    }

    /// Returns true if both nodes are directly connected
    pub fn is_linked(&self, a: &Node, b: &Node) -> bool {
        match (self.indices.get(a), self.indices.get(b)) {
            (Some(a), Some(b)) => self.graph.find_edge(*a, *b).is_some(),
            _ => false,
        }
    }

    /// Returns true if there exists a path between both nodes
    pub fn has_path(&self, a: &Node, b: &Node) -> bool {
        match (self.indices.get(a), self.indices.get(b)) {
            (Some(a), Some(b)) => has_path_connecting(&self.graph, *a, *b, None),
            _ => false,
        }
    }

    /// Direct neighbors of a node, sorted
    pub fn neighbors(&self, node: &Node) -> Vec<&Node> {
        let mut result = match self.indices.get(node) {
            Some(id) => self.graph.neighbors(*id).map(|n| &self.graph[n]).collect::<Vec<_>>(),
            None => Vec::new(),
        };
        result.sort();
        result
    }

    /// Check the wiring of every VM port: `vm - tap - qbr - qvb - qvo - br-int`. Every link that
    /// is missing is reported, together with the tag of the `qvo` port.
    pub fn vm_port_wiring(&self, topo: &Topology) -> Vec<PortWiring> {
        let mut result = Vec::new();
        for (name, vm) in topo.vms.iter() {
            for tap in vm.tap_dev.iter() {
                let suffix = strip_interface(tap);
                let chain = [
                    Node::Vm(name.clone()),
                    Node::Device(tap.clone()),
                    Node::Device(format!("qbr{}", suffix)),
                    Node::Device(format!("qvb{}", suffix)),
                    Node::Device(format!("qvo{}", suffix)),
                    Node::Bridge(OvsBridgeKind::Integration),
                ];
                let missing = chain
                    .windows(2)
                    .filter(|link| !self.is_linked(&link[0], &link[1]))
                    .map(|link| format!("{} -> {}", link[0], link[1]))
                    .collect::<Vec<_>>();
                let tag = topo
                    .bridges
                    .br_int
                    .ports
                    .get(&format!("qvo{}", suffix))
                    .and_then(|p| p.tag.clone());
                if !missing.is_empty() {
                    warn!("Port {} of VM {} is not wired: {:?}", tap, name, missing);
                }
                result.push(PortWiring { vm: name.clone(), tap: tap.clone(), tag, missing });
            }
        }
        result
    }
}

/// Extract the peer of a patch port from the interface options, like `peer=patch-int`
fn patch_peer(options: &str) -> Option<String> {
    options
        .split(',')
        .filter_map(|opt| opt.trim().strip_prefix("peer="))
        .map(|peer| peer.trim_matches('"').to_string())
        .next()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::{Namespace, OvsInterface, OvsPort};
    use maplit::btreemap;

    fn topo() -> Topology {
        let mut topo = Topology::new();
        let vm = topo.vm_entry("vm1");
        vm.interfaces.insert("10.0.2.3".to_string(), Default::default());
        vm.attach_bridge("qbr6ce314cb-a5");
        vm.attach_bridge("qbrb0f5cfc8-4d");
        topo.tap_to_ip.insert("6ce314cb-a5".to_string(), "10.0.2.3".to_string());
        topo.record_linuxbridge(
            "qbr6ce314cb-a5",
            vec!["qvb6ce314cb-a5".to_string(), "tap6ce314cb-a5".to_string()],
        );
        topo.record_linuxbridge("qbrb0f5cfc8-4d", vec!["tapb0f5cfc8-4d".to_string()]);
        topo.bridges.br_int.ports = btreemap! {
            "qvo6ce314cb-a5".to_string() => OvsPort {
                tag: Some("1".to_string()),
                ..Default::default()
            },
            "qr-11111111-11".to_string() => OvsPort {
                tag: Some("1".to_string()),
                ..Default::default()
            },
            "patch-tun".to_string() => OvsPort {
                interfaces: btreemap! {"patch-tun".to_string() => OvsInterface {
                    kind: Some("patch".to_string()),
                    options: Some("peer=patch-int".to_string()),
                }},
                ..Default::default()
            },
        };
        topo.bridges.br_tun.ports.insert("patch-int".to_string(), OvsPort::default());
        topo.namespaces.insert(
            "qrouter-aa".to_string(),
            Namespace {
                interfaces: btreemap! {"qr-11111111-11".to_string() => "10.0.2.1".to_string()},
            },
        );
        topo
    }

    #[test]
    fn paths() {
        let g = TopologyGraph::build(&topo());
        let vm = Node::Vm("vm1".to_string());
        assert!(g.has_path(&vm, &Node::Bridge(OvsBridgeKind::Integration)));
        assert!(g.has_path(&vm, &Node::Bridge(OvsBridgeKind::Tunnel)));
        assert!(g.has_path(&Node::Ip("10.0.2.3".to_string()), &Node::Namespace("qrouter-aa".to_string())));
        assert!(!g.has_path(&vm, &Node::Bridge(OvsBridgeKind::External)));
        assert!(!g.has_path(&vm, &Node::Vm("vm2".to_string())));
        assert_eq!(
            g.neighbors(&Node::Device("tap6ce314cb-a5".to_string())),
            vec![
                &Node::Vm("vm1".to_string()),
                &Node::Ip("10.0.2.3".to_string()),
                &Node::Device("qbr6ce314cb-a5".to_string()),
            ]
        );
    }

    #[test]
    fn wiring() {
        let topo = topo();
        let g = TopologyGraph::build(&topo);
        let wiring = g.vm_port_wiring(&topo);
        assert_eq!(wiring.len(), 2);
        assert!(wiring[0].pass());
        assert_eq!(wiring[0].tag.as_deref(), Some("1"));
        assert!(!wiring[1].pass());
        assert_eq!(
            wiring[1].missing,
            vec![
                "qbrb0f5cfc8-4d -> qvbb0f5cfc8-4d".to_string(),
                "qvbb0f5cfc8-4d -> qvob0f5cfc8-4d".to_string(),
                "qvob0f5cfc8-4d -> br-int".to_string(),
            ]
        );
        assert_eq!(wiring[1].tag, None);
    }

    #[test]
    fn patch_options() {
        assert_eq!(patch_peer("peer=patch-int"), Some("patch-int".to_string()));
        assert_eq!(patch_peer("in_key=flow, peer=\"patch-tun\""), Some("patch-tun".to_string()));
        assert_eq!(patch_peer("df_default=\"true\", in_key=flow"), None);
    }
}
