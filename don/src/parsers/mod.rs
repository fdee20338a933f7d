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

//! # Output Parsers
//!
//! Every diagnostic command has its own parser, which updates the [`Topology`] with the
//! information found in the output. Parsers are best-effort: lines which cannot be understood
//! are skipped. Parsers never schedule commands themselves. Instead, they return a
//! [`Discovery`] for every namespace whose interfaces should be inspected, which the collector
//! registers in the catalog before the next iteration.

mod bridges;
mod libvirt;
mod neutron;
mod netns;
mod nova;

pub use bridges::{brctl_show, ovs_ofctl_show, ovs_vsctl_show};
pub use libvirt::instances;
pub use netns::{dhcp_namespace, ip_netns, router_namespace};
pub use neutron::{neutron_net_list, neutron_port_list, neutron_router_list};
pub use nova::{floating_ip_list, hypervisor_list, nova_list};

use crate::topology::{OvsBridgeKind, Topology};

/// Event emitted by a parser when it discovers something that requires more commands to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// A namespace whose interfaces need to be collected
    Namespace(String),
}

/// Identifies the parser of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    /// `nova list`
    NovaList,
    /// Excerpts of the libvirt instance definitions
    Instances,
    /// `neutron port-list`
    NeutronPortList,
    /// `neutron router-list`
    NeutronRouterList,
    /// `neutron net-list`
    NeutronNetList,
    /// `ip netns`
    IpNetns,
    /// `brctl show`
    BrctlShow,
    /// `ovs-vsctl show`
    OvsVsctlShow,
    /// `ovs-ofctl show <bridge>`
    OvsOfctlShow(OvsBridgeKind),
    /// `nova floating-ip-list`
    FloatingIpList,
    /// `ip a` inside a router namespace
    RouterNamespace,
    /// `ip a` inside a DHCP namespace
    DhcpNamespace,
}

impl ParserKind {
    /// Parse the output of the command and update the topology.
    pub fn parse(&self, lines: &[&str], topo: &mut Topology) -> Vec<Discovery> {
        match self {
            Self::NeutronRouterList => neutron_router_list(lines, topo),
            Self::NeutronNetList => neutron_net_list(lines, topo),
            other => {
                other.update(lines, topo);
                Vec::new()
            }
        }
    }

    /// Run one of the parsers which only update the topology.
    fn update(&self, lines: &[&str], topo: &mut Topology) {
        match self {
            Self::NovaList => nova_list(lines, topo),
            Self::Instances => instances(lines, topo),
            Self::NeutronPortList => neutron_port_list(lines, topo),
            Self::IpNetns => ip_netns(lines, topo),
            Self::BrctlShow => brctl_show(lines, topo),
            Self::OvsVsctlShow => ovs_vsctl_show(lines, topo),
            Self::OvsOfctlShow(bridge) => ovs_ofctl_show(*bridge, lines, topo),
            Self::FloatingIpList => floating_ip_list(lines, topo),
            Self::RouterNamespace => router_namespace(lines, topo),
            Self::DhcpNamespace => dhcp_namespace(lines, topo),
            Self::NeutronRouterList | Self::NeutronNetList => {}
        }
    }
}

/// Split a row of a table printed by the OpenStack clients into its trimmed cells. Borders and
/// empty lines return `None`. The first cell is always empty, since rows start with `|`.
pub(crate) fn table_row(line: &str) -> Option<Vec<&str>> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('+') {
        return None;
    }
    Some(line.split('|').map(|cell| cell.trim()).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_neutron_lists_discover_namespaces() {
        let routers = vec![
            "+--------------------------------------+---------+-----------------------+",
            "| id                                   | name    | external_gateway_info |",
            "+--------------------------------------+---------+-----------------------+",
            "| 8c981cdb-6a7b-4f2c-9d3e-1a2b3c4d5e6f | router1 | null                  |",
            "+--------------------------------------+---------+-----------------------+",
        ];
        let mut topo = Topology::new();
        assert_eq!(
            ParserKind::NeutronRouterList.parse(&routers, &mut topo),
            vec![Discovery::Namespace("qrouter-8c981cdb-6a7b-4f2c-9d3e-1a2b3c4d5e6f".to_string())]
        );
        assert_eq!(topo.routers["router1"].id, "8c981cdb-6a7b-4f2c-9d3e-1a2b3c4d5e6f");

        let bridges = vec!["bridge name     bridge id               STP enabled     interfaces"];
        assert!(ParserKind::BrctlShow.parse(&bridges, &mut topo).is_empty());
    }

    #[test]
    fn table_rows() {
        assert_eq!(table_row("+----+----+"), None);
        assert_eq!(table_row(""), None);
        assert_eq!(table_row("| a  | b |"), Some(vec!["", "a", "b", ""]));
    }
}
