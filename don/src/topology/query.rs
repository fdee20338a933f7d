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

//! Lookup helpers on the topology. Lookups never fail; a miss returns a sentinel.

use super::{NamespaceKind, OvsPort, Topology, DEFAULT_TAG, UNKNOWN_IP, UNKNOWN_NETWORK};

use log::*;

const DEVICE_PREFIXES: [&str; 4] = ["tap", "qbr", "qvb", "qvo"];

/// Strip the device prefix (`tap`, `qbr`, `qvb` or `qvo`) of an interface. The remainder is the
/// port suffix shared by all devices of the same neutron port.
pub fn strip_interface(interface: &str) -> &str {
    DEVICE_PREFIXES
        .iter()
        .find_map(|prefix| interface.strip_prefix(prefix))
        .unwrap_or(interface)
}

impl Topology {
    /// Return the first three octets of an IPv4 address, like `10.0.2` for `10.0.2.17`.
    pub fn subnet_of(ip: &str) -> String {
        ip.split('.').take(3).collect::<Vec<_>>().join(".")
    }

    /// Returns true if the VM is connected to a public network with the given IP. An unknown IP
    /// is reported as an error, and considered not public.
    pub fn is_public(&self, ip: &str, vm: &str) -> bool {
        match self.vms.get(vm).and_then(|v| v.interfaces.get(ip)) {
            Some(interface) => interface.network.contains("public"),
            None => {
                error!("Cannot find interface {} of VM {}", ip, vm);
                false
            }
        }
    }

    /// Return the name of the router owning the namespace. The first router whose id is a
    /// substring of the namespace name is returned.
    pub fn router_for_namespace(&self, namespace: &str) -> Option<&str> {
        self.routers
            .iter()
            .find(|(_, router)| !router.id.is_empty() && namespace.contains(router.id.as_str()))
            .map(|(name, _)| name.as_str())
    }

    /// Return the name of the namespace of the router
    pub fn router_namespace(&self, router: &str) -> Option<String> {
        self.routers
            .get(router)
            .map(|r| format!("{}{}", NamespaceKind::ROUTER_PREFIX, r.id))
    }

    /// Return the namespace which contains the given interface.
    pub fn namespace_for_interface(&self, interface: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(_, nms)| nms.interfaces.contains_key(interface))
            .map(|(name, _)| name.as_str())
    }

    /// Return the IP of a tap, qbr, qvb or qvo device, or `x.x.x.x` if it is not known.
    pub fn interface_ip(&self, interface: &str) -> &str {
        self.tap_to_ip
            .get(strip_interface(interface))
            .map(|ip| ip.as_str())
            .unwrap_or(UNKNOWN_IP)
    }

    /// Return the port suffix of the device which has the given IP.
    pub fn ip_to_interface(&self, ip: &str) -> Option<&str> {
        self.tap_to_ip.iter().find(|(_, x)| x.as_str() == ip).map(|(tap, _)| tap.as_str())
    }

    /// Return the name of the VM which has an interface with the given IP.
    pub fn vm_for_ip(&self, ip: &str) -> Option<&str> {
        self.vms
            .iter()
            .find(|(_, vm)| vm.interfaces.contains_key(ip))
            .map(|(name, _)| name.as_str())
    }

    /// Return the name of the network the VM is connected to with the given IP, or `unknown`.
    pub fn ip_network(&self, vm: &str, ip: &str) -> &str {
        self.vms
            .get(vm)
            .and_then(|v| v.interfaces.get(ip))
            .map(|i| i.network.as_str())
            .unwrap_or(UNKNOWN_NETWORK)
    }

    /// Return the VLAN tag of the br-int port which belongs to the given device. The lookup
    /// always succeeds, and returns `"0"` if the port does not exist or is not tagged.
    pub fn vlan_tag(&self, interface: &str) -> String {
        let qvo = format!("qvo{}", strip_interface(interface));
        self.bridges
            .br_int
            .ports
            .get(&qvo)
            .and_then(|port| port.tag.clone())
            .unwrap_or_else(|| DEFAULT_TAG.to_string())
    }

    /// Return the br-int port (the qvo device) of the neutron port with the given IP.
    pub fn qvo_port(&self, ip: &str) -> Option<(String, &OvsPort)> {
        let qvo = format!("qvo{}", self.ip_to_interface(ip)?);
        let port = self.bridges.br_int.ports.get(&qvo)?;
        Some((qvo, port))
    }

    /// Return the OpenFlow port id and VLAN tag of the br-int port with the given IP.
    pub fn port_ovs_id_tag(&self, ip: &str) -> Option<(Option<&str>, Option<&str>)> {
        self.qvo_port(ip).map(|(_, port)| (port.id.as_deref(), port.tag.as_deref()))
    }

    /// Return the id of the network whose subnet shares the first three octets with the IP.
    pub fn network_for_ip(&self, ip: &str) -> Option<&str> {
        let prefix = format!("{}.", Self::subnet_of(ip));
        self.networks
            .iter()
            .find(|(_, net)| net.ip.starts_with(&prefix))
            .map(|(id, _)| id.as_str())
    }

    /// Return the name of the network whose subnet shares the first three octets with the IP.
    pub fn network_name_for_ip(&self, ip: &str) -> &str {
        self.network_for_ip(ip)
            .and_then(|id| self.networks.get(id))
            .map(|net| net.name.as_str())
            .unwrap_or(UNKNOWN_NETWORK)
    }

    /// Return all router namespaces which have an interface in the subnet of the VM. Only the
    /// first IP of the VM is considered.
    pub fn vm_router_namespaces(&self, vm: &str) -> Vec<String> {
        let ip = match self.vms.get(vm).and_then(|v| v.interfaces.keys().next()) {
            Some(ip) => ip,
            None => return Vec::new(),
        };
        let prefix = format!("{}.", Self::subnet_of(ip));
        self.namespaces
            .iter()
            .filter(|(name, _)| NamespaceKind::of(name) == NamespaceKind::Router)
            .filter(|(_, nms)| nms.interfaces.values().any(|ip| ip.starts_with(&prefix)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}
