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

//! # Topology Model
//!
//! The [`Topology`] is the snapshot of one collection run. It is built by the parsers, written
//! to a single JSON document at the end of the collection, and loaded fresh by every tool that
//! analyzes it. All entities are keyed by their string identifiers. The lookup helpers are
//! implemented in [`query`](self) as linear scans over the snapshot.

mod query;

pub use query::strip_interface;

use crate::Result;

use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Sentinel used when the IP of an interface is not known.
pub const UNKNOWN_IP: &str = "x.x.x.x";
/// Sentinel used when the network of an IP is not known.
pub const UNKNOWN_NETWORK: &str = "unknown";
/// VLAN tag reported for interfaces without a tagged port on br-int.
pub const DEFAULT_TAG: &str = "0";

/// # Topology
///
/// Snapshot of the virtual network of an OpenStack deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Topology {
    /// All VMs, keyed by their name
    #[serde(default)]
    pub vms: BTreeMap<String, Vm>,
    /// All Linux bridges, keyed by their name
    #[serde(default)]
    pub brctl: BTreeMap<String, LinuxBridge>,
    /// The three OVS bridges
    #[serde(default)]
    pub bridges: OvsBridges,
    /// All network namespaces, keyed by their name
    #[serde(default)]
    pub namespaces: BTreeMap<String, Namespace>,
    /// All routers, keyed by their name
    #[serde(default)]
    pub routers: BTreeMap<String, Router>,
    /// All networks, keyed by their id
    #[serde(default)]
    pub networks: BTreeMap<String, Network>,
    /// Floating IPs, keyed by the uuid of the VM they are assigned to
    #[serde(default)]
    pub floating_ips: BTreeMap<String, FloatingIp>,
    /// Port suffix (shared by the tap, qbr, qvb and qvo devices) to IP address
    #[serde(default)]
    pub tap_to_ip: BTreeMap<String, String>,
    /// Information about the collection run which produced this snapshot
    #[serde(default)]
    pub collection: CollectionStatus,
}

/// Virtual machine, as reported by nova and libvirt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vm {
    /// UUID of the instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// IP address to the network it is connected to
    #[serde(default)]
    pub interfaces: BTreeMap<String, VmInterface>,
    /// Linux bridges the VM is attached to, in the order of the libvirt definition
    #[serde(default)]
    pub src_bridge: Vec<String>,
    /// Tap devices of the VM, index-aligned with `src_bridge`
    #[serde(default)]
    pub tap_dev: Vec<String>,
    /// Router namespaces through which the VM may be reached
    #[serde(default)]
    pub qrouter: Vec<String>,
}

impl Vm {
    /// Attach the VM to a linux bridge. The tap device is derived from the bridge name, which
    /// keeps `src_bridge` and `tap_dev` aligned.
    pub fn attach_bridge(&mut self, bridge: impl Into<String>) {
        let bridge = bridge.into();
        self.tap_dev.push(bridge.replace("qbr", "tap"));
        self.src_bridge.push(bridge);
    }
}

/// Network of a VM interface
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VmInterface {
    /// Name of the network
    pub network: String,
}

/// Linux bridge
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinuxBridge {
    /// Member interfaces of the bridge
    pub interfaces: Vec<String>,
}

/// The three OVS bridges. The set is closed, there is no way to add another one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OvsBridges {
    /// External bridge
    #[serde(rename = "br-ex", default)]
    pub br_ex: OvsBridge,
    /// Integration bridge
    #[serde(rename = "br-int", default)]
    pub br_int: OvsBridge,
    /// Tunnel bridge
    #[serde(rename = "br-tun", default)]
    pub br_tun: OvsBridge,
}

/// Identifies one of the three OVS bridges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OvsBridgeKind {
    /// `br-ex`
    External,
    /// `br-int`
    Integration,
    /// `br-tun`
    Tunnel,
}

impl OvsBridgeKind {
    /// All bridges, in the order in which they are collected
    pub const ALL: [OvsBridgeKind; 3] =
        [OvsBridgeKind::External, OvsBridgeKind::Integration, OvsBridgeKind::Tunnel];

    /// Name of the bridge as used by OVS
    pub fn name(&self) -> &'static str {
        match self {
            Self::External => "br-ex",
            Self::Integration => "br-int",
            Self::Tunnel => "br-tun",
        }
    }

    /// Parse the name of the bridge. Returns `None` for all bridges except the three known ones.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "br-ex" => Some(Self::External),
            "br-int" => Some(Self::Integration),
            "br-tun" => Some(Self::Tunnel),
            _ => None,
        }
    }
}

impl fmt::Display for OvsBridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// OVS bridge with all its ports
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OvsBridge {
    /// Fail mode of the bridge (`secure` or `standalone`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_mode: Option<String>,
    /// Ports, keyed by their name
    #[serde(default)]
    pub ports: BTreeMap<String, OvsPort>,
}

/// OVS port
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OvsPort {
    /// OpenFlow port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// MAC address of the port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// VLAN tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Interfaces of the port, keyed by their name
    #[serde(default)]
    pub interfaces: BTreeMap<String, OvsInterface>,
}

/// OVS interface
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OvsInterface {
    /// Interface type, like `patch`, `internal` or `vxlan`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Raw options of the interface, like `peer=patch-int`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

/// Network namespace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Namespace {
    /// Interface name to its IP address (without the prefix length)
    #[serde(default)]
    pub interfaces: BTreeMap<String, String>,
}

/// Owner of a namespace, derived from the prefix of its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// `qrouter-<router id>`
    Router,
    /// `qdhcp-<network id>`
    Dhcp,
    /// Anything else
    Other,
}

impl NamespaceKind {
    /// Prefix for router namespaces
    pub const ROUTER_PREFIX: &'static str = "qrouter-";
    /// Prefix for DHCP namespaces
    pub const DHCP_PREFIX: &'static str = "qdhcp-";

    /// Classify a namespace by its name
    pub fn of(namespace: &str) -> Self {
        if namespace.starts_with(Self::ROUTER_PREFIX) {
            Self::Router
        } else if namespace.starts_with(Self::DHCP_PREFIX) {
            Self::Dhcp
        } else {
            Self::Other
        }
    }
}

/// Neutron router
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Router {
    /// UUID of the router
    pub id: String,
    /// IP address of the external gateway
    pub ip_address: String,
    /// Network id of the external gateway
    pub network_id: String,
}

/// Neutron network
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Network {
    /// Name of the network
    pub name: String,
    /// Subnet of the network, like `10.0.2.0/24`
    pub ip: String,
}

/// Floating IP assignment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FloatingIp {
    /// The public address
    pub floating_ip: String,
    /// Pool (network name) the address is taken from
    pub pool: String,
}

/// Result of the collection run that built the snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectionStatus {
    /// Number of iterations the collector needed
    pub iterations: usize,
    /// Whether all parsers were executed before the iteration cap was hit
    pub converged: bool,
    /// Error which aborted the collection, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write the snapshot as a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Get the VM with the given name, creating an empty one if it does not exist yet.
    pub fn vm_entry(&mut self, name: &str) -> &mut Vm {
        self.vms.entry(name.to_string()).or_default()
    }

    /// Record a linux bridge with its interfaces. A bridge which was already recorded is
    /// overwritten, which indicates stale data in the output.
    pub fn record_linuxbridge(&mut self, name: &str, interfaces: Vec<String>) {
        if self.brctl.contains_key(name) {
            error!("Bridge {} repeated! Overwriting!", name);
        }
        self.brctl.insert(name.to_string(), LinuxBridge { interfaces });
    }

    /// Get the entry of an OVS bridge by its name. Only `br-ex`, `br-int` and `br-tun` exist, any
    /// other name returns `None`.
    pub fn get_bridge_entry(&mut self, name: &str) -> Option<&mut OvsBridge> {
        match OvsBridgeKind::from_name(name) {
            Some(kind) => Some(self.bridge_mut(kind)),
            None => {
                error!("Bridge {} is not supported", name);
                None
            }
        }
    }

    /// Get the OVS bridge
    pub fn bridge(&self, kind: OvsBridgeKind) -> &OvsBridge {
        match kind {
            OvsBridgeKind::External => &self.bridges.br_ex,
            OvsBridgeKind::Integration => &self.bridges.br_int,
            OvsBridgeKind::Tunnel => &self.bridges.br_tun,
        }
    }

    /// Get the OVS bridge mutably
    pub fn bridge_mut(&mut self, kind: OvsBridgeKind) -> &mut OvsBridge {
        match kind {
            OvsBridgeKind::External => &mut self.bridges.br_ex,
            OvsBridgeKind::Integration => &mut self.bridges.br_int,
            OvsBridgeKind::Tunnel => &mut self.bridges.br_tun,
        }
    }

    /// Compute the candidate router namespaces of every VM.
    pub fn resolve_vm_routers(&mut self) {
        let resolved = self
            .vms
            .keys()
            .map(|vm| (vm.clone(), self.vm_router_namespaces(vm)))
            .collect::<Vec<_>>();
        for (vm, qrouter) in resolved {
            debug!("VM {} can be reached via {:?}", vm, qrouter);
            if let Some(entry) = self.vms.get_mut(&vm) {
                entry.qrouter = qrouter;
            }
        }
    }
}
