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

//! # Path Verdict
//!
//! Result of a path trace between two IP endpoints. The verdict records, for both endpoints, the
//! ports along the VM's attachment to br-int and how many packets were captured on each of them.
//! For endpoints on different segments, the router hops in between are recorded as well.

use crate::topology::{NamespaceKind, Topology};
use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Position of a port on the attachment of a VM to br-int
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortRole {
    /// tap device of the VM
    Tap,
    /// Linux bridge (`qbr`)
    Brctl,
    /// veth end on the Linux bridge
    Qvb,
    /// veth end on br-int
    Qvo,
}

impl PortRole {
    /// All roles, from the VM towards br-int
    pub const ALL: [PortRole; 4] = [PortRole::Tap, PortRole::Brctl, PortRole::Qvb, PortRole::Qvo];

    /// Prefix of the interface name
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::Brctl => "qbr",
            Self::Qvb => "qvb",
            Self::Qvo => "qvo",
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tap => write!(f, "tap"),
            Self::Brctl => write!(f, "brctl"),
            Self::Qvb => write!(f, "qvb"),
            Self::Qvo => write!(f, "qvo"),
        }
    }
}

/// Ports and captures of one endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// IP address of the endpoint
    pub ip: String,
    /// Interface name for each role
    pub ports: BTreeMap<PortRole, String>,
    /// Tag of the qvo port on br-int
    pub tag: String,
    /// Number of captured packets for each role
    #[serde(default)]
    pub counts: BTreeMap<PortRole, u32>,
    /// Interfaces on which packets were captured
    #[serde(default)]
    pub pass: Vec<String>,
    /// Interfaces on which nothing was captured
    #[serde(default)]
    pub fail: Vec<String>,
}

impl EndpointInfo {
    /// Resolve an IP address to its ports, using the tap mapping of the neutron port list.
    pub fn resolve(topo: &Topology, ip: &str) -> Result<Self> {
        let suffix = topo
            .tap_to_ip
            .iter()
            .find(|(_, tap_ip)| tap_ip.as_str() == ip)
            .map(|(suffix, _)| suffix)
            .ok_or_else(|| Error::EndpointNotFound(ip.to_string()))?;
        let ports = PortRole::ALL
            .iter()
            .map(|role| (*role, format!("{}{}", role.prefix(), suffix)))
            .collect::<BTreeMap<_, _>>();
        let tag = topo.vlan_tag(&ports[&PortRole::Qvo]);
        Ok(Self { ip: ip.to_string(), ports, tag, ..Default::default() })
    }

    /// Record the result of the capture on the port of the given role. `None` means that the
    /// capture did not report anything.
    pub fn record_capture(&mut self, role: PortRole, captured: Option<u32>) {
        let intf = match self.ports.get(&role) {
            Some(intf) => intf.clone(),
            None => return,
        };
        self.counts.insert(role, captured.unwrap_or(0));
        match captured {
            Some(_) => self.pass.push(intf),
            None => self.fail.push(intf),
        }
    }
}

/// A router hop on the path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    /// Interface of the hop
    pub dev: String,
    /// Namespace in which the interface lives
    pub nms: String,
}

impl Hop {
    /// Returns true if the hop is inside a router namespace
    pub fn in_router(&self) -> bool {
        NamespaceKind::of(&self.nms) == NamespaceKind::Router
    }
}

/// Captures on the router hops between two segments
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HopCaptures {
    /// Hops in order
    pub hops: Vec<Hop>,
    /// Number of captured packets for each interface
    #[serde(default)]
    pub counts: BTreeMap<String, u32>,
    /// Interfaces on which packets were captured
    #[serde(default)]
    pub pass: Vec<String>,
    /// Interfaces on which nothing was captured
    #[serde(default)]
    pub fail: Vec<String>,
}

impl HopCaptures {
    /// Create the capture record for the given hops
    pub fn new(hops: Vec<Hop>) -> Self {
        Self { hops, ..Default::default() }
    }

    /// Record the result of the capture on an interface
    pub fn record_capture(&mut self, dev: &str, captured: Option<u32>) {
        self.counts.insert(dev.to_string(), captured.unwrap_or(0));
        match captured {
            Some(_) => self.pass.push(dev.to_string()),
            None => self.fail.push(dev.to_string()),
        }
    }
}

/// Result of a path trace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathVerdict {
    /// Source IP
    pub src: String,
    /// Destination IP
    pub dst: String,
    /// Source endpoint
    pub src_info: EndpointInfo,
    /// Destination endpoint
    pub dst_info: EndpointInfo,
    /// Router hops, only present for endpoints on different segments
    #[serde(default)]
    pub net_info: Option<HopCaptures>,
    /// Result of the ping between the endpoints
    pub ping_pass: bool,
    /// Reason of the failure, empty if the trace was performed
    #[serde(default)]
    pub error: String,
}

impl PathVerdict {
    /// Create a failed verdict, where no capture was performed
    pub fn failed(
        src_info: EndpointInfo,
        dst_info: EndpointInfo,
        error: impl Into<String>,
    ) -> Self {
        Self {
            src: src_info.ip.clone(),
            dst: dst_info.ip.clone(),
            src_info,
            dst_info,
            net_info: None,
            ping_pass: false,
            error: error.into(),
        }
    }

    /// Returns true if the interface is an endpoint, or some packets were captured on it
    pub fn port_pass(&self, port: &str) -> bool {
        if self.is_endpoint(port) {
            return self.ping_pass;
        }
        self.src_info.pass.iter().any(|p| p == port)
            || self.dst_info.pass.iter().any(|p| p == port)
            || self.net_info.iter().any(|n| n.pass.iter().any(|p| p == port))
    }

    /// Returns true if the interface is an endpoint of a failed ping, or nothing was captured on it
    pub fn port_fail(&self, port: &str) -> bool {
        if self.is_endpoint(port) {
            return !self.ping_pass;
        }
        self.src_info.fail.iter().any(|p| p == port)
            || self.dst_info.fail.iter().any(|p| p == port)
            || self.net_info.iter().any(|n| n.fail.iter().any(|p| p == port))
    }

    /// IPs are compared without the dots, since they are used as node names in this form.
    fn is_endpoint(&self, port: &str) -> bool {
        let port = port.replace('.', "");
        port == self.src_info.ip.replace('.', "") || port == self.dst_info.ip.replace('.', "")
    }

    /// Write the verdict as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a verdict from JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
