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

//! # Diagram Generator
//!
//! Generates the Graphviz DOT description of the compute node, the network node, or both combined.
//! Each component (VMs, Linux bridges, OVS bridges) is drawn as an HTML table, and the cells are
//! connected by edges. If a [`PathVerdict`] is given, the diagram highlights the ports on which
//! packets were (or were not) captured, and all other elements are drawn in a neutral color.

use crate::topology::{NamespaceKind, OvsPort, Topology, DEFAULT_TAG, UNKNOWN_IP, UNKNOWN_NETWORK};
use crate::verdict::PathVerdict;

use log::*;
use rand::prelude::*;
use std::fmt::{self, Write};

const VMS: &str = "#ff9933";
const TUN: &str = "#ffcc00";
const INT: &str = "#ffcc00";
const ROUTERS: &str = "#ff9933";
const ERROR: &str = "#f00000";
const EDGE: &str = "#0066cc";
const DONTCARE: &str = "#909090";
const PASS: &str = "#b2f379";
const FAIL: &str = "#f00000";
const EDGE_PASS: &str = "#009900";
const FLOATING_IP: &str = "#b3ffb3";

/// Number of distinct VLAN colors
pub const VLAN_COLORS: usize = 20;

const PATCH_TUN: &str = "patch-tun";
const PATCH_INT: &str = "patch-int";

/// Generates DOT descriptions of a topology
#[derive(Debug, Clone)]
pub struct DotGenerator<'a> {
    topo: &'a Topology,
    highlight: Option<&'a PathVerdict>,
    vlan_colors: Vec<String>,
}

/// Router and DHCP port of a network, as shown on the br-int of the network node
struct RouterPort<'a> {
    qr_intf: &'a str,
    qr_ip: &'a str,
    tap: Option<(&'a str, &'a str)>,
}

impl<'a> DotGenerator<'a> {
    /// Create a new generator for the topology
    pub fn new(topo: &'a Topology) -> Self {
        Self { topo, highlight: None, vlan_colors: vlan_palette() }
    }

    /// Highlight the result of a path trace
    pub fn with_highlight(mut self, verdict: &'a PathVerdict) -> Self {
        self.highlight = Some(verdict);
        self
    }

    /// DOT description of the compute node
    pub fn compute_dot(&self) -> String {
        self.render("compute", |g, out| g.compute_node(out))
    }

    /// DOT description of the network node
    pub fn network_dot(&self) -> String {
        self.render("network", |g, out| g.network_node(out))
    }

    /// DOT description of both nodes
    pub fn combined_dot(&self) -> String {
        self.render("DON", |g, out| {
            cluster_open_plain(out, "DONComputeNode")?;
            g.compute_node(out)?;
            cluster_close_plain(out)?;
            cluster_open_plain(out, "DONNetworkNode")?;
            g.network_node(out)?;
            cluster_close_plain(out)
        })
    }

    fn render(&self, tag: &str, body: impl Fn(&Self, &mut String) -> fmt::Result) -> String {
        let mut out = String::new();
        let result = digraph_open(&mut out, tag)
            .and_then(|_| body(self, &mut out))
            .and_then(|_| digraph_close(&mut out));
        if let Err(e) = result {
            error!("Cannot generate the {} diagram: {}", tag, e);
        }
        out
    }

    fn compute_node(&self, out: &mut String) -> fmt::Result {
        cluster_open(out, "ComputeNode", "red")?;
        cluster_name(out, "Compute Node", 1, "yellow")?;
        cluster_close(out)?;

        cluster_open_plain(out, "Nova")?;
        self.vms(out)?;
        self.linux_bridge(out)?;
        cluster_close_plain(out)?;

        cluster_open_plain(out, "OVS")?;
        self.br_int_compute(out)?;
        self.br_tun(out, "compute")?;
        cluster_close_plain(out)?;

        html_edge(out, "ComputeNode", "VMs", EDGE, Some("invis"))?;
        self.vms_to_linuxbridge(out)?;
        self.linuxbridge_to_br_int(out)?;
        self.br_int_to_br_tun(out, "compute")
    }

    fn network_node(&self, out: &mut String) -> fmt::Result {
        cluster_open(out, "NetworkNode", "red")?;
        cluster_name(out, "Network Node", 1, "yellow")?;
        cluster_close(out)?;

        cluster_open_plain(out, "OVS")?;
        self.br_ex_network(out)?;
        self.br_int_network(out)?;
        self.br_tun(out, "network")?;
        cluster_close_plain(out)?;

        html_edge(out, "NetworkNode", "br_ex", EDGE, Some("invis"))?;
        self.br_int_to_br_tun(out, "network")?;
        self.br_ex_to_br_int(out)
    }

    fn color(&self, color: &'static str) -> &'static str {
        if self.highlight.is_some() {
            DONTCARE
        } else {
            color
        }
    }

    /// Color of a VLAN. In highlight mode, the color depends on the port instead.
    fn vlan_color(&self, tag: &str, port: &str) -> &str {
        match self.highlight {
            Some(verdict) if verdict.port_pass(port) => PASS,
            Some(verdict) if verdict.port_fail(port) => FAIL,
            Some(_) => DONTCARE,
            None => {
                let tag = tag.parse::<usize>().unwrap_or(0);
                &self.vlan_colors[tag % self.vlan_colors.len()]
            }
        }
    }

    fn edge_color(&self, src: &str, dst: &str) -> &'static str {
        let verdict = match self.highlight {
            Some(verdict) => verdict,
            None => return EDGE,
        };
        let sport = src.split_once(':').map(|(_, p)| p).unwrap_or(src);
        let dport = dst.split_once(':').map(|(_, p)| p).unwrap_or(dst);
        if verdict.port_pass(sport) || verdict.port_pass(dport) {
            EDGE_PASS
        } else if verdict.port_fail(sport) && verdict.port_fail(dport) {
            FAIL
        } else {
            DONTCARE
        }
    }

    fn vm_port_count(&self) -> usize {
        self.topo.vms.values().map(|vm| vm.src_bridge.len()).sum()
    }

    /// All VMs in order, with their linux bridges sorted
    fn vm_bridges(&self) -> Vec<(&'a str, Vec<&'a str>)> {
        self.topo
            .vms
            .iter()
            .map(|(name, vm)| {
                let mut bridges = vm.src_bridge.iter().map(|b| b.as_str()).collect::<Vec<_>>();
                bridges.sort_unstable();
                (name.as_str(), bridges)
            })
            .collect()
    }

    /// First member of a linux bridge with the given prefix
    fn bridge_member(&self, bridge: &str, prefix: &str) -> Option<&'a str> {
        self.topo
            .brctl
            .get(bridge)?
            .interfaces
            .iter()
            .find(|dev| dev.starts_with(prefix))
            .map(|dev| dev.as_str())
    }

    fn vms(&self, out: &mut String) -> fmt::Result {
        let topo = self.topo;
        cluster_open(out, "VMs", "white")?;
        cluster_name(out, "VMs", self.vm_port_count(), "white")?;

        row_open(out)?;
        for (name, vm) in topo.vms.iter() {
            let floating = vm.uuid.as_ref().and_then(|u| topo.floating_ips.get(u));
            let col_span = vm.src_bridge.len() + floating.map(|_| 1).unwrap_or(0);
            html_row(out, name, 1, col_span, self.color(VMS), None)?;
        }
        row_close(out)?;

        // network of each port
        row_open(out)?;
        for (name, bridges) in self.vm_bridges() {
            let vm = &topo.vms[name];
            if let Some(floating) = vm.uuid.as_ref().and_then(|u| topo.floating_ips.get(u)) {
                html_row(out, &format!("Floating -{}", floating.pool), 1, 1, FLOATING_IP, None)?;
            }
            for bridge in bridges {
                let ip = topo.interface_ip(bridge);
                let network = topo.ip_network(name, ip);
                let color = if network == UNKNOWN_NETWORK {
                    self.color(ERROR)
                } else {
                    self.vlan_color(&topo.vlan_tag(bridge), "")
                };
                html_row(out, network, 1, 1, color, None)?;
            }
        }
        row_close(out)?;

        // IP of each port
        row_open(out)?;
        for (name, bridges) in self.vm_bridges() {
            let vm = &topo.vms[name];
            if let Some(floating) = vm.uuid.as_ref().and_then(|u| topo.floating_ips.get(u)) {
                let ip = &floating.floating_ip;
                html_row(out, ip, 1, 1, FLOATING_IP, Some(&ip.replace('.', "")))?;
            }
            for bridge in bridges {
                let ip = topo.interface_ip(bridge);
                let port = ip.replace('.', "");
                let color = if ip == UNKNOWN_IP {
                    self.color(ERROR)
                } else {
                    self.vlan_color(&topo.vlan_tag(bridge), &port)
                };
                html_row(out, ip, 1, 1, color, Some(&port))?;
            }
        }
        row_close(out)?;

        cluster_close(out)
    }

    fn linux_bridge(&self, out: &mut String) -> fmt::Result {
        let topo = self.topo;
        cluster_open(out, "LinuxBridge", "white")?;
        cluster_name(out, "Linux Bridge", self.vm_port_count(), "white")?;

        for prefix in ["tap", "qbr", "qvb"].iter() {
            row_open(out)?;
            for (_, bridges) in self.vm_bridges() {
                for bridge in bridges.into_iter().filter(|b| topo.brctl.contains_key(*b)) {
                    let dev = match *prefix {
                        "qbr" => Some(bridge),
                        prefix => self.bridge_member(bridge, prefix),
                    };
                    if let Some(dev) = dev {
                        let color = self.vlan_color(&topo.vlan_tag(bridge), dev);
                        html_row(out, dev, 1, 1, color, Some(dev))?;
                    }
                }
            }
            row_close(out)?;
        }

        cluster_close(out)
    }

    fn br_int_compute(&self, out: &mut String) -> fmt::Result {
        let br_int = &self.topo.bridges.br_int;
        let qvo_ports = self
            .vm_bridges()
            .into_iter()
            .flat_map(|(_, bridges)| bridges)
            .map(|bridge| bridge.replacen("qbr", "qvo", 1))
            .filter_map(|qvo| br_int.ports.get(&qvo).map(|port| (qvo, port)))
            .collect::<Vec<_>>();

        cluster_open(out, "compute_br_int", "white")?;
        cluster_name(out, "OVS br_int", self.vm_port_count(), "white")?;

        row_open(out)?;
        for (qvo, port) in qvo_ports.iter() {
            let color = self.vlan_color(port_tag(port), qvo);
            html_row(out, &port_label(qvo, port), 1, 1, color, Some(qvo))?;
        }
        row_close(out)?;

        row_open(out)?;
        for (qvo, port) in qvo_ports.iter() {
            let tag = port_tag(port);
            let cell = format!("{}tag_{}", qvo, tag);
            html_row(out, &format!("VLAN tag:{}", tag), 1, 1, self.vlan_color(tag, ""), Some(&cell))?;
        }
        row_close(out)?;

        self.patch_port(out, br_int.ports.get(PATCH_TUN), PATCH_TUN, TUN, self.vm_port_count())?;

        cluster_close(out)
    }

    fn br_tun(&self, out: &mut String, tag: &str) -> fmt::Result {
        let col_span = self.vm_port_count();
        cluster_open(out, &format!("{}_br_tun", tag), "white")?;
        cluster_name(out, "OVS br_tun", col_span, "white")?;
        let port = self.topo.bridges.br_tun.ports.get(PATCH_INT);
        self.patch_port(out, port, PATCH_INT, INT, col_span)?;
        cluster_close(out)
    }

    fn patch_port(
        &self,
        out: &mut String,
        port: Option<&OvsPort>,
        name: &str,
        color: &'static str,
        col_span: usize,
    ) -> fmt::Result {
        row_open(out)?;
        match port {
            Some(port) => html_row(out, &port_label(name, port), 1, col_span, self.color(color), Some(name))?,
            None => html_row(out, name, 1, col_span, self.color(ERROR), Some(name))?,
        }
        row_close(out)
    }

    /// Interfaces of the router namespaces of a router, starting with the given prefix
    fn router_interfaces(&self, router: &str, prefix: &str) -> Vec<(&'a str, &'a str)> {
        let topo = self.topo;
        let qrouter = match topo.routers.get(router) {
            Some(r) => format!("{}{}", NamespaceKind::ROUTER_PREFIX, r.id),
            None => return Vec::new(),
        };
        topo.namespaces
            .iter()
            .filter(|(name, _)| name.starts_with(&qrouter))
            .flat_map(|(_, ns)| ns.interfaces.iter())
            .filter(|(intf, _)| intf.starts_with(prefix))
            .map(|(intf, ip)| (intf.as_str(), ip.as_str()))
            .collect()
    }

    fn br_ex_network(&self, out: &mut String) -> fmt::Result {
        let topo = self.topo;
        let br_ex = &topo.bridges.br_ex;
        let total: usize = topo.routers.keys().map(|r| self.router_interfaces(r, "qg-").len()).sum();

        cluster_open(out, "br_ex", "white")?;
        cluster_name(out, "OVS br_ex", total, "white")?;

        row_open(out)?;
        for router in topo.routers.keys() {
            let col_span = self.router_interfaces(router, "qg-").len();
            html_row(out, router, 1, col_span, self.color(ROUTERS), Some(router))?;
        }
        row_close(out)?;

        row_open(out)?;
        for router in topo.routers.keys() {
            for (_, ip) in self.router_interfaces(router, "qg-") {
                html_row(out, ip, 1, 1, self.color(ROUTERS), Some(ip))?;
            }
        }
        row_close(out)?;

        row_open(out)?;
        for router in topo.routers.keys() {
            for (intf, _) in self.router_interfaces(router, "qg-") {
                let label = match br_ex.ports.get(intf) {
                    Some(port) => port_label(intf, port),
                    None => intf.to_string(),
                };
                html_row(out, &label, 1, 1, self.color(ROUTERS), Some(intf))?;
            }
        }
        row_close(out)?;

        cluster_close(out)
    }

    /// DHCP port serving the network of the given router port IP
    fn dhcp_port(&self, qr_ip: &str) -> Option<(&'a str, &'a str)> {
        let network = self.topo.network_for_ip(qr_ip)?;
        let qdhcp = format!("{}{}", NamespaceKind::DHCP_PREFIX, network);
        let ns = self.topo.namespaces.get(&qdhcp)?;
        ns.interfaces.iter().next().map(|(intf, ip)| (intf.as_str(), ip.as_str()))
    }

    fn br_int_network(&self, out: &mut String) -> fmt::Result {
        let topo = self.topo;
        let br_int = &topo.bridges.br_int;
        let router_ports = topo
            .routers
            .keys()
            .flat_map(|router| self.router_interfaces(router, "qr-"))
            .map(|(qr_intf, qr_ip)| RouterPort { qr_intf, qr_ip, tap: self.dhcp_port(qr_ip) })
            .collect::<Vec<_>>();
        let max_col_span = router_ports.len() * 2;
        let tag_of = |intf: &str| br_int.ports.get(intf).map(port_tag).unwrap_or(DEFAULT_TAG);

        cluster_open(out, "network_br_int", "white")?;
        cluster_name(out, "OVS br_int", max_col_span, "white")?;

        // router and dhcp ports
        row_open(out)?;
        for entry in router_ports.iter() {
            let intfs = std::iter::once(entry.qr_intf).chain(entry.tap.map(|(tap, _)| tap));
            for intf in intfs {
                let label = match br_int.ports.get(intf) {
                    Some(port) => port_label(intf, port),
                    None => intf.to_string(),
                };
                html_row(out, &label, 1, 1, self.vlan_color(tag_of(intf), intf), Some(intf))?;
            }
        }
        row_close(out)?;

        row_open(out)?;
        for entry in router_ports.iter() {
            let intfs = std::iter::once(entry.qr_intf).chain(entry.tap.map(|(tap, _)| tap));
            for intf in intfs {
                let tag = tag_of(intf);
                let cell = format!("{}tag_{}", intf, tag);
                html_row(out, &format!("VLAN tag:{}", tag), 1, 1, self.vlan_color(tag, ""), Some(&cell))?;
            }
        }
        row_close(out)?;

        row_open(out)?;
        for entry in router_ports.iter() {
            let ips = std::iter::once((entry.qr_intf, entry.qr_ip)).chain(entry.tap);
            for (intf, ip) in ips {
                let cell = format!("{}{}", intf, ip);
                html_row(out, ip, 1, 1, self.vlan_color(tag_of(intf), ""), Some(&cell))?;
            }
        }
        row_close(out)?;

        row_open(out)?;
        for entry in router_ports.iter() {
            let name = topo.network_name_for_ip(entry.qr_ip);
            let color = self.vlan_color(tag_of(entry.qr_intf), "");
            html_row(out, name, 1, 2, color, Some(name))?;
        }
        row_close(out)?;

        row_open(out)?;
        for router in topo.routers.keys() {
            let col_span = self.router_interfaces(router, "qr-").len() * 2;
            html_row(out, router, 1, col_span, self.color(ROUTERS), Some(router))?;
        }
        row_close(out)?;

        self.patch_port(out, br_int.ports.get(PATCH_TUN), PATCH_TUN, TUN, max_col_span)?;

        cluster_close(out)
    }

    fn vms_to_linuxbridge(&self, out: &mut String) -> fmt::Result {
        for (_, bridges) in self.vm_bridges() {
            for bridge in bridges {
                if let Some(tap) = self.bridge_member(bridge, "tap") {
                    let ip = self.topo.interface_ip(bridge);
                    let src = format!("VMs:{}", ip.replace('.', ""));
                    let dst = format!("LinuxBridge:{}", tap);
                    html_edge(out, &src, &dst, self.edge_color(&src, &dst), None)?;
                }
            }
        }
        Ok(())
    }

    fn linuxbridge_to_br_int(&self, out: &mut String) -> fmt::Result {
        let br_int = &self.topo.bridges.br_int;
        for (_, bridges) in self.vm_bridges() {
            for bridge in bridges {
                let qvo = bridge.replacen("qbr", "qvo", 1);
                if let Some(qvb) = self.bridge_member(bridge, "qvb") {
                    if br_int.ports.contains_key(&qvo) {
                        let src = format!("LinuxBridge:{}", qvb);
                        let dst = format!("compute_br_int:{}", qvo);
                        html_edge(out, &src, &dst, self.edge_color(&src, &dst), None)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The patch ports are only connected if both point to each other.
    fn br_int_to_br_tun(&self, out: &mut String, tag: &str) -> fmt::Result {
        let peer = |port: Option<&OvsPort>, name: &str| {
            port.and_then(|p| p.interfaces.get(name)).and_then(|i| i.options.clone())
        };
        let tun_peer = peer(self.topo.bridges.br_int.ports.get(PATCH_TUN), PATCH_TUN);
        let int_peer = peer(self.topo.bridges.br_tun.ports.get(PATCH_INT), PATCH_INT);
        if let (Some(tun_peer), Some(int_peer)) = (tun_peer, int_peer) {
            if tun_peer.contains(&format!("peer={}", PATCH_INT))
                && int_peer.contains(&format!("peer={}", PATCH_TUN))
            {
                let src = format!("{}_br_int:{}", tag, PATCH_TUN);
                let dst = format!("{}_br_tun:{}", tag, PATCH_INT);
                html_edge(out, &src, &dst, self.color(EDGE), None)?;
            }
        }
        Ok(())
    }

    fn br_ex_to_br_int(&self, out: &mut String) -> fmt::Result {
        let routers = self
            .topo
            .namespaces
            .iter()
            .filter(|(name, _)| NamespaceKind::of(name) == NamespaceKind::Router);
        for (name, ns) in routers {
            let qg = match ns.interfaces.keys().find(|intf| intf.starts_with("qg-")) {
                Some(qg) => qg,
                None => {
                    warn!("Namespace {} has no external gateway interface", name);
                    continue;
                }
            };
            for qr in ns.interfaces.keys().filter(|intf| intf.starts_with("qr-")) {
                let src = format!("br_ex:{}", qg);
                let dst = format!("network_br_int:{}", qr);
                html_edge(out, &src, &dst, self.color(EDGE), None)?;
            }
        }
        Ok(())
    }
}

fn port_tag(port: &OvsPort) -> &str {
    port.tag.as_deref().unwrap_or(DEFAULT_TAG)
}

/// Label of an OVS port, prefixed with its OpenFlow port number
fn port_label(name: &str, port: &OvsPort) -> String {
    format!("[{}] {}", port.id.as_deref().unwrap_or("?"), name)
}

/// Generate the VLAN color table from a seeded random sequence of hues.
fn vlan_palette() -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(1);
    (0..VLAN_COLORS)
        .map(|_| {
            let [r, g, b] = hsv_to_rgb(rng.gen::<f64>(), 0.5, 0.95);
            format!("#{:02x}{:02x}{:02x}", r, g, b)
        })
        .collect()
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [u8; 3] {
    let h_i = (h * 6.0) as u32;
    let f = h * 6.0 - h_i as f64;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match h_i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let scale = |x: f64| (x * 256.0).min(255.0) as u8;
    [scale(r), scale(g), scale(b)]
}

fn digraph_open(out: &mut String, tag: &str) -> fmt::Result {
    writeln!(out, "digraph DON_{} {{", tag)?;
    writeln!(out, "graph [fontsize=10 fontname=\"Helvetica\"];")?;
    writeln!(out, "node [fontsize=10 fontname=\"Helvetica\"];")?;
    writeln!(out, "rankdir = TB;")?;
    writeln!(out, "ranksep = 1;")?;
    writeln!(out, "concentrate = true;")?;
    writeln!(out, "compound = true;")?;
    writeln!(out, "edge [dir=none]")
}

fn digraph_close(out: &mut String) -> fmt::Result {
    writeln!(out, "\n}}")
}

fn cluster_open_plain(out: &mut String, tag: &str) -> fmt::Result {
    writeln!(out, "subgraph cluster_{} {{", tag)?;
    writeln!(out, "style=filled")
}

fn cluster_close_plain(out: &mut String) -> fmt::Result {
    writeln!(out, "}}\n")
}

fn cluster_open(out: &mut String, tag: &str, color: &str) -> fmt::Result {
    writeln!(out, "subgraph cluster_{} {{", tag)?;
    writeln!(out, "{} [ shape = plaintext, label = <", tag)?;
    writeln!(
        out,
        "<TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"5\" CELLPADDING=\"5\" BGCOLOR=\"{}\">",
        color
    )
}

fn cluster_close(out: &mut String) -> fmt::Result {
    writeln!(out, "</TABLE>>];\n")?;
    writeln!(out, "}}\n")
}

fn cluster_name(out: &mut String, tag: &str, col_span: usize, color: &str) -> fmt::Result {
    let port = tag.replace(' ', "").replace('-', "_");
    row_open(out)?;
    writeln!(
        out,
        "<TD COLSPAN=\"{}\" BORDER=\"0\" BGCOLOR=\"{}\" PORT=\"{}\">{}</TD>",
        col_span, color, port, tag
    )?;
    row_close(out)
}

fn row_open(out: &mut String) -> fmt::Result {
    writeln!(out, "<TR>")
}

fn row_close(out: &mut String) -> fmt::Result {
    writeln!(out, "</TR>")
}

/// Port names in DOT must not contain dashes, they are replaced by underscores.
fn html_row(
    out: &mut String,
    name: &str,
    row_span: usize,
    col_span: usize,
    color: &str,
    port: Option<&str>,
) -> fmt::Result {
    match port {
        Some(port) => writeln!(
            out,
            "<TD ROWSPAN=\"{}\" COLSPAN=\"{}\" BGCOLOR=\"{}\" PORT=\"{}\">{}</TD>",
            row_span,
            col_span,
            color,
            port.replace('-', "_"),
            name
        ),
        None => writeln!(
            out,
            "<TD ROWSPAN=\"{}\" COLSPAN=\"{}\" BGCOLOR=\"{}\">{}</TD>",
            row_span, col_span, color, name
        ),
    }
}

fn html_edge(
    out: &mut String,
    src: &str,
    dst: &str,
    color: &str,
    style: Option<&str>,
) -> fmt::Result {
    let src = src.replace('-', "_");
    let dst = dst.replace('-', "_");
    match style {
        Some(style) => writeln!(
            out,
            "{}:s -> {}:n [color = \"{}\", penwidth = \"4\", style=\"{}\"]",
            src, dst, color, style
        ),
        None => writeln!(out, "{}:s -> {}:n [color = \"{}\", penwidth = \"4\"]", src, dst, color),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::{FloatingIp, Namespace, Network, OvsInterface, Router};
    use crate::verdict::{EndpointInfo, PortRole};
    use maplit::btreemap;

    fn topo() -> Topology {
        let mut topo = Topology::new();
        let vm = topo.vm_entry("vm1");
        vm.uuid = Some("uuid-1".to_string());
        vm.interfaces.insert("10.0.2.3".to_string(), Default::default());
        vm.interfaces.get_mut("10.0.2.3").unwrap().network = "private".to_string();
        vm.attach_bridge("qbr6ce314cb-a5");
        topo.floating_ips.insert(
            "uuid-1".to_string(),
            FloatingIp { floating_ip: "172.24.4.3".to_string(), pool: "public".to_string() },
        );
        topo.tap_to_ip.insert("6ce314cb-a5".to_string(), "10.0.2.3".to_string());
        topo.record_linuxbridge(
            "qbr6ce314cb-a5",
            vec!["qvb6ce314cb-a5".to_string(), "tap6ce314cb-a5".to_string()],
        );
        topo.bridges.br_int.ports = btreemap! {
            "qvo6ce314cb-a5".to_string() => OvsPort {
                id: Some("2".to_string()),
                tag: Some("1".to_string()),
                ..Default::default()
            },
            "qr-11111111-11".to_string() => OvsPort {
                id: Some("3".to_string()),
                tag: Some("1".to_string()),
                ..Default::default()
            },
            "tap22222222-22".to_string() => OvsPort {
                id: Some("4".to_string()),
                tag: Some("1".to_string()),
                ..Default::default()
            },
            "patch-tun".to_string() => OvsPort {
                id: Some("1".to_string()),
                interfaces: btreemap! {"patch-tun".to_string() => OvsInterface {
                    kind: Some("patch".to_string()),
                    options: Some("peer=patch-int".to_string()),
                }},
                ..Default::default()
            },
        };
        topo.bridges.br_tun.ports.insert(
            "patch-int".to_string(),
            OvsPort {
                id: Some("1".to_string()),
                interfaces: btreemap! {"patch-int".to_string() => OvsInterface {
                    kind: Some("patch".to_string()),
                    options: Some("peer=patch-tun".to_string()),
                }},
                ..Default::default()
            },
        );
        topo.bridges.br_ex.ports.insert(
            "qg-33333333-33".to_string(),
            OvsPort { id: Some("5".to_string()), ..Default::default() },
        );
        topo.routers.insert(
            "router1".to_string(),
            Router { id: "aa".to_string(), ..Default::default() },
        );
        topo.networks.insert(
            "net1".to_string(),
            Network { name: "private".to_string(), ip: "10.0.2.0".to_string() },
        );
        topo.namespaces = btreemap! {
            "qrouter-aa".to_string() => Namespace { interfaces: btreemap! {
                "qr-11111111-11".to_string() => "10.0.2.1".to_string(),
                "qg-33333333-33".to_string() => "172.24.4.2".to_string(),
            }},
            "qdhcp-net1".to_string() => Namespace { interfaces: btreemap! {
                "tap22222222-22".to_string() => "10.0.2.2".to_string(),
            }},
        };
        topo
    }

    #[test]
    fn palette() {
        let colors = vlan_palette();
        assert_eq!(colors.len(), VLAN_COLORS);
        assert_eq!(colors, vlan_palette());
        assert!(colors.iter().all(|c| c.len() == 7 && c.starts_with('#')));
        assert_eq!(hsv_to_rgb(0.0, 0.5, 0.95), [243, 121, 121]);
    }

    #[test]
    fn compute_node() {
        let topo = topo();
        let gen = DotGenerator::new(&topo);
        let dot = gen.compute_dot();
        assert!(dot.starts_with("digraph DON_compute {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains(">vm1</TD>"));
        assert!(dot.contains("COLSPAN=\"2\" BGCOLOR=\"#ff9933\">vm1</TD>"));
        assert!(dot.contains(">Floating -public</TD>"));
        assert!(dot.contains("PORT=\"qvo6ce314cb_a5\">[2] qvo6ce314cb-a5</TD>"));
        assert!(dot.contains("VMs:10023:s -> LinuxBridge:tap6ce314cb_a5:n [color = \"#0066cc\""));
        assert!(dot.contains("LinuxBridge:qvb6ce314cb_a5:s -> compute_br_int:qvo6ce314cb_a5:n"));
        assert!(dot.contains("compute_br_int:patch_tun:s -> compute_br_tun:patch_int:n"));
        assert!(dot.contains(&format!("BGCOLOR=\"{}\">private</TD>", gen.vlan_colors[1])));
    }

    #[test]
    fn network_node() {
        let topo = topo();
        let dot = DotGenerator::new(&topo).network_dot();
        assert!(dot.starts_with("digraph DON_network {"));
        assert!(dot.contains("PORT=\"router1\">router1</TD>"));
        assert!(dot.contains("[5] qg-33333333-33"));
        assert!(dot.contains("[3] qr-11111111-11"));
        assert!(dot.contains("[4] tap22222222-22"));
        assert!(dot.contains("COLSPAN=\"2\""));
        assert!(dot.contains("br_ex:qg_33333333_33:s -> network_br_int:qr_11111111_11:n"));
    }

    #[test]
    fn highlight() {
        let topo = topo();
        let mut src_info = EndpointInfo::resolve(&topo, "10.0.2.3").unwrap();
        src_info.record_capture(PortRole::Tap, Some(10));
        src_info.record_capture(PortRole::Qvo, None);
        let verdict = PathVerdict {
            src: "10.0.2.3".to_string(),
            dst: "10.0.2.4".to_string(),
            src_info,
            ping_pass: true,
            ..Default::default()
        };
        let dot = DotGenerator::new(&topo).with_highlight(&verdict).combined_dot();
        assert!(dot.starts_with("digraph DON_DON {"));
        assert!(dot.contains("subgraph cluster_DONComputeNode {"));
        assert!(dot.contains("subgraph cluster_DONNetworkNode {"));
        assert!(dot.contains("VMs:10023:s -> LinuxBridge:tap6ce314cb_a5:n [color = \"#009900\""));
        assert!(dot.contains("BGCOLOR=\"#b2f379\" PORT=\"tap6ce314cb_a5\""));
        assert!(dot.contains("BGCOLOR=\"#f00000\" PORT=\"qvo6ce314cb_a5\""));
        assert!(dot.contains("BGCOLOR=\"#909090\">vm1</TD>"));
    }
}
