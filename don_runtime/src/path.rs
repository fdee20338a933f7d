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

//! # Path tracing
//!
//! Traces the path of ICMP packets between two VMs. A ping is started from inside the router
//! namespace, while `tcpdump` listens on every device along the path (tap, Linux bridge, veth pair
//! into br-int, and the router interfaces if the VMs are on different segments). The verdict
//! records on which devices the packets were seen.

use crate::capture::{capture_file, parse_captured, tcpdump_command};
use crate::probe::{ProbeInvocation, ProbeReport};
use crate::process::{ProcessGroup, ProcessHost};

use don::credentials::LoginInfo;
use don::verdict::{EndpointInfo, Hop, HopCaptures, PathVerdict, PortRole};
use don::{Error, Result, Topology};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of ping packets
pub const DEFAULT_COUNT: u32 = 10;
/// Default ping timeout in seconds
pub const DEFAULT_TIMEOUT: u32 = 2;
/// Packets sent by the reachability check
const PRECHECK_COUNT: u32 = 2;
/// Timeout of the reachability check
const PRECHECK_TIMEOUT: u32 = 2;
/// Seconds added to the packet count, to wait for all processes to finish
const SETTLE_EXTRA_S: u64 = 4;
/// File of the ping probe output
pub const PING_FILE: &str = "path.ping.txt";

lazy_static! {
    static ref ROUTE_VIA: Regex = Regex::new(r"\S+\s+via\s+(\S+)").unwrap();
    static ref ROUTE_DEV: Regex = Regex::new(r"\S+\s+dev\s+(\S+)").unwrap();
}

/// Parameters of a path trace
#[derive(Debug, Clone)]
pub struct PathRequest {
    /// Source IP
    pub src_ip: String,
    /// Destination IP
    pub dst_ip: String,
    /// Name of the router through which the VMs are reached
    pub router: String,
    /// Login of the source VM
    pub src_login: LoginInfo,
    /// Login of the destination VM
    pub dst_login: LoginInfo,
    /// Number of ping packets
    pub count: u32,
    /// Ping timeout in seconds
    pub timeout: u32,
    /// Executable used to run the probes inside the router namespace
    pub probe_exe: String,
    /// Directory of the capture files
    pub work_dir: PathBuf,
}

/// Traces the path between two VMs on a live deployment.
#[derive(Debug)]
pub struct PathTracer<'a, H> {
    topo: &'a Topology,
    host: H,
}

impl<'a, H: ProcessHost> PathTracer<'a, H> {
    /// Create a new tracer on the given snapshot
    pub fn new(topo: &'a Topology, host: H) -> Self {
        Self { topo, host }
    }

    /// Reference to the process host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Perform the trace. Only unknown endpoints or an unknown router result in an error, every
    /// other problem is reported in the verdict.
    pub fn trace(&mut self, req: &PathRequest) -> Result<PathVerdict> {
        let mut src_info = EndpointInfo::resolve(self.topo, &req.src_ip)?;
        let mut dst_info = EndpointInfo::resolve(self.topo, &req.dst_ip)?;
        let qrouter = self
            .topo
            .router_namespace(&req.router)
            .ok_or_else(|| Error::RouterNotFound(req.router.clone()))?;
        let probes = ProbeInvocation::new(req.probe_exe.as_str(), qrouter.as_str());

        for (ip, peer, login) in &[
            (&req.src_ip, &req.dst_ip, &req.src_login),
            (&req.dst_ip, &req.src_ip, &req.dst_login),
        ] {
            if !self.reachable(&probes, ip, peer, login) {
                let msg = format!("Cannot reach {} via router {}", ip, req.router);
                error!("{}", msg);
                return Ok(PathVerdict::failed(src_info, dst_info, msg));
            }
            info!("IP {} is reachable via {}", ip, qrouter);
        }

        let hops = if src_info.tag != dst_info.tag {
            info!("{} and {} are on different segments", req.src_ip, req.dst_ip);
            let hops = self.next_hops(&probes, req);
            if hops.is_empty() {
                error!("Could not find next hop list from {} to {}", req.src_ip, req.dst_ip);
            }
            Some(hops)
        } else {
            None
        };

        let mut group = ProcessGroup::new();
        let launched = self.launch(&mut group, &probes, req, &src_info, &dst_info, hops.as_deref());
        if let Err(e) = launched {
            error!("Could not launch the capture: {}", e);
            group.terminate_all();
            return Ok(PathVerdict::failed(src_info, dst_info, e.to_string()));
        }

        let wait = req.count as u64 + SETTLE_EXTRA_S;
        info!("Waiting {} sec for tcpdump and ping processes to complete", wait);
        self.host.settle(Duration::from_secs(wait));
        let failed = group.terminate_all();
        if failed > 0 {
            warn!("{} processes could not be terminated", failed);
        }

        let dir = req.work_dir.as_path();
        for role in PortRole::ALL.iter() {
            let captured = read_capture(&capture_file(dir, "src", &src_info.ports[role]));
            src_info.record_capture(*role, captured);
            let captured = read_capture(&capture_file(dir, "dst", &dst_info.ports[role]));
            dst_info.record_capture(*role, captured);
        }
        let net_info = hops.map(|hops| {
            let mut net = HopCaptures::new(hops.clone());
            for hop in hops.iter() {
                net.record_capture(&hop.dev, read_capture(&capture_file(dir, "net", &hop.dev)));
            }
            net
        });
        let ping_pass = read_ping(&req.work_dir.join(PING_FILE));
        info!("Ping {} -> {}: {}", req.src_ip, req.dst_ip, if ping_pass { "PASS" } else { "FAIL" });

        Ok(PathVerdict {
            src: req.src_ip.clone(),
            dst: req.dst_ip.clone(),
            src_info,
            dst_info,
            net_info,
            ping_pass,
            error: String::new(),
        })
    }

    /// Check that the VM with address `ip` can be logged into from the router namespace.
    fn reachable(
        &mut self,
        probes: &ProbeInvocation,
        ip: &str,
        peer: &str,
        login: &LoginInfo,
    ) -> bool {
        info!("Testing whether {} is reachable", ip);
        let cmd = probes.ping(ip, peer, login, PRECHECK_COUNT, PRECHECK_TIMEOUT);
        match self.run_probe(&cmd) {
            Some(report) => report.login_passed(ip),
            None => false,
        }
    }

    fn run_probe(&mut self, cmd: &str) -> Option<ProbeReport> {
        let output = match self.host.run(cmd) {
            Ok(output) => output,
            Err(Error::ExternalCommand { output, .. }) => output,
            Err(e) => {
                error!("Probe failed: {}", e);
                return None;
            }
        };
        match ProbeReport::from_json(&output) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Cannot read the probe output: {}\n{}", e, output);
                None
            }
        }
    }

    /// Find the router interfaces on the path to the destination. The first hop is the gateway of
    /// the source VM, the second hop is the interface through which the router forwards to the
    /// destination.
    fn next_hops(&mut self, probes: &ProbeInvocation, req: &PathRequest) -> Vec<Hop> {
        let route_cmd = format!("ip route get {}", req.dst_ip);
        let report = match self.run_probe(&probes.cmd(&req.src_ip, &req.src_login, &route_cmd)) {
            Some(report) if report.pass => report,
            _ => return Vec::new(),
        };
        let gateway = match report
            .output_of("ip route get")
            .and_then(|o| o.first())
            .and_then(|l| ROUTE_VIA.captures(l))
        {
            Some(caps) => caps[1].to_string(),
            None => return Vec::new(),
        };
        let first = match self.topo.ip_to_interface(&gateway) {
            Some(suffix) => format!("qr-{}", suffix),
            None => {
                warn!("Gateway {} not found", gateway);
                return Vec::new();
            }
        };
        let nms = match self.topo.namespace_for_interface(&first) {
            Some(nms) => nms.to_string(),
            None => {
                warn!("Interface {} is not in any namespace", first);
                return Vec::new();
            }
        };
        let mut hops = vec![Hop { dev: first, nms: nms.clone() }];

        let output = match self.host.run(&format!("sudo ip netns exec {} {}", nms, route_cmd)) {
            Ok(output) => output,
            Err(e) => {
                warn!("Cannot get the route inside {}: {}", nms, e);
                return hops;
            }
        };
        if let Some(caps) = output.lines().next().and_then(|l| ROUTE_DEV.captures(l)) {
            hops.push(Hop { dev: caps[1].to_string(), nms });
        }
        hops
    }

    /// Start all captures and the ping.
    fn launch(
        &mut self,
        group: &mut ProcessGroup,
        probes: &ProbeInvocation,
        req: &PathRequest,
        src_info: &EndpointInfo,
        dst_info: &EndpointInfo,
        hops: Option<&[Hop]>,
    ) -> Result<()> {
        fs::create_dir_all(&req.work_dir)?;
        for (tag, info) in &[("src", src_info), ("dst", dst_info)] {
            for dev in info.ports.values() {
                let file = capture_file(&req.work_dir, tag, dev);
                let process = self.host.spawn(&tcpdump_command(dev, None, req.count), &file)?;
                debug!("{}: tcpdump launched with pid {} for interface {}", tag, process.id(), dev);
                group.push(format!("{}: tcpdump {}", tag, dev), process);
            }
        }
        for hop in hops.unwrap_or_default() {
            let file = capture_file(&req.work_dir, "net", &hop.dev);
            let cmd = tcpdump_command(&hop.dev, Some(hop.nms.as_str()), req.count);
            let process = self.host.spawn(&cmd, &file)?;
            debug!("net: tcpdump launched with pid {} for interface {}", process.id(), hop.dev);
            group.push(format!("net: tcpdump {}", hop.dev), process);
        }
        let ping = probes.ping(&req.src_ip, &req.dst_ip, &req.src_login, req.count, req.timeout);
        let process = self.host.spawn(&ping, &req.work_dir.join(PING_FILE))?;
        debug!("Ping started with pid {}", process.id());
        group.push("ping", process);
        Ok(())
    }
}

fn read_capture(file: &Path) -> Option<u32> {
    fs::read_to_string(file).ok().and_then(|content| parse_captured(&content))
}

fn read_ping(file: &Path) -> bool {
    match fs::read_to_string(file).map_err(Error::from).and_then(|c| ProbeReport::from_json(&c)) {
        Ok(report) => report.pass,
        Err(e) => {
            warn!("Cannot read the ping result {}: {}", file.display(), e);
            false
        }
    }
}
