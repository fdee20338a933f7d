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

//! # Topology Analyzer
//!
//! Runs a set of tests on a collected snapshot, and renders the results into an HTML report.
//!
//! - **ping**: Every pair of VMs pings each other (over all non-public addresses), from every
//!   router namespace the two VMs share. The test passes if there exists one namespace through
//!   which all pings succeed.
//! - **ovs**: For every tag on br-int with at least two VM ports, every pair of those ports is
//!   checked with the MAC learning trace. All pairs must pass.
//! - **wiring**: Every VM port must be wired from its tap device through the Linux bridge and the
//!   veth pair into br-int.

use crate::ovs_trace;
use crate::probe::{ProbeInvocation, ProbeReport};
use crate::process::ProcessHost;

use don::credentials::{Credentials, LoginInfo};
use don::graph::{PortWiring, TopologyGraph};
use don::{Error, Result, Topology};

use itertools::Itertools;
use log::*;

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::path::Path;

/// Check mark in the report
pub const TICK: &str = "&#10004;";
/// Cross in the report
pub const CROSS: &str = "&#10008;";
/// Template placeholder of the static files of the dashboard
const STATIC_URL: &str = "{{ STATIC_URL }}";
/// Default name of the report
pub const DEFAULT_REPORT_FILE: &str = "don.report.html";

/// Default number of ping packets per pair
pub const DEFAULT_PING_COUNT: u32 = 2;
/// Default ping timeout in seconds
pub const DEFAULT_PING_TIMEOUT: u32 = 2;

/// The available tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    /// Ping between all pairs of VMs
    Ping,
    /// MAC learning between ports with the same tag
    Ovs,
    /// Wiring of the VM ports
    Wiring,
}

impl TestKind {
    /// All tests in the order they appear in the report
    pub const ALL: [TestKind; 3] = [TestKind::Ping, TestKind::Ovs, TestKind::Wiring];

    /// Name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Ovs => "ovs",
            Self::Wiring => "wiring",
        }
    }

    /// Human readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ping => "Ping test between all pairs of VMs",
            Self::Ovs => "OVS test between all pairs of ports using the same tag in br-int",
            Self::Wiring => "Wiring test of every VM port from the tap device to br-int",
        }
    }
}

/// Status of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// The test was not executed
    NotRun,
    /// The test passed
    Pass,
    /// The test failed
    Fail,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRun => write!(f, "not run"),
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Entry of the test registry
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Which test
    pub kind: TestKind,
    /// Whether the test is selected to run
    pub run: bool,
    /// Result of the last run
    pub status: TestStatus,
    /// HTML fragment of the last run
    pub html: Option<String>,
}

/// Parameters of the analysis
#[derive(Debug, Clone)]
pub struct AnalyzerParams {
    /// Number of ping packets per pair
    pub ping_count: u32,
    /// Ping timeout in seconds
    pub ping_timeout: u32,
    /// Executable used to run the probes inside the router namespaces
    pub probe_exe: String,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            ping_count: DEFAULT_PING_COUNT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            probe_exe: "don".to_string(),
        }
    }
}

/// A single probe, with its command and output
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Command line of the probe
    pub cmd: String,
    /// Raw output
    pub output: String,
    /// Result
    pub pass: bool,
}

/// Pair of VM names, or pair of IPs
pub type Pair = (String, String);

/// Results of the ping test: router namespace -> VM pair -> IP pair -> outcome
pub type PingResults = BTreeMap<String, BTreeMap<Pair, BTreeMap<Pair, ProbeOutcome>>>;

/// Results of the OVS test: tag -> port id pair -> outcome. Tags and ports are numeric.
pub type OvsResults = BTreeMap<u32, BTreeMap<(u32, u32), ProbeOutcome>>;

/// The analyzer, owning the test registry.
#[derive(Debug)]
pub struct Analyzer<'a, H> {
    topo: &'a Topology,
    credentials: &'a Credentials,
    host: H,
    params: AnalyzerParams,
    tests: Vec<TestCase>,
}

impl<'a, H: ProcessHost> Analyzer<'a, H> {
    /// Create the analyzer with all tests registered, but none selected.
    pub fn new(
        topo: &'a Topology,
        credentials: &'a Credentials,
        host: H,
        params: AnalyzerParams,
    ) -> Self {
        let tests = TestKind::ALL
            .iter()
            .map(|kind| TestCase {
                kind: *kind,
                run: false,
                status: TestStatus::NotRun,
                html: None,
            })
            .collect();
        Self { topo, credentials, host, params, tests }
    }

    /// Select a test by its name. Returns false if there is no such test.
    pub fn select(&mut self, name: &str) -> bool {
        match self.tests.iter_mut().find(|t| t.kind.name() == name) {
            Some(t) => {
                t.run = true;
                true
            }
            None => {
                error!("Unknown test: {}", name);
                false
            }
        }
    }

    /// Select all tests
    pub fn select_all(&mut self) {
        self.tests.iter_mut().for_each(|t| t.run = true);
    }

    /// The test registry
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Reference to the process host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run all selected tests. Returns true if all of them passed.
    pub fn run(&mut self) -> bool {
        let mut all_passed = true;
        for i in 0..self.tests.len() {
            if !self.tests[i].run {
                continue;
            }
            let kind = self.tests[i].kind;
            info!("Running the {} test", kind.name());
            let mut html = String::new();
            let (pass, written) = match kind {
                TestKind::Ping => {
                    let results = self.ping_test();
                    let pass = ping_test_passed(&results);
                    (pass, write_ping_result(&mut html, &results, pass, self.topo))
                }
                TestKind::Ovs => {
                    let results = self.ovs_test();
                    let pass = results.values().flat_map(|p| p.values()).all(|o| o.pass);
                    (pass, write_ovs_result(&mut html, &results, pass))
                }
                TestKind::Wiring => {
                    let results = self.wiring_test();
                    let pass = results.iter().all(|w| w.pass());
                    (pass, write_wiring_result(&mut html, &results, pass))
                }
            };
            if let Err(e) = written {
                error!("Cannot format the result of the {} test: {}", kind.name(), e);
            }
            info!("{} test: {}", kind.name(), if pass { "PASS" } else { "FAIL" });
            let test = &mut self.tests[i];
            test.status = if pass { TestStatus::Pass } else { TestStatus::Fail };
            test.html = Some(html);
            all_passed &= pass;
        }
        all_passed
    }

    /// Ping every pair of VMs from every router namespace they share.
    pub fn ping_test(&mut self) -> PingResults {
        let topo = self.topo;
        let mut results = PingResults::new();
        for (src_vm, dst_vm) in topo.vms.keys().tuple_combinations() {
            let dst_namespaces = topo.vm_router_namespaces(dst_vm);
            let shared = topo
                .vm_router_namespaces(src_vm)
                .into_iter()
                .filter(|ns| dst_namespaces.contains(ns))
                .collect::<Vec<_>>();
            if shared.is_empty() {
                debug!("{} and {} share no router namespace", src_vm, dst_vm);
                continue;
            }
            // a pair without login still counts as failed in every shared namespace
            let login = self.credentials.for_vm(src_vm).map(LoginInfo::clone);
            if let Err(e) = login.as_ref() {
                warn!("Cannot ping {} -> {}: {}", src_vm, dst_vm, e);
            }
            let private_ips = |vm: &str| -> Vec<String> {
                topo.vms[vm].interfaces.keys().filter(|ip| !topo.is_public(ip, vm)).cloned().collect()
            };
            let src_ips = private_ips(src_vm.as_str());
            let dst_ips = private_ips(dst_vm.as_str());

            for qrouter in shared {
                let probes = ProbeInvocation::new(self.params.probe_exe.as_str(), qrouter.as_str());
                let pairs = results
                    .entry(qrouter)
                    .or_default()
                    .entry((src_vm.clone(), dst_vm.clone()))
                    .or_default();
                for (src_ip, dst_ip) in src_ips.iter().cartesian_product(dst_ips.iter()) {
                    let outcome = match login.as_ref() {
                        Ok(login) => {
                            let (count, timeout) =
                                (self.params.ping_count, self.params.ping_timeout);
                            let cmd = probes.ping(src_ip, dst_ip, login, count, timeout);
                            debug!("Ping [{} ({}) => {} ({})]", src_vm, src_ip, dst_vm, dst_ip);
                            run_probe(&mut self.host, cmd)
                        }
                        Err(e) => ProbeOutcome {
                            cmd: format!("ping {} -> {}", src_ip, dst_ip),
                            output: e.to_string(),
                            pass: false,
                        },
                    };
                    pairs.insert((src_ip.clone(), dst_ip.clone()), outcome);
                }
            }
        }
        results
    }

    /// Run the MAC learning trace for every pair of VM ports sharing a tag on br-int.
    pub fn ovs_test(&mut self) -> OvsResults {
        let mut tag_to_ports: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        let qvo_ports = self.topo.bridges.br_int.ports.iter().filter(|(n, _)| n.starts_with("qvo"));
        for (name, port) in qvo_ports {
            let tag = port.tag.as_deref().and_then(|t| t.parse().ok());
            let id = port.id.as_deref().and_then(|i| i.parse().ok());
            match (tag, id) {
                (Some(tag), Some(id)) => tag_to_ports.entry(tag).or_default().push(id),
                _ => warn!("Port {} has no numeric tag or port id", name),
            }
        }

        let mut results = OvsResults::new();
        for (tag, ports) in tag_to_ports {
            let pairs = results.entry(tag).or_default();
            if ports.len() < 2 {
                debug!("tag {} is used by a single port {:?}. Skipping test!", tag, ports);
                continue;
            }
            for (src, dst) in ports.iter().sorted().tuple_combinations() {
                let (src_id, dst_id, tag_id) = (src.to_string(), dst.to_string(), tag.to_string());
                let report = ovs_trace::ovs_test(&mut self.host, "br-int", &src_id, &dst_id, &tag_id);
                let output = report.to_json().unwrap_or_else(|e| e.to_string());
                let cmd = format!(
                    "ovs-test --src-port {} --dst-port {} --tag {} --bridge br-int",
                    src, dst, tag
                );
                pairs.insert((*src, *dst), ProbeOutcome { cmd, output, pass: report.pass });
            }
        }
        results
    }

    /// Check the wiring of every VM port.
    pub fn wiring_test(&self) -> Vec<PortWiring> {
        TopologyGraph::build(self.topo).vm_port_wiring(self.topo)
    }

    /// The full HTML report with the results of all tests that were run.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let result = report_open(&mut out)
            .and_then(|_| {
                self.tests.iter().filter_map(|t| t.html.as_ref()).try_for_each(|h| out.write_str(h))
            })
            .and_then(|_| report_close(&mut out));
        if let Err(e) = result {
            error!("Cannot generate the report: {}", e);
        }
        out
    }

    /// Write the HTML report to a file
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.report())?;
        info!("Report written to {}", path.as_ref().display());
        Ok(())
    }
}

fn run_probe<H: ProcessHost>(host: &mut H, cmd: String) -> ProbeOutcome {
    let output = match host.run(&cmd) {
        Ok(output) => output,
        Err(Error::ExternalCommand { output, .. }) => output,
        Err(e) => e.to_string(),
    };
    let pass = ProbeReport::from_json(&output).map(|r| r.pass).unwrap_or(false);
    ProbeOutcome { cmd, output, pass }
}

/// The ping test passes if all probes through one router namespace pass. Namespaces are checked
/// in sorted order.
pub fn ping_test_passed(results: &PingResults) -> bool {
    results.iter().any(|(qrouter, pairs)| {
        let pass = pairs.values().flat_map(|ips| ips.values()).all(|o| o.pass);
        debug!("Ping status in {}: {}", qrouter, pass);
        pass
    })
}

fn result_mark(pass: bool) -> String {
    if pass {
        format!("<font class=\"pass\">{}</font>", TICK)
    } else {
        format!("<font class=\"fail\">{}</font>", CROSS)
    }
}

fn pre_class(pass: bool) -> &'static str {
    if pass {
        "pass"
    } else {
        "fail"
    }
}

fn write_output(out: &mut String, indent: &str, outcome: &ProbeOutcome) -> fmt::Result {
    writeln!(out, "{}<ul class=\"collapsibleList\">", indent)?;
    writeln!(out, "{}  <pre class=\"{}\">", indent, pre_class(outcome.pass))?;
    for line in outcome.output.split('\n') {
        writeln!(out, "{}", line)?;
    }
    writeln!(out, "{}  </pre>", indent)?;
    writeln!(out, "{}</ul>", indent)
}

fn write_overall(out: &mut String, pass: bool) -> fmt::Result {
    writeln!(out, "OVERALL RESULT: {}", result_mark(pass))
}

fn write_ping_result(
    out: &mut String,
    results: &PingResults,
    pass: bool,
    topo: &Topology,
) -> fmt::Result {
    writeln!(out, "<h2>Ping Test Results</h2>")?;
    writeln!(out, "<h3>{}</h3>", TestKind::Ping.description())?;
    writeln!(out, "<ul class=\"collapsibleList\">")?;
    for (qrouter, pairs) in results {
        let router = topo.router_for_namespace(qrouter).unwrap_or("unknown");
        writeln!(out, "  <li>{} (Namespace [{}])", router, qrouter)?;
        writeln!(out, "  <ul class=\"collapsibleList\">")?;
        for ((src_vm, dst_vm), ips) in pairs {
            writeln!(out, "    <li>{} &rarr; {}", src_vm, dst_vm)?;
            writeln!(out, "    <ul class=\"collapsibleList\">")?;
            for ((src_ip, dst_ip), outcome) in ips {
                let mark = result_mark(outcome.pass);
                writeln!(out, "      <li>{:>15} &rarr; {:>15}    {}", src_ip, dst_ip, mark)?;
                write_output(out, "      ", outcome)?;
                writeln!(out, "      </li>")?;
            }
            writeln!(out, "    </ul>")?;
            writeln!(out, "    </li>")?;
        }
        writeln!(out, "  </ul>")?;
        writeln!(out, "  </li>")?;
    }
    writeln!(out, "</ul>")?;
    write_overall(out, pass)
}

fn write_ovs_result(out: &mut String, results: &OvsResults, pass: bool) -> fmt::Result {
    writeln!(out, "<h2>OVS Test Results</h2>")?;
    writeln!(out, "<h3>{}</h3>", TestKind::Ovs.description())?;
    writeln!(out, "<ul class=\"collapsibleList\">")?;
    writeln!(out, "  <li>OVS bridge br-int")?;
    writeln!(out, "  <ul class=\"collapsibleList\">")?;
    for (tag, pairs) in results {
        writeln!(out, "    <li>tag {}", tag)?;
        writeln!(out, "    <ul class=\"collapsibleList\">")?;
        for ((src, dst), outcome) in pairs {
            let mark = result_mark(outcome.pass);
            writeln!(out, "      <li>{:>3} &rarr; {:>3}    {}", src, dst, mark)?;
            write_output(out, "      ", outcome)?;
            writeln!(out, "      </li>")?;
        }
        writeln!(out, "    </ul>")?;
        writeln!(out, "    </li>")?;
    }
    writeln!(out, "  </ul>")?;
    writeln!(out, "  </li>")?;
    writeln!(out, "</ul>")?;
    write_overall(out, pass)
}

fn write_wiring_result(out: &mut String, results: &[PortWiring], pass: bool) -> fmt::Result {
    writeln!(out, "<h2>Wiring Test Results</h2>")?;
    writeln!(out, "<h3>{}</h3>", TestKind::Wiring.description())?;
    writeln!(out, "<ul class=\"collapsibleList\">")?;
    for (vm, ports) in &results.iter().group_by(|w| w.vm.as_str()) {
        writeln!(out, "  <li>{}", vm)?;
        writeln!(out, "  <ul class=\"collapsibleList\">")?;
        for wiring in ports {
            let tag = wiring.tag.as_deref().unwrap_or("none");
            let mark = result_mark(wiring.pass());
            writeln!(out, "    <li>{} (tag {})    {}", wiring.tap, tag, mark)?;
            if !wiring.missing.is_empty() {
                writeln!(out, "    <ul class=\"collapsibleList\">")?;
                writeln!(out, "      <pre class=\"fail\">")?;
                for link in wiring.missing.iter() {
                    writeln!(out, "missing link {}", link)?;
                }
                writeln!(out, "      </pre>")?;
                writeln!(out, "    </ul>")?;
            }
            writeln!(out, "    </li>")?;
        }
        writeln!(out, "  </ul>")?;
        writeln!(out, "  </li>")?;
    }
    writeln!(out, "</ul>")?;
    write_overall(out, pass)
}

fn report_open(out: &mut String) -> fmt::Result {
    writeln!(out, "<html>")?;
    writeln!(out, "<head>")?;
    writeln!(
        out,
        "<script type=\"text/javascript\" src=\"{}/don/CollapsibleLists.js\"></script>",
        STATIC_URL
    )?;
    writeln!(
        out,
        "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}/don/don.css\">",
        STATIC_URL
    )?;
    writeln!(out, "<title>DON: Analysis Results</title>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body onload=CollapsibleLists.apply()>")
}

fn report_close(out: &mut String) -> fmt::Result {
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}
