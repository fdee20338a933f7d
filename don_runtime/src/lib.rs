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

//! # Runtime System
//!
//! This crate executes everything that needs the real deployment: running the diagnostic commands
//! (locally or over ssh), probing VMs from inside router namespaces, capturing packets with
//! `tcpdump`, and tracing the MAC learning of OVS. For simplified usage, check the functions
//! [`collect`], [`analyze`], [`trace_path`] and [`write_diagram`].

#![deny(missing_docs, missing_debug_implementations)]

pub mod analyzer;
pub mod capture;
pub mod executor;
pub mod ovs_trace;
pub mod path;
pub mod probe;
pub mod process;
pub mod ssh;

use analyzer::{Analyzer, AnalyzerParams, TestKind};
use executor::SystemExecutor;
use path::{PathRequest, PathTracer};
use process::{run_command, LocalHost};
use ssh::SshClient;

use don::catalog::{CommandCatalog, CommandLine};
use don::collector::{CollectionState, Collector};
use don::config::DonConfig;
use don::credentials::Credentials;
use don::env_file::load_env_file;
use don::verdict::PathVerdict;
use don::Topology;

use log::*;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Renderer of the DOT diagrams
pub const DOT_RENDERER: &str = "/usr/bin/dot";

/// # Collect the topology
///
/// Runs all diagnostic commands of the deployment described by `config`, and writes the snapshot
/// to `output`. The snapshot is written even if the collection fails, with the error recorded in
/// it.
pub fn collect(config: &DonConfig, output: &Path) -> Result<CollectionState, Box<dyn Error>> {
    let (env, credentials) = match collection_inputs(config) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("Cannot start the collection: {}", e);
            let mut topo = Topology::new();
            topo.collection.error = Some(e.to_string());
            topo.save(output)?;
            return Err(e);
        }
    };
    let executor = SystemExecutor::new(config, env, credentials, SshClient::default());

    info!("Collecting the topology...");
    let mut collector = Collector::new(executor, CommandCatalog::openstack());
    let result = collector.run();
    let topo = collector.into_topology();
    topo.save(output)?;
    info!("Snapshot written to {}", output.display());
    Ok(result?)
}

/// Environment and credentials needed to run the commands
fn collection_inputs(
    config: &DonConfig,
) -> Result<(BTreeMap<String, String>, Credentials), Box<dyn Error>> {
    let env = if config.env_file.exists() {
        load_env_file(&config.env_file)?
    } else {
        warn!("Environment file {} not found", config.env_file.display());
        BTreeMap::new()
    };
    Ok((env, load_credentials(config)?))
}

/// # Analyze the topology
///
/// Runs the selected tests (all tests if `tests` is empty) on the snapshot, and writes the HTML
/// report. Returns true if all tests passed.
pub fn analyze(
    config: &DonConfig,
    topo: &Topology,
    tests: &[TestKind],
    params: AnalyzerParams,
    report_file: &Path,
) -> Result<bool, Box<dyn Error>> {
    let credentials = load_credentials(config)?;
    let mut analyzer = Analyzer::new(topo, &credentials, LocalHost::new(), params);
    if tests.is_empty() {
        analyzer.select_all();
    } else {
        for test in tests {
            analyzer.select(test.name());
        }
    }
    let pass = analyzer.run();
    analyzer.write_report(report_file)?;
    Ok(pass)
}

/// # Trace a path
///
/// Traces the path between two VMs, and writes the verdict to `verdict_file`. If the endpoints
/// or the router are unknown, a verdict with the error is still written before the error is
/// returned.
pub fn trace_path(
    topo: &Topology,
    req: &PathRequest,
    verdict_file: &Path,
) -> Result<PathVerdict, Box<dyn Error>> {
    let mut tracer = PathTracer::new(topo, LocalHost::new());
    match tracer.trace(req) {
        Ok(verdict) => {
            verdict.save(verdict_file)?;
            info!("Verdict written to {}", verdict_file.display());
            Ok(verdict)
        }
        Err(e) => {
            error!("{}", e);
            let verdict = PathVerdict {
                src: req.src_ip.clone(),
                dst: req.dst_ip.clone(),
                error: e.to_string(),
                ..Default::default()
            };
            verdict.save(verdict_file)?;
            Err(e.into())
        }
    }
}

/// # Write a diagram
///
/// Writes the DOT description to `<base>.dot`, and optionally renders it to `<base>.svg`. Returns
/// the written files.
pub fn write_diagram(dot: &str, base: &Path, render: bool) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let dot_file = base.with_extension("dot");
    std::fs::write(&dot_file, dot)?;
    let mut files = vec![dot_file.clone()];
    if render {
        let svg_file = base.with_extension("svg");
        render_svg(&dot_file, &svg_file)?;
        files.push(svg_file);
    }
    Ok(files)
}

/// Render a DOT file into SVG with the external renderer
pub fn render_svg(dot_file: &Path, svg_file: &Path) -> Result<(), Box<dyn Error>> {
    let cmd = CommandLine::Argv(vec![
        DOT_RENDERER.to_string(),
        "-Tsvg".to_string(),
        dot_file.to_string_lossy().into_owned(),
        "-o".to_string(),
        svg_file.to_string_lossy().into_owned(),
    ]);
    run_command(&cmd, &BTreeMap::new())?;
    debug!("Rendered {}", svg_file.display());
    Ok(())
}

/// Read the credential file of the configuration. A missing file results in empty credentials,
/// such that commands not needing any login still work.
pub fn load_credentials(config: &DonConfig) -> Result<Credentials, Box<dyn Error>> {
    if config.credentials_file.exists() {
        Ok(Credentials::load(&config.credentials_file)?)
    } else {
        warn!("Credential file {} not found", config.credentials_file.display());
        Ok(Credentials::default())
    }
}
