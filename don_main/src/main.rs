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

use don::config::{DonConfig, DEFAULT_CONFIG_FILE};
use don::credentials::LoginInfo;
use don::plot::DotGenerator;
use don::verdict::PathVerdict;
use don::Topology;
use don_runtime::analyzer::{AnalyzerParams, TestKind, DEFAULT_REPORT_FILE};
use don_runtime::path::{PathRequest, DEFAULT_COUNT, DEFAULT_TIMEOUT};
use don_runtime::probe::{ping_test, remote_command};
use don_runtime::process::LocalHost;
use don_runtime::ssh::SshClient;
use don_runtime::{analyze, collect, load_credentials, ovs_trace, trace_path, write_diagram};

use clap::{Parser, Subcommand};
use log::*;
use std::error::Error;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    // run clap
    let args = CommandLineArguments::parse();

    // initialize the logger. Probes print their report on stdout and stay quiet otherwise.
    let quiet = matches!(args.cmd, MainCommand::Probe { .. } | MainCommand::OvsTest { .. });
    let level = match (args.debug, quiet) {
        (true, _) => LevelFilter::Debug,
        (false, true) => LevelFilter::Off,
        (false, false) => LevelFilter::Info,
    };
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();

    let config =
        if quiet { DonConfig::default() } else { DonConfig::load_or_default(&args.config)? };

    match args.cmd {
        MainCommand::Collect { output } => {
            let state = collect(&config, &output)?;
            info!("Collection finished: {:?}", state);
        }
        MainCommand::Analyze {
            info_file,
            ping,
            ovs,
            wiring,
            all,
            report_file,
            ping_count,
            ping_timeout,
        } => {
            let topo = Topology::load(&info_file)?;
            let mut tests = Vec::new();
            if !all {
                if ping {
                    tests.push(TestKind::Ping);
                }
                if ovs {
                    tests.push(TestKind::Ovs);
                }
                if wiring {
                    tests.push(TestKind::Wiring);
                }
            }
            let params = AnalyzerParams { ping_count, ping_timeout, probe_exe: probe_exe()? };
            let pass = analyze(&config, &topo, &tests, params, &report_file)?;
            info!("Analysis {}", if pass { "passed" } else { "failed" });
        }
        MainCommand::Path {
            info_file,
            src_ip,
            dst_ip,
            router,
            username,
            password,
            count,
            timeout,
            path_file,
            plot,
        } => {
            let topo = Topology::load(&info_file)?;
            let (src_login, dst_login) = match (username, password) {
                (Some(username), Some(password)) => {
                    let login = LoginInfo { username, password };
                    (login.clone(), login)
                }
                _ => (vm_login(&config, &topo, &src_ip)?, vm_login(&config, &topo, &dst_ip)?),
            };
            let req = PathRequest {
                src_ip,
                dst_ip,
                router,
                src_login,
                dst_login,
                count,
                timeout,
                probe_exe: probe_exe()?,
                work_dir: config.work_dir.clone(),
            };
            let verdict = trace_path(&topo, &req, &path_file)?;
            info!("Ping {}", if verdict.ping_pass { "passed" } else { "failed" });
            if let Some(base) = plot {
                let dot = DotGenerator::new(&topo).with_highlight(&verdict).combined_dot();
                write_diagram(&dot, &base, true)?;
            }
        }
        MainCommand::Plot {
            info_file,
            highlight_file,
            compute_file,
            network_file,
            combined_file,
            no_render,
        } => {
            let topo = Topology::load(&info_file)?;
            let highlight = highlight_file.map(PathVerdict::load).transpose()?;
            let mut generator = DotGenerator::new(&topo);
            if let Some(verdict) = highlight.as_ref() {
                generator = generator.with_highlight(verdict);
            }
            let mut targets = vec![];
            if let Some(f) = compute_file {
                targets.push((generator.compute_dot(), f));
            }
            if let Some(f) = network_file {
                targets.push((generator.network_dot(), f));
            }
            if let Some(f) = combined_file {
                targets.push((generator.combined_dot(), f));
            }
            if targets.is_empty() {
                targets.push((generator.combined_dot(), PathBuf::from("don")));
            }
            for (dot, base) in targets {
                for file in write_diagram(&dot, &base, !no_render)? {
                    info!("Written {}", file.display());
                }
            }
        }
        MainCommand::Probe { probe } => {
            let mut ssh = SshClient::default();
            let report = match probe {
                ProbeKind::Ping { src_ip, dst_ip, username, password, count, timeout } => {
                    let login = LoginInfo { username, password };
                    ping_test(&mut ssh, &src_ip, &dst_ip, &login, count, timeout)
                }
                ProbeKind::Cmd { host_ip, username, password, cmd } => {
                    let login = LoginInfo { username, password };
                    remote_command(&mut ssh, &host_ip, &login, &cmd)
                }
            };
            println!("{}", report.to_json()?);
        }
        MainCommand::OvsTest { src_port, dst_port, tag, bridge } => {
            let mut host = LocalHost::new();
            let report = ovs_trace::ovs_test(&mut host, &bridge, &src_port, &dst_port, &tag);
            println!("{}", report.to_json()?);
        }
    }

    Ok(())
}

/// Path to this executable, used to run the probes inside the namespaces.
fn probe_exe() -> Result<String, Box<dyn Error>> {
    Ok(std::env::current_exe()?.to_string_lossy().into_owned())
}

/// Login of the VM owning the IP, from the credential file
fn vm_login(config: &DonConfig, topo: &Topology, ip: &str) -> Result<LoginInfo, Box<dyn Error>> {
    let credentials = load_credentials(config)?;
    let vm = topo.vm_for_ip(ip).unwrap_or(ip);
    Ok(credentials.for_vm(vm)?.clone())
}

#[derive(Parser, Debug)]
#[clap(name = "DON", author = "Tibor Schneider", about = "Diagnosing OpenStack Networking")]
struct CommandLineArguments {
    /// Enable debug output
    #[clap(short = 'd', long)]
    debug: bool,
    /// Configuration file
    #[clap(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Action to perform
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Run all diagnostic commands and store the topology snapshot
    #[clap(name = "collect")]
    Collect {
        /// Snapshot file
        #[clap(short = 'o', long, default_value = "don.json")]
        output: PathBuf,
    },
    /// Run the analysis tests on a snapshot
    #[clap(name = "analyze")]
    Analyze {
        /// Snapshot file
        #[clap(short = 'i', long, default_value = "don.json")]
        info_file: PathBuf,
        /// Ping test between all VMs
        #[clap(long)]
        ping: bool,
        /// OVS test between ports using the same tag in br-int
        #[clap(long)]
        ovs: bool,
        /// Wiring test of all VM ports
        #[clap(long)]
        wiring: bool,
        /// Perform all tests (also the default if no test is selected)
        #[clap(long)]
        all: bool,
        /// Report will be written in this file in HTML format
        #[clap(short = 'r', long, default_value = DEFAULT_REPORT_FILE)]
        report_file: PathBuf,
        /// How many ping packets to send
        #[clap(long, default_value = "2")]
        ping_count: u32,
        /// Ping timeout period in seconds
        #[clap(long, default_value = "2")]
        ping_timeout: u32,
    },
    /// Trace the path of a ping between two VMs
    #[clap(name = "path")]
    Path {
        /// Snapshot file
        #[clap(short = 'i', long, default_value = "don.json")]
        info_file: PathBuf,
        /// Source IP
        #[clap(long)]
        src_ip: String,
        /// Destination IP
        #[clap(long)]
        dst_ip: String,
        /// Router through which the VMs are reached
        #[clap(long)]
        router: String,
        /// SSH username of the VMs (taken from the credential file if omitted)
        #[clap(long)]
        username: Option<String>,
        /// SSH password of the VMs (taken from the credential file if omitted)
        #[clap(long)]
        password: Option<String>,
        /// Number of ping packets
        #[clap(long, default_value_t = DEFAULT_COUNT)]
        count: u32,
        /// Ping timeout in seconds
        #[clap(long, default_value_t = DEFAULT_TIMEOUT)]
        timeout: u32,
        /// Verdict file
        #[clap(short = 'p', long, default_value = "path.json")]
        path_file: PathBuf,
        /// Write a diagram highlighting the path to this file (without extension)
        #[clap(long)]
        plot: Option<PathBuf>,
    },
    /// Generate the diagrams of the compute and network node
    #[clap(name = "plot")]
    Plot {
        /// Snapshot file
        #[clap(short = 'i', long, default_value = "don.json")]
        info_file: PathBuf,
        /// Verdict of a path trace to highlight
        #[clap(long)]
        highlight_file: Option<PathBuf>,
        /// Diagram of the compute node (without extension)
        #[clap(long)]
        compute_file: Option<PathBuf>,
        /// Diagram of the network node (without extension)
        #[clap(long)]
        network_file: Option<PathBuf>,
        /// Diagram of both nodes (without extension)
        #[clap(long)]
        combined_file: Option<PathBuf>,
        /// Only write the DOT files
        #[clap(long)]
        no_render: bool,
    },
    /// Probe a VM, from inside a namespace. Prints the result as JSON.
    #[clap(name = "probe")]
    Probe {
        /// Which probe to run
        #[clap(subcommand)]
        probe: ProbeKind,
    },
    /// MAC learning test between two ports of an OVS bridge. Prints the result as JSON.
    #[clap(name = "ovs-test")]
    OvsTest {
        /// OpenFlow port id of the source
        #[clap(long)]
        src_port: String,
        /// OpenFlow port id of the destination
        #[clap(long)]
        dst_port: String,
        /// VLAN tag of both ports
        #[clap(long)]
        tag: String,
        /// OVS bridge
        #[clap(long, default_value = "br-int")]
        bridge: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProbeKind {
    /// Ping from one VM to another
    #[clap(name = "ping")]
    Ping {
        /// IP from where the ping is run
        #[clap(long)]
        src_ip: String,
        /// IP to which the ping is run
        #[clap(long)]
        dst_ip: String,
        /// SSH login username
        #[clap(long)]
        username: String,
        /// SSH login password
        #[clap(long)]
        password: String,
        /// Ping count
        #[clap(long, default_value = "2")]
        count: u32,
        /// Ping timeout (-W option of ping) in seconds
        #[clap(long, default_value = "4")]
        timeout: u32,
    },
    /// Run a command on a host
    #[clap(name = "cmd")]
    Cmd {
        /// IP where the command is run
        #[clap(long)]
        host_ip: String,
        /// SSH login username
        #[clap(long)]
        username: String,
        /// SSH login password
        #[clap(long)]
        password: String,
        /// Command to run
        #[clap(long)]
        cmd: String,
    },
}
