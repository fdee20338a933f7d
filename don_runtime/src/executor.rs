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

//! Execution of the catalog commands on a real deployment.

use crate::process::run_command;
use crate::ssh::{shell_quote, RemoteShell};

use don::catalog::{CommandDescriptor, CommandLine, Placement};
use don::collector::Executor;
use don::config::{DeploymentType, DonConfig};
use don::credentials::Credentials;
use don::parsers::hypervisor_list;
use don::Result;

use log::*;

use std::collections::BTreeMap;
use std::iter::once;

/// Command listing the hypervisors of a multinode deployment
const HYPERVISOR_LIST: &str = "nova hypervisor-list";

/// [`Executor`] running the commands either locally (single node deployment), or on the network
/// and compute nodes of a multinode deployment.
#[derive(Debug)]
pub struct SystemExecutor<R> {
    deployment: DeploymentType,
    env: BTreeMap<String, String>,
    credentials: Credentials,
    remote: R,
    hypervisors: Option<Vec<String>>,
}

impl<R: RemoteShell> SystemExecutor<R> {
    /// Create a new executor. The `env` is merged into the environment of all commands requiring
    /// it.
    pub fn new(
        config: &DonConfig,
        env: BTreeMap<String, String>,
        credentials: Credentials,
        remote: R,
    ) -> Self {
        Self { deployment: config.deployment_type, env, credentials, remote, hypervisors: None }
    }

    fn run_local(&self, command: &CommandDescriptor) -> Result<String> {
        let line = if command.sudo {
            match &command.cmd {
                CommandLine::Argv(argv) => {
                    let argv = once("sudo".to_string()).chain(argv.iter().cloned());
                    CommandLine::Argv(argv.collect())
                }
                CommandLine::Shell(s) => CommandLine::Shell(format!("sudo {}", s)),
            }
        } else {
            command.cmd.clone()
        };
        if command.env {
            run_command(&line, &self.env)
        } else {
            run_command(&line, &BTreeMap::new())
        }
    }

    fn remote_line(&self, command: &CommandDescriptor) -> String {
        let mut line = String::new();
        if command.env {
            for (k, v) in self.env.iter() {
                line.push_str(&format!("export {}={}; ", k, shell_quote(v)));
            }
        }
        line.push_str(&command.command_line());
        line
    }

    fn hypervisors(&mut self) -> Result<Vec<String>> {
        if let Some(h) = self.hypervisors.as_ref() {
            return Ok(h.clone());
        }
        let output = run_command(&CommandLine::argv(HYPERVISOR_LIST), &self.env)?;
        let lines: Vec<&str> = output.lines().collect();
        let hypervisors = hypervisor_list(&lines);
        info!("Hypervisors: {:?}", hypervisors);
        self.hypervisors = Some(hypervisors.clone());
        Ok(hypervisors)
    }
}

impl<R: RemoteShell> Executor for SystemExecutor<R> {
    fn execute(&mut self, key: &str, command: &CommandDescriptor) -> Result<String> {
        debug!("Executing {}: {}", key, command.command_line());
        match (self.deployment, command.placement) {
            (DeploymentType::Single, _) | (DeploymentType::MultiNode, Placement::Controller) => {
                self.run_local(command)
            }
            (DeploymentType::MultiNode, Placement::NetworkNode) => {
                let host = self.credentials.for_network()?;
                let (hostname, login) = (host.hostname.clone(), host.login());
                let line = self.remote_line(command);
                self.remote.run_remote(&hostname, &login, &line)
            }
            (DeploymentType::MultiNode, Placement::ComputeNodes) => {
                let line = self.remote_line(command);
                let mut output = String::new();
                for node in self.hypervisors()? {
                    let login = self.credentials.for_hypervisor(&node)?.clone();
                    output.push_str(&self.remote.run_remote(&node, &login, &line)?);
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                }
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use don::catalog::CommandCatalog;
    use don::credentials::{HostLogin, LoginInfo};
    use don::Error;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<(String, String, String)>,
    }

    impl RemoteShell for Recorder {
        fn run_remote(&mut self, host: &str, login: &LoginInfo, cmd: &str) -> Result<String> {
            self.calls.push((host.to_string(), login.username.clone(), cmd.to_string()));
            Ok(format!("{}", host))
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            default: None,
            network: Some(HostLogin {
                hostname: "network1".to_string(),
                username: "stack".to_string(),
                password: "secret".to_string(),
            }),
            hypervisor: maplit::btreemap! {
                "default".to_string() => LoginInfo { username: "nova".to_string(), password: "pw".to_string() },
            },
            vms: BTreeMap::new(),
        }
    }

    #[test]
    fn local_commands() {
        let config = DonConfig::default();
        let env = maplit::btreemap! {"OS_USERNAME".to_string() => "admin".to_string()};
        let mut exec = SystemExecutor::new(&config, env, credentials(), Recorder::default());
        let command = CommandDescriptor::new(CommandLine::shell("echo $OS_USERNAME"), 1, None).with_env();
        assert_eq!(exec.execute("echo", &command).unwrap(), "admin\n");
        let command = CommandDescriptor::new(CommandLine::shell("echo ${OS_USERNAME:-none}"), 1, None);
        assert_eq!(exec.execute("echo", &command).unwrap(), "none\n");
        assert!(exec.remote.calls.is_empty());
    }

    #[test]
    fn network_node_commands() {
        let config = DonConfig { deployment_type: DeploymentType::MultiNode, ..Default::default() };
        let mut exec = SystemExecutor::new(&config, BTreeMap::new(), credentials(), Recorder::default());
        let catalog = CommandCatalog::openstack();
        let output = exec.execute("ip_netns", catalog.get("ip_netns").unwrap()).unwrap();
        assert_eq!(output, "network1");
        assert_eq!(
            exec.remote.calls,
            vec![("network1".to_string(), "stack".to_string(), "ip netns".to_string())]
        );
    }

    #[test]
    fn compute_nodes_with_cached_hypervisors() {
        let config = DonConfig { deployment_type: DeploymentType::MultiNode, ..Default::default() };
        let mut exec = SystemExecutor::new(&config, BTreeMap::new(), credentials(), Recorder::default());
        exec.hypervisors = Some(vec!["compute1".to_string(), "compute2".to_string()]);
        let catalog = CommandCatalog::openstack();
        let command = catalog.get("cat_instance").unwrap();
        let output = exec.execute("cat_instance", command).unwrap();
        assert_eq!(output, "compute1\ncompute2\n");
        assert_eq!(exec.remote.calls.len(), 2);
        assert_eq!(exec.remote.calls[1].1, "nova");
        assert!(exec.remote.calls[1].2.starts_with("sudo cat /etc/libvirt/qemu/instance-*.xml"));
    }

    #[test]
    fn missing_network_credentials() {
        let config = DonConfig { deployment_type: DeploymentType::MultiNode, ..Default::default() };
        let creds = Credentials { network: None, ..credentials() };
        let mut exec = SystemExecutor::new(&config, BTreeMap::new(), creds, Recorder::default());
        let catalog = CommandCatalog::openstack();
        match exec.execute("ip_netns", catalog.get("ip_netns").unwrap()) {
            Err(Error::MissingCredentials(_)) => {}
            r => panic!("unexpected result: {:?}", r),
        }
    }
}
