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

//! # Command Catalog
//!
//! The catalog holds all diagnostic commands of a collection run. Each command is described by a
//! [`CommandDescriptor`], containing how it is executed, where it is executed, in which order,
//! and which parser handles its output. The catalog grows during collection, when a parser
//! discovers a new namespace whose interfaces need to be inspected.

use crate::parsers::{Discovery, ParserKind};
use crate::topology::{NamespaceKind, OvsBridgeKind};

use itertools::Itertools;
use log::*;
use std::collections::BTreeMap;
use std::fmt;

/// Order of the router namespace inspection commands
pub const ROUTER_NAMESPACE_ORDER: u32 = 100;
/// Order of the DHCP namespace inspection commands
pub const DHCP_NAMESPACE_ORDER: u32 = 110;

/// How the command is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// The program and its arguments, executed directly
    Argv(Vec<String>),
    /// A shell string, executed by `sh -c`
    Shell(String),
}

impl CommandLine {
    /// Build an argument vector from a whitespace separated string
    pub fn argv(cmd: &str) -> Self {
        Self::Argv(cmd.split_whitespace().map(|s| s.to_string()).collect())
    }

    /// Build a shell command
    pub fn shell(cmd: impl Into<String>) -> Self {
        Self::Shell(cmd.into())
    }

    /// Whether the command needs a shell
    pub fn requires_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argv(args) => f.write_str(&args.join(" ")),
            Self::Shell(cmd) => f.write_str(cmd),
        }
    }
}

/// Host on which a command must be executed. On a single node deployment, all commands are
/// executed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The controller, where the tool runs
    Controller,
    /// The network node, which hosts the router and DHCP namespaces
    NetworkNode,
    /// Every compute node (hypervisor)
    ComputeNodes,
}

/// Description of a single diagnostic command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    /// Command line
    pub cmd: CommandLine,
    /// Execute the command with `sudo`
    pub sudo: bool,
    /// Execute the command with the environment of the openrc file
    pub env: bool,
    /// Execution order, commands with smaller order are executed first
    pub order: u32,
    /// Parser of the output, if any
    pub parser: Option<ParserKind>,
    /// Host on which the command is executed
    pub placement: Placement,
    /// Set once the command was executed and its output parsed
    pub done: bool,
}

impl CommandDescriptor {
    /// Create a new descriptor, executed on the controller without sudo and without environment.
    pub fn new(cmd: CommandLine, order: u32, parser: Option<ParserKind>) -> Self {
        Self {
            cmd,
            sudo: false,
            env: false,
            order,
            parser,
            placement: Placement::Controller,
            done: false,
        }
    }

    /// Execute the command with `sudo`
    pub fn with_sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Execute the command with the environment of the openrc file
    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    /// Set the host on which the command is executed
    pub fn on(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// The full command line, as it would be typed into a shell.
    pub fn command_line(&self) -> String {
        if self.sudo {
            format!("sudo {}", self.cmd)
        } else {
            self.cmd.to_string()
        }
    }
}

/// # Command Catalog
///
/// Mapping from command key to its descriptor.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the catalog with all commands needed to reconstruct an OpenStack deployment.
    pub fn openstack() -> Self {
        let mut catalog = Self::new();
        catalog.add_command(
            "nova_list",
            CommandDescriptor::new(CommandLine::argv("nova list"), 1, Some(ParserKind::NovaList))
                .with_env(),
        );
        catalog.add_command(
            "cat_instance",
            CommandDescriptor::new(
                CommandLine::shell(
                    "cat /etc/libvirt/qemu/instance-*.xml | egrep -e \"<uuid>\" -e \"nova:name\" -e \"source bridge\"",
                ),
                2,
                Some(ParserKind::Instances),
            )
            .with_sudo()
            .on(Placement::ComputeNodes),
        );
        catalog.add_command(
            "neutron_port_list",
            CommandDescriptor::new(
                CommandLine::argv("neutron port-list"),
                3,
                Some(ParserKind::NeutronPortList),
            )
            .with_env(),
        );
        catalog.add_command(
            "neutron_router_list",
            CommandDescriptor::new(
                CommandLine::argv("neutron router-list"),
                4,
                Some(ParserKind::NeutronRouterList),
            )
            .with_env(),
        );
        catalog.add_command(
            "neutron_net_list",
            CommandDescriptor::new(
                CommandLine::argv("neutron net-list"),
                5,
                Some(ParserKind::NeutronNetList),
            )
            .with_env(),
        );
        catalog.add_command(
            "ip_netns",
            CommandDescriptor::new(CommandLine::argv("ip netns"), 6, Some(ParserKind::IpNetns))
                .on(Placement::NetworkNode),
        );
        catalog.add_command(
            "brctl_show",
            CommandDescriptor::new(CommandLine::argv("brctl show"), 10, Some(ParserKind::BrctlShow)),
        );
        for (i, bridge) in OvsBridgeKind::ALL.iter().enumerate() {
            let suffix = bridge.name().replace('-', "_");
            let i = i as u32;
            catalog.add_command(
                &format!("ovs_appctl_fdb_show_{}", suffix),
                CommandDescriptor::new(
                    CommandLine::argv(&format!("ovs-appctl fdb/show {}", bridge)),
                    20 + i,
                    None,
                )
                .with_sudo(),
            );
            catalog.add_command(
                &format!("ovs_ofctl_show_{}", suffix),
                CommandDescriptor::new(
                    CommandLine::argv(&format!("ovs-ofctl show {}", bridge)),
                    40 + i,
                    Some(ParserKind::OvsOfctlShow(*bridge)),
                )
                .with_sudo(),
            );
            catalog.add_command(
                &format!("ovs_ofctl_dump_flows_{}", suffix),
                CommandDescriptor::new(
                    CommandLine::argv(&format!("ovs-ofctl dump-flows {}", bridge)),
                    50 + i,
                    None,
                )
                .with_sudo(),
            );
        }
        catalog.add_command(
            "ovs_vsctl_show",
            CommandDescriptor::new(
                CommandLine::argv("ovs-vsctl show"),
                30,
                Some(ParserKind::OvsVsctlShow),
            )
            .with_sudo(),
        );
        catalog.add_command(
            "instance_floating_ip_list",
            CommandDescriptor::new(
                CommandLine::argv("nova floating-ip-list"),
                53,
                Some(ParserKind::FloatingIpList),
            )
            .with_env(),
        );
        catalog
    }

    /// Add a new command to the catalog. If the key already exists, the catalog is left
    /// unchanged, and `false` is returned.
    pub fn add_command(&mut self, key: &str, descriptor: CommandDescriptor) -> bool {
        if self.commands.contains_key(key) {
            error!("Command {} already exists in the catalog!", key);
            return false;
        }
        debug!("Adding command {}: {}", key, descriptor.command_line());
        self.commands.insert(key.to_string(), descriptor);
        true
    }

    /// Register the inspection command for a discovered namespace.
    pub fn register(&mut self, discovery: &Discovery) -> bool {
        match discovery {
            Discovery::Namespace(namespace) => {
                let (order, parser) = match NamespaceKind::of(namespace) {
                    NamespaceKind::Router => (ROUTER_NAMESPACE_ORDER, ParserKind::RouterNamespace),
                    NamespaceKind::Dhcp => (DHCP_NAMESPACE_ORDER, ParserKind::DhcpNamespace),
                    NamespaceKind::Other => {
                        warn!("Namespace {} is neither a router nor a DHCP namespace", namespace);
                        return false;
                    }
                };
                let cmd = CommandLine::shell(format!(
                    "echo namespace: {ns}; sudo ip netns exec {ns} ip a",
                    ns = namespace
                ));
                self.add_command(
                    &format!("netns_{}", namespace),
                    CommandDescriptor::new(cmd, order, Some(parser)).on(Placement::NetworkNode),
                )
            }
        }
    }

    /// Get the descriptor of a command
    pub fn get(&self, key: &str) -> Option<&CommandDescriptor> {
        self.commands.get(key)
    }

    /// Get the descriptor of a command mutably
    pub fn get_mut(&mut self, key: &str) -> Option<&mut CommandDescriptor> {
        self.commands.get_mut(key)
    }

    /// Number of commands in the catalog
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the catalog contains no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate over all commands
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CommandDescriptor)> {
        self.commands.iter()
    }

    /// Keys of all commands which are not done yet, sorted by their order. If `with_parser` is
    /// set, only commands with a parser are returned.
    pub fn pending(&self, with_parser: bool) -> Vec<String> {
        self.commands
            .iter()
            .filter(|(_, c)| !c.done)
            .filter(|(_, c)| !with_parser || c.parser.is_some())
            .map(|(k, c)| (c.order, k))
            .sorted()
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Returns true if all commands which have a parser are done.
    pub fn all_parsed(&self) -> bool {
        self.commands.values().filter(|c| c.parser.is_some()).all(|c| c.done)
    }
}

/// Replace all tabs with four spaces
pub fn normalize_output(output: &str) -> String {
    output.replace('\t', "    ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_command_keeps_existing() {
        let mut catalog = CommandCatalog::new();
        let first = CommandDescriptor::new(CommandLine::argv("ip netns"), 6, Some(ParserKind::IpNetns));
        let second = CommandDescriptor::new(CommandLine::argv("brctl show"), 10, None);
        assert!(catalog.add_command("ip_netns", first.clone()));
        assert!(!catalog.add_command("ip_netns", second));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("ip_netns"), Some(&first));
    }

    #[test]
    fn openstack_catalog() {
        let catalog = CommandCatalog::openstack();
        assert_eq!(catalog.len(), 18);
        let pending = catalog.pending(true);
        assert_eq!(
            pending,
            vec![
                "nova_list",
                "cat_instance",
                "neutron_port_list",
                "neutron_router_list",
                "neutron_net_list",
                "ip_netns",
                "brctl_show",
                "ovs_vsctl_show",
                "ovs_ofctl_show_br_ex",
                "ovs_ofctl_show_br_int",
                "ovs_ofctl_show_br_tun",
                "instance_floating_ip_list",
            ]
        );
        assert_eq!(catalog.pending(false).len(), 18);
        assert_eq!(catalog.get("ovs_vsctl_show").unwrap().command_line(), "sudo ovs-vsctl show");
        assert!(catalog.get("cat_instance").unwrap().cmd.requires_shell());
        assert!(catalog.get("nova_list").unwrap().env);
        assert!(!catalog.all_parsed());
    }

    #[test]
    fn register_namespaces() {
        let mut catalog = CommandCatalog::new();
        assert!(catalog.register(&Discovery::Namespace("qrouter-aa".to_string())));
        assert!(catalog.register(&Discovery::Namespace("qdhcp-bb".to_string())));
        assert!(!catalog.register(&Discovery::Namespace("qrouter-aa".to_string())));
        assert!(!catalog.register(&Discovery::Namespace("snat-aa".to_string())));
        assert_eq!(catalog.len(), 2);

        let router = catalog.get("netns_qrouter-aa").unwrap();
        assert_eq!(router.order, ROUTER_NAMESPACE_ORDER);
        assert_eq!(router.parser, Some(ParserKind::RouterNamespace));
        assert_eq!(router.placement, Placement::NetworkNode);
        assert_eq!(
            router.command_line(),
            "echo namespace: qrouter-aa; sudo ip netns exec qrouter-aa ip a"
        );
        assert_eq!(catalog.get("netns_qdhcp-bb").unwrap().order, DHCP_NAMESPACE_ORDER);
        assert_eq!(catalog.pending(true), vec!["netns_qrouter-aa", "netns_qdhcp-bb"]);
    }

    #[test]
    fn tabs_are_replaced() {
        assert_eq!(normalize_output("a\tb"), "a    b");
    }
}
