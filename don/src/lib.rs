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

#![deny(missing_docs)]

//! # DON: Diagnosing OpenStack Networking
//! This is a library for reconstructing the virtual network fabric of an OpenStack deployment
//! from the output of the usual diagnostic commands (`nova`, `neutron`, `brctl`, `ovs-vsctl`,
//! `ovs-ofctl`, `ip netns`), and for reasoning about the reconstructed topology.
//!
//! ## Structure
//!
//! - **[`Topology`](topology::Topology)**: The snapshot of the deployment. It contains all VMs,
//!   Linux bridges, the three OVS bridges, namespaces, routers, networks and floating IPs, and
//!   offers the lookup helpers used by all analyses. It is serialized as a single JSON document.
//!
//! - **[`CommandCatalog`](catalog::CommandCatalog)**: The ordered set of diagnostic commands,
//!   together with the information of how to execute them, and which parser handles the output.
//!
//! - **[`Parsers`](parsers)**: One parser per command. Parsers update the topology, and announce
//!   newly discovered namespaces as [`Discovery`](parsers::Discovery) events.
//!
//! - **[`Collector`](collector::Collector)**: Drives the catalog through an
//!   [`Executor`](collector::Executor) until all parsers have run (or the iteration cap is hit).
//!
//! - **[`TopologyGraph`](graph::TopologyGraph)**: Graph view on a snapshot, used for wiring
//!   checks.
//!
//! - **[`DotGenerator`](plot::DotGenerator)**: Generates the DOT description of the compute and
//!   network node, optionally highlighting the result of a path trace.
//!
//! - **[`Credentials`](credentials::Credentials)**, **[`DonConfig`](config::DonConfig)** and
//!   **[`env_file`]**: The configuration files read by the tools.

pub mod catalog;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod env_file;
mod error;
pub mod graph;
pub mod parsers;
pub mod plot;
mod test;
pub mod topology;
pub mod verdict;

pub use error::{Error, Result};
pub use topology::Topology;
