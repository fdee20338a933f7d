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

//! # Collection Driver
//!
//! The [`Collector`] executes the commands of a [`CommandCatalog`] through an [`Executor`], and
//! feeds their output to the parsers. It iterates until every command with a parser is done, or
//! until the iteration cap is reached. Namespaces discovered by the parsers are registered at the
//! end of the iteration, so their commands are only executed in the next one.

use crate::catalog::{CommandCatalog, CommandDescriptor};
use crate::parsers::Discovery;
use crate::topology::{CollectionStatus, Topology};
use crate::Result;

use log::*;

/// Maximum number of iterations of the collector
pub const MAX_ITERATIONS: usize = 10;

/// Executes a single command of the catalog, and returns its combined output.
pub trait Executor {
    /// Execute the command. A command that cannot be spawned or exits with a non-zero status must
    /// return an error.
    fn execute(&mut self, key: &str, command: &CommandDescriptor) -> Result<String>;
}

/// State of the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    /// Not yet started
    Pending,
    /// Currently iterating
    Running,
    /// All parsers were executed
    Converged,
    /// The iteration cap was reached before all parsers were executed
    Capped,
}

/// # Collector
///
/// Drives the catalog until convergence. The topology is available after [`Collector::run`],
/// also if the run failed.
#[derive(Debug)]
pub struct Collector<E> {
    executor: E,
    catalog: CommandCatalog,
    topology: Topology,
    state: CollectionState,
    iterations: usize,
    max_iterations: usize,
}

impl<E: Executor> Collector<E> {
    /// Create a new collector with an empty topology.
    pub fn new(executor: E, catalog: CommandCatalog) -> Self {
        Self {
            executor,
            catalog,
            topology: Topology::new(),
            state: CollectionState::Pending,
            iterations: 0,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Change the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run the collection. Returns either `Converged` or `Capped`. If a command fails, the error
    /// is recorded in the topology and returned.
    pub fn run(&mut self) -> Result<CollectionState> {
        self.state = CollectionState::Running;
        loop {
            if self.catalog.all_parsed() {
                self.state = CollectionState::Converged;
                break;
            }
            if self.iterations >= self.max_iterations {
                warn!(
                    "Collection did not converge after {} iterations! Pending: {:?}",
                    self.iterations,
                    self.catalog.pending(true)
                );
                self.state = CollectionState::Capped;
                break;
            }
            self.iterations += 1;
            info!("Iteration: {}", self.iterations);

            let discoveries = match self.iterate() {
                Ok(discoveries) => discoveries,
                Err(e) => {
                    error!("Collection aborted: {}", e);
                    self.topology.collection = CollectionStatus {
                        iterations: self.iterations,
                        converged: false,
                        error: Some(e.to_string()),
                    };
                    return Err(e);
                }
            };
            for discovery in discoveries.iter() {
                self.catalog.register(discovery);
            }
        }

        self.run_unparsed();
        self.topology.resolve_vm_routers();
        self.topology.collection = CollectionStatus {
            iterations: self.iterations,
            converged: self.state == CollectionState::Converged,
            error: None,
        };
        info!("Collection finished after {} iterations ({:?})", self.iterations, self.state);
        Ok(self.state)
    }

    /// Execute all pending commands with a parser, in the order of the catalog.
    fn iterate(&mut self) -> Result<Vec<Discovery>> {
        let mut discoveries = Vec::new();
        for key in self.catalog.pending(true) {
            let command = match self.catalog.get(&key) {
                Some(command) => command,
                None => continue,
            };
            info!("Running {}: {}", key, command.command_line());
            let output = self.executor.execute(&key, command)?;
            let lines = output.lines().collect::<Vec<_>>();
            if let Some(parser) = command.parser {
                discoveries.extend(parser.parse(&lines, &mut self.topology));
            }
            if let Some(command) = self.catalog.get_mut(&key) {
                command.done = true;
            }
        }
        Ok(discoveries)
    }

    /// Execute the commands without a parser once. Their output is only logged, and a failure is
    /// not fatal.
    fn run_unparsed(&mut self) {
        for key in self.catalog.pending(false) {
            let command = match self.catalog.get(&key) {
                Some(command) if command.parser.is_none() => command,
                _ => continue,
            };
            match self.executor.execute(&key, command) {
                Ok(output) => debug!("{}:\n{}", command.command_line(), output),
                Err(e) => warn!("{}", e),
            }
            if let Some(command) = self.catalog.get_mut(&key) {
                command.done = true;
            }
        }
    }

    /// The current state
    pub fn state(&self) -> CollectionState {
        self.state
    }

    /// Number of iterations performed so far
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The catalog, including all commands registered during the collection
    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    /// The topology collected so far
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Consume the collector and return the topology
    pub fn into_topology(self) -> Topology {
        self.topology
    }
}
