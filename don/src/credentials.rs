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

//! # Credentials
//!
//! The credential file is a YAML document of the following form:
//!
//! ```yaml
//! default:
//!   username: cirros
//!   password: cubswin:)
//! vm1:
//!   username: ubuntu
//!   password: secret
//! network:
//!   hostname: network-node
//!   username: stack
//!   password: stack
//! hypervisor:
//!   default:
//!     username: stack
//!     password: stack
//!   compute-2:
//!     username: root
//!     password: root
//! ```
//!
//! Every top-level key except `default`, `network` and `hypervisor` is the name of a VM.

use crate::{Error, Result};

use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Username and password of a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    /// SSH username
    pub username: String,
    /// SSH password
    pub password: String,
}

/// Login of a host which is addressed by its hostname
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostLogin {
    /// Hostname or IP of the host
    pub hostname: String,
    /// SSH username
    pub username: String,
    /// SSH password
    pub password: String,
}

impl HostLogin {
    /// Username and password, without the hostname
    pub fn login(&self) -> LoginInfo {
        LoginInfo { username: self.username.clone(), password: self.password.clone() }
    }
}

/// Content of the credential file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Login used for every VM without an explicit entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<LoginInfo>,
    /// Login of the network node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<HostLogin>,
    /// Logins of the hypervisors. The key `default` applies to all others.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hypervisor: BTreeMap<String, LoginInfo>,
    /// Logins of individual VMs
    #[serde(flatten)]
    pub vms: BTreeMap<String, LoginInfo>,
}

impl Credentials {
    /// Read the credential file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let creds: Self = serde_yaml::from_reader(file)?;
        debug!("Read credentials of {} VMs from {}", creds.vms.len(), path.display());
        Ok(creds)
    }

    /// Login of a VM, falling back to `default`.
    pub fn for_vm(&self, vm: &str) -> Result<&LoginInfo> {
        self.vms
            .get(vm)
            .or_else(|| self.default.as_ref())
            .ok_or_else(|| Error::MissingCredentials(vm.to_string()))
    }

    /// Login of a hypervisor, falling back to the `default` hypervisor entry.
    pub fn for_hypervisor(&self, node: &str) -> Result<&LoginInfo> {
        self.hypervisor
            .get(node)
            .or_else(|| self.hypervisor.get("default"))
            .ok_or_else(|| Error::MissingCredentials(node.to_string()))
    }

    /// Login of the network node
    pub fn for_network(&self) -> Result<&HostLogin> {
        self.network.as_ref().ok_or_else(|| Error::MissingCredentials("network".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const CREDENTIALS: &str = "
default:
  username: cirros
  password: 'cubswin:)'
vm1:
  username: ubuntu
  password: secret
network:
  hostname: network-node
  username: stack
  password: stack
hypervisor:
  default:
    username: stack
    password: stack
  compute-2:
    username: root
    password: root
";

    fn login(username: &str, password: &str) -> LoginInfo {
        LoginInfo { username: username.to_string(), password: password.to_string() }
    }

    #[test]
    fn lookup() {
        let creds: Credentials = serde_yaml::from_str(CREDENTIALS).unwrap();
        assert_eq!(creds.vms.len(), 1);
        assert_eq!(creds.for_vm("vm1").unwrap(), &login("ubuntu", "secret"));
        assert_eq!(creds.for_vm("vm2").unwrap(), &login("cirros", "cubswin:)"));
        assert_eq!(creds.for_hypervisor("compute-1").unwrap(), &login("stack", "stack"));
        assert_eq!(creds.for_hypervisor("compute-2").unwrap(), &login("root", "root"));
        assert_eq!(creds.for_network().unwrap().hostname, "network-node");
    }

    #[test]
    fn missing() {
        let creds: Credentials = serde_yaml::from_str("vm1: {username: a, password: b}").unwrap();
        assert!(matches!(creds.for_vm("vm2"), Err(Error::MissingCredentials(vm)) if vm == "vm2"));
        assert!(creds.for_hypervisor("compute-1").is_err());
        assert!(creds.for_network().is_err());
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CREDENTIALS.as_bytes()).unwrap();
        let creds = Credentials::load(file.path()).unwrap();
        assert_eq!(creds.default, Some(login("cirros", "cubswin:)")));
    }
}
