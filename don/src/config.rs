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

//! Configuration of the deployment, read from `/etc/don/don.yaml`.

use crate::Result;

use log::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/etc/don/don.yaml";

/// How the OpenStack services are distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    /// Everything runs on the local host
    Single,
    /// Separate network node and compute nodes, reached over ssh
    #[serde(rename = "multinode")]
    MultiNode,
}

impl Default for DeploymentType {
    fn default() -> Self {
        Self::Single
    }
}

/// Configuration file content. Missing fields take the default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DonConfig {
    /// Deployment type
    pub deployment_type: DeploymentType,
    /// Environment-export file with the OpenStack credentials
    pub env_file: PathBuf,
    /// Credential file of the VMs and nodes
    pub credentials_file: PathBuf,
    /// Directory where the probes and captures write their files
    pub work_dir: PathBuf,
}

impl Default for DonConfig {
    fn default() -> Self {
        Self {
            deployment_type: DeploymentType::Single,
            env_file: PathBuf::from("admin-openrc.sh"),
            credentials_file: PathBuf::from("credentials.yaml"),
            work_dir: PathBuf::from("."),
        }
    }
}

impl DonConfig {
    /// Read the configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Read the configuration file. If it does not exist, the default configuration is returned.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Returns true if the deployment has separate network and compute nodes
    pub fn is_multinode(&self) -> bool {
        self.deployment_type == DeploymentType::MultiNode
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config() {
        let config: DonConfig = serde_yaml::from_str("deployment_type: multinode").unwrap();
        assert!(config.is_multinode());
        assert_eq!(config.env_file, PathBuf::from("admin-openrc.sh"));
        assert_eq!(config.work_dir, PathBuf::from("."));

        let config: DonConfig = serde_yaml::from_str("deployment_type: single").unwrap();
        assert_eq!(config.deployment_type, DeploymentType::Single);
        assert!(serde_yaml::from_str::<DonConfig>("deployment_type: cluster").is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = DonConfig::load_or_default(dir.path().join("don.yaml")).unwrap();
        assert_eq!(config, DonConfig::default());
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "deployment_type: multinode").unwrap();
        writeln!(file, "credentials_file: /etc/don/credentials.yaml").unwrap();
        writeln!(file, "work_dir: /tmp/don").unwrap();
        let config = DonConfig::load_or_default(file.path()).unwrap();
        assert!(config.is_multinode());
        assert_eq!(config.credentials_file, PathBuf::from("/etc/don/credentials.yaml"));
        assert_eq!(config.work_dir, PathBuf::from("/tmp/don"));
    }
}
