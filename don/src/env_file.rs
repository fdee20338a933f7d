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

//! Reading the environment-export file (usually `admin-openrc.sh`), which carries the OpenStack
//! credentials for the `nova` and `neutron` clients.

use crate::Result;

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

lazy_static! {
    static ref EXPORT: Regex = Regex::new(r"^export\s+([^=\s]+)=(.+)$").unwrap();
}

/// Parse the lines of an environment file. Only lines of the form `export KEY=VALUE` are used,
/// every other line is ignored. Double and single quotes around the value are removed.
pub fn parse_env<S: AsRef<str>>(lines: &[S]) -> BTreeMap<String, String> {
    lines
        .iter()
        .filter_map(|line| EXPORT.captures(line.as_ref().trim()))
        .map(|caps| {
            let value = caps[2].trim().trim_matches('"').trim_matches('\'');
            (caps[1].replace('"', ""), value.to_string())
        })
        .collect()
}

/// Read and parse an environment file.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let env = parse_env(&content.lines().collect::<Vec<_>>());
    debug!("Read {} variables from {}", env.len(), path.display());
    Ok(env)
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;
    use std::io::Write;

    #[test]
    fn only_exports() {
        assert_eq!(
            parse_env(&["export x=2", "export y=3", "z=4"]),
            btreemap! {"x".to_string() => "2".to_string(), "y".to_string() => "3".to_string()}
        );
    }

    #[test]
    fn quotes_are_removed() {
        let env = parse_env(&[
            "# comment",
            "export OS_PASSWORD=\"secret\"",
            "export OS_AUTH_URL='http://controller:5000/v2.0'",
            "export OS_EMPTY=",
        ]);
        assert_eq!(env.len(), 2);
        assert_eq!(env["OS_PASSWORD"], "secret");
        assert_eq!(env["OS_AUTH_URL"], "http://controller:5000/v2.0");
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "unset OS_TOKEN").unwrap();
        writeln!(file, "export OS_USERNAME=admin").unwrap();
        writeln!(file, "export OS_TENANT_NAME=demo").unwrap();
        let env = load_env_file(file.path()).unwrap();
        assert_eq!(
            env,
            btreemap! {
                "OS_USERNAME".to_string() => "admin".to_string(),
                "OS_TENANT_NAME".to_string() => "demo".to_string(),
            }
        );
        assert!(load_env_file("/nonexistent/admin-openrc.sh").is_err());
    }
}
