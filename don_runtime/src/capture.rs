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

//! Packet captures with `tcpdump`

use lazy_static::lazy_static;
use regex::Regex;

use std::path::{Path, PathBuf};

lazy_static! {
    static ref CAPTURED: Regex = Regex::new(r"(\d+)\s+packets? captured").unwrap();
}

/// Command line capturing `count` ICMP packets on `dev`, optionally inside a namespace.
pub fn tcpdump_command(dev: &str, namespace: Option<&str>, count: u32) -> String {
    match namespace {
        Some(ns) => format!("sudo ip netns exec {} tcpdump -v icmp -i {} -c {} -l", ns, dev, count),
        None => format!("sudo tcpdump -v icmp -i {} -c {} -l", dev, count),
    }
}

/// Name of the capture file of `dev`, for the side `tag` (`src`, `dst` or `net`).
pub fn capture_file(dir: &Path, tag: &str, dev: &str) -> PathBuf {
    dir.join(format!("{}.tcpdump.{}.txt", tag, dev))
}

/// Number of captured packets, as reported by tcpdump when it exits. `None` if tcpdump did not
/// report anything (e.g. it was killed before, or never started).
pub fn parse_captured(output: &str) -> Option<u32> {
    output.lines().find_map(|l| CAPTURED.captures(l)).and_then(|caps| caps[1].parse().ok())
}
