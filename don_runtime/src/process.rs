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

//! Execution of local processes, both in the foreground and as background process groups.

use don::catalog::{normalize_output, CommandLine};
use don::{Error, Result};

use log::*;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::Duration;

/// Time given to a background process after `SIGTERM`, before it is killed.
const TERMINATE_GRACE_MS: u64 = 200;

/// Host on which shell commands are executed, either in the foreground (waiting for the result),
/// or in the background (writing the output into a log file).
pub trait ProcessHost {
    /// Run a shell command, wait for it to finish and return its combined output. A non-zero
    /// exit status results in [`Error::ExternalCommand`].
    fn run(&mut self, cmd: &str) -> Result<String>;

    /// Start a shell command in the background, writing stdout and stderr to `log`.
    fn spawn(&mut self, cmd: &str, log: &Path) -> Result<Box<dyn BackgroundProcess>>;

    /// Wait for background processes to make progress.
    fn settle(&mut self, duration: Duration);
}

/// Handle to a process running in the background.
pub trait BackgroundProcess: fmt::Debug {
    /// OS process id
    fn id(&self) -> u32;

    /// Stop the process. A process that has already exited counts as terminated.
    fn terminate(&mut self) -> Result<()>;
}

/// Run a command line on the local machine, with the given extra environment variables. Returns
/// the combined stdout and stderr, with tabs replaced by four spaces.
pub fn run_command(line: &CommandLine, env: &BTreeMap<String, String>) -> Result<String> {
    let cmd_str = line.to_string();
    let mut command = match line {
        CommandLine::Argv(argv) => match argv.split_first() {
            Some((program, args)) => {
                let mut c = Command::new(program);
                c.args(args);
                c
            }
            None => {
                return Err(Error::Spawn {
                    cmd: cmd_str,
                    source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
                })
            }
        },
        CommandLine::Shell(s) => {
            let mut c = Command::new("sh");
            c.arg("-c").arg(s);
            c
        }
    };
    command.envs(env);
    debug!("Running: {}", cmd_str);
    let output = command.output().map_err(|source| Error::Spawn { cmd: cmd_str.clone(), source })?;
    check_output(cmd_str, output)
}

/// Combine stdout and stderr of a finished process, and turn a non-zero exit status into an
/// error.
pub(crate) fn check_output(cmd: String, output: Output) -> Result<String> {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let text = normalize_output(&text);
    if output.status.success() {
        Ok(text)
    } else {
        Err(Error::ExternalCommand { cmd, status: output.status.to_string(), output: text })
    }
}

/// Processes running on the local machine.
#[derive(Debug, Default, Clone)]
pub struct LocalHost {}

impl LocalHost {
    /// Create a new local host
    pub fn new() -> Self {
        Self {}
    }
}

impl ProcessHost for LocalHost {
    fn run(&mut self, cmd: &str) -> Result<String> {
        run_command(&CommandLine::shell(cmd), &BTreeMap::new())
    }

    fn spawn(&mut self, cmd: &str, log: &Path) -> Result<Box<dyn BackgroundProcess>> {
        let stdout = File::create(log)?;
        let stderr = stdout.try_clone()?;
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd).stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        // own process group, such that sudo and its children can be signalled together
        command.process_group(0);
        let child =
            command.spawn().map_err(|source| Error::Spawn { cmd: cmd.to_string(), source })?;
        debug!("Started pid {}: {}", child.id(), cmd);
        Ok(Box::new(LocalProcess { cmd: cmd.to_string(), child }))
    }

    fn settle(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Background process on the local machine.
#[derive(Debug)]
pub struct LocalProcess {
    cmd: String,
    child: Child,
}

impl BackgroundProcess for LocalProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn terminate(&mut self) -> Result<()> {
        if let Some(status) = self.child.try_wait()? {
            debug!("pid {} already exited with {}", self.child.id(), status);
            return Ok(());
        }
        // the exit status is ignored, a vanished group is fine
        let signalled = Command::new("kill")
            .args(&["-TERM", "--", &format!("-{}", self.child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = signalled {
            warn!("Cannot signal the group of pid {}: {}", self.child.id(), e);
        }
        thread::sleep(Duration::from_millis(TERMINATE_GRACE_MS));
        if self.child.try_wait()?.is_none() {
            match self.child.kill() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => return Err(e.into()),
            }
            self.child.wait()?;
        }
        debug!("Terminated pid {}: {}", self.child.id(), self.cmd);
        Ok(())
    }
}

/// Group of background processes. All members are terminated when the group is dropped.
#[derive(Debug, Default)]
pub struct ProcessGroup {
    members: Vec<(String, Box<dyn BackgroundProcess>)>,
}

impl ProcessGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process to the group, with a name used for logging.
    pub fn push(&mut self, name: impl Into<String>, process: Box<dyn BackgroundProcess>) {
        self.members.push((name.into(), process));
    }

    /// Number of processes in the group
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the group is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Terminate all processes of the group. Errors are logged, and the remaining processes are
    /// still terminated. Returns the number of processes that could not be terminated.
    pub fn terminate_all(&mut self) -> usize {
        let mut failed = 0;
        for (name, mut process) in self.members.drain(..) {
            if let Err(e) = process.terminate() {
                warn!("Could not terminate {} (pid {}): {}", name, process.id(), e);
                failed += 1;
            }
        }
        failed
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if !self.members.is_empty() {
            self.terminate_all();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Fake {
        id: u32,
        fail: bool,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl BackgroundProcess for Fake {
        fn id(&self) -> u32 {
            self.id
        }

        fn terminate(&mut self) -> Result<()> {
            self.log.borrow_mut().push(self.id);
            if self.fail {
                Err(Error::LoginFailed("fake".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn group_terminates_everything() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut group = ProcessGroup::new();
        group.push("a", Box::new(Fake { id: 1, fail: false, log: log.clone() }));
        group.push("b", Box::new(Fake { id: 2, fail: true, log: log.clone() }));
        group.push("c", Box::new(Fake { id: 3, fail: false, log: log.clone() }));
        assert_eq!(group.len(), 3);
        assert_eq!(group.terminate_all(), 1);
        assert!(group.is_empty());
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn group_terminates_on_drop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut group = ProcessGroup::new();
            group.push("a", Box::new(Fake { id: 7, fail: false, log: log.clone() }));
        }
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn run_shell_command() {
        let env = maplit::btreemap! {"DON_TEST".to_string() => "a\tb".to_string()};
        let out = run_command(&CommandLine::shell("echo \"$DON_TEST\"; echo err >&2"), &env).unwrap();
        assert_eq!(out, "a    b\nerr\n");
    }

    #[test]
    fn run_failing_command() {
        match run_command(&CommandLine::argv("false"), &BTreeMap::new()) {
            Err(Error::ExternalCommand { cmd, .. }) => assert_eq!(cmd, "false"),
            r => panic!("unexpected result: {:?}", r),
        }
        match run_command(&CommandLine::Argv(vec![]), &BTreeMap::new()) {
            Err(Error::Spawn { .. }) => {}
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn background_process_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.txt");
        let mut host = LocalHost::new();
        let mut group = ProcessGroup::new();
        group.push("echo", host.spawn("echo hello", &log).unwrap());
        group.push("sleep", host.spawn("sleep 30", &dir.path().join("sleep.txt")).unwrap());
        host.settle(Duration::from_millis(300));
        assert_eq!(group.terminate_all(), 0);
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "hello\n");
    }

    #[test]
    fn terminate_reaches_children() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("late.txt");
        let mut host = LocalHost::new();
        let mut process = host.spawn("(sleep 1; echo late) & wait", &log).unwrap();
        host.settle(Duration::from_millis(200));
        process.terminate().unwrap();
        host.settle(Duration::from_millis(1500));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
    }
}
