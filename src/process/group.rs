// src/process/group.rs
//! Process group manager
//!
//! A [`ProcessContext`] spawns agent processes and guarantees every one of
//! them is eventually joined. Spawning re-executes the current binary,
//! optionally under a launcher program, with the serialized command riding
//! in the child's environment; the child's bootstrap recognizes it and runs
//! it instead of ordinary startup.
//!
//! The tracked set is mutex-protected because multiple bulk-execute calls
//! may spawn concurrently from one requesting process. `wait` drains and
//! joins; dropping the context does the same, so handles cannot leak.

use crate::bootstrap::{self, Runnable, ACTIVE_MESSAGE_ENV};
use crate::ipc::future::{InterprocessFuture, InterprocessPromise};
use crate::process::inspect;
use crate::utils::config::CohortConfig;
use crate::utils::errors::{CohortError, Result};
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::{debug, error, warn};

/// How agent processes get started
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Launcher program the agent binary runs under, if any
    pub launcher: Option<PathBuf>,

    /// Arguments passed to the launcher ahead of the agent binary path
    pub launcher_args: Vec<String>,

    /// Arguments passed to the agent binary itself
    pub program_args: Vec<String>,
}

impl SpawnOptions {
    /// Direct re-execution of the current binary, no launcher
    pub fn direct() -> Self {
        Self::default()
    }

    /// Build options from configuration, resolving a non-absolute launcher
    /// through PATH
    pub fn from_config(config: &CohortConfig) -> Result<Self> {
        let launcher = match &config.launcher {
            Some(name) => Some(resolve_launcher(name)?),
            None => None,
        };
        Ok(Self {
            launcher,
            launcher_args: config.launcher_args.clone(),
            program_args: vec![],
        })
    }

    /// Options for spawning out of a test harness binary.
    ///
    /// The child is a libtest binary, so dispatch has to be routed through
    /// the entry generated by `bootstrap_entry!`: the extra arguments make
    /// the harness run exactly that test.
    pub fn for_tests() -> Self {
        Self {
            launcher: None,
            launcher_args: vec![],
            program_args: vec![
                "cohort_bootstrap_entry".to_string(),
                "--exact".to_string(),
                "--test-threads=1".to_string(),
                "--nocapture".to_string(),
            ],
        }
    }
}

fn resolve_launcher(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    which::which(name).map_err(|e| {
        CohortError::ProcessSpawnFailed(format!("launcher '{}' not found in PATH: {}", name, e))
    })
}

/// A single-process unit of work for [`ProcessContext::twoway_execute`]:
/// runs in the spawned process and reports one result back through a pipe
pub trait Job: Serialize + DeserializeOwned + 'static {
    type Output: Serialize + DeserializeOwned + Send + 'static;

    fn run(self) -> Result<Self::Output>;
}

/// Wrapper command that runs a job and writes its outcome to the inherited
/// pipe write end
#[derive(Serialize, Deserialize)]
pub(crate) struct PipeReply<J> {
    job: J,
    fd: RawFd,
}

impl<J: Job> Runnable for PipeReply<J> {
    fn exec(self) -> Result<()> {
        // SAFETY: fd is the write end of a pipe the spawning process created
        // for this child and left inheritable; this process is its sole
        // owner.
        let promise = unsafe { InterprocessPromise::<J::Output>::from_inherited_fd(self.fd) };

        match self.job.run() {
            Ok(value) => promise.set_value(&value),
            Err(e) => {
                error!("job failed: {}", e);
                promise.set_error(&e.to_string())
            }
        }
    }
}

/// Register a job type so spawned processes can decode and run it
pub fn register_job<J: Job>() {
    bootstrap::register::<PipeReply<J>>();
}

/// Tracks all processes spawned through it and joins them at teardown
pub struct ProcessContext {
    children: Mutex<Vec<Child>>,
}

impl ProcessContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self {
            children: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one agent process carrying `command`.
    ///
    /// The child re-executes this process's own binary (under the launcher,
    /// when one is configured) with the serialized command in its
    /// environment. Returns the child's pid.
    pub fn execute<R: Runnable>(&self, options: &SpawnOptions, command: &R) -> Result<u32> {
        let encoded = bootstrap::encode(command)?;
        let program = inspect::current_executable()?;

        let mut cmd = match &options.launcher {
            Some(launcher) => {
                let mut cmd = Command::new(launcher);
                cmd.args(&options.launcher_args);
                cmd.arg(&program);
                cmd
            }
            None => Command::new(&program),
        };
        cmd.args(&options.program_args);
        cmd.env(ACTIVE_MESSAGE_ENV, encoded);

        let child = cmd.spawn().map_err(|e| {
            CohortError::ProcessSpawnFailed(format!("spawn of {:?} failed: {}", program, e))
        })?;
        let pid = child.id();
        debug!("spawned agent process pid {}", pid);

        self.children.lock().push(child);
        Ok(pid)
    }

    /// Spawn one process running `job` and return a future for its result.
    ///
    /// A private pipe is created before the spawn; the parent's read end is
    /// marked close-on-exec so it never leaks into the child, and the child
    /// inherits the write end, reporting through it when the job finishes.
    pub fn twoway_execute<J: Job>(
        &self,
        options: &SpawnOptions,
        job: J,
    ) -> Result<InterprocessFuture<J::Output>> {
        let (read_end, write_end) = nix::unistd::pipe()?;

        // keep the read end out of the spawned process
        let flags = fcntl(read_end.as_raw_fd(), FcntlArg::F_GETFD)?;
        let flags = FdFlag::from_bits_retain(flags) | FdFlag::FD_CLOEXEC;
        fcntl(read_end.as_raw_fd(), FcntlArg::F_SETFD(flags))?;

        let wrapped = PipeReply {
            job,
            fd: write_end.as_raw_fd(),
        };
        self.execute(options, &wrapped)?;

        // close our copy of the write end; the child now holds the only one
        drop(unsafe { File::from_raw_fd(write_end) });

        Ok(InterprocessFuture::from_pipe(unsafe {
            File::from_raw_fd(read_end)
        }))
    }

    /// Join every tracked process and clear the tracked set.
    ///
    /// Returns how many processes were joined. Idempotent: calling again
    /// with no intervening spawns joins zero.
    pub fn wait(&self) -> Result<usize> {
        let drained: Vec<Child> = {
            let mut children = self.children.lock();
            children.drain(..).collect()
        };

        let joined = drained.len();
        for mut child in drained {
            let pid = child.id();
            let status = child.wait()?;
            debug!("joined agent process pid {} ({})", pid, status);
        }
        Ok(joined)
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessContext {
    fn drop(&mut self) {
        if let Err(e) = self.wait() {
            warn!("join at context teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_is_idempotent_on_empty_context() {
        let context = ProcessContext::new();
        assert_eq!(context.wait().unwrap(), 0);
        assert_eq!(context.wait().unwrap(), 0);
    }

    #[test]
    fn test_resolve_launcher_absolute_passthrough() {
        let resolved = resolve_launcher("/usr/bin/env").unwrap();
        assert_eq!(resolved, PathBuf::from("/usr/bin/env"));
    }

    #[test]
    fn test_resolve_launcher_missing_program() {
        assert!(resolve_launcher("definitely-not-a-real-launcher").is_err());
    }

    #[test]
    fn test_spawn_options_for_tests_target_the_entry() {
        let options = SpawnOptions::for_tests();
        assert!(options
            .program_args
            .contains(&"cohort_bootstrap_entry".to_string()));
        assert!(options.program_args.contains(&"--exact".to_string()));
    }
}
