use crate::error::CommandError;
use indexmap::IndexMap;
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Remote name -> URL of one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Remotes(IndexMap<String, String>);

impl Remotes {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse `git remote -v` output. Fetch and push lines of one remote collapse
    /// into a single entry, later lines overwriting earlier ones.
    pub fn parse(output: &str) -> Self {
        let mut remotes = IndexMap::new();
        for line in output.lines() {
            let first = line.split(' ').next().unwrap_or_default();
            if let Some((name, url)) = first.split_once('\t') {
                remotes.insert(name.to_string(), url.to_string());
            }
        }
        Self(remotes)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Anything that can report the remotes of a directory
pub trait RemoteSource {
    fn remotes(&self, dir: &Path) -> Remotes;
}

/// Lists remotes by running `git remote -v` inside a directory
#[derive(Debug, Clone)]
pub struct GitRemoteInspector {
    program: OsString,
    timeout: Duration,
}

impl GitRemoteInspector {
    pub fn new() -> Self {
        Self {
            program: OsString::from("git"),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Remotes of `dir`, or no remotes at all when git cannot tell.
    ///
    /// A directory outside any repository, a missing git binary or a hung
    /// invocation must not abort a scan, so every failure ends up empty here.
    pub fn list_remotes(&self, dir: &Path) -> Remotes {
        self.try_list_remotes(dir).unwrap_or_else(|e| {
            debug!("No remotes for {}: {}", dir.display(), e);
            Remotes::empty()
        })
    }

    pub fn try_list_remotes(&self, dir: &Path) -> Result<Remotes, CommandError> {
        let child = Command::new(&self.program)
            .args(["remote", "-v"])
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                dir: dir.to_path_buf(),
                source,
            })?;
        let mut child = ChildGuard::new(child);

        let wait_error = |source| CommandError::Wait {
            dir: dir.to_path_buf(),
            source,
        };

        let start = Instant::now();
        loop {
            if child.try_wait().map_err(wait_error)?.is_some() {
                break;
            }
            if start.elapsed() > self.timeout {
                return Err(CommandError::Timeout {
                    dir: dir.to_path_buf(),
                    timeout: self.timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let output = child.into_output().map_err(wait_error)?;
        if !output.status.success() {
            return Err(CommandError::Exit {
                dir: dir.to_path_buf(),
                code: output.status.code(),
            });
        }
        Ok(Remotes::parse(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for GitRemoteInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteSource for GitRemoteInspector {
    fn remotes(&self, dir: &Path) -> Remotes {
        self.list_remotes(dir)
    }
}

/// Owns a spawned process and kills and reaps it on every early exit
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Ok(None),
        }
    }

    fn into_output(mut self) -> io::Result<Output> {
        match self.child.take() {
            Some(child) => child.wait_with_output(),
            None => Err(io::Error::other("process already reaped")),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
