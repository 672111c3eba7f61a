use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Failures while turning one installation file into a record
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Could not decode {} as {encoding}", .path.display())]
    Decode { path: PathBuf, encoding: &'static str },

    #[error("Invalid INI selection: {0}")]
    Config(String),

    #[error("No version literal found in {}", .0.display())]
    VersionNotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of an external `git` invocation
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to spawn git in {}: {source}", .dir.display())]
    Spawn {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git exited with {code:?} in {}", .dir.display())]
    Exit { dir: PathBuf, code: Option<i32> },

    #[error("git timed out after {timeout:?} in {}", .dir.display())]
    Timeout { dir: PathBuf, timeout: Duration },

    #[error("Failed to wait for git in {}: {source}", .dir.display())]
    Wait {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
