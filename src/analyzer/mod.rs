pub mod git_remotes;
pub mod gitmodules;
pub mod ini_parser;
pub mod php_parser;

use crate::error::{ExtractError, Result};
use encoding_rs::Encoding;
use indexmap::IndexMap;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// File whose presence marks an installation root
pub const INSTALLATION_MARKER: &str = "ilias.php";
/// File whose presence marks a plugin directory
pub const PLUGIN_MARKER: &str = "plugin.php";

pub const ILIAS_INI: &str = "ilias.ini.php";
pub const CLIENT_INI: &str = "client.ini.php";
pub const GITMODULES: &str = ".gitmodules";
pub const VERSION_FILE: &str = "include/inc.ilias_version.php";
/// Directory whose presence marks a git checkout
pub const GIT_DIR: &str = ".git";

/// Plugins live below this subpath, so installation search never enters it
const CUSTOMIZING_EXCLUSION: &str = "Customizing/global";
const BASE_EXCLUSIONS: &[&str] = &["_Examples"];

/// Paths of the files that get parsed for one installation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzableFiles {
    pub gitmodules: PathBuf,
    pub ilias_ini: PathBuf,
    pub version: PathBuf,
    /// Every client.ini.php below the installation, in walk order
    pub client_inis: Vec<PathBuf>,
}

impl AnalyzableFiles {
    fn collect(installation: &Path) -> Self {
        Self {
            gitmodules: installation.join(GITMODULES),
            ilias_ini: installation.join(ILIAS_INI),
            version: installation.join(VERSION_FILE),
            client_inis: find_files_named(installation, CLIENT_INI, &[]).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredInstallation {
    pub files: AnalyzableFiles,
    /// Plugin directory name -> path of its plugin.php
    pub plugins: IndexMap<String, PathBuf>,
}

/// Discovers installations and their plugins below a root directory
#[derive(Debug, Clone)]
pub struct InstallationFinder {
    excluded: Vec<String>,
    installations: IndexMap<PathBuf, DiscoveredInstallation>,
}

impl InstallationFinder {
    pub fn new() -> Self {
        Self::with_exclusions(Vec::<String>::new())
    }

    /// Create a finder whose base exclusions are extended by `extra`
    pub fn with_exclusions<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut excluded: Vec<String> = BASE_EXCLUSIONS.iter().map(|s| s.to_string()).collect();
        excluded.extend(extra.into_iter().map(Into::into));
        Self {
            excluded,
            installations: IndexMap::new(),
        }
    }

    /// Run both discovery passes over `root`
    pub fn scan(&mut self, root: &Path, extra: &[String]) -> usize {
        self.find_installations(root, extra);
        self.find_plugins(root, extra);
        self.installations.len()
    }

    /// Recursively search `root` for installations, returning every root found in this pass.
    ///
    /// A relative root is resolved against the working directory first, so
    /// exclusions always see absolute paths. An installation that is already
    /// known keeps its recorded files and plugins.
    pub fn find_installations(&mut self, root: &Path, extra: &[String]) -> Vec<PathBuf> {
        let root = absolute_root(root);
        let root = root.as_path();
        let mut excluded = self.active_exclusions(extra);
        excluded.push(CUSTOMIZING_EXCLUSION.to_string());

        let mut found = Vec::new();
        for marker in find_files_named(root, INSTALLATION_MARKER, &excluded) {
            let Some(installation) = marker.parent().map(Path::to_path_buf) else {
                continue;
            };
            if !self.installations.contains_key(&installation) {
                debug!("Found installation: {}", installation.display());
                let discovered = DiscoveredInstallation {
                    files: AnalyzableFiles::collect(&installation),
                    plugins: IndexMap::new(),
                };
                self.installations.insert(installation.clone(), discovered);
            }
            found.push(installation);
        }
        found
    }

    /// Recursively search `root` for plugin directories and attach each one to the
    /// installations that contain it. Plugins outside every known installation are
    /// still returned, just not attached anywhere.
    pub fn find_plugins(&mut self, root: &Path, extra: &[String]) -> Vec<PathBuf> {
        let root = absolute_root(root);
        let root = root.as_path();
        let excluded = self.active_exclusions(extra);

        let mut found = Vec::new();
        for manifest in find_files_named(root, PLUGIN_MARKER, &excluded) {
            let Some(plugin_dir) = manifest.parent().map(Path::to_path_buf) else {
                continue;
            };
            let name = plugin_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            for (installation, discovered) in self.installations.iter_mut() {
                if plugin_dir.starts_with(installation) {
                    debug!("Found plugin {} in {}", name, installation.display());
                    discovered
                        .plugins
                        .entry(name.clone())
                        .or_insert_with(|| manifest.clone());
                }
            }
            found.push(plugin_dir);
        }
        found
    }

    /// Snapshot of everything discovered so far
    pub fn installations(&self) -> &IndexMap<PathBuf, DiscoveredInstallation> {
        &self.installations
    }

    fn active_exclusions(&self, extra: &[String]) -> Vec<String> {
        let mut excluded = self.excluded.clone();
        excluded.extend(extra.iter().cloned());
        excluded
    }
}

impl Default for InstallationFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields each discovered installation exactly once, in discovery order
impl IntoIterator for InstallationFinder {
    type Item = (PathBuf, DiscoveredInstallation);
    type IntoIter = indexmap::map::IntoIter<PathBuf, DiscoveredInstallation>;

    fn into_iter(self) -> Self::IntoIter {
        self.installations.into_iter()
    }
}

fn absolute_root(root: &Path) -> PathBuf {
    std::path::absolute(root).unwrap_or_else(|e| {
        debug!("Cannot resolve {}: {}", root.display(), e);
        root.to_path_buf()
    })
}

/// Whether a directory path contains any of the exclusion substrings
pub fn is_excluded(path: &Path, excluded: &[String]) -> bool {
    let path = path.to_string_lossy();
    excluded.iter().any(|pattern| path.contains(pattern.as_str()))
}

/// Walk `root` and yield every file called `file_name`, skipping excluded directories
/// together with everything below them
pub fn find_files_named<'a>(
    root: &'a Path,
    file_name: &'a str,
    excluded: &'a [String],
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| !(entry.file_type().is_dir() && is_excluded(entry.path(), excluded)))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(move |entry| is_named(entry, file_name))
        .map(DirEntry::into_path)
}

/// Every directory below `root` (itself included) that holds a `.git` directory,
/// in walk order. The walk does not descend into `.git` itself.
pub fn find_repositories(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != GIT_DIR || entry.depth() == 0)
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir() && entry.path().join(GIT_DIR).is_dir())
        .map(DirEntry::into_path)
}

fn is_named(entry: &DirEntry, file_name: &str) -> bool {
    entry.file_type().is_file() && entry.file_name() == file_name
}

/// Read a file's raw bytes, reporting a missing file as `NotFound`
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a file's content as a string in the given encoding
pub fn read_text(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let bytes = read_bytes(path)?;
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| ExtractError::Decode {
            path: path.to_path_buf(),
            encoding: encoding.name(),
        })
}

/// Read a file's content as UTF-8
pub fn read_file(path: &Path) -> Result<String> {
    read_text(path, encoding_rs::UTF_8)
}
