pub mod aggregator;
pub mod json_writer;

use crate::analyzer::git_remotes::Remotes;
use crate::analyzer::gitmodules::Submodules;
use crate::analyzer::ini_parser::IniDocument;
use crate::analyzer::php_parser::PluginManifest;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// Installation path -> everything learned about it
pub type Inventory = IndexMap<PathBuf, InstallationRecord>;

/// Repository directory -> its remotes
pub type Repositories = IndexMap<PathBuf, Remotes>;

/// Manifest names that would collide with the record's own keys
const RESERVED_FIELDS: &[&str] = &["source_file", "remotes"];

/// Metadata of one plugin directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRecord {
    #[serde(serialize_with = "crate::serde_paths::lossy")]
    pub source_file: PathBuf,
    /// Whatever literal declarations the manifest contains
    #[serde(flatten)]
    pub declared_fields: IndexMap<String, String>,
    pub remotes: Remotes,
}

impl PluginRecord {
    pub fn new(source_file: impl Into<PathBuf>, remotes: Remotes) -> Self {
        Self {
            source_file: source_file.into(),
            declared_fields: IndexMap::new(),
            remotes,
        }
    }

    pub fn from_manifest(manifest: PluginManifest, remotes: Remotes) -> Self {
        let mut declared_fields = manifest.fields;
        for reserved in RESERVED_FIELDS {
            if declared_fields.shift_remove(*reserved).is_some() {
                debug!("Dropping ${} of {}", reserved, manifest.source_file.display());
            }
        }
        Self {
            source_file: manifest.source_file,
            declared_fields,
            remotes,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.declared_fields.get(name).map(String::as_str)
    }
}

/// Everything collected for one installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationRecord {
    #[serde(serialize_with = "crate::serde_paths::lossy")]
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub remotes: Remotes,
    /// Every git checkout below the installation, the root included
    #[serde(serialize_with = "crate::serde_paths::lossy_keys")]
    pub contained_repositories: Repositories,
    #[serde(rename = "ilias.ini.php", skip_serializing_if = "Option::is_none")]
    pub server_config: Option<IniDocument>,
    #[serde(rename = "client.ini.php")]
    pub client_configs: Vec<IniDocument>,
    #[serde(rename = "plugin.php")]
    pub plugins: Vec<PluginRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submodules: Option<Submodules>,
}

/// Accumulates one installation's record across parse calls.
///
/// The orchestrator creates one builder per installation and calls
/// [`InstallationBuilder::finalize`] once it has fed it every file.
#[derive(Debug, Default)]
pub struct InstallationBuilder {
    path: PathBuf,
    version: Option<String>,
    remotes: Remotes,
    contained_repositories: Repositories,
    server_config: Option<IniDocument>,
    client_configs: Vec<IniDocument>,
    plugins: Vec<PluginRecord>,
    submodules: Option<Submodules>,
}

impl InstallationBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn set_version(&mut self, version: String) -> &mut Self {
        self.version = Some(version);
        self
    }

    pub fn set_remotes(&mut self, remotes: Remotes) -> &mut Self {
        self.remotes = remotes;
        self
    }

    pub fn set_contained_repositories(&mut self, repositories: Repositories) -> &mut Self {
        self.contained_repositories = repositories;
        self
    }

    pub fn set_server_config(&mut self, config: IniDocument) -> &mut Self {
        self.server_config = Some(config);
        self
    }

    pub fn push_client_config(&mut self, config: IniDocument) -> &mut Self {
        self.client_configs.push(config);
        self
    }

    pub fn push_plugin(&mut self, plugin: PluginRecord) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    pub fn set_submodules(&mut self, submodules: Submodules) -> &mut Self {
        self.submodules = Some(submodules);
        self
    }

    /// Turn the accumulated state into a record. A builder without a path yields nothing.
    pub fn finalize(self) -> Option<InstallationRecord> {
        if self.path.as_os_str().is_empty() {
            return None;
        }
        Some(InstallationRecord {
            path: self.path,
            version: self.version,
            remotes: self.remotes,
            contained_repositories: self.contained_repositories,
            server_config: self.server_config,
            client_configs: self.client_configs,
            plugins: self.plugins,
            submodules: self.submodules,
        })
    }
}
