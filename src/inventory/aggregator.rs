use super::{InstallationBuilder, InstallationRecord, Inventory, PluginRecord, Repositories};
use crate::analyzer::git_remotes::{GitRemoteInspector, RemoteSource};
use crate::analyzer::gitmodules::parse_gitmodules;
use crate::analyzer::ini_parser::{parse_ini_file_as, IniDocument};
use crate::analyzer::php_parser::{parse_plugin_manifest, parse_version_file};
use crate::analyzer::{find_repositories, DiscoveredInstallation, InstallationFinder};
use crate::config::IniSelections;
use crate::error::{ExtractError, Result};
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What INI files and manifests are retried with when they are not valid UTF-8
/// (the WHATWG mapping of the ISO-8859-1 label)
fn fallback_encoding() -> &'static Encoding {
    encoding_rs::WINDOWS_1252
}

/// Parses every discovered installation and merges the results into one inventory
pub struct InstallationAggregator<R: RemoteSource = GitRemoteInspector> {
    remote_source: R,
    selections: IniSelections,
    results: Inventory,
}

impl InstallationAggregator<GitRemoteInspector> {
    pub fn new() -> Self {
        Self::with_remote_source(GitRemoteInspector::new())
    }
}

impl Default for InstallationAggregator<GitRemoteInspector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RemoteSource> InstallationAggregator<R> {
    pub fn with_remote_source(remote_source: R) -> Self {
        Self {
            remote_source,
            selections: IniSelections::default(),
            results: Inventory::new(),
        }
    }

    pub fn with_selections(mut self, selections: IniSelections) -> Self {
        self.selections = selections;
        self
    }

    /// Analyze every installation the finder discovered, in its discovery order.
    ///
    /// An installation already in the inventory keeps its first record.
    pub fn process_discovered(&mut self, finder: InstallationFinder) -> Inventory {
        for (path, discovered) in finder {
            if self.results.contains_key(&path) {
                debug!("Already analyzed {}", path.display());
                continue;
            }
            info!("Analyzing installation in {}", path.display());
            if let Some(record) = self.analyze_installation(&path, &discovered) {
                self.commit(record);
            }
        }
        self.results()
    }

    /// Everything committed so far
    pub fn results(&self) -> Inventory {
        self.results.clone()
    }

    /// Build the record of one installation. Files that are missing or fail to
    /// parse leave their field empty without affecting the rest.
    pub fn analyze_installation(
        &self,
        path: &Path,
        discovered: &DiscoveredInstallation,
    ) -> Option<InstallationRecord> {
        let files = &discovered.files;
        let mut builder = InstallationBuilder::new(path);

        let server_ini = &files.ilias_ini;
        if let Some(config) = skip_on_error(
            with_fallback(server_ini, |encoding| {
                parse_ini_file_as(server_ini, &self.selections.ilias_ini, encoding)
            }),
            "server config",
        ) {
            builder.set_server_config(config);
        }
        if let Some(submodules) = skip_on_error(parse_gitmodules(&files.gitmodules), "submodules") {
            builder.set_submodules(submodules);
        }
        if let Some(version) = skip_on_error(parse_version_file(&files.version), "version") {
            builder.set_version(version);
        }

        // One entry per discovered client file, even when it cannot be parsed
        for client_ini in &files.client_inis {
            let config = skip_on_error(
                with_fallback(client_ini, |encoding| {
                    parse_ini_file_as(client_ini, &self.selections.client_ini, encoding)
                }),
                "client config",
            )
            .unwrap_or_else(|| IniDocument::empty(client_ini));
            builder.push_client_config(config);
        }

        builder.set_remotes(self.remote_source.remotes(path));
        builder.set_contained_repositories(self.contained_repositories(path));

        for (name, manifest) in &discovered.plugins {
            debug!("Analyzing plugin {}", name);
            builder.push_plugin(self.analyze_plugin(manifest));
        }

        builder.finalize()
    }

    /// Parse one plugin.php and attach the remotes of its directory
    pub fn analyze_plugin(&self, manifest_path: &Path) -> PluginRecord {
        let plugin_dir = manifest_path.parent().unwrap_or(manifest_path);
        let remotes = self.remote_source.remotes(plugin_dir);

        let manifest = with_fallback(manifest_path, |encoding| {
            parse_plugin_manifest(manifest_path, encoding)
        });
        match skip_on_error(manifest, "plugin manifest") {
            Some(manifest) => PluginRecord::from_manifest(manifest, remotes),
            None => PluginRecord::new(manifest_path, remotes),
        }
    }

    /// Remotes of every git checkout below `path`
    pub fn contained_repositories(&self, path: &Path) -> Repositories {
        find_repositories(path)
            .map(|repo| {
                let remotes = self.remote_source.remotes(&repo);
                (repo, remotes)
            })
            .collect()
    }

    fn commit(&mut self, record: InstallationRecord) -> bool {
        if self.results.contains_key(&record.path) {
            return false;
        }
        self.results.insert(record.path.clone(), record);
        true
    }

    pub fn committed_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.keys()
    }
}

/// Run `parse` as UTF-8, retrying once with the fallback encoding on a decode failure
fn with_fallback<T>(path: &Path, parse: impl Fn(&'static Encoding) -> Result<T>) -> Result<T> {
    match parse(encoding_rs::UTF_8) {
        Err(ExtractError::Decode { .. }) => {
            let fallback = fallback_encoding();
            debug!("Retrying {} as {}", path.display(), fallback.name());
            parse(fallback)
        }
        other => other,
    }
}

fn skip_on_error<T>(result: Result<T>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ExtractError::NotFound(path)) => {
            debug!("No {} at {}", what, path.display());
            None
        }
        Err(e) => {
            warn!("Skipping {}: {}", what, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::git_remotes::Remotes;
    use crate::analyzer::test_support::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    /// Reports one fixed remote for every directory and remembers what it was asked
    #[derive(Default)]
    struct FakeRemotes {
        asked: RefCell<Vec<PathBuf>>,
    }

    impl RemoteSource for FakeRemotes {
        fn remotes(&self, dir: &Path) -> Remotes {
            self.asked.borrow_mut().push(dir.to_path_buf());
            Remotes::parse(&format!("origin\thttps://git.example.org/{} (fetch)\n", dir.display()))
        }
    }

    fn scan(root: &Path) -> InstallationFinder {
        let mut finder = InstallationFinder::new();
        finder.scan(root, &[]);
        finder
    }

    #[test]
    fn test_full_installation() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        write(&ilias.join("data/second/client.ini.php"), CLIENT_INI_TEXT);
        let plugin = fake_plugin(&ilias, "UserTakeOver");

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let inventory = aggregator.process_discovered(scan(temp.path()));

        assert_eq!(inventory.len(), 1);
        let record = &inventory[&ilias];
        assert_eq!(record.path, ilias);
        assert_eq!(record.version.as_deref(), Some("7.12"));
        assert_eq!(record.client_configs.len(), 2);
        assert_eq!(record.submodules.as_ref().map(|s| s.len()), Some(3));

        let server = record.server_config.as_ref().unwrap();
        assert_eq!(server.get("server", "http_path"), Some("https://ilias.example.org"));
        assert_eq!(server.get("server", "timezone"), None);
        assert_eq!(server.get("clients", "default"), Some("main"));

        let client = &record.client_configs[0];
        assert_eq!(client.get("db", "user"), Some("ilias_user"));
        assert_eq!(client.get("layout", "style"), Some("delos"));
        assert!(client.sections["session"].is_empty());

        assert_eq!(record.plugins.len(), 1);
        let plugin_record = &record.plugins[0];
        assert_eq!(plugin_record.source_file, plugin.join("plugin.php"));
        assert_eq!(plugin_record.field("version"), Some("1.1.0"));
        assert_eq!(
            plugin_record.remotes.get("origin"),
            Some(format!("https://git.example.org/{}", plugin.display()).as_str())
        );
        assert_eq!(
            aggregator.remote_source.asked.borrow().as_slice(),
            &[ilias.clone(), plugin.clone()]
        );
    }

    #[test]
    fn test_missing_files_leave_fields_empty() {
        let temp = TempDir::new().unwrap();
        let ilias = temp.path().join("bare");
        write(&ilias.join("ilias.php"), "<?php\n");

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let inventory = aggregator.process_discovered(scan(temp.path()));

        let record = &inventory[&ilias];
        assert!(record.server_config.is_none());
        assert!(record.submodules.is_none());
        assert!(record.version.is_none());
        assert!(record.client_configs.is_empty());
        assert!(record.plugins.is_empty());
    }

    #[test]
    fn test_broken_version_does_not_stop_the_scan() {
        let temp = TempDir::new().unwrap();
        let first = fake_installation(temp.path(), "a/ILIAS");
        let second = fake_installation(temp.path(), "b/ILIAS");
        write(&first.join("include/inc.ilias_version.php"), "<?php\n");

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let inventory = aggregator.process_discovered(scan(temp.path()));

        assert_eq!(inventory.len(), 2);
        assert!(inventory[&first].version.is_none());
        assert!(inventory[&first].server_config.is_some());
        assert_eq!(inventory[&second].version.as_deref(), Some("7.12"));
    }

    #[test]
    fn test_same_installation_is_committed_once() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        aggregator.process_discovered(scan(temp.path()));

        fs::remove_file(ilias.join("ilias.ini.php")).unwrap();
        let inventory = aggregator.process_discovered(scan(temp.path()));

        assert_eq!(inventory.len(), 1);
        assert!(inventory[&ilias].server_config.is_some());
        assert_eq!(aggregator.committed_paths().count(), 1);
    }

    #[test]
    fn test_returned_inventory_is_independent() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let mut inventory = aggregator.process_discovered(scan(temp.path()));
        inventory.get_mut(&ilias).unwrap().client_configs.clear();
        inventory.clear();

        assert_eq!(aggregator.results()[&ilias].client_configs.len(), 1);
    }

    #[test]
    fn test_latin1_manifest_falls_back() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        let plugin = fake_plugin(&ilias, "Legacy");
        fs::write(
            plugin.join("plugin.php"),
            b"<?php\n$version = \"2.0.1\";\n// Autor: J\xf6rg\n",
        )
        .unwrap();

        let aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let record = aggregator.analyze_plugin(&plugin.join("plugin.php"));

        assert_eq!(record.field("version"), Some("2.0.1"));
    }

    #[test]
    fn test_latin1_client_config_is_kept() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        let latin1 = ilias.join("data/uni/client.ini.php");
        fs::create_dir_all(latin1.parent().unwrap()).unwrap();
        fs::write(&latin1, b"[client]\nname = \"uni\"\ndescription = \"Universit\xe4t\"\n").unwrap();

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default())
            .with_selections(IniSelections {
                client_ini: crate::analyzer::ini_parser::IniSelection::all(),
                ..IniSelections::default()
            });
        let inventory = aggregator.process_discovered(scan(temp.path()));

        let clients = &inventory[&ilias].client_configs;
        assert_eq!(clients.len(), 2);
        let uni = clients.iter().find(|c| c.source_file == latin1).unwrap();
        assert_eq!(uni.get("client", "description"), Some("Universität"));
    }

    #[test]
    fn test_vanished_client_config_still_counts() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        let finder = scan(temp.path());
        let gone = ilias.join("data/main/client.ini.php");
        fs::remove_file(&gone).unwrap();

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let inventory = aggregator.process_discovered(finder);

        let clients = &inventory[&ilias].client_configs;
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0], IniDocument::empty(&gone));
        let json = serde_json::to_value(&clients[0]).unwrap();
        assert_eq!(json, serde_json::json!({"source_file": gone.to_string_lossy()}));
    }

    #[test]
    fn test_contained_repositories() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        let plugin = fake_plugin(&ilias, "UserTakeOver");
        fs::create_dir_all(ilias.join(".git")).unwrap();
        fs::create_dir_all(plugin.join(".git")).unwrap();

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let inventory = aggregator.process_discovered(scan(temp.path()));

        let repos = &inventory[&ilias].contained_repositories;
        assert_eq!(repos.keys().collect::<Vec<_>>(), vec![&ilias, &plugin]);
        assert_eq!(
            repos[&plugin].get("origin"),
            Some(format!("https://git.example.org/{}", plugin.display()).as_str())
        );
        assert_eq!(inventory[&ilias].remotes, repos[&ilias]);
    }

    #[test]
    fn test_no_repositories_without_git_dirs() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");

        let aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());

        assert!(aggregator.contained_repositories(&ilias).is_empty());
        assert!(aggregator.remote_source.asked.borrow().is_empty());
    }

    #[test]
    fn test_custom_selection() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        let selections = IniSelections {
            client_ini: crate::analyzer::ini_parser::IniSelection::default().whole_section("session"),
            ..IniSelections::default()
        };

        let mut aggregator =
            InstallationAggregator::with_remote_source(FakeRemotes::default()).with_selections(selections);
        let inventory = aggregator.process_discovered(scan(temp.path()));

        let client = &inventory[&ilias].client_configs[0];
        assert_eq!(client.get("session", "expire"), Some("7200"));
        assert!(client.sections["db"].is_empty());
    }

    #[test]
    fn test_client_count_matches_files_on_disk() {
        let temp = TempDir::new().unwrap();
        let ilias = fake_installation(temp.path(), "ILIAS");
        for client in ["one", "two", "three"] {
            write(&ilias.join("data").join(client).join("client.ini.php"), CLIENT_INI_TEXT);
        }
        let on_disk = crate::analyzer::find_files_named(&ilias, "client.ini.php", &[]).count();

        let mut aggregator = InstallationAggregator::with_remote_source(FakeRemotes::default());
        let inventory = aggregator.process_discovered(scan(temp.path()));

        assert_eq!(on_disk, 4);
        assert_eq!(inventory[&ilias].client_configs.len(), on_disk);
    }
}
