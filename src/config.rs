use crate::analyzer::ini_parser::IniSelection;
use crate::analyzer::{CLIENT_INI, ILIAS_INI};
use crate::error::{ExtractError, Result};
use serde_json::Value;

/// Host-level folders that hold backups, dumps, retired installations or system data
pub const DEFAULT_EXCLUDED_FOLDERS: &[&str] = &[
    "Backup", "backup", "_Examples", "Dump", "dump", "iliasold", "ilias5_old", "ilias4_old",
    "defekt", "ilias5old", "ilias4old", "iliasOld", "ilias4svn", "ilias5svn", "/opt", "/root",
    "/etc", "/media", "/mnt", "/lib", "/sbin", "/tmp",
];

/// INI projections for the two config file kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSelections {
    pub ilias_ini: IniSelection,
    pub client_ini: IniSelection,
}

impl Default for IniSelections {
    fn default() -> Self {
        Self {
            ilias_ini: IniSelection::default()
                .section("server", ["http_path", "absolute_path"])
                .section("clients", ["path", "inifile", "datadir", "default"]),
            client_ini: IniSelection::default()
                .section("client", ["name", "access"])
                .section("db", ["type", "host", "user", "name", "pass", "port"])
                .section("language", ["default"])
                .section("layout", ["skin", "style"]),
        }
    }
}

impl IniSelections {
    /// Override the defaults from `{"ilias.ini.php": {...}, "client.ini.php": {...}}`.
    /// A file kind left out keeps its default selection.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ExtractError::Config(
                "mapping needs to be an object keyed by file name".to_string(),
            ));
        };

        let mut selections = Self::default();
        for (file, selection) in map {
            let selection = IniSelection::from_json(selection)?;
            match file.as_str() {
                ILIAS_INI => selections.ilias_ini = selection,
                CLIENT_INI => selections.client_ini = selection,
                other => {
                    return Err(ExtractError::Config(format!(
                        "unknown file '{}', expected {} or {}",
                        other, ILIAS_INI, CLIENT_INI
                    )))
                }
            }
        }
        Ok(selections)
    }
}
