use super::{read_file, read_text};
use crate::error::{ExtractError, Result};
use encoding_rs::Encoding;
use indexmap::IndexMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// `$name = "value";` where value is words/mail-ish text or a dotted number
fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\$(\w+)\s*=\s*["']([a-zA-Z@\s.]+|[0-9.]+)["'];"#)
            .expect("assignment pattern is valid")
    })
}

/// `define('NAME', '1.2.3');`
fn define_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"define\(['"]([a-zA-Z_]+)['"],\s?['"]([0-9.]+)['"]\);"#)
            .expect("define pattern is valid")
    })
}

/// First quoted literal that starts with `<digit>.`
fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""(\d\.[\d.]+)""#).expect("version pattern is valid"))
}

/// Literal declarations harvested from a plugin.php
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginManifest {
    pub source_file: PathBuf,
    pub fields: IndexMap<String, String>,
}

/// Read a plugin manifest in the given encoding and collect its literal declarations.
///
/// The opening line is never inspected. Later declarations of the same name win.
pub fn parse_plugin_manifest(path: &Path, encoding: &'static Encoding) -> Result<PluginManifest> {
    let content = read_text(path, encoding)?;
    Ok(PluginManifest {
        source_file: path.to_path_buf(),
        fields: parse_manifest_str(&content),
    })
}

pub fn parse_manifest_str(content: &str) -> IndexMap<String, String> {
    let mut fields = IndexMap::new();
    for line in content.lines().skip(1) {
        if let Some(caps) = assignment_pattern().captures(line) {
            fields.insert(caps[1].to_string(), caps[2].to_string());
        }
        if let Some(caps) = define_pattern().captures(line) {
            fields.insert(caps[1].to_string(), caps[2].to_string());
        }
    }
    fields
}

/// Extract the installation version from inc.ilias_version.php
pub fn parse_version_file(path: &Path) -> Result<String> {
    let content = read_file(path)?;
    parse_version_str(&content).ok_or_else(|| ExtractError::VersionNotFound(path.to_path_buf()))
}

pub fn parse_version_str(content: &str) -> Option<String> {
    version_pattern()
        .captures(content)
        .map(|caps| caps[1].to_string())
}
