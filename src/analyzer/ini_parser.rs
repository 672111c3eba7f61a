use super::read_text;
use crate::error::{ExtractError, Result};
use encoding_rs::Encoding;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Option name -> value of one section
pub type Section = IndexMap<String, String>;

/// Which options to read from one INI section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSelection {
    /// Every option present in the section
    All,
    /// Only the named options
    Options(Vec<String>),
}

/// Projection applied to a parsed INI file. An empty selection keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSelection {
    sections: IndexMap<String, SectionSelection>,
}

impl IniSelection {
    /// Selection that keeps every section and option
    pub fn all() -> Self {
        Self::default()
    }

    pub fn section<I, S>(mut self, name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = options.into_iter().map(Into::into).collect();
        self.sections.insert(name.into(), SectionSelection::Options(options));
        self
    }

    pub fn whole_section(mut self, name: impl Into<String>) -> Self {
        self.sections.insert(name.into(), SectionSelection::All);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Build a selection from untyped JSON such as `{"db": ["user", "host"], "log": true}`.
    ///
    /// `false` leaves the section out; any other non-list value is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ExtractError::Config(format!(
                "selection needs to be an object, got {}",
                json_kind(value)
            )));
        };

        let mut selection = Self::default();
        for (section, fields) in map {
            match fields {
                Value::Bool(true) => selection = selection.whole_section(section.as_str()),
                Value::Bool(false) => {}
                Value::Array(items) => {
                    let options = items
                        .iter()
                        .map(|item| {
                            item.as_str().map(str::to_string).ok_or_else(|| {
                                ExtractError::Config(format!(
                                    "options of section '{}' need to be strings, got {}",
                                    section,
                                    json_kind(item)
                                ))
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    selection = selection.section(section.as_str(), options);
                }
                other => {
                    return Err(ExtractError::Config(format!(
                        "section '{}' needs a list of options or a boolean, got {}",
                        section,
                        json_kind(other)
                    )))
                }
            }
        }
        Ok(selection)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Section name that would collide with the `source_file` key of the report
const RESERVED_SECTION: &str = "source_file";

/// Sections and options read from one INI file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IniDocument {
    #[serde(serialize_with = "crate::serde_paths::lossy")]
    pub source_file: PathBuf,
    #[serde(flatten)]
    pub sections: IndexMap<String, Section>,
}

impl IniDocument {
    /// Document for a file that could not be read, carrying only its path
    pub fn empty(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            sections: IndexMap::new(),
        }
    }

    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(option))
            .map(String::as_str)
    }
}

/// Parse an INI file and project it through `selection`.
///
/// Every section of the file and every selected section shows up in the result,
/// empty when none of its options were selected or present.
pub fn parse_ini_file(path: &Path, selection: &IniSelection) -> Result<IniDocument> {
    parse_ini_file_as(path, selection, encoding_rs::UTF_8)
}

/// [`parse_ini_file`] for a file in another encoding
pub fn parse_ini_file_as(
    path: &Path,
    selection: &IniSelection,
    encoding: &'static Encoding,
) -> Result<IniDocument> {
    let content = read_text(path, encoding)?;
    let mut raw = parse_ini_str(&content);
    if raw.shift_remove(RESERVED_SECTION).is_some() {
        debug!("Dropping section [{}] of {}", RESERVED_SECTION, path.display());
    }
    debug!("Parsed {} sections from {}", raw.len(), path.display());

    Ok(IniDocument {
        source_file: path.to_path_buf(),
        sections: project(raw, selection),
    })
}

/// Parse INI text into sections of lowercase option names and unquoted values
pub fn parse_ini_str(content: &str) -> IndexMap<String, Section> {
    let mut sections: IndexMap<String, Section> = IndexMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }

        let Some(split_at) = line.find(['=', ':']) else {
            debug!("Ignoring INI line without delimiter: {}", line);
            continue;
        };
        let Some(section) = current.as_ref() else {
            debug!("Ignoring INI option outside of a section: {}", line);
            continue;
        };

        let key = line[..split_at].trim().to_lowercase();
        let value = strip_quotes(line[split_at + 1..].trim());
        if let Some(options) = sections.get_mut(section) {
            options.insert(key, value.to_string());
        }
    }

    sections
}

fn project(mut raw: IndexMap<String, Section>, selection: &IniSelection) -> IndexMap<String, Section> {
    if selection.is_empty() {
        return raw;
    }

    let mut projected: IndexMap<String, Section> =
        raw.keys().map(|name| (name.clone(), Section::new())).collect();

    for (name, wanted) in &selection.sections {
        let available = raw.shift_remove(name).unwrap_or_default();
        let target = projected.entry(name.clone()).or_default();
        match wanted {
            SectionSelection::All => target.extend(available),
            SectionSelection::Options(options) => {
                for option in options {
                    if let Some(value) = available.get(&option.to_lowercase()) {
                        target.insert(option.clone(), value.clone());
                    }
                }
            }
        }
    }

    projected
}

/// Remove one layer of surrounding double quotes
pub fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
