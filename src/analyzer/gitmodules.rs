use super::read_file;
use crate::error::Result;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\[submodule\s+"([^"]+)"\s*\]$"#).expect("submodule header pattern is valid")
    })
}

/// One `[submodule "name"]` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Submodule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

pub type Submodules = IndexMap<String, Submodule>;

/// Parse a .gitmodules file into submodule name -> declaration
pub fn parse_gitmodules(path: &Path) -> Result<Submodules> {
    let content = read_file(path)?;
    Ok(parse_gitmodules_str(&content))
}

/// Keys are read only from inside their own block, so a block that omits a key
/// never borrows it from a neighbour.
pub fn parse_gitmodules_str(content: &str) -> Submodules {
    let mut submodules = Submodules::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            current = header_pattern().captures(line).map(|caps| caps[1].to_string());
            match &current {
                Some(name) => {
                    submodules.entry(name.clone()).or_default();
                }
                None => debug!("Skipping non-submodule block: {}", line),
            }
            continue;
        }

        let Some(submodule) = current.as_ref().and_then(|name| submodules.get_mut(name)) else {
            continue;
        };
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim() {
            "path" => submodule.path = value,
            "url" => submodule.url = value,
            "branch" => submodule.branch = value,
            _ => {}
        }
    }

    submodules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::test_support::{write, GITMODULES_TEXT};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_fixture() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gitmodules");
        write(&path, GITMODULES_TEXT);

        let submodules = parse_gitmodules(&path).unwrap();

        assert_eq!(
            submodules.keys().collect::<Vec<_>>(),
            vec!["UserTakeOver", "LPOverview", "CronCleaner"]
        );
        assert_eq!(
            submodules["UserTakeOver"],
            Submodule {
                path: Some(
                    "Customizing/global/plugins/Services/UIComponent/UserInterfaceHook/UserTakeOver"
                        .to_string()
                ),
                url: Some("../../plugins/UserTakeOver.git".to_string()),
                branch: Some("release_7".to_string()),
            }
        );
    }

    #[test]
    fn test_missing_field_does_not_shift_neighbours() {
        let submodules = parse_gitmodules_str(GITMODULES_TEXT);

        assert_eq!(submodules["LPOverview"].branch, None);
        assert_eq!(
            submodules["LPOverview"].url.as_deref(),
            Some("https://github.com/example/LPOverview.git")
        );
        assert_eq!(submodules["CronCleaner"].branch.as_deref(), Some("r6"));
        assert_eq!(
            submodules["CronCleaner"].url.as_deref(),
            Some("../plugins/CronCleaner.git")
        );
    }

    #[test]
    fn test_keys_outside_submodule_blocks_are_ignored() {
        let submodules = parse_gitmodules_str(
            "path = stray\n[core]\n\turl = nope\n[submodule \"a b\"]\n\tpath = x\n",
        );

        assert_eq!(submodules.len(), 1);
        assert_eq!(submodules["a b"].path.as_deref(), Some("x"));
        assert_eq!(submodules["a b"].url, None);
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_gitmodules_str("").is_empty());
    }
}
