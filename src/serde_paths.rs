//! Path serialization for the report.
//!
//! serde's own `Path` impl refuses anything that is not valid UTF-8, which
//! would abort the report halfway through on a single odd directory name.
//! These helpers write paths with `to_string_lossy` instead.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub fn lossy<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

/// Serialize a path-keyed map with lossy keys, keeping its order
pub fn lossy_keys<V, S>(map: &IndexMap<PathBuf, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    V: Serialize,
    S: Serializer,
{
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (path, value) in map {
        out.serialize_entry(&path.to_string_lossy(), value)?;
    }
    out.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Wrapped {
        #[serde(serialize_with = "lossy")]
        path: PathBuf,
        #[serde(serialize_with = "lossy_keys")]
        repos: IndexMap<PathBuf, u8>,
    }

    #[test]
    fn test_utf8_paths_are_written_unchanged() {
        let mut repos = IndexMap::new();
        repos.insert(PathBuf::from("/b"), 2);
        repos.insert(PathBuf::from("/a"), 1);
        let json = serde_json::to_string(&Wrapped {
            path: PathBuf::from("/srv/ilias"),
            repos,
        })
        .unwrap();

        assert_eq!(json, r#"{"path":"/srv/ilias","repos":{"/b":2,"/a":1}}"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_utf8_is_replaced() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let odd = PathBuf::from(OsStr::from_bytes(b"/srv/caf\xe9"));
        let mut repos = IndexMap::new();
        repos.insert(odd.clone(), 1);
        let json = serde_json::to_value(Wrapped { path: odd, repos }).unwrap();

        assert_eq!(json["path"], "/srv/caf\u{FFFD}");
        assert_eq!(json["repos"]["/srv/caf\u{FFFD}"], 1);
    }
}
