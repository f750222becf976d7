//! Authoritative theme content used to seed the dare menu.
//!
//! Themes are read once at startup, preferably from a directory of one JSON
//! file per theme (ordered by `index.json` when present), falling back to a
//! single `{ "<name>": <theme>, ... }` file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Theme used when a request names nothing we know
pub const DEFAULT_THEME: &str = "Sensual";

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no themes found in {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StarterDare {
    pub title: String,
    #[serde(default)]
    pub extra: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Theme {
    /// Display name; overrides the file name as the theme key
    #[serde(default)]
    pub name: Option<String>,
    /// Seeds for the dare menu. Client-side fields such as `examples` are
    /// not needed by the server and are skipped.
    #[serde(default)]
    pub starts: Vec<StarterDare>,
}

/// Loaded themes in load order
#[derive(Debug, Clone, Default)]
pub struct ContentSet {
    themes: Vec<(String, Theme)>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ContentError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ContentError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl ContentSet {
    pub fn from_themes(themes: Vec<(String, Theme)>) -> Self {
        Self { themes }
    }

    /// Load from `dir`, falling back to `fallback_file`. Never fails: a
    /// server without content still runs, it just seeds empty menus.
    pub fn load(dir: &Path, fallback_file: &Path) -> Self {
        match Self::load_dir(dir) {
            Ok(set) => {
                tracing::info!(themes = set.len(), dir = %dir.display(), "Themes loaded");
                return set;
            }
            Err(e) => tracing::warn!("Failed to load split themes: {}", e),
        }

        match Self::load_file(fallback_file) {
            Ok(set) => {
                tracing::info!(themes = set.len(), file = %fallback_file.display(), "Themes loaded");
                set
            }
            Err(e) => {
                tracing::error!("Failed to load fallback themes: {}", e);
                Self::default()
            }
        }
    }

    /// One file per theme. `index.json` (a list of base names) fixes the
    /// order; otherwise every `*.json` file is read in name order.
    pub fn load_dir(dir: &Path) -> Result<Self, ContentError> {
        let index_path = dir.join("index.json");
        let names: Vec<String> = if index_path.exists() {
            read_json(&index_path)?
        } else {
            let entries = std::fs::read_dir(dir).map_err(|source| ContentError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let mut names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| {
                    p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
                })
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .filter(|stem| stem != "index")
                .collect();
            names.sort();
            names
        };

        let mut themes = Vec::new();
        for base in names {
            let path = dir.join(format!("{}.json", base));
            if !path.exists() {
                tracing::warn!(theme = %base, "Theme listed in index but missing");
                continue;
            }
            let theme: Theme = read_json(&path)?;
            let key = theme.name.clone().unwrap_or(base);
            themes.push((key, theme));
        }

        if themes.is_empty() {
            return Err(ContentError::Empty(dir.to_path_buf()));
        }
        Ok(Self { themes })
    }

    /// Single file mapping theme name to theme
    pub fn load_file(path: &Path) -> Result<Self, ContentError> {
        let map: serde_json::Map<String, serde_json::Value> = read_json(path)?;
        let mut themes = Vec::with_capacity(map.len());
        for (key, value) in map {
            let theme: Theme =
                serde_json::from_value(value).map_err(|source| ContentError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            themes.push((key, theme));
        }
        Ok(Self { themes })
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.themes.iter().map(|(k, _)| k.as_str())
    }

    /// Canonical key for a theme name, matched case-insensitively
    pub fn resolve(&self, name: Option<&str>) -> Option<&str> {
        let wanted = name?.trim();
        if wanted.is_empty() {
            return None;
        }
        self.names().find(|k| k.eq_ignore_ascii_case(wanted))
    }

    /// `Sensual` if loaded, else the first theme
    pub fn default_key(&self) -> Option<&str> {
        self.resolve(Some(DEFAULT_THEME))
            .or_else(|| self.names().next())
    }

    /// Starter dares for a resolved key
    pub fn seed(&self, key: &str) -> &[StarterDare] {
        self.themes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, t)| t.starts.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(starts: &[&str]) -> Theme {
        Theme {
            name: None,
            starts: starts
                .iter()
                .map(|t| StarterDare {
                    title: t.to_string(),
                    extra: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let set = ContentSet::from_themes(vec![
            ("Playful".to_string(), theme(&["a"])),
            ("Sensual".to_string(), theme(&["b"])),
        ]);
        assert_eq!(set.resolve(Some("  sensual ")), Some("Sensual"));
        assert_eq!(set.resolve(Some("PLAYFUL")), Some("Playful"));
        assert_eq!(set.resolve(Some("Nope")), None);
        assert_eq!(set.resolve(Some("")), None);
        assert_eq!(set.resolve(None), None);
        assert_eq!(set.default_key(), Some("Sensual"));
        assert_eq!(set.seed("Sensual")[0].title, "b");
        assert!(set.seed("Missing").is_empty());
    }

    #[test]
    fn test_default_falls_back_to_first() {
        let set = ContentSet::from_themes(vec![("Playful".to_string(), theme(&["a"]))]);
        assert_eq!(set.default_key(), Some("Playful"));
        assert_eq!(ContentSet::default().default_key(), None);
    }

    #[test]
    fn test_load_dir_with_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.json"), r#"["zeta", "alpha", "ghost"]"#).unwrap();
        std::fs::write(
            dir.path().join("zeta.json"),
            r#"{"name": "Zeta Theme", "starts": [{"title": "Z1", "extra": "more"}]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("alpha.json"),
            r#"{"starts": [{"title": "A1"}], "examples": [{"title": "E", "spicyness": 3}]}"#,
        )
        .unwrap();

        let set = ContentSet::load_dir(dir.path()).unwrap();
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["Zeta Theme", "alpha"]);
        assert_eq!(set.seed("Zeta Theme")[0].extra, "more");
        assert_eq!(set.seed("alpha")[0].title, "A1");
    }

    #[test]
    fn test_load_dir_without_index_sorts_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"starts": []}"#).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"starts": []}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = ContentSet::load_dir(dir.path()).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_load_falls_back_to_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("themes");
        let file = dir.path().join("themes.json");
        std::fs::write(
            &file,
            r#"{"Sensual": {"starts": [{"title": "S1", "extra": "x"}]}, "Other": {}}"#,
        )
        .unwrap();

        let set = ContentSet::load(&missing, &file);
        assert_eq!(set.len(), 2);
        assert_eq!(set.seed("Sensual").len(), 1);
    }

    #[test]
    fn test_load_with_nothing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = ContentSet::load(&dir.path().join("a"), &dir.path().join("b.json"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = ContentSet::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ContentError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }
}
