use std::{
    collections::HashMap,
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A parsed `package.json`, generic over the shape of its `depot` section.
///
/// Both the workspace-root manifest and every package manifest are `package.json` files;
/// the only thing that differs is what depot-specific config lives under the `"depot"`
/// key, so one struct serves both with `T` swapped out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepotManifest<T> {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub dependencies: HashMap<String, String>,

    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: HashMap<String, String>,

    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: HashMap<String, String>,

    #[serde(default)]
    pub depot: T,
}

impl<T> DepotManifest<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| {
            format!(
                "Failed to parse manifest at {}:\n{}",
                path.display(),
                crate::utils::indent(&contents, 2)
            )
        })
    }

    /// The union of keys across `dependencies`, `devDependencies`, and `peerDependencies`,
    /// used to resolve intra-workspace dependency edges.
    pub fn all_dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .chain(self.peer_dependencies.keys())
            .map(String::as_str)
    }

    /// The union of keys across `dependencies` and `peerDependencies`, excluding
    /// `devDependencies`. A node-platform bundle treats these as externals; a
    /// dev-only dependency isn't part of the package's runtime surface and should be
    /// bundled in (or simply absent) rather than left unresolved at runtime.
    pub fn runtime_dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().chain(self.peer_dependencies.keys()).map(String::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct NoConfig {}

    #[test]
    fn parses_minimal_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "foo", "dependencies": {{"bar": "0.0.1"}}}}"#).unwrap();
        let manifest = DepotManifest::<NoConfig>::load(file.path()).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("foo"));
        assert_eq!(manifest.dependencies.get("bar").unwrap(), "0.0.1");
    }

    #[test]
    fn all_dependency_names_unions_all_three_maps() {
        let manifest: DepotManifest<NoConfig> = serde_json::from_str(
            r#"{
                "dependencies": {"a": "1"},
                "devDependencies": {"b": "1"},
                "peerDependencies": {"c": "1"}
            }"#,
        )
        .unwrap();
        let mut names: Vec<_> = manifest.all_dependency_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn runtime_dependency_names_excludes_dev_dependencies() {
        let manifest: DepotManifest<NoConfig> = serde_json::from_str(
            r#"{
                "dependencies": {"a": "1"},
                "devDependencies": {"b": "1"},
                "peerDependencies": {"c": "1"}
            }"#,
        )
        .unwrap();
        let mut names: Vec<_> = manifest.runtime_dependency_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "c"]);
    }
}
