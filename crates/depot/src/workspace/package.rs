use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::{RwLock, Weak},
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{
    dep_graph::DepGraph,
    manifest::DepotManifest,
    process::{Process, ProcessBuilder},
};
use crate::{shareable, workspace::WorkspaceInner};

/// Depot-specific config a package may place under the `"depot"` key of its `package.json`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageDepotConfig {
    /// Suppresses vite's dev server for a `site`-target package whose `build -w` should
    /// only rebuild `dist/`, not also serve it (depot's own `serve` subordinate still
    /// applies in that case).
    #[serde(default)]
    pub no_server: Option<bool>,
}

pub type PackageManifest = DepotManifest<PackageDepotConfig>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Browser,
    Node,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Browser => "browser",
            Platform::Node => "node",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Consumed by other workspace packages; built with declarations, no HTML entry.
    Lib,
    /// A standalone executable/bundle, no host page.
    Bin,
    /// A browser target with an `index.html` entry point.
    Site,
}

impl Target {
    pub fn is_lib(self) -> bool {
        matches!(self, Target::Lib)
    }

    pub fn is_site(self) -> bool {
        matches!(self, Target::Site)
    }
}

pub type PackageIndex = usize;

pub struct PackageInner {
    pub index: PackageIndex,
    pub root: PathBuf,
    pub manifest: PackageManifest,
    pub name: String,
    pub platform: Platform,
    pub target: Target,
    pub entry_point: PathBuf,
    workspace: RwLock<Option<Weak<WorkspaceInner>>>,
}

shareable!(Package, PackageInner);

/// `(basename, resulting platform, resulting target)` tried in order; first entry whose
/// file exists under `src/` for any of the supported extensions wins.
const ENTRY_CANDIDATES: &[(&str, Platform, Target)] = &[
    ("lib", Platform::Node, Target::Lib),
    ("main", Platform::Node, Target::Bin),
    ("index", Platform::Browser, Target::Bin),
];

const ENTRY_EXTENSIONS: &[&str] = &["tsx", "ts", "js"];

fn discover_entry_point(dir: &Path) -> Result<(Platform, Target, PathBuf)> {
    let src = dir.join("src");
    for (basename, platform, target) in ENTRY_CANDIDATES {
        for ext in ENTRY_EXTENSIONS {
            let candidate = src.join(format!("{basename}.{ext}"));
            if candidate.exists() {
                let target = if *target == Target::Bin
                    && *platform == Platform::Browser
                    && dir.join("index.html").exists()
                {
                    Target::Site
                } else {
                    *target
                };
                return Ok((*platform, target, candidate));
            }
        }
    }
    Err(anyhow!(
        "Could not find an entry point (src/lib|main|index.{{tsx,ts,js}}) in {}",
        dir.display()
    ))
}

impl Package {
    pub fn load(dir: &Path, index: PackageIndex) -> Result<Self> {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Package directory does not exist: {}", dir.display()))?;

        let manifest_path = dir.join("package.json");
        let manifest = PackageManifest::load(&manifest_path)
            .with_context(|| format!("Could not load manifest for package in {}", dir.display()))?;

        let name = manifest
            .name
            .clone()
            .unwrap_or_else(|| dir.file_name().unwrap().to_string_lossy().into_owned());

        let (platform, target, entry_point) = discover_entry_point(&dir)
            .with_context(|| format!("Failed to load package `{name}`"))?;

        ensure!(
            entry_point.exists(),
            "Internal error: discovered entry point does not exist: {}",
            entry_point.display()
        );

        Ok(Package::new(PackageInner {
            index,
            root: dir,
            manifest,
            name,
            platform,
            target,
            entry_point,
            workspace: RwLock::new(None),
        }))
    }

    pub fn set_workspace(&self, ws: &crate::workspace::Workspace) {
        *self.workspace.write().unwrap() = Some(ws.downgrade());
    }

    fn workspace(&self) -> crate::workspace::Workspace {
        self.workspace
            .read()
            .unwrap()
            .as_ref()
            .and_then(crate::workspace::Workspace::from_weak)
            .expect("Package used before its workspace was attached")
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root.join("dist")
    }

    /// Source files under `src/` with one of the extensions biome/tsc care about.
    pub fn source_files(&self) -> Vec<PathBuf> {
        self.files_under("src", &["js", "ts", "tsx"])
    }

    /// `{src,tests}/**/*.{ts,tsx}`, the formatter's target set.
    pub fn format_files(&self) -> Vec<PathBuf> {
        let mut files = self.files_under("src", &["ts", "tsx"]);
        files.extend(self.files_under("tests", &["ts", "tsx"]));
        files
    }

    fn files_under(&self, rel: &str, extensions: &[&str]) -> Vec<PathBuf> {
        let dir = self.root.join(rel);
        if !dir.exists() {
            return Vec::new();
        }
        WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| extensions.contains(&ext))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Spawns `script` under pnpm, in this package's directory, tags its output with
    /// `(self.name, pane)` for `logger`, and waits for it to exit successfully. The thin
    /// wrapper every subordinate process in `commands::build` uses.
    pub async fn exec(
        &self,
        logger: &crate::logger::Logger,
        pane: &'static str,
        script: &'static str,
        configure: impl FnOnce(&mut ProcessBuilder),
    ) -> Result<()> {
        let process = self.start_process(logger, pane, script, configure)?;
        process.wait_for_success().await
    }

    pub fn start_process(
        &self,
        logger: &crate::logger::Logger,
        pane: &'static str,
        script: &'static str,
        configure: impl FnOnce(&mut ProcessBuilder),
    ) -> Result<std::sync::Arc<Process>> {
        let ws = self.workspace();
        let root = self.root.clone();
        let sink = logger.sink(self.name.clone(), pane);
        ws.start_process(script, sink, move |builder| {
            builder.current_dir(&root);
            configure(builder);
        })
    }
}

pub struct PackageGraph {
    graph: DepGraph<Package>,
}

impl PackageGraph {
    pub fn nodes(&self) -> impl Iterator<Item = &Package> {
        self.graph.nodes()
    }

    pub fn is_dependent_on(&self, dependent: &Package, dependency: &Package) -> bool {
        self.graph
            .transitive_deps(&dependent.name)
            .into_iter()
            .any(|idx| self.graph.get(idx).name == dependency.name)
    }

    /// Every package reachable from `roots` through the dependency graph, `roots`
    /// themselves included, in the graph's stable node order.
    pub fn dependency_closure(&self, roots: &[Package]) -> Vec<Package> {
        let mut indices: HashSet<usize> = HashSet::new();
        for root in roots {
            if let Some(idx) = self.graph.index_of(&root.name) {
                indices.insert(idx);
                indices.extend(self.graph.transitive_deps(&root.name));
            }
        }
        let mut result: Vec<_> = indices.into_iter().map(|i| self.graph.get(i).clone()).collect();
        result.sort_by_key(|p| p.index);
        result
    }

    pub fn direct_deps(&self, pkg: &Package) -> HashSet<String> {
        self.graph
            .direct_deps(&pkg.name)
            .map(|idxs| idxs.iter().map(|&i| self.graph.get(i).name.clone()).collect())
            .unwrap_or_default()
    }
}

/// Builds the intra-workspace dependency graph: direct edges come from the union of
/// `dependencies`/`devDependencies`/`peerDependencies` keys that name another workspace
/// package; `DepGraph` closes them transitively and rejects a cycle.
pub fn build_package_graph(packages: &[Package], roots: &[Package]) -> Result<PackageGraph> {
    let deps_of = {
        let packages = packages.to_vec();
        move |pkg: &Package| -> Vec<Package> {
            pkg.manifest
                .all_dependency_names()
                .filter_map(|dep_name| packages.iter().find(|p| p.name == dep_name))
                .cloned()
                .collect()
        }
    };

    let graph = DepGraph::build(
        if roots.is_empty() {
            packages.to_vec()
        } else {
            roots.to_vec()
        },
        |pkg| pkg.name.clone(),
        deps_of,
    )?;

    Ok(PackageGraph { graph })
}
