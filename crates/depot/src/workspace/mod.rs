use std::{
    cmp::Ordering,
    env,
    fmt::{self, Debug},
    iter,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use futures::{
    StreamExt,
    stream::{self, TryStreamExt},
};
use log::{debug, warn};
use manifest::DepotManifest;
use package::Package;
use serde::{Deserialize, Serialize};

use crate::{CommonArgs, logger::Logger, shareable, utils};

pub mod dep_graph;
mod manifest;
pub mod package;
pub mod process;
pub mod runner;

use dep_graph::DepGraph;
use package::{PackageGraph, PackageIndex};
use process::{OnData, Process, ProcessBuilder};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceDepotConfig {
    #[serde(default)]
    pub depot_version: Option<String>,
}

pub type WorkspaceManifest = DepotManifest<WorkspaceDepotConfig>;

pub const DEPOT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Represents an entire Depot workspace.
///
/// This is the central data structure nearly every other part of the application holds a
/// handle to, wrapped in an [`Arc`] by [`Workspace`]. Immutable after [`Workspace::load`]
/// returns; every field here is read concurrently without locks.
pub struct WorkspaceInner {
    /// The root directory of the workspace containing `package.json`.
    pub root: PathBuf,

    /// All the packages in the workspace, in monorepo directory-listing order.
    pub packages: Vec<Package>,

    /// The intra-workspace dependency graph, transitively closed.
    pub pkg_graph: PackageGraph,

    /// True if this workspace is structured as a monorepo with a `packages/` directory.
    pub monorepo: bool,

    /// CLI arguments that apply to the whole workspace.
    pub common: CommonArgs,

    /// The packages `-p/--packages` restricted this invocation to; every package if unset.
    pub roots: Vec<Package>,

    package_display_order: Vec<PackageIndex>,
}

shareable!(Workspace, WorkspaceInner);

fn find_workspace_root(max_ancestor: &Path, cwd: &Path) -> Result<PathBuf> {
    let rel_path_to_cwd = cwd.strip_prefix(max_ancestor).unwrap_or_else(|_| {
        panic!(
            "Internal error: max ancestor `{}` is not a prefix of cwd `{}`",
            max_ancestor.display(),
            cwd.display()
        )
    });
    let components = rel_path_to_cwd.iter().collect::<Vec<_>>();
    (0..=components.len())
        .map(|i| {
            iter::once(max_ancestor.as_os_str())
                .chain(components[..i].iter().copied())
                .collect::<PathBuf>()
        })
        .find(|path| path.join("package.json").exists())
        .with_context(|| {
            format!(
                "Could not find a workspace root (no package.json found walking up from {})",
                cwd.display()
            )
        })
}

pub enum CommandInner {
    Package(Box<dyn PackageCommand>),
    Workspace(Box<dyn WorkspaceCommand>),
}

impl CommandInner {
    pub fn name(&self) -> String {
        match self {
            CommandInner::Package(cmd) => cmd.name(),
            CommandInner::Workspace(cmd) => cmd.name(),
        }
    }

    pub fn deps(&self) -> Vec<Command> {
        match self {
            CommandInner::Package(cmd) => cmd.deps(),
            CommandInner::Workspace(_) => Vec::new(),
        }
    }
}

impl Command {
    pub async fn run_pkg(&self, package: &Package, logger: &Logger) -> Result<()> {
        match &**self {
            CommandInner::Package(cmd) => cmd.run_pkg(package, logger).await,
            CommandInner::Workspace(_) => panic!("run_pkg called on a workspace command"),
        }
    }

    pub async fn run_ws(&self, ws: &Workspace, logger: &Logger) -> Result<()> {
        match &**self {
            CommandInner::Workspace(cmd) => cmd.run_ws(ws, logger).await,
            CommandInner::Package(_) => panic!("run_ws called on a package command"),
        }
    }

    pub fn parallel(&self) -> bool {
        match &**self {
            CommandInner::Package(cmd) => cmd.parallel(),
            CommandInner::Workspace(_) => true,
        }
    }
}

impl fmt::Debug for CommandInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandInner::Package(cmd) => write!(f, "{cmd:?}"),
            CommandInner::Workspace(cmd) => write!(f, "{cmd:?}"),
        }
    }
}

shareable!(Command, CommandInner);

impl Command {
    pub fn package(cmd: impl PackageCommand) -> Self {
        Self::new(CommandInner::Package(Box::new(cmd)))
    }

    pub fn workspace(cmd: impl WorkspaceCommand + 'static) -> Self {
        Self::new(CommandInner::Workspace(Box::new(cmd)))
    }
}

pub trait CoreCommand {
    fn name(&self) -> String;
}

/// When a package-scoped command finishes relative to its workspace dependency wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandRuntime {
    /// Wait for this package's intra-workspace dependencies to finish first; run once.
    WaitForDependencies,
    /// No dependency ordering needed; run as soon as scheduled.
    RunImmediately,
    /// Never settles on its own (watch mode); every package starts at once.
    RunForever,
}

#[async_trait::async_trait]
pub trait PackageCommand: CoreCommand + Debug + Send + Sync + 'static {
    async fn run_pkg(&self, package: &Package, logger: &Logger) -> Result<()>;

    /// Other commands that must run to completion, workspace-wide, before this one starts
    /// for any package (e.g. `build` depends on `init`).
    fn deps(&self) -> Vec<Command> {
        Vec::new()
    }

    fn runtime(&self) -> CommandRuntime {
        CommandRuntime::WaitForDependencies
    }

    /// True iff every package can start this command concurrently, ignoring the
    /// dependency wave. Derived from `runtime()` by default — a command only needs to
    /// ignore package ordering when it never settles on its own or has no ordering
    /// constraint to begin with.
    fn parallel(&self) -> bool {
        matches!(
            self.runtime(),
            CommandRuntime::RunForever | CommandRuntime::RunImmediately
        )
    }
}

#[async_trait::async_trait]
pub trait WorkspaceCommand: CoreCommand + Debug + Send + Sync + 'static {
    async fn run_ws(&self, ws: &Workspace, logger: &Logger) -> Result<()>;
}

impl Workspace {
    pub async fn load(cwd: Option<PathBuf>, common: CommonArgs) -> Result<Self> {
        let cwd = match cwd {
            Some(cwd) => cwd,
            None => env::current_dir()?,
        };
        let fs_root = cwd.ancestors().last().unwrap().to_path_buf();
        let git_root = utils::get_git_root(&cwd);
        let max_ancestor: &Path = git_root.as_deref().unwrap_or(&fs_root);
        let root = find_workspace_root(max_ancestor, &cwd)?;
        debug!("Workspace root: `{}`", root.display());

        let pkg_dir = root.join("packages");
        let monorepo = pkg_dir.is_dir();
        debug!("Workspace is monorepo: {monorepo}");

        let manifest = WorkspaceManifest::load(&root.join("package.json"))?;
        if let Some(created_version) = &manifest.depot.depot_version {
            if DEPOT_VERSION != created_version {
                warn!(
                    "depot binary is v{DEPOT_VERSION} but this workspace was created with \
                     v{created_version}; double check compatibility or update \
                     `depot.depot-version` in package.json"
                );
            }
        }

        let pkg_roots = if monorepo {
            let mut entries = pkg_dir
                .read_dir()
                .with_context(|| format!("Could not read {}", pkg_dir.display()))?
                .map(|entry| Ok(entry?.path()))
                .collect::<Result<Vec<_>>>()?;
            entries.retain(|p| p.is_dir());
            entries.sort();
            entries
        } else {
            vec![root.clone()]
        };

        let packages: Vec<_> = stream::iter(pkg_roots)
            .enumerate()
            .then(|(index, pkg_root)| async move { Package::load(&pkg_root, index) })
            .try_collect()
            .await?;

        let roots = if common.packages.is_empty() {
            packages.clone()
        } else {
            common
                .packages
                .iter()
                .map(|name| {
                    find_package_by_name(&packages, name)
                        .cloned()
                        .with_context(|| format!("Could not find package with name: {name}"))
                })
                .collect::<Result<Vec<_>>>()?
        };

        let pkg_graph = package::build_package_graph(&packages, &packages)?;

        let package_display_order = {
            let mut order: Vec<_> = packages.iter().map(|pkg| pkg.index).collect();
            order.sort_by(|n1, n2| {
                let p1 = &packages[*n1];
                let p2 = &packages[*n2];
                if pkg_graph.is_dependent_on(p2, p1) {
                    Ordering::Less
                } else if pkg_graph.is_dependent_on(p1, p2) {
                    Ordering::Greater
                } else {
                    p1.name.cmp(&p2.name)
                }
            });
            order
        };

        let ws = Workspace::new(WorkspaceInner {
            root,
            packages,
            package_display_order,
            monorepo,
            pkg_graph,
            common,
            roots,
        });

        for pkg in &ws.packages {
            pkg.set_workspace(&ws);
        }

        Ok(ws)
    }
}

fn find_package_by_name<'a>(packages: &'a [Package], name: &str) -> Option<&'a Package> {
    packages.iter().find(|p| p.name == name)
}

impl WorkspaceInner {
    pub fn package_display_order(&self) -> impl Iterator<Item = &Package> {
        self.package_display_order
            .iter()
            .map(|idx| &self.packages[*idx])
    }

    /// Every package reachable from `roots` through `pkg_graph`, `roots` included.
    pub fn dependency_closure(&self, roots: &[Package]) -> Vec<Package> {
        self.pkg_graph.dependency_closure(roots)
    }

    pub fn start_process(
        &self,
        script: &'static str,
        on_data: OnData,
        configure: impl FnOnce(&mut ProcessBuilder),
    ) -> Result<Arc<Process>> {
        log::trace!("Starting process: {script}");

        let pnpm = utils::require_pnpm(Some(&self.root))?;

        let mut builder = ProcessBuilder::new(&pnpm);
        builder.current_dir(&self.root);
        builder.env("NODE_PATH", self.root.join("node_modules"));

        if script != "pnpm" {
            builder.args(["exec", script]);
        }

        configure(&mut builder);

        Process::spawn(script.to_owned(), &builder, on_data)
    }

    pub async fn exec(
        &self,
        logger: &Logger,
        pane: &'static str,
        pkg_label: &str,
        script: &'static str,
        configure: impl FnOnce(&mut ProcessBuilder),
    ) -> Result<()> {
        let sink = logger.sink(pkg_label.to_string(), pane);
        let process = self.start_process(script, sink, configure)?;
        process.wait_for_success().await
    }
}

pub type CommandGraph = DepGraph<Command>;

pub fn build_command_graph(root: &Command) -> CommandGraph {
    DepGraph::build(vec![root.clone()], |cmd: &Command| cmd.name(), |cmd| cmd.deps()).unwrap()
}

#[cfg(test)]
mod test {
    use crate::commands::test::{TestArgs, TestCommand};

    use super::*;

    #[test]
    fn build_graph_has_no_cycle() {
        let root = TestCommand::new(TestArgs::default()).kind();
        let cmd_graph = build_command_graph(&root);
        assert_eq!(cmd_graph.len(), 1);
    }
}
