use std::{fs, path::Path};

use anyhow::Result;

use crate::{
    logger::Logger,
    utils,
    workspace::{Command, CommandRuntime, CoreCommand, PackageCommand, Workspace, WorkspaceCommand, package::Package},
};

/// The line `.gitignore` regeneration (owned by the scaffolding tool, out of scope here)
/// writes before any managed entry; `clean -a` only reads past it, never rewrites it.
const FENCE_LINE: &str = "# Managed by depot";

/// Remove generated files.
#[derive(clap::Parser, Debug, Default, Clone)]
pub struct CleanArgs {
    /// Also remove managed config symlinks
    #[arg(short, long, action)]
    pub all: bool,
}

#[derive(Debug)]
pub struct CleanCommand {
    args: CleanArgs,
}

impl CleanCommand {
    pub fn new(args: CleanArgs) -> Self {
        CleanCommand { args }
    }

    /// Both halves of clean — per-package and per-workspace — run in sequence by the
    /// scheduler, since a single command can only be one or the other.
    pub fn kinds(self) -> Vec<Command> {
        vec![
            Command::package(CleanPackageCommand { args: self.args.clone() }),
            Command::workspace(CleanWorkspaceCommand { args: self.args }),
        ]
    }
}

impl CoreCommand for CleanCommand {
    fn name(&self) -> String {
        "clean".into()
    }
}

/// Deletes every top-level entry listed after [`FENCE_LINE`] in `<dir>/.gitignore` that is
/// currently a symlink. Leaves the `.gitignore` contents untouched — rewriting the fence is
/// the scaffolding tool's job, not depot's.
fn remove_managed_symlinks(dir: &Path) -> Result<()> {
    let gitignore = dir.join(".gitignore");
    let Ok(contents) = fs::read_to_string(&gitignore) else {
        return Ok(());
    };

    let Some(fence_pos) = contents.find(FENCE_LINE) else {
        return Ok(());
    };

    for entry in contents[fence_pos + FENCE_LINE.len()..].lines() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let path = dir.join(entry);
        if fs::symlink_metadata(&path).map(|m| m.file_type().is_symlink()).unwrap_or(false) {
            fs::remove_file(&path)?;
        }
    }

    Ok(())
}

#[derive(Debug)]
struct CleanPackageCommand {
    args: CleanArgs,
}

impl CoreCommand for CleanPackageCommand {
    fn name(&self) -> String {
        "clean".into()
    }
}

#[async_trait::async_trait]
impl PackageCommand for CleanPackageCommand {
    async fn run_pkg(&self, pkg: &Package, _logger: &Logger) -> Result<()> {
        utils::remove_dir_if_present(&pkg.dist_dir())?;
        utils::remove_dir_if_present(&pkg.path("node_modules"))?;
        if self.args.all {
            remove_managed_symlinks(&pkg.root)?;
        }
        Ok(())
    }

    fn runtime(&self) -> CommandRuntime {
        CommandRuntime::RunImmediately
    }
}

#[derive(Debug)]
struct CleanWorkspaceCommand {
    args: CleanArgs,
}

impl CoreCommand for CleanWorkspaceCommand {
    fn name(&self) -> String {
        "clean".into()
    }
}

#[async_trait::async_trait]
impl WorkspaceCommand for CleanWorkspaceCommand {
    async fn run_ws(&self, ws: &Workspace, _logger: &Logger) -> Result<()> {
        utils::remove_dir_if_present(&ws.root.join("node_modules"))?;
        if self.args.all {
            remove_managed_symlinks(&ws.root)?;
        }
        Ok(())
    }
}
