use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use super::{Command, CommandInner, PackageCommand, Workspace, package::Package};
use crate::logger::Logger;

/// Per-package state for one run of one command. A task starts only once every graph
/// dependency is `Finished`; every task ends `Finished` whether its subordinate
/// processes succeeded or not — failure doesn't stop the wave, only the aggregate
/// result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskStatus {
    Queued,
    Running,
    Finished,
}

/// Runs `commands` in sequence (each may itself pull in command-level dependencies,
/// e.g. `build` depending on `init`), ANDing their results. This is the entry point
/// `main` calls for every subcommand.
pub async fn run(ws: &Workspace, commands: Vec<Command>, logger: &Logger) -> Result<bool> {
    let mut overall = true;
    for command in commands {
        for dep in command_deps_in_order(&command) {
            if !run_one(ws, dep, logger).await? {
                overall = false;
            }
        }
        if !run_one(ws, command, logger).await? {
            overall = false;
        }
    }
    Ok(overall)
}

fn command_deps_in_order(command: &Command) -> Vec<Command> {
    fn visit(cmd: &Command, seen: &mut HashSet<String>, order: &mut Vec<Command>) {
        for dep in cmd.deps() {
            if seen.insert(dep.name()) {
                visit(&dep, seen, order);
                order.push(dep);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    visit(command, &mut seen, &mut order);
    order
}

async fn run_one(ws: &Workspace, command: Command, logger: &Logger) -> Result<bool> {
    match &*command {
        CommandInner::Package(cmd) => run_package_command(ws, &command, cmd.as_ref(), logger).await,
        CommandInner::Workspace(_) => match command.run_ws(ws, logger).await {
            Ok(()) => Ok(true),
            Err(err) => {
                log::error!("{}: {err:#}", command.name());
                Ok(false)
            }
        },
    }
}

async fn run_package_command(
    ws: &Workspace,
    command: &Command,
    cmd: &dyn PackageCommand,
    logger: &Logger,
) -> Result<bool> {
    let pkgs = ws.dependency_closure(&ws.roots);
    for pkg in &pkgs {
        logger.register_package(&pkg.name);
    }

    if cmd.parallel() {
        return run_flat(pkgs, command, logger).await;
    }

    run_waves(ws, pkgs, command, logger).await
}

/// Every eligible package starts at once, no wave ordering. Used for watch-mode builds
/// (where the UI needs every package live immediately) and for commands with no
/// dependency ordering to honor at all.
async fn run_flat(pkgs: Vec<Package>, command: &Command, logger: &Logger) -> Result<bool> {
    let mut set: JoinSet<(String, Result<()>)> = JoinSet::new();
    for pkg in pkgs {
        let command = command.clone();
        let logger = logger.clone();
        set.spawn(async move {
            let name = pkg.name.clone();
            (name, command.run_pkg(&pkg, &logger).await)
        });
    }

    let mut success = true;
    while let Some(res) = set.join_next().await {
        let (name, result) = res.context("a package task panicked")?;
        if let Err(err) = result {
            log::error!("{name}: {err:#}");
            success = false;
        }
    }
    Ok(success)
}

/// On each tick, every package that is `Queued` and whose direct dependencies are all
/// `Finished` is started; when a task finishes, it's marked `Finished` and the next tick
/// repeats until all packages finish.
async fn run_waves(
    ws: &Workspace,
    pkgs: Vec<Package>,
    command: &Command,
    logger: &Logger,
) -> Result<bool> {
    let by_name: HashMap<String, Package> = pkgs.iter().map(|p| (p.name.clone(), p.clone())).collect();
    let mut status: HashMap<String, TaskStatus> =
        pkgs.iter().map(|p| (p.name.clone(), TaskStatus::Queued)).collect();
    let deps: HashMap<String, HashSet<String>> = pkgs
        .iter()
        .map(|p| (p.name.clone(), ws.pkg_graph.direct_deps(p)))
        .collect();

    let mut set: JoinSet<(String, Result<()>)> = JoinSet::new();
    let mut success = true;

    loop {
        let ready: Vec<String> = status
            .iter()
            .filter(|(_, s)| **s == TaskStatus::Queued)
            .filter(|(name, _)| {
                deps[*name]
                    .iter()
                    .all(|dep| status.get(dep).map(|s| *s == TaskStatus::Finished).unwrap_or(true))
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in ready {
            status.insert(name.clone(), TaskStatus::Running);
            let pkg = by_name[&name].clone();
            let command = command.clone();
            let logger = logger.clone();
            set.spawn(async move { (name, command.run_pkg(&pkg, &logger).await) });
        }

        let Some(res) = set.join_next().await else {
            break;
        };
        let (name, result) = res.context("a package task panicked")?;
        if let Err(err) = result {
            log::error!("{name}: {err:#}");
            success = false;
        }
        status.insert(name, TaskStatus::Finished);
    }

    debug_assert!(status.values().all(|s| *s == TaskStatus::Finished));
    Ok(success)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn task_status_transitions_are_ordered() {
        assert_ne!(TaskStatus::Queued, TaskStatus::Finished);
    }
}
