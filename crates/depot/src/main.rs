use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use depot::{
    CommonArgs,
    commands::{build, clean, fmt, init, new, passthrough, test},
    logger::Logger,
    workspace::{self, Workspace},
};

#[derive(Parser)]
#[command(name = "depot", version, about = "A devtool orchestrator for TypeScript workspaces")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new package
    New(new::NewArgs),
    /// Install dependencies and configure the workspace
    Init(init::InitArgs),
    /// Check and build packages
    Build(build::BuildArgs),
    /// Format source files
    Fmt(fmt::FmtArgs),
    /// Run the workspace's test suite
    Test(test::TestArgs),
    /// Remove generated files
    Clean(clean::CleanArgs),
    /// Forwarded verbatim to the installer
    Add(passthrough::PassthroughArgs),
    /// Forwarded verbatim to the installer
    Update(passthrough::PassthroughArgs),
    /// Forwarded verbatim to the installer
    Link(passthrough::PassthroughArgs),
    /// `clean && init && build && test`
    #[command(name = "commit-check")]
    CommitCheck,
    /// `init && build --release`
    Prepare,
}

fn init_logging(common: &CommonArgs) {
    let default_filter = std::env::var("DEPOT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| common.log_filter().to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn watch_requested(command: &Commands) -> bool {
    matches!(command, Commands::Build(args) if args.watch)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.common);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Kills every spawned child and exits 130, mirroring the watch-mode TUI's own
/// shutdown path on an outside SIGINT.
fn install_signal_handler() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            workspace::process::kill_all();
            std::process::exit(130);
        }
    });
}

async fn run(cli: Cli) -> Result<bool> {
    let is_watch = watch_requested(&cli.command);
    let Cli { common, command } = cli;

    match command {
        Commands::New(args) => {
            new::run(args).await?;
            Ok(true)
        }
        Commands::Add(args) => {
            install_signal_handler();
            passthrough::run("add", args).await.map(|()| true)
        }
        Commands::Update(args) => {
            install_signal_handler();
            passthrough::run("update", args).await.map(|()| true)
        }
        Commands::Link(args) => {
            install_signal_handler();
            passthrough::run("link", args).await.map(|()| true)
        }
        command => {
            install_signal_handler();
            let ws = Workspace::load(None, common).await?;

            let commands = match command {
                Commands::Build(args) => vec![build::BuildCommand::new(args).kind()],
                Commands::Fmt(args) => vec![fmt::FmtCommand::new(args).kind()],
                Commands::Clean(args) => clean::CleanCommand::new(args).kinds(),
                Commands::Test(args) => vec![test::TestCommand::new(args).kind()],
                Commands::Init(args) => vec![init::InitCommand::new(args).kind()],
                Commands::CommitCheck => {
                    let mut cmds = clean::CleanCommand::new(clean::CleanArgs::default()).kinds();
                    cmds.push(init::InitCommand::new(init::InitArgs::default()).kind());
                    cmds.push(build::BuildCommand::new(build::BuildArgs::default()).kind());
                    cmds.push(test::TestCommand::new(test::TestArgs::default()).kind());
                    cmds
                }
                Commands::Prepare => {
                    let release_args = build::BuildArgs { release: true, ..Default::default() };
                    vec![
                        init::InitCommand::new(init::InitArgs::default()).kind(),
                        build::BuildCommand::new(release_args).kind(),
                    ]
                }
                Commands::New(_) | Commands::Add(_) | Commands::Update(_) | Commands::Link(_) => {
                    unreachable!("handled above")
                }
            };

            let package_names: Vec<String> = ws.package_display_order().map(|p| p.name.clone()).collect();
            let initial = match ws.roots.as_slice() {
                [only] => Some(only.name.as_str()),
                _ => None,
            };

            let logger = if is_watch { Logger::watch(package_names, initial) } else { Logger::once() };
            let _watch_ui = logger.start();

            let success = workspace::runner::run(&ws, commands, &logger).await?;
            logger.end();

            Ok(success)
        }
    }
}
