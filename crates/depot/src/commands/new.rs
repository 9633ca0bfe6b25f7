use anyhow::Result;
use clap::ValueEnum;

use crate::{
    utils,
    workspace::process::{Process, ProcessBuilder, stdout_sink},
};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TargetArg {
    Lib,
    Bin,
    Site,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PlatformArg {
    Browser,
    Node,
}

/// Scaffold a new package. The scaffolding logic itself (templated `package.json`,
/// `tsconfig.json`, managed config symlinks, `.gitignore` fence entries) lives in an
/// external collaborator; depot only resolves `pnpm` and dispatches to it.
#[derive(clap::Parser, Debug)]
pub struct NewArgs {
    pub name: String,

    #[arg(short = 't', long, value_enum, default_value = "lib")]
    pub target: TargetArg,

    #[arg(short = 'p', long = "platform", value_enum, default_value = "node")]
    pub platform: PlatformArg,

    #[arg(short, long, action)]
    pub watch: bool,
}

pub async fn run(args: NewArgs) -> Result<()> {
    let pnpm = utils::require_pnpm(None)?;
    let target = match args.target {
        TargetArg::Lib => "lib",
        TargetArg::Bin => "bin",
        TargetArg::Site => "site",
    };
    let platform = match args.platform {
        PlatformArg::Browser => "browser",
        PlatformArg::Node => "node",
    };

    let mut builder = ProcessBuilder::new(&pnpm);
    builder.args(["exec", "depot-new", &args.name, "--target", target, "--platform", platform]);
    if args.watch {
        builder.arg("--watch");
    }

    let process = Process::spawn("depot-new".to_owned(), &builder, stdout_sink())?;
    process.wait_for_success().await
}
