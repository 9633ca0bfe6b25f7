use anyhow::Result;

use crate::{
    utils,
    workspace::process::{Process, ProcessBuilder, stdout_sink},
};

/// Raw trailing arguments for a passthrough subcommand (`add`, `update`, `link`),
/// forwarded to the installer verbatim.
#[derive(clap::Parser, Debug, Default)]
pub struct PassthroughArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Forwards `pnpm <verb> <args...>` from the current directory, unconnected to any loaded
/// `Workspace` — these installer verbs make sense from inside a single package directory
/// too, not just the workspace root.
pub async fn run(verb: &str, args: PassthroughArgs) -> Result<()> {
    let pnpm = utils::require_pnpm(None)?;

    let mut builder = ProcessBuilder::new(&pnpm);
    builder.arg(verb);
    builder.args(&args.args);

    let process = Process::spawn(format!("pnpm {verb}"), &builder, stdout_sink())?;
    process.wait_for_success().await
}
