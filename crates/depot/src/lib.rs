pub mod commands;
pub mod logger;
pub mod utils;
pub mod workspace;

mod macros;

pub(crate) use macros::shareable;

/// CLI arguments shared by every subcommand: which packages to restrict to, and how
/// verbose depot's own diagnostic logging should be.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Restrict to these packages and their workspace-local dependencies. Defaults to
    /// every package in the workspace.
    #[arg(short = 'p', long = "packages", value_name = "NAME", num_args = 1..)]
    pub packages: Vec<String>,

    /// Increase depot's own diagnostic verbosity (-v, -vv). Does not affect subordinate
    /// process output, which is unconditionally captured by the Logger Abstraction.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
