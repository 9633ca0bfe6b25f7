use anyhow::{Context, Result};

use crate::{
    logger::Logger,
    workspace::{Command, CommandRuntime, CoreCommand, PackageCommand, package::Package},
};

/// Format source files.
#[derive(clap::Parser, Debug, Default)]
pub struct FmtArgs {
    /// Additional arguments to pass to the formatter
    #[arg(last = true)]
    pub formatter_args: Option<String>,
}

#[derive(Debug)]
pub struct FmtCommand {
    args: FmtArgs,
}

impl FmtCommand {
    pub fn new(args: FmtArgs) -> Self {
        FmtCommand { args }
    }

    pub fn kind(self) -> Command {
        Command::package(self)
    }
}

impl CoreCommand for FmtCommand {
    fn name(&self) -> String {
        "fmt".into()
    }
}

#[async_trait::async_trait]
impl PackageCommand for FmtCommand {
    async fn run_pkg(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        let extra = match &self.args.formatter_args {
            Some(args) => shlex::split(args).context("Failed to parse formatter args")?,
            None => Vec::new(),
        };

        logger.register_pane(&pkg.name, "fmt");
        pkg.exec(logger, "fmt", "format", |cmd| {
            cmd.arg("check");
            cmd.arg("--fix");
            cmd.args(pkg.format_files());
            cmd.args(extra);
        })
        .await
    }

    fn runtime(&self) -> CommandRuntime {
        CommandRuntime::RunImmediately
    }
}
