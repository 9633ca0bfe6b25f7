use anyhow::Result;

use crate::{
    logger::Logger,
    utils,
    workspace::{Command, CoreCommand, Workspace, WorkspaceCommand},
};

/// Install dependencies and configure the workspace.
#[derive(clap::Parser, Debug, Default)]
pub struct InitArgs {
    /// Don't attempt to download packages from the web
    #[arg(long, action)]
    pub offline: bool,
}

#[derive(Debug)]
pub struct InitCommand {
    args: InitArgs,
}

impl InitCommand {
    pub fn new(args: InitArgs) -> Self {
        InitCommand { args }
    }

    pub fn kind(self) -> Command {
        Command::workspace(self)
    }
}

impl CoreCommand for InitCommand {
    fn name(&self) -> String {
        "init".into()
    }
}

#[async_trait::async_trait]
impl WorkspaceCommand for InitCommand {
    async fn run_ws(&self, ws: &Workspace, logger: &Logger) -> Result<()> {
        logger.register_pane("workspace", "init");

        if !self.args.offline {
            utils::ensure_pnpm_installed().await?;
        }

        ws.exec(logger, "init", "workspace", "pnpm", |cmd| {
            cmd.arg("install");
            if self.args.offline {
                cmd.arg("--offline");
            }
        })
        .await

        // Asset-symlink maintenance (default lint/format/tsconfig config files,
        // the `.gitignore` fence) is scaffolding-tool territory, not depot's.
    }
}
