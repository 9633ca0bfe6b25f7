use anyhow::Result;

use crate::{
    logger::Logger,
    workspace::{Command, CoreCommand, Workspace, WorkspaceCommand},
};

const TEST_CONFIG_CANDIDATES: &[&str] = &["vitest.config.ts", "vitest.config.js"];

/// Run the workspace's test suite.
#[derive(clap::Parser, Debug, Default)]
pub struct TestArgs {
    /// Additional arguments to pass to the test runner
    #[arg(last = true)]
    pub test_args: Option<String>,
}

#[derive(Debug)]
pub struct TestCommand {
    args: TestArgs,
}

impl TestCommand {
    pub fn new(args: TestArgs) -> Self {
        TestCommand { args }
    }

    pub fn kind(self) -> Command {
        Command::workspace(self)
    }
}

impl CoreCommand for TestCommand {
    fn name(&self) -> String {
        "test".into()
    }
}

#[async_trait::async_trait]
impl WorkspaceCommand for TestCommand {
    async fn run_ws(&self, ws: &Workspace, logger: &Logger) -> Result<()> {
        let Some(_config) = TEST_CONFIG_CANDIDATES
            .iter()
            .map(|name| ws.root.join(name))
            .find(|path| path.exists())
        else {
            log::info!("no test config found at workspace root, skipping `test`");
            return Ok(());
        };

        let extra = match &self.args.test_args {
            Some(args) => shlex::split(args).unwrap_or_default(),
            None => Vec::new(),
        };

        logger.register_pane("workspace", "test");
        ws.exec(logger, "test", "workspace", "vitest", |cmd| {
            cmd.args(["run", "--color"]);
            cmd.args(extra);
        })
        .await
    }
}
