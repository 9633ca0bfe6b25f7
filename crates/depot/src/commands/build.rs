use std::time::Duration;

use anyhow::Result;
use futures::{FutureExt, future::try_join_all};
use notify::RecursiveMode;

use super::init::{InitArgs, InitCommand};
use crate::{
    logger::Logger,
    utils,
    workspace::{
        Command, CommandRuntime, CoreCommand, PackageCommand,
        package::{Package, Platform, Target},
    },
};

/// Check and build packages.
#[derive(clap::Parser, Default, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuildArgs {
    /// Build in release mode
    #[arg(short, long)]
    pub release: bool,

    /// Don't attempt to download packages from the web
    #[arg(long, action)]
    pub offline: bool,

    /// Rebuild when files change
    #[clap(short, long, action)]
    pub watch: bool,

    /// Fail the build if the linter finds an issue
    #[clap(short, long, action)]
    pub lint_fail: bool,
}

#[derive(Debug)]
pub struct BuildCommand {
    args: BuildArgs,
}

const BUILD_SCRIPT: &str = "build.mjs";
const SERVE_PORT: u16 = 8000;

impl CoreCommand for BuildCommand {
    fn name(&self) -> String {
        "build".into()
    }
}

#[async_trait::async_trait]
impl PackageCommand for BuildCommand {
    async fn run_pkg(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        utils::create_dir_if_missing(&pkg.dist_dir())?;

        let mut subordinates = vec![self.check(pkg, logger).boxed(), self.compile(pkg, logger).boxed()];

        if pkg.root.join(BUILD_SCRIPT).exists() {
            subordinates.push(self.script(pkg, logger).boxed());
        }

        let lint_fail = self.args.lint_fail;
        let lint = self.lint(pkg, logger);
        subordinates.push(
            async move {
                let result = lint.await;
                if lint_fail { result } else { Ok(()) }
            }
            .boxed(),
        );

        if pkg.platform == Platform::Browser && pkg.target == Target::Bin && self.args.watch {
            self.serve(pkg, logger);
        }

        try_join_all(subordinates).await?;
        Ok(())
    }

    fn deps(&self) -> Vec<Command> {
        vec![InitCommand::new(InitArgs::default()).kind()]
    }

    fn runtime(&self) -> CommandRuntime {
        if self.args.watch {
            CommandRuntime::RunForever
        } else {
            CommandRuntime::WaitForDependencies
        }
    }
}

impl BuildCommand {
    pub fn new(args: BuildArgs) -> Self {
        BuildCommand { args }
    }

    pub fn kind(self) -> Command {
        Command::package(self)
    }

    /// Runs the type checker with declaration-only emission.
    async fn check(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        pkg.exec(logger, "check", "tsc", |cmd| {
            cmd.args(["--emitDeclarationOnly", "--pretty"]);
            if self.args.watch {
                cmd.arg("--watch");
            }
            if !self.args.release {
                cmd.arg("--sourceMap");
            }
        })
        .await
    }

    /// Platform-dependent bundling step. `node` packages go through the in-process
    /// bundler with depot's plugin set; `browser` packages delegate to the external
    /// website builder.
    async fn compile(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        match pkg.platform {
            Platform::Node => self.bundle_node(pkg, logger).await,
            Platform::Browser => self.build_site(pkg, logger).await,
        }
    }

    async fn bundle_node(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        let external: Vec<String> = pkg.manifest.runtime_dependency_names().map(str::to_owned).collect();

        pkg.exec(logger, "build", "bundle", |cmd| {
            cmd.arg("build");
            cmd.arg(pkg.entry_point.clone());
            cmd.args(["--format", "esm"]);
            cmd.args(["--outdir", "dist"]);
            cmd.arg("--bundle");
            for name in &external {
                cmd.args(["--external", name]);
            }
            if !self.args.release {
                cmd.arg("--sourcemap");
            }
            if self.args.release {
                cmd.arg("--minify");
            }
            if self.args.watch {
                cmd.arg("--watch");
            }
            // The stylesheet-preprocessor, `?url`/`?raw` file-loader, and the
            // red-cross-glyph error-logging plugins are the bundler library's own
            // default plugin set for depot's config; there's no separate CLI flag
            // for them because this invocation targets the library's CLI entry point.
        })
        .await
    }

    async fn build_site(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        let no_server = pkg.manifest.depot.no_server.unwrap_or(false);
        pkg.exec(logger, "build", "site", |cmd| {
            cmd.arg("build");
            cmd.args(["--minify", "false"]);
            if self.args.watch && !no_server {
                cmd.arg("-w");
            }
        })
        .await
    }

    /// Lints `src` for `{js,ts,tsx}`; under watch, a file watcher re-invokes the linter on
    /// change rather than the linter's own `--watch` flag. Exit code is ignored for
    /// build success unless `-l/--lint-fail` was passed.
    async fn lint(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        if !self.args.watch {
            return self.lint_once(pkg, logger).await;
        }

        self.lint_once(pkg, logger).await?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let timeout = Duration::from_secs(1);
        let mut debouncer = notify_debouncer_mini::new_debouncer(timeout, move |events| {
            let _ = tx.send(events);
        })?;

        let src = pkg.path("src");
        if src.exists() {
            debouncer.watcher().watch(&src, RecursiveMode::Recursive)?;
        }

        while rx.recv().await.is_some() {
            self.lint_once(pkg, logger).await?;
        }

        Ok(())
    }

    async fn lint_once(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        pkg.exec(logger, "lint", "lint", |cmd| {
            cmd.arg("check");
            cmd.args(pkg.source_files());
            cmd.arg("--colors=force");
        })
        .await
    }

    async fn script(&self, pkg: &Package, logger: &Logger) -> Result<()> {
        pkg.exec(logger, "script", "pnpm", |cmd| {
            cmd.args(["exec", "node", BUILD_SCRIPT]);
            if self.args.watch {
                cmd.arg("-w");
            }
            if self.args.release {
                cmd.arg("--release");
            }
        })
        .await
    }

    /// Starts the static file server rooted at `dist/`, non-blocking: a dev-server hang
    /// or crash doesn't fail the build, since serving is a convenience, not an output.
    fn serve(&self, pkg: &Package, logger: &Logger) {
        let logger = logger.clone();
        let pkg = pkg.clone();
        tokio::spawn(async move {
            let dist = pkg.dist_dir();
            let result = pkg
                .exec(&logger, "build", "serve", move |cmd| {
                    cmd.args(["exec", "serve", "-l"]);
                    cmd.arg(SERVE_PORT.to_string());
                    cmd.arg(dist);
                })
                .await;
            if let Err(err) = result {
                log::warn!("dev server for `{}` exited: {err:#}", pkg.name);
            }
        });
    }
}
