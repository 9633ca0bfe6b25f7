use std::{
    ffi::{OsStr, OsString},
    io::Read,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock, Weak},
    thread,
};

use anyhow::{Context, Result, ensure};
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use tokio::sync::watch;

/// Builds up the program, arguments, environment, and working directory for a subordinate
/// process, mirroring the ergonomics of [`tokio::process::Command`] while targeting
/// depot's own pty-backed [`Process::spawn`] instead of a plain pipe.
pub struct ProcessBuilder {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: std::env::vars_os().collect(),
            cwd: None,
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    pub fn env(&mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> &mut Self {
        let key = key.as_ref().to_os_string();
        let val = val.as_ref().to_os_string();
        if let Some(existing) = self.envs.iter_mut().find(|(k, _)| k == &key) {
            existing.1 = val;
        } else {
            self.envs.push((key, val));
        }
        self
    }

    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Receives raw byte chunks from a process's pty, in arrival order, chunk boundaries
/// exactly as the pty delivered them. Watch-mode panes rely on this: progress meters and
/// carriage-return redraws only make sense if a chunk is never split mid-escape-sequence
/// by artificial line buffering.
pub type OnData = Box<dyn Fn(&[u8]) + Send + Sync>;

pub fn stdout_sink() -> OnData {
    use std::io::Write;
    Box::new(|chunk: &[u8]| {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(chunk);
        let _ = out.flush();
    })
}

pub struct Process {
    pub name: String,
    killer: Mutex<Box<dyn portable_pty::ChildKiller + Send + Sync>>,
    exit_rx: watch::Receiver<Option<i32>>,
}

fn registry() -> &'static Mutex<Vec<Weak<Process>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Weak<Process>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Kills every still-registered process. Called from depot's SIGINT/SIGTERM handler and
/// from the watch-mode TUI's own exit keybindings, so both cancellation paths converge on
/// one "no orphaned children" guarantee.
pub fn kill_all() {
    let mut guard = registry().lock().unwrap();
    guard.retain(|weak| weak.upgrade().is_some());
    for weak in guard.iter() {
        if let Some(process) = weak.upgrade() {
            let _ = process.kill();
        }
    }
}

impl Process {
    /// Spawns `builder.program` under a pseudo-terminal so interactive CLIs (tsc, vite,
    /// biome) detect a TTY and emit their normal colored, cursor-addressed output, and
    /// streams whatever they write to `on_data` chunk-by-chunk as it arrives.
    pub fn spawn(name: String, builder: &ProcessBuilder, on_data: OnData) -> Result<std::sync::Arc<Process>> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 40,
                cols: 160,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to allocate a pseudo-terminal")?;

        let mut cmd = CommandBuilder::new(&builder.program);
        cmd.args(builder.args.iter());
        cmd.env_clear();
        for (k, v) in &builder.envs {
            cmd.env(k, v);
        }
        if let Some(cwd) = &builder.cwd {
            cmd.cwd(cwd);
        }

        let mut child = pair.slave.spawn_command(cmd).with_context(|| {
            format!(
                "Failed to spawn `{}` (looked for it via depot's module resolution)",
                builder.program.to_string_lossy()
            )
        })?;
        drop(pair.slave);

        let killer = child.clone_killer();
        let mut reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone pty reader")?;

        let (tx, rx) = watch::channel(None);

        thread::spawn(move || {
            let status = child.wait();
            let code = status.map(|s| s.exit_code() as i32).unwrap_or(-1);
            let _ = tx.send(Some(code));
        });

        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => on_data(&buf[..n]),
                    Err(_) => break,
                }
            }
            // Keep the master side alive for the duration of the read loop.
            drop(pair.master);
        });

        let process = std::sync::Arc::new(Process {
            name,
            killer: Mutex::new(killer),
            exit_rx: rx,
        });

        registry().lock().unwrap().push(std::sync::Arc::downgrade(&process));

        Ok(process)
    }

    pub async fn wait(&self) -> Result<i32> {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(code) = *rx.borrow() {
                return Ok(code);
            }
            rx.changed()
                .await
                .context("Process exit watcher dropped unexpectedly")?;
        }
    }

    pub async fn wait_for_success(&self) -> Result<()> {
        let code = self.wait().await?;
        ensure!(code == 0, "`{}` exited with status {}", self.name, code);
        Ok(())
    }

    pub fn kill(&self) -> Result<()> {
        self.killer
            .lock()
            .unwrap()
            .kill()
            .with_context(|| format!("Failed to kill `{}`", self.name))
    }
}
