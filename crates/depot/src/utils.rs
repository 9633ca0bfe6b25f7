use std::{
    env,
    fs::{self, File, Permissions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

pub fn create_dir_if_missing(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create directory: {}", dir.display()))?;
    }
    Ok(())
}

pub fn remove_dir_if_present(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Could not remove directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Walks upward from `cwd` looking for a directory containing `.git`, stopping at the
/// filesystem root. Mirrors what invoking `git rev-parse --show-toplevel` would return,
/// without requiring git on `PATH`.
pub fn get_git_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

const HOME_ENV_VAR: &str = "DEPOT_HOME";

fn depot_home() -> Result<PathBuf> {
    match env::var(HOME_ENV_VAR) {
        Ok(val) => Ok(PathBuf::from(val)),
        Err(_) => {
            let home_dir = home::home_dir().context("Could not find home directory")?;
            Ok(home_dir.join(".local"))
        }
    }
}

/// Locates the `pnpm` binary depot shells out to for every external tool invocation.
/// Preference order: the workspace's own `node_modules/.bin/pnpm`, depot's managed
/// download under `DEPOT_HOME`, then whatever `pnpm` resolves to on `PATH`.
pub fn find_pnpm(workspace_root: Option<&Path>) -> Option<PathBuf> {
    if let Some(root) = workspace_root {
        let local = root.join("node_modules").join(".bin").join("pnpm");
        if local.exists() {
            return Some(local);
        }
    }

    if let Ok(home) = depot_home() {
        let managed = home.join("bin").join("pnpm");
        if managed.exists() {
            return Some(managed);
        }
    }

    pathsearch::find_executable_in_path("pnpm")
}

const PNPM_VERSION: &str = "9.1.1";

async fn download_file(url: &str, mut dst: impl Write) -> Result<()> {
    let res = reqwest::get(url).await?;
    let total_size = res
        .content_length()
        .context("Failed to get content length")?;

    log::debug!("Starting download...");
    let bar = ProgressBar::new(total_size);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let mut stream = res.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        dst.write_all(&chunk)?;
        downloaded = (downloaded + chunk.len() as u64).min(total_size);
        bar.set_position(downloaded);
    }

    bar.finish();
    Ok(())
}

/// Downloads a static `pnpm` binary into `DEPOT_HOME` when the host has none installed.
/// This is the one piece of machine-wide setup depot performs outside any workspace;
/// everything else (`new`, config symlinking) is left to the scaffolding tool.
pub async fn ensure_pnpm_installed() -> Result<PathBuf> {
    if let Some(existing) = find_pnpm(None) {
        return Ok(existing);
    }

    let home = depot_home()?;
    create_dir_if_missing(&home)?;
    let bindir = home.join("bin");
    create_dir_if_missing(&bindir)?;

    let dst = bindir.join("pnpm");
    let platform = match env::consts::OS {
        "macos" | "ios" => "macos",
        "windows" => "win",
        _ => "linuxstatic",
    };
    let arch = match env::consts::ARCH {
        "arm" => "arm64",
        _ => "x64",
    };
    let url = format!(
        "https://github.com/pnpm/pnpm/releases/download/v{PNPM_VERSION}/pnpm-{platform}-{arch}"
    );

    let mut file =
        File::create(&dst).with_context(|| format!("Could not create {}", dst.display()))?;
    download_file(&url, BufWriter::new(&mut file)).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(Permissions::from_mode(0o555))?;
    }

    Ok(dst)
}

pub fn require_pnpm(workspace_root: Option<&Path>) -> Result<PathBuf> {
    find_pnpm(workspace_root).ok_or_else(|| {
        anyhow::anyhow!(
            "could not find pnpm on your system; run `depot setup` or install pnpm manually"
        )
    })
}

pub fn indent(s: &str, by: usize) -> String {
    let prefix = " ".repeat(by);
    s.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
