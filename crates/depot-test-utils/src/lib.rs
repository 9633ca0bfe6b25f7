use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use either::Either;
use snapbox::cmd::{Command as SnapCommand, OutputAssert, cargo_bin};
use tempfile::TempDir;

/// Where a fixture's files live: a `TempDir` normally, torn down on drop, or a fixed path
/// under `DEPOT_TEST_KEEP` for inspecting a failing fixture by hand after the test exits.
type Workdir = Either<TempDir, PathBuf>;

/// One package to materialize into a fixture workspace: its manifest fields plus a map of
/// relative path to file contents.
#[derive(Default)]
pub struct PackageSpec {
    pub name: String,
    pub files: HashMap<String, String>,
    pub dependencies: HashMap<String, String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        PackageSpec { name: name.into(), ..Default::default() }
    }

    pub fn file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn dependency(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), version.into());
        self
    }
}

/// A throwaway workspace on disk for driving the compiled `depot` binary end-to-end:
/// a single-package or monorepo directory tree with real `package.json` files.
pub struct Fixture {
    dir: Workdir,
}

fn new_workdir(label: &str) -> Result<Workdir> {
    if let Ok(root) = env::var("DEPOT_TEST_KEEP") {
        let dir = PathBuf::from(root).join(label);
        fs::create_dir_all(&dir).with_context(|| format!("Could not create {}", dir.display()))?;
        return Ok(Either::Right(dir));
    }
    Ok(Either::Left(
        TempDir::new().context("Could not create fixture directory")?,
    ))
}

impl Fixture {
    /// A single-package workspace: `package.json` and fixture files live at the root.
    pub fn single(pkg: PackageSpec) -> Result<Self> {
        let dir = new_workdir(&pkg.name)?;
        write_package(root_of(&dir), &pkg)?;
        Ok(Fixture { dir })
    }

    /// A monorepo workspace: `<root>/packages/<name>/...` per package, plus a root manifest.
    pub fn monorepo(name: &str, packages: Vec<PackageSpec>) -> Result<Self> {
        let dir = new_workdir(name)?;
        let root = root_of(&dir);
        fs::write(root.join("package.json"), r#"{"name": "root", "private": true}"#)
            .with_context(|| format!("Could not write root manifest in {}", root.display()))?;

        let pkg_dir = root.join("packages");
        fs::create_dir_all(&pkg_dir)?;
        for pkg in &packages {
            write_package(&pkg_dir.join(&pkg.name), pkg)?;
        }

        Ok(Fixture { dir })
    }

    pub fn root(&self) -> &Path {
        root_of(&self.dir)
    }

    /// Runs the compiled `depot` binary with `args` from this fixture's root and returns
    /// an assertion object for checking exit code and captured stdout/stderr.
    pub fn depot(&self, args: &[&str]) -> OutputAssert {
        SnapCommand::new(cargo_bin("depot"))
            .current_dir(self.root())
            .args(args)
            .assert()
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.root().join(rel).exists()
    }

    pub fn read(&self, rel: impl AsRef<Path>) -> Result<String> {
        let path = self.root().join(rel);
        fs::read_to_string(&path).with_context(|| format!("Could not read {}", path.display()))
    }

    pub fn write(&self, rel: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents.as_ref()).with_context(|| format!("Could not write {}", path.display()))
    }
}

fn root_of(dir: &Workdir) -> &Path {
    match dir {
        Either::Left(tmp) => tmp.path(),
        Either::Right(path) => path,
    }
}

fn write_package(dir: &Path, pkg: &PackageSpec) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))?;

    let manifest = serde_json::json!({
        "name": pkg.name,
        "version": "0.0.1",
        "dependencies": pkg.dependencies,
    });
    fs::write(dir.join("package.json"), serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Could not write manifest for {}", pkg.name))?;

    for (rel, contents) in &pkg.files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("Could not write {}", path.display()))?;
    }

    Ok(())
}

/// Splits a shell-style argument string the way `FmtArgs`/`TestArgs`'s
/// `#[arg(last = true)]` fields expect to receive one from the CLI.
pub fn split_args(s: &str) -> Result<Vec<String>> {
    shlex::split(s).with_context(|| format!("Could not parse shell arguments: {s}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_fixture_writes_manifest_and_files() {
        let fixture = Fixture::single(
            PackageSpec::new("foo").file("src/lib.ts", "export let foo = 'bar';\n"),
        )
        .unwrap();
        assert!(fixture.exists("package.json"));
        assert!(fixture.exists("src/lib.ts"));
    }

    #[test]
    fn monorepo_fixture_lays_out_packages_dir() {
        let fixture = Fixture::monorepo(
            "mono",
            vec![
                PackageSpec::new("foo").file("src/lib.ts", "export let foo = 1;\n"),
                PackageSpec::new("bar")
                    .dependency("foo", "0.0.1")
                    .file("src/main.ts", "import { foo } from 'foo';\n"),
            ],
        )
        .unwrap();
        assert!(fixture.exists("packages/foo/src/lib.ts"));
        assert!(fixture.exists("packages/bar/src/main.ts"));
    }
}
