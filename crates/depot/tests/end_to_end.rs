//! Drives the compiled `depot` binary against throwaway workspaces, covering the
//! end-to-end scenarios enumerated alongside the testable properties.

use std::os::unix::fs::symlink;

use depot_test_utils::{Fixture, PackageSpec};

#[test]
fn single_package_library_build() {
    let fixture = Fixture::single(
        PackageSpec::new("foo").file("src/lib.ts", "export let foo = 'bar';\n"),
    )
    .unwrap();

    fixture.depot(&["build"]).success();
    assert!(fixture.exists("dist/lib.js"));
}

#[test]
fn type_error_fails_the_build() {
    let fixture = Fixture::single(
        PackageSpec::new("foo").file("src/lib.ts", "export let foo: number = 'bar';"),
    )
    .unwrap();

    fixture.depot(&["build"]).failure();
}

#[test]
fn website_build_produces_index_html() {
    let fixture = Fixture::single(
        PackageSpec::new("foo")
            .file("src/index.tsx", "export let foo = 'bar';\n")
            .file("index.html", "<!doctype html><html><body></body></html>\n"),
    )
    .unwrap();

    fixture.depot(&["build"]).success();
    assert!(fixture.exists("dist/index.html"));
}

#[test]
fn monorepo_builds_dependency_before_dependent() {
    let fixture = Fixture::monorepo(
        "monorepo",
        vec![
            PackageSpec::new("foo").file("src/lib.ts", "export let foo = 'bar';\n"),
            PackageSpec::new("bar")
                .dependency("foo", "0.0.1")
                .file("src/main.ts", "import { foo } from 'foo';\nconsole.log(foo);\n"),
        ],
    )
    .unwrap();

    fixture.depot(&["build"]).success();
    assert!(fixture.exists("packages/foo/dist/lib.js"));
    assert!(fixture.exists("packages/bar/dist/main.js"));
}

#[test]
fn clean_with_all_removes_managed_symlinks() {
    let fixture = Fixture::single(PackageSpec::new("foo").file("src/lib.ts", "export let foo = 1;\n")).unwrap();

    fixture.depot(&["init"]).success();

    let target = fixture.root().join(".eslintrc.base.cjs");
    std::fs::write(&target, "module.exports = {};\n").unwrap();
    symlink(&target, fixture.root().join(".eslintrc.cjs")).unwrap();
    fixture.write(".prettierrc", "{}\n").unwrap();

    fixture
        .write(
            ".gitignore",
            "node_modules\n# Managed by depot\n.eslintrc.cjs\n.prettierrc\n",
        )
        .unwrap();

    fixture.depot(&["clean", "-a"]).success();

    assert!(!fixture.exists(".eslintrc.cjs"), "the managed symlink should be removed");
    assert!(fixture.exists(".prettierrc"), "a plain file listed after the fence is not a symlink and stays");
}

#[test]
fn test_command_fails_when_assertion_fails() {
    let fixture = Fixture::single(
        PackageSpec::new("foo")
            .file("src/lib.ts", "export let foo = 1;\n")
            .file(
                "lib.test.ts",
                "import { expect, test } from 'vitest';\nimport { foo } from './src/lib';\ntest('foo is 1', () => expect(foo).toBe(1));\n",
            )
            .file("vitest.config.ts", "export default {};\n"),
    )
    .unwrap();

    fixture.depot(&["build"]).success();
    fixture.depot(&["test"]).success();

    fixture
        .write(
            "lib.test.ts",
            "import { expect, test } from 'vitest';\nimport { foo } from './src/lib';\ntest('foo is 1', () => expect(foo).toBe(0));\n",
        )
        .unwrap();
    fixture.depot(&["test"]).failure();
}
