use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn vaultlink(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("vaultlink").unwrap();
    cmd.arg("--vault").arg(root).env_remove("RUST_LOG");
    cmd
}

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

fn built_vault(files: &[(&str, &str)]) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    for (path, content) in files {
        write(tmp.path(), path, content);
    }
    vaultlink(tmp.path()).args(["build", "-q"]).assert().success();
    tmp
}

#[test]
fn status_without_index_exits_3() {
    let tmp = tempfile::tempdir().unwrap();
    vaultlink(tmp.path())
        .arg("status")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("index not found"));
}

#[test]
fn build_reports_counts_as_json() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "A.md", "[[B]] [[Missing]] #todo\n");
    write(tmp.path(), "B.md", "[[A]]\n");

    vaultlink(tmp.path())
        .args(["--json", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"notes\": 2"))
        .stdout(predicate::str::contains("\"phantoms\": 1"))
        .stdout(predicate::str::contains("\"tags\": 1"));

    assert!(tmp.path().join(".vaultlink/index.db").exists());
}

#[test]
fn strict_build_fails_on_ambiguous_link() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "x/A.md", "");
    write(tmp.path(), "y/A.md", "");
    write(tmp.path(), "B.md", "[[A]]\n");

    vaultlink(tmp.path())
        .args(["build", "--strict"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("ambiguous link"));
}

#[test]
fn status_shows_counts_after_build() {
    let tmp = built_vault(&[("A.md", "[[B]]\n"), ("B.md", "")]);
    vaultlink(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Notes:"))
        .stdout(predicate::str::contains("Built: never").not());
}

#[test]
fn add_refuses_ambiguity_then_auto_disambiguates() {
    let tmp = built_vault(&[("sub/A.md", "a\n"), ("B.md", "see [[A]]\n")]);
    write(tmp.path(), "other/A.md", "other\n");

    vaultlink(tmp.path())
        .args(["add", "other/A.md"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("ambiguous"));
    assert_eq!(std::fs::read_to_string(tmp.path().join("B.md")).unwrap(), "see [[A]]\n");

    vaultlink(tmp.path())
        .args(["add", "other/A.md", "--auto-disambiguate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[[sub/A]]"));
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("B.md")).unwrap(),
        "see [[sub/A]]\n"
    );
}

#[test]
fn add_unknown_file_exits_3() {
    let tmp = built_vault(&[("A.md", "")]);
    vaultlink(tmp.path())
        .args(["add", "ghost.md"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn delete_policy_flag_controls_disk() {
    let tmp = built_vault(&[("A.md", ""), ("B.md", "[[A]]\n")]);

    vaultlink(tmp.path())
        .args(["delete", "A.md"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("still exists"));

    vaultlink(tmp.path())
        .args(["delete", "A.md", "--policy", "remove-file"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept as missing target"));
    assert!(!tmp.path().join("A.md").exists());
}

#[test]
fn backlinks_lists_sources() {
    let tmp = built_vault(&[("A.md", ""), ("B.md", "x\n[[A|alias]]\n")]);
    vaultlink(tmp.path())
        .args(["backlinks", "A.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B.md"))
        .stdout(predicate::str::contains("[[A|alias]]"));
}

#[test]
fn disambiguate_scan_only_leaves_index_alone() {
    let tmp = built_vault(&[("sub/A.md", ""), ("B.md", "[[A]]\n")]);
    vaultlink(tmp.path())
        .args(["disambiguate", "A", "--scan-only"])
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(tmp.path().join("B.md")).unwrap(), "[[sub/A]]\n");

    vaultlink(tmp.path())
        .args(["--json", "backlinks", "sub/A.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"raw_link\": \"[[A]]\""));
}

#[test]
fn bad_config_exits_2() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), ".vaultlink/config.toml", "[index\n");
    vaultlink(tmp.path())
        .arg("build")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}
