#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

struct Env {
    home: TempDir,
    data: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(cargo_bin("wordtagger"));
        cmd.env("WORDTAGGER_HOME", self.home.path())
            .env("NO_COLOR", "1")
            .env_remove("WORDTAGGER_LOG");
        cmd
    }

    fn with_root() -> Self {
        let env = Self::new();
        env.cmd()
            .args(["root", "set"])
            .arg(env.data.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Using"));
        env
    }
}

#[test]
fn test_add_then_list_across_runs() {
    let env = Env::with_root();

    env.cmd()
        .args(["add", "cat", "-m", "feline", "-t", "root:spect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 'cat'"));

    env.cmd()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cat"))
        .stdout(predicate::str::contains("feline"))
        .stdout(predicate::str::contains("root:spect"));

    let nodes = fs::read_to_string(env.data.path().join("data/nodes/nodes.json")).unwrap();
    assert!(nodes.contains("\"text\": \"cat\""));
}

#[test]
fn test_add_tag_value_keeps_kind_words() {
    let env = Env::with_root();
    env.cmd()
        .args(["add", "sarsaparilla", "-t", "memory:sounds like root beer"])
        .assert()
        .success();

    env.cmd()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory:sounds like root beer"))
        .stdout(predicate::str::contains("root:beer").not());
}

#[test]
fn test_duplicate_is_rejected() {
    let env = Env::with_root();
    env.cmd()
        .args(["add", "cat", "-t", "root:spect"])
        .assert()
        .success();

    env.cmd()
        .args(["add", "Cat", "-t", "root:spect"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate entry 'cat'"))
        .stderr(predicate::str::contains("root:spect"));

    env.cmd()
        .args(["add", "cat", "-t", "memory:hat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("merged 1 new tag"));
}

#[test]
fn test_tag_line_replaces_tags() {
    let env = Env::with_root();
    env.cmd()
        .args(["add", "ice cream", "-t", "root:crem"])
        .assert()
        .success();

    env.cmd()
        .args(["tag", "ice", "cream", "memory", "cold", "and", "sweet"])
        .assert()
        .success();

    env.cmd()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory:cold and sweet"))
        .stdout(predicate::str::contains("root:crem").not());
}

#[test]
fn test_search_ranks_matches() {
    let env = Env::with_root();
    for (text, meaning) in [("gato", "cat"), ("perro", "dog")] {
        env.cmd()
            .args(["add", text, "-m", meaning])
            .assert()
            .success();
    }

    env.cmd()
        .args(["search", "cat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gato"))
        .stdout(predicate::str::contains("perro").not());
}

#[test]
fn test_deleting_a_layer_cascades() {
    let env = Env::with_root();
    env.cmd()
        .args(["layer", "add", "spanish", "-d", "Spanish"])
        .assert()
        .success();
    env.cmd()
        .args(["add", "gato", "-l", "spanish"])
        .assert()
        .success();
    env.cmd().args(["add", "cat"]).assert().success();

    env.cmd()
        .args(["layer", "delete", "spanish"])
        .assert()
        .success();

    env.cmd()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cat"))
        .stdout(predicate::str::contains("gato").not());
}

#[test]
fn test_clear_all_needs_confirmation() {
    let env = Env::with_root();
    env.cmd().args(["add", "cat"]).assert().success();

    env.cmd()
        .args(["clear-all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));

    env.cmd()
        .args(["clear-all", "--yes"])
        .assert()
        .success();
    env.cmd()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No entries"));
}

#[test]
fn test_save_writes_backups() {
    let env = Env::with_root();
    env.cmd()
        .args(["save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved to"));

    let backups = fs::read_dir(env.data.path().join("backups")).unwrap().count();
    assert!(backups >= 1);
}

#[test]
fn test_status_without_root() {
    let env = Env::new();
    env.cmd()
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("root:      none"))
        .stdout(predicate::str::contains("layers:    1"));
}

#[test]
fn test_protected_root_is_refused() {
    let env = Env::new();
    env.cmd()
        .args(["root", "set", "/etc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
}
