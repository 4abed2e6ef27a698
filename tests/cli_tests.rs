//! CLI integration tests for the `tally` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn run_counts_words_from_a_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "hello world hello distributed systems mapreduce world"
    )
    .unwrap();

    Command::cargo_bin("tally")
        .unwrap()
        .args(["run", "--mappers", "3"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("hello 2"))
        .stdout(predicate::str::contains("world 2"))
        .stdout(predicate::str::contains("mapreduce 1"));
}

#[test]
fn run_reads_stdin_when_no_file_is_given() {
    Command::cargo_bin("tally")
        .unwrap()
        .arg("run")
        .write_stdin("alpha beta alpha")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha 2"))
        .stdout(predicate::str::contains("beta 1"));
}

#[test]
fn empty_input_exits_with_an_error() {
    Command::cargo_bin("tally")
        .unwrap()
        .arg("run")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn zero_mappers_exits_with_an_error() {
    Command::cargo_bin("tally")
        .unwrap()
        .args(["run", "--mappers", "0"])
        .write_stdin("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn json_output_is_a_done_report() {
    let output = Command::cargo_bin("tally")
        .unwrap()
        .args(["run", "--json"])
        .write_stdin("one two one")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["status"], "done");
    assert_eq!(report["final_counts"]["one"], 2);
    assert_eq!(report["final_counts"]["two"], 1);
}
