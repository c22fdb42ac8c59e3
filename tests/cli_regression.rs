// CLI behaviour through the compiled binary.
// Requires: assert_cmd, predicates, tempfile in [dev-dependencies]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn ion11() -> Command {
    Command::cargo_bin("ion11").unwrap()
}

#[test]
fn varint_prints_hex() {
    ion11()
        .args(["varint", "flex-uint", "729"])
        .assert()
        .success()
        .stdout("66 0B\n");
    ion11()
        .args(["varint", "fixed-int", "-1"])
        .assert()
        .success()
        .stdout("FF\n");
}

#[test]
fn encode_writes_a_binary_stream() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("doc.json");
    fs::write(&input, "[true, true]").unwrap();
    ion11()
        .arg("encode")
        .arg(&input)
        .assert()
        .success()
        .stdout("E0 01 01 EA B2 6E 6E\n");

    let output = dir.path().join("doc.10n");
    ion11()
        .arg("encode")
        .arg(&input)
        .arg("--delimited")
        .arg("--output")
        .arg(&output)
        .assert()
        .success();
    assert_eq!(fs::read(&output).unwrap(), vec![0xE0, 0x01, 0x01, 0xEA, 0xF1, 0x6E, 0x6E, 0xF0]);
}

#[test]
fn macros_lists_the_catalogue() {
    ion11()
        .arg("macros")
        .assert()
        .success()
        .stdout(contains("make_string (text*)"))
        .stdout(contains("repeat (n value*)"));
}

#[test]
fn expand_prints_one_value_per_line() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("expand.json");
    fs::write(
        &input,
        r#"{"macros": [["macro", "twice", ["x"], ["values", [";", "x", "x"]]]], "invoke": ["twice", ["sum", 1, 2]]}"#,
    )
    .unwrap();
    ion11().arg("expand").arg(&input).assert().success().stdout("3\n3\n");
}

#[test]
fn errors_carry_a_diagnostic_code() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.json");
    fs::write(&input, r#"{"invoke": ["no_such_macro"]}"#).unwrap();
    ion11()
        .arg("expand")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("ion11::signature"));

    let config = dir.path().join("options.yaml");
    fs::write(&config, "writer:\n  length_prefix_preallocation: 9\n").unwrap();
    ion11()
        .args(["encode", "--config"])
        .arg(&config)
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("ion11::config").and(contains("help")));
}
