//! CLI test cases.
//!
//! The `classify` and `schema` subcommands run entirely offline, so we can
//! test them for real. `scan` needs poppler and an OCR backend, so here we
//! only check its failure behavior; the pipeline itself is covered by unit
//! tests with a stub engine.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("docscreen").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_classify_jsonl_input() {
    cmd()
        .arg("classify")
        .arg("tests/fixtures/texts/input.jsonl")
        .arg("--surname")
        .arg("Dupont")
        .arg("--given-name")
        .arg("Jean")
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""document_type":"identity_card""#)
                .and(predicate::str::contains(r#""document_type":"passport""#))
                .and(predicate::str::contains(r#""document_type":"unknown""#))
                .and(predicate::str::contains(r#""matched":true"#)),
        );
}

#[test]
fn test_classify_csv_input() {
    cmd()
        .arg("classify")
        .arg("tests/fixtures/texts/input.csv")
        .arg("--surname")
        .arg("Dupont")
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""document_type":"identity_card""#)
                .and(predicate::str::contains(r#""document_type":"bank_details""#)),
        );
}

#[test]
fn test_classify_without_names_omits_matched() {
    cmd()
        .arg("classify")
        .arg("tests/fixtures/texts/input.jsonl")
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""document_type":"identity_card""#)
                .and(predicate::str::contains(r#""matched""#).not()),
        );
}

#[test]
fn test_classify_disabled_types_fall_through() {
    // With passports disabled, the passport fixture should classify as an
    // identity card via its "république française" markers.
    cmd()
        .arg("classify")
        .arg("tests/fixtures/texts/input.jsonl")
        .arg("--types")
        .arg("identity-card,residence-permit")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""document_type":"passport""#).not());
}

#[test]
fn test_classify_with_custom_rules() {
    // The custom rule set only knows about passports.
    cmd()
        .arg("classify")
        .arg("tests/fixtures/texts/input.jsonl")
        .arg("--rules")
        .arg("tests/fixtures/rules/passport_only.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""document_type":"identity_card""#).not());
}

#[test]
fn test_schema() {
    cmd()
        .arg("schema")
        .arg("RuleSet")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("min_matches")
                .and(predicate::str::contains("keywords")),
        );
    cmd()
        .arg("schema")
        .arg("ScanOutput")
        .assert()
        .success()
        .stdout(predicate::str::contains("document_type"));
}

#[test]
fn test_scan_rejects_missing_input_file() {
    cmd()
        .arg("scan")
        .arg("tests/fixtures/does_not_exist.jsonl")
        .arg("--surname")
        .arg("Dupont")
        .assert()
        .failure();
}

#[test]
#[ignore = "Requires poppler-utils and network access to the OCR backend"]
fn test_scan_end_to_end() {
    cmd()
        .arg("scan")
        .arg("tests/fixtures/scan/input.jsonl")
        .arg("--surname")
        .arg("Dupont")
        .args(["--jobs", "1"])
        .assert()
        .success();
}
