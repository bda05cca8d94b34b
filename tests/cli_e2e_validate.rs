//! End-to-end tests for the `validate` command.
//!
//! These tests invoke the actual CLI binary and check the normalized manifest
//! it prints from a user's perspective.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;

const MANIFEST: &str = r#"{
    "name": "bowtie",
    "supported_hpc": ["anvil"],
    "slurm_input_rules": {
        "time": { "default_value": 30, "unit": "Minutes" },
        "memory": { "default_value": 4, "unit": "TB" },
        "gpus": { "default_value": 1, "unit": "GB" }
    },
    "param_rules": {
        "threads": { "type": "integer", "default_value": 8 }
    }
}"#;

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_validate_prints_normalized_manifest() {
    let temp = assert_fs::TempDir::new().unwrap();
    let manifest = temp.child("manifest.json");
    manifest.write_str(MANIFEST).unwrap();

    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.current_dir(temp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"default_hpc\": \"anvil\""))
        .stdout(predicate::str::contains("\"max\": 60"))
        .stdout(predicate::str::contains("\"unit\": \"None\""))
        // Storage rules with units outside GB/MB are dropped
        .stdout(predicate::str::contains("\"memory\"").not());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_validate_compact_output() {
    let temp = assert_fs::TempDir::new().unwrap();
    let manifest = temp.child("bowtie.json");
    manifest.write_str(MANIFEST).unwrap();

    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.arg("validate")
        .arg(manifest.path())
        .arg("--compact")
        .arg("--address")
        .arg("https://github.com/org/bowtie.git")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "\"repository\":\"https://github.com/org/bowtie.git\"",
        ))
        .stdout(predicate::str::contains("\n").count(1));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_validate_malformed_manifest() {
    let temp = assert_fs::TempDir::new().unwrap();
    let manifest = temp.child("manifest.json");
    manifest.write_str("{ \"name\": ").unwrap();

    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.current_dir(temp.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid manifest"))
        .stderr(predicate::str::contains("Manifest parse error"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_validate_missing_file() {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.current_dir(temp.path())
        .arg("validate")
        .arg("absent.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read absent.json"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_validate_uses_configured_default_cluster() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("manifest.json").write_str("{}").unwrap();
    let config = temp.child("sync.yaml");
    config.write_str("default_cluster: bridges2\n").unwrap();

    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.current_dir(temp.path())
        .arg("validate")
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"default_hpc\": \"bridges2\""));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_validate_rejects_unknown_config_key() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("manifest.json").write_str("{}").unwrap();
    let config = temp.child("sync.yaml");
    config.write_str("ttl: 30\n").unwrap();

    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.current_dir(temp.path())
        .arg("validate")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"))
        .stderr(predicate::str::contains("manifest_ttl_secs"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("manifest-sync");

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("fetch"));
}
