mod common;

use std::fs;
use std::process::Command;

use tempfile::tempdir;

use common::synthetic_cohort;

#[test]
fn cli_run_writes_results_and_tables() {
    let tmp = tempdir().expect("temporary directory");
    let input = tmp.path().join("cohort.tsv");
    fs::write(&input, synthetic_cohort(90, 7)).expect("write cohort");
    let out = tmp.path().join("out");

    let exe = env!("CARGO_BIN_EXE_pua-surface");
    let status = Command::new(exe)
        .args([
            "run",
            input.to_str().expect("path str"),
            "--out-dir",
            out.to_str().expect("path str"),
        ])
        .status()
        .expect("run pua-surface cli");

    assert!(status.success(), "CLI exited with status {status:?}");
    for file in ["model_results.toml", "audit.toml", "prepared_dataset.tsv", "modeling_dataset.tsv"] {
        assert!(out.join(file).exists(), "{file} missing");
    }
    assert!(out.join("tables").join("surface_parameters.tsv").exists());
}

#[test]
fn cli_prepare_honours_a_partial_config_and_comma_input() {
    let tmp = tempdir().expect("temporary directory");
    let input = tmp.path().join("cohort.csv");
    fs::write(&input, synthetic_cohort(40, 11).replace('\t', ",")).expect("write cohort");
    let config = tmp.path().join("config.toml");
    fs::write(&config, "seed = 99\n\n[composite]\noutput = \"intensity\"\n").expect("write config");
    let out = tmp.path().join("prepared");

    let exe = env!("CARGO_BIN_EXE_pua-surface");
    let status = Command::new(exe)
        .args([
            "prepare",
            input.to_str().expect("path str"),
            "--out-dir",
            out.to_str().expect("path str"),
            "--config",
            config.to_str().expect("path str"),
            "--comma",
        ])
        .status()
        .expect("run pua-surface cli");

    assert!(status.success(), "CLI exited with status {status:?}");
    let header = fs::read_to_string(out.join("prepared_dataset.tsv")).expect("prepared dataset");
    let header = header.lines().next().expect("header line");
    assert!(header.split('\t').any(|c| c == "intensity"));
    assert!(!out.join("model_results.toml").exists());
}

#[test]
fn cli_config_prints_parseable_defaults() {
    let exe = env!("CARGO_BIN_EXE_pua-surface");
    let output = Command::new(exe).arg("config").output().expect("run pua-surface cli");
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf-8 output");
    let parsed: toml::Value = toml::from_str(&text).expect("valid toml");
    assert_eq!(parsed["seed"].as_integer(), Some(1337));
    assert_eq!(parsed["grid"]["points"].as_integer(), Some(120));
}

#[test]
fn cli_reports_a_missing_input_file() {
    let tmp = tempdir().expect("temporary directory");
    let exe = env!("CARGO_BIN_EXE_pua-surface");
    let output = Command::new(exe)
        .args([
            "run",
            tmp.path().join("absent.tsv").to_str().expect("path str"),
            "--out-dir",
            tmp.path().join("out").to_str().expect("path str"),
        ])
        .output()
        .expect("run pua-surface cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}
