mod util;

use assert_cmd::Command;
use clap::Parser;
use interfaces_of_power::{Cli, Commands};
use predicates::str::contains;
use serde_json::Value;
use util::{TempFixtureDir, sample_bundle};

fn base_cmd(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("iop"));
    // Isolate from any real config or log filter on the host.
    cmd.env("XDG_CONFIG_HOME", home.join(".config"));
    cmd.env_remove("IOP_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn summary_prints_every_default_view() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write_bundle(&sample_bundle());

    let output = base_cmd(&fixtures.path())
        .args(["summary", "--data"])
        .arg(&data)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    let ids: Vec<&str> = json["views"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["view"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["ads", "removals", "requests", "states"]);
    assert_eq!(json["selection"]["mode"], "stacked");
    assert_eq!(json["selection"]["time_range"]["start"], "2013-06-30");
    assert_eq!(json["views"][0]["series"]["kind"], "stacked");
    assert_eq!(json["views"][3]["series"]["kind"], "ranking");
}

#[test]
fn summary_applies_range_hide_and_mode() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write_bundle(&sample_bundle());

    let output = base_cmd(&fixtures.path())
        .args(["summary", "--view", "removals", "--since", "2016-01-01", "--until", "2016-12-31"])
        .args(["--hide", "Copyright", "--mode", "LINE", "--data"])
        .arg(&data)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    let frames = json["views"].as_array().unwrap();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame["selection"]["mode"], "line");
    assert_eq!(frame["x_domain"]["end"], "2016-12-31");

    let series = &frame["series"]["series"];
    assert_eq!(frame["series"]["kind"], "lines");
    let points = series["points"].as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["values"]["Defamation"], 30.0);
    assert!(points[0]["values"].get("Copyright").is_none());
}

#[test]
fn summary_rejects_unknown_mode() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write_bundle(&sample_bundle());

    base_cmd(&fixtures.path())
        .args(["summary", "--mode", "area", "--data"])
        .arg(&data)
        .assert()
        .failure()
        .stderr(contains("invalid chart mode 'area'"));
}

#[test]
fn summary_rejects_unknown_view() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write_bundle(&sample_bundle());

    base_cmd(&fixtures.path())
        .args(["summary", "--view", "timeline", "--data"])
        .arg(&data)
        .assert()
        .failure()
        .stderr(contains("unknown view 'timeline'"));
}

#[test]
fn inverted_range_fails() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write_bundle(&sample_bundle());

    base_cmd(&fixtures.path())
        .args(["summary", "--since", "2019-01-01", "--until", "2018-01-01", "--data"])
        .arg(&data)
        .assert()
        .failure()
        .stderr(contains("invalid time range"));
}

#[test]
fn bad_date_is_a_usage_error() {
    let tmp = TempFixtureDir::new();
    base_cmd(&tmp.path())
        .args(["summary", "--data", "x.json", "--since", "01/02/2020"])
        .assert()
        .failure()
        .stderr(contains("expected YYYY-MM-DD"));
}

#[test]
fn invalid_record_is_rejected_at_load() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write(
        "bundle.json",
        r#"{"removals": [{"date": "2016-12-31", "reason": "Spam", "total": -5}]}"#,
    );

    base_cmd(&fixtures.path())
        .args(["summary", "--data"])
        .arg(&data)
        .assert()
        .failure()
        .stderr(contains("invalid removals record #0"));
}

#[test]
fn validate_passes_on_clean_bundle() {
    let fixtures = TempFixtureDir::new();
    let data = fixtures.write_bundle(&sample_bundle());

    let output = base_cmd(&fixtures.path())
        .args(["validate", "--data"])
        .arg(&data)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json["ok"], true);
    let views = json["views"].as_object().unwrap();
    // Rankings have no time series to check.
    assert!(!views.contains_key("states"));
    assert!(views.contains_key("removals"));
}

#[test]
fn config_default_prints_views() {
    let tmp = TempFixtureDir::new();
    base_cmd(&tmp.path())
        .args(["config", "--default"])
        .assert()
        .success()
        .stdout(contains("[[views]]"))
        .stdout(contains("id = \"removals\""))
        .stdout(contains("2020 Presidential"));
}

#[test]
fn config_file_is_read_from_flag() {
    let fixtures = TempFixtureDir::new();
    let config = fixtures.write(
        "engine.toml",
        r#"
        [[views]]
        id = "timeline"
        dataset = "removals"
        granularity = "year"
        kind = "totals"
        "#,
    );
    let data = fixtures.write_bundle(&sample_bundle());

    let output = base_cmd(&fixtures.path())
        .arg("--config")
        .arg(&config)
        .args(["summary", "--data"])
        .arg(&data)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["views"][0]["view"], "timeline");
    assert_eq!(json["views"][0]["series"]["series"]["categories"][0], "total");
}

#[test]
fn invalid_config_file_fails() {
    let fixtures = TempFixtureDir::new();
    let config = fixtures.write(
        "engine.toml",
        r#"
        [[views]]
        id = "states"
        dataset = "state_spend"
        kind = "lines"
        "#,
    );

    base_cmd(&fixtures.path())
        .arg("--config")
        .arg(&config)
        .args(["config"])
        .assert()
        .failure()
        .stderr(contains("cannot show the state_spend dataset"));
}

#[test]
fn summary_flags_parse() {
    let cli = Cli::try_parse_from([
        "iop", "-v", "summary", "--data", "b.json", "--view", "ads", "--view", "requests",
        "--hide", "Other", "--since", "2020-01-01",
    ])
    .expect("parse summary flags");

    assert!(cli.verbose);
    match cli.command {
        Commands::Summary {
            views,
            hidden,
            since,
            until,
            mode,
            ..
        } => {
            assert_eq!(views, vec!["ads", "requests"]);
            assert_eq!(hidden, vec!["Other"]);
            assert_eq!(since.map(|d| d.to_string()), Some("2020-01-01".into()));
            assert!(until.is_none());
            assert!(mode.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn summary_requires_data() {
    assert!(Cli::try_parse_from(["iop", "summary"]).is_err());
}
