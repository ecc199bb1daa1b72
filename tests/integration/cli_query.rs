#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const GRAPH: &str = r#"[
    {"frame": {"name": "main"}, "metrics": {"time": 4.0}, "children": [
        {"frame": {"name": "MPI_Send"}, "metrics": {"time": 3.0}},
        {"frame": {"name": "solve"}, "metrics": {"time": 1.0}}
    ]}
]"#;

struct Workspace {
    dir: TempDir,
    graph: PathBuf,
    config: PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().expect("tempdir");
    let graph = dir.path().join("graph.json");
    fs::write(&graph, GRAPH).expect("write graph");
    let config = dir.path().join("cli.toml");
    Workspace { dir, graph, config }
}

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn matched_names(json: &Value) -> Vec<String> {
    json["matched"]
        .as_array()
        .expect("matched array")
        .iter()
        .filter_map(|node| node["frame"]["name"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn query_text_reports_matches_as_json() {
    let ws = workspace();
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "query", "--graph"])
        .arg(&ws.graph)
        .args(["--text", r#"MATCH (".", p)->(q) WHERE q."name" STARTS WITH "MPI_""#])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = json_stdout(&output);
    assert_eq!(matched_names(&json), vec!["main", "MPI_Send"]);
    assert_eq!(json["mode"], "off");
    assert_eq!(json["nodes"], 3);
    assert!(json.get("stats").is_none());
}

#[test]
fn query_object_with_stats() {
    let ws = workspace();
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "query", "--stats", "--graph"])
        .arg(&ws.graph)
        .args(["--object", r#"[{"time": ">= 3"}]"#])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = json_stdout(&output);
    assert_eq!(matched_names(&json), vec!["main", "MPI_Send"]);
    assert_eq!(json["stats"]["nodes_visited"], 3);
    assert_eq!(json["stats"]["matched_nodes"], 2);
}

#[test]
fn query_file_and_text_output() {
    let ws = workspace();
    let query = ws.dir.path().join("leaves.cql");
    fs::write(&query, "MATCH (\".\", p) WHERE p IS LEAF\n").expect("write query");
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["--theme", "plain", "query", "--graph"])
        .arg(&ws.graph)
        .arg("--query-file")
        .arg(&query)
        .assert()
        .success()
        .get_output()
        .clone();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MPI_Send"), "{stdout}");
    assert!(stdout.contains("2 of 3 nodes"), "{stdout}");
}

#[test]
fn check_prints_compiled_pattern() {
    let ws = workspace();
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "check", "--object", r#"[{"name": "main"}, "+"]"#])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = json_stdout(&output);
    assert_eq!(json["kind"], "query");
    let quantifiers: Vec<&str> = json["positions"]
        .as_array()
        .expect("positions")
        .iter()
        .filter_map(|p| p["quantifier"].as_str())
        .collect();
    assert_eq!(quantifiers, vec![".", ".", "*"]);
}

#[test]
fn check_reports_groupings_as_compound() {
    let ws = workspace();
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args([
            "--format",
            "json",
            "check",
            "--text",
            r#"MATCH (".", p) WHERE {p."time" > 1} OR {p."name" = "solve"}"#,
        ])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = json_stdout(&output);
    assert_eq!(json["kind"], "compound");
    assert_eq!(json["subqueries"].as_array().map(Vec::len), Some(2));
}

#[test]
fn invalid_queries_fail_with_message() {
    let ws = workspace();
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["query", "--graph"])
        .arg(&ws.graph)
        .args(["--text", "MATCH (p"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: invalid string dialect query"), "{stderr}");
}

#[test]
fn profiles_supply_graph_and_format() {
    let ws = workspace();
    fs::write(
        &ws.config,
        format!(
            "[profiles.local]\ngraph = {:?}\nformat = \"json\"\n",
            ws.graph.display().to_string()
        ),
    )
    .expect("write config");

    cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["config", "set-default", "local"])
        .assert()
        .success();

    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["query", "--object", r#"[{"name": "solve"}]"#])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(matched_names(&json_stdout(&output)), vec!["solve"]);

    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["config", "show"])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = json_stdout(&output);
    assert_eq!(json["default_profile"], "local");
    assert_eq!(json["profiles"][0]["name"], "local");
}

#[test]
fn unknown_profile_is_an_error() {
    let ws = workspace();
    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["config", "set-default", "missing"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("profile 'missing' not found"), "{stderr}");
}

#[test]
fn mode_flag_selects_row_aggregation() {
    let ws = workspace();
    let ranks = ws.dir.path().join("ranks.json");
    fs::write(
        &ranks,
        r#"{"secondary_key": "rank", "roots": [
            {"frame": {"name": "main"}, "metrics": [{"rank": 0, "time": 1.0}, {"rank": 1, "time": 2.0}],
             "children": [
                {"frame": {"name": "MPI_Wait"}, "metrics": [{"rank": 0, "time": 1.0}, {"rank": 1, "time": 30.0}]}
             ]}
        ]}"#,
    )
    .expect("write ranks");

    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["--format", "json", "query", "--mode", "any", "--graph"])
        .arg(&ranks)
        .args(["--object", r#"[{"time": "> 10"}]"#])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = json_stdout(&output);
    assert_eq!(json["mode"], "any");
    assert_eq!(matched_names(&json), vec!["MPI_Wait"]);

    let output = cargo_bin_cmd!("cctql")
        .arg("--config")
        .arg(&ws.config)
        .args(["query", "--mode", "most", "--graph"])
        .arg(&ranks)
        .args(["--object", r#"[{"time": "> 10"}]"#])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown aggregation mode 'most'"), "{stderr}");
}
