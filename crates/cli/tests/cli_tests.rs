//! CLI integration tests
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("gleaner")
}

fn get_fixture_path(name: &str) -> String {
    format!("../../tests/fixtures/{}", name)
}

#[test]
fn test_cli_schema() {
    cmd()
        .args(["schema", &get_fixture_path("scores.yaml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE IF NOT EXISTS \"scores\""))
        .stdout(predicate::str::contains("REFERENCES \"scores\" (\"row_id\")"))
        .stdout(predicate::str::contains("\"Score\" TEXT"));
}

#[test]
fn test_cli_run_with_html_override() {
    cmd()
        .args(["run", &get_fixture_path("scores.yaml"), "--html", &get_fixture_path("scores.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""table":"scores","row_id":1,"heading":"Weekly league""#))
        .stdout(predicate::str::contains(r#""Name":"Carol","Score":"30""#));
}

#[test]
fn test_cli_run_stdin_override() {
    let html = std::fs::read_to_string(get_fixture_path("scores.html")).unwrap();
    let output = cmd()
        .args(["run", &get_fixture_path("scores.yaml"), "--html", "-", "-f", "json"])
        .write_stdin(html)
        .output()
        .unwrap();

    assert!(output.status.success());
    let tables: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tables[1]["name"], "table_data");
    assert_eq!(tables[1]["rows"].as_array().unwrap().len(), 3);
    assert_eq!(tables[1]["rows"][1]["Name"], "Bob");
}

#[test]
fn test_cli_run_sql_to_file() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("out/scores.sql");

    cmd()
        .args(["run", &get_fixture_path("scores.yaml"), "--html", &get_fixture_path("scores.html")])
        .args(["-f", "sql", "-o", output.to_str().unwrap()])
        .assert()
        .success();

    let sql = std::fs::read_to_string(&output).unwrap();
    assert_eq!(sql.matches("INSERT INTO \"table_data\"").count(), 3);
    assert!(sql.contains("'Alice', '10'"));
}

#[test]
fn test_cli_run_without_targets_fails() {
    cmd()
        .args(["run", &get_fixture_path("scores.yaml")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no targets"));
}

#[test]
fn test_cli_run_rejects_unknown_format() {
    cmd()
        .args(["run", &get_fixture_path("scores.yaml"), "--html", &get_fixture_path("scores.html"), "-f", "xml"])
        .assert()
        .failure();
}

#[test]
fn test_cli_extract() {
    let output = cmd()
        .args(["extract", &get_fixture_path("listing.yaml"), &get_fixture_path("listing.html")])
        .output()
        .unwrap();

    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["heading"], "Hand tools");
    assert_eq!(record["products"].as_array().unwrap().len(), 3);
    assert_eq!(record["products"][1]["price"], serde_json::Value::Null);
    assert_eq!(record["products"][0]["tags"][1]["tag"], "16oz");
}

#[test]
fn test_cli_extract_compact() {
    cmd()
        .args(["extract", "--compact", &get_fixture_path("scores.yaml"), &get_fixture_path("scores.html")])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(r#"{"heading":"Weekly league","table_data":[{"Name":"Alice""#));
}

#[test]
fn test_cli_select() {
    cmd()
        .args(["select", &get_fixture_path("listing.html"), "article.product p.price", "-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("div.grid > article:nth-child(1) > p:nth-child(2)\tanchored\tmedium"));
}

#[test]
fn test_cli_select_no_match() {
    cmd()
        .args(["select", &get_fixture_path("listing.html"), "table"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No element matches table"));
}

#[test]
fn test_cli_detect_list() {
    cmd()
        .args(["detect-list", &get_fixture_path("listing.html"), "article.product", "--name", "products"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name: products"))
        .stdout(predicate::str::contains("div.grid > article.card.product"))
        .stdout(predicate::str::contains("name: details_href"));
}

#[test]
fn test_cli_detect_table() {
    cmd()
        .args(["detect-table", &get_fixture_path("scores.html"), "td"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#scores > tbody > tr"))
        .stdout(predicate::str::contains("td:nth-child(2)"));
}

#[test]
fn test_cli_detect_table_outside_table() {
    cmd().args(["detect-table", &get_fixture_path("scores.html"), "h1"]).assert().failure();
}

#[test]
fn test_cli_test_probes() {
    cmd()
        .args(["test", &get_fixture_path("listing.yaml"), &get_fixture_path("listing.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok [price] p.price -> 2 found"))
        .stdout(predicate::str::contains("\"$12.50\""));
}

#[test]
fn test_cli_test_probes_json() {
    let output = cmd()
        .args(["test", "--json", &get_fixture_path("listing.yaml"), &get_fixture_path("listing.html")])
        .output()
        .unwrap();

    assert!(output.status.success());
    let probes: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let probes = probes.as_array().unwrap();
    assert_eq!(probes.len(), 8);
    assert_eq!(probes[1]["found_count"], 3);
}

#[test]
fn test_cli_invalid_config() {
    cmd().args(["schema", "nonexistent.yaml"]).assert().failure();
}

#[test]
fn test_cli_invalid_file() {
    cmd().args(["extract", &get_fixture_path("scores.yaml"), "nonexistent.html"]).assert().failure();
}

#[test]
fn test_cli_completions() {
    cmd()
        .args(["--completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gleaner"));
}

#[test]
fn test_cli_requires_command() {
    cmd().assert().failure();
}
