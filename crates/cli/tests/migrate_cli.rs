// End-to-end tests for the relink binary: exit codes, --json shape, and
// rerun behavior against real files in a temp directory.
//
// Run with: cargo test -p relink-cli --test migrate_cli -- --nocapture

use std::path::Path;
use std::process::{Command, Output};

const COMPANIES: &str = "\
-- legacy export
INSERT INTO `companies` (`id`, `name`, `email`) VALUES
  (10,'Initech','info@initech.com'),
  (11,'Acme','contact@acme.io'),
  (12,'Globex','hello@globex.com');
";

const USERS: &str = "\
INSERT INTO users (UserId, Email, FirstName, LastName, CompanyId) VALUES
  (1,'contact@acme.io','Ann','Lee',NULL),
  (2,'someone@gmail.com','Some','One',NULL),
  (3,'bob@initech.com','Bob','Stone',10);
";

fn relink(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_relink"));
    cmd.current_dir(dir)
        .env_remove("RELINK_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("companies.sql"), COMPANIES).unwrap();
    std::fs::write(dir.path().join("users.sql"), USERS).unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    relink(dir).args(args).output().unwrap()
}

fn json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be one JSON value: {e}\n{stdout}"))
}

fn step<'a>(value: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
    value["steps"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == name)
        .unwrap_or_else(|| panic!("no step {name} in {value}"))
}

// ===========================================================================
// migrate
// ===========================================================================

#[test]
fn dry_run_is_default_and_writes_no_database() {
    let dir = fixture();
    let out = run(dir.path(), &["migrate", "all", "--json"]);
    assert_eq!(out.status.code(), Some(4), "{}", String::from_utf8_lossy(&out.stderr));

    let v = json(&out);
    assert_eq!(v["mode"], "dry_run");
    assert_eq!(v["status"], "warning");
    assert_eq!(step(&v, "companies")["stats"]["created"], 3);
    assert_eq!(step(&v, "users")["stats"]["unmatched"], 1);

    assert!(!dir.path().join("relink.db").exists());
    assert!(!dir.path().join("target.db").exists());
    assert!(dir.path().join("unmatched_records.csv").exists());
}

#[test]
fn execute_twice_converges() {
    let dir = fixture();
    let first = run(dir.path(), &["migrate", "all", "--execute", "--json"]);
    assert_eq!(first.status.code(), Some(4));
    let v = json(&first);
    assert_eq!(step(&v, "users")["stats"]["created"], 3);
    assert_eq!(step(&v, "users")["stats"]["errors"], 0);

    let second = run(dir.path(), &["migrate", "all", "--execute", "--json"]);
    assert_eq!(second.status.code(), Some(0));
    let v = json(&second);
    assert_eq!(v["status"], "success");
    assert_eq!(v["totals"]["created"], 0);
    assert_eq!(v["totals"]["updated"], 0);
    assert_eq!(v["totals"]["unmatched"], 0);
    assert_eq!(step(&v, "users")["stats"]["skipped"], 3);

    // the one unmatched user is reported once across both runs
    let report = std::fs::read_to_string(dir.path().join("unmatched_records.csv")).unwrap();
    assert_eq!(report.lines().count(), 2, "{report}");

    let status = run(dir.path(), &["status", "--json"]);
    assert_eq!(status.status.code(), Some(0));
    let counts = json(&status);
    assert_eq!(counts["company"], 3);
    assert_eq!(counts["user"], 3);
}

#[test]
fn human_summary_separates_categories() {
    let dir = fixture();
    let out = run(dir.path(), &["migrate", "all"]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("==> companies: 3 rows"), "{stdout}");
    assert!(stdout.contains("no match found: 1"), "{stdout}");
    assert!(stdout.contains("Dry run: no records or mappings were written"), "{stdout}");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("warning:"), "{stderr}");
}

#[test]
fn missing_dump_aborts_with_exit_6() {
    let dir = fixture();
    std::fs::remove_file(dir.path().join("companies.sql")).unwrap();
    let out = run(dir.path(), &["migrate", "all", "--execute", "--json"]);
    assert_eq!(out.status.code(), Some(6));

    let v = json(&out);
    assert_eq!(step(&v, "companies")["outcome"], "aborted");
    assert_eq!(step(&v, "users")["outcome"], "skipped");
    assert_eq!(step(&v, "users")["blocked_by"], "companies");
}

#[test]
fn manual_map_links_free_mail_user() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("overrides.csv"),
        "key,target_id\nSomeone@Gmail.com,12\n",
    )
    .unwrap();
    run(dir.path(), &["migrate", "companies", "--execute"]);
    let out = run(
        dir.path(),
        &["migrate", "users", "--execute", "--manual-map", "overrides.csv", "--json"],
    );
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(step(&json(&out), "users")["stats"]["unmatched"], 0);
}

#[test]
fn row_errors_exit_5() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("companies.sql"),
        "INSERT INTO companies (id, name) VALUES (10,'Initech'),(NULL,'Ghost');",
    )
    .unwrap();
    let out = run(dir.path(), &["migrate", "companies", "--execute", "--json"]);
    assert_eq!(out.status.code(), Some(5));
    let v = json(&out);
    let detail = &step(&v, "companies")["stats"]["errors_detail"][0];
    assert_eq!(detail["display_name"], "Ghost");
}

// ===========================================================================
// usage + config errors
// ===========================================================================

#[test]
fn unknown_strategy_is_usage_error() {
    let dir = fixture();
    let out = run(dir.path(), &["migrate", "all", "--strategy", "fuzzy"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn unknown_step_is_usage_error() {
    let dir = fixture();
    let out = run(dir.path(), &["migrate", "invoices"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown step 'invoices'"));
}

#[test]
fn override_file_without_header_is_usage_error() {
    let dir = fixture();
    std::fs::write(dir.path().join("bad.csv"), "a@b.com,12\n").unwrap();
    let out = run(dir.path(), &["migrate", "users", "--manual-map", "bad.csv"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("key,target_id"));
}

#[test]
fn cyclic_config_exit_3() {
    let dir = fixture();
    std::fs::write(
        dir.path().join("relink.toml"),
        r#"
[[steps]]
name = "a"
entity_type = "user"
dump = "users.sql"
depends_on = ["b"]

[[steps]]
name = "b"
entity_type = "company"
dump = "companies.sql"
depends_on = ["a"]
"#,
    )
    .unwrap();
    let out = run(dir.path(), &["steps"]);
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn execute_and_dry_run_conflict() {
    let dir = fixture();
    let out = run(dir.path(), &["migrate", "all", "--execute", "--dry-run"]);
    assert_eq!(out.status.code(), Some(2));
}

// ===========================================================================
// steps + validate
// ===========================================================================

#[test]
fn steps_prints_default_plan_in_order() {
    let dir = fixture();
    let out = run(dir.path(), &["steps"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let order: Vec<usize> = ["companies", "users"]
        .iter()
        .map(|name| stdout.find(&format!(". {name}")).unwrap())
        .collect();
    assert!(order[0] < order[1], "{stdout}");
}

#[test]
fn validate_json_is_read_only() {
    let dir = fixture();
    let out = run(dir.path(), &["validate", "--fix", "--json"]);
    assert_eq!(out.status.code(), Some(4));

    let v = json(&out);
    let reports = v.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["step"], "users");
    assert_eq!(reports[0]["fixed"], 1);
    assert_eq!(reports[0]["histogram"]["by_strategy"]["exact_email"], 1);

    assert!(!dir.path().join("relink.db").exists());
    assert!(!dir.path().join("unmatched_records.csv").exists());
    assert_eq!(std::fs::read_to_string(dir.path().join("users.sql")).unwrap(), USERS);
}

#[test]
fn verbose_dry_run_logs_in_memory_stores() {
    let dir = fixture();
    let out = run(dir.path(), &["-vv", "migrate", "companies"]);
    assert_eq!(out.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("dry-run uses an empty mapping store"), "{stderr}");
    assert!(stderr.contains("dry-run uses an empty target store"), "{stderr}");
}
