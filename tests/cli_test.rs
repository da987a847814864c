use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn ttygrade(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ttygrade"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute ttygrade")
}

fn write_suite(dir: &Path) {
    fs::write(dir.join("hello.out"), "hello\n\n  world\n").unwrap();
    fs::write(dir.join("cat.in"), "one\n^D\n").unwrap();
    fs::write(dir.join("cat.out"), "one\none\n").unwrap();
    let suite = r#"
timeout: 5
tests:
  - name: hello
    description: spacing and blank lines are ignored
    command: sh -c 'echo hello; echo world'
    output_file: hello.out
  - name: cat
    command: cat
    input_file: cat.in
    output_file: cat.out
  - name: wrong
    command: echo goodbye
    output_file: hello.out
    points: 2
"#;
    fs::write(dir.join("suite.yaml"), suite).unwrap();
}

#[test]
fn test_suite_run_reports_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path());

    let output = ttygrade(
        &["suite.yaml", "--results", "results", "--json", "summary.json"],
        dir.path(),
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "ttygrade failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(stdout.contains("PASS hello"), "stdout:\n{stdout}");
    assert!(stdout.contains("PASS cat"), "stdout:\n{stdout}");
    assert!(stdout.contains("FAIL wrong"), "stdout:\n{stdout}");
    assert!(stdout.contains("EXPECT 1) hello"), "stdout:\n{stdout}");
    assert!(stdout.contains("ACTUAL 1) goodbye"), "stdout:\n{stdout}");
    assert!(stdout.contains("Total: 2/4"), "stdout:\n{stdout}");

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(json["earned"], 2);
    assert_eq!(json["possible"], 4);
    assert_eq!(json["interrupted"], false);
    assert_eq!(json["tests"][2]["status"], "mismatch");

    let results = dir.path().join("results");
    assert!(results.join("hello.actual").is_file());
    assert!(results.join("wrong.diff").is_file());
    assert!(!results.join("hello.diff").exists());
}

#[test]
fn test_selecting_a_single_test() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path());

    let output = ttygrade(&["suite.yaml", "-t", "hello", "--json", "-"], dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("PASS hello"), "stdout:\n{stdout}");
    assert!(!stdout.contains("wrong"), "stdout:\n{stdout}");
    assert!(stdout.contains("\"possible\": 1"), "stdout:\n{stdout}");
}

#[test]
fn test_unknown_test_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path());

    let output = ttygrade(&["suite.yaml", "-t", "missing"], dir.path());
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No test named 'missing'"));
}

#[test]
fn test_invalid_suite_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("suite.yaml"),
        "tests:\n  - name: t\n    output_file: absent.out\n",
    )
    .unwrap();

    let output = ttygrade(&["suite.yaml"], dir.path());
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("output_file does not exist"), "stderr:\n{stderr}");
}
