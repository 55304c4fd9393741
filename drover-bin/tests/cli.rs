use assert_cmd::Command;
use predicates::str::contains;

fn drover() -> Command {
    Command::cargo_bin("drover").expect("binary builds")
}

#[test]
fn offline_run_prints_summary() {
    drover()
        .args(["--offline", "--offline-latency", "5ms", "--no-progress"])
        .write_stdin("payload one\npayload two\n")
        .assert()
        .success()
        .stdout(contains("Succeeded"))
        .stdout(contains("Total"));
}

#[test]
fn offline_run_json_output() {
    drover()
        .args(["--offline", "--offline-latency", "1ms", "--json"])
        .write_stdin("a\nb\nc\n")
        .assert()
        .success()
        .stdout(contains("\"succeeded\": 3"))
        .stdout(contains("\"results\""));
}

#[test]
fn empty_input_fails() {
    drover()
        .args(["--offline"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(contains("no payloads"));
}

#[test]
fn endpoint_required_without_offline() {
    drover()
        .env_remove("DROVER_ENDPOINT")
        .write_stdin("payload\n")
        .assert()
        .failure()
        .stderr(contains("--endpoint or --offline"));
}

#[test]
fn rate_limited_offline_run_respects_rpm() {
    // Two payloads under rpm 120: finishes quickly and reports both.
    drover()
        .args([
            "--offline",
            "--offline-latency",
            "1ms",
            "--max-rpm",
            "120",
            "--max-tpm",
            "100000",
            "--no-progress",
        ])
        .write_stdin("one\ntwo\n")
        .assert()
        .success()
        .stdout(contains("Succeeded"));
}
