#![cfg(feature = "cli")]

use std::process::Command;

fn podcel() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_podcel"));
    command.arg("--log-level").arg("error");
    command
}

#[test]
fn native_bench_prints_raw_result() {
    let output = podcel()
        .args(["bench", "podspec-native", "-iterations", "100"])
        .output()
        .expect("bench should run");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let fields: Vec<&str> = stdout.split_whitespace().collect();
    assert_eq!(fields.len(), 3, "{stdout}");
    assert_eq!(fields[0], "podspec-native");
    assert_eq!(fields[1], "100");
    assert!(fields[2].parse::<u64>().is_ok(), "{stdout}");
}

#[test]
fn cel_bench_emits_json() {
    let output = podcel()
        .args(["--format", "json", "bench", "podspec-cel", "--iterations", "20"])
        .output()
        .expect("bench should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("bench should emit json");
    assert_eq!(payload["name"], "podspec-cel");
    assert_eq!(payload["iterations"], 20);
    assert_eq!(payload["violations"], serde_json::json!([]));
}

#[test]
fn setup_failure_exits_two() {
    let output = podcel()
        .args(["bench", "podspec-cel", "-cost-limit", "1"])
        .output()
        .expect("bench should run");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("setup: cost_limit_exceeded: "), "{stderr}");
}

#[test]
fn unknown_benchmark_exits_two() {
    let output = podcel()
        .args(["bench", "podspec-nope"])
        .output()
        .expect("bench should run");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn list_names_every_benchmark() {
    let output = podcel()
        .args(["--format", "raw", "list"])
        .output()
        .expect("list should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let names: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        names,
        vec![
            "podspec-cel",
            "podspec-cel-invalid",
            "podspec-native",
            "podspec-native-valid"
        ]
    );
}

#[test]
fn check_reports_violations_with_exit_one() {
    let output = podcel()
        .args([
            "--format",
            "json",
            "check",
            "pods.v1.PodSpec",
            "self.hostNetwork == false",
            "--message",
            "no host network",
            "--instance",
            "{\"hostNetwork\": true}",
        ])
        .output()
        .expect("check should run");

    assert_eq!(output.status.code(), Some(1));
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("check should emit json");
    assert_eq!(payload["evaluated"], true);
    assert_eq!(payload["violations"][0]["message"], "no host network");
    assert_eq!(payload["violations"][0]["kind"], "rule_violation");
}

#[test]
fn check_rejects_undefined_fields() {
    let output = podcel()
        .args(["check", "pods.v1.PodSpec", "self.nope.deep.path"])
        .output()
        .expect("check should run");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("setup: compile_error: "), "{stderr}");
}

#[test]
fn version_prints_package_version() {
    let output = podcel().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("podcel {}", env!("CARGO_PKG_VERSION")));
}
