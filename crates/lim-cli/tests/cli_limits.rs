use approx::assert_relative_eq;
use std::path::PathBuf;
use std::process::{Command, Output};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_limitscan"))
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn run_json(args: &[&str]) -> serde_json::Value {
    let out = run(args);
    assert!(
        out.status.success(),
        "{:?} failed, stderr={}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

fn tmp_path(filename: &str) -> PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("limitscan_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn f(v: &serde_json::Value, key: &str) -> f64 {
    v.get(key).and_then(|x| x.as_f64()).unwrap_or_else(|| panic!("missing number '{key}' in {v}"))
}

#[test]
fn fit_reports_best_fit() {
    let input = fixture_path("counting.json");
    let v = run_json(&["fit", "--input", input.to_string_lossy().as_ref()]);
    assert_relative_eq!(f(&v, "mu_hat"), 0.5, epsilon = 1e-4);
    assert_eq!(v["converged"], serde_json::Value::Bool(true));
    assert_eq!(v["poi"], "mu");
}

#[test]
fn hypotest_asymptotic_reference_values() {
    let input = fixture_path("counting.json");
    let v = run_json(&["hypotest", "--input", input.to_string_lossy().as_ref(), "--mu", "1.0"]);
    assert_eq!(v["engine"], "asymptotic");
    assert_relative_eq!(f(&v, "cls"), 0.206034, epsilon = 1e-4);
    assert_relative_eq!(f(&v, "p_sb"), 0.173565, epsilon = 1e-4);
    assert_relative_eq!(f(&v, "clb"), 0.842409, epsilon = 1e-4);
    assert_eq!(v["expected_cls"]["cls"].as_array().unwrap().len(), 5);
}

#[test]
fn hypotest_toys_are_reproducible() {
    let input = fixture_path("counting.json").to_string_lossy().into_owned();
    let args = [
        "hypotest",
        "--input",
        input.as_str(),
        "--mu",
        "1.0",
        "--toys",
        "200",
        "--seed",
        "17",
    ];
    let a = run_json(&args);
    let b = run_json(&args);
    assert_eq!(a["engine"], "toy");
    assert_eq!(a["cls"], b["cls"]);
    assert_eq!(a["p_sb"], b["p_sb"]);
    assert!(a["n_toys_null"].as_u64().unwrap() <= 200);
}

#[test]
fn upper_limit_adaptive_writes_limits() {
    let input = fixture_path("counting.json");
    let output = tmp_path("ul.json");
    let out = run(&[
        "upper-limit",
        "--input",
        input.to_string_lossy().as_ref(),
        "--cl",
        "0.90",
        "--rtol",
        "1e-6",
        "--max-iter",
        "100",
        "--output",
        output.to_string_lossy().as_ref(),
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    let _ = std::fs::remove_file(&output);
    assert_relative_eq!(f(&v, "obs_limit"), 1.25450, epsilon = 5e-4);
    let exp = v["exp_limits"]["limits"].as_array().unwrap();
    assert_eq!(exp.len(), 5);
    assert_relative_eq!(exp[2].as_f64().unwrap(), 0.82842, epsilon = 5e-4);
    assert!(v["grid"].get("adaptive").is_some());
}

#[test]
fn upper_limit_scan_mode() {
    let input = fixture_path("counting.json");
    let v = run_json(&[
        "upper-limit",
        "--input",
        input.to_string_lossy().as_ref(),
        "--cl",
        "0.90",
        "--scan-start",
        "0.0",
        "--scan-stop",
        "3.0",
        "--scan-points",
        "61",
    ]);
    assert_eq!(v["points"].as_array().unwrap().len(), 61);
    assert_relative_eq!(f(&v, "obs_limit"), 1.25450, epsilon = 5e-3);
}

#[test]
fn scan_and_interval_commands() {
    let input = fixture_path("counting.json");
    let s = run_json(&[
        "scan",
        "--input",
        input.to_string_lossy().as_ref(),
        "--start",
        "0.0",
        "--stop",
        "2.0",
        "--points",
        "5",
    ]);
    assert_eq!(s["points"].as_array().unwrap().len(), 5);
    assert_relative_eq!(f(&s, "mu_hat"), 0.5, epsilon = 1e-4);

    let i = run_json(&["interval", "--input", input.to_string_lossy().as_ref(), "--cl", "0.9"]);
    assert_relative_eq!(f(&i, "lower"), -0.234825, epsilon = 1e-4);
    assert_relative_eq!(f(&i, "upper"), 1.414978, epsilon = 1e-4);
    assert_eq!(i["upper_status"], "found");
}

#[test]
fn bayes_command_on_yaml_model() {
    let input = fixture_path("on_off.yaml");
    let v = run_json(&[
        "bayes",
        "--input",
        input.to_string_lossy().as_ref(),
        "--cl",
        "0.9",
        "--tail",
        "upper",
        "--bins",
        "200",
    ]);
    let upper = f(&v, "upper");
    assert!(upper > 0.0 && upper < 10.0, "upper={upper}");
    assert_relative_eq!(f(&v, "lower"), -1.0, epsilon = 1e-9);
}

#[test]
fn run_file_produces_all_sections() {
    let config = fixture_path("run_counting.yaml");
    let v = run_json(&["run", "--config", config.to_string_lossy().as_ref()]);
    assert_relative_eq!(f(&v["cls"], "obs_limit"), 1.25450, epsilon = 5e-4);
    assert_relative_eq!(f(&v["likelihood_interval"], "upper"), 1.414978, epsilon = 1e-4);
    assert_relative_eq!(f(&v["bayesian_interval"], "upper"), 1.49161, epsilon = 3e-3);
    assert_eq!(v["analysis"]["confidence_level"].as_f64(), Some(0.9));
}

#[test]
fn run_file_with_toys() {
    let config = fixture_path("run_on_off_toys.yaml");
    let v = run_json(&["run", "--config", config.to_string_lossy().as_ref()]);
    assert_eq!(v["cls"]["points"].as_array().unwrap().len(), 6);
    assert!(v["bayesian_interval"].is_null());
    assert_eq!(v["analysis"]["engine"], "toy");
}

#[test]
fn invalid_confidence_level_fails() {
    let input = fixture_path("counting.json");
    let out = run(&["upper-limit", "--input", input.to_string_lossy().as_ref(), "--cl", "1.5"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("confidence_level"));
}

#[test]
fn missing_model_file_fails() {
    let out = run(&["fit", "--input", "/nonexistent/model.json"]);
    assert!(!out.status.success());
}
