use std::fs;
use tempfile::tempdir;

#[test]
fn status_reports_missing_dirs_as_issues() {
    let tmp = tempdir().expect("tempdir");

    assert_cmd::cargo::cargo_bin_cmd!("inbox-sorter")
        .current_dir(tmp.path())
        .env("SORTER_HOME", tmp.path())
        .env_remove("SORTER_CONFIG_PATH")
        .arg("status")
        .assert()
        .failure()
        .stdout(predicates::str::contains("missing inbox dir"));
}

#[test]
fn status_shows_file_config_and_env_overrides() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    for dir in ["inbox", "datasets", "processed/errors"] {
        fs::create_dir_all(home.join(dir)).expect("mkdir");
    }
    fs::write(
        home.join("sorter.toml"),
        "[watcher]\nworkers = 8\nrecursive = false\n",
    )
    .expect("write config");

    let out = assert_cmd::cargo::cargo_bin_cmd!("inbox-sorter")
        .current_dir(home)
        .env("SORTER_HOME", home)
        .env("SORTER_SETTLE_MS", "25")
        .env_remove("SORTER_CONFIG_PATH")
        .env_remove("SORTER_WORKERS")
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&out).expect("json report");
    assert_eq!(report["command"], "status");
    assert_eq!(report["ok"], true);
    let details = report["details"]
        .as_array()
        .expect("details")
        .iter()
        .filter_map(|v| v.as_str())
        .collect::<Vec<_>>();
    assert!(details.contains(&"watcher.workers=8"));
    assert!(details.contains(&"watcher.recursive=false"));
    assert!(details.contains(&"watcher.settle_ms=25"));
    assert!(details.iter().any(|d| d.starts_with("env_overrides=") && d.contains("SORTER_SETTLE_MS")));
}

#[test]
fn status_rejects_invalid_worker_count() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    for dir in ["inbox", "datasets", "processed/errors"] {
        fs::create_dir_all(home.join(dir)).expect("mkdir");
    }

    assert_cmd::cargo::cargo_bin_cmd!("inbox-sorter")
        .current_dir(home)
        .env("SORTER_HOME", home)
        .env("SORTER_WORKERS", "0")
        .env_remove("SORTER_CONFIG_PATH")
        .arg("status")
        .assert()
        .failure()
        .stdout(predicates::str::contains("invalid config"));
}
