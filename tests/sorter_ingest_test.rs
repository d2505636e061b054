use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn sorter_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("inbox-sorter");
    cmd.current_dir(home)
        .env("SORTER_HOME", home)
        .env("SORTER_SETTLE_MS", "0")
        .env_remove("SORTER_CONFIG_PATH")
        .env_remove("SORTER_INBOX_DIR")
        .env_remove("SORTER_ARCHIVE_DIR")
        .env_remove("SORTER_ERRORS_DIR")
        .env_remove("SORTER_LOGS_DIR");
    cmd
}

#[test]
fn ingest_archives_document_under_category_folders() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    let drop = inbox.join("drop.json");
    fs::write(
        &drop,
        r#"{"id":"sqli-001","important":{"category":"SQL Injection","sub_category":"Authentication Bypass","title":"SQL injection login bypass"}}"#,
    )
    .expect("write drop");

    sorter_cmd(home)
        .arg("ingest")
        .arg(&drop)
        .assert()
        .success()
        .stdout(predicates::str::contains("sql_injection_login_bypass_v1.jsonl"));

    let dir = home.join("datasets/SQL Injection/Authentication Bypass");
    let archived = fs::read_to_string(dir.join("sql_injection_login_bypass_v1.jsonl"))
        .expect("archived file");
    assert_eq!(archived.lines().count(), 1);
    assert!(archived.ends_with('\n'));

    let manifest = fs::read_to_string(dir.join("MANIFEST.jsonl")).expect("manifest");
    let entry: serde_json::Value =
        serde_json::from_str(manifest.lines().next().expect("one line")).expect("json");
    assert_eq!(entry["file"], "sql_injection_login_bypass_v1.jsonl");
    assert_eq!(entry["records"], 1);
    assert!(entry["moved_at"].is_string());
    assert!(!drop.exists());
}

#[test]
fn ingest_twice_produces_next_version() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    let body = "{\"important\":{\"category\":\"XSS\",\"sub_category\":\"Stored\",\"title\":\"Comment box\"}}\n";

    for name in ["one.jsonl", "two.jsonl"] {
        let drop = inbox.join(name);
        fs::write(&drop, body).expect("write drop");
        sorter_cmd(home).arg("ingest").arg(&drop).assert().success();
    }

    let dir = home.join("datasets/XSS/Stored");
    assert!(dir.join("comment_box_v1.jsonl").is_file());
    assert!(dir.join("comment_box_v2.jsonl").is_file());
    let manifest = fs::read_to_string(dir.join("MANIFEST.jsonl")).expect("manifest");
    assert_eq!(manifest.lines().count(), 2);
}

#[test]
fn ingest_quarantines_record_missing_category() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    let drop = inbox.join("bad.json");
    fs::write(&drop, r#"{"important":{"sub_category":"x","title":"t"}}"#).expect("write drop");

    sorter_cmd(home)
        .arg("ingest")
        .arg(&drop)
        .assert()
        .failure()
        .stdout(predicates::str::contains("SCHEMA_ERROR"));

    assert!(!drop.exists());
    assert!(home.join("processed/errors/bad.json.failed").is_file());
    assert!(!home.join("datasets").join("x").exists());

    let log = fs::read_to_string(home.join("logs/errors.jsonl")).expect("error log");
    let entry: serde_json::Value =
        serde_json::from_str(log.lines().last().expect("entry")).expect("json");
    assert_eq!(entry["kind"], "SCHEMA_ERROR");
}

#[test]
fn ingest_quarantines_unparseable_jsonl() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let inbox = home.join("inbox");
    fs::create_dir_all(&inbox).expect("mkdir inbox");
    let drop = inbox.join("broken.jsonl");
    fs::write(&drop, "{\"a\":1}\n{not json\n").expect("write drop");

    sorter_cmd(home)
        .args(["--json", "ingest"])
        .arg(&drop)
        .assert()
        .failure()
        .stdout(predicates::str::contains("PARSE_ERROR"));

    assert!(home.join("processed/errors/broken.jsonl.failed").is_file());
}
