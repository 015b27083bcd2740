use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

const CREDENTIAL_VARS: [&str; 6] = [
    "ASTRA_DB_API_ENDPOINT",
    "ASTRA_DB_TOKEN",
    "ASTRA_DB_KEYSPACE",
    "ASTRA_DB_INTEGRATION_OPENAI_KEY_NAME",
    "ASTRA_CLIENT_KWARGS",
    "OPENAI_API_KEY",
];

fn run_catalog(root: &Path, args: &[&str]) -> (String, String, bool) {
    run_catalog_with_env(root, args, &[])
}

fn run_catalog_with_env(root: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_catalog");
    let mut command = Command::new(binary);
    command
        .current_dir(root)
        .arg("--root")
        .arg(root)
        .args(args)
        .stdin(Stdio::null())
        .env_remove("CATALOG_SETTINGS")
        .env("RUST_LOG", "warn");
    for var in CREDENTIAL_VARS {
        command.env_remove(var);
    }
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command
        .output()
        .unwrap_or_else(|e| panic!("Failed to run catalog binary at {}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write_export(root: &Path) {
    let lines = [
        r#"{"id":"CB-ARM-001","name":"Robotic Arm","family":"ConstructoBots","category_path":"Robotics > Arms","image_url":"images\\CB-ARM-001.JPG"}"#,
        r#"{"id":"KK-GEAR-001","name":"Gear Set","family":"KinetiKits"}"#,
        r#"{"id":"CB-ARM-002","name":"Gripper","family":"ConstructoBots"}"#,
        r#"{"id":"KK-GEAR-002","name":"Crank","family":"KinetiKits"}"#,
        r#"{"id":"ZZ-1","name":"Mystery","family":"Unknown"}"#,
        r#"{"id":"KK-GEAR-003","name":"Pulley","family":"KinetiKits"}"#,
        "not json",
    ];
    fs::write(root.join("products.jsonl"), lines.join("\n") + "\n").unwrap();
}

fn count_lines(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

#[test]
fn test_split_writes_family_files() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_export(root);

    let (stdout, stderr, success) = run_catalog(root, &["split"]);
    assert!(success, "split failed: {}", stderr);
    assert!(stdout.contains("dropped (unknown family): 1"));
    assert!(stdout.contains("invalid lines: 1"));
    assert!(stdout.trim_end().ends_with("ok"));

    let products = root.join("products");
    assert_eq!(count_lines(&products.join("constructobots/products.jsonl")), 2);
    assert_eq!(count_lines(&products.join("kinetikits/products.jsonl")), 3);
    assert!(products.join("logicleaps").is_dir());
    assert!(!products.join("logicleaps/products.jsonl").exists());

    let first = fs::read_to_string(products.join("constructobots/products.jsonl")).unwrap();
    let first_line: serde_json::Value =
        serde_json::from_str(first.lines().next().unwrap()).unwrap();
    assert_eq!(first_line["_id"], "CB-ARM-001");
    assert!(first_line.get("id").is_none());
    assert_eq!(first_line["product_type"], "Arms");
    assert_eq!(first_line["image_url"], "images/cb-arm-001.png");
}

#[test]
fn test_split_rerun_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_export(root);

    let (_, stderr, success) = run_catalog(root, &["split"]);
    assert!(success, "first split failed: {}", stderr);
    let file = root.join("products/kinetikits/products.jsonl");
    let before = fs::read(&file).unwrap();

    let (_, stderr, success) = run_catalog(root, &["split"]);
    assert!(success, "second split failed: {}", stderr);
    assert_eq!(fs::read(&file).unwrap(), before);
}

#[test]
fn test_split_without_export_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_catalog(tmp.path(), &["split"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read product export"));
}

#[test]
fn test_check_docs_lists_missing_documents() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("products/constructobots");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("products.jsonl"),
        r#"{"_id":"CB-ARM-001","name":"Robotic Arm","documentation_ids":["CB-ARM-001_MANUAL_v1.0","CB-ARM-001_FAQ_v1.0"]}"#,
    )
    .unwrap();
    fs::write(
        dir.join("documents.jsonl"),
        r#"{"_id":"CB-ARM-001_MANUAL_v1.0","title":"Manual","text":"Assemble the arm.","product_id":"CB-ARM-001"}"#,
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_catalog(tmp.path(), &["check-docs", dir.to_str().unwrap()]);
    assert!(success, "check-docs failed: {}", stderr);
    assert!(stdout.contains("Robotic Arm (CB-ARM-001): missing CB-ARM-001_FAQ_v1.0"));
    assert!(stdout.contains("total missing documents: 1"));
}

#[test]
fn test_check_docs_missing_directory_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("products/nothing");
    let (_, stderr, success) =
        run_catalog(tmp.path(), &["check-docs", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_load_without_credentials_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_catalog(tmp.path(), &["load-products"]);
    assert!(!success);
    assert!(stderr.contains("ASTRA_DB_TOKEN and ASTRA_DB_API_ENDPOINT must be set"));
}

#[test]
fn test_invalid_settings_file_fails() {
    let tmp = TempDir::new().unwrap();
    let settings = tmp.path().join("catalog.toml");
    fs::write(&settings, "[collections]\nvector_metric = \"manhattan\"\n").unwrap();
    let (_, stderr, success) = run_catalog(
        tmp.path(),
        &["--settings", settings.to_str().unwrap(), "split"],
    );
    assert!(!success);
    assert!(stderr.contains("Unknown vector metric"));
}

#[test]
fn test_check_docs_ignores_broken_settings() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("products/logicleaps");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("products.jsonl"), r#"{"_id":"LL-1","name":"Blocks","documentation_ids":[]}"#).unwrap();
    fs::write(dir.join("documents.jsonl"), "").unwrap();
    let settings = tmp.path().join("catalog.toml");
    fs::write(&settings, "[collections]\nvector_metric = \"manhattan\"\n").unwrap();

    let (stdout, stderr, success) = run_catalog(
        tmp.path(),
        &["--settings", settings.to_str().unwrap(), "check-docs", dir.to_str().unwrap()],
    );
    assert!(success, "check-docs failed: {}", stderr);
    assert!(stdout.contains("all documentation present"));
}

#[test]
fn test_truncate_without_confirmation_is_cancelled() {
    let tmp = TempDir::new().unwrap();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = format!("http://127.0.0.1:{}", port);
    let env = [
        ("ASTRA_DB_API_ENDPOINT", endpoint.as_str()),
        ("ASTRA_DB_TOKEN", "AstraCS:test"),
    ];

    let (stdout, stderr, success) = run_catalog_with_env(tmp.path(), &["truncate"], &env);
    assert!(success, "truncate failed: {}", stderr);
    assert!(stdout.contains("Are you sure you want to continue?"));
    assert!(stdout.contains("Truncation cancelled."));

    let (_, stderr, success) = run_catalog_with_env(tmp.path(), &["truncate", "--yes"], &env);
    assert!(!success);
    assert!(stderr.contains("--yes"));
}
