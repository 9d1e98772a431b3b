use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn templar_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_templar"))
}

fn setup_test_env(port: u16) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/templar.sqlite"

[server]
bind = "127.0.0.1:{}"
"#,
        root.display(),
        port
    );

    let config_path = config_dir.join("templar.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_templar(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = templar_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run templar binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

// ============ CLI ============

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(8000);

    let (stdout, stderr, success) = run_templar(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, stderr, success) = run_templar(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_seed_list_and_chunks() {
    let (_tmp, config_path) = setup_test_env(8000);

    let (stdout, stderr, success) = run_templar(&config_path, &["seed"]);
    assert!(success, "seed failed: {}", stderr);
    assert!(stdout.contains("3 chunks"));

    // Seeding twice rewrites rather than duplicates.
    let (_, stderr, success) = run_templar(&config_path, &["seed"]);
    assert!(success, "second seed failed: {}", stderr);

    let (stdout, _, success) = run_templar(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("cert-of-insurance-001"));
    assert!(stdout.contains("Commercial Certificate of Insurance"));
    assert!(!stdout.contains("Producer Information"));

    let (stdout, _, success) = run_templar(&config_path, &["chunks", "cert-of-insurance-001"]);
    assert!(success);
    let main = stdout.find("main-chunk-001").unwrap();
    let producer = stdout.find("producer-chunk-001").unwrap();
    let insured = stdout.find("insured-chunk-001").unwrap();
    assert!(main < producer && producer < insured);
}

#[test]
fn test_import_export_roundtrip() {
    let (tmp, config_path) = setup_test_env(8000);
    run_templar(&config_path, &["seed"]);

    let file = tmp.path().join("cert.md");
    fs::write(
        &file,
        "CERTIFICATE OF LIABILITY INSURANCE\n\n---\n\nPRODUCER\n[Producer Name]\n\n---\n\n---\n\nCANCELLATION\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_templar(
        &config_path,
        &["import", "cert-of-insurance-001", file.to_str().unwrap()],
    );
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("3 chunks"));

    let (stdout, _, success) = run_templar(&config_path, &["export", "cert-of-insurance-001"]);
    assert!(success);
    assert_eq!(
        stdout.trim_end(),
        "CERTIFICATE OF LIABILITY INSURANCE\n\n---\n\nPRODUCER\n[Producer Name]\n\n---\n\nCANCELLATION"
    );

    // The main chunk keeps the template name.
    let (stdout, _, _) = run_templar(&config_path, &["search", "commercial certificate"]);
    assert!(stdout.contains("cert-of-insurance-001"));
}

#[test]
fn test_add_reorder_and_delete() {
    let (_tmp, config_path) = setup_test_env(8000);
    run_templar(&config_path, &["seed"]);

    let (stdout, stderr, success) = run_templar(
        &config_path,
        &["add", "cert-of-insurance-001", "CANCELLATION"],
    );
    assert!(success, "add failed: {}", stderr);
    assert!(stdout.contains("at order 3"));

    let (stdout, _, success) = run_templar(
        &config_path,
        &[
            "reorder",
            "cert-of-insurance-001",
            "main-chunk-001",
            "insured-chunk-001",
            "producer-chunk-001",
        ],
    );
    assert!(success);
    assert!(stdout.contains("Reordered"));

    let (stdout, _, _) = run_templar(&config_path, &["export", "cert-of-insurance-001"]);
    assert!(stdout.find("INSURED").unwrap() < stdout.find("PRODUCER").unwrap());

    let (_, _, success) = run_templar(&config_path, &["delete-chunk", "producer-chunk-001"]);
    assert!(success);
    let (_, stderr, success) = run_templar(&config_path, &["delete-chunk", "producer-chunk-001"]);
    assert!(!success);
    assert!(stderr.contains("chunk not found"));

    let (_, _, success) = run_templar(&config_path, &["delete", "cert-of-insurance-001"]);
    assert!(success);
    let (_, stderr, success) = run_templar(&config_path, &["get", "cert-of-insurance-001"]);
    assert!(!success);
    assert!(stderr.contains("template not found"));
}

#[test]
fn test_completions_without_config() {
    let output = Command::new(templar_binary())
        .arg("--config")
        .arg("/nonexistent/templar.toml")
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("templar"));
}

#[test]
fn test_split_without_config() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("cert.md");
    fs::write(&file, "CERTIFICATE\n---\nPRODUCER\n---\n\n---\nINSURED\n").unwrap();

    let (stdout, stderr, success) =
        run_templar(Path::new("/nonexistent/templar.toml"), &["split", file.to_str().unwrap()]);
    assert!(success, "split failed: {}", stderr);
    assert!(stdout.contains("[0] CERTIFICATE"));
    assert!(stdout.contains("[2] INSURED"));
    assert!(stdout.contains("3 chunks."));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_templar(Path::new("/nonexistent/templar.toml"), &["list"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

// ============ HTTP ============

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Server process, killed on drop so a failed assertion never leaks it.
struct ServerGuard(std::process::Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.0.kill().ok();
        self.0.wait().ok();
    }
}

fn start_server(config_path: &Path, port: u16) -> ServerGuard {
    let child = Command::new(templar_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("serve")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to start server: {}", e));
    let guard = ServerGuard(child);
    wait_for_server(port);
    guard
}

/// Wait for the server to be ready by polling the health endpoint.
fn wait_for_server(port: u16) {
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        std::thread::sleep(std::time::Duration::from_millis(100));
        if let Ok(resp) = reqwest::blocking::get(&url) {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn serve() -> (TempDir, ServerGuard, String) {
    let port = find_free_port();
    let (tmp, config_path) = setup_test_env(port);
    let server = start_server(&config_path, port);
    (tmp, server, format!("http://127.0.0.1:{}", port))
}

#[test]
fn test_server_health() {
    let (_tmp, _server, base) = serve();

    let resp = reqwest::blocking::get(format!("{}/health", base)).unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[test]
fn test_server_template_lifecycle() {
    let (_tmp, _server, base) = serve();
    let client = Client::new();
    let api = format!("{}/api/templates", base);

    // Create the main chunk.
    let resp = client
        .post(&api)
        .json(&json!({
            "template_id": "cert-001",
            "chunk_order": 0,
            "name": "Commercial Certificate of Insurance",
            "content": "CERTIFICATE OF LIABILITY INSURANCE"
        }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().unwrap();
    assert_eq!(created["template_id"], "cert-001");
    let main_id = created["chunk_id"].as_str().unwrap().to_string();

    // Append two chunks.
    let mut added = Vec::new();
    for content in ["PRODUCER\n[Producer Name]", "INSURED\n[Company Name]"] {
        let resp = client
            .post(format!("{}/cert-001/chunks", api))
            .json(&json!({ "content": content }))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().unwrap();
        added.push(body["chunk_id"].as_str().unwrap().to_string());
    }

    let chunks: Vec<Value> = client
        .get(format!("{}/cert-001/chunks", api))
        .send()
        .unwrap()
        .json()
        .unwrap();
    let orders: Vec<i64> = chunks.iter().map(|c| c["chunk_order"].as_i64().unwrap()).collect();
    assert_eq!(orders, vec![0, 1, 2]);

    // Listing shows one entry per template.
    let listed: Vec<Value> = client.get(&api).send().unwrap().json().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["chunk_id"], main_id.as_str());

    // Reorder: insured before producer.
    let order = vec![main_id.clone(), added[1].clone(), added[0].clone()];
    let resp = client
        .put(format!("{}/cert-001/chunks/reorder", api))
        .json(&order)
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Same order again changes nothing.
    let resp = client
        .put(format!("{}/cert-001/chunks/reorder", api))
        .json(&order)
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);

    let content: Value = client
        .get(format!("{}/cert-001/content", api))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(
        content["content"],
        "CERTIFICATE OF LIABILITY INSURANCE\n\n---\n\nINSURED\n[Company Name]\n\n---\n\nPRODUCER\n[Producer Name]"
    );

    // Update the main chunk.
    let resp = client
        .put(format!("{}/cert-001", api))
        .json(&json!({ "name": "Updated Certificate", "content": "UPDATED" }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let got: Value = client
        .get(format!("{}/cert-001", api))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(got["name"], "Updated Certificate");
    assert_eq!(got["chunk_id"], main_id.as_str());

    // Search sees the main chunk only.
    let found: Vec<Value> = client
        .get(format!("{}/search", api))
        .query(&[("query", "updated")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(found.len(), 1);
    let found: Vec<Value> = client
        .get(format!("{}/search", api))
        .query(&[("query", "producer")])
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(found.is_empty());

    // Replace content from one blob.
    let replaced: Vec<Value> = client
        .put(format!("{}/cert-001/content", api))
        .json(&json!({ "content": "A\n---\nB" }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(replaced.len(), 2);
    assert_eq!(replaced[0]["name"], "Updated Certificate");
    assert_eq!(replaced[1]["content"], "B");

    // Delete one chunk, then the template.
    let chunk_id = replaced[1]["chunk_id"].as_str().unwrap();
    let resp = client
        .delete(format!("{}/cert-001/chunks/{}", api, chunk_id))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = client
        .delete(format!("{}/cert-001/chunks/{}", api, chunk_id))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client.delete(format!("{}/cert-001", api)).send().unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{}/cert-001", api)).send().unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["error"]["message"].is_string());

    let resp = client.get(format!("{}/cert-001/content", api)).send().unwrap();
    assert_eq!(resp.status(), 404);
}

#[test]
fn test_server_rejects_bad_input() {
    let (_tmp, _server, base) = serve();
    let client = Client::new();
    let api = format!("{}/api/templates", base);

    // Missing content.
    let resp = client
        .post(&api)
        .json(&json!({ "name": "no content" }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    // Negative order.
    let resp = client
        .post(&api)
        .json(&json!({ "name": "n", "content": "c", "chunk_order": -1 }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Duplicate chunk ids in a reorder.
    let resp = client
        .put(format!("{}/T/chunks/reorder", api))
        .json(&json!(["a", "a"]))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Update of a template that does not exist.
    let resp = client
        .put(format!("{}/missing", api))
        .json(&json!({ "name": "n", "content": "c" }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Duplicate chunk id is a server-side failure, not an overwrite.
    let chunk = json!({ "chunk_id": "fixed", "name": "n", "content": "c" });
    assert_eq!(client.post(&api).json(&chunk).send().unwrap().status(), 201);
    let resp = client.post(&api).json(&chunk).send().unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().unwrap();
    assert_eq!(body["error"]["code"], "internal");
}

#[test]
fn test_server_deletes_chunk_named_reorder() {
    let (_tmp, _server, base) = serve();
    let client = Client::new();
    let api = format!("{}/api/templates", base);

    let chunk = json!({
        "template_id": "T",
        "chunk_id": "reorder",
        "chunk_order": 1,
        "name": "",
        "content": "tail"
    });
    assert_eq!(client.post(&api).json(&chunk).send().unwrap().status(), 201);

    let url = format!("{}/T/chunks/reorder", api);
    assert_eq!(client.delete(&url).send().unwrap().status(), 200);
    assert_eq!(client.delete(&url).send().unwrap().status(), 404);

    let chunks: Vec<Value> = client
        .get(format!("{}/T/chunks", api))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(chunks.is_empty());
}

#[test]
fn test_server_tools() {
    let (_tmp, _server, base) = serve();
    let client = Client::new();

    let list: Value = client
        .get(format!("{}/tools/list", base))
        .send()
        .unwrap()
        .json()
        .unwrap();
    let names: Vec<&str> = list["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["get_template", "search_templates", "save_template"]);

    let resp = client
        .post(format!("{}/tools/save_template", base))
        .json(&json!({ "template": [
            { "template_id": "cert-001", "chunk_order": 0,
              "name": "Certificate", "content": "CERTIFICATE OF LIABILITY INSURANCE" },
            { "template_id": "cert-001", "chunk_order": 1,
              "name": "Producer", "content": "PRODUCER" }
        ]}))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().unwrap();
    assert_eq!(body["result"]["saved"], 2);

    let body: Value = client
        .post(format!("{}/tools/get_template", base))
        .json(&json!({ "template_id": "cert-001" }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["result"]["chunks"].as_array().unwrap().len(), 2);

    let body: Value = client
        .post(format!("{}/tools/search_templates", base))
        .json(&json!({ "query": "LIABILITY" }))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["result"]["templates"].as_array().unwrap().len(), 1);

    let resp = client
        .post(format!("{}/tools/get_template", base))
        .json(&json!({ "template_id": "missing" }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{}/tools/get_template", base))
        .json(&json!({}))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/tools/nope", base))
        .json(&json!({}))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 404);
}
