//! End-to-end run scenarios driving the `smx` binary.
//!
//! Each test gets a fresh tempdir environment (config, stores, source
//! files) and, where a live endpoint is needed, a minimal HTTP stub bound
//! to an ephemeral port.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn smx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("smx");
    path
}

fn setup_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src").join("file.txt"),
        "The quarterly report covers infrastructure spend and growth.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[storage]
dir = "{}/data"
reports_dir = "{}/reports"

[ai]
timeout_secs = 10
"#,
        root.display(),
        root.display()
    );
    let config_path = root.join("config").join("smx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_smx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = smx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run smx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Parses the `id: <uuid>` line printed by `tool add` / `project add`.
fn parse_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("id: "))
        .unwrap_or_else(|| panic!("no id line in output: {}", stdout))
        .trim()
        .to_string()
}

/// Minimal HTTP stub: answers every request with the given status line and
/// JSON body. Lives until the test process exits.
fn spawn_stub(status_line: &'static str, body: &'static str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            let body_len = loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break 0,
                    Ok(n) => {
                        request.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = header_end(&request) {
                            break content_length(&request[..pos]);
                        }
                    }
                    Err(_) => break 0,
                }
            };
            let headers = header_end(&request).unwrap_or(request.len());
            while request.len() < headers + body_len {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{}/api", addr)
}

fn header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(headers: &[u8]) -> usize {
    String::from_utf8_lossy(headers)
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn add_tool(config_path: &Path, endpoint_url: &str) -> String {
    let (stdout, stderr, success) = run_smx(
        config_path,
        &["tool", "add", "summarizer", "--endpoint-url", endpoint_url],
    );
    assert!(success, "tool add failed: {} {}", stdout, stderr);
    parse_id(&stdout)
}

fn add_project(config_path: &Path, src: &Path, tool_id: &str) -> String {
    let (stdout, stderr, success) = run_smx(
        config_path,
        &[
            "project",
            "add",
            "demo",
            "--source",
            src.to_str().unwrap(),
            "--tool",
            tool_id,
        ],
    );
    assert!(success, "project add failed: {} {}", stdout, stderr);
    parse_id(&stdout)
}

#[test]
fn run_completes_and_writes_report() {
    let (tmp, config_path) = setup_env();
    let url = spawn_stub("200 OK", r#"{"result":"a concise summary"}"#);

    run_smx(&config_path, &["init"]);
    let tool_id = add_tool(&config_path, &url);
    let project_id = add_project(&config_path, &tmp.path().join("src"), &tool_id);

    let (stdout, stderr, success) = run_smx(&config_path, &["run", &project_id]);
    assert!(success, "run failed: {} {}", stdout, stderr);
    assert!(stdout.contains("status: completed"), "{}", stdout);

    let (show, _, _) = run_smx(&config_path, &["project", "show", &project_id]);
    assert!(show.contains("status: completed"), "{}", show);
    assert!(show.contains("processed_files: file.txt"), "{}", show);
    assert!(show.contains("summarized 1 file(s)"), "{}", show);

    let report = fs::read_to_string(
        tmp.path()
            .join("reports")
            .join(format!("{}.md", project_id)),
    )
    .unwrap();
    assert!(report.contains("## file: file.txt"), "{}", report);
    assert!(report.contains("### result"), "{}", report);
    assert!(report.contains("a concise summary"), "{}", report);

    // Debug artifact for the processed file.
    let prompt = tmp
        .path()
        .join("reports")
        .join(format!("{}.prompts", project_id))
        .join("file.txt.prompt.json");
    assert!(prompt.exists(), "missing prompt artifact");
}

#[test]
fn endpoint_failure_is_scoped_to_the_file() {
    let (tmp, config_path) = setup_env();
    let url = spawn_stub("500 Internal Server Error", r#"{"detail":"boom"}"#);

    run_smx(&config_path, &["init"]);
    let tool_id = add_tool(&config_path, &url);
    let project_id = add_project(&config_path, &tmp.path().join("src"), &tool_id);

    let (stdout, _, success) = run_smx(&config_path, &["run", &project_id]);
    assert!(success);
    // The API failure is file-scoped: the run itself completes.
    assert!(stdout.contains("status: completed"), "{}", stdout);

    let report = fs::read_to_string(
        tmp.path()
            .join("reports")
            .join(format!("{}.md", project_id)),
    )
    .unwrap();
    assert!(report.contains("## file: file.txt"), "{}", report);
    assert!(report.contains("processing failed"), "{}", report);

    let (show, _, _) = run_smx(&config_path, &["project", "show", &project_id]);
    assert!(show.contains("summarized 0 file(s)"), "{}", show);
}

#[test]
fn mixed_run_processes_good_files_and_reports_bad_ones() {
    let (tmp, config_path) = setup_env();
    let url = spawn_stub("200 OK", r#"{"result":"ok"}"#);

    // One readable file (from setup) plus one that is not valid UTF-8.
    fs::write(tmp.path().join("src").join("binary.txt"), [0xff, 0xfe, 0x80]).unwrap();

    run_smx(&config_path, &["init"]);
    let tool_id = add_tool(&config_path, &url);
    let project_id = add_project(&config_path, &tmp.path().join("src"), &tool_id);

    let (stdout, _, success) = run_smx(&config_path, &["run", &project_id]);
    assert!(success);
    assert!(stdout.contains("status: completed"), "{}", stdout);

    let (show, _, _) = run_smx(&config_path, &["project", "show", &project_id]);
    assert!(show.contains("processed_files: file.txt"), "{}", show);

    let report = fs::read_to_string(
        tmp.path()
            .join("reports")
            .join(format!("{}.md", project_id)),
    )
    .unwrap();
    assert!(report.contains("## file: binary.txt"), "{}", report);
    assert!(report.contains("processing failed"), "{}", report);
}

#[test]
fn rerun_replaces_the_previous_report() {
    let (tmp, config_path) = setup_env();
    let url = spawn_stub("200 OK", r#"{"result":"fresh summary"}"#);

    run_smx(&config_path, &["init"]);
    let tool_id = add_tool(&config_path, &url);
    let project_id = add_project(&config_path, &tmp.path().join("src"), &tool_id);

    run_smx(&config_path, &["run", &project_id]);
    let (stdout, _, success) = run_smx(&config_path, &["run", &project_id]);
    assert!(success);
    assert!(stdout.contains("status: completed"), "{}", stdout);

    let report = fs::read_to_string(
        tmp.path()
            .join("reports")
            .join(format!("{}.md", project_id)),
    )
    .unwrap();
    // Exactly one section for the file, not two appended runs.
    assert_eq!(report.matches("## file: file.txt").count(), 1, "{}", report);
}

#[test]
fn disabled_tool_blocks_new_projects_but_still_runs() {
    let (tmp, config_path) = setup_env();
    let url = spawn_stub("200 OK", r#"{"result":"still works"}"#);

    run_smx(&config_path, &["init"]);
    let tool_id = add_tool(&config_path, &url);
    let project_id = add_project(&config_path, &tmp.path().join("src"), &tool_id);

    let (_, _, success) = run_smx(&config_path, &["tool", "disable", &tool_id]);
    assert!(success);

    // New selection is refused...
    let (_, stderr, success) = run_smx(
        &config_path,
        &[
            "project",
            "add",
            "late",
            "--source",
            tmp.path().join("src").to_str().unwrap(),
            "--tool",
            &tool_id,
        ],
    );
    assert!(!success);
    assert!(stderr.contains("disabled"), "{}", stderr);

    // ...but the already-bound project executes normally.
    let (stdout, _, success) = run_smx(&config_path, &["run", &project_id]);
    assert!(success);
    assert!(stdout.contains("status: completed"), "{}", stdout);
}

#[test]
fn unknown_tool_reference_fails_the_run() {
    let (tmp, config_path) = setup_env();
    run_smx(&config_path, &["init"]);

    // The CLI refuses unknown tools at creation, so seed the store file
    // directly (its format is a public interface).
    let projects_json = format!(
        r#"[{{
  "id": "p-manual",
  "name": "manual",
  "source": "{}",
  "tool": "missing-tool",
  "result": null,
  "created_at": "2026-08-07T00:00:00Z",
  "executed_at": null,
  "finished_at": null
}}]"#,
        tmp.path().join("src").display()
    );
    fs::write(tmp.path().join("data").join("projects.json"), projects_json).unwrap();

    let (stdout, _, success) = run_smx(&config_path, &["run", "p-manual"]);
    assert!(success, "run command itself must not crash: {}", stdout);
    assert!(stdout.contains("status: failed"), "{}", stdout);

    let (show, _, _) = run_smx(&config_path, &["project", "show", "p-manual"]);
    assert!(show.contains("error:"), "{}", show);
    assert!(!show.contains("processed_files"), "{}", show);
}

#[test]
fn recover_fails_interrupted_runs() {
    let (tmp, config_path) = setup_env();
    run_smx(&config_path, &["init"]);

    let projects_json = format!(
        r#"[{{
  "id": "p-stale",
  "name": "stale",
  "source": "{}",
  "tool": "t1",
  "result": null,
  "created_at": "2026-08-07T00:00:00Z",
  "executed_at": "2026-08-07T00:01:00Z",
  "finished_at": null
}}]"#,
        tmp.path().join("src").display()
    );
    fs::write(tmp.path().join("data").join("projects.json"), projects_json).unwrap();

    let (list, _, _) = run_smx(&config_path, &["project", "list"]);
    assert!(list.contains("processing"), "{}", list);

    let (stdout, _, success) = run_smx(&config_path, &["recover"]);
    assert!(success);
    assert!(stdout.contains("recovered p-stale"), "{}", stdout);

    let (show, _, _) = run_smx(&config_path, &["project", "show", "p-stale"]);
    assert!(show.contains("status: failed"), "{}", show);
    assert!(show.contains("interrupted"), "{}", show);
}
