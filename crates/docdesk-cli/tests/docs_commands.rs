//! Integration tests for `docdesk docs`.


use fixtures::{TOKEN, can_bind_localhost, doc, docdesk, logged_in, temp_home};
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_list_prints_rows_and_page() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/documents/list"))
        .and(query_param("limit", "10"))
        .and(query_param("skip", "10"))
        .and(query_param("q", "invoice"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [doc("d11", "invoice-2024.pdf"), doc("d12", "invoice-2025.pdf")],
            "total": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    docdesk(&home, &server)
        .args(["docs", "list", "--query", "invoice", "--page", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("d11  invoice-2024.pdf  Ada Lovelace"))
        .stdout(predicate::str::contains("invoice-2025.pdf"))
        .stdout(predicate::str::contains("Page 2/2 (12 documents)"));
}

#[tokio::test]
async fn test_list_empty() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/documents/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [], "total": 0})))
        .mount(&server)
        .await;

    docdesk(&home, &server)
        .args(["docs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents found."));
}

#[tokio::test]
async fn test_expired_token_logs_out() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/documents/list"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    docdesk(&home, &server)
        .args(["docs", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session expired. Please log in again."));

    assert!(!home.path().join("session.json").exists());
}

#[tokio::test]
async fn test_show_prints_details() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    let mut document = doc("d1", "report.pdf");
    document["pages"] = json!(12);
    Mock::given(method("GET"))
        .and(path("/documents/list/details/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"document": document})))
        .mount(&server)
        .await;

    docdesk(&home, &server)
        .args(["docs", "show", "d1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("report.pdf"))
        .stdout(predicate::str::contains("pages: 12"));
}

#[tokio::test]
async fn test_delete_then_refetch() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/documents/vector/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/documents/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [], "total": 0})))
        .expect(1)
        .mount(&server)
        .await;

    docdesk(&home, &server)
        .args(["docs", "delete", "d1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted d1"));
}

#[tokio::test]
async fn test_delete_failure_reports_detail() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/documents/vector/d1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found"})))
        .mount(&server)
        .await;

    docdesk(&home, &server)
        .args(["docs", "delete", "d1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not delete: Not found"));
}

#[tokio::test]
async fn test_upload_rejects_unsupported_file() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    let file = home.path().join("notes.md");
    std::fs::write(&file, "# notes").unwrap();

    docdesk(&home, &server)
        .args(["docs", "upload", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file format."));
}

#[tokio::test]
async fn test_upload_sends_file() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/documents/vector/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/documents/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [], "total": 0})))
        .mount(&server)
        .await;
    let file = home.path().join("notes.txt");
    std::fs::write(&file, "hello").unwrap();

    docdesk(&home, &server)
        .args(["docs", "upload", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded notes.txt"));

    let upload = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/documents/vector/add")
        .unwrap();
    let body = String::from_utf8_lossy(&upload.body);
    assert!(body.contains("filename=\"notes.txt\""));
    assert!(body.contains("Ada Lovelace"));
}

#[test]
fn test_docs_require_login() {
    let home = temp_home();

    assert_cmd::cargo::cargo_bin_cmd!("docdesk")
        .env("DOCDESK_HOME", home.path())
        .env("DOCDESK_DATA_URL", "http://127.0.0.1:9")
        .args(["docs", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in."));
}
