//! Integration tests for `docdesk login`, `status` and `logout`.


use fixtures::{can_bind_localhost, docdesk, logged_in, temp_home};
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_login_persists_across_invocations() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"user_code": "u42", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::login_body()))
        .expect(1)
        .mount(&server)
        .await;
    let home = temp_home();

    docdesk(&home, &server)
        .args(["login", "-u", "u42", "--password", "secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Ada Lovelace"));

    assert!(home.path().join("session.json").exists());

    docdesk(&home, &server)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Ada Lovelace (u42)"))
        .stdout(predicate::str::contains("Session expires"));
}

#[tokio::test]
async fn test_login_rejection_shows_server_message() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
        )
        .mount(&server)
        .await;
    let home = temp_home();

    docdesk(&home, &server)
        .args(["login", "-u", "u42", "--password", "wrong"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credentials"));

    assert!(!home.path().join("session.json").exists());
}

#[tokio::test]
async fn test_password_from_stdin() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"user_code": "u42", "password": "from-stdin"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::login_body()))
        .expect(1)
        .mount(&server)
        .await;
    let home = temp_home();

    docdesk(&home, &server)
        .args(["login", "-u", "u42"])
        .write_stdin("from-stdin\n")
        .assert()
        .success();
}

#[tokio::test]
async fn test_logout_forgets_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    let home = logged_in(&server).await;

    docdesk(&home, &server)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out."));

    assert!(!home.path().join("session.json").exists());

    docdesk(&home, &server)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in."));
}

#[test]
fn test_status_without_session() {
    let home = temp_home();

    assert_cmd::cargo::cargo_bin_cmd!("docdesk")
        .env("DOCDESK_HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in."));
}
