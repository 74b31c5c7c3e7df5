//! Shared setup for docdesk-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use docdesk_core::api::{Dispatcher, ServiceRoutes};
use docdesk_core::credentials::CredentialStore;
use docdesk_core::session::{SessionManager, SessionStatus};
use docdesk_core::storage::{MemoryStorage, SessionStorage};
use serde_json::{Value, json};

/// An address nothing listens on.
pub const DEAD_URL: &str = "http://127.0.0.1:9";

pub struct Harness {
    pub session: SessionManager,
    pub credentials: CredentialStore,
    pub storage: Arc<MemoryStorage>,
}

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn harness(auth_url: &str, data_url: &str) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let credentials = CredentialStore::new(Arc::clone(&storage) as Arc<dyn SessionStorage>);
    let routes = ServiceRoutes::new(auth_url, data_url).unwrap();
    let dispatcher = Dispatcher::new(routes, credentials.clone());
    Harness {
        session: SessionManager::new(dispatcher, Duration::from_secs(3600)),
        credentials,
        storage,
    }
}

/// A harness whose session was restored from a valid stored login.
pub fn signed_in(data_url: &str) -> Harness {
    let h = harness(DEAD_URL, data_url);
    h.credentials
        .set("tok-test-0001", Duration::from_secs(3600))
        .unwrap();
    h.credentials
        .set_identity(
            &serde_json::from_value(json!({"user_code": "u42", "full_name": "Ada Lovelace"}))
                .unwrap(),
        )
        .unwrap();
    assert_eq!(h.session.restore(), SessionStatus::Authenticated);
    h
}

pub fn doc(id: &str, filename: &str) -> Value {
    json!({
        "_id": id,
        "filename": filename,
        "uploaded_by": "Ada Lovelace",
        "createdAt": "2025-03-01T10:00:00Z"
    })
}

pub fn list_body(documents: &[Value], total: u64) -> Value {
    json!({ "documents": documents, "total": total })
}

pub fn ids(state: &docdesk_core::documents::DocumentsState) -> Vec<String> {
    state.documents.iter().map(|d| d.id.clone()).collect()
}
