//! Document command handlers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use docdesk_core::documents::{QueryCoordinator, Upload, strip_extension};
use docdesk_core::session::SessionManager;
use docdesk_types::Document;
use serde_json::Value;

use super::{failure, require_login};

pub async fn list(session: &SessionManager, query: &str, page: u32) -> Result<()> {
    require_login(session)?;
    let docs = QueryCoordinator::new(session.clone());

    if let Err(err) = docs.fetch_list(query, page).await {
        return Err(failure(docs.snapshot().error, &err));
    }

    let state = docs.snapshot();
    if state.documents.is_empty() {
        println!("No documents found.");
        return Ok(());
    }

    for doc in &state.documents {
        println!(
            "{}  {}  {}  {}",
            doc.id,
            doc.filename,
            doc.uploaded_by.as_deref().unwrap_or("-"),
            format_created(doc)
        );
    }
    println!();
    println!(
        "Page {}/{} ({} documents)",
        state.page,
        state.page_count(),
        state.total
    );
    Ok(())
}

pub async fn show(session: &SessionManager, id: &str) -> Result<()> {
    require_login(session)?;
    let docs = QueryCoordinator::new(session.clone());

    if let Err(err) = docs.fetch_details(id).await {
        return Err(failure(docs.snapshot().error, &err));
    }
    let Some(doc) = docs.snapshot().details else {
        anyhow::bail!("Document {id} not found.");
    };

    println!("ID:          {}", doc.id);
    println!("Filename:    {}", doc.filename);
    if let Some(by) = doc.uploaded_by.as_deref() {
        println!("Uploaded by: {by}");
    }
    if doc.created_at.is_some() {
        println!("Created:     {}", format_created(&doc));
    }

    let mut extra: Vec<(&String, &Value)> = doc.extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        match value {
            Value::Null => {}
            Value::String(s) if s.is_empty() => {}
            Value::String(s) => println!("{key}: {s}"),
            other => println!("{key}: {other}"),
        }
    }
    Ok(())
}

pub async fn upload(session: &SessionManager, file: &Path, uploaded_by: Option<String>) -> Result<()> {
    require_login(session)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("{} is not a file", file.display()))?;
    let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;

    let docs = QueryCoordinator::new(session.clone());
    let upload = Upload {
        file_name: file_name.clone(),
        bytes,
        uploaded_by,
    };
    if let Err(err) = docs.upload(upload).await {
        return Err(failure(docs.snapshot().error, &err));
    }
    println!("Uploaded {file_name}");
    Ok(())
}

pub async fn rename(session: &SessionManager, id: &str, name: &str) -> Result<()> {
    require_login(session)?;
    let docs = QueryCoordinator::new(session.clone());
    if let Err(err) = docs.update(id, name).await {
        return Err(failure(docs.snapshot().error, &err));
    }
    println!("Renamed {id} to {}", strip_extension(name.trim()));
    Ok(())
}

pub async fn delete(session: &SessionManager, id: &str) -> Result<()> {
    require_login(session)?;
    let docs = QueryCoordinator::new(session.clone());
    if let Err(err) = docs.delete(id).await {
        return Err(failure(docs.snapshot().error, &err));
    }
    println!("Deleted {id}");
    Ok(())
}

fn format_created(doc: &Document) -> String {
    let Some(raw) = doc.created_at.as_deref() else {
        return "-".to_string();
    };
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| raw.to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}
