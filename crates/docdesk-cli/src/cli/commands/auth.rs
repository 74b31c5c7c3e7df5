//! Login, logout and status.

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use docdesk_core::session::{SessionManager, SessionStatus};

pub async fn login(session: &SessionManager, username: &str, password: Option<String>) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        bail!("A user code is required.");
    }
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    match session.login(username, &password).await {
        Ok(user) => {
            println!("Logged in as {}", user.display_name().unwrap_or(username));
            Ok(())
        }
        Err(err) => {
            let reason = session
                .snapshot()
                .last_error
                .unwrap_or_else(|| err.user_message());
            bail!("{reason}")
        }
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let _ = io::stderr().flush();

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("No password given.");
    }
    Ok(password)
}

pub fn logout(session: &SessionManager) {
    session.logout();
    println!("Logged out.");
}

pub fn status(session: &SessionManager) {
    let snapshot = session.snapshot();
    let user = match snapshot.user {
        Some(user) if snapshot.status == SessionStatus::Authenticated => user,
        _ => {
            println!("Not logged in.");
            return;
        }
    };

    let name = user.display_name().unwrap_or("unknown user");
    match user.user_code() {
        Some(code) if code != name => println!("Logged in as {name} ({code})"),
        _ => println!("Logged in as {name}"),
    }

    let credentials = session.dispatcher().credentials();
    if let Some(credential) = credentials.get() {
        let expires = i64::try_from(credential.expires_at_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string());
        if let Some(expires) = expires {
            let note = if credentials.is_expiring_soon() {
                " (expiring soon)"
            } else {
                ""
            };
            println!("Session expires {expires}{note}");
        }
    }
}
