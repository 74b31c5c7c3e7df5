//! Chat command handler: one question, or a line-oriented conversation.

use std::io::{self, Write};

use anyhow::{Context, Result};
use docdesk_core::chat::{ChatMessage, ChatSession, ReplyKind};
use docdesk_core::session::SessionManager;

use super::{failure, require_login};

pub async fn run(session: &SessionManager, prompt: Option<&str>) -> Result<()> {
    require_login(session)?;
    let chat = ChatSession::new(session.clone());

    if let Some(prompt) = prompt {
        return ask(&chat, prompt).await;
    }

    println!(
        "Thread {}. Type /reset to start over, /exit to quit.",
        chat.thread_id()
    );
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        line.clear();
        let read = io::stdin().read_line(&mut line).context("read from stdin")?;
        if read == 0 {
            break;
        }

        match line.trim() {
            "" => {}
            "/exit" | "/quit" => break,
            "/reset" => {
                chat.reset();
                println!("New conversation: {}", chat.thread_id());
            }
            text => {
                if let Err(e) = ask(&chat, text).await {
                    if !session.is_authenticated() {
                        return Err(e);
                    }
                    eprintln!("{e:#}");
                }
            }
        }
    }
    Ok(())
}

async fn ask(chat: &ChatSession, text: &str) -> Result<()> {
    match chat.send(text).await {
        Ok(Some(reply)) => {
            print_reply(&reply);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            let committed = chat
                .snapshot()
                .messages
                .last()
                .filter(|m| m.kind == Some(ReplyKind::Error))
                .map(|m| m.content.clone());
            Err(failure(committed, &err))
        }
    }
}

fn print_reply(reply: &ChatMessage) {
    if let Some(ReplyKind::Search(search_type)) = reply.kind {
        println!("[{}]", search_type.label());
    }
    println!("{}", reply.content);
}
