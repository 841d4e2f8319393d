//! Chat commands

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{cursor, queue};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time;

use super::compose::{Compose, ComposeAction};
use super::{ChatError, ChatSession, ChatUpdate};
use crate::models::Message;
use crate::session::Session;

/// How long `send` waits for the server to echo the message back.
const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// How often typing indicators are re-checked for expiry.
const TYPING_REFRESH: Duration = Duration::from_millis(500);

fn format_message(msg: &Message) -> String {
    format!(
        "[{}] {}: {}",
        msg.created_at.format("%Y-%m-%d %H:%M"),
        msg.sender_name(),
        msg.content
    )
}

async fn connected_session() -> Result<Session> {
    let session = Session::load()?;
    session.ensure_signed_in()?;
    session.connect_chat()?;
    session
        .chat_connection()
        .wait_connected()
        .await
        .context("Could not reach the chat server")?;
    Ok(session)
}

/// Send one message and wait briefly for the server echo.
pub async fn send(chat_id: &str, message: &str) -> Result<()> {
    anyhow::ensure!(!message.trim().is_empty(), "Message is empty");

    let session = connected_session().await?;
    let self_id = session.store().user_id();
    let mut chat = session.chat_session();
    chat.join(chat_id)?;
    chat.send_message(message)?;

    let echo = time::timeout(ECHO_TIMEOUT, async {
        loop {
            if let ChatUpdate::Message(m) = chat.next_update().await? {
                if m.content == message && Some(&m.sender_id) == self_id.as_ref() {
                    return Ok::<_, ChatError>(m);
                }
            }
        }
    })
    .await;

    match echo {
        Ok(Ok(_)) => println!("Message sent."),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => println!("Message sent (not yet confirmed by the server)."),
    }

    chat.leave();
    session.chat_connection().disconnect().await;
    Ok(())
}

/// Send one composed line. Returns a notice for the user when it did not go out.
fn deliver(chat: &mut ChatSession, text: &str) -> Option<String> {
    match chat.send_message(text) {
        Ok(()) | Err(ChatError::EmptyMessage) => None,
        Err(e) => {
            tracing::debug!("send failed: {}", e);
            Some(format!("(not sent: {}; press Enter to retry)", e))
        }
    }
}

fn typing_hint(users: &[String]) -> String {
    match users {
        [] => String::new(),
        [one] => format!("[{} is typing] ", one),
        many => format!("[{} are typing] ", many.join(", ")),
    }
}

/// Restores the terminal when dropped.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

enum Input {
    /// Terminal keyboard with a live compose line.
    Keys {
        events: EventStream,
        compose: Compose,
        _raw: RawMode,
    },
    /// Piped stdin, one message per line.
    Lines(Lines<BufReader<Stdin>>),
}

/// Chat output plus the compose line under it.
struct Screen {
    input: Input,
    typing: Vec<String>,
}

impl Screen {
    fn open() -> Result<Self> {
        let input = if io::stdin().is_terminal() {
            Input::Keys {
                events: EventStream::new(),
                compose: Compose::default(),
                _raw: RawMode::enable()?,
            }
        } else {
            Input::Lines(BufReader::new(tokio::io::stdin()).lines())
        };
        let mut screen = Self {
            input,
            typing: Vec::new(),
        };
        screen.redraw()?;
        Ok(screen)
    }

    /// Next thing the user did. End of input counts as quitting.
    async fn next_action(&mut self) -> Result<ComposeAction> {
        match &mut self.input {
            Input::Keys {
                events, compose, ..
            } => loop {
                match events.next().await {
                    Some(Ok(Event::Key(key))) => return Ok(compose.handle_key(key)),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("Failed to read keyboard"),
                    None => return Ok(ComposeAction::Quit),
                }
            },
            Input::Lines(lines) => match lines.next_line().await.context("Failed to read stdin")? {
                Some(line) => Ok(ComposeAction::Submit(line)),
                None => Ok(ComposeAction::Quit),
            },
        }
    }

    fn text(&self) -> &str {
        match &self.input {
            Input::Keys { compose, .. } => compose.text(),
            Input::Lines(_) => "",
        }
    }

    fn restore(&mut self, text: String) {
        if let Input::Keys { compose, .. } = &mut self.input {
            compose.restore(text);
        }
    }

    fn print(&mut self, line: &str) -> Result<()> {
        match self.input {
            Input::Keys { .. } => {
                let mut out = io::stdout();
                queue!(
                    out,
                    cursor::MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    Print(line),
                    Print("\r\n")
                )?;
                self.redraw()
            }
            Input::Lines(_) => {
                println!("{}", line);
                Ok(())
            }
        }
    }

    fn set_typing(&mut self, users: Vec<String>) -> Result<()> {
        if users == self.typing {
            return Ok(());
        }
        self.typing = users;
        match self.input {
            Input::Keys { .. } => self.redraw(),
            Input::Lines(_) if !self.typing.is_empty() => {
                println!("  {}", typing_hint(&self.typing).trim_end());
                Ok(())
            }
            Input::Lines(_) => Ok(()),
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let Input::Keys { compose, .. } = &self.input else {
            return Ok(());
        };
        let prompt = format!("{}> ", typing_hint(&self.typing));
        let column = prompt.chars().count() + compose.cursor();

        let mut out = io::stdout();
        queue!(
            out,
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(&prompt),
            Print(compose.text()),
            cursor::MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX))
        )?;
        out.flush()?;
        Ok(())
    }

    /// Leave the prompt line empty for whatever prints next.
    fn close(&mut self) -> Result<()> {
        if let Input::Keys { .. } = self.input {
            let mut out = io::stdout();
            queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            out.flush()?;
        }
        Ok(())
    }
}

/// Interactive chat: history, live messages and typing, with a compose line.
pub async fn run(chat_id: &str, history_limit: u32) -> Result<()> {
    let session = connected_session().await?;
    let mut chat = session.chat_session();
    chat.join(chat_id)?;

    // Pushes that arrive meanwhile stay queued and are merged after it.
    match chat.load_history(session.api(), Some(history_limit)).await {
        Ok(_) if chat.messages().is_empty() => println!("(no earlier messages)"),
        Ok(_) => {
            for m in chat.messages() {
                println!("{}", format_message(m));
            }
        }
        Err(ChatError::Api(e)) => tracing::warn!("Could not load history: {}", e.user_message()),
        Err(e) => tracing::warn!("Could not load history: {}", e),
    }

    println!(
        "Joined chat {}. Type a message and press Enter; Esc or /quit leaves.",
        chat_id
    );

    let mut screen = Screen::open()?;
    let mut ticker = time::interval(TYPING_REFRESH);
    let outcome = loop {
        tokio::select! {
            update = chat.next_update() => match update {
                Ok(ChatUpdate::Message(m)) => screen.print(&format_message(&m))?,
                Ok(ChatUpdate::Typing { .. }) => screen.set_typing(chat.typing_users())?,
                Ok(ChatUpdate::Rejoined) => screen.print("(reconnected)")?,
                Err(e) => break Err(e.into()),
            },
            action = screen.next_action() => match action? {
                ComposeAction::Edited => {
                    if let Err(e) = chat.input_changed(screen.text()) {
                        tracing::debug!("typing not sent: {}", e);
                    }
                    screen.redraw()?;
                }
                ComposeAction::Moved => screen.redraw()?,
                ComposeAction::Submit(text) if text.trim() == "/quit" => break Ok(()),
                ComposeAction::Submit(text) => {
                    if let Some(notice) = deliver(&mut chat, &text) {
                        screen.restore(text);
                        screen.print(&notice)?;
                    }
                }
                ComposeAction::Quit => break Ok(()),
                ComposeAction::Ignored => {}
            },
            _ = ticker.tick() => screen.set_typing(chat.typing_users())?,
            _ = session.chat_connection().wait_disconnected() => {
                break Err(anyhow::anyhow!("Lost connection to the chat server"));
            }
        }
    };

    screen.close()?;
    drop(screen);
    chat.leave();
    session.chat_connection().disconnect().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::testing::TestServer;
    use crate::realtime::{ConnectionManager, ReconnectPolicy};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_send_failure_during_reconnect_keeps_chat_open() {
        let mut server = TestServer::start(false).await;
        let conn = Arc::new(ConnectionManager::new(
            "chat",
            server.url.clone(),
            ReconnectPolicy {
                attempts: 3,
                delay: Duration::from_secs(30),
            },
        ));
        conn.connect("t1");
        let mut peer = server.accept().await;
        conn.wait_connected().await.unwrap();

        let mut chat = ChatSession::new(conn.clone(), Some("u1".into()), Duration::from_secs(5));
        chat.join("c1").unwrap();
        assert_eq!(peer.next_event().await, Some(("join_chat".into(), json!("c1"))));
        assert_eq!(deliver(&mut chat, "hello"), None);

        peer.drop_connection().await;
        time::timeout(Duration::from_secs(2), async {
            while conn.is_connected() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let notice = deliver(&mut chat, "are you there?").unwrap();
        assert!(notice.contains("not connected"), "{}", notice);
        assert_eq!(deliver(&mut chat, "   "), None);
        assert_eq!(chat.chat_id(), Some("c1"));
    }

    #[test]
    fn test_typing_hint() {
        assert_eq!(typing_hint(&[]), "");
        assert_eq!(typing_hint(&["w1".to_string()]), "[w1 is typing] ");
        assert_eq!(
            typing_hint(&["u2".to_string(), "w1".to_string()]),
            "[u2, w1 are typing] "
        );
    }
}
