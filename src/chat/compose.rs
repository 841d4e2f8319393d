//! Single-line compose box driven by key events.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a key press did to the compose line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeAction {
    /// Text changed.
    Edited,
    /// Only the cursor moved.
    Moved,
    /// Enter on a non-blank line; the line is handed over and cleared.
    Submit(String),
    /// Esc or Ctrl-C.
    Quit,
    Ignored,
}

/// State for the compose line.
#[derive(Debug, Default)]
pub struct Compose {
    input: String,
    /// Cursor position (character offset into `input`).
    cursor_pos: usize,
}

impl Compose {
    pub fn text(&self) -> &str {
        &self.input
    }

    pub fn cursor(&self) -> usize {
        self.cursor_pos
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ComposeAction {
        if key.kind != KeyEventKind::Press {
            return ComposeAction::Ignored;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('c') if ctrl => ComposeAction::Quit,
            KeyCode::Char('u') if ctrl => {
                self.clear();
                ComposeAction::Edited
            }
            KeyCode::Char(_) if ctrl => ComposeAction::Ignored,
            KeyCode::Char(c) => {
                self.insert_char(c);
                ComposeAction::Edited
            }
            KeyCode::Esc => ComposeAction::Quit,
            KeyCode::Enter => match self.submit() {
                Some(text) => ComposeAction::Submit(text),
                None => ComposeAction::Ignored,
            },
            KeyCode::Backspace if self.cursor_pos > 0 => {
                self.backspace();
                ComposeAction::Edited
            }
            KeyCode::Delete if self.cursor_pos < self.input.chars().count() => {
                self.delete();
                ComposeAction::Edited
            }
            KeyCode::Left => {
                self.cursor_pos = self.cursor_pos.saturating_sub(1);
                ComposeAction::Moved
            }
            KeyCode::Right => {
                self.cursor_pos = (self.cursor_pos + 1).min(self.input.chars().count());
                ComposeAction::Moved
            }
            KeyCode::Home => {
                self.cursor_pos = 0;
                ComposeAction::Moved
            }
            KeyCode::End => {
                self.cursor_pos = self.input.chars().count();
                ComposeAction::Moved
            }
            _ => ComposeAction::Ignored,
        }
    }

    /// Put back a line that could not be sent.
    pub fn restore(&mut self, text: String) {
        self.cursor_pos = text.chars().count();
        self.input = text;
    }

    fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    fn backspace(&mut self) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        let prev_byte_pos = self.char_to_byte(self.cursor_pos - 1);
        self.input.drain(prev_byte_pos..byte_pos);
        self.cursor_pos -= 1;
    }

    fn delete(&mut self) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        let next_byte_pos = self.char_to_byte(self.cursor_pos + 1);
        self.input.drain(byte_pos..next_byte_pos);
    }

    fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Take the line if it has any content. Whitespace is kept as typed.
    fn submit(&mut self) -> Option<String> {
        if self.input.trim().is_empty() {
            return None;
        }
        self.cursor_pos = 0;
        Some(std::mem::take(&mut self.input))
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(compose: &mut Compose, text: &str) {
        for c in text.chars() {
            assert_eq!(compose.handle_key(key(KeyCode::Char(c))), ComposeAction::Edited);
        }
    }

    #[test]
    fn test_typing_and_editing() {
        let mut compose = Compose::default();
        type_text(&mut compose, "héllo");
        assert_eq!(compose.text(), "héllo");

        compose.handle_key(key(KeyCode::Left));
        compose.handle_key(key(KeyCode::Left));
        compose.handle_key(key(KeyCode::Left));
        assert_eq!(compose.handle_key(key(KeyCode::Backspace)), ComposeAction::Edited);
        assert_eq!(compose.text(), "hllo");
        assert_eq!(compose.cursor(), 1);

        compose.handle_key(key(KeyCode::Home));
        assert_eq!(compose.handle_key(key(KeyCode::Backspace)), ComposeAction::Ignored);
        assert_eq!(compose.handle_key(key(KeyCode::Delete)), ComposeAction::Edited);
        assert_eq!(compose.text(), "llo");

        assert_eq!(compose.handle_key(ctrl('u')), ComposeAction::Edited);
        assert_eq!(compose.text(), "");
    }

    #[test]
    fn test_enter_submits_non_blank_lines() {
        let mut compose = Compose::default();
        type_text(&mut compose, "   ");
        assert_eq!(compose.handle_key(key(KeyCode::Enter)), ComposeAction::Ignored);
        assert_eq!(compose.text(), "   ");

        type_text(&mut compose, "hi ");
        assert_eq!(
            compose.handle_key(key(KeyCode::Enter)),
            ComposeAction::Submit("   hi ".to_string())
        );
        assert_eq!(compose.text(), "");
        assert_eq!(compose.cursor(), 0);

        compose.restore("again".to_string());
        assert_eq!(compose.text(), "again");
        assert_eq!(compose.cursor(), 5);
    }

    #[test]
    fn test_quit_keys() {
        let mut compose = Compose::default();
        assert_eq!(compose.handle_key(ctrl('c')), ComposeAction::Quit);
        assert_eq!(compose.handle_key(key(KeyCode::Esc)), ComposeAction::Quit);
        assert_eq!(compose.handle_key(ctrl('x')), ComposeAction::Ignored);
    }
}
