//! Operator interaction: progress output, confirmations and free-form input.

use std::io::{self, BufRead, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UiError {
    #[error("input is disabled; cannot ask \"{id}\"")]
    InputDisabled { id: String },

    #[error("Failed to read input: {0}")]
    Io(#[from] io::Error),
}

/// A question put to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Stable identifier, used by scripted UIs to pick answers.
    pub id: String,
    pub query: String,
    pub description: String,
    /// The answer is read without echoing it.
    pub sensitive: bool,
}

impl Prompt {
    pub fn new(id: impl Into<String>, query: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            description: description.into(),
            sensitive: false,
        }
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }
}

pub trait Ui {
    /// Show a progress or result message.
    fn output(&mut self, message: &str);

    /// Whether questions can be asked at all.
    fn is_interactive(&self) -> bool;

    /// Ask a yes/no question. Only an explicit "yes" confirms.
    fn confirm(&mut self, prompt: &Prompt) -> Result<bool, UiError>;

    /// Ask for a value.
    fn input(&mut self, prompt: &Prompt) -> Result<String, UiError>;
}

/// Reads answers from stdin and writes to stdout.
#[derive(Debug, Clone)]
pub struct TerminalUi {
    interactive: bool,
}

impl TerminalUi {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    fn ask(&self, prompt: &Prompt) -> Result<String, UiError> {
        if !self.interactive {
            return Err(UiError::InputDisabled {
                id: prompt.id.clone(),
            });
        }

        let mut stdout = io::stdout();
        if !prompt.description.is_empty() {
            writeln!(stdout, "{}", prompt.query)?;
            writeln!(stdout, "{}", prompt.description)?;
            write!(stdout, "\n  Enter a value: ")?;
        } else {
            write!(stdout, "{}: ", prompt.query)?;
        }
        stdout.flush()?;

        if prompt.sensitive {
            let answer = read_hidden();
            writeln!(stdout)?;
            return answer;
        }

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Disables raw mode when dropped, including on early return.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Read one line from the terminal without echoing it.
fn read_hidden() -> Result<String, UiError> {
    let _guard = RawModeGuard::enable()?;
    let mut line = String::new();

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if !apply_key(&mut line, key)? {
            return Ok(line.trim().to_string());
        }
    }
}

/// Apply one key press to a hidden line. Returns `false` once the line is
/// complete.
fn apply_key(line: &mut String, key: KeyEvent) -> io::Result<bool> {
    match key.code {
        KeyCode::Enter => Ok(false),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Err(io::Error::new(io::ErrorKind::Interrupted, "input interrupted"))
        }
        KeyCode::Char(c) => {
            line.push(c);
            Ok(true)
        }
        KeyCode::Backspace => {
            line.pop();
            Ok(true)
        }
        _ => Ok(true),
    }
}

impl Ui for TerminalUi {
    fn output(&mut self, message: &str) {
        println!("{}", message);
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&mut self, prompt: &Prompt) -> Result<bool, UiError> {
        let answer = self.ask(prompt)?;
        Ok(answer.eq_ignore_ascii_case("yes"))
    }

    fn input(&mut self, prompt: &Prompt) -> Result<String, UiError> {
        self.ask(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_interactive_refuses_questions() {
        let mut ui = TerminalUi::new(false);
        let prompt = Prompt::new("backend-migrate", "Copy state?", "");
        assert!(!ui.is_interactive());
        assert!(matches!(ui.confirm(&prompt), Err(UiError::InputDisabled { .. })));
        assert!(matches!(ui.input(&prompt), Err(UiError::InputDisabled { .. })));
    }

    #[test]
    fn test_prompts_are_not_sensitive_by_default() {
        let prompt = Prompt::new("backend-http-password", "password", "");
        assert!(!prompt.sensitive);
        assert!(prompt.sensitive(true).sensitive);
    }

    #[test]
    fn test_hidden_line_editing() {
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        let mut line = String::new();

        for c in "secrex".chars() {
            assert!(apply_key(&mut line, press(KeyCode::Char(c))).unwrap());
        }
        assert!(apply_key(&mut line, press(KeyCode::Backspace)).unwrap());
        assert!(apply_key(&mut line, press(KeyCode::Char('t'))).unwrap());
        assert!(!apply_key(&mut line, press(KeyCode::Enter)).unwrap());
        assert_eq!(line, "secret");

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let err = apply_key(&mut line, ctrl_c).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }
}
