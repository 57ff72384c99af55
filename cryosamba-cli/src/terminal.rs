//! Operator terminal backed by `dialoguer` prompts and `crossterm` styling.

use std::io::{self, Write};

use crossterm::style::Stylize;
use crossterm::{cursor, execute, terminal};
use cryosamba_core::error::{Result, WizardError};
use cryosamba_core::terminal::{Terminal, Tone};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};

pub struct DialoguerTerminal {
    theme: ColorfulTheme,
}

impl DialoguerTerminal {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for DialoguerTerminal {
    fn default() -> Self {
        Self::new()
    }
}

/// Ctrl+C inside a prompt surfaces as an interrupted read.
fn prompt_error(err: dialoguer::Error) -> WizardError {
    let dialoguer::Error::IO(io_err) = err;
    if io_err.kind() == io::ErrorKind::Interrupted {
        WizardError::Interrupted
    } else {
        WizardError::Prompt {
            message: io_err.to_string(),
        }
    }
}

impl Terminal for DialoguerTerminal {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn print(&mut self, tone: Tone, text: &str) {
        match tone {
            Tone::Plain => println!("{text}"),
            Tone::Header | Tone::Emphasis => println!("{}", text.bold()),
            Tone::Success => println!("{}", text.green()),
            Tone::Warning => println!("{}", text.yellow().bold()),
            Tone::Error => println!("{}", text.red()),
        }
    }

    fn clear(&mut self) {
        let mut stdout = io::stdout();
        if let Err(e) = execute!(
            stdout,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        ) {
            tracing::debug!(error = %e, "Failed to clear the terminal");
        }
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_read_maps_to_interrupted() {
        let err = dialoguer::Error::IO(io::Error::new(io::ErrorKind::Interrupted, "read interrupted"));
        assert!(matches!(prompt_error(err), WizardError::Interrupted));
    }

    #[test]
    fn test_other_io_errors_map_to_prompt() {
        let err = dialoguer::Error::IO(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(matches!(prompt_error(err), WizardError::Prompt { .. }));
    }
}
