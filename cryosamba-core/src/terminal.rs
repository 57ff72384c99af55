//! The interactive surface the wizard talks to.
//!
//! Provides a trait-based abstraction over the operator's terminal with two
//! implementations:
//! - the `dialoguer`/`crossterm` terminal in the `cryosamba` binary
//! - [`ScriptedTerminal`]: replays canned answers and records output, for testing

use std::collections::VecDeque;

use crate::error::{Result, WizardError};

/// How a line of output should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Header,
    Emphasis,
    Success,
    Warning,
    Error,
}

/// Trait for interactive prompt/response backends.
pub trait Terminal {
    /// Ask for one line of text. Empty input yields `default` when one is given.
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Ask a yes/no question.
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Write one line of output.
    fn print(&mut self, tone: Tone, text: &str);

    /// Clear the display.
    fn clear(&mut self);

    fn say(&mut self, text: &str) {
        self.print(Tone::Plain, text);
    }

    fn error(&mut self, text: &str) {
        self.print(Tone::Error, text);
    }

    fn warn(&mut self, text: &str) {
        self.print(Tone::Warning, text);
    }

    fn success(&mut self, text: &str) {
        self.print(Tone::Success, text);
    }

    /// Section header, rendered as `*** message ***` with surrounding blank lines.
    fn header(&mut self, message: &str) {
        self.print(Tone::Plain, "");
        self.print(Tone::Header, &format!("*** {message} ***"));
        self.print(Tone::Plain, "");
    }
}

/// A terminal that replays scripted answers.
///
/// Every `input` and `confirm` call consumes one answer. An empty answer
/// selects the default. Running out of answers is an error, so a flow that
/// loops forever on bad input fails the test instead of hanging it.
#[derive(Debug, Default)]
pub struct ScriptedTerminal {
    answers: VecDeque<String>,
    prompts: Vec<String>,
    lines: Vec<(Tone, String)>,
    clears: usize,
}

impl ScriptedTerminal {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Every prompt shown, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Every output line, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|(_, text)| text.as_str())
    }

    /// Output lines printed with the given tone.
    pub fn lines_with(&self, tone: Tone) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(t, _)| *t == tone)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    /// All output joined by newlines.
    pub fn output(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    /// Answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_answer(&mut self, prompt: &str) -> Result<String> {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front().ok_or_else(|| WizardError::Prompt {
            message: format!("script exhausted at prompt '{prompt}'"),
        })
    }
}

impl Terminal for ScriptedTerminal {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let answer = self.next_answer(prompt)?;
        match (answer.is_empty(), default) {
            (true, Some(default)) => Ok(default.to_string()),
            _ => Ok(answer),
        }
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let answer = self.next_answer(prompt)?;
        match answer.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "y" | "yes" => Ok(true),
            "n" | "no" => Ok(false),
            other => Err(WizardError::Prompt {
                message: format!("scripted confirm answer '{other}' is not y/n"),
            }),
        }
    }

    fn print(&mut self, tone: Tone, text: &str) {
        self.lines.push((tone, text.to_string()));
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_uses_default_on_empty_answer() {
        let mut term = ScriptedTerminal::new(["", "typed"]);
        assert_eq!(term.input("a", Some("dflt")).unwrap(), "dflt");
        assert_eq!(term.input("b", Some("dflt")).unwrap(), "typed");
        assert_eq!(term.prompts(), ["a", "b"]);
    }

    #[test]
    fn test_confirm_answers() {
        let mut term = ScriptedTerminal::new(["y", "no", ""]);
        assert!(term.confirm("q1", false).unwrap());
        assert!(!term.confirm("q2", true).unwrap());
        assert!(term.confirm("q3", true).unwrap());
    }

    #[test]
    fn test_exhausted_script_is_an_error() {
        let mut term = ScriptedTerminal::new(Vec::<String>::new());
        let err = term.input("anything", None).unwrap_err();
        assert!(matches!(err, WizardError::Prompt { .. }));
    }

    #[test]
    fn test_header_format() {
        let mut term = ScriptedTerminal::default();
        term.header("Experiment Manager");
        assert_eq!(term.lines_with(Tone::Header), ["*** Experiment Manager ***"]);
    }
}
