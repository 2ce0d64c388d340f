//! Session console and interactive prompting
//!
//! User-facing progress lines go through a [`Console`] owned by the session.
//! With recording enabled the console keeps every printed line so the output
//! can be replayed once the game launcher has taken over the terminal.
//!
//! Interactive questions go through the [`Prompter`] trait. The binary binds
//! it to stdin; tests and non-interactive runs use [`ScriptedPrompter`].

use crate::Result;
use std::collections::VecDeque;

/// Line-oriented console with an optional recording buffer
#[derive(Debug, Default)]
pub struct Console {
    recording: Option<Vec<String>>,
    quiet: bool,
}

impl Console {
    /// Console that prints without recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Console that prints and records every line
    pub fn recording() -> Self {
        Self {
            recording: Some(Vec::new()),
            quiet: false,
        }
    }

    /// Console that only records (used by tests)
    pub fn silent() -> Self {
        Self {
            recording: Some(Vec::new()),
            quiet: true,
        }
    }

    /// Print one line
    pub fn line(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.quiet {
            println!("{}", text);
        }
        if let Some(buffer) = self.recording.as_mut() {
            buffer.push(text);
        }
    }

    /// Print an empty line
    pub fn blank(&mut self) {
        self.line(String::new());
    }

    /// Lines recorded so far (empty when recording is off)
    pub fn recorded(&self) -> &[String] {
        self.recording.as_deref().unwrap_or(&[])
    }

    /// Print every recorded line again
    pub fn replay(&self) {
        if self.quiet {
            return;
        }
        for line in self.recorded() {
            println!("{}", line);
        }
    }
}

/// Source of answers for interactive flows
pub trait Prompter {
    /// Ask a free-text question
    ///
    /// `Ok(None)` means the user abandoned the current flow (empty answer or
    /// end of input).
    fn ask(&mut self, question: &str) -> Result<Option<String>>;

    /// Ask to pick one of `choices`; accepts the 1-based index or the text
    fn choose(&mut self, question: &str, choices: &[&str]) -> Result<Option<String>> {
        let listing = choices
            .iter()
            .enumerate()
            .map(|(i, c)| format!("  {}. {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n");
        let Some(answer) = self.ask(&format!("{}\n{}\n>", question, listing))? else {
            return Ok(None);
        };

        if let Ok(index) = answer.parse::<usize>() {
            if (1..=choices.len()).contains(&index) {
                return Ok(Some(choices[index - 1].to_string()));
            }
        }
        Ok(choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(&answer))
            .map(|c| c.to_string()))
    }
}

/// Prompter answering from a fixed list, then abandoning
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, _question: &str) -> Result<Option<String>> {
        Ok(self
            .answers
            .pop_front()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_records_lines() {
        let mut console = Console::silent();
        console.line("Mixing attachments...");
        console.blank();
        assert_eq!(console.recorded(), ["Mixing attachments...", ""]);
    }

    #[test]
    fn test_plain_console_does_not_record() {
        let mut console = Console::new();
        console.line("hello");
        assert!(console.recorded().is_empty());
    }

    #[test]
    fn test_choose_by_index_and_name() {
        let mut prompter = ScriptedPrompter::new(["2", "survivortorso", "9"]);
        let choices = ["SurvivorHead", "SurvivorLegs", "SurvivorTorso"];

        assert_eq!(
            prompter.choose("Category?", &choices).unwrap().as_deref(),
            Some("SurvivorLegs")
        );
        assert_eq!(
            prompter.choose("Category?", &choices).unwrap().as_deref(),
            Some("SurvivorTorso")
        );
        assert_eq!(prompter.choose("Category?", &choices).unwrap(), None);
        assert_eq!(prompter.choose("Category?", &choices).unwrap(), None);
    }
}
