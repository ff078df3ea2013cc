//! Interactive acquisition of missing inputs
//!
//! `PromptSession` drives the prompt loops over any `LineReader`. The terminal
//! implementation lives in `console` and is only built with the `tui` feature.

#[cfg(feature = "tui")]
pub mod console;

use std::io;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

#[cfg(feature = "tui")]
pub use console::ConsoleReader;

/// Mask character used for secret input
pub const SECRET_MASK: char = '*';

/// Errors raised while prompting
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Input closed before a value was entered for '{label}'")]
    Interrupted { label: String },

    #[error("Failed to read input")]
    Io(#[from] io::Error),
}

/// Line input capability used by the prompts
pub trait LineReader {
    /// Read one line; `None` means the input was closed or interrupted
    fn read_line(&mut self, prompt: &str, mask: Option<char>) -> io::Result<Option<String>>;

    /// Print a line of output to the user
    fn print_line(&mut self, line: &str) -> io::Result<()>;

    /// Offer `choices` as completions for subsequent reads
    fn set_completions(&mut self, choices: &[String]);

    /// Remove any registered completions
    fn clear_completions(&mut self);
}

/// Keeps completions registered until dropped
struct CompletionScope<'a, R: LineReader + ?Sized> {
    reader: &'a mut R,
}

impl<'a, R: LineReader + ?Sized> CompletionScope<'a, R> {
    fn new(reader: &'a mut R, choices: &[String]) -> Self {
        reader.set_completions(choices);
        Self { reader }
    }
}

impl<R: LineReader + ?Sized> Deref for CompletionScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.reader
    }
}

impl<R: LineReader + ?Sized> DerefMut for CompletionScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.reader
    }
}

impl<R: LineReader + ?Sized> Drop for CompletionScope<'_, R> {
    fn drop(&mut self) {
        self.reader.clear_completions();
    }
}

/// Read until a non-blank line is entered
fn read_non_blank<R: LineReader + ?Sized>(
    reader: &mut R,
    label: &str,
    mask: Option<char>,
) -> Result<String, PromptError> {
    let prompt = format!("{}: ", label);
    loop {
        let Some(value) = reader.read_line(&prompt, mask)? else {
            return Err(PromptError::Interrupted {
                label: label.to_string(),
            });
        };

        // Do not log values read when masked
        if mask.is_none() {
            log::debug!("Read value: '{}'", value);
        } else {
            log::debug!("Read masked chars: {}", value.chars().count());
        }

        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
}

/// Resolve raw input against the choice list: an in-range index selects that
/// entry, anything else must match an entry literally
fn resolve_choice(input: &str, choices: &[String]) -> Option<String> {
    let candidate = input
        .parse::<usize>()
        .ok()
        .and_then(|i| choices.get(i))
        .cloned()
        .unwrap_or_else(|| input.to_string());
    choices.contains(&candidate).then_some(candidate)
}

/// Prompts over a line reader
pub struct PromptSession<R> {
    reader: R,
}

impl<R: LineReader> PromptSession<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Prompt until a non-blank value is entered; the value is trimmed
    pub fn prompt_required(&mut self, label: &str) -> Result<String, PromptError> {
        read_non_blank(&mut self.reader, label, None).map(|v| v.trim().to_string())
    }

    /// Prompt once; blank input yields `default` unchanged
    pub fn prompt_with_default(&mut self, label: &str, default: &str) -> Result<String, PromptError> {
        let prompt = format!("{} [{}]: ", label, default);
        let value = self.reader.read_line(&prompt, None)?.unwrap_or_default();
        log::debug!("Read value: '{}'", value);

        if value.trim().is_empty() {
            Ok(default.to_string())
        } else {
            Ok(value.trim().to_string())
        }
    }

    /// Prompt for a secret without echoing it; the value is returned as typed
    pub fn prompt_masked(&mut self, label: &str) -> Result<String, PromptError> {
        read_non_blank(&mut self.reader, label, Some(SECRET_MASK))
    }

    /// Show a numbered list and prompt until a valid choice is made
    ///
    /// Input may be a zero-based index or the literal value of a choice.
    pub fn prompt_choice(
        &mut self,
        header: &str,
        label: &str,
        choices: &[String],
    ) -> Result<String, PromptError> {
        self.reader.print_line(&format!("{}:", header))?;
        for (i, choice) in choices.iter().enumerate() {
            self.reader.print_line(&format!("  {:>2}) {}", i, choice))?;
        }

        let mut scope = CompletionScope::new(&mut self.reader, choices);
        loop {
            let input = read_non_blank(&mut *scope, label, None)?;
            if let Some(choice) = resolve_choice(input.trim(), choices) {
                return Ok(choice);
            }
            scope.print_line("Invalid selection")?;
        }
    }
}
