//! Terminal line reader
//!
//! Plain input goes through rustyline so choice prompts get tab completion;
//! masked input uses a cliclack password prompt.

use super::LineReader;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Context, Editor, Helper};
use std::io;

/// Completes the current line against a list of choices
#[derive(Debug, Default)]
struct ChoiceHelper {
    choices: Vec<String>,
}

impl Completer for ChoiceHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = &line[..pos];
        let matches = self
            .choices
            .iter()
            .filter(|choice| choice.starts_with(prefix))
            .cloned()
            .collect();
        Ok((0, matches))
    }
}

impl Hinter for ChoiceHelper {
    type Hint = String;
}

impl Highlighter for ChoiceHelper {}

impl Validator for ChoiceHelper {}

impl Helper for ChoiceHelper {}

/// Reads from the controlling terminal
pub struct ConsoleReader {
    editor: Editor<ChoiceHelper, DefaultHistory>,
}

impl ConsoleReader {
    pub fn new() -> io::Result<Self> {
        // History is meaningless for one-shot prompts
        let config = Config::builder().auto_add_history(false).build();
        let mut editor = Editor::with_config(config).map_err(io::Error::other)?;
        editor.set_helper(Some(ChoiceHelper::default()));
        Ok(Self { editor })
    }

    fn read_masked(&mut self, prompt: &str, mask: char) -> io::Result<Option<String>> {
        let label = prompt.trim_end().trim_end_matches(':');
        match cliclack::password(label).mask(mask).interact() {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl LineReader for ConsoleReader {
    fn read_line(&mut self, prompt: &str, mask: Option<char>) -> io::Result<Option<String>> {
        if let Some(mask) = mask {
            return self.read_masked(prompt, mask);
        }

        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    fn print_line(&mut self, line: &str) -> io::Result<()> {
        println!("{}", line);
        Ok(())
    }

    fn set_completions(&mut self, choices: &[String]) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.choices = choices.to_vec();
        }
    }

    fn clear_completions(&mut self) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.choices.clear();
        }
    }
}
