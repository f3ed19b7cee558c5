//! Line-oriented terminal interaction.
//!
//! Every prompt in the workflow goes through [`Terminal`], which wraps an
//! input reader and an output writer. Production code uses stdin/stdout via
//! [`Terminal::stdio`]; tests drive the same code with a `Cursor` of scripted
//! answers and a `Vec<u8>` that captures everything printed.

use crate::error::{WorkflowError, WorkflowResult};
use std::fmt::Display;
use std::io::{self, BufRead, Stdout, StdinLock, Write};
use tracing::debug;

const QUIT_TOKENS: [&str; 3] = ["q", "quit", "exit"];

/// Returns true if `input` is one of the quit tokens accepted at every prompt.
pub fn is_quit_token(input: &str) -> bool {
    let input = input.trim();
    QUIT_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(input))
}

/// Parsed answer to a numbered-list prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListInput {
    Quit,
    Choice {
        /// Zero-based entry, `None` when the input named no valid entry.
        index: Option<usize>,
        /// `r` modifier: reuse this choice automatically from now on.
        remember: bool,
        /// `s` modifier: stop showing this prompt.
        skip: bool,
    },
}

/// Parses `[number][r][s]` against a list of `len` entries.
///
/// Out-of-range or missing numbers leave `index` empty so the caller falls
/// back to its default. Unknown trailing characters are ignored.
pub fn parse_list_input(input: &str, len: usize) -> ListInput {
    let input = input.trim().to_ascii_lowercase();
    if is_quit_token(&input) {
        return ListInput::Quit;
    }

    let digits: String = input.chars().take_while(|c| c.is_ascii_digit()).collect();
    let modifiers = &input[digits.len()..];

    let index = digits
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1);

    ListInput::Choice {
        index,
        remember: modifiers.contains('r'),
        skip: modifiers.contains('s'),
    }
}

/// Resolved answer to a numbered-list prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSelection {
    pub index: usize,
    pub remember: bool,
    pub skip: bool,
}

/// One entry of a keyed menu such as `[r] Retry`.
#[derive(Debug, Clone, Copy)]
pub struct MenuEntry<T> {
    pub key: &'static str,
    pub label: &'static str,
    pub value: T,
}

impl<T> MenuEntry<T> {
    pub const fn new(key: &'static str, label: &'static str, value: T) -> Self {
        Self { key, label, value }
    }
}

pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl Terminal<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Writes one line of output.
    pub fn say(&mut self, text: impl Display) -> io::Result<()> {
        writeln!(self.output, "{}", text)
    }

    /// Shows `question` and reads one trimmed line.
    ///
    /// End of input is reported as [`WorkflowError::UserQuit`]: there is
    /// nobody left to answer.
    pub fn ask(&mut self, question: &str) -> WorkflowResult<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            debug!("Input closed while waiting for an answer");
            writeln!(self.output)?;
            return Err(WorkflowError::UserQuit);
        }
        Ok(line.trim().to_string())
    }

    /// Reads a free-text answer. A quit token ends the session instead of
    /// being taken as text.
    pub fn ask_text(&mut self, question: &str) -> WorkflowResult<String> {
        let answer = self.ask(question)?;
        if is_quit_token(&answer) {
            return Err(WorkflowError::UserQuit);
        }
        Ok(answer)
    }

    /// Like [`Self::ask_text`], returning `default` when the answer is empty.
    pub fn ask_text_or(&mut self, question: &str, default: &str) -> WorkflowResult<String> {
        let answer = self.ask_text(question)?;
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    /// Shows a keyed menu and loops until a listed key (or the default on an
    /// empty answer) is entered. A quit token that is not itself a menu key
    /// ends the session.
    pub fn menu<T: Copy>(
        &mut self,
        title: &str,
        entries: &[MenuEntry<T>],
        default: Option<&'static str>,
    ) -> WorkflowResult<T> {
        self.say(title)?;
        for entry in entries {
            let marker = if default == Some(entry.key) { " (default)" } else { "" };
            self.say(format_args!("  [{}] {}{}", entry.key, entry.label, marker))?;
        }

        let keys: Vec<&str> = entries.iter().map(|e| e.key).collect();
        loop {
            let answer = self.ask(&format!("Choose ({}): ", keys.join("/")))?;
            let answer = match (answer.is_empty(), default) {
                (true, Some(key)) => key.to_string(),
                _ => answer,
            };

            if let Some(entry) = entries.iter().find(|e| e.key.eq_ignore_ascii_case(&answer)) {
                return Ok(entry.value);
            }
            if is_quit_token(&answer) {
                return Err(WorkflowError::UserQuit);
            }
            self.say(format_args!("Invalid choice. Please enter one of: {}.", keys.join(", ")))?;
        }
    }

    /// Shows a numbered list and reads a `[number][r][s]` answer.
    pub fn select_from_list(
        &mut self,
        title: &str,
        labels: &[String],
        default: usize,
    ) -> WorkflowResult<ListSelection> {
        self.say(title)?;
        for (i, label) in labels.iter().enumerate() {
            let marker = if i == default { " (default)" } else { "" };
            self.say(format_args!("  {}. {}{}", i + 1, label, marker))?;
        }
        self.say("  Add 'r' to reuse this choice automatically, 's' to skip this prompt next time, 'q' to quit.")?;

        let answer = self.ask(&format!("Select [1-{}]: ", labels.len()))?;
        match parse_list_input(&answer, labels.len()) {
            ListInput::Quit => Err(WorkflowError::UserQuit),
            ListInput::Choice { index, remember, skip } => Ok(ListSelection {
                index: index.unwrap_or(default),
                remember,
                skip,
            }),
        }
    }
}
