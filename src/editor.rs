//! Structural edits to a generated message before it is committed.
//!
//! Answers are read one line at a time, so a literal `\n` typed by the user
//! stands for a line break.

use crate::error::WorkflowResult;
use crate::terminal::{MenuEntry, Terminal};
use std::io::{BufRead, Write};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditChoice {
    Whole,
    Title,
    Bullets,
    Keep,
}

fn is_bullet(line: &str) -> bool {
    let trimmed = line.trim_start();
    ["- ", "* ", "• "].iter().any(|marker| trimmed.starts_with(marker))
        || matches!(trimmed, "-" | "*" | "•")
}

fn unescape_newlines(input: &str) -> String {
    input.replace("\\n", "\n")
}

/// Index of the first bullet line, where the bullet region starts.
pub fn bullet_region_start(message: &str) -> Option<usize> {
    message.lines().position(is_bullet)
}

/// Replaces the first line, keeping every following line verbatim.
/// An empty `title` keeps the original.
pub fn replace_title(message: &str, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return message.to_string();
    }
    match message.split_once('\n') {
        Some((_, rest)) => format!("{}\n{}", title, rest),
        None => title.to_string(),
    }
}

/// Replaces everything from the first bullet line to the end, keeping what
/// comes before it. Without an existing bullet region the new bullets are
/// appended after a blank line. Empty `bullets` keeps the original.
pub fn replace_bullets(message: &str, bullets: &str) -> String {
    let bullets = bullets.trim();
    if bullets.is_empty() {
        return message.to_string();
    }
    let bullets: Vec<String> = bullets
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if is_bullet(line) {
                line.to_string()
            } else {
                format!("- {}", line)
            }
        })
        .collect();

    let lines: Vec<&str> = message.lines().collect();
    match bullet_region_start(message) {
        Some(start) => {
            let mut kept: Vec<String> = lines[..start].iter().map(|l| l.to_string()).collect();
            kept.extend(bullets);
            kept.join("\n")
        }
        None => format!("{}\n\n{}", message.trim_end(), bullets.join("\n")),
    }
}

/// Offers whole-message, title-only and bullet-only edits. Always returns a
/// usable message; empty answers keep what was there. A quit token at any
/// prompt ends the session.
pub fn edit<R: BufRead, W: Write>(message: &str, term: &mut Terminal<R, W>) -> WorkflowResult<String> {
    let choice = term.menu(
        "\n✏️  Edit the message:",
        &[
            MenuEntry::new("1", "Replace the entire message", EditChoice::Whole),
            MenuEntry::new("2", "Replace the title only", EditChoice::Title),
            MenuEntry::new("3", "Replace the bullet points only", EditChoice::Bullets),
            MenuEntry::new("4", "Use as-is", EditChoice::Keep),
        ],
        Some("4"),
    )?;

    let edited = match choice {
        EditChoice::Whole => {
            term.say(format_args!("Current message:\n{}", message))?;
            let answer = term.ask_text("New message (\\n for line breaks, empty keeps current): ")?;
            if answer.is_empty() {
                message.to_string()
            } else {
                unescape_newlines(&answer)
            }
        }
        EditChoice::Title => {
            let current = message.lines().next().unwrap_or("");
            let answer = term.ask_text_or(&format!("New title [{}]: ", current), current)?;
            replace_title(message, &answer)
        }
        EditChoice::Bullets => {
            if let Some(start) = bullet_region_start(message) {
                let current: Vec<&str> = message.lines().skip(start).collect();
                term.say(format_args!("Current bullet points:\n{}", current.join("\n")))?;
            }
            let answer = term.ask_text("New bullet points (\\n between points, empty keeps current): ")?;
            replace_bullets(message, &unescape_newlines(&answer))
        }
        EditChoice::Keep => message.to_string(),
    };

    if edited != message {
        info!("Message edited ({:?})", choice);
    }
    Ok(edited)
}
