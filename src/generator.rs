//! Commit message generation with interactive failure recovery.

use crate::backends::{BackendClient, BackendSelection};
use crate::error::{WorkflowError, WorkflowResult};
use crate::http_client::HttpClient;
use crate::terminal::{MenuEntry, Terminal};
use regex::Regex;
use std::io::{BufRead, Write};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Diffs longer than this still go out, but the user is warned first.
pub const LARGE_DIFF_CHARS: usize = 50_000;
pub const FALLBACK_MESSAGE: &str = "chore: update files";

const INSTRUCTIONS: &str = "You are an experienced software engineer writing a git commit message for the staged changes below.

Rules:
- First line: `type(scope): summary` using a Conventional Commits type (feat, fix, docs, style, refactor, perf, test, build, ci, chore, revert). The scope is optional. Write the summary in the imperative mood, at most 72 characters, without a trailing period.
- Leave one blank line after the first line.
- Then write 2 to 5 bullet points, each starting with \"- \" and an action verb (Add, Fix, Remove, Update, Rename, Refactor, ...), each describing one concrete change.
- Explain what changed and why, not how the diff is laid out.
- Reply with the commit message only: no code fences, no introduction, no closing remarks.";

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[\w+-]*[ \t]*(?:\r?\n|$)").expect("Failed to compile opening fence regex"));

static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\n)```[ \t]*$").expect("Failed to compile closing fence regex"));

static LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:sure[,!.]?\s*)?(?:here(?:'s| is) (?:the|a|your) (?:suggested |generated |proposed )?commit message(?: for (?:the|these|this) (?:staged )?(?:changes|diff))?|commit message)\s*:\s*",
    )
    .expect("Failed to compile lead-in regex")
});

/// Builds the full prompt: fixed instructions followed by the annotated diff.
pub fn build_prompt(diff: &str) -> String {
    format!(
        "{}\n\nDiff ({} characters):\n{}",
        INSTRUCTIONS,
        diff.chars().count(),
        diff
    )
}

/// Strips code fences and boilerplate lead-ins from a raw completion.
///
/// Applying it to its own output changes nothing.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    loop {
        let mut next = OPENING_FENCE.replace(&text, "").to_string();
        next = CLOSING_FENCE.replace(&next, "").trim().to_string();
        next = LEAD_IN.replace(&next, "").trim().to_string();
        if next == text {
            return text;
        }
        text = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Retry,
    Switch,
    Manual,
    Quit,
}

pub struct MessageGenerator<'a, C> {
    backends: &'a BackendClient<C>,
}

impl<'a, C: HttpClient> MessageGenerator<'a, C> {
    pub fn new(backends: &'a BackendClient<C>) -> Self {
        Self { backends }
    }

    /// Generates a commit message for `diff`, looping through the recovery
    /// menu until a message exists or the user leaves.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::BlankDiff`] for an empty diff (nothing is sent)
    /// - [`WorkflowError::SwitchRequested`] when the user wants another
    ///   backend or model; the caller re-runs selection and calls again
    /// - [`WorkflowError::UserQuit`] when the user quits from the menu
    pub async fn generate<R: BufRead, W: Write>(
        &self,
        diff: &str,
        credential: Option<&str>,
        selection: &BackendSelection,
        term: &mut Terminal<R, W>,
    ) -> WorkflowResult<String> {
        if diff.trim().is_empty() {
            return Err(WorkflowError::BlankDiff);
        }

        let size = diff.chars().count();
        if size > LARGE_DIFF_CHARS {
            warn!("Large diff: {} chars", size);
            term.say(format_args!(
                "⚠️  The diff is {} characters long (over {}). Generation may be slow or truncated.",
                size, LARGE_DIFF_CHARS
            ))?;
        }
        let prompt = build_prompt(diff);

        loop {
            term.say(format_args!(
                "\n🤖 Generating commit message with {} ({})...",
                selection.model,
                selection.kind.label()
            ))?;

            let err = match self.attempt(&prompt, credential, selection).await {
                Ok(message) => return Ok(message),
                Err(err) => err,
            };

            warn!("Generation failed: {}", err);
            term.say(format_args!("❌ {}", err))?;

            match self.recovery_menu(&err, term)? {
                Recovery::Retry => {
                    info!("Retrying generation");
                    continue;
                }
                Recovery::Switch => return Err(WorkflowError::SwitchRequested),
                Recovery::Manual => return manual_entry(term),
                Recovery::Quit => return Err(WorkflowError::UserQuit),
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        credential: Option<&str>,
        selection: &BackendSelection,
    ) -> WorkflowResult<String> {
        let raw = self.backends.complete(selection, credential, prompt).await?;
        let message = normalize(&raw);
        if message.is_empty() {
            return Err(WorkflowError::EmptyGeneration);
        }
        info!("Generated message ({} chars)", message.len());
        Ok(message)
    }

    fn recovery_menu<R: BufRead, W: Write>(
        &self,
        err: &WorkflowError,
        term: &mut Terminal<R, W>,
    ) -> WorkflowResult<Recovery> {
        let mut entries = vec![MenuEntry::new("r", "Retry", Recovery::Retry)];
        if err.allows_switch() {
            entries.push(MenuEntry::new("s", "Switch backend or model", Recovery::Switch));
        }
        entries.push(MenuEntry::new("m", "Enter the message manually", Recovery::Manual));
        entries.push(MenuEntry::new("q", "Quit", Recovery::Quit));

        term.menu("How would you like to continue?", &entries, Some("r"))
    }
}

fn manual_entry<R: BufRead, W: Write>(term: &mut Terminal<R, W>) -> WorkflowResult<String> {
    let message = term.ask_text_or(
        &format!("Commit message [{}]: ", FALLBACK_MESSAGE),
        FALLBACK_MESSAGE,
    )?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendKind, Endpoints};
    use crate::error::TransportError;
    use crate::http_client::test_support::MockHttpClient;
    use crate::http_client::HttpResponse;
    use crate::terminal::test_support::{printed, scripted};

    const DIFF: &str = "+fn added() {}\n";

    fn cloud_reply(content: &str) -> Result<HttpResponse, TransportError> {
        let body = serde_json::json!({"choices": [{"message": {"content": content}}]});
        MockHttpClient::ok(200, &body.to_string())
    }

    fn backends(outcomes: Vec<Result<HttpResponse, TransportError>>) -> BackendClient<MockHttpClient> {
        BackendClient::new(MockHttpClient::new(outcomes), Endpoints::default())
    }

    fn cloud() -> BackendSelection {
        BackendSelection::new(BackendKind::Cloud, "deepseek-chat")
    }

    #[test]
    fn test_build_prompt_annotates_diff_length() {
        let prompt = build_prompt("abc\n");
        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.ends_with("Diff (4 characters):\nabc\n"));
    }

    #[test]
    fn test_normalize_strips_fences_and_lead_ins() {
        assert_eq!(normalize("```\nfeat: x\n```"), "feat: x");
        assert_eq!(normalize("```markdown\nfeat: x\n- add y\n```\n"), "feat: x\n- add y");
        assert_eq!(normalize("```diff\nfix: z\n```"), "fix: z");
        assert_eq!(normalize("Here is the commit message:\n\nfeat: x"), "feat: x");
        assert_eq!(normalize("Commit message: fix(api): handle 429"), "fix(api): handle 429");
        assert_eq!(
            normalize("Here's the commit message:\n```\nfeat: x\n```"),
            "feat: x"
        );
    }

    #[test]
    fn test_normalize_leaves_plain_messages_alone() {
        let message = "feat(ui): add dark mode\n\n- Add theme toggle\n- Persist choice";
        assert_eq!(normalize(message), message);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "```markdown\nCommit message: feat: x\n```",
            "  Here is your commit message:  ```\nfix: y\n```  ",
            "```\n```",
            "refactor: z\n\n- Rename a\n- Move b",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "sample: {:?}", sample);
        }
    }

    #[tokio::test]
    async fn test_generate_returns_normalized_message() {
        let backends = backends(vec![cloud_reply("```\nfeat: add added\n\n- Add added fn\n```")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&[]);

        let message = generator.generate(DIFF, Some("k"), &cloud(), &mut term).await.unwrap();
        assert_eq!(message, "feat: add added\n\n- Add added fn");
    }

    #[tokio::test]
    async fn test_blank_diff_is_rejected_without_request() {
        let backends = backends(vec![]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&[]);

        let err = generator.generate(" \n", Some("k"), &cloud(), &mut term).await.unwrap_err();
        assert!(matches!(err, WorkflowError::BlankDiff));
        assert_eq!(backends.http().request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_generation_offers_menu_without_switch() {
        let backends = backends(vec![cloud_reply("```\n```"), cloud_reply("fix: second try")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&["r"]);

        let message = generator.generate(DIFF, Some("k"), &cloud(), &mut term).await.unwrap();
        assert_eq!(message, "fix: second try");

        let out = printed(&term);
        assert!(out.contains("empty commit message"));
        assert!(out.contains("[r] Retry"));
        assert!(out.contains("[m] Enter the message manually"));
        assert!(out.contains("[q] Quit"));
        assert!(!out.contains("[s] Switch"));
    }

    #[tokio::test]
    async fn test_rate_limit_offers_switch() {
        let backends = backends(vec![MockHttpClient::ok(429, "slow down")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&["s"]);

        let err = generator.generate(DIFF, Some("k"), &cloud(), &mut term).await.unwrap_err();
        assert!(matches!(err, WorkflowError::SwitchRequested));
        assert!(printed(&term).contains("[s] Switch backend or model"));
    }

    #[tokio::test]
    async fn test_local_failure_has_no_switch_option() {
        let backends = backends(vec![Err(TransportError::ConnectionRefused)]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&["s", "q"]);
        let local = BackendSelection::new(BackendKind::Local, "llama3");

        let err = generator.generate(DIFF, None, &local, &mut term).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UserQuit));
        assert!(printed(&term).contains("Invalid choice"));
    }

    #[tokio::test]
    async fn test_manual_entry_with_fallback() {
        let backends = backends(vec![MockHttpClient::ok(402, "")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&["m", ""]);

        let message = generator.generate(DIFF, Some("k"), &cloud(), &mut term).await.unwrap();
        assert_eq!(message, FALLBACK_MESSAGE);
        assert!(printed(&term).contains("Insufficient account balance"));
    }

    #[tokio::test]
    async fn test_manual_entry_with_text() {
        let backends = backends(vec![cloud_reply("")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&["m", "docs: write it myself"]);

        let message = generator.generate(DIFF, Some("k"), &cloud(), &mut term).await.unwrap();
        assert_eq!(message, "docs: write it myself");
    }

    #[tokio::test]
    async fn test_quit_token_at_manual_entry_quits() {
        let backends = backends(vec![MockHttpClient::ok(500, "boom")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&["m", "q"]);

        let result = generator.generate(DIFF, Some("k"), &cloud(), &mut term).await;
        assert!(matches!(result, Err(WorkflowError::UserQuit)));
    }

    #[tokio::test]
    async fn test_large_diff_warns_but_still_generates() {
        let diff = format!("+{}\n", "x".repeat(LARGE_DIFF_CHARS + 1));
        let backends = backends(vec![cloud_reply("chore: big change")]);
        let generator = MessageGenerator::new(&backends);
        let mut term = scripted(&[]);

        let message = generator.generate(&diff, Some("k"), &cloud(), &mut term).await.unwrap();
        assert_eq!(message, "chore: big change");
        assert!(printed(&term).contains("⚠️"));
    }
}
