//! The interactive session loop.
//!
//! One pass through [`Session::commit_cycle`] walks the states
//! `AcquireDiff → SelectBackend → Generate ⇄ SelectBackend → Review →
//! Commit`. [`Session::run`] repeats cycles until the user quits, turning
//! every recoverable error into a continue-or-quit prompt.

use crate::backends::{BackendClient, BackendKind, BackendSelection};
use crate::committer;
use crate::config::PreferenceStore;
use crate::credentials::CredentialStore;
use crate::diff_guard::acquire_validated_diff;
use crate::editor;
use crate::error::{WorkflowError, WorkflowResult};
use crate::generator::MessageGenerator;
use crate::http_client::HttpClient;
use crate::selector::{BackendSelector, SelectionMode};
use crate::terminal::{MenuEntry, Terminal};
use crate::vcs::Vcs;
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::{error, info};

enum State {
    AcquireDiff,
    SelectBackend { diff: String, mode: SelectionMode },
    Generate { diff: String, selection: BackendSelection },
    Review { message: String },
    Commit { message: String },
}

#[derive(Debug, Clone, Copy)]
enum ReviewChoice {
    Accept,
    Edit,
    Cancel,
    Quit,
}

#[derive(Debug, Clone, Copy)]
enum AfterFailure {
    Retry,
    Quit,
}

pub struct Session<'a, V: ?Sized, C, R, W> {
    vcs: &'a V,
    backends: &'a BackendClient<C>,
    store: PreferenceStore,
    credentials: CredentialStore,
    term: Terminal<R, W>,
    credential: Option<String>,
    retry_delay: Option<Duration>,
}

impl<'a, V, C, R, W> Session<'a, V, C, R, W>
where
    V: Vcs + ?Sized,
    C: HttpClient,
    R: BufRead,
    W: Write,
{
    pub fn new(
        vcs: &'a V,
        backends: &'a BackendClient<C>,
        store: PreferenceStore,
        credentials: CredentialStore,
        term: Terminal<R, W>,
    ) -> Self {
        Self {
            vcs,
            backends,
            store,
            credentials,
            term,
            credential: None,
            retry_delay: None,
        }
    }

    /// Overrides the pause between local backend retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    pub fn terminal(&self) -> &Terminal<R, W> {
        &self.term
    }

    /// Offers commits until the user quits.
    ///
    /// # Errors
    ///
    /// Only fatal errors (see [`WorkflowError::is_fatal`]) and terminal I/O
    /// failures are returned; quitting is `Ok(())`.
    pub async fn run(&mut self) -> WorkflowResult<()> {
        loop {
            let err = match self.commit_cycle().await {
                Ok(()) => continue,
                Err(err) => err,
            };

            match err {
                WorkflowError::UserQuit => break,
                WorkflowError::EmptyDiff => continue,
                err if err.is_fatal() => {
                    error!("Fatal: {}", err);
                    self.term.say(format_args!("❌ {}", err))?;
                    return Err(err);
                }
                WorkflowError::SensitiveDataDetected { .. } => {
                    if !self.continue_or_quit("Fix or unstage the flagged lines, then check again.")? {
                        break;
                    }
                }
                err => {
                    error!("Commit cycle failed: {}", err);
                    self.term.say(format_args!("❌ {}", err))?;
                    if !self.continue_or_quit("Something went wrong.")? {
                        break;
                    }
                }
            }
        }

        self.term.say("👋 Goodbye!")?;
        Ok(())
    }

    fn continue_or_quit(&mut self, title: &str) -> WorkflowResult<bool> {
        let choice = self.term.menu(
            title,
            &[
                MenuEntry::new("c", "Continue", true),
                MenuEntry::new("q", "Quit", false),
            ],
            Some("c"),
        );
        match choice {
            Ok(keep_going) => Ok(keep_going),
            Err(WorkflowError::UserQuit) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Runs one commit opportunity from diff acquisition to commit or cancel.
    pub async fn commit_cycle(&mut self) -> WorkflowResult<()> {
        let mut selector = BackendSelector::new(self.backends);
        if let Some(delay) = self.retry_delay {
            selector = selector.with_retry_delay(delay);
        }
        let generator = MessageGenerator::new(self.backends);

        let mut state = State::AcquireDiff;
        loop {
            state = match state {
                State::AcquireDiff => {
                    let diff = acquire_validated_diff(self.vcs, &mut self.term)?;
                    info!("Accepted staged diff ({} chars)", diff.len());
                    State::SelectBackend {
                        diff,
                        mode: SelectionMode::Startup,
                    }
                }
                State::SelectBackend { diff, mode } => {
                    let selection = selector.select(&mut self.store, mode, &mut self.term).await?;
                    State::Generate { diff, selection }
                }
                State::Generate { diff, selection } => {
                    let credential = match selection.kind {
                        BackendKind::Cloud => Some(self.cloud_credential()?),
                        BackendKind::Local => None,
                    };
                    match generator
                        .generate(&diff, credential.as_deref(), &selection, &mut self.term)
                        .await
                    {
                        Ok(message) => State::Review { message },
                        Err(WorkflowError::SwitchRequested) => {
                            info!("Switching backend after failure");
                            State::SelectBackend {
                                diff,
                                mode: SelectionMode::Switch,
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::Review { message } => match self.review(&message)? {
                    ReviewChoice::Accept => State::Commit { message },
                    ReviewChoice::Edit => {
                        let edited = editor::edit(&message, &mut self.term)?;
                        if edited.trim().is_empty() {
                            State::Review { message }
                        } else {
                            State::Commit { message: edited }
                        }
                    }
                    ReviewChoice::Cancel => {
                        self.term.say("🚫 Commit cancelled.")?;
                        return Ok(());
                    }
                    ReviewChoice::Quit => return Err(WorkflowError::UserQuit),
                },
                State::Commit { message } => match committer::commit(self.vcs, &message) {
                    Ok(()) => {
                        self.term.say("✅ Changes committed.")?;
                        return Ok(());
                    }
                    Err(err @ WorkflowError::CommitFailed(_)) => {
                        self.term.say(format_args!("❌ {}", err))?;
                        let choice = self.term.menu(
                            "The commit did not go through.",
                            &[
                                MenuEntry::new("r", "Retry the commit", AfterFailure::Retry),
                                MenuEntry::new("q", "Quit", AfterFailure::Quit),
                            ],
                            Some("r"),
                        )?;
                        match choice {
                            AfterFailure::Retry => State::Commit { message },
                            AfterFailure::Quit => return Err(WorkflowError::UserQuit),
                        }
                    }
                    Err(e) => return Err(e),
                },
            };
        }
    }

    fn review(&mut self, message: &str) -> WorkflowResult<ReviewChoice> {
        let rule = "─".repeat(50);
        self.term
            .say(format_args!("\n📝 Proposed commit message:\n{}\n{}\n{}", rule, message, rule))?;
        self.term.menu(
            "Commit with this message?",
            &[
                MenuEntry::new("a", "Accept and commit", ReviewChoice::Accept),
                MenuEntry::new("e", "Edit before committing", ReviewChoice::Edit),
                MenuEntry::new("c", "Cancel", ReviewChoice::Cancel),
                MenuEntry::new("q", "Quit", ReviewChoice::Quit),
            ],
            Some("a"),
        )
    }

    fn cloud_credential(&mut self) -> WorkflowResult<String> {
        if let Some(key) = &self.credential {
            return Ok(key.clone());
        }
        let (key, source) = self.credentials.resolve(&mut self.term)?;
        info!("Using API key: {}", source.describe());
        self.credential = Some(key.clone());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Endpoints;
    use crate::error::TransportError;
    use crate::http_client::test_support::MockHttpClient;
    use crate::http_client::HttpResponse;
    use crate::terminal::test_support::{printed, scripted, ScriptedTerminal};
    use crate::vcs::test_support::MockVcs;
    use tempfile::TempDir;

    const DIFF: &str = "diff --git a/a.rs b/a.rs\n+++ b/a.rs\n+fn a() {}\n";

    fn cloud_reply(content: &str) -> Result<HttpResponse, TransportError> {
        let body = serde_json::json!({"choices": [{"message": {"content": content}}]});
        MockHttpClient::ok(200, &body.to_string())
    }

    struct Fixture {
        dir: TempDir,
        backends: BackendClient<MockHttpClient>,
    }

    impl Fixture {
        fn new(outcomes: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                backends: BackendClient::new(MockHttpClient::new(outcomes), Endpoints::default()),
            }
        }

        fn session<'a>(
            &'a self,
            vcs: &'a MockVcs,
            answers: &[&str],
        ) -> Session<'a, MockVcs, MockHttpClient, std::io::Cursor<Vec<u8>>, Vec<u8>> {
            let store = PreferenceStore::at(self.dir.path().join("preferences.toml"));
            let credentials = CredentialStore::new(self.dir.path().join("api_key"), Some("sk-test".to_string()));
            let term: ScriptedTerminal = scripted(answers);
            Session::new(vcs, &self.backends, store, credentials, term).with_retry_delay(Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_accept_commits_generated_message() {
        let fixture = Fixture::new(vec![cloud_reply("feat: add a\n\n- Add a")]);
        let vcs = MockVcs::new(&[DIFF], &[true]);
        let mut session = fixture.session(&vcs, &["", "", "a"]);

        session.commit_cycle().await.unwrap();

        let committed = vcs.committed.borrow();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].1, "feat: add a\n\n- Add a");
        assert!(printed(session.terminal()).contains("Changes committed"));
    }

    #[tokio::test]
    async fn test_sensitive_diff_never_reaches_backend() {
        let fixture = Fixture::new(vec![]);
        let vcs = MockVcs::new(&["+const password = \"Sup3rSecretValue1234\"\n"], &[]);
        let mut session = fixture.session(&vcs, &["q"]);

        session.run().await.unwrap();

        assert_eq!(fixture.backends.http().request_count(), 0);
        assert!(vcs.committed.borrow().is_empty());
        let out = printed(session.terminal());
        assert!(out.contains("Possible sensitive data"));
        assert!(out.contains("Goodbye"));
    }

    #[tokio::test]
    async fn test_switch_resumes_generation_without_reacquiring_diff() {
        let fixture = Fixture::new(vec![
            MockHttpClient::ok(429, "too many"),
            cloud_reply("fix: after switch"),
        ]);
        let vcs = MockVcs::new(&[DIFF, "+second diff\n"], &[true]);
        // backend, model, switch, backend, model (reasoner), accept
        let mut session = fixture.session(&vcs, &["", "", "s", "1", "2", "a"]);

        session.commit_cycle().await.unwrap();

        let committed = vcs.committed.borrow();
        assert_eq!(committed[0].1, "fix: after switch");
        assert_eq!(vcs.diffs.borrow().len(), 1);

        let requests = fixture.backends.http().requests.lock().unwrap();
        assert_eq!(requests[1].1.as_ref().unwrap()["model"], "deepseek-reasoner");
        assert_eq!(session.store().prefs().last_cloud_model.as_deref(), Some("deepseek-reasoner"));
    }

    #[tokio::test]
    async fn test_commit_failure_offers_retry_without_reacquiring() {
        let fixture = Fixture::new(vec![cloud_reply("chore: x")]);
        let vcs = MockVcs::new(&[DIFF], &[false, true]);
        let mut session = fixture.session(&vcs, &["", "", "a", "r"]);

        session.commit_cycle().await.unwrap();

        let committed = vcs.committed.borrow();
        assert_eq!(committed.len(), 2);
        assert!(committed.iter().all(|(path, _)| !path.exists()));
        assert_eq!(fixture.backends.http().request_count(), 1);
        let out = printed(session.terminal());
        assert!(out.contains("[r] Retry the commit"));
    }

    #[tokio::test]
    async fn test_cancel_returns_without_commit() {
        let fixture = Fixture::new(vec![cloud_reply("chore: x")]);
        let vcs = MockVcs::new(&[DIFF], &[]);
        let mut session = fixture.session(&vcs, &["", "", "c"]);

        session.commit_cycle().await.unwrap();
        assert!(vcs.committed.borrow().is_empty());
        assert!(printed(session.terminal()).contains("cancelled"));
    }

    #[tokio::test]
    async fn test_edit_then_commit() {
        let fixture = Fixture::new(vec![cloud_reply("feat(x): add thing\n- bullet one\n- bullet two")]);
        let vcs = MockVcs::new(&[DIFF], &[true]);
        let mut session = fixture.session(&vcs, &["", "", "e", "2", "fix(x): correct thing"]);

        session.commit_cycle().await.unwrap();
        assert_eq!(
            vcs.committed.borrow()[0].1,
            "fix(x): correct thing\n- bullet one\n- bullet two"
        );
    }

    #[tokio::test]
    async fn test_run_loops_until_quit() {
        let fixture = Fixture::new(vec![cloud_reply("feat: one"), cloud_reply("feat: two")]);
        let vcs = MockVcs::new(&[DIFF, "", DIFF], &[true, true]);
        let answers = ["", "", "a", "c", "", "", "a", "q"];
        let mut session = fixture.session(&vcs, &answers);

        session.run().await.unwrap();

        let committed = vcs.committed.borrow();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[1].1, "feat: two");
        assert!(printed(session.terminal()).contains("No staged changes"));
    }

    #[tokio::test]
    async fn test_invalid_response_quit_from_recovery_menu() {
        let fixture = Fixture::new(vec![MockHttpClient::ok(200, "not json")]);
        let vcs = MockVcs::new(&[DIFF], &[]);
        let mut session = fixture.session(&vcs, &["", "", "q"]);

        session.run().await.unwrap();
        let out = printed(session.terminal());
        assert!(out.contains("unexpected response"));
        assert!(!out.contains("[s] Switch"));
        assert!(vcs.committed.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_models_is_fatal_for_run() {
        let fixture = Fixture::new(vec![MockHttpClient::ok(200, r#"{"models":[]}"#)]);
        let vcs = MockVcs::new(&[DIFF], &[]);
        let mut session = fixture.session(&vcs, &["2"]);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoLocalModels));
    }

    #[tokio::test]
    async fn test_credential_is_resolved_once() {
        let fixture = Fixture::new(vec![cloud_reply(""), cloud_reply("feat: ok")]);
        let vcs = MockVcs::new(&[DIFF], &[true]);
        let mut session = fixture.session(&vcs, &["", "", "r", "a"]);

        session.commit_cycle().await.unwrap();
        assert_eq!(session.credential.as_deref(), Some("sk-test"));
    }
}
