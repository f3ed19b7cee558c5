//! Backend and model selection.
//!
//! Combines persisted preferences, the local backend's live model list and
//! interactive prompts. Every prompt here uses the numbered-list grammar of
//! [`Terminal::select_from_list`]: `r` turns on automatic reuse of the last
//! choice, `s` hides the prompt from now on.

use crate::backends::{BackendClient, BackendKind, BackendSelection, LocalModel};
use crate::config::{CustomModel, PreferenceStore};
use crate::error::{WorkflowError, WorkflowResult};
use crate::http_client::HttpClient;
use crate::terminal::{ListSelection, MenuEntry, Terminal};
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::{info, warn};

/// Extra attempts at listing local models before asking the user.
pub const LOCAL_RETRIES: u32 = 2;
const LOCAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const CUSTOM_MODEL_ENTRY: &str = "Enter a custom model id...";

/// Why selection is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Start of a generation: saved preferences may skip prompts.
    Startup,
    /// The user asked to switch after a failure: always prompt.
    Switch,
}

#[derive(Debug, Clone, Copy)]
enum Prompted {
    Backend,
    Model,
}

#[derive(Debug, Clone, Copy)]
enum Unreachable {
    Retry,
    UseCloud,
    Quit,
}

pub struct BackendSelector<'a, C> {
    backends: &'a BackendClient<C>,
    retry_delay: Duration,
}

impl<'a, C: HttpClient> BackendSelector<'a, C> {
    pub fn new(backends: &'a BackendClient<C>) -> Self {
        Self {
            backends,
            retry_delay: LOCAL_RETRY_DELAY,
        }
    }

    /// Overrides the pause between local backend retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Resolves the backend and model to generate with, persisting the result
    /// as the new "last used" choice.
    pub async fn select<R: BufRead, W: Write>(
        &self,
        store: &mut PreferenceStore,
        mode: SelectionMode,
        term: &mut Terminal<R, W>,
    ) -> WorkflowResult<BackendSelection> {
        let forced = mode == SelectionMode::Switch;
        let kind = resolve_kind(store, forced, term)?;

        let selection = match kind {
            BackendKind::Local => self.resolve_local(store, forced, term).await?,
            BackendKind::Cloud => resolve_cloud(store, forced, term)?,
        };

        store.remember_selection(selection.kind, &selection.model)?;
        info!("Selected {} backend with model {}", selection.kind, selection.model);
        Ok(selection)
    }

    async fn resolve_local<R: BufRead, W: Write>(
        &self,
        store: &mut PreferenceStore,
        forced: bool,
        term: &mut Terminal<R, W>,
    ) -> WorkflowResult<BackendSelection> {
        loop {
            let err = match self.list_local_models_with_retry(term).await {
                Ok(models) => return pick_local_model(store, &models, forced, term),
                Err(err) => err,
            };

            term.say(format_args!("❌ {}", err))?;
            let choice = term.menu(
                "The local backend is not available. What would you like to do?",
                &[
                    MenuEntry::new("r", "Retry", Unreachable::Retry),
                    MenuEntry::new("c", "Switch to the cloud backend", Unreachable::UseCloud),
                    MenuEntry::new("q", "Quit", Unreachable::Quit),
                ],
                Some("r"),
            )?;
            match choice {
                Unreachable::Retry => continue,
                Unreachable::UseCloud => return resolve_cloud(store, forced, term),
                Unreachable::Quit => return Err(WorkflowError::UserQuit),
            }
        }
    }

    /// Lists local models, retrying connection failures with a fixed pause.
    async fn list_local_models_with_retry<R: BufRead, W: Write>(
        &self,
        term: &mut Terminal<R, W>,
    ) -> WorkflowResult<Vec<LocalModel>> {
        let total = LOCAL_RETRIES + 1;
        let mut attempt = 1;
        loop {
            match self.backends.list_local_models().await {
                Ok(models) => return Ok(models),
                Err(err @ WorkflowError::BackendUnreachable { .. }) if attempt < total => {
                    warn!("Local backend unreachable (attempt {}/{}): {}", attempt, total, err);
                    attempt += 1;
                    term.say(format_args!(
                        "⏳ Local backend not reachable, retrying ({}/{})...",
                        attempt, total
                    ))?;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn resolve_kind<R: BufRead, W: Write>(
    store: &mut PreferenceStore,
    forced: bool,
    term: &mut Terminal<R, W>,
) -> WorkflowResult<BackendKind> {
    let prefs = store.prefs();
    if !forced {
        if prefs.auto_reuse_last && !prefs.skip_backend_prompt {
            if let Some(kind) = prefs.last_backend {
                info!("Reusing last backend: {}", kind);
                return Ok(kind);
            }
        }
        if prefs.skip_backend_prompt {
            return Ok(prefs.last_backend.unwrap_or(BackendKind::Cloud));
        }
    }

    let default_kind = prefs.last_backend.unwrap_or(BackendKind::Cloud);
    let default = BackendKind::ALL
        .iter()
        .position(|k| *k == default_kind)
        .unwrap_or(0);
    let labels: Vec<String> = BackendKind::ALL.iter().map(|k| k.label().to_string()).collect();

    let selection = term.select_from_list("\nChoose a generation backend:", &labels, default)?;
    apply_modifiers(store, selection, Prompted::Backend, term)?;
    Ok(BackendKind::ALL[selection.index])
}

/// Whether a saved model may be used without prompting.
fn reuse_saved_model(store: &PreferenceStore, forced: bool) -> bool {
    let prefs = store.prefs();
    !forced && (prefs.auto_reuse_last || prefs.skip_model_prompt)
}

fn pick_local_model<R: BufRead, W: Write>(
    store: &mut PreferenceStore,
    models: &[LocalModel],
    forced: bool,
    term: &mut Terminal<R, W>,
) -> WorkflowResult<BackendSelection> {
    if models.is_empty() {
        term.say("📭 The local backend is running but has no models installed.")?;
        return Err(WorkflowError::NoLocalModels);
    }

    let last = store.prefs().last_model(BackendKind::Local).map(str::to_string);
    let last_index = last
        .as_deref()
        .and_then(|name| models.iter().position(|m| m.name == name));

    if let (Some(idx), true) = (last_index, reuse_saved_model(store, forced)) {
        info!("Reusing last local model: {}", models[idx].name);
        return Ok(BackendSelection::new(BackendKind::Local, &models[idx].name));
    }

    let labels: Vec<String> = models.iter().map(LocalModel::label).collect();
    let selection = term.select_from_list("\nChoose a local model:", &labels, last_index.unwrap_or(0))?;
    apply_modifiers(store, selection, Prompted::Model, term)?;
    Ok(BackendSelection::new(BackendKind::Local, &models[selection.index].name))
}

fn resolve_cloud<R: BufRead, W: Write>(
    store: &mut PreferenceStore,
    forced: bool,
    term: &mut Terminal<R, W>,
) -> WorkflowResult<BackendSelection> {
    let models = store.prefs().custom_models.clone();
    let last_index = store
        .prefs()
        .last_model(BackendKind::Cloud)
        .and_then(|id| models.iter().position(|m| m.id == id));

    if let (Some(idx), true) = (last_index, reuse_saved_model(store, forced)) {
        info!("Reusing last cloud model: {}", models[idx].id);
        return Ok(BackendSelection::new(BackendKind::Cloud, &models[idx].id));
    }

    let mut labels: Vec<String> = models
        .iter()
        .map(|m| {
            if m.name.is_empty() || m.name == m.id {
                m.id.clone()
            } else {
                format!("{} ({})", m.name, m.id)
            }
        })
        .collect();
    labels.push(CUSTOM_MODEL_ENTRY.to_string());

    let selection = term.select_from_list("\nChoose a cloud model:", &labels, last_index.unwrap_or(0))?;
    apply_modifiers(store, selection, Prompted::Model, term)?;

    let model = match models.get(selection.index) {
        Some(model) => model.id.clone(),
        None => ask_custom_model(store, term)?,
    };
    Ok(BackendSelection::new(BackendKind::Cloud, &model))
}

/// Prompts for a free-text model id and display name and saves new ids.
fn ask_custom_model<R: BufRead, W: Write>(
    store: &mut PreferenceStore,
    term: &mut Terminal<R, W>,
) -> WorkflowResult<String> {
    let id = loop {
        let id = term.ask_text("Model id: ")?;
        if !id.is_empty() {
            break id;
        }
        term.say("The model id cannot be empty.")?;
    };
    let name = term.ask_text_or(&format!("Display name [{}]: ", id), &id)?;

    if store.add_custom_model(CustomModel::new(&id, &name))? {
        term.say(format_args!("✅ Saved custom model {}", id))?;
    }
    Ok(id)
}

fn apply_modifiers<R: BufRead, W: Write>(
    store: &mut PreferenceStore,
    selection: ListSelection,
    prompted: Prompted,
    term: &mut Terminal<R, W>,
) -> WorkflowResult<()> {
    if selection.remember {
        store.set_auto_reuse_last(true)?;
        term.say("✓ Your last choice will be reused automatically (run with --reset-config to undo).")?;
    }
    if selection.skip {
        match prompted {
            Prompted::Backend => store.set_skip_backend_prompt(true)?,
            Prompted::Model => store.set_skip_model_prompt(true)?,
        }
        term.say("✓ This prompt will be skipped next time (run with --reset-config to undo).")?;
    }
    Ok(())
}
