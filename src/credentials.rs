//! Resolution of the cloud backend API key.
//!
//! Lookup order: the `DEEPSEEK_API_KEY` environment variable, then the
//! secret file in the per-user config directory, then an interactive prompt
//! whose answer is written back to the secret file. The key is never logged.

use crate::config::PreferenceStore;
use crate::error::{WorkflowError, WorkflowResult};
use crate::terminal::Terminal;
use anyhow::Result;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
const SECRET_FILE: &str = "api_key";

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    SecretFile,
    Prompt,
}

impl CredentialSource {
    pub fn describe(self) -> &'static str {
        match self {
            CredentialSource::Environment => "Set (environment)",
            CredentialSource::SecretFile => "Set (secret file)",
            CredentialSource::Prompt => "Set (entered interactively)",
        }
    }
}

pub struct CredentialStore {
    secret_path: PathBuf,
    env_value: Option<String>,
}

impl CredentialStore {
    /// Uses the default secret file and the process environment.
    pub fn from_env() -> Result<Self> {
        let secret_path = PreferenceStore::get_config_dir()?.join(SECRET_FILE);
        Ok(Self::new(secret_path, std::env::var(API_KEY_ENV).ok()))
    }

    pub fn new(secret_path: impl Into<PathBuf>, env_value: Option<String>) -> Self {
        Self {
            secret_path: secret_path.into(),
            env_value: env_value.filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn secret_path(&self) -> &Path {
        &self.secret_path
    }

    /// Looks the key up without prompting.
    pub fn lookup(&self) -> Option<(String, CredentialSource)> {
        if let Some(value) = &self.env_value {
            return Some((value.trim().to_string(), CredentialSource::Environment));
        }
        match fs::read_to_string(&self.secret_path) {
            Ok(content) if !content.trim().is_empty() => {
                Some((content.trim().to_string(), CredentialSource::SecretFile))
            }
            Ok(_) => None,
            Err(e) => {
                if self.secret_path.exists() {
                    warn!("Could not read secret file {}: {}", self.secret_path.display(), e);
                }
                None
            }
        }
    }

    /// Returns the key and where it came from, prompting for it (and saving
    /// it) when none is stored.
    pub fn resolve<R: BufRead, W: Write>(
        &self,
        term: &mut Terminal<R, W>,
    ) -> WorkflowResult<(String, CredentialSource)> {
        if let Some(found) = self.lookup() {
            return Ok(found);
        }

        term.say(format_args!(
            "No DeepSeek API key found. Set {} or enter one now (saved to {}).",
            API_KEY_ENV,
            self.secret_path.display()
        ))?;
        loop {
            let key = term.ask("API key: ")?;
            if key.is_empty() {
                term.say("The API key cannot be empty.")?;
                continue;
            }
            if crate::terminal::is_quit_token(&key) {
                return Err(WorkflowError::UserQuit);
            }
            self.store(&key)?;
            term.say("✅ API key saved")?;
            return Ok((key, CredentialSource::Prompt));
        }
    }

    /// Writes the key to the secret file, creating the config directory.
    pub fn store(&self, key: &str) -> Result<()> {
        if let Some(parent) = self.secret_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.secret_path, format!("{}\n", key.trim()))?;
        restrict_permissions(&self.secret_path);
        info!("Saved API key to: {}", self.secret_path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("Could not restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
