use crate::backends::BackendKind;
use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_DIR_NAME: &str = ".diffscribe";
const PREFERENCES_FILE: &str = "preferences.toml";

/// A model id the user typed in for the cloud backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomModel {
    pub id: String,
    pub name: String,
}

impl CustomModel {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_custom_models")]
    pub custom_models: Vec<CustomModel>,
    #[serde(default)]
    pub last_backend: Option<BackendKind>,
    #[serde(default)]
    pub last_cloud_model: Option<String>,
    #[serde(default)]
    pub last_local_model: Option<String>,
    #[serde(default)]
    pub auto_reuse_last: bool,
    #[serde(default)]
    pub skip_backend_prompt: bool,
    #[serde(default)]
    pub skip_model_prompt: bool,
}

fn default_custom_models() -> Vec<CustomModel> {
    vec![
        CustomModel::new("deepseek-chat", "DeepSeek Chat"),
        CustomModel::new("deepseek-reasoner", "DeepSeek Reasoner"),
    ]
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            custom_models: default_custom_models(),
            last_backend: None,
            last_cloud_model: None,
            last_local_model: None,
            auto_reuse_last: false,
            skip_backend_prompt: false,
            skip_model_prompt: false,
        }
    }
}

impl Preferences {
    /// Drops repeated custom model ids, keeping the first entry for each.
    fn dedup_custom_models(&mut self) {
        let mut seen = HashSet::new();
        let before = self.custom_models.len();
        self.custom_models.retain(|m| seen.insert(m.id.clone()));
        if self.custom_models.len() != before {
            warn!("Dropped {} duplicate custom model id(s)", before - self.custom_models.len());
        }
    }

    pub fn last_model(&self, kind: BackendKind) -> Option<&str> {
        match kind {
            BackendKind::Cloud => self.last_cloud_model.as_deref(),
            BackendKind::Local => self.last_local_model.as_deref(),
        }
    }
}

/// Preferences bound to the file they are persisted in.
///
/// Every mutator writes the record back before returning, so a "remember"
/// choice survives even if the process dies right after the prompt.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    /// Opens the store at the default per-user location.
    pub fn open() -> Result<Self> {
        Ok(Self::at(Self::get_preferences_path()?))
    }

    /// Opens the store at `path`, falling back to defaults when the file is
    /// missing or cannot be parsed.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = Self::load_from_file(&path).unwrap_or_else(|e| {
            info!("Using default preferences ({})", e);
            Preferences::default()
        });
        Self { path, prefs }
    }

    fn load_from_file(path: &Path) -> Result<Preferences> {
        if !path.exists() {
            return Err(anyhow!("{} not found", path.display()));
        }
        let content = fs::read_to_string(path)?;
        match toml::from_str::<Preferences>(&content) {
            Ok(mut prefs) => {
                info!("Loaded preferences from: {}", path.display());
                prefs.dedup_custom_models();
                Ok(prefs)
            }
            Err(e) => {
                warn!("Ignoring malformed preferences at {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self.prefs)?;
        fs::write(&self.path, content)?;
        info!("Saved preferences to: {}", self.path.display());
        Ok(())
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_auto_reuse_last(&mut self, value: bool) -> Result<()> {
        self.prefs.auto_reuse_last = value;
        self.save()
    }

    pub fn set_skip_backend_prompt(&mut self, value: bool) -> Result<()> {
        self.prefs.skip_backend_prompt = value;
        self.save()
    }

    pub fn set_skip_model_prompt(&mut self, value: bool) -> Result<()> {
        self.prefs.skip_model_prompt = value;
        self.save()
    }

    /// Records the completed selection as the new "last" values.
    pub fn remember_selection(&mut self, kind: BackendKind, model: &str) -> Result<()> {
        self.prefs.last_backend = Some(kind);
        match kind {
            BackendKind::Cloud => self.prefs.last_cloud_model = Some(model.to_string()),
            BackendKind::Local => self.prefs.last_local_model = Some(model.to_string()),
        }
        self.save()
    }

    /// Appends a custom model unless one with the same id already exists.
    /// Returns whether the list changed.
    pub fn add_custom_model(&mut self, model: CustomModel) -> Result<bool> {
        if self.prefs.custom_models.iter().any(|m| m.id == model.id) {
            return Ok(false);
        }
        self.prefs.custom_models.push(model);
        self.save()?;
        Ok(true)
    }

    /// Deletes the persisted preferences file, if any.
    pub fn reset(path: &Path) -> Result<bool> {
        if path.exists() {
            fs::remove_file(path)?;
            info!("Removed preferences at: {}", path.display());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(CONFIG_DIR_NAME))
    }

    pub fn get_preferences_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join(PREFERENCES_FILE))
    }

    pub fn show_config_info(&self, credential_source: Option<&str>) {
        let prefs = &self.prefs;
        println!("Preferences file: {}", self.path.display());
        println!(
            "Status: {}",
            if self.path.exists() { "Found" } else { "Not found (using defaults)" }
        );
        println!(
            "Last backend: {}",
            prefs.last_backend.map(|k| k.to_string()).unwrap_or_else(|| "none".to_string())
        );
        println!("Last cloud model: {}", prefs.last_cloud_model.as_deref().unwrap_or("none"));
        println!("Last local model: {}", prefs.last_local_model.as_deref().unwrap_or("none"));
        println!("Reuse last choice: {}", prefs.auto_reuse_last);
        println!("Skip backend prompt: {}", prefs.skip_backend_prompt);
        println!("Skip model prompt: {}", prefs.skip_model_prompt);
        println!("Custom models:");
        for model in &prefs.custom_models {
            println!("  {} ({})", model.id, model.name);
        }
        println!("API key: {}", credential_source.unwrap_or("Not set"));
    }
}
