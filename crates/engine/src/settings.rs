use std::collections::HashMap;
use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use snafu::ResultExt;
use tokio::sync::RwLock;

use crate::error::{
    CreateSettingsDirectorySnafu, EngineResult, RenameSettingsFileSnafu, SerializeSettingsSnafu,
    WriteSettingsFileSnafu,
};
use crate::ids::DialogId;
use crate::types::{ChatSettings, ChatSettingsPatch, Dialog, Model, ModelProvider, display_model_id};

pub const SETTINGS_DIRECTORY_NAME: &str = ".parla";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Two-tier settings state: process-wide defaults plus per-conversation
/// overrides keyed by real server id. Provisional conversations always read
/// the default tier; their override is created at promotion time.
pub struct SettingsResolver {
    state: RwLock<ResolverState>,
}

struct ResolverState {
    default: ChatSettings,
    overrides: HashMap<String, ChatSettings>,
}

impl SettingsResolver {
    pub fn new() -> Self {
        Self::with_defaults(ChatSettings::default())
    }

    pub fn with_defaults(default: ChatSettings) -> Self {
        Self {
            state: RwLock::new(ResolverState {
                default,
                overrides: HashMap::new(),
            }),
        }
    }

    /// Settings governing the next send for the given active conversation.
    pub async fn effective(&self, active: Option<&DialogId>) -> ChatSettings {
        let state = self.state.read().await;
        if let Some(DialogId::Real(raw)) = active
            && let Some(settings) = state.overrides.get(raw)
        {
            return settings.clone();
        }
        state.default.clone()
    }

    pub async fn default_settings(&self) -> ChatSettings {
        self.state.read().await.default.clone()
    }

    pub async fn update_default(&self, patch: &ChatSettingsPatch) {
        let mut state = self.state.write().await;
        state.default.apply_patch(patch);
    }

    /// Creates or merges an override. The base for a fresh override is the
    /// current default tier, not an empty record.
    pub async fn set_override(&self, real_id: &str, patch: &ChatSettingsPatch) {
        let mut state = self.state.write().await;
        let base = state.default.clone();
        state
            .overrides
            .entry(real_id.to_string())
            .or_insert(base)
            .apply_patch(patch);
    }

    /// Routes a patch to whatever tier `effective` would read for the active
    /// conversation.
    pub async fn update_effective(&self, active: Option<&DialogId>, patch: &ChatSettingsPatch) {
        match active {
            Some(DialogId::Real(raw)) => self.set_override(raw, patch).await,
            _ => self.update_default(patch).await,
        }
    }

    /// Seeds a conversation's override from its server record, so reopening
    /// a dialog restores the model it was last driven with.
    pub async fn apply_from_dialog(&self, dialog: &Dialog) {
        let mut patch = ChatSettingsPatch {
            has_encrypted_messages: Some(dialog.has_encrypted_messages),
            ..ChatSettingsPatch::default()
        };
        if let Some(info) = &dialog.last_model_info {
            patch.model = Some(info.id.clone());
            patch.provider = Some(info.provider);
            patch.max_tokens = Some(info.max_output);
            patch.temperature = Some(info.temperature);
        }
        self.set_override(&dialog.id, &patch).await;
    }

    /// Switches the active conversation to another model, clamping the token
    /// limit to the new model's output ceiling when the catalog knows it.
    pub async fn adjust_for_model_switch(
        &self,
        active: Option<&DialogId>,
        model_id: &str,
        provider: ModelProvider,
        catalog: &[Model],
    ) {
        let mut patch = ChatSettingsPatch {
            model: Some(model_id.to_string()),
            provider: Some(provider),
            ..ChatSettingsPatch::default()
        };

        let lookup_id = display_model_id(model_id);
        if let Some(model) = catalog.iter().find(|model| model.id == lookup_id) {
            let current = self.effective(active).await.max_tokens;
            patch.max_tokens = Some(current.min(model.max_output));
        }

        self.update_effective(active, &patch).await;
    }

    pub async fn remove_override(&self, real_id: &str) {
        let mut state = self.state.write().await;
        state.overrides.remove(real_id);
    }
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Disk persistence for the default tier. Load failures degrade to defaults
/// with a warning; writes go through a temporary file and a rename so a
/// crash never leaves a torn settings file.
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn default_path() -> PathBuf {
        PathBuf::from(SETTINGS_DIRECTORY_NAME).join(SETTINGS_FILE_NAME)
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> ChatSettings {
        if !self.path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", self.path);
            return ChatSettings::default();
        }

        let figment = Figment::from(Serialized::defaults(ChatSettings::default()))
            .merge(Json::file(&self.path));

        match figment.extract::<ChatSettings>() {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    self.path,
                    error
                );
                ChatSettings::default()
            }
        }
    }

    pub fn persist(&self, settings: &ChatSettings) -> EngineResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateSettingsDirectorySnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeSettingsSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteSettingsFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameSettingsFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.path);
        Ok(())
    }
}
