use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ids::DialogId;

/// Defaults applied when no conversation override exists.
pub const DEFAULT_MODEL_ID: &str = "openai/gpt-5-chat";
pub const DEFAULT_MAX_TOKENS: u32 = 4_000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Longest provisional dialog title derived from the first user message.
pub const PROVISIONAL_TITLE_MAX_CHARS: usize = 50;

const ONLINE_MODEL_SUFFIX: &str = ":online";
const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Backend model provider set, serialized as the wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Openai,
    Anthropic,
    Perplexity,
    Google,
    #[serde(rename = "meta-llama")]
    MetaLlama,
    Mistralai,
    Deepseek,
    Qwen,
    Grok,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Perplexity => "perplexity",
            Self::Google => "google",
            Self::MetaLlama => "meta-llama",
            Self::Mistralai => "mistralai",
            Self::Deepseek => "deepseek",
            Self::Qwen => "qwen",
            Self::Grok => "grok",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

/// Immutable model snapshot taken at send time, carried on assistant
/// messages so history keeps showing the model that actually produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub max_output: u32,
    pub temperature: f32,
}

/// Catalog entry from the models endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub context_window: u32,
    pub max_output: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub created_at: String,
}

/// Upload-endpoint record; the engine only carries the identifiers and
/// metadata it hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub filename: String,
    pub download_url: String,
    pub expires_at: String,
    pub text_extracted: bool,
}

impl From<&UploadedFile> for AttachedFile {
    fn from(uploaded: &UploadedFile) -> Self {
        // The upload response does not echo content type or size.
        Self {
            id: uploaded.file_id.clone(),
            filename: uploaded.filename.clone(),
            content_type: GENERIC_CONTENT_TYPE.to_string(),
            file_size: 0,
            created_at: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    /// Server-assigned creation time, absent on client-minted messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "timestamp", default)]
    pub timestamp_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    #[serde(rename = "last_model_info", default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attached_files: Vec<AttachedFile>,
}

impl ChatMessage {
    pub fn user(
        id: impl Into<String>,
        content: impl Into<String>,
        attached_files: Vec<AttachedFile>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            role: MessageRole::User,
            content: content.into(),
            created_at: None,
            timestamp_unix_ms: current_unix_timestamp_ms(),
            encrypted_content: None,
            model_info: None,
            attached_files,
        }
    }

    pub fn assistant(
        id: impl Into<String>,
        content: impl Into<String>,
        model_info: Option<ModelInfo>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: None,
            timestamp_unix_ms: current_unix_timestamp_ms(),
            encrypted_content: None,
            model_info,
            attached_files: Vec::new(),
        }
    }
}

/// Server conversation record as returned by the history listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: String,
    pub name: String,
    pub has_encrypted_messages: bool,
    #[serde(default)]
    pub last_model_info: Option<ModelInfo>,
    pub created_at: String,
    pub updated_at: String,
}

impl Dialog {
    pub fn dialog_id(&self) -> DialogId {
        DialogId::real(self.id.clone())
    }
}

/// Cached message list for one conversation identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DialogCacheEntry {
    pub messages: Vec<ChatMessage>,
    pub has_encrypted_messages: bool,
    #[serde(default)]
    pub last_model_info: Option<ModelInfo>,
}

impl DialogCacheEntry {
    pub fn empty(has_encrypted_messages: bool) -> Self {
        Self {
            messages: Vec::new(),
            has_encrypted_messages,
            last_model_info: None,
        }
    }

    pub fn user_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == MessageRole::User)
            .count()
    }

    /// Attaches the encrypted form to the most recent user message, scanning
    /// backward. The optimistic message id is client-local and unknown to the
    /// server response, so correlation is positional.
    pub fn retrofit_encrypted_content(&mut self, encrypted: &str) -> bool {
        for message in self.messages.iter_mut().rev() {
            if message.role == MessageRole::User {
                message.encrypted_content = Some(encrypted.to_string());
                return true;
            }
        }
        false
    }
}

/// Effective generation settings for a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub model: String,
    pub provider: ModelProvider,
    pub max_tokens: u32,
    pub temperature: f32,
    pub has_encrypted_messages: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL_ID.to_string(),
            provider: ModelProvider::Openai,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            has_encrypted_messages: false,
        }
    }
}

impl ChatSettings {
    /// Shallow merge; last write wins, no versioning.
    pub fn apply_patch(&mut self, patch: &ChatSettingsPatch) {
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(provider) = patch.provider {
            self.provider = provider;
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(has_encrypted_messages) = patch.has_encrypted_messages {
            self.has_encrypted_messages = has_encrypted_messages;
        }
    }

    pub fn as_patch(&self) -> ChatSettingsPatch {
        ChatSettingsPatch {
            model: Some(self.model.clone()),
            provider: Some(self.provider),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            has_encrypted_messages: Some(self.has_encrypted_messages),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatSettingsPatch {
    pub model: Option<String>,
    pub provider: Option<ModelProvider>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub has_encrypted_messages: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendKind {
    Plain,
    Secure,
}

impl SendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Secure => "secure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub model: String,
    pub message: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub response: String,
    pub dialog_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReplacement {
    pub original: String,
    pub replacement: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSecureMessageResponse {
    pub encrypted_response: String,
    pub decrypted_response: String,
    pub secrets: Vec<SecretReplacement>,
    pub content_type: String,
    pub dialog_id: String,
}

/// Strips the web-search suffix so catalog lookups and overrides use the
/// plain model id.
pub fn display_model_id(model_id: &str) -> String {
    model_id.replacen(ONLINE_MODEL_SUFFIX, "", 1)
}

pub fn is_online_model(model_id: &str) -> bool {
    model_id.contains(ONLINE_MODEL_SUFFIX)
}

/// Title shown for a conversation that only exists client-side yet.
pub fn provisional_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut title: String = trimmed.chars().take(PROVISIONAL_TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > PROVISIONAL_TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merge_is_shallow_and_last_write_wins() {
        let mut settings = ChatSettings::default();
        settings.apply_patch(&ChatSettingsPatch {
            max_tokens: Some(2_000),
            ..ChatSettingsPatch::default()
        });
        assert_eq!(settings.max_tokens, 2_000);
        assert_eq!(settings.model, DEFAULT_MODEL_ID);

        settings.apply_patch(&ChatSettingsPatch {
            model: Some("anthropic/claude".to_string()),
            provider: Some(ModelProvider::Anthropic),
            ..ChatSettingsPatch::default()
        });
        assert_eq!(settings.model, "anthropic/claude");
        assert_eq!(settings.provider, ModelProvider::Anthropic);
        assert_eq!(settings.max_tokens, 2_000);
    }

    #[test]
    fn retrofit_targets_most_recent_user_message() {
        let mut entry = DialogCacheEntry::empty(true);
        entry
            .messages
            .push(ChatMessage::user("u1", "first", Vec::new()));
        entry
            .messages
            .push(ChatMessage::assistant("a1", "reply", None));
        entry
            .messages
            .push(ChatMessage::user("u2", "second", Vec::new()));

        assert!(entry.retrofit_encrypted_content("cipher"));
        assert_eq!(entry.messages[2].encrypted_content.as_deref(), Some("cipher"));
        assert_eq!(entry.messages[0].encrypted_content, None);
    }

    #[test]
    fn retrofit_without_user_message_reports_failure() {
        let mut entry = DialogCacheEntry::empty(true);
        entry
            .messages
            .push(ChatMessage::assistant("a1", "orphan", None));
        assert!(!entry.retrofit_encrypted_content("cipher"));
    }

    #[test]
    fn provisional_title_truncates_long_messages() {
        let short = provisional_title("hello there");
        assert_eq!(short, "hello there");

        let long_input = "x".repeat(PROVISIONAL_TITLE_MAX_CHARS + 10);
        let long = provisional_title(&long_input);
        assert_eq!(
            long.chars().count(),
            PROVISIONAL_TITLE_MAX_CHARS + "...".chars().count()
        );
        assert!(long.ends_with("..."));
    }

    #[test]
    fn display_model_id_strips_online_suffix() {
        assert_eq!(display_model_id("openai/gpt-5-chat:online"), "openai/gpt-5-chat");
        assert_eq!(display_model_id("openai/gpt-5-chat"), "openai/gpt-5-chat");
        assert!(is_online_model("openai/gpt-5-chat:online"));
        assert!(!is_online_model("openai/gpt-5-chat"));
    }

    #[test]
    fn provider_serializes_to_wire_names() {
        let encoded = serde_json::to_string(&ModelProvider::MetaLlama).unwrap();
        assert_eq!(encoded, "\"meta-llama\"");
        let decoded: ModelProvider = serde_json::from_str("\"deepseek\"").unwrap();
        assert_eq!(decoded, ModelProvider::Deepseek);
    }

    #[test]
    fn chat_message_decodes_server_fields() {
        let body = r#"{
            "role": "assistant",
            "content": "Hi!",
            "created_at": "2026-08-01T10:00:00Z",
            "timestamp": 1754042400000,
            "last_model_info": {
                "id": "openai/gpt-5-chat",
                "name": "GPT-5 Chat",
                "provider": "openai",
                "max_output": 4000,
                "temperature": 0.7
            }
        }"#;

        let message: ChatMessage = serde_json::from_str(body).unwrap();
        assert_eq!(message.created_at.as_deref(), Some("2026-08-01T10:00:00Z"));
        assert_eq!(message.timestamp_unix_ms, 1_754_042_400_000);
        assert_eq!(message.model_info.unwrap().id, "openai/gpt-5-chat");

        // Client-minted messages do not invent a server timestamp.
        let minted = ChatMessage::user("u1", "hello", Vec::new());
        assert!(minted.created_at.is_none());
        let encoded = serde_json::to_string(&minted).unwrap();
        assert!(!encoded.contains("created_at"));
        assert!(encoded.contains("\"timestamp\""));
    }

    #[test]
    fn send_request_omits_absent_optional_fields() {
        let request = SendMessageRequest {
            model: DEFAULT_MODEL_ID.to_string(),
            message: "hi".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            dialog_id: None,
            file_ids: None,
        };
        let encoded = serde_json::to_string(&request).unwrap();
        assert!(!encoded.contains("dialog_id"));
        assert!(!encoded.contains("file_ids"));
    }
}
