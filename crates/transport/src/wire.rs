use parla_engine::{ChatMessage, Dialog, MessageRole, Model, ModelInfo, UploadedFile};
use serde::{Deserialize, Serialize};

/// Response of `GET /api/chat/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub dialogs: Vec<Dialog>,
}

/// Response of `GET /api/chat/history/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessagesResponse {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub has_encrypted_messages: bool,
    #[serde(default)]
    pub last_model_info: Option<ModelInfo>,
}

impl ChatMessagesResponse {
    /// Copies the response-level model info onto assistant messages that
    /// carry none of their own, so history rendering always knows which
    /// model produced a reply.
    pub fn propagate_model_info(mut self) -> Self {
        if let Some(info) = &self.last_model_info {
            for message in &mut self.messages {
                if message.role == MessageRole::Assistant && message.model_info.is_none() {
                    message.model_info = Some(info.clone());
                }
            }
        }
        self
    }
}

/// Body of `PATCH /api/chat/history/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDialogNameRequest {
    pub dialog_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDialogNameResponse {
    pub dialog_id: String,
    pub dialog_name: String,
    pub updated_at: String,
}

/// Body of `POST /api/chat/fact-check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCheckRequest {
    pub message: String,
}

/// Source citation attached to a fact-check verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCheckAnnotation {
    pub url: String,
    pub text: String,
    pub header: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCheckResponse {
    pub response: String,
    pub annotations: Vec<FactCheckAnnotation>,
}

/// Response of `POST /api/chat/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFilesResponse {
    pub files: Vec<UploadedFile>,
}

/// Response of `GET /api/chat/files/{id}/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownloadResponse {
    pub download_url: String,
    #[serde(default)]
    pub expires_in: String,
}

/// Response of `GET /api/models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<Model>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_engine::ModelProvider;

    #[test]
    fn history_listing_decodes() {
        let body = r#"{
            "dialogs": [{
                "id": "c42",
                "name": "Trip planning",
                "has_encrypted_messages": false,
                "last_model_info": {
                    "id": "openai/gpt-5-chat",
                    "name": "GPT-5 Chat",
                    "provider": "openai",
                    "max_output": 4000,
                    "temperature": 0.7
                },
                "created_at": "2026-08-01T10:00:00Z",
                "updated_at": "2026-08-02T09:30:00Z"
            }]
        }"#;

        let decoded: ChatHistoryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.dialogs.len(), 1);
        let dialog = &decoded.dialogs[0];
        assert_eq!(dialog.id, "c42");
        let info = dialog.last_model_info.as_ref().unwrap();
        assert_eq!(info.provider, ModelProvider::Openai);
    }

    #[test]
    fn message_listing_tolerates_missing_optional_fields() {
        let body = r#"{
            "messages": [
                { "role": "user", "content": "Hello" },
                { "role": "assistant", "content": "Hi!" }
            ]
        }"#;

        let decoded: ChatMessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.messages.len(), 2);
        assert!(decoded.messages[0].id.is_none());
        assert!(!decoded.has_encrypted_messages);
        assert!(decoded.last_model_info.is_none());
    }

    #[test]
    fn message_listing_keeps_server_timestamps() {
        let body = r#"{
            "messages": [{
                "role": "user",
                "content": "Hello",
                "created_at": "2026-08-01T10:00:00Z",
                "timestamp": 1754042400000
            }]
        }"#;

        let decoded: ChatMessagesResponse = serde_json::from_str(body).unwrap();
        let message = &decoded.messages[0];
        assert_eq!(message.created_at.as_deref(), Some("2026-08-01T10:00:00Z"));
        assert_eq!(message.timestamp_unix_ms, 1_754_042_400_000);
    }

    #[test]
    fn response_model_info_propagates_onto_bare_assistant_messages() {
        let body = r#"{
            "messages": [
                { "role": "user", "content": "Hello" },
                { "role": "assistant", "content": "Hi!" },
                {
                    "role": "assistant",
                    "content": "Earlier reply",
                    "last_model_info": {
                        "id": "anthropic/claude-sonnet",
                        "name": "Claude Sonnet",
                        "provider": "anthropic",
                        "max_output": 2000,
                        "temperature": 0.5
                    }
                }
            ],
            "has_encrypted_messages": false,
            "last_model_info": {
                "id": "openai/gpt-5-chat",
                "name": "GPT-5 Chat",
                "provider": "openai",
                "max_output": 4000,
                "temperature": 0.7
            }
        }"#;

        let decoded: ChatMessagesResponse = serde_json::from_str(body).unwrap();
        let enriched = decoded.propagate_model_info();

        assert!(enriched.messages[0].model_info.is_none());
        assert_eq!(
            enriched.messages[1].model_info.as_ref().unwrap().id,
            "openai/gpt-5-chat"
        );
        // A reply that already names its model keeps it.
        assert_eq!(
            enriched.messages[2].model_info.as_ref().unwrap().id,
            "anthropic/claude-sonnet"
        );
    }

    #[test]
    fn rename_exchange_uses_the_dialog_name_field() {
        let request = UpdateDialogNameRequest {
            dialog_name: "Trip planning".to_string(),
        };
        let encoded = serde_json::to_string(&request).unwrap();
        assert_eq!(encoded, r#"{"dialog_name":"Trip planning"}"#);

        let body = r#"{
            "dialog_id": "c42",
            "dialog_name": "Trip planning",
            "updated_at": "2026-08-02T09:30:00Z"
        }"#;
        let decoded: UpdateDialogNameResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.dialog_id, "c42");
        assert_eq!(decoded.dialog_name, "Trip planning");
    }

    #[test]
    fn fact_check_response_decodes_with_annotations() {
        let body = r#"{
            "response": "Mostly accurate.",
            "annotations": [{
                "url": "https://example.com/source",
                "text": "supporting quote",
                "header": "Example Source"
            }]
        }"#;

        let decoded: FactCheckResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.response, "Mostly accurate.");
        assert_eq!(decoded.annotations.len(), 1);
        assert_eq!(decoded.annotations[0].header, "Example Source");
    }

    #[test]
    fn file_download_response_carries_expires_in() {
        let body = r#"{
            "download_url": "https://files.example.com/f1",
            "expires_in": "3600"
        }"#;

        let decoded: FileDownloadResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.expires_in, "3600");
    }

    #[test]
    fn upload_response_decodes() {
        let body = r#"{
            "files": [{
                "file_id": "f1",
                "filename": "notes.txt",
                "download_url": "https://files.example.com/f1",
                "expires_at": "2026-09-01T00:00:00Z",
                "text_extracted": true
            }]
        }"#;

        let decoded: UploadFilesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.files[0].file_id, "f1");
        assert!(decoded.files[0].text_extracted);
    }
}
