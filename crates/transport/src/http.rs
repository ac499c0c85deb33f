use parla_engine::transport::{DecodeSnafu, NetworkSnafu, StatusSnafu};
use parla_engine::{
    BoxFuture, Dialog, Model, SendMessageRequest, SendMessageResponse, SendSecureMessageResponse,
    Transport, TransportResult, UploadedFile,
};
use reqwest::RequestBuilder;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use crate::config::TransportConfig;
use crate::wire::{
    ChatHistoryResponse, ChatMessagesResponse, FactCheckRequest, FactCheckResponse,
    FileDownloadResponse, ModelsResponse, UpdateDialogNameRequest, UpdateDialogNameResponse,
    UploadFilesResponse,
};

const CHAT_PATH: &str = "/api/chat";
const SECURE_CHAT_PATH: &str = "/api/chat/secure-mode";
const FACT_CHECK_PATH: &str = "/api/chat/fact-check";
const HISTORY_PATH: &str = "/api/chat/history";
const UPLOAD_PATH: &str = "/api/chat/upload";
const MODELS_PATH: &str = "/api/models";

/// Backend client over the chat REST surface. Owns no retry policy; every
/// failure surfaces to the caller as a single transport error.
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub async fn history(&self) -> TransportResult<Vec<Dialog>> {
        let request = self
            .authorized(self.client.get(self.config.endpoint(HISTORY_PATH)));
        let response = send(request, "fetch-history").await?;
        let decoded: ChatHistoryResponse = decode("decode-history", response).await?;
        Ok(decoded.dialogs)
    }

    pub async fn dialog_messages(&self, dialog_id: &str) -> TransportResult<ChatMessagesResponse> {
        let url = self.config.endpoint(&format!("{HISTORY_PATH}/{dialog_id}"));
        let request = self.authorized(self.client.get(url));
        let response = send(request, "fetch-dialog-messages").await?;
        let decoded: ChatMessagesResponse = decode("decode-dialog-messages", response).await?;
        Ok(decoded.propagate_model_info())
    }

    pub async fn rename_dialog(
        &self,
        dialog_id: &str,
        dialog_name: &str,
    ) -> TransportResult<UpdateDialogNameResponse> {
        let url = self.config.endpoint(&format!("{HISTORY_PATH}/{dialog_id}"));
        let body = UpdateDialogNameRequest {
            dialog_name: dialog_name.to_string(),
        };
        let request = self.authorized(self.client.patch(url)).json(&body);
        let response = send(request, "rename-dialog").await?;
        decode("decode-rename-dialog", response).await
    }

    pub async fn fact_check(&self, message: &str) -> TransportResult<FactCheckResponse> {
        let body = FactCheckRequest {
            message: message.to_string(),
        };
        let request = self
            .authorized(self.client.post(self.config.endpoint(FACT_CHECK_PATH)))
            .json(&body);
        let response = send(request, "fact-check").await?;
        decode("decode-fact-check", response).await
    }

    pub async fn delete_dialog(&self, dialog_id: &str) -> TransportResult<()> {
        let url = self.config.endpoint(&format!("{HISTORY_PATH}/{dialog_id}"));
        let request = self.authorized(self.client.delete(url));
        let response = send(request, "delete-dialog").await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return StatusSnafu {
                stage: "delete-dialog",
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        Ok(())
    }

    pub async fn upload_files(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> TransportResult<Vec<UploadedFile>> {
        let mut form = Form::new();
        for (filename, bytes) in files {
            form = form.part("files", Part::bytes(bytes).file_name(filename));
        }

        let request = self
            .authorized(self.client.post(self.config.endpoint(UPLOAD_PATH)))
            .multipart(form);
        let response = send(request, "upload-files").await?;
        let decoded: UploadFilesResponse = decode("decode-upload-files", response).await?;
        Ok(decoded.files)
    }

    pub async fn file_download(&self, file_id: &str) -> TransportResult<FileDownloadResponse> {
        let url = self
            .config
            .endpoint(&format!("/api/chat/files/{file_id}/download"));
        let request = self.authorized(self.client.get(url));
        let response = send(request, "fetch-file-download").await?;
        decode("decode-file-download", response).await
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.config.bearer_token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.config.bearer_token)
        }
    }
}

impl Transport for HttpTransport {
    fn send_plain<'a>(
        &'a self,
        request: &'a SendMessageRequest,
    ) -> BoxFuture<'a, TransportResult<SendMessageResponse>> {
        Box::pin(async move {
            let builder = self
                .authorized(self.client.post(self.config.endpoint(CHAT_PATH)))
                .json(request);
            let response = send(builder, "send-plain").await?;
            decode("decode-send-plain", response).await
        })
    }

    fn send_secure<'a>(
        &'a self,
        request: &'a SendMessageRequest,
    ) -> BoxFuture<'a, TransportResult<SendSecureMessageResponse>> {
        Box::pin(async move {
            let builder = self
                .authorized(self.client.post(self.config.endpoint(SECURE_CHAT_PATH)))
                .json(request);
            let response = send(builder, "send-secure").await?;
            decode("decode-send-secure", response).await
        })
    }

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, TransportResult<Vec<Model>>> {
        Box::pin(async move {
            let builder = self.authorized(self.client.get(self.config.endpoint(MODELS_PATH)));
            let response = send(builder, "fetch-models").await?;
            let decoded: ModelsResponse = decode("decode-models", response).await?;
            Ok(decoded.models)
        })
    }
}

async fn send(builder: RequestBuilder, stage: &'static str) -> TransportResult<reqwest::Response> {
    builder.send().await.map_err(|error| {
        NetworkSnafu {
            stage,
            message: error.to_string(),
        }
        .build()
    })
}

async fn decode<T: DeserializeOwned>(
    stage: &'static str,
    response: reqwest::Response,
) -> TransportResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return StatusSnafu {
            stage,
            status: status.as_u16(),
            body,
        }
        .fail();
    }

    response.json::<T>().await.map_err(|error| {
        DecodeSnafu {
            stage,
            message: error.to_string(),
        }
        .build()
    })
}
