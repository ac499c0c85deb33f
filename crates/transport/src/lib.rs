pub mod config;
pub mod http;
pub mod wire;

pub use config::TransportConfig;
pub use http::HttpTransport;
pub use wire::{
    ChatHistoryResponse, ChatMessagesResponse, FactCheckAnnotation, FactCheckRequest,
    FactCheckResponse, FileDownloadResponse, ModelsResponse, UpdateDialogNameRequest,
    UpdateDialogNameResponse, UploadFilesResponse,
};
