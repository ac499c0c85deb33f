pub mod cache;
pub mod controller;
pub mod error;
pub mod ids;
pub mod pending;
pub mod settings;
pub mod transport;
pub mod types;

pub use cache::{CacheChanged, CacheStore};
pub use controller::{ChatEngine, EngineEvent, SendOutcome};
pub use error::{EngineError, EngineResult};
pub use ids::{
    DialogId, OPTIMISTIC_MESSAGE_ID_PREFIX, PROVISIONAL_DIALOG_PREFIX, is_optimistic_message_id,
    optimistic_message_id,
};
pub use pending::{PendingSend, PendingSendRegistry};
pub use settings::{SettingsFile, SettingsResolver};
pub use transport::{BoxFuture, Transport, TransportError, TransportResult};
pub use types::{
    AttachedFile, ChatMessage, ChatSettings, ChatSettingsPatch, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL_ID, DEFAULT_TEMPERATURE, Dialog, DialogCacheEntry, MessageRole, Model,
    ModelInfo, ModelProvider, SecretReplacement, SendKind, SendMessageRequest,
    SendMessageResponse, SendSecureMessageResponse, UploadedFile, display_model_id,
    is_online_model, provisional_title,
};
