use std::sync::Arc;

use snafu::ResultExt;
use tokio::sync::{RwLock, broadcast};

use crate::cache::{CacheChanged, CacheStore};
use crate::error::{EmptyMessageSnafu, EngineResult, TransportSnafu};
use crate::ids::{DialogId, assistant_message_id, optimistic_message_id};
use crate::pending::{PendingSend, PendingSendRegistry};
use crate::settings::SettingsResolver;
use crate::transport::Transport;
use crate::types::{
    AttachedFile, ChatMessage, ChatSettings, ChatSettingsPatch, Dialog, DialogCacheEntry,
    ModelInfo, ModelProvider, SendKind, SendMessageRequest, UploadedFile, display_model_id,
};

const ENGINE_EVENT_CAPACITY: usize = 64;

/// Coarse notifications for UI-layer collaborators. Message-level changes
/// flow through the cache's own channel; these cover everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The conversation listing is stale and should be refetched.
    HistoryChanged,
    ActiveDialogChanged { dialog_id: Option<DialogId> },
}

/// Result of one reconciled send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// Real identity the conversation settled under.
    pub dialog_id: DialogId,
    pub assistant_message: ChatMessage,
    /// Set when this send promoted a provisional conversation.
    pub promoted_from: Option<DialogId>,
}

/// Drives the optimistic send protocol: write the user message first, call
/// the backend, then reconcile or roll back. Owns the active-conversation
/// pointer and reacts to external dialog mutations.
pub struct ChatEngine {
    cache: Arc<CacheStore>,
    registry: Arc<PendingSendRegistry>,
    settings: Arc<SettingsResolver>,
    transport: Arc<dyn Transport>,
    active: RwLock<Option<DialogId>>,
    events: broadcast::Sender<EngineEvent>,
}

impl ChatEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_settings(transport, SettingsResolver::new())
    }

    pub fn with_settings(transport: Arc<dyn Transport>, settings: SettingsResolver) -> Self {
        Self::with_stores(
            transport,
            Arc::new(CacheStore::new()),
            Arc::new(PendingSendRegistry::new()),
            Arc::new(settings),
        )
    }

    /// Builds an engine over caller-owned stores, for callers that share the
    /// cache or registry with other collaborators.
    pub fn with_stores(
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
        registry: Arc<PendingSendRegistry>,
        settings: Arc<SettingsResolver>,
    ) -> Self {
        let (events, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        Self {
            cache,
            registry,
            settings,
            transport,
            active: RwLock::new(None),
            events,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn subscribe_cache(&self) -> broadcast::Receiver<CacheChanged> {
        self.cache.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn active_dialog(&self) -> Option<DialogId> {
        self.active.read().await.clone()
    }

    pub async fn set_active_dialog(&self, dialog_id: Option<DialogId>) {
        {
            let mut active = self.active.write().await;
            if *active == dialog_id {
                return;
            }
            *active = dialog_id.clone();
        }
        let _ = self.events.send(EngineEvent::ActiveDialogChanged { dialog_id });
    }

    pub async fn effective_settings(&self) -> ChatSettings {
        let active = self.active.read().await.clone();
        self.settings.effective(active.as_ref()).await
    }

    pub async fn update_effective_settings(&self, patch: &ChatSettingsPatch) {
        let active = self.active.read().await.clone();
        self.settings.update_effective(active.as_ref(), patch).await;
    }

    /// Switches the active conversation to another model. The catalog fetch
    /// is best effort; without it the token limit is left alone.
    pub async fn switch_model(&self, model_id: &str, provider: ModelProvider) {
        let catalog = match self.transport.fetch_models().await {
            Ok(models) => models,
            Err(error) => {
                tracing::warn!(error = %error, "model catalog unavailable, skipping token clamp");
                Vec::new()
            }
        };
        let active = self.active.read().await.clone();
        self.settings
            .adjust_for_model_switch(active.as_ref(), model_id, provider, &catalog)
            .await;
    }

    pub async fn apply_dialog_settings(&self, dialog: &Dialog) {
        self.settings.apply_from_dialog(dialog).await;
    }

    pub async fn is_send_pending(&self, dialog_id: &DialogId) -> bool {
        self.registry.is_send_pending(dialog_id).await
    }

    pub async fn pending_send(&self, dialog_id: &DialogId, kind: SendKind) -> Option<PendingSend> {
        self.registry.query(dialog_id, kind).await
    }

    /// Fire-and-forget send. Failures are logged; callers observe progress
    /// through the registry and the cache change feed.
    pub fn send(self: &Arc<Self>, text: impl Into<String>, files: Vec<UploadedFile>) {
        let engine = Arc::clone(self);
        let text = text.into();
        tokio::spawn(async move {
            if let Err(error) = engine.send_message(&text, files).await {
                tracing::warn!(error = %error, "send failed");
            }
        });
    }

    /// The full send protocol: optimistic write, network call, then
    /// reconciliation on success or rollback on failure.
    pub async fn send_message(
        &self,
        text: &str,
        files: Vec<UploadedFile>,
    ) -> EngineResult<SendOutcome> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return EmptyMessageSnafu {
                stage: "validate-message",
            }
            .fail();
        }

        // Resolve the identity this send runs under, minting one for a
        // brand-new conversation.
        let (dialog_id, brand_new) = {
            let mut active = self.active.write().await;
            match active.clone() {
                Some(id) => (id, false),
                None => {
                    let id = DialogId::provisional();
                    *active = Some(id.clone());
                    (id, true)
                }
            }
        };
        if brand_new {
            let _ = self.events.send(EngineEvent::ActiveDialogChanged {
                dialog_id: Some(dialog_id.clone()),
            });
        }

        let settings = self.settings.effective(Some(&dialog_id)).await;
        let kind = if settings.has_encrypted_messages {
            SendKind::Secure
        } else {
            SendKind::Plain
        };

        let attached_files: Vec<AttachedFile> = files.iter().map(AttachedFile::from).collect();
        let file_ids: Vec<String> = files.iter().map(|file| file.file_id.clone()).collect();
        let user_message =
            ChatMessage::user(optimistic_message_id(), trimmed, attached_files);
        let user_message_id = user_message.id.clone();

        // Optimistic write, capturing the pre-send snapshot in the same
        // critical section.
        let mut snapshot: Option<DialogCacheEntry> = None;
        self.cache
            .mutate(&dialog_id, |previous| {
                snapshot = previous.clone();
                let mut entry = previous
                    .unwrap_or_else(|| DialogCacheEntry::empty(settings.has_encrypted_messages));
                entry.messages.push(user_message);
                Some(entry)
            })
            .await;

        let request = SendMessageRequest {
            model: settings.model.clone(),
            message: trimmed.to_string(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            dialog_id: match &dialog_id {
                DialogId::Real(raw) => Some(raw.clone()),
                DialogId::Provisional(_) => None,
            },
            file_ids: if file_ids.is_empty() {
                None
            } else {
                Some(file_ids)
            },
        };

        self.registry.begin(kind, &dialog_id, request.clone()).await;

        let result = match kind {
            SendKind::Plain => self
                .transport
                .send_plain(&request)
                .await
                .map(|response| (response.response, response.dialog_id, None)),
            SendKind::Secure => self.transport.send_secure(&request).await.map(|response| {
                (
                    response.decrypted_response,
                    response.dialog_id,
                    Some(response.encrypted_response),
                )
            }),
        };

        self.registry.end(kind, &dialog_id).await;

        let (response_text, returned_id, encrypted_response) = match result {
            Ok(parts) => parts,
            Err(error) => {
                self.roll_back(&dialog_id, brand_new, snapshot, user_message_id.as_deref())
                    .await;
                return Err(error).context(TransportSnafu {
                    stage: kind.name(),
                });
            }
        };

        let real_id = DialogId::real(returned_id);
        let model_info = self.model_snapshot(&settings).await;

        let promoted_from = if dialog_id.is_provisional() {
            self.promote(&dialog_id, &real_id, &settings).await;
            Some(dialog_id.clone())
        } else {
            None
        };

        let assistant_message = ChatMessage::assistant(
            assistant_message_id(),
            response_text,
            model_info.clone(),
        );
        let reconciled = assistant_message.clone();
        let secure_send = kind == SendKind::Secure;
        self.cache
            .write(&real_id, move |previous| {
                let mut entry = previous.unwrap_or_else(|| {
                    // The entry can vanish mid-flight when the user deletes
                    // the conversation; keep the assistant output anyway.
                    tracing::warn!("reconciling into a missing entry, creating a fresh one");
                    DialogCacheEntry::empty(secure_send)
                });
                if secure_send {
                    entry.has_encrypted_messages = true;
                    if let Some(encrypted) = &encrypted_response
                        && !entry.retrofit_encrypted_content(encrypted)
                    {
                        tracing::warn!("no user message to carry the encrypted form");
                    }
                }
                entry.messages.push(reconciled);
                entry.last_model_info = model_info;
                entry
            })
            .await;

        Ok(SendOutcome {
            dialog_id: real_id,
            assistant_message,
            promoted_from,
        })
    }

    /// Conversation deleted by an external collaborator.
    pub async fn handle_dialog_deleted(&self, dialog_id: &DialogId) {
        self.cache.remove(dialog_id).await;
        if let DialogId::Real(raw) = dialog_id {
            self.settings.remove_override(raw).await;
        }

        let cleared = {
            let mut active = self.active.write().await;
            if active.as_ref() == Some(dialog_id) {
                *active = None;
                true
            } else {
                false
            }
        };
        if cleared {
            let _ = self
                .events
                .send(EngineEvent::ActiveDialogChanged { dialog_id: None });
        }
        let _ = self.events.send(EngineEvent::HistoryChanged);
    }

    /// Conversation renamed externally. The cache holds no display name, so
    /// only the listing needs a refresh.
    pub async fn handle_dialog_renamed(&self, _dialog_id: &DialogId) {
        let _ = self.events.send(EngineEvent::HistoryChanged);
    }

    async fn roll_back(
        &self,
        dialog_id: &DialogId,
        brand_new: bool,
        snapshot: Option<DialogCacheEntry>,
        user_message_id: Option<&str>,
    ) {
        self.cache
            .mutate(dialog_id, |current| {
                let Some(mut entry) = current else {
                    // Deleted mid-flight; nothing to restore.
                    return None;
                };

                let snapshot_len = snapshot.as_ref().map_or(0, |prior| prior.messages.len());
                let own_tail = entry.messages.len() == snapshot_len + 1
                    && entry.messages.last().map(|message| message.id.as_deref())
                        == Some(user_message_id);
                if own_tail {
                    // No interleaved writes happened, restore the exact
                    // pre-send state (removing a brand-new entry entirely).
                    snapshot
                } else {
                    // Another send appended after ours; surgically drop only
                    // our optimistic message.
                    entry
                        .messages
                        .retain(|message| message.id.as_deref() != user_message_id);
                    Some(entry)
                }
            })
            .await;

        if brand_new {
            let cleared = {
                let mut active = self.active.write().await;
                if active.as_ref() == Some(dialog_id) {
                    *active = None;
                    true
                } else {
                    false
                }
            };
            if cleared {
                let _ = self
                    .events
                    .send(EngineEvent::ActiveDialogChanged { dialog_id: None });
            }
        }
    }

    async fn promote(&self, provisional: &DialogId, real: &DialogId, settings: &ChatSettings) {
        if let Err(error) = self.cache.rekey(provisional, real).await {
            // Deleted mid-flight; reconciliation will recreate the entry.
            tracing::warn!(error = %error, "promotion found no provisional entry");
        }

        let moved = {
            let mut active = self.active.write().await;
            if active.as_ref() == Some(provisional) {
                *active = Some(real.clone());
                true
            } else {
                false
            }
        };
        if moved {
            let _ = self.events.send(EngineEvent::ActiveDialogChanged {
                dialog_id: Some(real.clone()),
            });
        }

        if let DialogId::Real(raw) = real {
            self.settings.set_override(raw, &settings.as_patch()).await;
        }
        let _ = self.events.send(EngineEvent::HistoryChanged);
    }

    /// Model snapshot carried on the assistant message. Catalog lookup is
    /// best effort; the send never fails because the catalog is down.
    async fn model_snapshot(&self, settings: &ChatSettings) -> Option<ModelInfo> {
        let catalog = match self.transport.fetch_models().await {
            Ok(models) => models,
            Err(error) => {
                tracing::warn!(error = %error, "model catalog unavailable, omitting model snapshot");
                return None;
            }
        };

        let lookup_id = display_model_id(&settings.model);
        let model = catalog.iter().find(|model| model.id == lookup_id)?;
        Some(ModelInfo {
            id: model.id.clone(),
            name: model.name.clone(),
            provider: model.provider,
            max_output: settings.max_tokens,
            temperature: settings.temperature,
        })
    }
}
