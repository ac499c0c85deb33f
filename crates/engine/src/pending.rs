use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::ids::DialogId;
use crate::types::{SendKind, SendMessageRequest};

/// One in-flight send, queryable by conversation identity while the network
/// round trip is open.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub kind: SendKind,
    pub request: SendMessageRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    kind: SendKind,
    dialog_id: DialogId,
}

/// Tracks sends between optimistic write and reconciliation. Keys carry the
/// identity the send started under; a promotion does not move the key, so
/// queries during promotion must use the original provisional id.
pub struct PendingSendRegistry {
    inflight: RwLock<HashMap<PendingKey, Vec<PendingSend>>>,
}

impl PendingSendRegistry {
    pub fn new() -> Self {
        Self {
            inflight: RwLock::new(HashMap::new()),
        }
    }

    pub async fn begin(&self, kind: SendKind, dialog_id: &DialogId, request: SendMessageRequest) {
        let key = PendingKey {
            kind,
            dialog_id: dialog_id.clone(),
        };
        let mut inflight = self.inflight.write().await;
        inflight
            .entry(key)
            .or_default()
            .push(PendingSend { kind, request });
    }

    /// Closes one in-flight send for the key, keeping any overlapping sends
    /// that started under the same identity.
    pub async fn end(&self, kind: SendKind, dialog_id: &DialogId) {
        let key = PendingKey {
            kind,
            dialog_id: dialog_id.clone(),
        };
        let mut inflight = self.inflight.write().await;
        match inflight.get_mut(&key) {
            Some(sends) => {
                sends.pop();
                if sends.is_empty() {
                    inflight.remove(&key);
                }
            }
            None => {
                tracing::warn!(
                    dialog_id = %dialog_id,
                    kind = kind.name(),
                    "ending a send that was never registered"
                );
            }
        }
    }

    /// Most recent in-flight send of the given kind for the identity.
    pub async fn query(&self, dialog_id: &DialogId, kind: SendKind) -> Option<PendingSend> {
        let key = PendingKey {
            kind,
            dialog_id: dialog_id.clone(),
        };
        let inflight = self.inflight.read().await;
        inflight.get(&key).and_then(|sends| sends.last().cloned())
    }

    /// True when any send, plain or secure, is open for the identity.
    pub async fn is_send_pending(&self, dialog_id: &DialogId) -> bool {
        let inflight = self.inflight.read().await;
        [SendKind::Plain, SendKind::Secure].iter().any(|kind| {
            let key = PendingKey {
                kind: *kind,
                dialog_id: dialog_id.clone(),
            };
            inflight.get(&key).is_some_and(|sends| !sends.is_empty())
        })
    }
}

impl Default for PendingSendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
