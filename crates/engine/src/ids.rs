use std::fmt;
use std::str::FromStr;

use snafu::ResultExt;
use uuid::Uuid;

use crate::error::{EmptyDialogIdSnafu, EngineError, EngineResult, InvalidProvisionalIdSnafu};

/// Reserved prefix marking client-minted conversation identities on the wire.
pub const PROVISIONAL_DIALOG_PREFIX: &str = "temp-";

/// Prefix marking optimistic user-message ids that exist only client-side
/// until the server round trip settles.
pub const OPTIMISTIC_MESSAGE_ID_PREFIX: &str = "optimistic-user-";

const ASSISTANT_MESSAGE_ID_PREFIX: &str = "assistant-";

/// Conversation identity: a client-minted placeholder before the server has
/// assigned one, or the server's opaque id afterwards. Exactly one form is
/// active for a logical conversation at a time; a promoted provisional id is
/// never used as a key again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DialogId {
    Provisional(Uuid),
    Real(String),
}

impl DialogId {
    /// Mints a fresh provisional identity. Never fails.
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::now_v7())
    }

    pub fn real(raw: impl Into<String>) -> Self {
        Self::Real(raw.into())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    /// Parses a wire identity. `temp-<uuid>` strings become provisional ids,
    /// every other non-empty string is a server id.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return EmptyDialogIdSnafu {
                stage: "parse-dialog-id",
            }
            .fail();
        }

        if let Some(token) = trimmed.strip_prefix(PROVISIONAL_DIALOG_PREFIX) {
            let parsed = Uuid::parse_str(token).context(InvalidProvisionalIdSnafu {
                stage: "parse-provisional-token",
                raw: trimmed.to_string(),
            })?;
            return Ok(Self::Provisional(parsed));
        }

        Ok(Self::Real(trimmed.to_string()))
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(token) => write!(formatter, "{PROVISIONAL_DIALOG_PREFIX}{token}"),
            Self::Real(raw) => write!(formatter, "{raw}"),
        }
    }
}

impl FromStr for DialogId {
    type Err = EngineError;

    fn from_str(raw: &str) -> EngineResult<Self> {
        Self::parse(raw)
    }
}

/// Client id for an optimistic user message.
pub fn optimistic_message_id() -> String {
    format!("{OPTIMISTIC_MESSAGE_ID_PREFIX}{}", Uuid::now_v7())
}

pub fn is_optimistic_message_id(raw: &str) -> bool {
    raw.starts_with(OPTIMISTIC_MESSAGE_ID_PREFIX)
}

/// Client id for a reconciled assistant message.
pub fn assistant_message_id() -> String {
    format!("{ASSISTANT_MESSAGE_ID_PREFIX}{}", Uuid::now_v7())
}
