//! Item records exchanged between worlds

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Identifier of one player's game world
pub type WorldId = i64;

/// An item found in one world that is to be delivered to another
///
/// Serialized as camelCase JSON, which is the body of SEND and MESSAGE
/// frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    /// World the item was found in
    pub source_player_world_id: WorldId,

    /// World the item belongs to
    pub target_player_world_id: WorldId,

    /// Game specific item identifier
    pub item_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
}

impl ItemDto {
    pub fn new(source_player_world_id: WorldId, target_player_world_id: WorldId, item_id: i64) -> Self {
        Self {
            source_player_world_id,
            target_player_world_id,
            item_id,
            item_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.item_name = Some(name.into());
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::CodecError(format!("JSON encode failed: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ProtocolError::CodecError(format!("JSON decode failed: {}", e)))
    }
}
