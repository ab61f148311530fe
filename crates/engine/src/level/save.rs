use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use super::loader::to_hex_lower;
use super::{EntityId, Level, PersistentState};

/// Unhashed save payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGameData {
    pub state: BTreeMap<EntityId, PersistentState>,
    pub level_version: u32,
    pub level_hash: String,
}

/// Everything needed, besides the level itself, to resume at the last checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGame {
    pub data: SaveGameData,
    pub hash: String,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save game checksum mismatch; the save was modified outside the game")]
    Tampered,
    #[error("save game does not match level version: got {got}, want {want}")]
    Incompatible { got: u32, want: u32 },
    #[error("failed to encode save game: {0}")]
    Encode(#[source] serde_json::Error),
}

impl SaveGameData {
    pub fn compute_hash(&self) -> Result<String, SaveError> {
        let bytes = serde_json::to_vec(self).map_err(SaveError::Encode)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(to_hex_lower(&hasher.finalize()))
    }
}

impl Level {
    pub fn save_game(&self) -> Result<SaveGame, SaveError> {
        let state = self
            .persistent
            .iter()
            .filter(|(_, state)| !state.is_empty())
            .map(|(id, state)| (*id, state.clone()))
            .collect();
        let data = SaveGameData {
            state,
            level_version: self.save_game_version,
            level_hash: self.hash.clone(),
        };
        let hash = data.compute_hash()?;
        Ok(SaveGame { data, hash })
    }

    /// Replaces all persistent state with the save's. The save is fully
    /// validated first; on error nothing is changed.
    pub fn load_game(&mut self, save: &SaveGame) -> Result<(), SaveError> {
        if save.data.compute_hash()? != save.hash {
            return Err(SaveError::Tampered);
        }
        if save.data.level_version != self.save_game_version {
            return Err(SaveError::Incompatible {
                got: save.data.level_version,
                want: self.save_game_version,
            });
        }
        if save.data.level_hash != self.hash {
            warn!(
                got = save.data.level_hash.as_str(),
                want = self.hash.as_str(),
                "save_level_hash_mismatch_loading_anyway"
            );
        }

        self.persistent.clear();
        let mut unknown = 0usize;
        for (id, state) in &save.data.state {
            if self.spawnables.contains_key(id) {
                self.persistent.insert(*id, state.clone());
            } else {
                unknown += 1;
            }
        }
        if unknown > 0 {
            warn!(unknown, "save_state_for_unknown_entities_dropped");
        }
        info!(entities = self.persistent.len(), "save_loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::test_levels::{warp_room, WARP_ROOM};

    fn level_with_state() -> Level {
        let mut level = warp_room();
        level
            .persistent_state_mut(EntityId(4))
            .insert("used".to_string(), "true".to_string());
        level
            .persistent_state_mut(EntityId(1))
            .insert("last_checkpoint".to_string(), "hall".to_string());
        level
    }

    #[test]
    fn save_then_load_restores_state() {
        let level = level_with_state();
        let save = level.save_game().expect("save");
        assert_eq!(save.data.state.len(), 2);

        let mut fresh = warp_room();
        fresh.load_game(&save).expect("load");
        assert_eq!(
            fresh
                .persistent_state(EntityId(4))
                .and_then(|s| s.get("used"))
                .map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn empty_states_are_not_saved() {
        let mut level = warp_room();
        level.persistent_state_mut(EntityId(4));
        let save = level.save_game().expect("save");
        assert!(save.data.state.is_empty());
    }

    #[test]
    fn tampered_save_is_rejected_without_mutation() {
        let mut save = level_with_state().save_game().expect("save");
        save.data
            .state
            .entry(EntityId(4))
            .or_default()
            .insert("used".to_string(), "false".to_string());

        let mut target = warp_room();
        target
            .persistent_state_mut(EntityId(5))
            .insert("keep".to_string(), "me".to_string());
        let before = target.persistent.clone();

        let err = target.load_game(&save).expect_err("tampered");
        assert!(matches!(err, SaveError::Tampered));
        assert_eq!(target.persistent, before);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut save = level_with_state().save_game().expect("save");
        let first = if save.hash.starts_with('0') { "1" } else { "0" };
        save.hash.replace_range(0..1, first);
        let mut target = warp_room();
        assert!(matches!(target.load_game(&save), Err(SaveError::Tampered)));
        assert!(target.persistent.is_empty());
    }

    #[test]
    fn version_mismatch_is_incompatible() {
        let save = level_with_state().save_game().expect("save");
        let raw = WARP_ROOM.replace("save_game_version=\"3\"", "save_game_version=\"4\"");
        let mut newer = Level::parse("newer", &raw).expect("parse");

        let err = newer.load_game(&save).expect_err("incompatible");
        assert!(matches!(err, SaveError::Incompatible { got: 3, want: 4 }));
        assert!(newer.persistent.is_empty());
    }

    #[test]
    fn level_hash_mismatch_still_loads() {
        let save = level_with_state().save_game().expect("save");
        let raw = WARP_ROOM.replace("<tileset>", "<tileset> ");
        let mut edited = Level::parse("edited", &raw).expect("parse");
        assert_ne!(edited.hash(), save.data.level_hash);

        edited.load_game(&save).expect("loads anyway");
        assert!(edited.persistent_state(EntityId(1)).is_some());
    }

    #[test]
    fn save_json_round_trips_entity_id_keys() {
        let save = level_with_state().save_game().expect("save");
        let json = serde_json::to_string(&save).expect("encode");
        assert!(json.contains("\"4\":{\"used\":\"true\"}"), "{json}");
        let back: SaveGame = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, save);
    }
}
