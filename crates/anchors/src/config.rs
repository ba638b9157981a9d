use serde::{Deserialize, Serialize};

/// Default chunk cap in estimated tokens.
pub const DEFAULT_MAX_CHUNK_TOKENS: usize = 450;

/// Configuration for chunk building
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkerConfig {
    /// Maximum chunk size in estimated tokens (an oversize anchor still forms its own chunk)
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,

    /// Characters per hex hash prefix in chunk ids
    #[serde(default = "default_hash_prefix_len")]
    pub hash_prefix_len: usize,
}

const fn default_max_chunk_tokens() -> usize {
    DEFAULT_MAX_CHUNK_TOKENS
}

const fn default_hash_prefix_len() -> usize {
    16
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: DEFAULT_MAX_CHUNK_TOKENS,
            hash_prefix_len: default_hash_prefix_len(),
        }
    }
}

impl ChunkerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_tokens == 0 {
            return Err("max_chunk_tokens must be > 0".to_string());
        }
        if !(8..=64).contains(&self.hash_prefix_len) {
            return Err("hash_prefix_len must be within 8..=64".to_string());
        }
        Ok(())
    }
}
