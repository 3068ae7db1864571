//! Partitioning conversations across scheduler instances.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// Shard `index` of `count`. A conversation belongs to exactly one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    index: u32,
    count: u32,
}

impl Default for Shard {
    fn default() -> Self {
        Self::single()
    }
}

impl Shard {
    pub fn new(index: u32, count: u32) -> Result<Self, ShardError> {
        if count == 0 {
            return Err(ShardError::ZeroCount);
        }
        if index >= count {
            return Err(ShardError::IndexOutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    /// The only shard of an unsharded deployment.
    pub fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether `conversation_id` hashes to this shard.
    pub fn owns(&self, conversation_id: &str) -> bool {
        if self.count == 1 {
            return true;
        }
        let digest = Sha256::digest(conversation_id.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) % u64::from(self.count) == u64::from(self.index)
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

impl FromStr for Shard {
    type Err = ShardError;

    /// Parse `index/count`, e.g. `2/8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, count) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ShardError::Malformed(s.to_string()))?;
        let index = index
            .trim()
            .parse()
            .map_err(|_| ShardError::Malformed(s.to_string()))?;
        let count = count
            .trim()
            .parse()
            .map_err(|_| ShardError::Malformed(s.to_string()))?;
        Self::new(index, count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardError {
    #[error("shard must look like index/count, got {0:?}")]
    Malformed(String),

    #[error("shard count must be at least 1")]
    ZeroCount,

    #[error("shard index {index} out of range for {count} shards")]
    IndexOutOfRange { index: u32, count: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let shard: Shard = "2/8".parse().unwrap();
        assert_eq!((shard.index(), shard.count()), (2, 8));
        assert_eq!(shard.to_string(), "2/8");

        assert_eq!("8/8".parse::<Shard>(), Err(ShardError::IndexOutOfRange { index: 8, count: 8 }));
        assert_eq!("0/0".parse::<Shard>(), Err(ShardError::ZeroCount));
        assert!(matches!("three".parse::<Shard>(), Err(ShardError::Malformed(_))));
    }

    #[test]
    fn test_every_conversation_has_exactly_one_owner() {
        let shards: Vec<Shard> = (0..4).map(|i| Shard::new(i, 4).unwrap()).collect();
        for n in 0..200 {
            let id = format!("conv-{}", n);
            let owners = shards.iter().filter(|s| s.owns(&id)).count();
            assert_eq!(owners, 1, "{} owned by {} shards", id, owners);
        }
    }

    #[test]
    fn test_single_shard_owns_everything() {
        assert!(Shard::single().owns("anything"));
    }
}
