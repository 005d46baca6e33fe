// src/core/lock/script.rs

use sha1::{Digest, Sha1};

/// Deletes `KEYS[1]` only when its value equals `ARGV[1]`; returns the number
/// of keys removed. Runs atomically on the store.
pub const RELEASE_SCRIPT: &str = r#"if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end"#;

/// A Lua script together with the SHA1 digest the store caches it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    source: &'static str,
    sha1: String,
}

impl Script {
    pub fn new(source: &'static str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(source.as_bytes());
        Self {
            source,
            sha1: hex::encode(hasher.finalize()),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Lowercase hex digest, as accepted by `EVALSHA`.
    pub fn sha1(&self) -> &str {
        &self.sha1
    }
}
