//! Cache entry types shared by both tiers.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// The tier an entry lives in. Entries are owned exclusively by their tier;
/// values propagate between tiers by value, never as a shared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Memory,
    Distributed,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Memory => "memory",
            CacheTier::Distributed => "distributed",
        }
    }
}

/// A stored value with its expiry. The key is the map key of the owning tier.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub tier: CacheTier,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn new(value: Value, tier: CacheTier, ttl: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            value,
            tier,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Entries at or past their expiry are treated as absent everywhere.
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_entry_is_not_expired() {
        let entry = CacheEntry::new(json!("v"), CacheTier::Memory, Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert!(entry.expires_at > entry.created_at);
        assert_eq!(entry.tier, CacheTier::Memory);
    }

    #[test]
    fn zero_ttl_entry_is_expired() {
        let entry = CacheEntry::new(json!("v"), CacheTier::Memory, Duration::ZERO);
        assert!(entry.is_expired());
    }

    #[test]
    fn tier_names() {
        assert_eq!(CacheTier::Memory.as_str(), "memory");
        assert_eq!(CacheTier::Distributed.as_str(), "distributed");
    }
}
