//! How the cache-aside layer is allowed to use the cache.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Cache usage policy.
///
/// The per-request `use_cache` flag only controls reads. Writes after a
/// backing-store query depend on the policy alone, so with the default
/// [`CachePolicy::ReadWriteThrough`] a request that bypasses the cache still
/// refreshes the entry for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never read or write the cache.
    Disabled,
    /// Read on request, never populate.
    ReadOnly,
    /// Read on request, populate after every non-empty backing-store result.
    #[default]
    ReadWriteThrough,
}

impl CachePolicy {
    pub fn reads(self, use_cache: bool) -> bool {
        use_cache && !matches!(self, Self::Disabled)
    }

    pub fn writes(self) -> bool {
        matches!(self, Self::ReadWriteThrough)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::ReadOnly => "read_only",
            Self::ReadWriteThrough => "read_write_through",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "off" => Ok(Self::Disabled),
            "read_only" => Ok(Self::ReadOnly),
            "read_write_through" | "write_through" => Ok(Self::ReadWriteThrough),
            other => Err(format!(
                "unknown cache policy `{other}` (expected disabled, read_only or read_write_through)"
            )),
        }
    }
}
