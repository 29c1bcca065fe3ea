//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for RuleWall.
//!
//! All magic numbers used by the matchers, caches and rate counter are
//! defined here with their purpose and usage context.

// ============================================================================
// Fragment Cache Constants
// ============================================================================

/// Default TTL for parsed rule fragments (IP lists, UA lists, regexes).
///
/// Fragments are pure functions of their source string, so the TTL only
/// bounds memory held by lists that are no longer referenced by any rule.
pub const DEFAULT_FRAGMENT_TTL_SECS: u64 = 600;

/// Default maximum number of entries in a single fragment cache.
///
/// When the cache is full and nothing has expired, values are computed
/// directly without being stored.
pub const DEFAULT_FRAGMENT_CAPACITY: usize = 10_000;

/// TTL for IP-list files loaded by `IpInFile` (15 minutes).
///
/// A file is read from disk at most once per window.
pub const DEFAULT_IP_FILE_TTL_SECS: u64 = 15 * 60;

/// Retry interval after an `IpInFile` read failure (seconds).
///
/// Capped by the IP file TTL.
pub const IP_FILE_RETRY_SECS: u64 = 30;

// ============================================================================
// Regex Guard Constants
// ============================================================================

/// Maximum compiled size of a rule regex (bytes).
///
/// Patterns that exceed this limit fail to compile and never match.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Maximum DFA cache size per rule regex (bytes).
pub const DEFAULT_REGEX_DFA_SIZE_LIMIT: usize = 2 << 20;

/// Maximum subject length fed to a rule regex.
///
/// Longer subjects are treated as a non-match. Matching is linear in the
/// subject length, so this bounds the time spent per leaf.
pub const DEFAULT_REGEX_MAX_INPUT_LEN: usize = 8 * 1024;

// ============================================================================
// Rate Counter Constants
// ============================================================================

/// Default rate counter window (1 minute).
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

/// Default per-window request count above which a warning is logged.
pub const DEFAULT_RATE_ALERT_THRESHOLD: u64 = 600;

/// Key prefix for per-IP rate counters in the cache provider.
pub const RATE_COUNTER_KEY_PREFIX: &str = "rulewall:rate:";

// ============================================================================
// Hot Reload Constants
// ============================================================================

/// Number of configuration change records kept in memory.
pub const DEFAULT_CONFIG_HISTORY_SIZE: usize = 100;

/// Delimiters accepted between entries of IP and user-agent lists.
pub const LIST_DELIMITERS: [char; 2] = [',', ';'];
