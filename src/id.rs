//! ID generation utilities for sourced
//!
//! Provides functions for generating unique identifiers for instances and
//! their generated display names.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique instance ID for the given prefix
///
/// Format: `{prefix}__{8}_{4}_{4}_{4}_{12}` (random 128 bit hex)
/// Example: `Heartbeat__1f0c2a9e_71b4_4c1d_9a7e_3b6f0e2d8c41`
pub fn generate_instance_id(prefix: &str) -> String {
    let random: u128 = rand::rng().random();
    let hex = format!("{:032x}", random);
    format!(
        "{}__{}_{}_{}_{}_{}",
        prefix,
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Generate a display name not contained in `existing`
///
/// Format: `{base} {n}` with the smallest `n >= 1` that is free.
pub fn generate_instance_name<'a>(
    base: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> String {
    let taken: std::collections::HashSet<&str> = existing.into_iter().collect();
    (1..)
        .map(|n| format!("{} {}", base, n))
        .find(|name| !taken.contains(name.as_str()))
        .unwrap_or_else(|| base.to_string())
}
