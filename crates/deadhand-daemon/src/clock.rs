//! Wall-clock helpers.
//!
//! Library crates take `now` as a parameter; only the daemon reads the clock.

use deadhand_types::SECS_PER_HOUR;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Parse a vacation end given as Unix seconds or as `+<hours>h` from `now`.
pub fn parse_instant(input: &str, now: u64) -> Option<u64> {
    if let Some(hours) = input.strip_prefix('+').and_then(|s| s.strip_suffix('h')) {
        let hours: u64 = hours.parse().ok()?;
        return now.checked_add(hours.checked_mul(SECS_PER_HOUR)?);
    }
    input.parse().ok()
}

/// Render seconds as `3d 4h 12m`.
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
