//! Common helper functions for CineSync.

pub const MIN_ROOM_WIDTH: u32 = 320;
pub const MAX_ROOM_WIDTH: u32 = 3840;
pub const MIN_ROOM_HEIGHT: u32 = 180;
pub const MAX_ROOM_HEIGHT: u32 = 2160;

/// Clamp a room layout to the range every client can display.
pub fn clamp_room_size(width: i64, height: i64) -> (u32, u32) {
    let w = width.clamp(MIN_ROOM_WIDTH as i64, MAX_ROOM_WIDTH as i64) as u32;
    let h = height.clamp(MIN_ROOM_HEIGHT as i64, MAX_ROOM_HEIGHT as i64) as u32;
    (w, h)
}

/// Extract the digits following `key=` in free text, e.g. `"current=4 peak=9"`.
///
/// Matching is ASCII case-insensitive and tolerates junk around the pair.
/// Returns `None` when the key is missing or not followed by digits.
pub fn parse_keyed_digits(text: &str, key: &str) -> Option<u32> {
    let needle = format!("{}=", key.to_ascii_lowercase());
    let haystack = text.to_ascii_lowercase();

    let mut search_from = 0;
    while let Some(rel) = haystack[search_from..].find(&needle) {
        let start = search_from + rel;
        let preceded_by_word = haystack[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let value_start = start + needle.len();
        if !preceded_by_word {
            let digits: String = haystack[value_start..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                return digits.parse::<u32>().ok();
            }
        }
        search_from = value_start;
    }
    None
}

pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
