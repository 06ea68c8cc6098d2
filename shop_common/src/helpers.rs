/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a strictly positive integer setting (minutes, seconds, connection counts).
/// Returns `None` for missing, malformed, or non-positive values.
pub fn parse_positive_int(value: Option<String>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok()).filter(|v| *v > 0)
}
