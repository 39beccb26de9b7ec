use std::str::FromStr;
use std::time::Duration;

/// Parses a duration string such as "250ms", "1s", "10m", "5h" or "3d".
///
/// Supported units:
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    // "ms" has to be checked before "m" and "s".
    let (value_str, unit) = if let Some(value) = s.strip_suffix("ms") {
        (value, "ms")
    } else {
        let split_at = s
            .char_indices()
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or_default();
        (&s[..split_at], &s[split_at..])
    };

    if !matches!(unit, "ms" | "s" | "m" | "h" | "d") {
        return Err(format!(
            "Unknown duration unit: '{}'. Use 'ms', 's', 'm', 'h', or 'd'.",
            unit
        ));
    }

    let value = u64::from_str(value_str)
        .map_err(|_| format!("Invalid numeric value in duration: '{}'", value_str))?;

    let seconds_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => 24 * 60 * 60,
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration '{}' is too large", s))
}

/// Parses a boolean flag the way environment switches are usually written.
///
/// Accepts `true`/`false`, `1`/`0` and `yes`/`no`, case-insensitive.
pub fn parse_bool_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(format!("Expected true or false, got '{}'", other)),
    }
}

/// Parses a ratio in the closed range `[0.0, 1.0]`.
pub fn parse_ratio(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid ratio: '{}'", s.trim()))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!("Ratio must be between 0.0 and 1.0, got {}", value));
    }

    Ok(value)
}

/// Parses a comma-separated header string with support for escaped commas.
///
/// Use `\,` to include a literal comma in a header value.
/// Example: "Authorization:Bearer abc,Accept:text/html\,application/json"
pub fn parse_headers_with_escapes(headers_str: &str) -> Vec<String> {
    let mut headers = Vec::new();
    let mut current_header = String::new();
    let mut chars = headers_str.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&',') => {
                current_header.push(',');
                chars.next();
            }
            ',' => {
                if current_header.trim().is_empty() {
                    current_header.clear();
                } else {
                    headers.push(std::mem::take(&mut current_header));
                }
            }
            _ => current_header.push(ch),
        }
    }

    if !current_header.trim().is_empty() {
        headers.push(current_header);
    }

    headers
}
