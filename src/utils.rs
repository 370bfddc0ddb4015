use tokio::time::Duration;

/// Parses a duration string in the format "10s", "3m", "1h".
///
/// Supported units:
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
///
/// Fractional values are accepted ("0.5s").
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.len() < 2 {
        return Err(format!("Invalid duration format: '{}'", s));
    }

    let unit_char = s.chars().last().unwrap_or(' ');
    let value_str = &s[0..s.len() - 1];

    let value: f64 = value_str
        .parse()
        .map_err(|_| format!("Invalid numeric value in duration: '{}'", value_str))?;

    if !value.is_finite() || value <= 0.0 {
        return Err(format!("Duration must be positive: '{}'", s));
    }

    let secs = match unit_char {
        's' => value,
        'm' => value * 60.0,
        'h' => value * 60.0 * 60.0,
        _ => {
            return Err(format!(
                "Unknown duration unit: '{}'. Use 's', 'm', or 'h'.",
                unit_char
            ))
        }
    };

    Ok(Duration::from_secs_f64(secs))
}

/// Parses a comma-separated list of `name<separator>value` entries into
/// trimmed pairs, in one pass.
///
/// `\,` embeds a literal comma in a value, so
/// `parse_pair_list("Keep-Alive:timeout=5\\,max=200", ':')` yields a single
/// header pair. The value keeps everything after the first separator, which
/// lets header values themselves contain the separator
/// ("Authorization:Bearer a:b"). Blank entries are skipped; an entry with no
/// separator or an empty name is rejected.
pub fn parse_pair_list(input: &str, separator: char) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut entry = String::new();
    let mut escaped = false;

    for ch in input.chars() {
        match (escaped, ch) {
            (true, ',') => {
                entry.push(',');
                escaped = false;
            }
            (true, other) => {
                // Backslash only escapes a comma; anything else keeps it.
                entry.push('\\');
                entry.push(other);
                escaped = false;
            }
            (false, '\\') => escaped = true,
            (false, ',') => {
                finish_pair(&mut pairs, &entry, separator)?;
                entry.clear();
            }
            (false, other) => entry.push(other),
        }
    }
    if escaped {
        entry.push('\\');
    }
    finish_pair(&mut pairs, &entry, separator)?;

    Ok(pairs)
}

fn finish_pair(
    pairs: &mut Vec<(String, String)>,
    entry: &str,
    separator: char,
) -> Result<(), String> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Ok(());
    }
    match entry.split_once(separator) {
        Some((name, value)) if !name.trim().is_empty() => {
            pairs.push((name.trim().to_string(), value.trim().to_string()));
            Ok(())
        }
        _ => Err(format!(
            "invalid entry '{}', expected name{}value",
            entry, separator
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(
            parse_duration_string("10s").unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(
            parse_duration_string("0.5s").unwrap(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_parse_duration_minutes_and_hours() {
        assert_eq!(
            parse_duration_string("3m").unwrap(),
            Duration::from_secs(180)
        );
        assert_eq!(
            parse_duration_string("1h").unwrap(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration_string("").is_err());
        assert!(parse_duration_string("10").is_err());
        assert!(parse_duration_string("10d").is_err());
        assert!(parse_duration_string("xs").is_err());
        assert!(parse_duration_string("-5s").is_err());
        assert!(parse_duration_string("0s").is_err());
    }

    #[test]
    fn test_header_pairs() {
        let pairs = parse_pair_list(
            "Content-Type: application/json , Authorization:Bearer token",
            ':',
        )
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                pair("Content-Type", "application/json"),
                pair("Authorization", "Bearer token"),
            ]
        );
    }

    #[test]
    fn test_escaped_comma_stays_in_the_value() {
        let pairs = parse_pair_list("Keep-Alive:timeout=5\\,max=200", ':').unwrap();
        assert_eq!(pairs, vec![pair("Keep-Alive", "timeout=5,max=200")]);
    }

    #[test]
    fn test_value_may_contain_the_separator() {
        let pairs = parse_pair_list("Authorization:Bearer a:b", ':').unwrap();
        assert_eq!(pairs, vec![pair("Authorization", "Bearer a:b")]);
    }

    #[test]
    fn test_backslash_not_before_comma_is_kept() {
        let pairs = parse_pair_list("Path:C:\\Users\\test,Host:example.com", ':').unwrap();
        assert_eq!(
            pairs,
            vec![
                pair("Path", "C:\\Users\\test"),
                pair("Host", "example.com"),
            ]
        );
    }

    #[test]
    fn test_blank_entries_are_skipped() {
        let pairs = parse_pair_list("A:1, ,B:2,", ':').unwrap();
        assert_eq!(pairs, vec![pair("A", "1"), pair("B", "2")]);
    }

    #[test]
    fn test_form_field_pairs_use_the_equals_separator() {
        let pairs = parse_pair_list("user=alice,attachment=/tmp/report.pdf", '=').unwrap();
        assert_eq!(
            pairs,
            vec![
                pair("user", "alice"),
                pair("attachment", "/tmp/report.pdf"),
            ]
        );
    }

    #[test]
    fn test_entry_without_separator_is_rejected() {
        assert!(parse_pair_list("no-separator", ':').is_err());
        assert!(parse_pair_list("A:1,broken", ':').is_err());
    }

    #[test]
    fn test_entry_with_empty_name_is_rejected() {
        assert!(parse_pair_list(":value", ':').is_err());
        assert!(parse_pair_list("=value", '=').is_err());
    }
}
