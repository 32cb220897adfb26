//! Literal parsers for the built-in types

/// Decimal number such as `5`, `-2` or `0.25`
pub fn parse_number(s: &str) -> Option<f64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut dots = 0;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' => dots += 1,
            _ => return None,
        }
    }
    if !seen_digit || dots > 1 || digits.starts_with('.') || digits.ends_with('.') {
        return None;
    }
    s.parse().ok()
}

pub fn parse_boolean(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Quoted text without interpolation
///
/// `""` stands for a quote and `%%` for a percent sign. A single `%`
/// means the text is interpolated and therefore not a literal.
pub fn parse_text(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' | '%' => {
                if chars.peek() == Some(&c) {
                    chars.next();
                    out.push(c);
                } else {
                    return None;
                }
            }
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Render text as a literal that [`parse_text`] accepts
pub fn quote_text(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\"").replace('%', "%%"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("5"), Some(5.0));
        assert_eq!(parse_number("-2.5"), Some(-2.5));
        assert_eq!(parse_number("1e5"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("5."), None);
        assert_eq!(parse_number("{x}"), None);
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(parse_boolean("TRUE"), Some(true));
        assert_eq!(parse_boolean("off"), Some(false));
        assert_eq!(parse_boolean("maybe"), None);
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(parse_text("\"hello\""), Some("hello".to_string()));
        assert_eq!(
            parse_text("\"say \"\"hi\"\"\""),
            Some("say \"hi\"".to_string())
        );
        assert_eq!(parse_text("\"100%%\""), Some("100%".to_string()));
        assert_eq!(parse_text("\"hi %{_name}%\""), None);
        assert_eq!(parse_text("\"a\" and \"b\""), None);
        assert_eq!(parse_text("hello"), None);
        assert_eq!(parse_text("\""), None);
    }

    #[test]
    fn test_quote_text_round_trips() {
        let text = "50% \"off\"";
        assert_eq!(parse_text(&quote_text(text)), Some(text.to_string()));
    }
}
