//! Timespan parsing and formatting
//!
//! Timespans are written in prose (`5 seconds`, `1 minute and 30 seconds`,
//! `a tick`) or as a clock value (`1:30`, `01:00:00`).

use std::time::Duration;

/// Length of one host tick
pub const TICK: Duration = Duration::from_millis(50);

const UNITS: &[(&str, &str, u64)] = &[
    ("tick", "ticks", 50),
    ("millisecond", "milliseconds", 1),
    ("second", "seconds", 1_000),
    ("minute", "minutes", 60_000),
    ("hour", "hours", 3_600_000),
    ("day", "days", 86_400_000),
];

/// Parse a timespan from text
///
/// Returns `None` if any part of the text is not understood.
pub fn parse_timespan(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    if s.contains(':') {
        return parse_clock(&s);
    }

    let normalized = s.replace(',', " and ");
    let mut total = Duration::ZERO;
    for part in normalized.split(" and ") {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        total += parse_part(part)?;
    }
    Some(total)
}

fn parse_part(part: &str) -> Option<Duration> {
    let (amount, unit) = part.split_once(' ')?;
    let amount = match amount {
        "a" | "an" | "one" => 1.0,
        n => n.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)?,
    };
    let unit = unit.trim();
    let millis = UNITS
        .iter()
        .find(|(single, plural, _)| unit == *single || unit == *plural)
        .map(|(_, _, millis)| *millis)?;
    Some(Duration::from_millis((amount * millis as f64).round() as u64))
}

fn parse_clock(s: &str) -> Option<Duration> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: u64 = parts[1].parse().ok()?;
            Some(Duration::from_secs(mins * 60 + secs))
        }
        3 => {
            let hours: u64 = parts[0].parse().ok()?;
            let mins: u64 = parts[1].parse().ok()?;
            let secs: u64 = parts[2].parse().ok()?;
            Some(Duration::from_secs(hours * 3600 + mins * 60 + secs))
        }
        _ => None,
    }
}

/// Format a timespan the way scripts write it
pub fn format_timespan(duration: Duration) -> String {
    let mut remaining = duration.as_millis() as u64;
    if remaining == 0 {
        return "0 seconds".to_string();
    }

    let mut parts = Vec::new();
    for (single, plural, millis) in UNITS.iter().rev() {
        if *single == "tick" {
            continue;
        }
        let amount = remaining / millis;
        if amount > 0 {
            remaining -= amount * millis;
            let unit = if amount == 1 { single } else { plural };
            parts.push(format!("{} {}", amount, unit));
        }
    }

    match parts.len() {
        1 => parts.remove(0),
        _ => {
            let last = parts.pop().unwrap_or_default();
            format!("{} and {}", parts.join(", "), last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prose() {
        assert_eq!(parse_timespan("5 seconds"), Some(Duration::from_secs(5)));
        assert_eq!(parse_timespan("a tick"), Some(TICK));
        assert_eq!(parse_timespan("3 ticks"), Some(Duration::from_millis(150)));
        assert_eq!(
            parse_timespan("1 minute and 30 seconds"),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            parse_timespan("1 hour, 2 minutes and 3 seconds"),
            Some(Duration::from_secs(3723))
        );
        assert_eq!(parse_timespan("1.5 Minutes"), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_timespan("5:30"), Some(Duration::from_secs(330)));
        assert_eq!(parse_timespan("1:30:00"), Some(Duration::from_secs(5400)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timespan(""), None);
        assert_eq!(parse_timespan("5"), None);
        assert_eq!(parse_timespan("five seconds"), None);
        assert_eq!(parse_timespan("5 parsecs"), None);
        assert_eq!(parse_timespan("5 seconds and"), None);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_timespan(Duration::ZERO), "0 seconds");
        assert_eq!(format_timespan(Duration::from_secs(1)), "1 second");
        assert_eq!(format_timespan(Duration::from_secs(90)), "1 minute and 30 seconds");
        assert_eq!(
            format_timespan(Duration::from_millis(3_723_250)),
            "1 hour, 2 minutes, 3 seconds and 250 milliseconds"
        );
    }
}
