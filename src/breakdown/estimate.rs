//! Time estimates attached to subtasks ("~1-2 hours", "15 minutes").

#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit {
    Hours,
    Minutes,
}

fn unit_of(word: &str) -> Option<Unit> {
    match word {
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(Unit::Hours),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(Unit::Minutes),
        _ => None,
    }
}

/// Average of `"1"`, `"1.5"` or a range such as `"1-2"`.
fn parse_amount(token: &str) -> Option<f64> {
    let mut bounds = token.split('-').filter(|p| !p.is_empty());
    let low: f64 = bounds.next()?.parse().ok()?;
    let high: f64 = match bounds.next() {
        Some(h) => h.parse().ok()?,
        None => low,
    };
    if bounds.next().is_some() {
        return None;
    }
    Some((low + high) / 2.0)
}

/// Split into runs of numeric characters and runs of letters.
fn tokens(text: &str) -> Vec<String> {
    let normalized = text.to_lowercase().replace('~', "").replace(" - ", "-").replace(" to ", "-");
    let mut out = Vec::new();
    let mut current = String::new();
    let mut numeric = false;
    for c in normalized.chars() {
        let is_num = c.is_ascii_digit() || c == '.' || c == '-';
        let is_alpha = c.is_alphabetic();
        if !(is_num || is_alpha) {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() && is_num != numeric {
            out.push(std::mem::take(&mut current));
        }
        numeric = is_num;
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Minutes described by an estimate string; 0 when nothing is recognized.
///
/// Ranges are averaged.  An hour amount wins over a minute amount in the
/// same string.
pub fn parse_estimated_time(text: &str) -> u32 {
    let tokens = tokens(text);
    let mut hours = None;
    let mut minutes = None;
    for pair in tokens.windows(2) {
        let Some(amount) = parse_amount(&pair[0]) else { continue };
        match unit_of(&pair[1]) {
            Some(Unit::Hours) if hours.is_none() => hours = Some(amount),
            Some(Unit::Minutes) if minutes.is_none() => minutes = Some(amount),
            _ => {}
        }
    }
    let total = match (hours, minutes) {
        (Some(h), _) => h * 60.0,
        (None, Some(m)) => m,
        (None, None) => 0.0,
    };
    total.round().max(0.0) as u32
}

/// Human form of a minute count: `""`, `~45 min`, `~2 hr`, `~1.5 hrs`.
pub fn format_total_time(minutes: u32) -> String {
    if minutes == 0 {
        return String::new();
    }
    if minutes < 60 {
        return format!("~{minutes} min");
    }
    if minutes % 60 == 0 {
        return format!("~{} hr", minutes / 60);
    }
    let hours = (f64::from(minutes) / 60.0 * 10.0).round() / 10.0;
    format!("~{hours} hrs")
}

/// Sum the estimates and add `buffer_percent` on top.
pub fn total_with_buffer<'a, I>(estimates: I, buffer_percent: u32) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    let sum: u32 = estimates.into_iter().map(parse_estimated_time).sum();
    (f64::from(sum) * (1.0 + f64::from(buffer_percent) / 100.0)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse_estimated_time("15 minutes"), 15);
        assert_eq!(parse_estimated_time("~1-2 hours"), 90);
        assert_eq!(parse_estimated_time("1.5 hours"), 90);
        assert_eq!(parse_estimated_time("20-30 min"), 25);
        assert_eq!(parse_estimated_time("1 - 2 hrs"), 90);
        assert_eq!(parse_estimated_time("45min"), 45);
    }

    #[test]
    fn hours_win_over_minutes() {
        assert_eq!(parse_estimated_time("1 hour 30 minutes"), 60);
    }

    #[test]
    fn unknown_is_zero() {
        assert_eq!(parse_estimated_time(""), 0);
        assert_eq!(parse_estimated_time("a while"), 0);
        assert_eq!(parse_estimated_time("15"), 0);
    }

    #[test]
    fn formats_totals() {
        assert_eq!(format_total_time(0), "");
        assert_eq!(format_total_time(45), "~45 min");
        assert_eq!(format_total_time(120), "~2 hr");
        assert_eq!(format_total_time(90), "~1.5 hrs");
        assert_eq!(format_total_time(100), "~1.7 hrs");
    }

    #[test]
    fn buffer_is_added() {
        assert_eq!(total_with_buffer(["30 minutes", "1 hour", "nonsense"], 20), 108);
        assert_eq!(total_with_buffer(["10 minutes"], 0), 10);
        assert_eq!(total_with_buffer([], 20), 0);
    }
}
