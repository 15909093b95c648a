//! Due dates mentioned in a task title ("call mom tomorrow", "report due friday").

use chrono::{Datelike, Days, NaiveDate, Weekday};

fn weekday(word: &str) -> Option<Weekday> {
    match word {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn amount(word: &str) -> Option<u64> {
    match word {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        _ => word.parse().ok(),
    }
}

/// Days from `today` until `target`.  `same_day_ok` decides whether today
/// itself counts or the following week is meant.
fn days_until(today: NaiveDate, target: Weekday, same_day_ok: bool) -> u64 {
    let diff = (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    if diff == 0 && !same_day_ok { 7 } else { u64::from(diff) }
}

fn match_at(words: &[String], i: usize, today: NaiveDate) -> Option<NaiveDate> {
    let word = words[i].as_str();
    let next = words.get(i + 1).map(String::as_str);

    if let Ok(date) = NaiveDate::parse_from_str(word, "%Y-%m-%d") {
        return Some(date);
    }
    match word {
        "today" | "tonight" => Some(today),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        "in" => {
            let n = amount(next?)?;
            let per_unit = match words.get(i + 2)?.as_str() {
                "day" | "days" => 1,
                "week" | "weeks" => 7,
                _ => return None,
            };
            today.checked_add_days(Days::new(n.checked_mul(per_unit)?))
        }
        "this" => {
            let wd = weekday(next?)?;
            today.checked_add_days(Days::new(days_until(today, wd, true)))
        }
        "next" => match next? {
            "week" => today.checked_add_days(Days::new(7)),
            other => {
                let wd = weekday(other)?;
                today.checked_add_days(Days::new(days_until(today, wd, false)))
            }
        },
        _ => {
            let wd = weekday(word)?;
            today.checked_add_days(Days::new(days_until(today, wd, false)))
        }
    }
}

/// First date expression found in `title`, resolved against `today`.
///
/// Bare and `next` weekdays mean the next such day strictly after today;
/// `this <weekday>` may be today.
pub fn extract_due_date(title: &str, today: NaiveDate) -> Option<NaiveDate> {
    let words: Vec<String> = title
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    (0..words.len()).find_map(|i| match_at(&words, i, today))
}
