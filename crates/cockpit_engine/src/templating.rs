//! Date templates: `{today}`, `{today-N}`, `{today+N}`, resolved lazily at
//! task execution time, never at schedule authoring.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static TODAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{today([+-]\d+)?\}").expect("today template regex"));

pub fn resolve_date_templates(input: &str, today: NaiveDate) -> String {
    TODAY_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let offset: i64 = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            (today + chrono::Duration::days(offset))
                .format("%Y-%m-%d")
                .to_string()
        })
        .into_owned()
}
