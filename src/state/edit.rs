/// Description edits for snip records
///
/// A record's summary is free text written by the user. Its keywords are
/// derived from that summary plus the identifier fields, so every summary
/// change regenerates them.

use crate::state::data::SnipRecord;
use crate::state::name::{self, SnipName};
use chrono::{DateTime, Local};
use std::collections::BTreeSet;

/// Summary words shorter than this are not keywords
const MIN_KEYWORD_LEN: usize = 4;

/// Build the keyword list for a snip
///
/// Lower-cased summary words longer than three characters, plus the
/// lower-cased Context, Type, Name and Source fields. Sorted, no duplicates.
pub fn generate_keywords(summary: &str, name: &SnipName) -> Vec<String> {
    let mut keywords = summary_words(summary);
    for field in [&name.context, &name.kind, &name.name, &name.source] {
        keywords.insert(field.to_lowercase());
    }

    keywords.into_iter().collect()
}

/// Keywords for a record, falling back to summary words alone when the
/// identifier does not parse
pub fn keywords_for(summary: &str, identifier: &str) -> Vec<String> {
    match name::parse(identifier) {
        Ok(parsed) => generate_keywords(summary, &parsed),
        Err(_) => summary_words(summary).into_iter().collect(),
    }
}

fn summary_words(summary: &str) -> BTreeSet<String> {
    summary
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_string)
        .collect()
}

/// Replace a record's summary and regenerate its keywords
pub fn apply_summary(record: &mut SnipRecord, summary: &str) {
    record.summary = summary.trim().to_string();
    record.keywords = keywords_for(&record.summary, &record.identifier);
}

/// `(date, time)` strings as stored in the index
pub fn timestamp(now: DateTime<Local>) -> (String, String) {
    (
        now.format("%Y-%m-%d").to_string(),
        now.format("%H:%M:%S").to_string(),
    )
}
