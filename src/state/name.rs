//! Canonical snip identifiers: `Context_Type_Name_Source_vNN`.
//!
//! One identifier keys the snip file, its flipbook, its snapshot and its
//! index record, so parsing is strict and formatting is idempotent.

use crate::error::{Result, SnipError};
use std::fmt;
use std::str::FromStr;

pub const FIELD_COUNT: usize = 5;
pub const MIN_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 10;

/// The five positions of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameField {
    Context,
    Type,
    Name,
    Source,
    Version,
}

impl NameField {
    pub const ALL: [NameField; FIELD_COUNT] = [
        NameField::Context,
        NameField::Type,
        NameField::Name,
        NameField::Source,
        NameField::Version,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            NameField::Context => "Context",
            NameField::Type => "Type",
            NameField::Name => "Name",
            NameField::Source => "Source",
            NameField::Version => "Version",
        }
    }
}

impl fmt::Display for NameField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NameField {
    type Err = SnipError;

    fn from_str(s: &str) -> Result<Self> {
        NameField::ALL
            .into_iter()
            .find(|field| field.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SnipError::InvalidField {
                field: "field selector",
                value: s.to_string(),
                reason: "expected context, type, name, source or version".to_string(),
            })
    }
}

/// Parsed identifier fields, already normalized
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnipName {
    pub context: String,
    pub kind: String,
    pub name: String,
    pub source: String,
    pub version: u8,
}

impl SnipName {
    /// Normalize raw user input into a name
    pub fn new(context: &str, kind: &str, name: &str, source: &str, version: u8) -> Result<Self> {
        Ok(Self {
            context: normalize(NameField::Context, context)?,
            kind: normalize(NameField::Type, kind)?,
            name: normalize(NameField::Name, name)?,
            source: normalize(NameField::Source, source)?,
            version: check_version(version)?,
        })
    }

    /// Text of one field as it appears in the identifier
    pub fn field(&self, field: NameField) -> String {
        match field {
            NameField::Context => self.context.clone(),
            NameField::Type => self.kind.clone(),
            NameField::Name => self.name.clone(),
            NameField::Source => self.source.clone(),
            NameField::Version => format!("v{:02}", self.version),
        }
    }

    pub fn identifier(&self) -> String {
        NameField::ALL
            .iter()
            .map(|field| self.field(*field))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for SnipName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

impl FromStr for SnipName {
    type Err = SnipError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// Split an identifier into its five fields
///
/// Anything that is not exactly five non-empty, already-normalized fields
/// with a `vNN` version is rejected; nothing is repaired here.
pub fn parse(identifier: &str) -> Result<SnipName> {
    let invalid = |reason: String| SnipError::InvalidFormat {
        identifier: identifier.to_string(),
        reason,
    };

    let parts: Vec<&str> = identifier.split('_').collect();
    if parts.len() != FIELD_COUNT {
        return Err(invalid(format!("found {} fields", parts.len())));
    }

    for (field, part) in NameField::ALL.iter().zip(&parts).take(4) {
        match normalize(*field, part) {
            Ok(normalized) if normalized == *part => {}
            _ => return Err(invalid(format!("{} field '{}' is not canonical", field, part))),
        }
    }

    let version = parse_version_token(parts[4])
        .ok_or_else(|| invalid(format!("version '{}' is not v01..v{:02}", parts[4], MAX_VERSION)))?;

    Ok(SnipName {
        context: parts[0].to_string(),
        kind: parts[1].to_string(),
        name: parts[2].to_string(),
        source: parts[3].to_string(),
        version,
    })
}

/// Build an identifier from raw field values, applying each field's casing rule
pub fn format(context: &str, kind: &str, name: &str, source: &str, version: u8) -> Result<String> {
    Ok(SnipName::new(context, kind, name, source, version)?.identifier())
}

/// Replace one field of an identifier, leaving the other four untouched
pub fn rename_field(identifier: &str, field: NameField, new_value: &str) -> Result<String> {
    let mut name = parse(identifier)?;
    match field {
        NameField::Context => name.context = normalize(field, new_value)?,
        NameField::Type => name.kind = normalize(field, new_value)?,
        NameField::Name => name.name = normalize(field, new_value)?,
        NameField::Source => name.source = normalize(field, new_value)?,
        NameField::Version => name.version = parse_version_input(new_value)?,
    }
    Ok(name.identifier())
}

/// Apply a text field's casing rule
///
/// Context is upper-cased; the others become lower camel case. Anything that
/// is not ASCII alphanumeric acts as a word break and is dropped. An all-caps
/// word is folded to lower case first (`SOP` -> `sop`); mixed case inside a
/// word is kept, so `basicSetup` stays as it is.
pub fn normalize(field: NameField, raw: &str) -> Result<String> {
    let words: Vec<&str> = raw
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    if words.is_empty() {
        return Err(SnipError::InvalidField {
            field: field.label(),
            value: raw.to_string(),
            reason: "nothing left after stripping punctuation".to_string(),
        });
    }

    let normalized = match field {
        NameField::Context => words.concat().to_ascii_uppercase(),
        NameField::Version => {
            return parse_version_input(raw).map(|version| format!("v{:02}", version));
        }
        _ => words
            .iter()
            .enumerate()
            .map(|(position, word)| {
                let shouting = word.chars().any(|c| c.is_ascii_alphabetic())
                    && !word.chars().any(|c| c.is_ascii_lowercase());
                let word = if shouting {
                    word.to_ascii_lowercase()
                } else {
                    word.to_string()
                };
                let mut chars = word.chars();
                let first = chars.next().unwrap_or_default();
                let head = if position == 0 {
                    first.to_ascii_lowercase()
                } else {
                    first.to_ascii_uppercase()
                };
                std::iter::once(head).chain(chars).collect::<String>()
            })
            .collect(),
    };

    Ok(normalized)
}

/// Split a camel-case field into title-cased words (`basicSetup` -> `Basic Setup`)
pub fn display_name(field: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for c in field.chars() {
        match words.last_mut() {
            Some(word) if !c.is_ascii_uppercase() => word.push(c),
            _ => words.push(c.to_ascii_uppercase().to_string()),
        }
    }
    words.join(" ")
}

fn check_version(version: u8) -> Result<u8> {
    if (MIN_VERSION..=MAX_VERSION).contains(&version) {
        Ok(version)
    } else {
        Err(SnipError::InvalidField {
            field: "Version",
            value: version.to_string(),
            reason: format!("must be between {} and {}", MIN_VERSION, MAX_VERSION),
        })
    }
}

/// `v01`..`v10`, exactly as written in identifiers
fn parse_version_token(token: &str) -> Option<u8> {
    let digits = token.strip_prefix('v')?;
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().and_then(|version| check_version(version).ok())
}

/// Looser user input: `3`, `03`, `v3`, `V03`
fn parse_version_input(raw: &str) -> Result<u8> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed);
    let version = digits.parse::<u8>().map_err(|_| SnipError::InvalidField {
        field: "Version",
        value: raw.to_string(),
        reason: "not a number".to_string(),
    })?;
    check_version(version)
}
