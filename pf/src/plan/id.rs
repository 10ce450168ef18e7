//! Plan, phase and step ID generation
//!
//! Format: `{kind}-{8-hex}-{slug}`, e.g. `phase-3f9a01c2-core-api`.
//! The hex part comes from the random tail of a v7 UUID so ids minted in the
//! same millisecond still differ.

const MAX_SLUG_LEN: usize = 40;

/// Generate an id for `kind` from a human title
pub fn generate_id(kind: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let tail = &uuid[uuid.len() - 8..];
    format!("{}-{}-{}", kind, tail, slugify(title))
}

/// Lowercase, hyphen-separated, apostrophes dropped
pub fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}
