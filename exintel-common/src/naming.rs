//! Natural-key normalization
//!
//! Exchanges are matched by a case-insensitive name key, features by slug.
//! Both keys are derived here so every write path agrees on them.

/// Normalize a spreadsheet header or free-text feature name (`lowercase + trim`)
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

/// Derive a feature slug
///
/// Lowercase, replace every run of non `[a-z0-9]` characters with a single
/// `-`, then trim leading/trailing `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Case-insensitive lookup key for an exchange name
pub fn exchange_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
