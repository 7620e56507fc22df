// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS name ordering.
//!
//! Zones are sorted, searched and paged in DNS order: names are compared
//! label by label starting from the rightmost (most significant) label, and
//! labels are compared case-insensitively. The root name has no labels and
//! therefore sorts before every other name.
//!
//! ```text
//! .                        (root)
//! com
//! example.com
//! subdomain.example.com
//! example.org
//! ```

use std::cmp::Ordering;

/// Compare two DNS names in DNS order.
///
/// A trailing dot is ignored, so `example.com.` and `example.com` are equal.
/// When one name is a suffix of the other, the shorter name sorts first.
///
/// # Example
///
/// ```rust
/// use std::cmp::Ordering;
/// use zone_inventory::dns_name::compare_names;
///
/// assert_eq!(compare_names("example.com", "sub.example.com"), Ordering::Less);
/// assert_eq!(compare_names("zzz.com", "example.org"), Ordering::Less);
/// assert_eq!(compare_names("EXAMPLE.com.", "example.COM"), Ordering::Equal);
/// ```
#[must_use]
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let mut left = labels(a);
    let mut right = labels(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match compare_labels(l, r) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

/// Check whether two DNS names are equal, ignoring case and a trailing dot.
#[must_use]
pub fn names_equal(a: &str, b: &str) -> bool {
    compare_names(a, b) == Ordering::Equal
}

/// Return the canonical form of a name: lowercase without the trailing dot.
///
/// The root name canonicalizes to `"."`.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    let trimmed = trim_root(name);
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// Iterate over the labels of a name from right to left.
fn labels(name: &str) -> impl Iterator<Item = &str> {
    let trimmed = trim_root(name);
    // An empty string has no labels; `rsplit` would otherwise yield one empty label.
    trimmed
        .rsplit('.')
        .take(if trimmed.is_empty() { 0 } else { usize::MAX })
}

fn trim_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

#[cfg(test)]
#[path = "dns_name_tests.rs"]
mod dns_name_tests;
