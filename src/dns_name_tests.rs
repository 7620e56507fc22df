// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dns_name.rs`

#[cfg(test)]
mod tests {
    use super::super::{canonical_name, compare_names, names_equal};
    use std::cmp::Ordering;

    #[test]
    fn test_compare_equal_names() {
        assert_eq!(compare_names("example.com", "example.com"), Ordering::Equal);
    }

    #[test]
    fn test_compare_ignores_case() {
        assert_eq!(compare_names("Example.COM", "example.com"), Ordering::Equal);
        assert!(names_equal("WWW.example.org", "www.EXAMPLE.org"));
    }

    #[test]
    fn test_compare_ignores_trailing_dot() {
        assert_eq!(compare_names("example.com.", "example.com"), Ordering::Equal);
        assert!(names_equal("example.com.", "EXAMPLE.COM"));
    }

    #[test]
    fn test_parent_sorts_before_child() {
        assert_eq!(
            compare_names("example.com", "subdomain.example.com"),
            Ordering::Less
        );
        assert_eq!(
            compare_names("subdomain.example.com", "example.com"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_rightmost_label_is_most_significant() {
        // "com" < "org" decides before "zzz" vs "aaa" is looked at
        assert_eq!(compare_names("zzz.com", "aaa.org"), Ordering::Less);
        assert_eq!(
            compare_names("subdomain.example.com", "example.org"),
            Ordering::Less
        );
    }

    #[test]
    fn test_root_sorts_least() {
        assert_eq!(compare_names(".", "com"), Ordering::Less);
        assert_eq!(compare_names("", "a"), Ordering::Less);
        assert_eq!(compare_names(".", ""), Ordering::Equal);
        assert_eq!(compare_names("com", "."), Ordering::Greater);
    }

    #[test]
    fn test_label_prefix_sorts_first() {
        assert_eq!(compare_names("ab.com", "abc.com"), Ordering::Less);
        assert_eq!(compare_names("abc.com", "ab.com"), Ordering::Greater);
    }

    #[test]
    fn test_sorting_produces_dns_order() {
        let mut names = vec![
            "subdomain.example.org",
            "example.org",
            "EXAMPLE.com",
            "subdomain.example.com",
            ".",
        ];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(
            names,
            vec![
                ".",
                "EXAMPLE.com",
                "subdomain.example.com",
                "example.org",
                "subdomain.example.org",
            ]
        );
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("Example.COM."), "example.com");
        assert_eq!(canonical_name("example.com"), "example.com");
        assert_eq!(canonical_name("."), ".");
        assert_eq!(canonical_name(""), ".");
    }
}
