//! `Cache-Control` directive parsing.
//!
//! Parsing is total: any input string yields a directive map without
//! erroring. Malformed numeric values collapse to `0`, which biases every
//! bad directive toward "not fresh" instead of accidental caching.

use std::collections::HashMap;

/// Flag directives that map to presence (no value).
const FLAG_DIRECTIVES: &[&str] = &[
    "public",
    "private",
    "no-cache",
    "no-store",
    "no-transform",
    "must-revalidate",
    "proxy-revalidate",
    "only-if-cached",
];

/// Directives that carry a non-negative integer number of seconds.
const NUMERIC_DIRECTIVES: &[&str] = &[
    "max-age",
    "s-maxage",
    "max-stale",
    "min-fresh",
    "stale-while-revalidate",
    "stale-if-error",
];

/// A single parsed directive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// A boolean directive such as `public` or `no-store`.
    Flag,
    /// A numeric directive such as `max-age=60`. Malformed, negative,
    /// non-integer, or value-less occurrences carry `0`.
    Seconds(u64),
}

/// A parsed `Cache-Control` directive map.
///
/// # Examples
///
/// ```
/// use cachet::cache::Directives;
///
/// let d = Directives::parse("public, max-age=3600, no-transform");
/// assert!(d.contains("public"));
/// assert_eq!(d.seconds("max-age"), Some(3600));
///
/// // malformed numerics are present with 0, never dropped
/// let d = Directives::parse("max-age=potato");
/// assert_eq!(d.seconds("max-age"), Some(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    map: HashMap<String, Directive>,
}

impl Directives {
    /// Parses a `Cache-Control` header value.
    ///
    /// Splits on commas, trims each token, and splits each token on the
    /// first `=`. Names are matched case-insensitively against the known
    /// flag and numeric directive tables; unknown names are dropped. When a
    /// directive repeats, the first occurrence wins.
    pub fn parse(header: &str) -> Self {
        let mut map = HashMap::new();

        for token in header.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name.trim().to_ascii_lowercase(), Some(value.trim())),
                None => (token.to_ascii_lowercase(), None),
            };

            if FLAG_DIRECTIVES.contains(&name.as_str()) {
                map.entry(name).or_insert(Directive::Flag);
            } else if NUMERIC_DIRECTIVES.contains(&name.as_str()) {
                // u64 parsing rejects negatives, floats, and garbage alike.
                let seconds = value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
                map.entry(name).or_insert(Directive::Seconds(seconds));
            }
        }

        Self { map }
    }

    /// Returns `true` if the directive is present (flag or numeric).
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Returns the value of a numeric directive, or `None` when absent or
    /// when the name is a flag directive.
    pub fn seconds(&self, name: &str) -> Option<u64> {
        match self.map.get(name) {
            Some(Directive::Seconds(secs)) => Some(*secs),
            _ => None,
        }
    }

    /// Returns `true` if no directives were parsed.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of parsed directives.
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_numerics_mix() {
        let d = Directives::parse("public, max-age=3600, no-transform");
        assert!(d.contains("public"));
        assert!(d.contains("no-transform"));
        assert_eq!(d.seconds("max-age"), Some(3600));
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn private_no_cache_max_stale() {
        let d = Directives::parse("private, no-cache, max-stale=120");
        assert!(d.contains("private"));
        assert!(d.contains("no-cache"));
        assert_eq!(d.seconds("max-stale"), Some(120));
    }

    #[test]
    fn lone_no_store() {
        let d = Directives::parse("no-store");
        assert!(d.contains("no-store"));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn explicit_zero() {
        let d = Directives::parse("max-age=0");
        assert_eq!(d.seconds("max-age"), Some(0));
    }

    #[test]
    fn empty_input_is_empty_map() {
        assert!(Directives::parse("").is_empty());
        assert!(Directives::parse("  ,  , ").is_empty());
    }

    #[test]
    fn invalid_numeric_value_yields_zero() {
        let d = Directives::parse("max-age=invalid");
        assert_eq!(d.seconds("max-age"), Some(0));
    }

    #[test]
    fn negative_value_yields_zero() {
        let d = Directives::parse("max-age=-400");
        assert_eq!(d.seconds("max-age"), Some(0));
    }

    #[test]
    fn non_integer_value_yields_zero() {
        let d = Directives::parse("max-age=145.0");
        assert_eq!(d.seconds("max-age"), Some(0));
    }

    #[test]
    fn bare_numeric_directive_yields_zero() {
        let d = Directives::parse("max-age");
        assert_eq!(d.seconds("max-age"), Some(0));
    }

    #[test]
    fn unknown_directives_dropped() {
        let d = Directives::parse("immutable, x-extension=1, max-age=5");
        assert!(!d.contains("immutable"));
        assert!(!d.contains("x-extension"));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn names_are_case_insensitive() {
        let d = Directives::parse("Public, MAX-AGE=60");
        assert!(d.contains("public"));
        assert_eq!(d.seconds("max-age"), Some(60));
    }

    #[test]
    fn repeated_directive_first_occurrence_wins() {
        let d = Directives::parse("max-age=10, max-age=99");
        assert_eq!(d.seconds("max-age"), Some(10));
    }

    #[test]
    fn flag_directive_never_reports_seconds() {
        let d = Directives::parse("public");
        assert_eq!(d.seconds("public"), None);
    }
}
