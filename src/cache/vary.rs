//! Content-negotiation normalizers and variant key derivation.
//!
//! A response's `Vary` header names the request headers whose values pick
//! the stored representation. Raw header values make poor key material
//! (`gzip` and `gzip, br` should share one entry when only gzip is
//! supported), so each varied header can be paired with a *normalizer*
//! that collapses equivalent requests onto one canonical value.
//!
//! Two built-in normalizer families cover the common cases:
//!
//! - [`exact`] — first listed token that exactly matches a supported value;
//!   quality parameters are ignored.
//! - [`weighted`] — RFC 9110 quality-value negotiation with wildcard
//!   support and deterministic tie-breaking.
//!
//! Both are total: malformed input never errors, it just fails to match.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::Headers;

/// A per-header normalizer: maps a raw request header value to a canonical
/// negotiated value, or `None` when nothing acceptable is offered.
pub type Normalizer = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds an exact-match normalizer over an ordered list of supported values.
///
/// The raw value is split on commas; each token is trimmed and anything
/// from the first `;` onward is discarded (quality parameters carry no
/// weight here). The first token exactly matching a supported value wins.
/// The literal token `*` is compared as an ordinary string, never as a
/// match-all.
///
/// # Examples
///
/// ```
/// use cachet::cache::vary;
///
/// let n = vary::exact(&["gzip"]);
/// assert_eq!(n("gzip, br"), Some("gzip".to_owned()));
/// assert_eq!(n("br, zstd"), None);
/// ```
pub fn exact(supported: &[&str]) -> Normalizer {
    let supported: Vec<String> = supported.iter().map(|s| (*s).to_owned()).collect();
    Arc::new(move |raw: &str| {
        raw.split(',').find_map(|token| {
            let value = token.trim().split(';').next().unwrap_or("").trim();
            supported.iter().find(|s| s.as_str() == value).cloned()
        })
    })
}

/// Builds a quality-weighted normalizer over an ordered list of supported values.
///
/// The raw value is split on commas into `value;param;param...` entries.
/// Entries whose value is neither supported nor the literal `*` are
/// discarded. Each entry's weight is the numeric value of its `q` parameter
/// (case-insensitive); an absent, value-less, or unparsable `q` defaults to
/// `1.0`. A `*` entry contributes one implicit candidate per supported
/// value lacking an explicit entry, at the wildcard's weight, ranked after
/// every explicit entry in supported-list order. The winner is the
/// candidate with the maximum weight; ties resolve to the earliest rank.
///
/// # Examples
///
/// ```
/// use cachet::cache::vary;
///
/// let n = vary::weighted(&["gzip", "br"]);
/// assert_eq!(n("br;q=0.9, gzip;q=0.2"), Some("br".to_owned()));
/// assert_eq!(n("*;q=0.5"), Some("gzip".to_owned()));
/// assert_eq!(n("zstd"), None);
/// ```
pub fn weighted(supported: &[&str]) -> Normalizer {
    let supported: Vec<String> = supported.iter().map(|s| (*s).to_owned()).collect();
    Arc::new(move |raw: &str| {
        // Candidates in rank order: explicit entries first, then wildcard
        // expansions in supported-list order.
        let mut candidates: Vec<(String, f64)> = Vec::new();
        let mut wildcard: Option<f64> = None;

        for entry in raw.split(',') {
            let mut parts = entry.split(';');
            let value = parts.next().unwrap_or("").trim();
            let weight = quality(parts);

            if value == "*" {
                if wildcard.is_none() {
                    wildcard = Some(weight);
                }
            } else if supported.iter().any(|s| s == value) {
                candidates.push((value.to_owned(), weight));
            }
        }

        if let Some(weight) = wildcard {
            for value in &supported {
                if !candidates.iter().any(|(v, _)| v == value) {
                    candidates.push((value.clone(), weight));
                }
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for (rank, (_, weight)) in candidates.iter().enumerate() {
            if best.is_none_or(|(_, w)| *weight > w) {
                best = Some((rank, *weight));
            }
        }
        best.map(|(rank, _)| candidates[rank].0.clone())
    })
}

/// Extracts the `q` parameter weight from an entry's parameter list,
/// defaulting to `1.0` for absent, value-less, or unparsable weights.
fn quality<'a>(params: impl Iterator<Item = &'a str>) -> f64 {
    for param in params {
        let (name, value) = match param.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (param.trim(), None),
        };
        if name.eq_ignore_ascii_case("q") {
            return value.and_then(|v| v.parse::<f64>().ok()).unwrap_or(1.0);
        }
    }
    1.0
}

/// Registry of per-header normalizers plus variant key derivation.
///
/// Header names are stored lowercase. Headers named in `Vary` without a
/// registered normalizer fall back to the raw trimmed lowercased request
/// value, so unanticipated `Vary` headers still partition the cache
/// correctly — just without deduplication.
#[derive(Clone, Default)]
pub struct VaryNegotiator {
    normalizers: HashMap<String, Normalizer>,
}

impl VaryNegotiator {
    /// Creates a negotiator with no registered normalizers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a normalizer for a header name (stored lowercase).
    pub fn register(&mut self, header: impl Into<String>, normalizer: Normalizer) {
        self.normalizers
            .insert(header.into().to_ascii_lowercase(), normalizer);
    }

    /// Splits a `Vary` header value into lowercase header names,
    /// preserving declaration order.
    pub fn parse_vary(header: &str) -> Vec<String> {
        header
            .split(',')
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Derives the secondary (variant) key for a request against a recorded
    /// set of varied header names.
    ///
    /// Each name contributes one line: `name=value` for a negotiated or raw
    /// value, bare `name` when nothing matched or the request lacks the
    /// header. The bare form is distinct from `name=`, so "no match" never
    /// collides with an empty header value.
    pub fn variant_key(&self, vary: &[String], request_headers: &Headers) -> String {
        let mut parts = Vec::with_capacity(vary.len());
        for name in vary {
            let negotiated = match self.normalizers.get(name) {
                Some(normalize) => normalize(request_headers.get(name).unwrap_or("")),
                None => request_headers
                    .get(name)
                    .map(|v| v.trim().to_ascii_lowercase()),
            };
            match negotiated {
                Some(value) => parts.push(format!("{name}={value}")),
                None => parts.push(name.clone()),
            }
        }
        parts.join("\n")
    }
}
