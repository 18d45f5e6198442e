//! Model file fingerprints.
//!
//! A fingerprint identifies the content of a model file regardless of comments, blank lines
//! and spacing, so that reformatting a model does not invalidate its mapping. New mappings
//! carry `xxh3:` fingerprints. Mappings written by the older generator carry a bare MD5 hex
//! digest of the same normalized text; those are still recognized and compared.

use md5::{Digest, Md5};
use xxhash_rust::xxh3::xxh3_64;

/// Prefix of the fingerprints produced by this module.
pub const PREFIX: &str = "xxh3:";

/// Hash functions a fingerprint may have been computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// `xxh3:` followed by 16 hex digits.
    Xxh3,
    /// 32 hex digits, as written by the older generator.
    Md5,
}

impl Algorithm {
    /// Detects the algorithm of a fingerprint, or [`None`] if the format is not recognized.
    pub fn of(fingerprint: &str) -> Option<Self> {
        let is_hex = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit());
        match fingerprint.strip_prefix(PREFIX) {
            Some(digest) if is_hex(digest, 16) => Some(Self::Xxh3),
            Some(_) => None,
            None if is_hex(fingerprint, 32) => Some(Self::Md5),
            None => None,
        }
    }

    /// Returns the fingerprint of model text computed with this algorithm.
    pub fn fingerprint(self, text: &str) -> String {
        let normalized = normalize(text);
        match self {
            Self::Xxh3 => format!("{PREFIX}{:016x}", xxh3_64(normalized.as_bytes())),
            Self::Md5 => format!("{:x}", Md5::digest(normalized.as_bytes())),
        }
    }
}

/// Normalizes model text: comment (`;`) and blank lines are dropped, and runs of whitespace
/// are collapsed into a single space.
fn normalize(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(';'))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns the fingerprint of model text.
pub fn of_str(text: &str) -> String {
    Algorithm::Xxh3.fingerprint(text)
}

/// Returns `true` if `fingerprint` is in a format this module can recompute.
#[inline]
pub fn is_comparable(fingerprint: &str) -> bool {
    Algorithm::of(fingerprint).is_some()
}

/// Recomputes `expected` over model text with the same algorithm.
///
/// Returns the recomputed fingerprint and whether it matches, or [`None`] if the format of
/// `expected` is not recognized.
pub fn compare(expected: &str, text: &str) -> Option<(String, bool)> {
    let actual = Algorithm::of(expected)?.fingerprint(text);
    let matches = actual.eq_ignore_ascii_case(expected);
    Some((actual, matches))
}
