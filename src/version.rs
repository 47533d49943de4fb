//! Tolerant version comparison.
//!
//! Bucket manifests carry arbitrary upstream version strings (`1.2.3`,
//! `v1.2-beta`, `21.0_build4`), so comparison is a heuristic: split on
//! separators, take each component's leading digit run, coerce anything
//! non-numeric to zero, and compare a fixed number of components
//! lexicographically. Never panics on arbitrary input.

use std::cmp::Ordering;

/// Separators between version components.
const SEPARATORS: [char; 4] = ['.', '-', '_', '+'];

/// Number of components compared; shorter versions are right-padded with
/// zeros so `2.0` equals `2.0.0`.
const COMPONENTS: usize = 4;

fn components(version: &str) -> [u64; COMPONENTS] {
    let mut out = [0u64; COMPONENTS];
    for (i, part) in version.split(SEPARATORS).take(COMPONENTS).enumerate() {
        let digits: &str = {
            let end = part
                .char_indices()
                .find(|(_, c)| !c.is_ascii_digit())
                .map_or(part.len(), |(idx, _)| idx);
            &part[..end]
        };
        out[i] = digits.parse().unwrap_or(0);
    }
    out
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    components(a).cmp(&components(b))
}

/// Returns true if `candidate` is strictly newer than `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    compare(current, candidate) == Ordering::Less
}

/// Pick the highest version from an iterator, or `None` if it is empty.
pub fn max_of<'a>(versions: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    versions.max_by(|a, b| compare(a, b))
}
