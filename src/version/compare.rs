//! Total order over version strings, plus the component utilities the
//! checkers use to bias extraction toward a known version shape.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

use crate::version::processor::standardize;

static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)|([a-zA-Z]+)").unwrap());

/// Markers that make a version unstable, matched case-insensitively.
const UNSTABLE_MARKERS: &[&str] = &[
    "alpha", "beta", "rc", "preview", "dev", "test", "nightly", "snapshot", "pre", "milestone",
];

/// Compare two version strings.
///
/// Both sides are standardized first. Equal standardized strings compare
/// equal; when both parse as strict semver the semver order applies
/// (so `1.0.0-beta < 1.0.0`); otherwise the numeric components are compared
/// lexicographically with missing positions as zero, then the alphabetic
/// components, where a missing tag sorts above any present tag.
/// Empty strings sort below everything non-empty.
pub fn compare(a: &str, b: &str) -> Ordering {
    let sa = standardize(a);
    let sb = standardize(b);

    if sa == sb {
        return Ordering::Equal;
    }
    match (sa.is_empty(), sb.is_empty()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    if let (Ok(va), Ok(vb)) = (Version::parse(&sa), Version::parse(&sb)) {
        return va.cmp(&vb);
    }

    compare_components(&sa, &sb)
}

fn compare_components(a: &str, b: &str) -> Ordering {
    let (a_nums, a_tags) = extract_components(a);
    let (b_nums, b_tags) = extract_components(b);

    for i in 0..a_nums.len().max(b_nums.len()) {
        let n1 = a_nums.get(i).copied().unwrap_or(0);
        let n2 = b_nums.get(i).copied().unwrap_or(0);
        match n1.cmp(&n2) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    for i in 0..a_tags.len().max(b_tags.len()) {
        match (a_tags.get(i), b_tags.get(i)) {
            (Some(t1), Some(t2)) => match t1.cmp(t2) {
                Ordering::Equal => {}
                other => return other,
            },
            // A tag marks a pre-release; its absence sorts higher.
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => unreachable!(),
        }
    }

    Ordering::Equal
}

/// Split a version string into its numeric components and its lowercased
/// alphabetic runs, in order of appearance.
pub fn extract_components(version: &str) -> (Vec<u64>, Vec<String>) {
    let mut numbers = Vec::new();
    let mut tags = Vec::new();
    for caps in COMPONENT.captures_iter(version) {
        if let Some(num) = caps.get(1) {
            if let Ok(n) = num.as_str().parse::<u64>() {
                numbers.push(n);
            }
        } else if let Some(tag) = caps.get(2) {
            tags.push(tag.as_str().to_ascii_lowercase());
        }
    }
    (numbers, tags)
}

/// Whether a version carries no pre-release marker.
pub fn is_stable(version: &str) -> bool {
    let lower = version.to_ascii_lowercase();
    !UNSTABLE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Derive the dotted reference template for a version: `1.2.3` becomes
/// `a.b.c`. The template is capped at four components and is used to bias
/// context-based extraction toward versions of the same shape.
pub fn generate_version_ref(version: &str) -> String {
    let standardized = standardize(version);
    let source = if standardized.is_empty() {
        version
    } else {
        &standardized
    };
    let (numbers, _) = extract_components(source);
    match numbers.len() {
        0 => version.to_string(),
        n => ["a", "a.b", "a.b.c", "a.b.c.d"][n.min(4) - 1].to_string(),
    }
}

/// Standardize an upstream version and decide whether it should replace the
/// recorded reference: returns the standardized version and `true` when it
/// is greater than or equal to `version_ref` (or when no reference exists).
pub fn parse_and_compare(upstream: &str, version_ref: &str) -> (String, bool) {
    let standardized = standardize(upstream);
    if version_ref.is_empty() {
        return (standardized, true);
    }
    let should_update = compare(&standardized, version_ref) != Ordering::Less;
    (standardized, should_update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.10", "1.2.9", Ordering::Greater)]
    #[case("1.0.0-beta", "1.0.0", Ordering::Less)]
    #[case("Alpha0.10.1", "Alpha0.10.1", Ordering::Equal)]
    #[case("2.0.0", "1.9.9", Ordering::Greater)]
    #[case("1.2", "1.2.0", Ordering::Equal)]
    #[case("1.2", "1.3", Ordering::Less)]
    #[case("v1.4.2", "1.4.2", Ordering::Equal)]
    #[case("", "0.0.1", Ordering::Less)]
    #[case("1.10.12.394.001", "1.10.12.394.1", Ordering::Equal)]
    #[case("1.2.3", "1.2.3-beta", Ordering::Greater)]
    fn compare_orders_versions(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare(a, b), expected);
    }

    #[rstest]
    #[case("1.2.3", "3.4.5")]
    #[case("1.0.0-beta", "1.0.0")]
    #[case("2.1", "2.1.0")]
    #[case("Alpha0.10.1", "Beta0.10.1")]
    fn compare_is_antisymmetric(#[case] a: &str, #[case] b: &str) {
        assert_eq!(compare(a, b), compare(b, a).reverse());
    }

    #[test]
    fn compare_is_transitive_over_a_sorted_chain() {
        let chain = ["1.0.0-beta", "1.0.0", "1.0.1", "1.2", "1.2.9", "1.2.10", "2.0.0"];
        for window in chain.windows(2) {
            assert_eq!(
                compare(window[0], window[1]),
                Ordering::Less,
                "{} should sort below {}",
                window[0],
                window[1]
            );
        }
        assert_eq!(compare(chain[0], chain[chain.len() - 1]), Ordering::Less);
    }

    #[rstest]
    #[case("1", "a")]
    #[case("1.2", "a.b")]
    #[case("1.2.3", "a.b.c")]
    #[case("1.2.3.4", "a.b.c.d")]
    #[case("1.10.12.394.001", "a.b.c.d")]
    #[case("v2.0.1", "a.b.c")]
    fn generate_version_ref_matches_component_count(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(generate_version_ref(input), expected);
    }

    #[test]
    fn extract_components_splits_numbers_and_tags() {
        let (nums, tags) = extract_components("Alpha0.10.1");
        assert_eq!(nums, vec![0, 10, 1]);
        assert_eq!(tags, vec!["alpha".to_string()]);
    }

    #[rstest]
    #[case("1.2.3", true)]
    #[case("1.0.0-beta", false)]
    #[case("2.0.0-rc1", false)]
    #[case("3.1.4-nightly", false)]
    fn is_stable_detects_markers(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(is_stable(version), expected);
    }

    #[test]
    fn parse_and_compare_without_reference_always_updates() {
        let (version, update) = parse_and_compare("v1.4.2", "");
        assert_eq!(version, "1.4.2");
        assert!(update);
    }

    #[test]
    fn parse_and_compare_respects_the_reference() {
        let (_, update) = parse_and_compare("2.0.0", "1.9.0");
        assert!(update);
        let (_, update) = parse_and_compare("1.8.0", "1.9.0");
        assert!(!update);
    }
}
