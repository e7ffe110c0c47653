//! Standardization of raw upstream version strings.
//!
//! The entry points are [`standardize`], which keeps pre-release markers, and
//! [`clean`], which additionally applies the caller's pre-release policy.
//! Both return an empty string when the input cannot plausibly be a version
//! (a bare URL, an `IPv6`-style protocol token, a digit with no dots).

use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use tracing::debug;

/// Letter-prefixed version such as `Alpha0.10.1` or `V2.1`.
static ALPHA_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)(\d+(?:\.\d+)*)$").unwrap());

/// Hyphen-joined double version such as `5.8-5.3.14`.
static HYPHEN_JOINED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+-\d+\.\d+\.\d+$").unwrap());

/// Five-part version such as `1.10.12.394.001`.
static FIVE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+\.\d+$").unwrap());

static TWO_PART: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+$").unwrap());

static MAIN_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)").unwrap());

/// Anchored semantic-version shape, with an optional `v` prefix.
static SEMVER_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v?(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .unwrap()
});

/// Common tag prefixes stripped during the fallback path, anchored and
/// case-insensitive. Order matters: longer prefixes first.
static PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"^release[_-]", r"^version[_-]", r"^ver[_-]?", r"^v", r"^r"]
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
        .collect()
});

/// Tail-anchored platform, architecture, bitness and packaging suffixes.
/// Applied repeatedly so compound tails like `-ubuntu-amd64` fall off one
/// token at a time.
static PLATFORM_TAILS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[._-](linux|windows|win\d{2}|win|mac|macos|osx|darwin|android|ios|ubuntu|debian|fedora|centos|redhat|opensuse|arch|gentoo|mint)$",
        r"[._-](x86_64|x86-64|amd64|aarch64|arm64|arm\d*|x64|x86|i386|i686)$",
        r"[._-](32bit|64bit)$",
        r"[._-](bin|exe|dmg|pkg|deb|rpm|apk|msi|appimage|tar\.gz|zip)$",
        r"[._-](signed|unsigned)$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

/// Tail-anchored pre-release markers, optionally numbered (`-rc2`, `-beta.1`).
static TEST_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[._-](stable|beta|alpha|rc|nightly|preview|pre|dev|test|snapshot|milestone|m)(?:[._-]?\d+)*$",
    )
    .unwrap()
});

/// Ranked fallback patterns, most specific first. The first capture of the
/// first matching pattern wins.
static FALLBACK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+\.\d+\.\d+\.\d+[A-Z]+(?:\.[A-Z0-9]+)?)",
        r"(\d+\.\d+\.\d+\.\d+\.\d+)",
        r"(\d+\.\d+\.\d+\.\d+-\d+)",
        r"(\d+\.\d+\.\d+\.\d+)",
        r"(\d+\.\d+\.\d+-\d+)",
        r"(\d+\.\d+\.\d+)",
        r"(\d+\.\d+-\d+)",
        r"(\d+\.\d+)",
        r"[a-zA-Z-]+-(\d+(?:\.\d+)+)",
        r"[a-zA-Z]+(\d+(?:\.\d+)+)",
        r"(\d+(?:\.\d+)+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// How [`clean_tail`] treats pre-release markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestPolicy {
    /// Leave markers in place (standardization keeps `1.0.0-beta` intact).
    Keep,
    /// Strip markers from the tail.
    Strip,
    /// Reject the whole version when a marker is present.
    Reject,
}

/// Standardize a raw version string, keeping pre-release markers.
///
/// Returns the empty string when the input is not recognizably a version.
/// Idempotent: `standardize(standardize(s)) == standardize(s)`.
pub fn standardize(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    // Letter-prefixed versions: `V2.1` loses the prefix, `Alpha0.10.1` keeps
    // it, protocol tokens like `IPv6` are not versions at all.
    if let Some(caps) = ALPHA_PREFIX.captures(raw) {
        let prefix = caps.get(1).unwrap().as_str();
        let number = caps.get(2).unwrap().as_str();
        if prefix.to_ascii_lowercase().starts_with("ipv") {
            debug!(version = raw, "rejecting protocol token");
            return String::new();
        }
        if prefix.len() == 1 {
            return standardize_numeric(number);
        }
        return raw.to_string();
    }

    if HYPHEN_JOINED.is_match(raw) || FIVE_PART.is_match(raw) {
        return raw.to_string();
    }

    standardize_numeric(raw)
}

/// Standardize with a pre-release policy: when `allow_prerelease` is false
/// any input carrying a pre-release marker is rejected (empty string),
/// otherwise markers are stripped from the tail.
pub fn clean(raw: &str, allow_prerelease: bool) -> String {
    let standardized = standardize(raw);
    if standardized.is_empty() {
        return standardized;
    }
    let policy = if allow_prerelease {
        TestPolicy::Strip
    } else {
        TestPolicy::Reject
    };
    clean_tail(&standardized, policy)
}

fn standardize_numeric(raw: &str) -> String {
    // Short `M.N` versions are preserved verbatim, never padded to `M.N.0`.
    if TWO_PART.is_match(raw) {
        return raw.to_string();
    }

    if SEMVER_SHAPE.is_match(raw) {
        let bare = raw.strip_prefix('v').unwrap_or(raw);
        if let Ok(parsed) = Version::parse(bare) {
            let cleaned = clean_tail(&parsed.to_string(), TestPolicy::Keep);
            if !cleaned.is_empty() {
                return cleaned;
            }
            return parsed.to_string();
        }
    }

    // The shape check failed; clean suffixes and retry before falling back.
    let cleaned = clean_tail(raw, TestPolicy::Keep);
    if SEMVER_SHAPE.is_match(&cleaned) {
        let bare = cleaned.strip_prefix('v').unwrap_or(&cleaned);
        if let Ok(parsed) = Version::parse(bare) {
            return parsed.to_string();
        }
    }

    fallback_standardize(raw)
}

/// Last-resort standardization for strings no structured parse accepts:
/// strip known prefixes, then walk the ranked pattern bank.
fn fallback_standardize(raw: &str) -> String {
    let mut result = raw.to_string();
    for prefix in PREFIXES.iter() {
        result = prefix.replace(&result, "").into_owned();
    }

    if SEMVER_SHAPE.is_match(&result) {
        return clean_tail(&result, TestPolicy::Keep);
    }

    for pattern in FALLBACK_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&result) {
            result = caps.get(1).unwrap().as_str().to_string();
            return clean_tail(&result, TestPolicy::Keep);
        }
    }

    // Nothing matched the bank; accept a leading dotted run, keeping a
    // `-N` build id when one follows directly.
    if let Some(caps) = MAIN_VERSION.captures(&result) {
        let main = caps.get(1).unwrap().as_str();
        if !main.contains('.') {
            debug!(version = raw, "single number without dots is not a version");
            return String::new();
        }
        return clean_tail(main, TestPolicy::Keep);
    }

    // URLs are never versions, however many digits they contain.
    if result.contains("://") {
        debug!(version = raw, "refusing to extract a version from a URL");
        return String::new();
    }

    String::new()
}

/// Remove platform and packaging suffixes from the tail, apply the
/// pre-release policy, and trim trailing separators.
fn clean_tail(version: &str, policy: TestPolicy) -> String {
    let mut result = version.strip_prefix('V').unwrap_or(version).to_string();

    // Multi-letter prefixed versions pass through untouched; their tag is
    // load-bearing, not a platform suffix.
    if let Some(caps) = ALPHA_PREFIX.captures(&result) {
        if caps.get(1).unwrap().as_str().len() > 1 {
            return result;
        }
    }
    if FIVE_PART.is_match(&result) || HYPHEN_JOINED.is_match(&result) {
        return result;
    }

    loop {
        let mut changed = false;
        for tail in PLATFORM_TAILS.iter() {
            let stripped = tail.replace(&result, "");
            if stripped != result {
                result = stripped.into_owned();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    match policy {
        TestPolicy::Keep => {}
        TestPolicy::Strip => {
            result = TEST_TAIL.replace(&result, "").into_owned();
        }
        TestPolicy::Reject => {
            if TEST_TAIL.is_match(&result) {
                debug!(version, "pre-release marker rejected by policy");
                return String::new();
            }
        }
    }

    result.trim_end_matches(['_', '-']).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("v1.2.3", "1.2.3")]
    #[case("1.2.3", "1.2.3")]
    #[case("V2.1", "2.1")]
    #[case("1.2", "1.2")]
    #[case("9.4", "9.4")]
    #[case("Alpha0.10.1", "Alpha0.10.1")]
    #[case("Beta1.2.3", "Beta1.2.3")]
    #[case("5.8-5.3.14", "5.8-5.3.14")]
    #[case("1.10.12.394.001", "1.10.12.394.001")]
    #[case("6.0.0-ubuntu-amd64", "6.0.0")]
    #[case("1.2.3-linux", "1.2.3")]
    #[case("2.0.1-x86_64", "2.0.1")]
    #[case("release-1.4.0", "1.4.0")]
    #[case("helio-3.16", "3.16")]
    #[case("1.0.0-beta", "1.0.0-beta")]
    fn standardize_normalizes_known_shapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(standardize(input), expected);
    }

    #[rstest]
    #[case("IPv6")]
    #[case("ipv4")]
    #[case("https://example.com/download")]
    #[case("7")]
    #[case("")]
    fn standardize_rejects_non_versions(#[case] input: &str) {
        assert_eq!(standardize(input), "");
    }

    #[rstest]
    #[case("v1.2.3")]
    #[case("Alpha0.10.1")]
    #[case("6.0.0-ubuntu-amd64")]
    #[case("5.8-5.3.14")]
    #[case("1.2")]
    #[case("release-1.4.0")]
    #[case("1.0.0-beta")]
    fn standardize_is_idempotent(#[case] input: &str) {
        let once = standardize(input);
        assert_eq!(standardize(&once), once);
    }

    #[test]
    fn clean_rejects_prereleases_when_disallowed() {
        assert_eq!(clean("1.0.0-beta", false), "");
        assert_eq!(clean("2.1.0-rc2", false), "");
        assert_eq!(clean("3.0.0-nightly", false), "");
    }

    #[test]
    fn clean_strips_prereleases_when_allowed() {
        assert_eq!(clean("1.0.0-beta", true), "1.0.0");
        assert_eq!(clean("2.1.0-rc.1", true), "2.1.0");
        assert_eq!(clean("1.5.0-beta.2", true), "1.5.0");
    }

    #[test]
    fn clean_keeps_stable_versions_under_either_policy() {
        assert_eq!(clean("1.2.3", false), "1.2.3");
        assert_eq!(clean("1.2.3", true), "1.2.3");
    }

    #[test]
    fn clean_without_prerelease_never_leaves_a_marker_tail() {
        for input in [
            "1.0.0-beta",
            "1.0.0-alpha.3",
            "2.0.0-rc1-linux",
            "3.1.4-dev",
            "0.9.0-snapshot",
        ] {
            let out = clean(input, false);
            assert!(
                out.is_empty() || !TEST_TAIL.is_match(&out),
                "{input} cleaned to {out}"
            );
        }
    }

    #[test]
    fn clean_is_idempotent_under_rejection_policy() {
        for input in ["1.2.3", "1.0.0-beta", "6.0.0-ubuntu-amd64", "9.4"] {
            let once = clean(input, false);
            assert_eq!(clean(&once, false), once);
        }
    }

    #[test]
    fn compound_platform_tails_fall_off_completely() {
        assert_eq!(standardize("1.2.3-ubuntu-amd64"), "1.2.3");
        assert_eq!(standardize("4.5.6-windows-x64"), "4.5.6");
    }
}
