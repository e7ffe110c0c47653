//! Shared extraction helpers for content-scraping checkers: key-window
//! searches over page text and the ranked regex bank that pulls a version
//! candidate out of a context window.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::version;

/// Window radius around the first key of a combined `a&b` extract key.
const COMBINED_KEY_RADIUS: usize = 200;

/// Pre-release markers that disqualify an extraction context when test
/// versions are not wanted.
const TEST_CONTEXT_MARKERS: &[&str] =
    &["-alpha", "-beta", "-dev", "-rc", "-test", "-preview", "-pre"];

/// Ranked version patterns, most specific first. Group 1 is the candidate.
static VERSION_BANK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // 9.0.3988.101ZH.S1 style builds with a trailing letter tag
        r"v?(\d+\.\d+\.\d+\.\d+[A-Z]+(?:\.[A-Z0-9]+)?)",
        // four-part, optionally with a build id
        r"v?(\d+\.\d+\.\d+\.\d+(?:-\d+)?)",
        // hyphen-joined double versions in file names: xxx_5.8-5.3.14_all.deb
        r"_(\d+\.\d+-\d+\.\d+\.\d+)_",
        // path segments: /vikunja/0.24.6
        r"/(\d+\.\d+\.\d+)",
        // file names: youdao-dict_6.0.0-ubuntu-amd64.deb
        r"[a-zA-Z-]+_(\d+\.\d+\.\d+)-",
        // headings and paragraphs in rendered HTML
        r"<h\d[^>]*>(\d+\.\d+(?:\.\d+)?)",
        r"<p>([Vv]?\d+\.\d+(?:\.\d+)?)",
        // split-node markup: v<!-- -->7.2.1
        r"v<!-- -->(\d+\.\d+(?:\.\d+)?)",
        // hyphen-separated: flomo-5.25.91-latest.exe
        r"-(\d+\.\d+\.\d+)",
        // letter-tagged versions, three letters minimum so `h2`-style markup
        // tags do not match: Alpha0.10.1
        r"([A-Za-z]{3,}\d+(?:\.\d+)*)",
        // quoted: "9.4"
        r#""(\d+(?:\.\d+)*)""#,
        // standard dotted versions with optional build/pre-release tail
        r"v?(\d+\.\d+\.\d+(?:[-.]\d+)*(?:-\w+)?)",
        r"v?(\d+\.\d+)",
        // date-shaped versions: 20230815
        r"(20\d{2}(?:\d{2}){0,2})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Find every occurrence of `key` in `content`, returning byte offsets.
pub fn find_key_positions(content: &str, key: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut index = 0;
    while let Some(pos) = content[index..].find(key) {
        let abs = index + pos;
        positions.push(abs);
        index = abs + key.len();
    }
    positions
}

/// Extract a context window of `radius` bytes around `[start, end)`,
/// snapped to char boundaries.
pub fn context_window(content: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut lo = start.saturating_sub(radius);
    while lo > 0 && !content.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + radius).min(content.len());
    while hi < content.len() && !content.is_char_boundary(hi) {
        hi += 1;
    }
    &content[lo..hi]
}

/// Resolve a combined extract key (`Linux&信创`): for every occurrence of the
/// first part, a window around it must contain each remaining part; matching
/// windows are returned as extraction contexts.
pub fn find_combined_keys<'a>(content: &'a str, keys: &[&str]) -> Vec<&'a str> {
    let Some((first, rest)) = keys.split_first() else {
        return Vec::new();
    };
    find_key_positions(content, first)
        .into_iter()
        .filter_map(|pos| {
            let window = context_window(content, pos, pos + first.len(), COMBINED_KEY_RADIUS);
            rest.iter().all(|k| window.contains(k)).then_some(window)
        })
        .collect()
}

/// Whether a context window mentions a pre-release marker.
pub fn contains_test_marker(context: &str) -> bool {
    let lower = context.to_ascii_lowercase();
    TEST_CONTEXT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Pull a version candidate out of a context window using the ranked bank.
/// Returns an empty string when the window mentions a pre-release marker or
/// nothing version-shaped is present.
pub fn extract_version(context: &str) -> String {
    if contains_test_marker(context) {
        return String::new();
    }
    for pattern in VERSION_BANK.iter() {
        if let Some(caps) = pattern.captures(context) {
            let candidate = caps.get(1).unwrap().as_str();
            // Letter-tagged match may have caught a protocol token.
            if candidate.to_ascii_lowercase().starts_with("ipv") {
                continue;
            }
            return candidate.to_string();
        }
    }
    String::new()
}

/// Pick the greatest version (per the processor's total order) out of a
/// candidate list, optionally dropping pre-release candidates first.
pub fn latest_version(candidates: &[String], check_test_version: bool) -> String {
    let mut deduped: Vec<&String> = Vec::new();
    for candidate in candidates {
        if !deduped.contains(&candidate) {
            deduped.push(candidate);
        }
    }

    if !check_test_version {
        let stable: Vec<&String> = deduped
            .iter()
            .copied()
            .filter(|v| version::is_stable(v))
            .collect();
        if !stable.is_empty() {
            deduped = stable;
        }
    }

    let mut iter = deduped.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    iter.fold(first, |best, v| {
        if version::compare(v, best) == Ordering::Greater {
            v
        } else {
            best
        }
    })
    .clone()
}

/// Keep only candidates whose dotted shape matches `version_ref`
/// (`a.b.c` keeps three-component versions). An empty result means the
/// reference filtered everything, in which case callers fall back to the
/// unfiltered list.
pub fn filter_by_version_ref(candidates: &[String], version_ref: &str) -> Vec<String> {
    if version_ref.is_empty() {
        return candidates.to_vec();
    }
    let want_dots = version_ref.matches('.').count();
    candidates
        .iter()
        .filter(|v| v.matches('.').count() == want_dots)
        .cloned()
        .collect()
}
