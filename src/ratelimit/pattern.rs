//! Glob-style endpoint patterns and most-specific-match selection.
//!
//! Patterns are `/`-delimited. A `**` segment spans any number of path
//! segments (including none), `*` and `?` match within a single segment, and
//! everything else is literal. Empty segments are ignored on both sides, so
//! `/api//users/` is the same path as `/api/users`.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, TollgateError};

const SEPARATOR: char = '/';

/// A compiled endpoint pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    absolute: bool,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Matches one segment exactly
    Literal(String),
    /// Matches one segment using `*` / `?` wildcards
    Glob(String),
    /// `**`: matches zero or more segments
    AnyDepth,
}

impl PathPattern {
    /// Compile a pattern string.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(TollgateError::Config(
                "endpoint pattern must not be empty".to_string(),
            ));
        }

        let segments = split_segments(raw)
            .map(|segment| {
                if segment == "**" {
                    Segment::AnyDepth
                } else if segment.contains(['*', '?']) {
                    Segment::Glob(segment.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            absolute: raw.starts_with(SEPARATOR),
            segments,
        })
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Length used to rank matches; longer patterns are more specific.
    pub fn specificity(&self) -> usize {
        self.raw.chars().count()
    }

    /// Check whether `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        if path.starts_with(SEPARATOR) != self.absolute {
            return false;
        }
        let path: Vec<&str> = split_segments(path).collect();
        match_segments(&self.segments, &path)
    }

    /// Ordering used to pick a single winner among matching patterns:
    /// longer patterns rank first, equal lengths fall back to lexical order.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .specificity()
            .cmp(&self.specificity())
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Select the most specific pattern matching `path`.
///
/// The result only depends on the set of patterns, never on the order they
/// are supplied in.
pub fn best_match<'a, I>(patterns: I, path: &str) -> Option<&'a PathPattern>
where
    I: IntoIterator<Item = &'a PathPattern>,
{
    patterns
        .into_iter()
        .filter(|pattern| pattern.matches(path))
        .min_by(|a, b| a.rank(b))
}

fn split_segments(value: &str) -> impl Iterator<Item = &str> {
    value.split(SEPARATOR).filter(|segment| !segment.is_empty())
}

/// Bottom-up match over `(pattern index, path index)` states, so a pattern
/// with several `**` segments stays `O(pattern * path)` on any input.
fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    let n = path.len();

    // `next[j]`: does pattern[i + 1..] match path[j..]?
    let mut next = vec![false; n + 1];
    next[n] = true;
    let mut current = vec![false; n + 1];

    for segment in pattern.iter().rev() {
        for j in (0..=n).rev() {
            current[j] = match segment {
                Segment::AnyDepth => next[j] || (j < n && current[j + 1]),
                _ => j < n && next[j + 1] && segment_matches(segment, path[j]),
            };
        }
        std::mem::swap(&mut next, &mut current);
    }

    next[0]
}

fn segment_matches(segment: &Segment, value: &str) -> bool {
    match segment {
        Segment::Literal(literal) => literal == value,
        Segment::Glob(glob) => glob_matches(glob, value),
        Segment::AnyDepth => true,
    }
}

/// Wildcard match within a single segment, with backtracking on `*`.
fn glob_matches(glob: &str, value: &str) -> bool {
    let glob: Vec<char> = glob.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut g, mut v) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while v < value.len() {
        if g < glob.len() && (glob[g] == '?' || glob[g] == value[v]) {
            g += 1;
            v += 1;
        } else if g < glob.len() && glob[g] == '*' {
            star = Some((g, v));
            g += 1;
        } else if let Some((star_g, star_v)) = star {
            g = star_g + 1;
            v = star_v + 1;
            star = Some((star_g, star_v + 1));
        } else {
            return false;
        }
    }

    glob[g..].iter().all(|c| *c == '*')
}
