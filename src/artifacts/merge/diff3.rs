//! Line-level three-way merge
//!
//! Classic diff3 shape: align base↔ours and base↔theirs with an LCS, walk
//! the base anchors that survive in both sides, and reconcile each region
//! between anchors:
//!
//! - only one side changed → take that side
//! - both changed identically → take either
//! - both changed differently → conflict region delimited by the literal
//!   markers `<<<<<<< ours`, `=======`, `>>>>>>> theirs`
//!
//! Non-overlapping edits therefore combine cleanly; overlapping edits are
//! surfaced instead of silently picked.

use crate::artifacts::merge::{MARKER_OURS, MARKER_SEP, MARKER_THEIRS};

/// Result of a three-way text merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff3Result {
    pub content: String,
    pub had_conflicts: bool,
}

/// Longest common subsequence as index pairs `(a_idx, b_idx)`.
fn lcs_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Merge `ours` and `theirs` against their common `base`, line by line.
pub fn merge(base: &str, ours: &str, theirs: &str) -> Diff3Result {
    let base_lines: Vec<&str> = base.lines().collect();
    let ours_lines: Vec<&str> = ours.lines().collect();
    let theirs_lines: Vec<&str> = theirs.lines().collect();

    // base line index → position in each side (for lines the LCS kept)
    let ours_match: std::collections::HashMap<usize, usize> =
        lcs_pairs(&base_lines, &ours_lines).into_iter().collect();
    let theirs_match: std::collections::HashMap<usize, usize> =
        lcs_pairs(&base_lines, &theirs_lines).into_iter().collect();

    // anchors: base lines present in both sides
    let anchors: Vec<(usize, usize, usize)> = (0..base_lines.len())
        .filter_map(|base_idx| {
            match (ours_match.get(&base_idx), theirs_match.get(&base_idx)) {
                (Some(&ours_idx), Some(&theirs_idx)) => Some((base_idx, ours_idx, theirs_idx)),
                _ => None,
            }
        })
        .collect();

    let mut out: Vec<String> = Vec::new();
    let mut had_conflicts = false;

    let mut cursor = (0usize, 0usize, 0usize);
    for &(base_idx, ours_idx, theirs_idx) in anchors.iter() {
        reconcile_region(
            &base_lines[cursor.0..base_idx],
            &ours_lines[cursor.1..ours_idx],
            &theirs_lines[cursor.2..theirs_idx],
            &mut out,
            &mut had_conflicts,
        );
        out.push(base_lines[base_idx].to_string());
        cursor = (base_idx + 1, ours_idx + 1, theirs_idx + 1);
    }
    reconcile_region(
        &base_lines[cursor.0..],
        &ours_lines[cursor.1..],
        &theirs_lines[cursor.2..],
        &mut out,
        &mut had_conflicts,
    );

    let mut content = out.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    Diff3Result {
        content,
        had_conflicts,
    }
}

fn reconcile_region(
    base: &[&str],
    ours: &[&str],
    theirs: &[&str],
    out: &mut Vec<String>,
    had_conflicts: &mut bool,
) {
    if ours == theirs {
        out.extend(ours.iter().map(|line| line.to_string()));
    } else if ours == base {
        out.extend(theirs.iter().map(|line| line.to_string()));
    } else if theirs == base {
        out.extend(ours.iter().map(|line| line.to_string()));
    } else {
        *had_conflicts = true;
        out.push(MARKER_OURS.to_string());
        out.extend(ours.iter().map(|line| line.to_string()));
        out.push(MARKER_SEP.to_string());
        out.extend(theirs.iter().map(|line| line.to_string()));
        out.push(MARKER_THEIRS.to_string());
    }
}

/// Strip conflict markers, retaining the concatenation of both sides.
///
/// Used by the `both` resolution: every conflict region collapses to
/// `ours` lines followed by `theirs` lines.
pub fn strip_markers_keep_both(content: &str) -> String {
    #[derive(PartialEq)]
    enum Region {
        Clean,
        Ours,
        Theirs,
    }

    let mut region = Region::Clean;
    let mut out: Vec<&str> = Vec::new();

    for line in content.lines() {
        match line {
            _ if line == MARKER_OURS => region = Region::Ours,
            _ if line == MARKER_SEP && region == Region::Ours => region = Region::Theirs,
            _ if line == MARKER_THEIRS && region == Region::Theirs => region = Region::Clean,
            _ => out.push(line),
        }
    }

    let mut merged = out.join("\n");
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_non_overlapping_edits_combine() {
        let base = "line one\nline two\nline three\n";
        let ours = "line one CHANGED\nline two\nline three\n";
        let theirs = "line one\nline two\nline three CHANGED\n";

        let result = merge(base, ours, theirs);
        assert!(!result.had_conflicts);
        assert_eq!(
            result.content,
            "line one CHANGED\nline two\nline three CHANGED\n"
        );
    }

    #[test]
    fn test_overlapping_edits_conflict() {
        let base = "X is unknown\n";
        let ours = "X is red\n";
        let theirs = "X is blue\n";

        let result = merge(base, ours, theirs);
        assert!(result.had_conflicts);
        assert_eq!(
            result.content,
            "<<<<<<< ours\nX is red\n=======\nX is blue\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn test_identical_edits_do_not_conflict() {
        let base = "old\n";
        let ours = "new\n";
        let theirs = "new\n";

        let result = merge(base, ours, theirs);
        assert!(!result.had_conflicts);
        assert_eq!(result.content, "new\n");
    }

    #[test]
    fn test_one_sided_addition() {
        let base = "a\nb\n";
        let ours = "a\nb\nc\n";
        let theirs = "a\nb\n";

        let result = merge(base, ours, theirs);
        assert!(!result.had_conflicts);
        assert_eq!(result.content, "a\nb\nc\n");
    }

    #[test]
    fn test_deletion_against_unchanged() {
        let base = "a\nb\nc\n";
        let ours = "a\nc\n";
        let theirs = "a\nb\nc\n";

        let result = merge(base, ours, theirs);
        assert!(!result.had_conflicts);
        assert_eq!(result.content, "a\nc\n");
    }

    #[test]
    fn test_empty_base_divergent_content_conflicts() {
        let result = merge("", "ours content\n", "theirs content\n");
        assert!(result.had_conflicts);
        assert!(result.content.contains(MARKER_OURS));
        assert!(result.content.contains(MARKER_THEIRS));
    }

    #[test]
    fn test_strip_markers_keep_both() {
        let conflicted = "intro\n<<<<<<< ours\nX is red\n=======\nX is blue\n>>>>>>> theirs\noutro\n";
        assert_eq!(
            strip_markers_keep_both(conflicted),
            "intro\nX is red\nX is blue\noutro\n"
        );
    }
}
