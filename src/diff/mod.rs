//! Comparison of expected and actual program output.
//!
//! Both texts are normalized before matching: blank lines are dropped and runs
//! of whitespace count as a single space. The original lines are kept for the
//! report so the student sees exactly what was printed.

pub mod matcher;
pub mod render;

use matcher::{SequenceMatcher, Tag};

/// A non-blank line and the key it is compared by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<'t> {
    pub original: &'t str,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub matched: bool,
    /// Side-by-side view, a blank line, then the indexed summary. Empty on a
    /// match.
    pub diff: String,
}

pub fn normalize(text: &str) -> Vec<Line<'_>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Line {
            original: line,
            key: line.split_whitespace().collect::<Vec<_>>().join(" "),
        })
        .collect()
}

pub fn compare(expected: &str, actual: &str) -> DiffOutcome {
    let expected = normalize(expected);
    let actual = normalize(actual);
    let a: Vec<&str> = expected.iter().map(|l| l.key.as_str()).collect();
    let b: Vec<&str> = actual.iter().map(|l| l.key.as_str()).collect();
    let ops = SequenceMatcher::new(&a, &b).opcodes();

    if ops.iter().all(|op| op.tag == Tag::Equal) {
        return DiffOutcome {
            matched: true,
            diff: String::new(),
        };
    }

    let mut diff = render::side_by_side(&expected, &actual, &ops);
    diff.push('\n');
    diff.push_str(&render::summary(&expected, &actual, &ops));
    DiffOutcome {
        matched: false,
        diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_blank_and_collapses_whitespace() {
        let lines = normalize("  a   b \n\n\t\n c\td\n");
        let keys: Vec<_> = lines.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["a b", "c d"]);
        assert_eq!(lines[0].original, "  a   b ");
        assert_eq!(lines[1].original, " c\td");
    }

    #[test]
    fn test_identical_texts_match() {
        let out = compare("hello\nworld\n", "hello\nworld\n");
        assert!(out.matched);
        assert!(out.diff.is_empty());
    }

    #[test]
    fn test_blank_lines_and_spacing_ignored() {
        assert!(compare("a\n\nb", "a\nb").matched);
        assert!(compare("x  y\r\n", "x y").matched);
        assert!(compare("", "\n\n   \n").matched);
    }

    #[test]
    fn test_changed_last_line() {
        let out = compare("1\n2\n3\n", "1\n2\n4\n");
        assert!(!out.matched);
        assert!(out.diff.contains("EXPECT 3) 3"), "diff:\n{}", out.diff);
        assert!(out.diff.contains("ACTUAL 3) 4"), "diff:\n{}", out.diff);
        assert!(out.diff.contains("3 3 | 3 4"), "diff:\n{}", out.diff);
    }

    #[test]
    fn test_pure_insertion_summary() {
        let out = compare("a\nb\n", "a\nx\nb\ny\nz\n");
        assert!(!out.matched);
        let summary: Vec<&str> = out
            .diff
            .lines()
            .filter(|l| l.starts_with("EXPECT") || l.starts_with("ACTUAL"))
            .collect();
        assert_eq!(summary, vec!["ACTUAL 2) x", "ACTUAL 4) y", "ACTUAL 5) z"]);
    }

    #[test]
    fn test_side_by_side_marks() {
        let out = compare("keep\ngone\nold1\nold2\nend\n", "keep\nnew1\nend\nadded\n");
        let rows: Vec<&str> = out.diff.split("\n\n").next().unwrap().lines().collect();
        assert_eq!(
            rows,
            vec![
                "1 keep    1 keep",
                "2 gone  | 2 new1",
                "3 old1  <",
                "4 old2  <",
                "5 end     3 end",
                "        > 4 added",
            ]
        );
    }

    #[test]
    fn test_summary_uses_original_lines() {
        let out = compare("a  b\n", "c   d\n");
        assert!(out.diff.contains("EXPECT 1) a  b"));
        assert!(out.diff.contains("ACTUAL 1) c   d"));
    }
}
