use super::Line;
use super::matcher::{Opcode, Tag};
use std::fmt::Write;

/// Column layout shared by every row of a side-by-side view.
#[derive(Debug, Clone, Copy)]
struct Layout {
    number: usize,
    text: usize,
}

impl Layout {
    fn new(expected: &[Line<'_>], actual: &[Line<'_>]) -> Self {
        let count = expected.len().max(actual.len());
        let text = expected
            .iter()
            .chain(actual)
            .map(|line| line.original.chars().count())
            .max()
            .unwrap_or(0);
        Self {
            number: count.to_string().len(),
            text,
        }
    }

    fn row(
        &self,
        out: &mut String,
        left: Option<(usize, &str)>,
        mark: char,
        right: Option<(usize, &str)>,
    ) {
        let (ln, lt) = cell(left);
        let (rn, rt) = cell(right);
        let row = format!(
            "{ln:>nw$} {lt:<tw$} {mark} {rn:>nw$} {rt}",
            nw = self.number,
            tw = self.text
        );
        out.push_str(row.trim_end());
        out.push('\n');
    }
}

fn cell(side: Option<(usize, &str)>) -> (String, &str) {
    match side {
        Some((index, text)) => ((index + 1).to_string(), text),
        None => (String::new(), ""),
    }
}

/// Expected on the left, actual on the right, one row per line.
///
/// Marks: blank for equal, `<` for lines only expected, `>` for lines only in
/// the actual output, `|` for a changed pair.
pub fn side_by_side(expected: &[Line<'_>], actual: &[Line<'_>], ops: &[Opcode]) -> String {
    let layout = Layout::new(expected, actual);
    let left = |i: usize| Some((i, expected[i].original));
    let right = |j: usize| Some((j, actual[j].original));
    let mut out = String::new();

    for op in ops {
        match op.tag {
            Tag::Equal => {
                for (i, j) in op.a.clone().zip(op.b.clone()) {
                    layout.row(&mut out, left(i), ' ', right(j));
                }
            }
            Tag::Delete => {
                for i in op.a.clone() {
                    layout.row(&mut out, left(i), '<', None);
                }
            }
            Tag::Insert => {
                for j in op.b.clone() {
                    layout.row(&mut out, None, '>', right(j));
                }
            }
            Tag::Replace => {
                let paired = op.a.len().min(op.b.len());
                for k in 0..paired {
                    layout.row(&mut out, left(op.a.start + k), '|', right(op.b.start + k));
                }
                for i in op.a.start + paired..op.a.end {
                    layout.row(&mut out, left(i), '<', None);
                }
                for j in op.b.start + paired..op.b.end {
                    layout.row(&mut out, None, '>', right(j));
                }
            }
        }
    }
    out
}

/// Every differing line with its 1-based position, expected side first.
pub fn summary(expected: &[Line<'_>], actual: &[Line<'_>], ops: &[Opcode]) -> String {
    let mut out = String::new();
    for op in ops.iter().filter(|op| op.tag != Tag::Equal) {
        for i in op.a.clone() {
            let _ = writeln!(out, "EXPECT {}) {}", i + 1, expected[i].original);
        }
        for j in op.b.clone() {
            let _ = writeln!(out, "ACTUAL {}) {}", j + 1, actual[j].original);
        }
    }
    out
}
