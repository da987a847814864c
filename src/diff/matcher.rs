//! Longest-matching-block alignment of two line sequences.
//!
//! The classic recursive scheme: find the longest common run, then align the
//! pieces to its left and right. No element is ever treated as junk, however
//! often it repeats.

use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// Turn `a[a_range]` into `b[b_range]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub tag: Tag,
    pub a: Range<usize>,
    pub b: Range<usize>,
}

/// A run of `len` equal elements at `a[a..]` and `b[b..]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub a: usize,
    pub b: usize,
    pub len: usize,
}

pub struct SequenceMatcher<'s, T> {
    a: &'s [T],
    b: &'s [T],
    /// Positions of every element of `b`, ascending.
    b_index: HashMap<&'s T, Vec<usize>>,
}

impl<'s, T: Eq + std::hash::Hash> SequenceMatcher<'s, T> {
    pub fn new(a: &'s [T], b: &'s [T]) -> Self {
        let mut b_index: HashMap<&T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b_index.entry(item).or_default().push(j);
        }
        Self { a, b, b_index }
    }

    /// Longest block inside `a[alo..ahi]` and `b[blo..bhi]`, preferring the
    /// earliest start in `a`, then in `b`.
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let mut best = Block {
            a: alo,
            b: blo,
            len: 0,
        };
        // run_len[j] = length of the match ending at a[i-1], b[j]
        let mut run_len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b_index.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| run_len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best.len {
                        best = Block {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            len: k,
                        };
                    }
                }
            }
            run_len = next;
        }
        best
    }

    /// All maximal matching blocks in order, adjacent blocks merged, ending
    /// with the zero-length sentinel at `(a.len(), b.len())`.
    pub fn matching_blocks(&self) -> Vec<Block> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut found = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.len == 0 {
                continue;
            }
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.len < ahi && m.b + m.len < bhi {
                queue.push((m.a + m.len, ahi, m.b + m.len, bhi));
            }
            found.push(m);
        }
        found.sort_by_key(|m| (m.a, m.b));

        let mut merged: Vec<Block> = Vec::with_capacity(found.len() + 1);
        for m in found {
            match merged.last_mut() {
                Some(last) if last.a + last.len == m.a && last.b + last.len == m.b => {
                    last.len += m.len;
                }
                _ => merged.push(m),
            }
        }
        merged.push(Block {
            a: la,
            b: lb,
            len: 0,
        });
        merged
    }

    /// The edit script turning `a` into `b`.
    pub fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0, 0);
        let mut ops = Vec::new();
        for block in self.matching_blocks() {
            let tag = match (i < block.a, j < block.b) {
                (true, true) => Some(Tag::Replace),
                (true, false) => Some(Tag::Delete),
                (false, true) => Some(Tag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                ops.push(Opcode {
                    tag,
                    a: i..block.a,
                    b: j..block.b,
                });
            }
            i = block.a + block.len;
            j = block.b + block.len;
            if block.len > 0 {
                ops.push(Opcode {
                    tag: Tag::Equal,
                    a: block.a..i,
                    b: block.b..j,
                });
            }
        }
        ops
    }
}
