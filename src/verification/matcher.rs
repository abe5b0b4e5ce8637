use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Minimum length of `b` before very frequent elements stop seeding matches.
const AUTOJUNK_MIN_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// Edit step turning `a[a_start..a_end]` into `b[b_start..b_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    a: usize,
    b: usize,
    size: usize,
}

/// Ratcliff/Obershelp matcher: recursively takes the longest common contiguous
/// block, then matches what lies to its left and right.
///
/// Results match Python's `difflib.SequenceMatcher` without an `isjunk`
/// predicate, including the popularity heuristic for long `b` sequences.
pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
    blocks: Vec<Block>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let b2j = index_b(b);
        let mut matcher = Self {
            a,
            b,
            b2j,
            blocks: Vec::new(),
        };
        matcher.blocks = matcher.compute_matching_blocks();
        matcher
    }

    /// `2*M / T`, where `M` is the number of matched elements and `T` the combined length.
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.blocks.iter().map(|blk| blk.size).sum();
        2.0 * matched as f64 / total as f64
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        let mut ops = Vec::new();
        let (mut i, mut j) = (0, 0);
        for blk in &self.blocks {
            let tag = match (i < blk.a, j < blk.b) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                ops.push(Opcode {
                    tag,
                    a_start: i,
                    a_end: blk.a,
                    b_start: j,
                    b_end: blk.b,
                });
            }
            i = blk.a + blk.size;
            j = blk.b + blk.size;
            if blk.size > 0 {
                ops.push(Opcode {
                    tag: OpTag::Equal,
                    a_start: blk.a,
                    a_end: i,
                    b_start: blk.b,
                    b_end: j,
                });
            }
        }
        ops
    }

    fn compute_matching_blocks(&self) -> Vec<Block> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut found = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let blk = self.find_longest_match(alo, ahi, blo, bhi);
            if blk.size == 0 {
                continue;
            }
            if alo < blk.a && blo < blk.b {
                queue.push((alo, blk.a, blo, blk.b));
            }
            if blk.a + blk.size < ahi && blk.b + blk.size < bhi {
                queue.push((blk.a + blk.size, ahi, blk.b + blk.size, bhi));
            }
            found.push(blk);
        }
        found.sort_by_key(|blk| (blk.a, blk.b, blk.size));

        // Collapse adjacent blocks.
        let mut collapsed: Vec<Block> = Vec::with_capacity(found.len() + 1);
        for blk in found {
            match collapsed.last_mut() {
                Some(prev) if prev.a + prev.size == blk.a && prev.b + prev.size == blk.b => {
                    prev.size += blk.size;
                }
                _ => collapsed.push(blk),
            }
        }
        collapsed.push(Block {
            a: la,
            b: lb,
            size: 0,
        });
        collapsed
    }

    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let (a, b) = (self.a, self.b);
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);

        // j2len[j] = length of the longest match ending with a[i-1] and b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for (i, item) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(item) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next;
        }

        // Popular elements never seed a match but may still extend one.
        while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && a[best_i + best_size] == b[best_j + best_size]
        {
            best_size += 1;
        }

        Block {
            a: best_i,
            b: best_j,
            size: best_size,
        }
    }
}

fn index_b<T: Eq + Hash>(b: &[T]) -> HashMap<&T, Vec<usize>> {
    let mut b2j: HashMap<&T, Vec<usize>> = HashMap::new();
    for (j, item) in b.iter().enumerate() {
        b2j.entry(item).or_default().push(j);
    }
    if b.len() >= AUTOJUNK_MIN_LEN {
        let limit = b.len() / 100 + 1;
        let popular: HashSet<&T> = b2j
            .iter()
            .filter(|(_, idxs)| idxs.len() > limit)
            .map(|(item, _)| *item)
            .collect();
        b2j.retain(|item, _| !popular.contains(item));
    }
    b2j
}

/// Character-level ratio between two strings.
pub fn char_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    SequenceMatcher::new(&a, &b).ratio()
}
