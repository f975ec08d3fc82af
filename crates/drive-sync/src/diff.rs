//! Line-based unified diffs
//!
//! Diffs are hunk-only (`@@ -a,b +c,d @@` followed by ` `, `-`, `+` lines,
//! three lines of context, no file headers). A line without a trailing
//! newline is followed by `\ No newline at end of file`.
//!
//! Applying is strict: each hunk must match at the position its header
//! names, and a hunk with fewer than [`CONTEXT_LINES`] of leading (or
//! trailing) context must sit at the start (or end) of the content. That
//! makes "does this diff apply forward" and "does it apply backward"
//! disjoint for content produced by [`create_diff`].

use std::collections::HashSet;
use std::fmt::Write as _;

/// Context lines emitted around each change
pub const CONTEXT_LINES: usize = 3;

const NO_NEWLINE: &str = "\\ No newline at end of file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HunkLine {
    op: Op,
    /// Line text including its terminator, if any
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
    lines: Vec<HunkLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Split keeping terminators so that `lines.concat() == text`
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Myers' shortest edit script in linear space
///
/// Common prefix and suffix are stripped, then the remaining middle is split
/// at its middle snake and both halves are solved recursively. Memory stays
/// O(N+M) and recursion depth O(log D).
fn myers(a: &[&str], b: &[&str]) -> Vec<Op> {
    let mut ops = Vec::with_capacity(a.len() + b.len());
    diff_range(a, b, &mut ops);
    ops
}

fn push_ops(ops: &mut Vec<Op>, op: Op, count: usize) {
    ops.extend(std::iter::repeat(op).take(count));
}

fn diff_range(a: &[&str], b: &[&str], ops: &mut Vec<Op>) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    push_ops(ops, Op::Equal, prefix);
    let (a, b) = (&a[prefix..], &b[prefix..]);

    let suffix = a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count();
    let (a, b) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    if a.is_empty() {
        push_ops(ops, Op::Insert, b.len());
    } else if b.is_empty() {
        push_ops(ops, Op::Delete, a.len());
    } else {
        match middle_snake(a, b) {
            Some((x, y)) => {
                diff_range(&a[..x], &b[..y], ops);
                diff_range(&a[x..], &b[y..], ops);
            }
            None => {
                push_ops(ops, Op::Delete, a.len());
                push_ops(ops, Op::Insert, b.len());
            }
        }
    }
    push_ops(ops, Op::Equal, suffix);
}

/// Split point where the forward and reverse searches overlap
///
/// Both inputs are non-empty. `None` means the sequences share no line.
fn middle_snake(a: &[&str], b: &[&str]) -> Option<(usize, usize)> {
    let seen: HashSet<&str> = a.iter().copied().collect();
    if !b.iter().any(|line| seen.contains(line)) {
        return None;
    }

    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let len = 2 * max_d + 2;
    let mut forward = vec![-1isize; len as usize];
    let mut reverse = vec![-1isize; len as usize];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    let delta = n - m;
    // with an odd delta the paths meet during the forward pass
    let odd = delta % 2 != 0;
    let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0isize, 0isize, 0isize, 0isize);

    for d in 0..max_d {
        let mut k1 = -d + k1_start;
        while k1 <= d - k1_end {
            let i = (offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && forward[i - 1] < forward[i + 1]) {
                forward[i + 1]
            } else {
                forward[i - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            forward[i] = x1;
            if x1 > n {
                k1_end += 2;
            } else if y1 > m {
                k1_start += 2;
            } else if odd {
                let j = offset + delta - k1;
                if j >= 0 && j < len && reverse[j as usize] != -1 && x1 >= n - reverse[j as usize] {
                    return Some((x1 as usize, y1 as usize));
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2_start;
        while k2 <= d - k2_end {
            let i = (offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && reverse[i - 1] < reverse[i + 1]) {
                reverse[i + 1]
            } else {
                reverse[i - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n && y2 < m && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize] {
                x2 += 1;
                y2 += 1;
            }
            reverse[i] = x2;
            if x2 > n {
                k2_end += 2;
            } else if y2 > m {
                k2_start += 2;
            } else if !odd {
                let j = offset + delta - k2;
                if j >= 0 && j < len && forward[j as usize] != -1 {
                    let x1 = forward[j as usize];
                    let y1 = offset + x1 - j;
                    if x1 >= n - x2 {
                        return Some((x1 as usize, y1 as usize));
                    }
                }
            }
            k2 += 2;
        }
    }
    None
}

/// Unified diff turning `old` into `new`; empty when they are equal
pub fn create_diff(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let a = split_lines(old);
    let b = split_lines(new);
    let ops = myers(&a, &b);

    // (op, old index, new index) with the index of the next unconsumed line
    let mut walk = Vec::with_capacity(ops.len());
    let (mut i, mut j) = (0usize, 0usize);
    for op in ops {
        walk.push((op, i, j));
        match op {
            Op::Equal => {
                i += 1;
                j += 1;
            }
            Op::Delete => i += 1,
            Op::Insert => j += 1,
        }
    }

    let changes: Vec<usize> = walk
        .iter()
        .enumerate()
        .filter(|(_, (op, _, _))| *op != Op::Equal)
        .map(|(pos, _)| pos)
        .collect();

    let mut groups: Vec<(usize, usize)> = Vec::new();
    for &pos in &changes {
        match groups.last_mut() {
            Some((_, end)) if pos - *end <= 2 * CONTEXT_LINES + 1 => *end = pos,
            _ => groups.push((pos, pos)),
        }
    }

    let mut out = String::new();
    for (first, last) in groups {
        let start = first.saturating_sub(CONTEXT_LINES);
        let end = (last + CONTEXT_LINES).min(walk.len() - 1);
        let slice = &walk[start..=end];

        let old_count = slice.iter().filter(|(op, _, _)| *op != Op::Insert).count();
        let new_count = slice.iter().filter(|(op, _, _)| *op != Op::Delete).count();
        let (_, old_pos, new_pos) = slice[0];
        let old_start = if old_count == 0 { old_pos } else { old_pos + 1 };
        let new_start = if new_count == 0 { new_pos } else { new_pos + 1 };

        let _ = writeln!(out, "@@ -{},{} +{},{} @@", old_start, old_count, new_start, new_count);
        for &(op, oi, nj) in slice {
            let (prefix, line) = match op {
                Op::Equal => (' ', a[oi]),
                Op::Delete => ('-', a[oi]),
                Op::Insert => ('+', b[nj]),
            };
            out.push(prefix);
            match line.strip_suffix('\n') {
                Some(body) => {
                    out.push_str(body);
                    out.push('\n');
                }
                None => {
                    out.push_str(line);
                    out.push('\n');
                    out.push_str(NO_NEWLINE);
                    out.push('\n');
                }
            }
        }
    }
    out
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

fn parse_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let rest = line.strip_prefix("@@ -")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(" +")?;
    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Some((old_start, old_count, new_start, new_count))
}

/// Parse hunks; `None` on any malformed line
fn parse_hunks(diff: &str) -> Option<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for raw in diff.split_inclusive('\n') {
        let raw = raw.strip_suffix('\n').unwrap_or(raw);
        if raw.starts_with("@@") {
            let (old_start, old_count, new_start, new_count) = parse_header(raw)?;
            hunks.push(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                lines: Vec::new(),
            });
            continue;
        }
        if raw.starts_with("---") || raw.starts_with("+++") || raw.starts_with("Index:") || raw.starts_with("===") {
            if hunks.is_empty() {
                continue;
            }
        }
        let hunk = hunks.last_mut()?;
        if raw.starts_with('\\') {
            let last = hunk.lines.last_mut()?;
            if last.text.ends_with('\n') {
                last.text.pop();
            }
            continue;
        }
        let mut chars = raw.chars();
        let op = match chars.next() {
            Some(' ') => Op::Equal,
            Some('-') => Op::Delete,
            Some('+') => Op::Insert,
            None => Op::Equal,
            Some(_) => return None,
        };
        let mut text = chars.as_str().to_string();
        text.push('\n');
        hunk.lines.push(HunkLine { op, text });
    }

    for hunk in &hunks {
        let old = hunk.lines.iter().filter(|l| l.op != Op::Insert).count();
        let new = hunk.lines.iter().filter(|l| l.op != Op::Delete).count();
        if old != hunk.old_count || new != hunk.new_count {
            return None;
        }
    }
    Some(hunks)
}

impl Hunk {
    fn leading_context(&self) -> usize {
        self.lines.iter().take_while(|l| l.op == Op::Equal).count()
    }

    fn trailing_context(&self) -> usize {
        self.lines.iter().rev().take_while(|l| l.op == Op::Equal).count()
    }

    fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.op != Op::Equal)
    }

    /// (start index, lines to match, lines to write) for a direction
    fn sides(&self, direction: Direction) -> (usize, Vec<&str>, Vec<&str>) {
        let (from_op, to_op, start, count) = match direction {
            Direction::Forward => (Op::Delete, Op::Insert, self.old_start, self.old_count),
            Direction::Reverse => (Op::Insert, Op::Delete, self.new_start, self.new_count),
        };
        let from = self
            .lines
            .iter()
            .filter(|l| l.op == Op::Equal || l.op == from_op)
            .map(|l| l.text.as_str())
            .collect();
        let to = self
            .lines
            .iter()
            .filter(|l| l.op == Op::Equal || l.op == to_op)
            .map(|l| l.text.as_str())
            .collect();
        let index = if count == 0 { start } else { start.saturating_sub(1) };
        (index, from, to)
    }
}

fn apply(content: &str, diff: &str, direction: Direction) -> Option<String> {
    let hunks = parse_hunks(diff)?;
    if hunks.is_empty() {
        return Some(content.to_string());
    }
    let source = split_lines(content);
    let mut out: Vec<&str> = Vec::with_capacity(source.len());
    let mut cursor = 0usize;

    for hunk in &hunks {
        let (index, from, to) = hunk.sides(direction);
        let end = index.checked_add(from.len())?;
        if index < cursor || end > source.len() {
            return None;
        }
        if hunk.has_changes() {
            if hunk.leading_context() < CONTEXT_LINES && index != 0 {
                return None;
            }
            if hunk.trailing_context() < CONTEXT_LINES && end != source.len() {
                return None;
            }
        }
        if source[index..end] != from[..] {
            return None;
        }
        out.extend_from_slice(&source[cursor..index]);
        out.extend(to);
        cursor = end;
    }
    out.extend_from_slice(&source[cursor..]);
    Some(out.concat())
}

/// Apply `diff` to content at its old side
pub fn apply_diff(content: &str, diff: &str) -> Option<String> {
    apply(content, diff, Direction::Forward)
}

/// Recover the old side of `diff` from content at its new side.
///
/// Returns `None` when the diff does not match the content.
pub fn reverse_apply_diff(content: &str, diff: &str) -> Option<String> {
    apply(content, diff, Direction::Reverse)
}

/// Whether `content` sits at the old side of `diff`
pub fn can_apply_forward(content: &str, diff: &str) -> bool {
    apply_diff(content, diff).is_some()
}

/// Added and removed line counts
pub fn diff_stats(diff: &str) -> (usize, usize) {
    diff.lines().fold((0, 0), |(add, del), line| {
        if line.starts_with('+') {
            (add + 1, del)
        } else if line.starts_with('-') {
            (add, del + 1)
        } else {
            (add, del)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hunk_format() {
        let diff = create_diff("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(diff, "@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n");
    }

    #[test]
    fn test_forward_and_reverse() {
        let old = "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\nnine\nten\n";
        let new = "one\n2\nthree\nfour\nfive\nsix\nseven\neight\nnine\nten\neleven\n";
        let diff = create_diff(old, new);
        assert_eq!(apply_diff(old, &diff).as_deref(), Some(new));
        assert_eq!(reverse_apply_diff(new, &diff).as_deref(), Some(old));
        // two separate hunks: line 2 and the appended tail
        assert_eq!(diff.matches("@@ -").count(), 2);
    }

    #[test]
    fn test_missing_trailing_newline() {
        let old = "no trailing newline";
        let new = "no trailing newline\nadded line";
        let diff = create_diff(old, new);
        assert!(diff.contains(NO_NEWLINE));
        assert_eq!(reverse_apply_diff(new, &diff).as_deref(), Some(old));
        assert_eq!(apply_diff(old, &diff).as_deref(), Some(new));
    }

    #[test]
    fn test_from_and_to_empty() {
        let diff = create_diff("", "hello\nworld\n");
        assert_eq!(reverse_apply_diff("hello\nworld\n", &diff).as_deref(), Some(""));
        let diff = create_diff("hello\n", "");
        assert_eq!(reverse_apply_diff("", &diff).as_deref(), Some("hello\n"));
    }

    #[test]
    fn test_unrelated_content_returns_none() {
        let diff = create_diff("alpha\nbeta\n", "alpha\ngamma\n");
        assert_eq!(reverse_apply_diff("completely\ndifferent\n", &diff), None);
    }

    #[test]
    fn test_directions_are_disjoint_for_appends() {
        let diff = create_diff("line1\n", "line1\nline2\n");
        assert!(!can_apply_forward("line1\nline2\n", &diff));
        assert!(can_apply_forward("line1\n", &diff));
        assert_eq!(reverse_apply_diff("line1\nline2\n", &diff).as_deref(), Some("line1\n"));
    }

    #[test]
    fn test_multibyte_content() {
        let old = "本当にありがとう\n本当にありがとう\n";
        let new = "本当にありがとう\n本当にありがとう\naaaaaa\n";
        let diff = create_diff(old, new);
        assert_eq!(reverse_apply_diff(new, &diff).as_deref(), Some(old));
    }

    #[test]
    fn test_malformed_diff() {
        assert_eq!(reverse_apply_diff("a\n", "@@ -1,1 +1,1 @@\n?a\n"), None);
        assert_eq!(reverse_apply_diff("a\n", "@@ -1,5 +1,1 @@\n a\n"), None);
        assert_eq!(reverse_apply_diff("a\n", "garbage"), None);
    }

    #[test]
    fn test_empty_diff_is_identity() {
        assert_eq!(create_diff("same\n", "same\n"), "");
        assert_eq!(reverse_apply_diff("same\n", "").as_deref(), Some("same\n"));
    }

    #[test]
    fn test_full_rewrite_of_large_note() {
        let old: String = (0..4000).map(|i| format!("old line {}\n", i)).collect();
        let new: String = (0..4000).map(|i| format!("new line {}\n", i)).collect();
        let diff = create_diff(&old, &new);
        assert_eq!(diff_stats(&diff), (4000, 4000));
        assert_eq!(apply_diff(&old, &diff).as_deref(), Some(new.as_str()));
        assert_eq!(reverse_apply_diff(&new, &diff).as_deref(), Some(old.as_str()));
    }

    #[test]
    fn test_interleaved_edits_stay_minimal() {
        let old: String = (0..2000).map(|i| format!("{}\n", i)).collect();
        let new: String = (0..2000)
            .map(|i| if i % 10 == 0 { format!("changed {}\n", i) } else { format!("{}\n", i) })
            .collect();
        let diff = create_diff(&old, &new);
        assert_eq!(diff_stats(&diff), (200, 200));
        assert_eq!(reverse_apply_diff(&new, &diff).as_deref(), Some(old.as_str()));
    }

    #[test]
    fn test_diff_stats() {
        let diff = create_diff("a\nb\n", "a\nc\nd\n");
        assert_eq!(diff_stats(&diff), (2, 1));
    }
}
