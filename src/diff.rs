//! Line-level comparison of two snapshots.
//!
//! For every file key in the latest snapshot the [`Differ`] looks up the same
//! key in the previous snapshot and classifies the pair:
//!
//! - key only in latest: [`DiffKind::NewInLatest`], no line diff computed
//! - key in both: LCS line diff grouped into unified-style hunks; the record is
//!   [`DiffKind::Changed`] iff a hunk holds an added or removed line, otherwise
//!   [`DiffKind::Unchanged`]
//! - key only in previous: [`DiffKind::MissingFromLatest`] (page disappeared or
//!   failed to fetch this run)
//!
//! The LCS table grows with the product of the changed region's line counts.
//! Past [`MAX_LCS_CELLS`] the changed region is reported as one block of
//! removals followed by one block of additions instead.
//!
//! A file that cannot be read is logged, reported in
//! [`DiffOutcome::failures`], and left out of the records; the other files are
//! still compared. Records are keyed and ordered by file key.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use sitewatch_core::diff::{DiffKind, Differ};
//!
//! let previous = BTreeMap::from([("p1".to_string(), "Hello\nWorld\n".to_string())]);
//! let latest = BTreeMap::from([("p1".to_string(), "Hello\nWorld2\n".to_string())]);
//!
//! let outcome = Differ::default().diff(&previous, &latest);
//! assert!(matches!(outcome.records["p1"].kind, DiffKind::Changed { .. }));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::snapshot::Snapshot;

/// Unchanged lines kept around each change for readability.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Largest LCS table (cells of the changed region) computed line by line.
pub const MAX_LCS_CELLS: usize = 4 * 1024 * 1024;

/// Read access to the files of one snapshot.
pub trait SnapshotContents {
    /// Every file key, ascending.
    fn file_keys(&self) -> BTreeSet<String>;

    /// Full text of the file stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be read.
    fn read_file(&self, key: &str) -> io::Result<String>;
}

impl SnapshotContents for Snapshot {
    fn file_keys(&self) -> BTreeSet<String> {
        self.keys().clone()
    }

    fn read_file(&self, key: &str) -> io::Result<String> {
        std::fs::read_to_string(self.path_for(key))
    }
}

impl SnapshotContents for BTreeMap<String, String> {
    fn file_keys(&self) -> BTreeSet<String> {
        self.keys().cloned().collect()
    }

    fn read_file(&self, key: &str) -> io::Result<String> {
        self.get(key)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, key.to_string()))
    }
}

/// Role of a line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOp {
    /// Unchanged line shown for readability.
    Context,
    /// Line present only in the latest snapshot.
    Add,
    /// Line present only in the previous snapshot.
    Remove,
}

/// One line of a hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    /// What happened to the line.
    pub op: LineOp,
    /// Line text without its terminator.
    pub text: String,
}

impl DiffLine {
    fn new(op: LineOp, text: &str) -> Self {
        Self {
            op,
            text: text.to_string(),
        }
    }

    /// Whether this line is an addition or removal.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.op != LineOp::Context
    }
}

/// A contiguous group of changes with surrounding context.
///
/// Line numbers are 1-based; a side with zero lines reports the line after
/// which the change applies, as unified diffs do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    /// First previous-snapshot line covered.
    pub old_start: usize,
    /// Previous-snapshot lines covered.
    pub old_count: usize,
    /// First latest-snapshot line covered.
    pub new_start: usize,
    /// Latest-snapshot lines covered.
    pub new_count: usize,
    /// Context, removed, and added lines in order.
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    /// Whether the hunk holds at least one added or removed line.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(DiffLine::is_change)
    }
}

/// Classification of one file key across two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffKind {
    /// Present in both, no added or removed lines.
    Unchanged,
    /// Present in both with at least one added or removed line.
    Changed {
        /// Hunks in file order.
        hunks: Vec<DiffHunk>,
    },
    /// Present only in the latest snapshot.
    NewInLatest,
    /// Present only in the previous snapshot.
    MissingFromLatest,
}

/// Comparison result for one file key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
    /// File key shared by both snapshots.
    pub key: String,
    /// Classification and hunks.
    #[serde(flatten)]
    pub kind: DiffKind,
}

impl DiffRecord {
    /// Whether the record belongs in a change report (anything but `Unchanged`).
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        !matches!(self.kind, DiffKind::Unchanged)
    }

    /// Hunks of a `Changed` record; empty otherwise.
    #[must_use]
    pub fn hunks(&self) -> &[DiffHunk] {
        match &self.kind {
            DiffKind::Changed { hunks } => hunks,
            _ => &[],
        }
    }

    /// Added and removed lines across all hunks, in order.
    pub fn changed_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks()
            .iter()
            .flat_map(|hunk| hunk.lines.iter())
            .filter(|line| line.is_change())
    }
}

/// Which snapshot a comparison failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSide {
    /// The older of the two snapshots.
    Previous,
    /// The newer of the two snapshots.
    Latest,
}

/// A file that could not be compared.
#[derive(Debug, Error)]
#[error("cannot read {side:?} file {key}: {source}")]
pub struct DiffError {
    /// File key.
    pub key: String,
    /// Snapshot the read failed in.
    pub side: SnapshotSide,
    /// The underlying IO error.
    #[source]
    pub source: io::Error,
}

/// Result of comparing two snapshots.
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// One record per compared key, ascending by key.
    pub records: BTreeMap<String, DiffRecord>,
    /// Keys left out because a file could not be read.
    pub failures: Vec<DiffError>,
}

impl DiffOutcome {
    /// Records other than `Unchanged`, ascending by key.
    pub fn surfaced(&self) -> impl Iterator<Item = &DiffRecord> {
        self.records.values().filter(|record| record.is_surfaced())
    }

    /// Whether any record is surfaced.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.surfaced().next().is_some()
    }
}

/// Compares snapshots file by file.
#[derive(Debug, Clone)]
pub struct Differ {
    context_lines: usize,
}

impl Default for Differ {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LINES)
    }
}

impl Differ {
    /// Creates a differ that keeps `context_lines` unchanged lines around each change.
    #[must_use]
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    /// Compares `previous` against `latest`.
    pub fn diff<P, L>(&self, previous: &P, latest: &L) -> DiffOutcome
    where
        P: SnapshotContents + ?Sized,
        L: SnapshotContents + ?Sized,
    {
        let previous_keys = previous.file_keys();
        let latest_keys = latest.file_keys();
        let mut outcome = DiffOutcome::default();

        for key in &latest_keys {
            if !previous_keys.contains(key) {
                outcome.insert(key, DiffKind::NewInLatest);
                continue;
            }

            let new_text = match latest.read_file(key) {
                Ok(text) => text,
                Err(source) => {
                    outcome.fail(key, SnapshotSide::Latest, source);
                    continue;
                }
            };
            let old_text = match previous.read_file(key) {
                Ok(text) => text,
                Err(source) => {
                    outcome.fail(key, SnapshotSide::Previous, source);
                    continue;
                }
            };

            let hunks = diff_lines(&old_text, &new_text, self.context_lines);
            let kind = if hunks.iter().any(DiffHunk::has_changes) {
                DiffKind::Changed { hunks }
            } else {
                DiffKind::Unchanged
            };
            outcome.insert(key, kind);
        }

        for key in previous_keys.difference(&latest_keys) {
            outcome.insert(key, DiffKind::MissingFromLatest);
        }

        debug!(
            compared = outcome.records.len(),
            surfaced = outcome.surfaced().count(),
            failures = outcome.failures.len(),
            "snapshot comparison complete"
        );
        outcome
    }
}

impl DiffOutcome {
    fn insert(&mut self, key: &str, kind: DiffKind) {
        self.records.insert(
            key.to_string(),
            DiffRecord {
                key: key.to_string(),
                kind,
            },
        );
    }

    fn fail(&mut self, key: &str, side: SnapshotSide, source: io::Error) {
        let error = DiffError {
            key: key.to_string(),
            side,
            source,
        };
        warn!(error = %error, "skipping file that could not be compared");
        self.failures.push(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Delete,
    Insert,
}

/// Computes unified-style hunks between two texts, line by line.
#[must_use]
pub fn diff_lines(old_text: &str, new_text: &str, context_lines: usize) -> Vec<DiffHunk> {
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();
    let ops = compute_ops(&old_lines, &new_lines);
    build_hunks(&ops, &old_lines, &new_lines, context_lines)
}

/// Edit script between the two line sequences; deletions precede insertions
/// between matches.
fn compute_ops(old_lines: &[&str], new_lines: &[&str]) -> Vec<Op> {
    let prefix = old_lines
        .iter()
        .zip(new_lines)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old_lines[prefix..]
        .iter()
        .rev()
        .zip(new_lines[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old_lines[prefix..old_lines.len() - suffix];
    let new_mid = &new_lines[prefix..new_lines.len() - suffix];

    let mut ops = vec![Op::Keep; prefix];
    ops.extend(lcs_ops(old_mid, new_mid));
    ops.extend(std::iter::repeat_n(Op::Keep, suffix));
    ops
}

/// Longest-common-subsequence edit script via a flat DP table.
fn lcs_ops(old_lines: &[&str], new_lines: &[&str]) -> Vec<Op> {
    let m = old_lines.len();
    let n = new_lines.len();
    let too_large = (m + 1).saturating_mul(n + 1) > MAX_LCS_CELLS;
    if too_large {
        debug!(old_lines = m, new_lines = n, "changed region too large for LCS, replacing as a block");
    }
    if m == 0 || n == 0 || too_large {
        let mut ops = vec![Op::Delete; m];
        ops.extend(std::iter::repeat_n(Op::Insert, n));
        return ops;
    }

    let width = n + 1;
    let mut table = vec![0u32; (m + 1) * width];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            table[i * width + j] = if old_lines[i] == new_lines[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(m + n);
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if old_lines[i] == new_lines[j] {
            ops.push(Op::Keep);
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Delete);
            i += 1;
        } else {
            ops.push(Op::Insert);
            j += 1;
        }
    }
    ops.extend(std::iter::repeat_n(Op::Delete, m - i));
    ops.extend(std::iter::repeat_n(Op::Insert, n - j));
    ops
}

/// Groups an edit script into hunks. Changes separated by at most
/// `2 * context_lines` unchanged lines share a hunk.
fn build_hunks(
    ops: &[Op],
    old_lines: &[&str],
    new_lines: &[&str],
    context_lines: usize,
) -> Vec<DiffHunk> {
    // Position in each file before every op.
    let mut positions = Vec::with_capacity(ops.len() + 1);
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for op in ops {
        positions.push((old_pos, new_pos));
        match op {
            Op::Keep => {
                old_pos += 1;
                new_pos += 1;
            }
            Op::Delete => old_pos += 1,
            Op::Insert => new_pos += 1,
        }
    }
    positions.push((old_pos, new_pos));

    let change_indices: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| **op != Op::Keep)
        .map(|(index, _)| index)
        .collect();

    let mut hunks = Vec::new();
    let mut cursor = 0;
    while cursor < change_indices.len() {
        let first = change_indices[cursor];
        let mut last = first;
        cursor += 1;
        while cursor < change_indices.len()
            && change_indices[cursor] - last - 1 <= 2 * context_lines
        {
            last = change_indices[cursor];
            cursor += 1;
        }

        let start = first.saturating_sub(context_lines);
        let end = (last + 1 + context_lines).min(ops.len());

        let lines: Vec<DiffLine> = (start..end)
            .map(|index| {
                let (old_at, new_at) = positions[index];
                match ops[index] {
                    Op::Keep => DiffLine::new(LineOp::Context, old_lines[old_at]),
                    Op::Delete => DiffLine::new(LineOp::Remove, old_lines[old_at]),
                    Op::Insert => DiffLine::new(LineOp::Add, new_lines[new_at]),
                }
            })
            .collect();

        let (old_begin, new_begin) = positions[start];
        let (old_end, new_end) = positions[end];
        let old_count = old_end - old_begin;
        let new_count = new_end - new_begin;

        hunks.push(DiffHunk {
            old_start: if old_count == 0 { old_begin } else { old_begin + 1 },
            old_count,
            new_start: if new_count == 0 { new_begin } else { new_begin + 1 },
            new_count,
            lines,
        });
    }

    hunks
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snapshot(files: &[(&str, &str)]) -> BTreeMap<String, String> {
        files
            .iter()
            .map(|(key, text)| ((*key).to_string(), (*text).to_string()))
            .collect()
    }

    fn changes(record: &DiffRecord) -> Vec<(LineOp, &str)> {
        record
            .changed_lines()
            .map(|line| (line.op, line.text.as_str()))
            .collect()
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let files = snapshot(&[("p1", "Hello\nWorld\n"), ("p2", "a\nb\nc\n")]);
        let outcome = Differ::default().diff(&files, &files);

        assert_eq!(outcome.records.len(), 2);
        assert!(!outcome.has_changes());
        assert!(
            outcome
                .records
                .values()
                .all(|record| record.kind == DiffKind::Unchanged)
        );
    }

    #[test]
    fn test_changed_and_new_files() {
        let previous = snapshot(&[("p1", "Hello\nWorld\n")]);
        let latest = snapshot(&[("p1", "Hello\nWorld2\n"), ("p2", "New\n")]);

        let outcome = Differ::default().diff(&previous, &latest);

        let p1 = &outcome.records["p1"];
        assert!(matches!(p1.kind, DiffKind::Changed { .. }));
        assert_eq!(
            changes(p1),
            vec![(LineOp::Remove, "World"), (LineOp::Add, "World2")]
        );

        let p2 = &outcome.records["p2"];
        assert_eq!(p2.kind, DiffKind::NewInLatest);
        assert!(p2.hunks().is_empty());
    }

    #[test]
    fn test_missing_from_latest_is_reported() {
        let previous = snapshot(&[("gone", "bye\n"), ("kept", "x\n")]);
        let latest = snapshot(&[("kept", "x\n")]);

        let outcome = Differ::default().diff(&previous, &latest);

        assert_eq!(outcome.records["gone"].kind, DiffKind::MissingFromLatest);
        assert_eq!(outcome.records["kept"].kind, DiffKind::Unchanged);
        let surfaced: Vec<&str> = outcome.surfaced().map(|r| r.key.as_str()).collect();
        assert_eq!(surfaced, vec!["gone"]);
    }

    #[test]
    fn test_records_are_ordered_by_key() {
        let previous = snapshot(&[("b", "1\n"), ("a", "1\n")]);
        let latest = snapshot(&[("c", "1\n"), ("b", "2\n"), ("a", "1\n")]);
        let outcome = Differ::default().diff(&previous, &latest);
        let keys: Vec<&String> = outcome.records.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    struct Unreadable(BTreeMap<String, String>, &'static str);

    impl SnapshotContents for Unreadable {
        fn file_keys(&self) -> BTreeSet<String> {
            self.0.file_keys()
        }

        fn read_file(&self, key: &str) -> io::Result<String> {
            if key == self.1 {
                Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt"))
            } else {
                self.0.read_file(key)
            }
        }
    }

    #[test]
    fn test_unreadable_previous_file_is_omitted() {
        let previous = Unreadable(snapshot(&[("bad", "1\n"), ("good", "1\n")]), "bad");
        let latest = snapshot(&[("bad", "2\n"), ("good", "2\n")]);

        let outcome = Differ::default().diff(&previous, &latest);

        assert!(!outcome.records.contains_key("bad"));
        assert!(matches!(
            outcome.records["good"].kind,
            DiffKind::Changed { .. }
        ));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key, "bad");
        assert_eq!(outcome.failures[0].side, SnapshotSide::Previous);
    }

    #[test]
    fn test_hunk_keeps_context_lines() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let new = "1\n2\n3\n4\nfive\n6\n7\n8\n9\n";
        let hunks = diff_lines(old, new, 2);

        assert_eq!(hunks.len(), 1);
        let hunk = &hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (3, 5));
        assert_eq!((hunk.new_start, hunk.new_count), (3, 5));
        let texts: Vec<&str> = hunk.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["3", "4", "5", "five", "6", "7"]);
        assert_eq!(hunk.lines.iter().filter(|l| l.is_change()).count(), 2);
    }

    #[test]
    fn test_distant_changes_split_into_hunks() {
        let old: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let new = old.replace("2\n3\n", "2\nthree\n").replace("18\n", "eighteen\n");
        let hunks = diff_lines(&old, &new, 1);
        assert_eq!(hunks.len(), 2);
        assert!(hunks.iter().all(DiffHunk::has_changes));
    }

    #[test]
    fn test_insertion_into_empty_file() {
        let hunks = diff_lines("", "a\nb\n", 3);
        assert_eq!(hunks.len(), 1);
        assert_eq!((hunks[0].old_start, hunks[0].old_count), (0, 0));
        assert_eq!((hunks[0].new_start, hunks[0].new_count), (1, 2));
        assert!(hunks[0].lines.iter().all(|l| l.op == LineOp::Add));
    }

    #[test]
    fn test_no_hunks_for_equal_text() {
        assert!(diff_lines("a\nb\n", "a\nb\n", 3).is_empty());
        assert!(diff_lines("", "", 3).is_empty());
    }

    #[test]
    fn test_large_rewrite_falls_back_to_block_replacement() {
        let old: String = (0..3000).map(|i| format!("old {i}\n")).collect();
        let new: String = (0..3000).map(|i| format!("new {i}\n")).collect();
        assert!(3001 * 3001 > MAX_LCS_CELLS);

        let hunks = diff_lines(&old, &new, DEFAULT_CONTEXT_LINES);
        assert_eq!(hunks.len(), 1);
        let hunk = &hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (1, 3000));
        assert_eq!((hunk.new_start, hunk.new_count), (1, 3000));
        assert!(hunk.lines[..3000].iter().all(|line| line.op == LineOp::Remove));
        assert!(hunk.lines[3000..].iter().all(|line| line.op == LineOp::Add));

        let previous = BTreeMap::from([("big".to_string(), old)]);
        let latest = BTreeMap::from([("big".to_string(), new)]);
        let outcome = Differ::default().diff(&previous, &latest);
        assert!(matches!(outcome.records["big"].kind, DiffKind::Changed { .. }));
    }

    #[test]
    fn test_large_file_with_small_change_keeps_line_precision() {
        let old: String = (0..5000).map(|i| format!("line {i}\n")).collect();
        let new = old.replace("line 2500\n", "line 2500 edited\n");

        let hunks = diff_lines(&old, &new, 1);
        assert_eq!(hunks.len(), 1);
        let changes: Vec<_> = hunks[0].lines.iter().filter(|line| line.is_change()).collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].text, "line 2500");
        assert_eq!(changes[1].text, "line 2500 edited");
    }

    #[test]
    fn test_lcs_prefers_minimal_edit() {
        let hunks = diff_lines("a\nb\nc\nd\n", "a\nc\nd\ne\n", 0);
        let ops: Vec<(LineOp, &str)> = hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .map(|l| (l.op, l.text.as_str()))
            .collect();
        assert_eq!(ops, vec![(LineOp::Remove, "b"), (LineOp::Add, "e")]);
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = DiffRecord {
            key: "p2".to_string(),
            kind: DiffKind::NewInLatest,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], "p2");
        assert_eq!(json["kind"], "new_in_latest");
    }
}
