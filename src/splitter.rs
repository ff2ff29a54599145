//! The splitter (spec §4.6): reads an already-cleaned file, parses its
//! `Travelling` comments into [`Node`]s, depth-bands them into sub-sequences,
//! and materialises one file per cut.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::coord::{Axis, Coord};
use crate::error::GCodeCleanError;
use crate::io::LineSink;
use crate::phase1::{POSTAMBLE_MARKER, PREAMBLE_MARKER};
use crate::phase2::format_travelling_comment;
use crate::token::Token;

/// A cut boundary parsed from a `Travelling` comment (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub seq: i64,
    pub sub_seq: i64,
    pub id: i64,
    pub max_z: f64,
    pub tool: String,
    pub start: Coord,
    pub end: Coord,
    /// Index into the cleaned file's line vector where this node's marker
    /// comment appears.
    pub line_index: usize,
}

/// Splitter-internal pairing between two cuts (spec §3). Not produced by the
/// depth-band clustering algorithm in §4.6 — that algorithm orders cuts
/// purely by their existing sequence — but kept as the data type the spec's
/// model names, for a caller that wants to layer a travel-ordering pass on
/// top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub prev_id: i64,
    pub next_id: i64,
    pub distance: f64,
    pub weighting: i64,
}

impl Edge {
    /// Weighting value meaning "this edge closes a loop — discard it".
    pub const LOOP_SENTINEL: i64 = 100;

    pub fn is_loop_forming(&self) -> bool {
        self.weighting == Self::LOOP_SENTINEL
    }
}

fn travelling_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\(\|\|Travelling\|\|(?P<seq>\d+)\|\|(?P<sub>\d+)\|\|(?P<id>\d+)\|\|(?P<maxz>-?\d+(?:\.\d+)?)\|\|(?P<tool>[^|]*)\|\|>>(?P<entry>G\d+[^>]*)>>(?P<exit>G\d+[^>]*)>>\|\|\)$",
        )
        .expect("static travelling-comment regex is valid")
    })
}

fn parse_coord_words(payload: &str) -> Coord {
    let mut coord = Coord::empty();
    for word in payload.split_whitespace().skip(1) {
        let mut chars = word.chars();
        let Some(letter) = chars.next() else { continue };
        let axis = match letter.to_ascii_uppercase() {
            'X' => Axis::X,
            'Y' => Axis::Y,
            'Z' => Axis::Z,
            _ => continue,
        };
        if let Ok(value) = chars.as_str().parse::<f64>() {
            coord = coord.with(axis, value);
        }
    }
    coord
}

/// Parses one cleaned output line as a `Travelling` node, if it matches the
/// wire format (spec §6).
pub fn parse_node(line: &str, line_index: usize) -> Option<Node> {
    let caps = travelling_regex().captures(line.trim())?;
    Some(Node {
        seq: caps["seq"].parse().ok()?,
        sub_seq: caps["sub"].parse().ok()?,
        id: caps["id"].parse().ok()?,
        max_z: caps["maxz"].parse().ok()?,
        tool: caps["tool"].to_string(),
        start: parse_coord_words(&caps["entry"]),
        end: parse_coord_words(&caps["exit"]),
        line_index,
    })
}

fn is_marker_line(line: &str, marker: &str) -> bool {
    line.trim() == format!("({marker})")
}

/// Scans at most the first 100 lines for the preamble-completed marker,
/// returning the preamble block (through and including the marker line).
fn read_preamble(lines: &[String]) -> Vec<String> {
    let scan_limit = lines.len().min(100);
    match lines[..scan_limit]
        .iter()
        .position(|l| is_marker_line(l, PREAMBLE_MARKER))
    {
        Some(idx) => lines[..=idx].to_vec(),
        None => Vec::new(),
    }
}

/// Everything after the last travelling marker line.
fn read_postamble<'a>(lines: &'a [String], nodes: &[Node]) -> &'a [String] {
    match nodes.last() {
        Some(last) if last.line_index + 1 < lines.len() => &lines[last.line_index + 1..],
        _ => &[],
    }
}

/// Ten uniform bins spanning `[min_z, max_z]`; a z outside the span clamps
/// to the nearest edge bin.
fn bin_index(z: f64, min_z: f64, max_z: f64) -> usize {
    if (max_z - min_z).abs() < 1e-9 {
        return 0;
    }
    let width = (max_z - min_z) / 10.0;
    (((z - min_z) / width).floor() as i64).clamp(0, 9) as usize
}

/// Depth-band clusters one sequence group's nodes (spec §4.6 step 4),
/// returning the `sub_seq` to assign each node (indices into `group`,
/// original order preserved).
fn cluster_sub_sequences(group: &[usize], nodes: &[Node], min_z: f64, max_z: f64) -> HashMap<usize, i64> {
    let mut bins: Vec<Vec<usize>> = vec![Vec::new(); 10];
    for &idx in group {
        bins[bin_index(nodes[idx].max_z, min_z, max_z)].push(idx);
    }
    let non_empty: Vec<Vec<usize>> = bins.into_iter().filter(|b| !b.is_empty()).collect();

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut prev_was_solitary = false;
    for bin in non_empty {
        if bin.len() == 1 && !clusters.is_empty() && !prev_was_solitary {
            clusters.last_mut().unwrap().extend(bin);
            prev_was_solitary = true;
        } else {
            prev_was_solitary = bin.len() == 1;
            clusters.push(bin);
        }
    }

    let mut assignment = HashMap::new();
    if clusters.len() > 1 {
        for (sub_seq, cluster) in clusters.iter().enumerate() {
            for &idx in cluster {
                assignment.insert(idx, sub_seq as i64);
            }
        }
    } else {
        for &idx in group {
            assignment.insert(idx, nodes[idx].sub_seq);
        }
    }
    assignment
}

/// Runs depth-band clustering across every `seq` group and returns each
/// node's original index paired with its (possibly updated) `sub_seq`.
fn assign_sub_sequences(nodes: &[Node]) -> Vec<i64> {
    if nodes.is_empty() {
        return Vec::new();
    }
    let min_z = nodes.iter().map(|n| n.max_z).fold(f64::INFINITY, f64::min);
    let max_z = nodes.iter().map(|n| n.max_z).fold(f64::NEG_INFINITY, f64::max);

    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        groups.entry(node.seq).or_default().push(idx);
    }

    let mut sub_seqs = vec![0i64; nodes.len()];
    for group in groups.values() {
        let assignment = cluster_sub_sequences(group, nodes, min_z, max_z);
        for (idx, sub_seq) in assignment {
            sub_seqs[idx] = sub_seq;
        }
    }
    sub_seqs
}

fn pad_width(values: impl Iterator<Item = i64>) -> usize {
    values.map(|v| v.to_string().len()).max().unwrap_or(1)
}

fn render_xy(coord: Coord) -> String {
    [Axis::X, Axis::Y]
        .into_iter()
        .filter_map(|axis| coord.get(axis).map(|v| Token::argument(axis.letter(), v).canonical_text()))
        .collect::<Vec<_>>()
        .join("")
}

fn file_name(node: &Node, sub_seq: i64, seq_w: usize, sub_w: usize, id_w: usize) -> String {
    format!(
        "{:0seq_w$}_{:0sub_w$}_{:0id_w$}_{}_{}_{}_gcc.nc",
        node.seq,
        sub_seq,
        node.id,
        node.tool,
        render_xy(node.start),
        render_xy(node.end),
        seq_w = seq_w,
        sub_w = sub_w,
        id_w = id_w,
    )
}

/// Splits a cleaned file (already run through `clean()`) into one file per
/// cut under `folder` (spec §4.6). `folder` is removed and recreated.
pub fn split(lines: Vec<String>, folder: &Path) -> Result<(), GCodeCleanError> {
    let mut nodes: Vec<Node> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| parse_node(line, idx))
        .collect();

    if nodes.is_empty() {
        return Err(GCodeCleanError::NotPreProcessed(
            "no Travelling comments found in input".to_string(),
        ));
    }

    let preamble = read_preamble(&lines);
    let postamble = read_postamble(&lines, &nodes).to_vec();

    let sub_seqs = assign_sub_sequences(&nodes);
    for (node, sub_seq) in nodes.iter_mut().zip(sub_seqs.iter()) {
        node.sub_seq = *sub_seq;
    }

    if folder.exists() {
        std::fs::remove_dir_all(folder)?;
    }
    std::fs::create_dir_all(folder)?;

    let seq_w = pad_width(nodes.iter().map(|n| n.seq));
    let sub_w = pad_width(nodes.iter().map(|n| n.sub_seq));
    let id_w = pad_width(nodes.iter().map(|n| n.id));

    let mut segment_start = preamble.len();
    for node in &nodes {
        let name = file_name(node, node.sub_seq, seq_w, sub_w, id_w);
        let mut writer = crate::io::FileLineWriter::create(&folder.join(name))?;

        for line in &preamble {
            writer.write_line(line)?;
        }
        for line in &lines[segment_start..=node.line_index] {
            let rewritten = rewrite_if_marker(line, node);
            writer.write_line(&rewritten)?;
        }
        for line in &postamble {
            writer.write_line(line)?;
        }
        writer.flush()?;

        segment_start = node.line_index + 1;
    }

    Ok(())
}

/// Rewrites the travelling marker line itself to carry its updated `sub_seq`
/// (spec §4.6 step 4's "rewrite the travelling comment").
fn rewrite_if_marker(line: &str, node: &Node) -> String {
    if travelling_regex().is_match(line.trim()) {
        format!(
            "({})",
            format_travelling_comment(node.seq, node.sub_seq, node.id, node.max_z, &node.tool, node.start, node.end)
        )
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travelling_line(seq: i64, id: i64, max_z: f64) -> String {
        format!(
            "({})",
            format_travelling_comment(seq, 0, id, max_z, "T1", Coord::new(Some(0.0), Some(0.0), None), Coord::new(Some(1.0), Some(1.0), None))
        )
    }

    #[test]
    fn parse_node_round_trips_format_travelling_comment() {
        let line = travelling_line(0, 3, -5.25);
        let node = parse_node(&line, 0).unwrap();
        assert_eq!(node.seq, 0);
        assert_eq!(node.id, 3);
        assert!((node.max_z - (-5.25)).abs() < 1e-9);
        assert_eq!(node.tool, "T1");
        assert_eq!(node.start.get(Axis::X), Some(0.0));
        assert_eq!(node.end.get(Axis::Y), Some(1.0));
    }

    #[test]
    fn non_travelling_line_does_not_parse() {
        assert!(parse_node("G1 X1 Y2 Z3", 0).is_none());
    }

    #[test]
    fn split_fails_when_no_travelling_comments_present() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec!["G90".to_string(), "G1 X1 Y1".to_string()];
        let result = split(lines, &dir.path().join("out"));
        assert!(matches!(result, Err(GCodeCleanError::NotPreProcessed(_))));
    }

    #[test]
    fn split_writes_one_file_per_node() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec![
            "G21".to_string(),
            format!("({PREAMBLE_MARKER})"),
            "G1 X1 Y1 Z-1".to_string(),
            travelling_line(0, 0, -1.0),
            "G1 X2 Y2 Z-2".to_string(),
            travelling_line(0, 1, -2.0),
            format!("({POSTAMBLE_MARKER})"),
            "M30".to_string(),
        ];
        let folder = dir.path().join("out");
        split(lines, &folder).unwrap();
        let entries: Vec<_> = std::fs::read_dir(&folder).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn cluster_sub_sequences_leaves_single_bin_untouched() {
        let nodes = vec![
            Node {
                seq: 0,
                sub_seq: 0,
                id: 0,
                max_z: -1.0,
                tool: "T1".to_string(),
                start: Coord::empty(),
                end: Coord::empty(),
                line_index: 0,
            },
            Node {
                seq: 0,
                sub_seq: 0,
                id: 1,
                max_z: -1.0,
                tool: "T1".to_string(),
                start: Coord::empty(),
                end: Coord::empty(),
                line_index: 1,
            },
        ];
        let sub_seqs = assign_sub_sequences(&nodes);
        assert_eq!(sub_seqs, vec![0, 0]);
    }

    #[test]
    fn edge_loop_sentinel_is_detected() {
        let edge = Edge {
            prev_id: 1,
            next_id: 2,
            distance: 5.0,
            weighting: Edge::LOOP_SENTINEL,
        };
        assert!(edge.is_loop_forming());
    }
}
