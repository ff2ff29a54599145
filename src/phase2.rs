//! Phase 2: geometric simplification (spec §4.4).
//!
//! Three independent passes, chained in [`phase2`]:
//!
//! 1. [`ArcRadiusToCenter`] rewrites `G2`/`G3 ... R` arcs into `I`/`J`/`K`
//!    center-offset form.
//! 2. [`GeometricSimplify`] runs the three-frame colinear dedup and the
//!    linear-run-to-arc fit in a single combined pass, since an arc-fit
//!    decision can only be made on points that already passed the
//!    colinear-dedup significance test (spec §4.4.3's own wording).
//! 3. [`insert_travelling_comments`] (optional, §4.4.4) marks cut
//!    boundaries with `Travelling` comments and collapses redundant travel.

use std::collections::VecDeque;

use crate::coord::{Axis, Coord};
use crate::geometry;
use crate::token::{Line, Token};

/// Converts a motion line's explicit X/Y/Z arguments into a [`Coord`].
fn coord_from_line(line: &Line) -> Coord {
    Coord::new(
        line.argument_value('X'),
        line.argument_value('Y'),
        line.argument_value('Z'),
    )
}

fn is_motion_letter_g(line: &Line, codes: &[f64]) -> bool {
    line.tokens
        .iter()
        .any(|t| matches!(t, Token::Command { letter: 'G', code } if codes.contains(code)))
}

// ---------------------------------------------------------------------
// 4.4.1 Arc radius to center
// ---------------------------------------------------------------------

/// Rewrites `R`-format arcs to `I`/`J`/`K` center-offset form (spec §4.4.1).
///
/// Tracks the previous motion target so it can solve the circle/circle
/// intersection between the previous point and the arc's target. Lines that
/// can't be solved (no prior point, zero intersections) pass through with
/// their `R` argument untouched — a semantic-but-recoverable condition per
/// spec §7.
pub struct ArcRadiusToCenter<I: Iterator<Item = Line>> {
    inner: I,
    prev: Coord,
}

impl<I: Iterator<Item = Line>> ArcRadiusToCenter<I> {
    pub fn new(inner: I) -> Self {
        ArcRadiusToCenter {
            inner,
            prev: Coord::empty(),
        }
    }
}

fn arc_clockwise(line: &Line) -> Option<bool> {
    if line.tokens.iter().any(|t| t.is_command_letter_code('G', 2.0)) {
        Some(true)
    } else if line.tokens.iter().any(|t| t.is_command_letter_code('G', 3.0)) {
        Some(false)
    } else {
        None
    }
}

/// Picks the circle/circle intersection matching the arc's handedness.
fn resolve_center(prev: Coord, target: Coord, radius: f64, clockwise: bool) -> Option<Coord> {
    let points = geometry::find_intersections(prev, target, radius);
    match points.len() {
        0 => None,
        1 => Some(points[0]),
        _ => {
            let (_, u, v) = geometry::orthogonal_plane(&[prev, target])?;
            let uv = |c: &Coord| (c.get(u).unwrap_or(0.0), c.get(v).unwrap_or(0.0));
            let a = uv(&prev);
            let b = uv(&target);
            points
                .iter()
                .find(|c| (geometry::direction_of_point(a, b, uv(c)) < 0) == clockwise)
                .copied()
                .or_else(|| points.first().copied())
        }
    }
}

/// Replaces a line's `R` argument with `I`/`J`/`K` offsets from `prev` to
/// `center`, emitted only on axes both coords have set.
fn replace_r_with_ijk(line: Line, prev: Coord, center: Coord) -> Line {
    let mut tokens: Vec<Token> = line
        .tokens
        .into_iter()
        .filter(|t| !matches!(t, Token::Argument { letter: 'R', .. }))
        .collect();
    for (axis, letter) in [(Axis::X, 'I'), (Axis::Y, 'J'), (Axis::Z, 'K')] {
        if let (Some(c), Some(p)) = (center.get(axis), prev.get(axis)) {
            tokens.push(Token::argument(letter, c - p));
        }
    }
    Line::new(tokens)
}

impl<I: Iterator<Item = Line>> Iterator for ArcRadiusToCenter<I> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        let mut line = self.inner.next()?;

        if line.has_movement_command() {
            let target = coord_from_line(&line);
            if let (Some(clockwise), Some(radius)) = (arc_clockwise(&line), line.argument_value('R')) {
                if target.has_coord_pair() {
                    if let Some(center) = resolve_center(self.prev, target, radius, clockwise) {
                        line = replace_r_with_ijk(line, self.prev, center);
                    }
                }
            }
            self.prev = self.prev.merge(&target, true);
        }

        Some(line)
    }
}

// ---------------------------------------------------------------------
// 4.4.2 / 4.4.3 Colinear dedup + linear-run-to-arc, combined
// ---------------------------------------------------------------------

/// A line qualifies for the three-frame window tests only if it's a full
/// `G0`/`G1` linear move with explicit X, Y, and Z.
fn is_linear_candidate(line: &Line) -> bool {
    is_motion_letter_g(line, &[0.0, 1.0])
        && line.has_argument('X')
        && line.has_argument('Y')
        && line.has_argument('Z')
}

fn window_testable(a: &Line, b: &Line, c: &Line) -> bool {
    is_linear_candidate(a)
        && is_linear_candidate(b)
        && is_linear_candidate(c)
        && a.is_compatible_with(b)
        && b.is_compatible_with(c)
}

fn within_bounding_range(a: Coord, b: Coord, c: Coord) -> bool {
    Axis::ALL.iter().all(|&axis| match (a.get(axis), b.get(axis), c.get(axis)) {
        (Some(av), Some(bv), Some(cv)) => {
            let (lo, hi) = if av <= cv { (av, cv) } else { (cv, av) };
            bv >= lo && bv <= hi
        }
        _ => true,
    })
}

/// Axes where A, B, and C are all pairwise separated by at least `tol`.
fn relevant_axes(a: Coord, b: Coord, c: Coord, tol: f64) -> Vec<Axis> {
    Axis::ALL
        .iter()
        .copied()
        .filter(|&axis| {
            match (a.get(axis), b.get(axis), c.get(axis)) {
                (Some(av), Some(bv), Some(cv)) => {
                    (av - cv).abs() >= tol && (av - bv).abs() >= tol && (bv - cv).abs() >= tol
                }
                _ => false,
            }
        })
        .collect()
}

const PLANES: [(Axis, Axis); 3] = [(Axis::X, Axis::Y), (Axis::X, Axis::Z), (Axis::Y, Axis::Z)];

fn plane_angle(from: Coord, to: Coord, u: Axis, v: Axis) -> f64 {
    let du = to.get(u).unwrap_or(0.0) - from.get(u).unwrap_or(0.0);
    let dv = to.get(v).unwrap_or(0.0) - from.get(v).unwrap_or(0.0);
    geometry::angle(dv, du)
}

fn angle_diff(a: f64, b: f64) -> f64 {
    let raw = (a - b).abs() % 360.0;
    raw.min(360.0 - raw)
}

/// Whether B is a significant corner (kept) or a colinear no-op (dropped),
/// per spec §4.4.2.
fn is_significant(a: Coord, b: Coord, c: Coord, tol: f64) -> bool {
    if !within_bounding_range(a, b, c) {
        return true;
    }
    let relevant = relevant_axes(a, b, c, tol);
    if relevant.len() < 2 {
        return false;
    }
    PLANES.iter().any(|&(u, v)| {
        relevant.contains(&u)
            && relevant.contains(&v)
            && angle_diff(plane_angle(a, c, u, v), plane_angle(a, b, u, v)) >= tol
    })
}

/// The arc the run-so-far is fitting, anchored at the window's fixed `A`.
#[derive(Debug, Clone, Copy)]
struct ArcRun {
    center: Coord,
    radius: f64,
    clockwise: bool,
}

fn sagitta(radius: f64, chord: f64) -> Option<f64> {
    let half = chord / 2.0;
    if half > radius {
        return None;
    }
    Some(radius - (radius * radius - half * half).sqrt())
}

/// Attempts to fit `a, b, c` to a single circle within `arc_tolerance`,
/// optionally requiring consistency with an already-established `ArcRun`
/// (spec §4.4.3 steps 1-4).
fn fit_arc(a: Coord, b: Coord, c: Coord, arc_tolerance: f64, existing: Option<ArcRun>) -> Option<ArcRun> {
    let fit = geometry::find_circle(a, b, c)?;
    if fit.radius <= arc_tolerance {
        return None;
    }
    if let Some(prev) = existing {
        let axes_match = Axis::ALL.iter().all(|&axis| {
            match (fit.center.get(axis), prev.center.get(axis)) {
                (Some(x), Some(y)) => (x - y).abs() <= arc_tolerance,
                (None, None) => true,
                _ => false,
            }
        });
        if !axes_match || (fit.radius - prev.radius).abs() > arc_tolerance {
            return None;
        }
    }

    let sag_ab = sagitta(fit.radius, geometry::distance(a, b))?;
    let sag_bc = sagitta(fit.radius, geometry::distance(b, c))?;
    if sag_ab > arc_tolerance || sag_bc > arc_tolerance {
        return None;
    }

    Some(ArcRun {
        center: fit.center,
        radius: fit.radius,
        clockwise: fit.clockwise,
    })
}

/// Rewrites `line`'s motion command to `G2`/`G3` and appends `I`/`J`/`K`
/// offsets of `center` from `start`, closing an accumulated arc run.
fn rewrite_as_arc(line: &Line, start: Coord, run: ArcRun) -> Line {
    let mut tokens: Vec<Token> = Vec::with_capacity(line.tokens.len() + 3);
    for token in &line.tokens {
        match token {
            Token::Command { letter: 'G', code } if [0.0, 1.0].contains(code) => {
                tokens.push(Token::command('G', if run.clockwise { 2.0 } else { 3.0 }));
            }
            other => tokens.push(other.clone()),
        }
    }
    for (axis, letter) in [(Axis::X, 'I'), (Axis::Y, 'J'), (Axis::Z, 'K')] {
        if let (Some(c), Some(s)) = (run.center.get(axis), start.get(axis)) {
            tokens.push(Token::argument(letter, c - s));
        }
    }
    Line::new(tokens)
}

/// Combined colinear dedup (§4.4.2) and linear-run-to-arc fit (§4.4.3).
///
/// Maintains a three-line window `(a, b)` plus whatever new line arrives as
/// `c`, and an optional [`ArcRun`] accumulated while absorbing points into a
/// common circle. `a` is the fixed anchor of both the window and (while
/// active) the arc; it only moves once a decision finalises the segment
/// ending at the current `b`.
pub struct GeometricSimplify<I: Iterator<Item = Line>> {
    inner: I,
    tolerance: f64,
    arc_tolerance: f64,
    a: Option<Line>,
    b: Option<Line>,
    arc: Option<ArcRun>,
    pending: VecDeque<Line>,
    exhausted: bool,
}

impl<I: Iterator<Item = Line>> GeometricSimplify<I> {
    pub fn new(inner: I, tolerance: f64, arc_tolerance: f64) -> Self {
        GeometricSimplify {
            inner,
            tolerance,
            arc_tolerance,
            a: None,
            b: None,
            arc: None,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Emits `a`, then `b` (rewritten to an arc close if one is active).
    fn finalize(&mut self, a: Line, b: Line) {
        let b = match self.arc.take() {
            Some(run) => rewrite_as_arc(&b, coord_from_line(&a), run),
            None => b,
        };
        self.pending.push_back(a);
        self.pending.push_back(b);
    }
}

impl<I: Iterator<Item = Line>> Iterator for GeometricSimplify<I> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }
            if self.exhausted {
                return None;
            }
            match self.inner.next() {
                None => {
                    self.exhausted = true;
                    if let Some(a) = self.a.take() {
                        if let Some(b) = self.b.take() {
                            self.finalize(a, b);
                        } else {
                            self.pending.push_back(a);
                        }
                    }
                }
                Some(c) => {
                    if self.a.is_none() {
                        self.a = Some(c);
                        continue;
                    }
                    if self.b.is_none() {
                        self.b = Some(c);
                        continue;
                    }
                    let a = self.a.clone().expect("checked above");
                    let b = self.b.clone().expect("checked above");

                    if !window_testable(&a, &b, &c) {
                        self.finalize(a, b);
                        self.a = Some(c);
                        self.b = None;
                        continue;
                    }

                    let (ca, cb, cc) = (coord_from_line(&a), coord_from_line(&b), coord_from_line(&c));
                    if !is_significant(ca, cb, cc, self.tolerance) {
                        // B is a colinear no-op; A stays, B becomes C.
                        self.b = Some(c);
                        continue;
                    }

                    match fit_arc(ca, cb, cc, self.arc_tolerance, self.arc) {
                        Some(run) => {
                            // B is absorbed into the growing arc; A stays.
                            self.arc = Some(run);
                            self.b = Some(c);
                        }
                        None => {
                            self.finalize(a, b);
                            self.a = Some(c);
                            self.b = None;
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// 4.4.4 Travelling-comment insertion
// ---------------------------------------------------------------------

/// `z ≥ zClamp − tolerance` marks a `G0` as a safe-height travel move
/// rather than a cutting move (spec §9 Open Question, SPEC_FULL.md #3).
fn is_travel(line: &Line, z_clamp: f64, tolerance: f64) -> bool {
    is_motion_letter_g(line, &[0.0]) && line.argument_value('Z').is_some_and(|z| z >= z_clamp - tolerance)
}

fn is_cutting(line: &Line, z_clamp: f64, tolerance: f64) -> bool {
    line.has_movement_command() && !is_travel(line, z_clamp, tolerance)
}

fn xy_overlaps(a: &Line, b: &Line, tolerance: f64) -> bool {
    ['X', 'Y'].iter().all(|&letter| {
        match (a.argument_value(letter), b.argument_value(letter)) {
            (Some(x), Some(y)) => (x - y).abs() <= tolerance,
            _ => true,
        }
    })
}

/// Collapses a run of consecutive travel lines sharing the same XY position
/// (within `tolerance`) down to the last of each overlapping group.
fn collapse_travel_run(lines: &[Line], tolerance: f64) -> Vec<Line> {
    let mut collapsed: Vec<Line> = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(last) = collapsed.last_mut() {
            if xy_overlaps(last, line, tolerance) {
                *last = line.clone();
                continue;
            }
        }
        collapsed.push(line.clone());
    }
    collapsed
}

/// Renders `coord`'s set axes as space-separated `X../Y../Z..` words, for
/// the `Travelling` comment's embedded entry/exit `G0` payload.
fn render_coord_words(coord: Coord) -> String {
    Axis::ALL
        .iter()
        .filter_map(|&axis| coord.get(axis).map(|v| Token::argument(axis.letter(), v).canonical_text()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the bit-exact `Travelling` comment text (without parens), per
/// spec §3/§6.
pub fn format_travelling_comment(
    seq: i64,
    sub_seq: i64,
    id: i64,
    max_z: f64,
    tool: &str,
    start: Coord,
    end: Coord,
) -> String {
    format!(
        "||Travelling||{seq}||{sub_seq}||{id}||{max_z:.3}||{tool}||>>G0 {}>>G0 {}>>||",
        render_coord_words(start),
        render_coord_words(end),
    )
}

/// Identifies cutting runs bounded by travel moves and inserts a
/// `Travelling` comment (spec §3, §4.4.4) after each run's trailing,
/// XY-overlap-collapsed travel. Buffering here is proportional to the
/// number of cuts, one of the two named exceptions to O(1) phase state
/// (spec §5).
pub fn insert_travelling_comments(lines: Vec<Line>, z_clamp: f64, tolerance: f64, tool: &str) -> Vec<Line> {
    let mut out = Vec::with_capacity(lines.len() + 8);
    let mut seq = 0i64;
    let mut run_max_z: Option<f64> = None;
    let mut run_entry: Option<Coord> = None;
    let mut travel_buf: Vec<Line> = Vec::new();
    let mut last_position = Coord::empty();

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];

        if is_cutting(line, z_clamp, tolerance) {
            if !travel_buf.is_empty() {
                let collapsed = collapse_travel_run(&travel_buf, tolerance);
                if let Some(entry) = run_entry {
                    if let Some(max_z) = run_max_z {
                        let exit = collapsed
                            .last()
                            .map(coord_from_line)
                            .unwrap_or(last_position);
                        out.push(Line::new(vec![Token::Comment(format_travelling_comment(
                            seq, 0, seq, max_z, tool, entry, exit,
                        ))]));
                        seq += 1;
                    }
                }
                out.extend(collapsed);
                travel_buf.clear();
            }
            if run_entry.is_none() {
                run_entry = Some(last_position);
            }
            let z = line.argument_value('Z').unwrap_or(f64::MIN);
            run_max_z = Some(run_max_z.map_or(z, |m: f64| m.max(z)));
            last_position = coord_from_line(line);
            out.push(line.clone());
        } else if is_travel(line, z_clamp, tolerance) {
            travel_buf.push(line.clone());
            last_position = coord_from_line(line);
        } else {
            // Modal/comment line mid-stream: flush any pending travel first.
            out.extend(collapse_travel_run(&travel_buf, tolerance));
            travel_buf.clear();
            out.push(line.clone());
        }
        i += 1;
    }

    if !travel_buf.is_empty() {
        let collapsed = collapse_travel_run(&travel_buf, tolerance);
        if let (Some(entry), Some(max_z)) = (run_entry, run_max_z) {
            let exit = collapsed.last().map(coord_from_line).unwrap_or(last_position);
            out.push(Line::new(vec![Token::Comment(format_travelling_comment(
                seq, 0, seq, max_z, tool, entry, exit,
            ))]));
        }
        out.extend(collapsed);
    } else if let (Some(entry), Some(max_z)) = (run_entry, run_max_z) {
        out.push(Line::new(vec![Token::Comment(format_travelling_comment(
            seq, 0, seq, max_z, tool, entry, last_position,
        ))]));
    }

    out
}

/// Chains arc-radius-to-center conversion and combined geometric dedup into
/// the full Phase 2 transform. Travelling-comment insertion is applied
/// separately by the caller (it needs a materialised `Vec`, per §5's
/// O(number-of-cuts) exception) when `eliminate_needless_travelling` is on.
pub fn phase2<I>(lines: I, tolerance: f64, arc_tolerance: f64) -> impl Iterator<Item = Line>
where
    I: Iterator<Item = Line> + 'static,
{
    let arcs = ArcRadiusToCenter::new(lines);
    GeometricSimplify::new(arcs, tolerance, arc_tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g1(x: f64, y: f64, z: f64) -> Line {
        Line::new(vec![
            Token::command('G', 1.0),
            Token::argument('X', x),
            Token::argument('Y', y),
            Token::argument('Z', z),
        ])
    }

    fn g0(x: f64, y: f64, z: f64) -> Line {
        Line::new(vec![
            Token::command('G', 0.0),
            Token::argument('X', x),
            Token::argument('Y', y),
            Token::argument('Z', z),
        ])
    }

    // -- ArcRadiusToCenter -------------------------------------------------

    #[test]
    fn arc_radius_to_center_s4() {
        // S4: G2 X10 Y0 R5 starting from (0,0) in XY, clockwise -> I5 J0.
        let lines = vec![
            g0(0.0, 0.0, 0.0),
            Line::new(vec![
                Token::command('G', 2.0),
                Token::argument('X', 10.0),
                Token::argument('Y', 0.0),
                Token::argument('Z', 0.0),
                Token::argument('R', 5.0),
            ]),
        ];
        let out: Vec<Line> = ArcRadiusToCenter::new(lines.into_iter()).collect();
        let arc = &out[1];
        assert!(!arc.has_argument('R'));
        assert_eq!(arc.argument_value('I'), Some(5.0));
        assert!((arc.argument_value('J').unwrap() - 0.0).abs() < 1e-6);
    }

    #[test]
    fn arc_radius_to_center_passes_through_when_no_prior_point() {
        let lines = vec![Line::new(vec![
            Token::command('G', 2.0),
            Token::argument('X', 10.0),
            Token::argument('Y', 0.0),
            Token::argument('Z', 0.0),
            Token::argument('R', 5.0),
        ])];
        let out: Vec<Line> = ArcRadiusToCenter::new(lines.into_iter()).collect();
        assert!(out[0].has_argument('R'));
    }

    // -- GeometricSimplify: colinear dedup ----------------------------------

    #[test]
    fn drops_midpoint_exactly_on_the_line() {
        let lines = vec![g1(0.0, 0.0, 0.0), g1(5.0, 5.0, 0.0), g1(10.0, 10.0, 0.0)];
        let out: Vec<Line> = GeometricSimplify::new(lines.into_iter(), 0.5, 0.5).collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].argument_value('X'), Some(0.0));
        assert_eq!(out[1].argument_value('X'), Some(10.0));
    }

    #[test]
    fn never_drops_first_or_last_line() {
        let lines = vec![
            g1(0.0, 0.0, 0.0),
            g1(1.0, 1.0, 0.0),
            g1(2.0, 2.0, 0.0),
            g1(3.0, 3.0, 0.0),
        ];
        let out: Vec<Line> = GeometricSimplify::new(lines.into_iter(), 0.5, 0.5).collect();
        assert_eq!(out.first().unwrap().argument_value('X'), Some(0.0));
        assert_eq!(out.last().unwrap().argument_value('X'), Some(3.0));
    }

    #[test]
    fn keeps_a_genuine_corner() {
        let lines = vec![g1(0.0, 0.0, 0.0), g1(10.0, 0.0, 0.0), g1(10.0, 10.0, 0.0)];
        let out: Vec<Line> = GeometricSimplify::new(lines.into_iter(), 0.005, 0.005).collect();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn fine_tolerance_keeps_wobble_coarse_drops_it() {
        // S2-style: near-colinear run with one small wobble.
        let lines = vec![
            g1(0.0, 0.0, 0.0),
            g1(1.0, 1.0, 0.0),
            g1(2.0, 2.0, 0.0),
            g1(3.0, 3.0, 0.0),
            g1(4.0, 4.0, 0.0),
            g1(5.5, 5.0, 0.0),
            g1(6.0, 6.0, 0.0),
            g1(7.0, 7.0, 0.0),
            g1(8.0, 8.0, 0.0),
            g1(9.0, 9.0, 0.0),
        ];
        let fine: Vec<Line> = GeometricSimplify::new(lines.clone().into_iter(), 0.005, 0.005).collect();
        let coarse: Vec<Line> = GeometricSimplify::new(lines.into_iter(), 0.5, 0.5).collect();
        assert!(coarse.len() < fine.len());
        assert_eq!(coarse.len(), 2);
    }

    // -- GeometricSimplify: arc fit ------------------------------------------

    #[test]
    fn fits_a_run_of_chords_sampling_a_circle() {
        let radius = 25.0;
        let n = 13;
        let mut lines = Vec::new();
        for i in 0..=n {
            let theta = std::f64::consts::PI * (i as f64) / (n as f64);
            lines.push(g1(radius * theta.cos(), radius * theta.sin(), 0.0));
        }
        let out: Vec<Line> = GeometricSimplify::new(lines.into_iter(), 0.005, 0.5).collect();
        let has_arc = out.iter().any(|l| {
            l.tokens.iter().any(|t| t.is_command_letter_code('G', 2.0) || t.is_command_letter_code('G', 3.0))
        });
        assert!(has_arc);
        assert!(out.len() < n + 1);
    }
}
