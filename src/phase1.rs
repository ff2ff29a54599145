//! Phase 1: normalisation (spec §4.2).
//!
//! Three responsibilities, each a small `Iterator` adapter chained in
//! [`phase1`]:
//!
//! 1. [`StripPreamble`] consumes every line up to the first motion command,
//!    recording them as the captured preamble (spec §4.2.1) rather than
//!    letting them flow through inline; it also truncates at a
//!    previously-injected postamble marker, so re-running stays idempotent.
//! 2. [`split_line`] breaks a line carrying several modal-group-distinct
//!    commands into one command per line, in RS-274's canonical order of
//!    execution, keeping each command's own words attached to it.
//! 3. [`Augment`] carries the last-seen X/Y/Z (and, for arcs, I/J/K) forward
//!    onto motion lines that omit them, so every motion line downstream is
//!    fully explicit.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::coord::{Axis, Coord};
use crate::token::{Line, Token};

/// Marks the start of an injected preamble block (spec §6).
pub const PREAMBLE_COMPLETION_MARKER: &str = "Preamble completion by GCodeClean";
/// Marks the end of an injected preamble block (spec §6).
pub const PREAMBLE_MARKER: &str = "Preamble completed by GCodeClean";
/// Marks the start of an injected postamble block (spec §6).
pub const POSTAMBLE_MARKER: &str = "Postamble completed by GCodeClean";
/// A motion command is expected within this many lines of the top of the
/// file; if none appears, there is no preamble to strip and the buffered
/// lines are passed through untouched.
pub const PREAMBLE_SCAN_CAP: usize = 100;

fn is_marker_comment(line: &Line, marker: &str) -> bool {
    matches!(line.tokens.as_slice(), [Token::Comment(text)] if text.trim() == marker)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StripState {
    Scanning,
    Passthrough,
    Stopped,
}

/// Resolves and strips the preamble from the front of the stream (spec
/// §4.2.1): every line up to (but not including) the first motion command
/// is captured rather than emitted, so [`crate::preamble`] can rebuild a
/// [`crate::context::Context`] from whatever modal state the preamble
/// resolved. This also makes re-running idempotent, since a previously
/// injected preamble's marker comments and modal lines are just more
/// non-motion lines to capture and re-derive state from.
///
/// Once in the body, a previously-injected postamble marker truncates the
/// stream, so a re-run's own postamble isn't captured as program content.
pub struct StripPreamble<I: Iterator<Item = Line>> {
    inner: I,
    state: StripState,
    buffer: VecDeque<Line>,
    captured: Rc<RefCell<Vec<Line>>>,
}

impl<I: Iterator<Item = Line>> StripPreamble<I> {
    pub fn new(inner: I, captured: Rc<RefCell<Vec<Line>>>) -> Self {
        StripPreamble {
            inner,
            state: StripState::Scanning,
            buffer: VecDeque::new(),
            captured,
        }
    }
}

impl<I: Iterator<Item = Line>> Iterator for StripPreamble<I> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        loop {
            match self.state {
                StripState::Stopped => return None,
                StripState::Passthrough => {
                    let line = match self.buffer.pop_front() {
                        Some(line) => line,
                        None => self.inner.next()?,
                    };
                    if is_marker_comment(&line, POSTAMBLE_MARKER) {
                        self.state = StripState::Stopped;
                        return None;
                    }
                    return Some(line);
                }
                StripState::Scanning => {
                    if self.buffer.len() >= PREAMBLE_SCAN_CAP {
                        // No motion command within the scan window: nothing
                        // to strip, replay the buffered lines untouched.
                        self.state = StripState::Passthrough;
                        continue;
                    }
                    match self.inner.next() {
                        Some(line) => {
                            if line.has_movement_command() {
                                for discarded in self.buffer.drain(..) {
                                    self.captured.borrow_mut().push(discarded);
                                }
                                self.state = StripState::Passthrough;
                                return Some(line);
                            }
                            self.buffer.push_back(line);
                        }
                        None => self.state = StripState::Passthrough,
                    }
                }
            }
        }
    }
}

/// This command's rank in RS-274's canonical order of execution (lower runs
/// first). Ties (e.g. two coolant words on one line) keep their original
/// relative order via a stable sort.
fn canonical_rank(letter: char, code: f64) -> usize {
    let is = |set: &[f64]| set.contains(&code);
    match letter {
        'G' if is(&[93.0, 94.0]) => 2,
        'M' if code == 6.0 => 6,
        'M' if is(&[3.0, 4.0]) => 7,
        'M' if is(&[7.0, 8.0, 9.0]) => 8,
        'M' if is(&[48.0, 49.0]) => 9,
        'G' if code == 4.0 => 10,
        'G' if is(&[17.0, 18.0, 19.0]) => 11,
        'G' if is(&[20.0, 21.0]) => 12,
        'G' if is(&[40.0, 41.0, 42.0]) => 13,
        'G' if is(&[43.0, 49.0]) => 14,
        'G' if (54.0..=59.3).contains(&code) => 15,
        'G' if is(&[61.0, 61.1, 64.0]) => 16,
        'G' if is(&[90.0, 91.0]) => 17,
        'G' if is(&[98.0, 99.0]) => 18,
        'G' if is(&[10.0, 28.0, 30.0, 92.0]) => 19,
        'G' if is(&[0.0, 1.0, 2.0, 3.0]) || (80.0..=89.0).contains(&code) => 20,
        // Spindle-stop closes out the motion it follows rather than pre-empting it (spec §8 S5).
        'M' if code == 5.0 => 21,
        'M' if is(&[0.0, 1.0, 2.0, 30.0, 60.0]) => 22,
        _ => 99,
    }
}

fn is_motion_class(letter: char, code: f64) -> bool {
    canonical_rank(letter, code) == 20 || (letter == 'G' && code == 92.0)
}

/// Splits a line carrying several commands into one command per line, each
/// retaining the code/argument words that belong with it. Lines with at
/// most one command pass through unchanged.
pub fn split_line(line: &Line) -> Vec<Line> {
    let leading: Vec<Token> = line
        .tokens
        .iter()
        .take_while(|t| matches!(t, Token::LineNumber(_)))
        .cloned()
        .collect();

    let mut commands: Vec<(char, f64)> = Vec::new();
    let mut words: Vec<Token> = Vec::new();
    let mut others: Vec<Token> = Vec::new();

    for token in line.tokens.iter().skip(leading.len()) {
        match token {
            Token::Command { letter, code } => commands.push((*letter, *code)),
            Token::Code { .. } | Token::Argument { .. } => words.push(token.clone()),
            other => others.push(other.clone()),
        }
    }

    if commands.len() <= 1 {
        return vec![line.clone()];
    }

    let mut ranked: Vec<(usize, char, f64)> =
        commands.iter().enumerate().map(|(i, (l, c))| (i, *l, *c)).collect();
    ranked.sort_by_key(|(i, l, c)| (canonical_rank(*l, *c), *i));

    let motion_idx = ranked.iter().position(|(_, l, c)| is_motion_class(*l, *c));
    let host_idx = motion_idx.unwrap_or(ranked.len() - 1);

    let mut result = Vec::with_capacity(ranked.len() + 1);
    for (pos, (_, letter, code)) in ranked.iter().enumerate() {
        // The line-number token is a once-per-line prefix (spec §4.2.2 step 1),
        // not repeated onto every command split out of the original line.
        let mut tokens = if pos == 0 { leading.clone() } else { Vec::new() };
        tokens.push(Token::command(*letter, *code));
        if pos == host_idx {
            tokens.extend(words.iter().cloned());
        }
        result.push(Line::new(tokens));
    }
    if !others.is_empty() {
        result.push(Line::new(others));
    }
    result
}

#[derive(Debug, Clone, Copy, Default)]
struct IjkCarrier {
    i: Option<f64>,
    j: Option<f64>,
    k: Option<f64>,
}

impl IjkCarrier {
    fn get(&self, letter: char) -> Option<f64> {
        match letter {
            'I' => self.i,
            'J' => self.j,
            'K' => self.k,
            _ => None,
        }
    }

    fn set(&mut self, letter: char, value: f64) {
        match letter {
            'I' => self.i = Some(value),
            'J' => self.j = Some(value),
            'K' => self.k = Some(value),
            _ => {}
        }
    }
}

/// Carries the last-seen X/Y/Z forward onto motion lines missing them, and
/// the last-seen I/J/K forward onto arc lines missing them, so every
/// motion line downstream is fully explicit.
pub struct Augment<I: Iterator<Item = Line>> {
    inner: I,
    prev_xyz: Coord,
    prev_ijk: IjkCarrier,
}

impl<I: Iterator<Item = Line>> Augment<I> {
    pub fn new(inner: I) -> Self {
        Augment {
            inner,
            prev_xyz: Coord::empty(),
            prev_ijk: IjkCarrier::default(),
        }
    }
}

fn is_arc_command(line: &Line) -> bool {
    line.tokens
        .iter()
        .any(|t| matches!(t, Token::Command { letter: 'G', code } if *code == 2.0 || *code == 3.0))
}

impl<I: Iterator<Item = Line>> Iterator for Augment<I> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        let mut line = self.inner.next()?;

        if line.has_movement_command() {
            for axis in Axis::ALL {
                if !line.has_argument(axis.letter()) {
                    if let Some(v) = self.prev_xyz.get(axis) {
                        line.push(Token::argument(axis.letter(), v));
                    }
                }
            }
            for axis in Axis::ALL {
                if let Some(v) = line.argument_value(axis.letter()) {
                    self.prev_xyz = self.prev_xyz.with(axis, v);
                }
            }

            if is_arc_command(&line) && !line.has_argument('R') {
                for letter in ['I', 'J', 'K'] {
                    if !line.has_argument(letter) {
                        if let Some(v) = self.prev_ijk.get(letter) {
                            line.push(Token::argument(letter, v));
                        }
                    }
                }
                for letter in ['I', 'J', 'K'] {
                    if let Some(v) = line.argument_value(letter) {
                        self.prev_ijk.set(letter, v);
                    }
                }
            }
        }

        Some(line)
    }
}

/// Chains preamble stripping, splitting, and argument augmentation into the
/// full Phase 1 transform.
pub fn phase1<I>(lines: I, captured_preamble: Rc<RefCell<Vec<Line>>>) -> impl Iterator<Item = Line>
where
    I: Iterator<Item = Line> + 'static,
{
    let stripped = StripPreamble::new(lines, captured_preamble);
    let split = stripped.flat_map(|line| split_line(&line));
    Augment::new(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(text: &str) -> Line {
        Line::new(vec![Token::Comment(text.to_string())])
    }

    #[test]
    fn strip_preamble_captures_a_previously_injected_marker_block_on_a_rerun() {
        let lines = vec![
            comment("setup"),
            Line::new(vec![Token::command('G', 90.0)]),
            comment(PREAMBLE_MARKER),
            Line::new(vec![Token::command('G', 1.0), Token::argument('X', 1.0)]),
        ];
        let captured = Rc::new(RefCell::new(Vec::new()));
        let stripped: Vec<Line> = StripPreamble::new(lines.into_iter(), captured.clone()).collect();
        assert_eq!(stripped.len(), 1);
        assert!(stripped[0].tokens[0].is_command_letter_code('G', 1.0));
        assert_eq!(captured.borrow().len(), 3);
    }

    #[test]
    fn strip_preamble_captures_leading_lines_up_to_the_first_motion_command() {
        let lines = vec![
            Line::new(vec![Token::command('G', 90.0)]),
            Line::new(vec![Token::command('G', 1.0), Token::argument('X', 1.0)]),
        ];
        let captured = Rc::new(RefCell::new(Vec::new()));
        let stripped: Vec<Line> = StripPreamble::new(lines.into_iter(), captured.clone()).collect();
        assert_eq!(stripped.len(), 1);
        assert!(stripped[0].tokens[0].is_command_letter_code('G', 1.0));
        assert_eq!(captured.borrow().len(), 1);
        assert!(captured.borrow()[0].tokens[0].is_command_letter_code('G', 90.0));
    }

    #[test]
    fn strip_preamble_with_no_motion_command_passes_through_uncaptured() {
        let lines = vec![comment("setup"), Line::new(vec![Token::command('G', 90.0)])];
        let captured = Rc::new(RefCell::new(Vec::new()));
        let stripped: Vec<Line> = StripPreamble::new(lines.into_iter(), captured.clone()).collect();
        assert_eq!(stripped.len(), 2);
        assert!(captured.borrow().is_empty());
    }

    #[test]
    fn strip_postamble_truncates_stream_at_marker() {
        let lines = vec![
            Line::new(vec![Token::command('G', 1.0), Token::argument('X', 1.0)]),
            comment(POSTAMBLE_MARKER),
            Line::new(vec![Token::command('M', 30.0)]),
        ];
        let captured = Rc::new(RefCell::new(Vec::new()));
        let stripped: Vec<Line> = StripPreamble::new(lines.into_iter(), captured).collect();
        assert_eq!(stripped.len(), 1);
    }

    #[test]
    fn split_line_passes_through_single_command() {
        let line = Line::new(vec![Token::command('G', 1.0), Token::argument('X', 1.0)]);
        let split = split_line(&line);
        assert_eq!(split.len(), 1);
    }

    #[test]
    fn split_line_orders_by_canonical_rank() {
        // G90 (distance, rank 17) then G1 (motion, rank 20): already in order.
        let line = Line::new(vec![
            Token::command('G', 90.0),
            Token::command('G', 1.0),
            Token::argument('X', 1.0),
        ]);
        let split = split_line(&line);
        assert_eq!(split.len(), 2);
        assert!(split[0].tokens[0].is_command_letter_code('G', 90.0));
        assert!(split[1].tokens[0].is_command_letter_code('G', 1.0));
        assert_eq!(split[1].argument_value('X'), Some(1.0));
    }

    #[test]
    fn split_line_reorders_out_of_order_commands() {
        // G1 written before G90 in the source must still execute distance-mode first.
        let line = Line::new(vec![
            Token::command('G', 1.0),
            Token::command('G', 90.0),
            Token::argument('X', 1.0),
        ]);
        let split = split_line(&line);
        assert!(split[0].tokens[0].is_command_letter_code('G', 90.0));
        assert!(split[1].tokens[0].is_command_letter_code('G', 1.0));
    }

    #[test]
    fn split_line_attaches_words_to_motion_command() {
        let line = Line::new(vec![
            Token::command('M', 8.0),
            Token::command('G', 1.0),
            Token::argument('X', 1.0),
            Token::code('F', 100.0),
        ]);
        let split = split_line(&line);
        assert_eq!(split.len(), 2);
        let motion = split.iter().find(|l| l.tokens[0].is_command_letter_code('G', 1.0)).unwrap();
        assert_eq!(motion.argument_value('X'), Some(1.0));
        assert_eq!(motion.tokens.iter().find_map(|t| match t {
            Token::Code { letter: 'F', value } => Some(*value),
            _ => None,
        }), Some(100.0));
    }

    #[test]
    fn split_line_attaches_line_number_only_to_first_output_line() {
        let line = Line::new(vec![
            Token::LineNumber(33),
            Token::command('G', 90.0),
            Token::command('G', 1.0),
            Token::argument('X', 1.0),
        ]);
        let split = split_line(&line);
        assert_eq!(split.len(), 2);
        assert!(matches!(split[0].tokens[0], Token::LineNumber(33)));
        assert!(!split[1].tokens.iter().any(|t| matches!(t, Token::LineNumber(_))));
    }

    #[test]
    fn split_line_emits_trailing_comment_as_its_own_line() {
        // S5: N33 G1 X1 Y2 Z3 F100 M5 (comment).
        let line = Line::new(vec![
            Token::LineNumber(33),
            Token::command('G', 1.0),
            Token::argument('X', 1.0),
            Token::argument('Y', 2.0),
            Token::argument('Z', 3.0),
            Token::code('F', 100.0),
            Token::command('M', 5.0),
            Token::Comment("comment".to_string()),
        ]);
        let split = split_line(&line);
        assert_eq!(split.len(), 3);
        assert!(split[0].tokens[0].is_command_letter_code('G', 1.0));
        assert_eq!(split[0].argument_value('X'), Some(1.0));
        assert!(split[1].tokens[0].is_command_letter_code('M', 5.0));
        assert!(matches!(&split[2].tokens[0], Token::Comment(text) if text == "comment"));
    }

    #[test]
    fn split_line_runs_spindle_stop_after_motion() {
        let line = Line::new(vec![
            Token::command('G', 1.0),
            Token::argument('X', 1.0),
            Token::command('M', 5.0),
        ]);
        let split = split_line(&line);
        assert!(split[0].tokens[0].is_command_letter_code('G', 1.0));
        assert!(split[1].tokens[0].is_command_letter_code('M', 5.0));
    }

    #[test]
    fn augment_carries_xyz_forward() {
        let lines = vec![
            Line::new(vec![Token::command('G', 1.0), Token::argument('X', 1.0), Token::argument('Y', 2.0), Token::argument('Z', 3.0)]),
            Line::new(vec![Token::command('G', 1.0), Token::argument('X', 5.0)]),
        ];
        let augmented: Vec<Line> = Augment::new(lines.into_iter()).collect();
        assert_eq!(augmented[1].argument_value('X'), Some(5.0));
        assert_eq!(augmented[1].argument_value('Y'), Some(2.0));
        assert_eq!(augmented[1].argument_value('Z'), Some(3.0));
    }

    #[test]
    fn augment_carries_ijk_forward_for_arcs_without_r() {
        let lines = vec![
            Line::new(vec![
                Token::command('G', 2.0),
                Token::argument('X', 1.0),
                Token::argument('Y', 0.0),
                Token::argument('Z', 0.0),
                Token::argument('I', 5.0),
                Token::argument('J', 0.0),
            ]),
            Line::new(vec![
                Token::command('G', 2.0),
                Token::argument('X', 0.0),
                Token::argument('Y', 1.0),
                Token::argument('Z', 0.0),
            ]),
        ];
        let augmented: Vec<Line> = Augment::new(lines.into_iter()).collect();
        assert_eq!(augmented[1].argument_value('I'), Some(5.0));
        assert_eq!(augmented[1].argument_value('J'), Some(0.0));
    }

    #[test]
    fn augment_does_not_carry_ijk_onto_r_format_arcs() {
        let lines = vec![
            Line::new(vec![
                Token::command('G', 2.0),
                Token::argument('X', 1.0),
                Token::argument('Y', 0.0),
                Token::argument('Z', 0.0),
                Token::argument('I', 5.0),
                Token::argument('J', 0.0),
            ]),
            Line::new(vec![
                Token::command('G', 2.0),
                Token::argument('X', 0.0),
                Token::argument('Y', 1.0),
                Token::argument('Z', 0.0),
                Token::argument('R', 5.0),
            ]),
        ];
        let augmented: Vec<Line> = Augment::new(lines.into_iter()).collect();
        assert_eq!(augmented[1].argument_value('I'), None);
    }

    #[test]
    fn augment_leaves_non_motion_lines_untouched() {
        let lines = vec![Line::new(vec![Token::command('G', 90.0)])];
        let augmented: Vec<Line> = Augment::new(lines.into_iter()).collect();
        assert_eq!(augmented[0].tokens.len(), 1);
    }
}
