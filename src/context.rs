//! Modal state tracking (spec §3 "Context", §4.2.1, §4.3).
//!
//! A [`Context`] plays two roles across the pipeline: during preamble
//! stripping it accumulates every line seen before the first motion command,
//! tagging each with whether it has been emitted yet; afterwards it is
//! read-only, answering "what is currently active in modal group G?" for
//! the preamble/postamble injector.

use crate::token::{Line, Token};

/// The modal groups spec §3 calls out by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalGroup {
    Plane,
    Distance,
    FeedRate,
    Units,
    Coolant,
    Spindle,
    Tool,
    CoordSystem,
    Motion,
}

impl ModalGroup {
    pub const ALL: [ModalGroup; 9] = [
        ModalGroup::Plane,
        ModalGroup::Distance,
        ModalGroup::FeedRate,
        ModalGroup::Units,
        ModalGroup::Coolant,
        ModalGroup::Spindle,
        ModalGroup::Tool,
        ModalGroup::CoordSystem,
        ModalGroup::Motion,
    ];
}

/// Returns every modal group that `line` sets, if any.
pub fn groups_touched(line: &Line) -> Vec<ModalGroup> {
    let mut groups = Vec::new();
    for token in &line.tokens {
        match token {
            Token::Command { letter: 'G', code } => {
                if matches!(code, c if [17.0, 18.0, 19.0].contains(c)) {
                    groups.push(ModalGroup::Plane);
                } else if matches!(code, 90.0 | 91.0) {
                    groups.push(ModalGroup::Distance);
                } else if matches!(code, 93.0 | 94.0) {
                    groups.push(ModalGroup::FeedRate);
                } else if matches!(code, 20.0 | 21.0) {
                    groups.push(ModalGroup::Units);
                } else if (54.0..=59.3).contains(code) {
                    groups.push(ModalGroup::CoordSystem);
                } else if [0.0, 1.0, 2.0, 3.0].contains(code) || (80.0..=89.0).contains(code) {
                    groups.push(ModalGroup::Motion);
                }
            }
            Token::Command { letter: 'M', code } => {
                if matches!(code, 7.0 | 8.0 | 9.0) {
                    groups.push(ModalGroup::Coolant);
                } else if matches!(code, 3.0 | 4.0 | 5.0) {
                    groups.push(ModalGroup::Spindle);
                }
            }
            Token::Code { letter: 'T', .. } => groups.push(ModalGroup::Tool),
            _ => {}
        }
    }
    groups
}

/// An ordered log of modal-context lines plus the currently active value per
/// modal group.
#[derive(Debug, Clone, Default)]
pub struct Context {
    entries: Vec<(Line, bool)>,
    current: std::collections::HashMap<ModalGroup, Line>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Records `line`'s effect on whichever modal groups it touches, and
    /// appends it (as not-yet-output) to the entry log.
    ///
    /// When `only_if_unset` is true, a group's value is only recorded the
    /// first time it is seen (used while accumulating the preamble, where
    /// later repeats of an already-resolved group shouldn't clobber it).
    pub fn update(&mut self, line: &Line, only_if_unset: bool) {
        for group in groups_touched(line) {
            if only_if_unset && self.current.contains_key(&group) {
                continue;
            }
            self.current.insert(group, line.clone());
        }
        self.entries.push((line.clone(), false));
    }

    /// Lines recorded but not yet flagged as emitted, in recorded order.
    pub fn non_output_lines(&self) -> Vec<Line> {
        self.entries
            .iter()
            .filter(|(_, output)| !output)
            .map(|(line, _)| line.clone())
            .collect()
    }

    pub fn flag_all_as_output(&mut self) {
        for (_, output) in self.entries.iter_mut() {
            *output = true;
        }
    }

    pub fn get_modal_state(&self, group: ModalGroup) -> Option<&Line> {
        self.current.get(&group)
    }

    /// `"mm"` or `"in"`, defaulting to `"mm"` when no units line has been seen.
    pub fn get_length_units(&self) -> &'static str {
        match self.get_modal_state(ModalGroup::Units) {
            Some(line) if line.tokens.iter().any(|t| t.is_command_letter_code('G', 20.0)) => "in",
            _ => "mm",
        }
    }
}
