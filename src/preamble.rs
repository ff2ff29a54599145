//! The preamble/postamble injector (spec §4.3): emits a canonical modal
//! preamble ahead of the cleaned body, clamps rapid-travel Z moves to a
//! safe minimum, and appends a canonical postamble.
//!
//! Per the recorded Open Question decision (DESIGN.md #2): with no
//! surviving upstream source for the literal preamble content, the
//! canonical preamble is derived structurally from the fixed modal-group
//! order below, emitting whatever value the stripped preamble's
//! [`Context`] actually resolved for each group — nothing is invented for
//! a group the input never touched.

use crate::context::{Context, ModalGroup};
use crate::coord::Axis;
use crate::phase1::{PREAMBLE_COMPLETION_MARKER, PREAMBLE_MARKER, POSTAMBLE_MARKER};
use crate::token::{Line, Token};

/// Fixed emission order for the canonical preamble.
const PREAMBLE_GROUP_ORDER: &[ModalGroup] = &[
    ModalGroup::Units,
    ModalGroup::Distance,
    ModalGroup::FeedRate,
    ModalGroup::Plane,
    ModalGroup::CoordSystem,
    ModalGroup::Spindle,
];

/// Builds the canonical preamble block (without the trailing marker line)
/// from whatever modal state `context` resolved, in fixed group order.
pub fn build_preamble(context: &Context) -> Vec<Line> {
    PREAMBLE_GROUP_ORDER
        .iter()
        .filter_map(|group| context.get_modal_state(*group).cloned())
        .collect()
}

fn marker_line(text: &str) -> Line {
    Line::new(vec![Token::Comment(text.to_string())])
}

/// Prepends the canonical preamble, sandwiched between
/// [`PREAMBLE_COMPLETION_MARKER`] and [`PREAMBLE_MARKER`], to `body`.
pub fn inject_preamble<I>(context: &Context, body: I) -> impl Iterator<Item = Line>
where
    I: Iterator<Item = Line>,
{
    let mut preamble = vec![marker_line(PREAMBLE_COMPLETION_MARKER)];
    preamble.extend(build_preamble(context));
    preamble.push(marker_line(PREAMBLE_MARKER));
    preamble.into_iter().chain(body)
}

/// Clamps every rapid-travel (`G0`) line's `Z` to at least `z_clamp`.
pub fn clamp_rapid_z(line: Line, z_clamp: f64) -> Line {
    if !line.tokens.iter().any(|t| t.is_command_letter_code('G', 0.0)) {
        return line;
    }
    let tokens = line
        .tokens
        .into_iter()
        .map(|t| match t {
            Token::Argument { letter: 'Z', value } if value < z_clamp => {
                Token::argument('Z', z_clamp)
            }
            other => other,
        })
        .collect();
    Line::new(tokens)
}

/// Appends the canonical postamble: a final retract to `z_clamp`, the
/// marker comment, and `M30`.
pub fn inject_postamble<I>(body: I, z_clamp: f64) -> impl Iterator<Item = Line>
where
    I: Iterator<Item = Line>,
{
    let final_retract = Line::new(vec![
        Token::command('G', 0.0),
        Token::argument(Axis::Z.letter(), z_clamp),
    ]);
    let postamble = vec![
        final_retract,
        marker_line(POSTAMBLE_MARKER),
        Line::new(vec![Token::command('M', 30.0)]),
    ];
    body.chain(postamble)
}
