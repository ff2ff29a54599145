//! Phase 3: textual minimisation and annotation (spec §4.5).
//!
//! Three independent steps, applied in order by the caller (selected-token
//! dedup streams; annotation and join need the whole line to resolve
//! cross-token context and blank-run collapsing, so they operate on a
//! materialised `Vec<Line>`/`Vec<String>`):
//!
//! 1. [`SelectedTokenDedup`] (§4.5.1) drops repeated letter/value pairs
//!    against a rolling carrier.
//! 2. [`annotate`] (§4.5.2) appends a catalogue-driven comment to
//!    non-trivial lines, grounded on the teacher's
//!    `postprocessor::formatter::render_template` brace-substitution style.
//! 3. [`join`] (§4.5.3) renders the final text, dropping `N` tokens unless
//!    configured to keep them, and collapsing blank-line runs.

use std::collections::HashMap;

use crate::catalogue::Catalogue;
use crate::config::MinimiseStrategy;
use crate::token::{Line, Token};

// ---------------------------------------------------------------------
// 4.5.1 Selected-token dedup
// ---------------------------------------------------------------------

/// Drops any `Argument`/`Code` token whose `(letter, value)` repeats the
/// carrier's last-seen value for that letter, then updates the carrier from
/// the line's surviving occurrences (spec §4.5.1).
pub struct SelectedTokenDedup<I: Iterator<Item = Line>> {
    inner: I,
    selection: Vec<char>,
    carrier: HashMap<char, f64>,
}

impl<I: Iterator<Item = Line>> SelectedTokenDedup<I> {
    pub fn new(inner: I, strategy: &MinimiseStrategy) -> Self {
        let selection = strategy.dedup_letters();
        let carrier = selection.iter().map(|&l| (l, 0.0)).collect();
        SelectedTokenDedup {
            inner,
            selection,
            carrier,
        }
    }

    fn selected_value(&self, token: &Token) -> Option<(char, f64)> {
        let (letter, value) = match token {
            Token::Argument { letter, value } => (*letter, *value),
            Token::Code { letter, value } => (*letter, *value),
            _ => return None,
        };
        self.selection.contains(&letter).then_some((letter, value))
    }
}

impl<I: Iterator<Item = Line>> Iterator for SelectedTokenDedup<I> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        let line = self.inner.next()?;
        let mut kept = Vec::with_capacity(line.tokens.len());
        for token in line.tokens {
            if let Some((letter, value)) = self.selected_value(&token) {
                if self.carrier.get(&letter) == Some(&value) {
                    continue;
                }
            }
            kept.push(token);
        }
        for token in &kept {
            if let Some((letter, value)) = self.selected_value(token) {
                self.carrier.insert(letter, value);
            }
        }
        Some(Line::new(kept))
    }
}

// ---------------------------------------------------------------------
// 4.5.2 Annotation
// ---------------------------------------------------------------------

/// Renders a numeric token's value the way the rest of the crate's
/// canonical text does (trimmed, no trailing `.0`).
fn format_numeric(value: f64) -> String {
    if (value - value.trunc()).abs() < 1e-9 {
        format!("{}", value.trunc() as i64)
    } else {
        format!("{value}")
    }
}

/// Builds the context dictionary for one line: every token's
/// `replacements[source]` contributions, plus a `{letter}value` entry for
/// every token carrying a numeric value, so a later token's template can
/// reference an earlier token's value on the same line.
fn build_context(line: &Line, catalogue: &Catalogue) -> HashMap<String, String> {
    let mut ctx = HashMap::new();
    for token in &line.tokens {
        if let Some(vars) = catalogue.context_for(&token.canonical_text()) {
            for (k, v) in vars {
                ctx.insert(k.clone(), v.clone());
            }
        }
        if let (Some(letter), Some(value)) = (token.letter(), token.numeric_value()) {
            ctx.insert(format!("{letter}value"), format_numeric(value));
        }
    }
    ctx
}

/// The annotation template for `token`: by its full canonical text first,
/// falling back to its bare letter when it carries a numeric value.
fn template_for(token: &Token, catalogue: &Catalogue) -> Option<String> {
    if let Some(t) = catalogue.template_for(&token.canonical_text()) {
        return Some(t.to_string());
    }
    if token.numeric_value().is_some() {
        if let Some(letter) = token.letter() {
            if let Some(t) = catalogue.template_for(&letter.to_string()) {
                return Some(t.to_string());
            }
        }
    }
    None
}

/// Substitutes every `{key}` in `template` from `ctx`; unknown keys are left
/// verbatim, including their braces (grounded on the teacher's
/// `render_template`, generalised from a fixed-field struct to an arbitrary
/// string map).
fn substitute(template: &str, ctx: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '{' {
            result.push(ch);
            continue;
        }
        let mut key = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            key.push(inner);
        }
        if !closed {
            result.push('{');
            result.push_str(&key);
            continue;
        }
        match ctx.get(&key) {
            Some(value) => result.push_str(value),
            None => {
                result.push('{');
                result.push_str(&key);
                result.push('}');
            }
        }
    }
    result
}

/// Appends a parenthesised annotation comment to each non-trivial line,
/// suppressing it when this line's contributing-letter sequence repeats the
/// previous emitted annotation's (spec §4.5.2).
pub fn annotate(lines: Vec<Line>, catalogue: &Catalogue) -> Vec<Line> {
    let mut out = Vec::with_capacity(lines.len());
    let mut prev_signature: Option<Vec<char>> = None;

    for mut line in lines {
        if line.is_not_command_code_or_arguments() {
            out.push(line);
            continue;
        }

        let ctx = build_context(&line, catalogue);
        let mut pieces = Vec::new();
        let mut signature = Vec::new();
        for token in &line.tokens {
            if let Some(template) = template_for(token, catalogue) {
                pieces.push(substitute(&template, &ctx));
                if let Some(letter) = token.letter() {
                    signature.push(letter);
                }
            }
        }

        if !pieces.is_empty() && prev_signature.as_ref() != Some(&signature) {
            line.push(Token::Comment(pieces.join(", ")));
        }
        if !pieces.is_empty() {
            prev_signature = Some(signature);
        }
        out.push(line);
    }

    out
}

// ---------------------------------------------------------------------
// 4.5.3 Join
// ---------------------------------------------------------------------

/// Renders the final line text: drops `N` tokens unless `line_numbers` is
/// set, joins tokens with the strategy's separator, suppresses leading blank
/// lines, and collapses runs of two or more blank lines to one (spec §4.5.3).
pub fn join(lines: &[Line], strategy: &MinimiseStrategy, line_numbers: bool) -> Vec<String> {
    let separator = strategy.join_separator();
    let mut rendered: Vec<String> = lines
        .iter()
        .map(|line| {
            let tokens: Vec<&Token> = line
                .tokens
                .iter()
                .filter(|t| line_numbers || !t.is_line_number())
                .collect();
            tokens
                .iter()
                .map(|t| t.canonical_text())
                .collect::<Vec<_>>()
                .join(separator)
        })
        .collect();

    let mut start = 0;
    while start < rendered.len() && rendered[start].is_empty() {
        start += 1;
    }
    rendered.drain(..start);

    let mut out: Vec<String> = Vec::with_capacity(rendered.len());
    let mut blank_run = 0;
    for line in rendered {
        if line.is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                out.push(line);
            }
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(tokens: Vec<Token>) -> Line {
        Line::new(tokens)
    }

    // -- SelectedTokenDedup --------------------------------------------------

    #[test]
    fn drops_repeated_feed_and_speed() {
        let strategy = MinimiseStrategy::Soft;
        let lines = vec![
            line(vec![Token::command('G', 1.0), Token::code('F', 100.0)]),
            line(vec![Token::command('G', 1.0), Token::code('F', 100.0)]),
            line(vec![Token::command('G', 1.0), Token::code('F', 200.0)]),
        ];
        let out: Vec<Line> = SelectedTokenDedup::new(lines.into_iter(), &strategy).collect();
        assert!(out[0].has_argument('F') || out[0].tokens.iter().any(|t| matches!(t, Token::Code{letter:'F',..})));
        assert!(!out[1].tokens.iter().any(|t| matches!(t, Token::Code{letter:'F',..})));
        assert!(out[2].tokens.iter().any(|t| matches!(t, Token::Code{letter:'F', value} if (*value - 200.0).abs() < 1e-9)));
    }

    #[test]
    fn soft_strategy_never_touches_xyz() {
        let strategy = MinimiseStrategy::Soft;
        let lines = vec![
            line(vec![Token::command('G', 1.0), Token::argument('X', 5.0)]),
            line(vec![Token::command('G', 1.0), Token::argument('X', 5.0)]),
        ];
        let out: Vec<Line> = SelectedTokenDedup::new(lines.into_iter(), &strategy).collect();
        assert!(out[1].has_argument('X'));
    }

    #[test]
    fn hard_and_medium_strategy_dedups_xyz() {
        let strategy = MinimiseStrategy::Hard;
        let lines = vec![
            line(vec![Token::command('G', 1.0), Token::argument('X', 5.0)]),
            line(vec![Token::command('G', 1.0), Token::argument('X', 5.0)]),
        ];
        let out: Vec<Line> = SelectedTokenDedup::new(lines.into_iter(), &strategy).collect();
        assert!(!out[1].has_argument('X'));
    }

    // -- annotate -------------------------------------------------------------

    #[test]
    fn annotates_and_suppresses_duplicate_signature() {
        let catalogue = Catalogue::parse(
            r#"{"tokenDefs": {"G1": "linear move"}}"#,
        )
        .unwrap();
        let lines = vec![
            line(vec![Token::command('G', 1.0), Token::argument('X', 1.0)]),
            line(vec![Token::command('G', 1.0), Token::argument('X', 2.0)]),
        ];
        let out = annotate(lines, &catalogue);
        assert!(out[0].tokens.iter().any(Token::is_comment));
        assert!(!out[1].tokens.iter().any(Token::is_comment));
    }

    #[test]
    fn replacement_context_feeds_later_template() {
        let catalogue = Catalogue::parse(
            r#"{
                "replacements": {"G21": {"lengthUnits": "mm"}},
                "tokenDefs": {"X": "X in {lengthUnits}"}
            }"#,
        )
        .unwrap();
        let lines = vec![line(vec![
            Token::command('G', 21.0),
            Token::argument('X', 5.0),
        ])];
        let out = annotate(lines, &catalogue);
        let comment = out[0]
            .tokens
            .iter()
            .find_map(|t| match t {
                Token::Comment(text) => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert!(comment.contains("X in mm"));
    }

    // -- join -------------------------------------------------------------

    #[test]
    fn join_drops_line_numbers_by_default() {
        let lines = vec![line(vec![Token::LineNumber(10), Token::command('G', 1.0)])];
        let out = join(&lines, &MinimiseStrategy::Soft, false);
        assert_eq!(out[0], "G1");
    }

    #[test]
    fn join_keeps_line_numbers_when_configured() {
        let lines = vec![line(vec![Token::LineNumber(10), Token::command('G', 1.0)])];
        let out = join(&lines, &MinimiseStrategy::Soft, true);
        assert_eq!(out[0], "N10 G1");
    }

    #[test]
    fn join_suppresses_leading_blank_lines() {
        let lines = vec![Line::empty(), Line::empty(), line(vec![Token::command('G', 1.0)])];
        let out = join(&lines, &MinimiseStrategy::Soft, false);
        assert_eq!(out, vec!["G1".to_string()]);
    }

    #[test]
    fn join_collapses_blank_runs() {
        let lines = vec![
            line(vec![Token::command('G', 1.0)]),
            Line::empty(),
            Line::empty(),
            Line::empty(),
            line(vec![Token::command('G', 2.0), Token::argument('X', 1.0), Token::argument('Y', 0.0)]),
        ];
        let out = join(&lines, &MinimiseStrategy::Soft, false);
        assert_eq!(out, vec!["G1".to_string(), "".to_string(), "G2 X1 Y0".to_string()]);
    }

    #[test]
    fn hard_strategy_joins_without_separator() {
        let lines = vec![line(vec![Token::command('G', 1.0), Token::argument('X', 1.0)])];
        let out = join(&lines, &MinimiseStrategy::Hard, false);
        assert_eq!(out[0], "G1X1");
    }
}
