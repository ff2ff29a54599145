//! Entry points wiring the tokenizer and phases 1-3 into the two operations
//! the CLI exposes: `clean` (spec §4) and `split` (spec §4.6).
//!
//! Kept deliberately thin: every phase already knows how to transform
//! `Line`/`String` sequences on its own, so this module's job is just
//! sequencing, materialising where a phase needs the whole program (arc
//! fitting's lookahead, travelling-comment insertion, annotation, join), and
//! emitting the `tracing` spans a caller would want around each phase
//! boundary.

use std::cell::RefCell;
use std::rc::Rc;

use crate::catalogue::Catalogue;
use crate::config::Config;
use crate::context::Context;
use crate::error::GCodeCleanError;
use crate::io::{LineSink, LineSource};
use crate::phase1;
use crate::phase2;
use crate::phase3;
use crate::preamble;
use crate::splitter;
use crate::token::Line;
use crate::tokenizer;

/// Runs the full clean pipeline: tokenize, strip/restore the preamble,
/// simplify the geometry, minimise and (optionally) annotate the text, and
/// write the result to `sink`.
///
/// `tool` names the active tool for travelling-comment text (spec §3); the
/// caller typically reads it from the first `T` word of the input, or passes
/// an empty string when none is known.
pub fn clean(
    source: Box<dyn LineSource>,
    sink: &mut dyn LineSink,
    config: &Config,
    tool: &str,
) -> Result<(), GCodeCleanError> {
    tracing::info!(tolerance = config.tolerance, arc_tolerance = config.arc_tolerance, "starting clean");

    let catalogue = match &config.token_defs {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading token-definition catalogue");
            Catalogue::load(path)?
        }
        None => Catalogue::empty(),
    };

    let raw_lines = source.lines();
    let tokens = tokenizer::tokenize(raw_lines);

    let captured_preamble: Rc<RefCell<Vec<Line>>> = Rc::new(RefCell::new(Vec::new()));
    let phase1_lines: Vec<Line> = phase1::phase1(tokens, captured_preamble.clone()).collect();
    tracing::debug!(lines = phase1_lines.len(), "phase 1 complete");

    let mut context = Context::new();
    for line in captured_preamble.borrow().iter() {
        context.update(line, false);
    }

    let with_preamble = preamble::inject_preamble(&context, phase1_lines.into_iter());
    let clamped = with_preamble.map(|line| preamble::clamp_rapid_z(line, config.z_clamp));
    let with_postamble = preamble::inject_postamble(clamped, config.z_clamp);

    let phase2_lines: Vec<Line> = phase2::phase2(with_postamble, config.tolerance, config.arc_tolerance).collect();
    tracing::debug!(lines = phase2_lines.len(), "phase 2 geometric simplification complete");

    let phase2_lines = if config.eliminate_needless_travelling {
        let with_travel = phase2::insert_travelling_comments(phase2_lines, config.z_clamp, config.tolerance, tool);
        tracing::debug!(lines = with_travel.len(), "travelling comments inserted");
        with_travel
    } else {
        phase2_lines
    };

    let deduped: Vec<Line> =
        phase3::SelectedTokenDedup::new(phase2_lines.into_iter(), &config.minimise).collect();

    let annotated = if config.annotate {
        let annotated = phase3::annotate(deduped, &catalogue);
        tracing::debug!("annotation applied");
        annotated
    } else {
        deduped
    };

    let rendered = phase3::join(&annotated, &config.minimise, config.line_numbers);
    tracing::info!(lines = rendered.len(), "clean complete");

    for line in rendered {
        sink.write_line(&line)?;
    }
    sink.flush()
}

/// Splits a previously cleaned file into one file per cut (spec §4.6).
///
/// `lines` must already carry `Travelling` comments (i.e. have been through
/// [`clean`] with `eliminate_needless_travelling` enabled); otherwise this
/// returns [`GCodeCleanError::NotPreProcessed`].
pub fn split(source: Box<dyn LineSource>, folder: &std::path::Path) -> Result<(), GCodeCleanError> {
    let lines: Vec<String> = source.lines().collect();
    tracing::info!(lines = lines.len(), folder = %folder.display(), "starting split");
    splitter::split(lines, folder)?;
    tracing::info!("split complete");
    Ok(())
}
