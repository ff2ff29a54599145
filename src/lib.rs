//! GCodeClean: a G-code post-processor that cleans, simplifies and splits
//! RS-274 milling programs (spec §1-§2).
//!
//! The pipeline is a sequence of streaming transforms over [`token::Line`]:
//! [`tokenizer`] turns raw text into tokens, [`phase1`] strips and
//! normalises the preamble, [`preamble`] re-injects a canonical
//! preamble/postamble with a Z-travel safety clamp, [`phase2`] converts
//! arcs to center form and simplifies colinear/near-circular runs,
//! [`phase3`] deduplicates repeated words and (optionally) annotates and
//! renders the final text. [`splitter`] consumes a cleaned file's
//! `Travelling` comments to materialise one file per cut. [`pipeline`]
//! wires all of the above into the two operations exposed at the CLI
//! boundary.

pub mod catalogue;
pub mod config;
pub mod context;
pub mod coord;
pub mod error;
pub mod geometry;
pub mod io;
pub mod phase1;
pub mod phase2;
pub mod phase3;
pub mod pipeline;
pub mod preamble;
pub mod splitter;
pub mod token;
pub mod tokenizer;

pub use config::Config;
pub use error::GCodeCleanError;

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`
/// (defaulting to `info`), matching the teacher's logging setup. Returns the
/// non-blocking appender's guard, which the caller must hold for the
/// lifetime of the process.
pub fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .init();
    guard
}
