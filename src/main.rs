//! `gcodeclean` command-line entry point.
//!
//! Thin per spec §1/§6: argument parsing is an external collaborator, not
//! part of the hard core, so this binary does nothing but parse `clap`
//! subcommands, wire a [`gcodeclean::Config`], and call into
//! [`gcodeclean::pipeline`]. Exit codes follow spec §6: `0` success, `1`
//! input file missing, other values reserved for token-def load failure and
//! splitter pre-processing failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gcodeclean::config::Config;
use gcodeclean::error::GCodeCleanError;
use gcodeclean::io::{FileLineSource, FileLineWriter};
use gcodeclean::pipeline;

#[derive(Parser)]
#[command(name = "gcodeclean")]
#[command(about = "Cleans, simplifies and splits RS-274 G-code programs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean a G-code file: normalise, simplify, minimise and annotate.
    Clean {
        /// The input G-code file.
        input: PathBuf,

        /// Emit trailing human-readable annotations on each line.
        #[arg(long)]
        annotate: bool,

        /// Preserve `N` line-number tokens in the output.
        #[arg(long)]
        line_numbers: bool,

        /// Minimisation strategy: `soft`, `medium`, `hard`, or a letter set.
        #[arg(long, default_value = "soft")]
        minimise: String,

        /// Colinear-dedup and clipping tolerance.
        #[arg(long)]
        tolerance: Option<f64>,

        /// Arc-fit tolerance.
        #[arg(long)]
        arc_tolerance: Option<f64>,

        /// Maximum travel Z.
        #[arg(long)]
        z_clamp: Option<f64>,

        /// Insert travelling-comment markers and collapse needless travel.
        #[arg(long)]
        eliminate_needless_travelling: bool,

        /// Path to the token-definition JSON catalogue.
        #[arg(long)]
        token_defs: Option<PathBuf>,

        /// Active tool name, used in travelling-comment text.
        #[arg(long, default_value = "")]
        tool: String,
    },
    /// Split an already-cleaned file (with travelling comments) into one
    /// file per cut.
    Split {
        /// The cleaned input G-code file.
        input: PathBuf,

        /// Output folder (deleted and recreated).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let _guard = gcodeclean::init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Clean {
            input,
            annotate,
            line_numbers,
            minimise,
            tolerance,
            arc_tolerance,
            z_clamp,
            eliminate_needless_travelling,
            token_defs,
            tool,
        } => {
            let mut config = Config::default();
            config.annotate = annotate;
            config.line_numbers = line_numbers;
            config.eliminate_needless_travelling = eliminate_needless_travelling;
            config.token_defs = token_defs;
            match minimise.try_into() {
                Ok(strategy) => config.minimise = strategy,
                Err(e) => {
                    eprintln!("gcodeclean: {e}");
                    return ExitCode::from(2);
                }
            }
            if let Some(t) = tolerance {
                config.tolerance = t;
            }
            if let Some(t) = arc_tolerance {
                config.arc_tolerance = t;
            }
            if let Some(z) = z_clamp {
                config.z_clamp = z;
            }
            config.validate_and_clamp();
            run_clean(&input, &config, &tool)
        }
        Command::Split { input, output } => {
            let folder = output.unwrap_or_else(|| default_output_stem(&input));
            run_split(&input, &folder)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(GCodeCleanError::InputNotFound(path)) => {
            eprintln!("gcodeclean: input file not found: {path}");
            ExitCode::from(1)
        }
        Err(GCodeCleanError::Catalogue(detail)) => {
            eprintln!("gcodeclean: token-definition catalogue error: {detail}");
            ExitCode::from(3)
        }
        Err(GCodeCleanError::NotPreProcessed(detail)) => {
            eprintln!("gcodeclean: {detail}");
            ExitCode::from(4)
        }
        Err(e) => {
            eprintln!("gcodeclean: {e}");
            ExitCode::from(5)
        }
    }
}

/// `<input-stem>-gcc<input-ext>`, defaulting to `.nc` when the input has no
/// extension (spec §6).
fn default_clean_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("nc");
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{stem}-gcc.{ext}"))
}

/// `<input-stem>` folder, alongside the input file (spec §6).
fn default_output_stem(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(stem)
}

fn run_clean(input: &Path, config: &Config, tool: &str) -> Result<(), GCodeCleanError> {
    let source = Box::new(FileLineSource::open(input)?);
    let output_path = default_clean_output(input);
    let mut sink = FileLineWriter::create(&output_path)?;
    pipeline::clean(source, &mut sink, config, tool)?;
    tracing::info!(output = %output_path.display(), "wrote cleaned file");
    Ok(())
}

fn run_split(input: &Path, folder: &Path) -> Result<(), GCodeCleanError> {
    let source = Box::new(FileLineSource::open(input)?);
    pipeline::split(source, folder)?;
    tracing::info!(folder = %folder.display(), "wrote split files");
    Ok(())
}
