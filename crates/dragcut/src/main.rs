use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dragcut::*;

/// Compile SVG and DXF drawings into drag-knife G-code.
#[derive(Parser, Debug)]
#[command(name = "dragcut", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a drawing to G-code
    Compile(CompileArgs),
    /// Write the default profile to a JSON file
    InitConfig {
        /// Destination (defaults to ~/.dragcut/profile.json)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
struct CompileArgs {
    /// SVG or DXF input file
    input: PathBuf,

    /// Write G-code to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Also write an SVG preview of the toolpath
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Profile JSON (defaults to ~/.dragcut/profile.json when present)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Blade trail offset in mm
    #[arg(long)]
    trail_offset: Option<f64>,

    /// Flattening chord tolerance in mm
    #[arg(long)]
    chord_tolerance: Option<f64>,

    /// Decimal places in the emitted program
    #[arg(long)]
    precision: Option<u32>,

    /// Emit relative (G91) coordinates
    #[arg(long)]
    relative: bool,

    /// Number of cutting passes
    #[arg(long)]
    passes: Option<u32>,

    /// Cutting feed rate in mm/min
    #[arg(long)]
    feed_rate: Option<f64>,
}

impl CompileArgs {
    fn apply_overrides(&self, config: &mut CompilerConfig) {
        if let Some(trail_offset) = self.trail_offset {
            config.tool.trail_offset = trail_offset;
        }
        if let Some(tolerance) = self.chord_tolerance {
            config.chord_tolerance = tolerance;
        }
        if let Some(precision) = self.precision {
            config.output.decimal_precision = precision;
        }
        if self.relative {
            config.output.positioning = Positioning::Relative;
        }
        if let Some(passes) = self.passes {
            config.tool.passes = passes;
        }
        if let Some(feed_rate) = self.feed_rate {
            config.tool.feed_rate = feed_rate;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging() {
        eprintln!("warning: {e}");
    }

    let result = match cli.command {
        Command::Compile(args) => run_compile(&args),
        Command::InitConfig { path, force } => run_init_config(path, force),
    };
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CompilerConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("config {} does not exist", path.display());
            }
            CompilerConfig::load_from_path(path)
        }
        None => CompilerConfig::load_from_path(CompilerConfig::default_config_path()?),
    }
}

fn run_compile(args: &CompileArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    args.apply_overrides(&mut config);

    let compilation = compile_file(&args.input, &config)
        .with_context(|| format!("compile {}", args.input.display()))?;
    for warning in &compilation.warnings {
        eprintln!("warning: {warning}");
    }

    let text = compilation.gcode.to_string();
    match &args.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("write {}", path.display()))?
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes()).context("write G-code to stdout")?;
            stdout.flush().context("flush stdout")?;
        }
    }

    if let Some(path) = &args.preview {
        let svg = compilation.preview().context("render preview")?;
        fs::write(path, svg).with_context(|| format!("write {}", path.display()))?;
    }

    let summary = &compilation.program.summary;
    eprintln!(
        "{} paths, {:.1} mm cut, {:.1} mm travel, ~{:.0} s, {} lines",
        summary.path_count,
        summary.cut_length,
        summary.travel_length,
        summary.estimated_seconds,
        summary.line_count
    );
    Ok(())
}

fn run_init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => CompilerConfig::default_config_path()?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    CompilerConfig::default().save_to_path(&path)?;
    eprintln!("wrote default profile to {}", path.display());
    Ok(())
}
