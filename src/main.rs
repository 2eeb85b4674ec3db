use clap::Parser;
use midi2agb::{Compiler, Settings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "midi2agb")]
#[command(version = "0.1.0")]
#[command(about = "MIDI to GBA MPlay (m4a) assembly compiler", long_about = None)]
struct Args {
    /// Input MIDI file
    input: PathBuf,

    /// Output assembly file (default: input with a .s extension)
    output: Option<PathBuf>,

    /// Symbol name for the song header (default: output file stem)
    #[arg(short = 's', long = "symbol")]
    symbol: Option<String>,

    /// Master volume
    #[arg(short = 'm', long = "mvl", default_value_t = 128,
          value_parser = clap::value_parser!(u8).range(0..=128))]
    master_volume: u8,

    /// Voicegroup symbol name
    #[arg(short = 'g', long = "voicegroup", default_value = "voicegroup000")]
    voicegroup: String,

    /// Song priority
    #[arg(short = 'p', long = "priority", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=127))]
    priority: u8,

    /// Song reverb
    #[arg(short = 'r', long = "reverb", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=127))]
    reverb: u8,

    /// Apply the natural (perceptual) volume scale
    #[arg(short = 'n', long = "natural")]
    natural: bool,

    /// Exact note gate times (increases size by a few bytes)
    #[arg(short = 'e', long = "exact")]
    exact: bool,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Global modulation type
    #[arg(long = "modt", value_parser = clap::value_parser!(u8).range(0..=2))]
    modt: Option<u8>,

    /// Global modulation scale
    #[arg(long = "modsc", default_value_t = 1.0, value_parser = parse_modsc)]
    modsc: f64,

    /// Global LFO speed
    #[arg(long = "lfos", value_parser = clap::value_parser!(u8).range(0..=127))]
    lfos: Option<u8>,

    /// Global LFO delay
    #[arg(long = "lfodl", value_parser = clap::value_parser!(u8).range(0..=127))]
    lfodl: Option<u8>,
}

fn parse_modsc(value: &str) -> Result<f64, String> {
    let parsed: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=16.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("{parsed} is out of range 0..16"))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("midi2agb: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), midi2agb::Error> {
    let output = match &args.output {
        Some(path) => path.clone(),
        None => default_output(&args.input),
    };
    let symbol = match &args.symbol {
        Some(symbol) => sanitize_symbol(symbol),
        None => sanitize_symbol(
            &output
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "song".to_string()),
        ),
    };

    let settings = Settings {
        symbol,
        voicegroup: sanitize_symbol(&args.voicegroup),
        master_volume: args.master_volume,
        priority: args.priority,
        reverb: args.reverb,
        natural_volume: args.natural,
        exact_gate: args.exact,
        modt: args.modt,
        mod_scale: args.modsc,
        lfos: args.lfos,
        lfodl: args.lfodl,
    };

    Compiler::new(settings).compile_file(&args.input, &output)
}

/// Replace a `.mid` extension (case-insensitive) with `.s`, or append `.s`.
fn default_output(input: &Path) -> PathBuf {
    match input.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mid") => input.with_extension("s"),
        _ => {
            let mut os = input.as_os_str().to_owned();
            os.push(".s");
            PathBuf::from(os)
        }
    }
}

/// Make a string usable as an assembler symbol: non-alphanumeric
/// characters and a leading digit become underscores.
fn sanitize_symbol(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        let keep = c.is_ascii_alphabetic() || (c.is_ascii_digit() && i > 0);
        out.push(if keep { c } else { '_' });
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}
