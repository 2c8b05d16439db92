// Command-line front end for xzrelay.
//
// Uses explicit subcommands and long-form options. `decode` pushes its input
// through a `DecodeSession` in fixed-size chunks, the same way an HTTP
// transport delivers a response body.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::buffer::MIN_INPUT_CAPACITY;
use crate::codec::xz::{STREAM_HEADER_LEN, StreamHeader};
use crate::config::{
    ACCEPT_ENCODING_PREF, DEFAULT_ACCEPT_ENCODING, DEFAULT_MEMORY_LIMIT_MB, DecoderConfig,
    DecoderFlags, ENABLED_PREF, MEMORY_LIMIT_PREF,
};
use crate::gate::{self, XZ_TOKEN};
use crate::io::{BUF_SIZE, DecodeStats, decode_reader};

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

fn parse_chunk_size(s: &str) -> Result<u64, String> {
    match parse_byte_size(s)? {
        0 => Err("chunk size must be at least 1 byte".into()),
        n if usize::try_from(n).is_err() => Err(format!("chunk size too large: '{s}'")),
        n => Ok(n),
    }
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Streaming xz content-encoding decoder.
#[derive(Parser, Debug)]
#[command(
    name = "xzrelay",
    version,
    about = "Streaming xz content-encoding decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decode an xz-encoded body.
    Decode(DecodeArgs),
    /// Print the stream header of an .xz file.
    Probe(ProbeArgs),
    /// Add or remove xz in an Accept-Encoding list.
    AcceptEncoding(AcceptEncodingArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Input file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Check/compute only (do not write output).
    #[arg(long = "check-only")]
    no_output: bool,

    /// Size of each chunk delivered to the decoder (supports K/M/G suffix).
    #[arg(long = "chunk-size", value_parser = parse_chunk_size, default_value_t = BUF_SIZE as u64)]
    chunk_size: u64,

    /// Dictionary memory limit in MiB.
    #[arg(long = "memory-limit-mb", value_parser = clap::value_parser!(u32).range(1..), default_value_t = DEFAULT_MEMORY_LIMIT_MB)]
    memory_limit_mb: u32,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// .xz input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct AcceptEncodingArgs {
    /// Remove xz instead of adding it.
    #[arg(long)]
    disable: bool,

    /// Comma-separated Accept-Encoding list.
    #[arg(default_value = DEFAULT_ACCEPT_ENCODING)]
    list: String,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Decode,
    Probe,
    AcceptEncoding,
    Config,
}

struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    no_output: bool,
    chunk_size: usize,
    memory_limit_mb: u32,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    accept_list: String,
    disable: bool,
    json_output: bool,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            use_stdout: false,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            no_output: false,
            chunk_size: BUF_SIZE,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            input_file: None,
            output_file: None,
            accept_list: String::new(),
            disable: false,
            json_output: cli.json_output,
        }
    }

    fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            enabled: true,
            memory_limit_mb: self.memory_limit_mb,
            flags: DecoderFlags::default(),
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    match &cli.command {
        Cmd::Decode(args) => Options {
            use_stdout: args.stdout,
            no_output: args.no_output,
            // parse_chunk_size rejects values that do not fit.
            chunk_size: usize::try_from(args.chunk_size).unwrap_or(usize::MAX),
            memory_limit_mb: args.memory_limit_mb,
            input_file: args.input.clone().or_else(|| args.input_pos.clone()),
            output_file: args.output.clone().or_else(|| args.output_pos.clone()),
            ..Options::new(Command::Decode, &cli)
        },
        Cmd::Probe(args) => Options {
            input_file: Some(args.input.clone()),
            ..Options::new(Command::Probe, &cli)
        },
        Cmd::AcceptEncoding(args) => Options {
            accept_list: args.list.clone(),
            disable: args.disable,
            ..Options::new(Command::AcceptEncoding, &cli)
        },
        Cmd::Config => Options::new(Command::Config, &cli),
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("xzrelay".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        if opts.command == Command::AcceptEncoding {
            let _ = reconciled_list(&opts);
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("xzrelay version {version} (Rust), Copyright (C) xzrelay contributors");
    eprintln!("Licensed under the MIT License");

    let file_io = cfg!(feature = "file-io") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("FILE_IO={file_io}");
    eprintln!("DEFAULT_MEMORY_LIMIT_MB={DEFAULT_MEMORY_LIMIT_MB}");
    eprintln!("DEFAULT_CHUNK_SIZE={BUF_SIZE}");
    eprintln!("MIN_INPUT_CAPACITY={MIN_INPUT_CAPACITY}");
    eprintln!("DEFAULT_ACCEPT_ENCODING={DEFAULT_ACCEPT_ENCODING}");
    eprintln!("PREF_ENABLED={ENABLED_PREF}");
    eprintln!("PREF_MEMORY_LIMIT={MEMORY_LIMIT_PREF}");
    eprintln!("PREF_ACCEPT_ENCODING={ACCEPT_ENCODING_PREF}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> i32 {
    let reader: Box<dyn Read> = match &opts.input_file {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(f),
            Err(e) => {
                eprintln!("xzrelay: input file: {}: {e}", path.display());
                return 1;
            }
        },
        None => Box::new(io::stdin().lock()),
    };

    let writer: Box<dyn Write> = match &opts.output_file {
        _ if opts.no_output => Box::new(io::sink()),
        Some(path) if !opts.use_stdout => {
            if path.exists() && !opts.force {
                eprintln!(
                    "xzrelay: output file exists, use -f to overwrite: {}",
                    path.display()
                );
                return 1;
            }
            match File::create(path) {
                Ok(f) => Box::new(BufWriter::with_capacity(BUF_SIZE, f)),
                Err(e) => {
                    eprintln!("xzrelay: output file: {}: {e}", path.display());
                    return 1;
                }
            }
        }
        _ => Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock())),
    };

    let stats = match decode_reader(reader, writer, opts.chunk_size, &opts.decoder_config()) {
        Ok((stats, _)) => stats,
        Err(e) => {
            eprintln!("xzrelay: decode error: {e}");
            return 1;
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "xzrelay: decoder: input size: {}, output size: {}, chunks: {}, relays: {}",
            stats.input_size, stats.output_size, stats.chunks, stats.relays
        );
        if stats.bytes_discarded > 0 {
            eprintln!(
                "xzrelay: ignored {} bytes after end of stream",
                stats.bytes_discarded
            );
        }
    }
    if opts.verbose > 1 && !opts.quiet {
        eprintln!("xzrelay: output crc64: {:016x}", stats.crc64);
        if let Some(digest) = stats.output_sha256 {
            eprintln!("xzrelay: output sha256: {}", hex(&digest));
        }
    }

    if opts.json_output {
        eprintln!("{:#}", decode_stats_json(&stats, opts));
    }

    0
}

fn decode_stats_json(stats: &DecodeStats, opts: &Options) -> serde_json::Value {
    serde_json::json!({
        "command": "decode",
        "input_size": stats.input_size,
        "output_size": stats.output_size,
        "chunks": stats.chunks,
        "relays": stats.relays,
        "bytes_discarded": stats.bytes_discarded,
        "crc64": format!("{:016x}", stats.crc64),
        "sha256": stats.output_sha256.map(|d| hex(&d)),
        "chunk_size": opts.chunk_size,
        "memory_limit_mb": opts.memory_limit_mb,
    })
}

// ---------------------------------------------------------------------------
// Probe command
// ---------------------------------------------------------------------------

fn cmd_probe(opts: &Options) -> i32 {
    let Some(path) = &opts.input_file else {
        eprintln!("xzrelay: probe: no input file");
        return 1;
    };

    let mut head = Vec::with_capacity(STREAM_HEADER_LEN);
    let read = File::open(path).and_then(|f| {
        BufReader::new(f)
            .take(STREAM_HEADER_LEN as u64)
            .read_to_end(&mut head)
    });
    if let Err(e) = read {
        eprintln!("xzrelay: input file: {}: {e}", path.display());
        return 1;
    }

    let header = match StreamHeader::parse(&head) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("xzrelay: {}: {e}", path.display());
            return 1;
        }
    };

    if !opts.quiet {
        println!("file:        {}", path.display());
        println!("format:      xz");
        println!(
            "check:       {} (id {:#04x}, {} bytes)",
            header.check.name(),
            header.check.id(),
            header.check.size()
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "probe",
            "file": path.display().to_string(),
            "check": header.check.name(),
            "check_id": header.check.id(),
            "check_size": header.check.size(),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Accept-Encoding command
// ---------------------------------------------------------------------------

fn reconciled_list(opts: &Options) -> String {
    if opts.disable {
        gate::reconcile(true, false, &opts.accept_list)
    } else {
        gate::reconcile(false, true, &opts.accept_list)
    }
}

fn cmd_accept_encoding(opts: &Options) -> i32 {
    let list = reconciled_list(opts);
    println!("{list}");

    if opts.verbose > 0 && !opts.quiet && list == opts.accept_list {
        eprintln!("xzrelay: {ACCEPT_ENCODING_PREF} unchanged");
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "accept-encoding",
            "input": opts.accept_list,
            "output": list,
            "advertises_xz": gate::advertises(&list, XZ_TOKEN),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let mut opts = resolve_options(cli);

    // Warn if -c overrides output filename.
    if opts.use_stdout {
        if let Some(path) = opts.output_file.take() {
            if !opts.quiet {
                eprintln!(
                    "xzrelay: warning: -c option overrides output filename: {}",
                    path.display()
                );
            }
        }
    }

    let exit_code = match opts.command {
        Command::Decode => cmd_decode(&opts),
        Command::Probe => cmd_probe(&opts),
        Command::AcceptEncoding => cmd_accept_encoding(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
