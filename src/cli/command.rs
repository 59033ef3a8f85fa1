use std::path::PathBuf;
use std::sync::LazyLock;

use clap::{ArgGroup, Args, Parser as ClapParser, Subcommand, ValueEnum};
use dabplus::process::codec::CodecBackend;
use dabplus::process::superframe::DEFAULT_SYNC_THRESHOLD;

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{} ({})\ndabplus {}\nbuilt {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown commit"),
        dabplus::VERSION,
        env!("BUILD_TIMESTAMP")
    )
});

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION.as_str(),
    about        = "Tools for decoding DAB/DAB+ signaling and superframes",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode a FIC dump and print the ensemble and its services.
    Fic(FicArgs),

    /// Synchronize a DAB+ sub-channel dump and extract its audio.
    Audio(AudioArgs),
}

#[derive(Debug, Args)]
pub struct FicArgs {
    /// Input FIC data, concatenated FIBs (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Write the final directory as YAML.
    #[arg(long, value_name = "PATH")]
    pub yaml: Option<PathBuf>,

    /// Keep FIBs failing the CRC check.
    #[arg(long)]
    pub no_fib_crc: bool,

    /// Signaling cycles without reassertion before a service is dropped (0 = never).
    #[arg(long, value_name = "CYCLES", default_value_t = 5)]
    pub stale_cycles: u64,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("frame").required(true).args(["bitrate", "frame_len"])))]
pub struct AudioArgs {
    /// Input sub-channel data, concatenated transport frames (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Sub-channel bitrate in kbit/s.
    #[arg(long, value_name = "KBPS")]
    pub bitrate: Option<u16>,

    /// Transport frame length in bytes.
    #[arg(long, value_name = "BYTES")]
    pub frame_len: Option<usize>,

    /// Passing superframe checks required for synchronization.
    #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_SYNC_THRESHOLD)]
    pub sync_threshold: usize,

    /// Audio output (adts: AAC with ADTS headers, raw: access units).
    #[arg(long, default_value_t = CodecBackend::Adts)]
    pub codec: CodecBackend,

    /// Output file for the codec output.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output file for the X-PAD bytes of all access units.
    #[arg(long, value_name = "PATH")]
    pub xpad_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[test]
fn parse_audio_args() {
    let cli = Cli::parse_from(["dabplusd", "audio", "sub.dabp", "--bitrate", "96", "--codec", "raw"]);
    let Commands::Audio(args) = cli.command else {
        panic!("expected audio command");
    };
    assert_eq!(args.bitrate, Some(96));
    assert_eq!(args.codec, CodecBackend::Raw);
    assert_eq!(args.sync_threshold, DEFAULT_SYNC_THRESHOLD);

    // frame length or bitrate is required, not both
    assert!(Cli::try_parse_from(["dabplusd", "audio", "sub.dabp"]).is_err());
    assert!(
        Cli::try_parse_from(["dabplusd", "audio", "-", "--bitrate", "96", "--frame-len", "288"])
            .is_err()
    );
}

#[test]
fn long_version_names_library() {
    let lines: Vec<&str> = LONG_VERSION.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with(env!("CARGO_PKG_VERSION")));
    assert_eq!(lines[1], format!("dabplus {}", dabplus::VERSION));
    assert!(lines[2].starts_with("built "));
}
