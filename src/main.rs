// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, Context};
use log::{LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use dualsub::app_config::{self, Config, OutputMode};
use dualsub::app_controller::Controller;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for OutputMode to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliOutputMode {
    /// Write `<video>.<upper>-<lower>.srt` next to the video
    Sibling,
    /// Append the merged stream to the video itself
    Inject,
}

impl From<CliOutputMode> for OutputMode {
    fn from(cli_mode: CliOutputMode) -> Self {
        match cli_mode {
            CliOutputMode::Sibling => OutputMode::Sibling,
            CliOutputMode::Inject => OutputMode::Inject,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for dualsub
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// dualsub - merge two subtitle languages into one track
///
/// Combines an upper and a lower subtitle track of every video into one track,
/// written next to the video or injected back into it.
#[derive(Parser, Debug)]
#[command(name = "dualsub")]
#[command(version)]
#[command(about = "Merge two subtitle languages into one track")]
#[command(long_about = "dualsub combines two subtitle tracks of a video (an upper and a lower language) into one track.

EXAMPLES:
    dualsub movie.mkv                          # Merge using the default config
    dualsub --upper en --lower fr movie.mkv    # English above French
    dualsub -f /movies/                        # Process a directory, overwrite existing outputs
    dualsub --output inject movie.mkv          # Add the merged stream to the video
    dualsub completions bash > dualsub.bash    # Generate bash completions

CONFIGURATION:
    Configuration is stored in dualsub.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

SOURCES:
    Embedded text subtitle streams and sibling files named <video>.<lang>.srt
    are considered. The first source in each configured language is used.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Video files or directories to process
    #[arg(value_name = "INPUT_PATH")]
    input_paths: Vec<PathBuf>,

    /// Language code of the upper subtitles (e.g., 'en')
    #[arg(short, long)]
    upper: Option<String>,

    /// Language code of the lower subtitles (e.g., 'ru')
    #[arg(short, long)]
    lower: Option<String>,

    /// Where merged subtitles are written
    #[arg(short, long, value_enum)]
    output: Option<CliOutputMode>,

    /// Strip styling from merged subtitles
    #[arg(short, long)]
    plain_text: bool,

    /// Directory for temporary containers when injecting
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "dualsub.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                color, now, record.level(), record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "dualsub", &mut std::io::stdout());
        return Ok(());
    }

    if cli.input_paths.is_empty() {
        return Err(anyhow::anyhow!("At least one INPUT_PATH is required"));
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    let controller = Controller::with_config(config)?;
    let report = controller.run(&cli.input_paths, cli.force_overwrite).await?;

    if report.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

/// Load the config file and apply command line overrides
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(&cli.config)?;

    if let Some(upper) = &cli.upper {
        config.upper_language = upper.clone();
    }
    if let Some(lower) = &cli.lower {
        config.lower_language = lower.clone();
    }
    if let Some(output) = &cli.output {
        config.merge.output_mode = output.clone().into();
    }
    if cli.plain_text {
        config.merge.plain_text = true;
    }
    if let Some(temp_dir) = &cli.temp_dir {
        config.storage.temp_dir = Some(temp_dir.clone());
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate()
        .context("Configuration validation failed")?;
    Ok(config)
}
