//! m2settings CLI - Download a Nexus settings template as a local settings file

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use m2settings_core::config::default_settings_file;
use m2settings_core::prompt::{ConsoleReader, PromptSession};
use m2settings_core::templates::{EnvironmentCustomizer, ServerInfoCustomizer, UserTokenCustomizer};
use m2settings_core::writer::DEFAULT_BACKUP_TIMESTAMP_FORMAT;
use m2settings_core::{
    CustomizerChain, DownloadArgs, DownloadConfig, DownloadReport, Downloader, Failure,
    NexusConnector, Reporter, ServerProduct, Stage,
};
use std::path::PathBuf;

/// CLI version
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nexus Professional product configuration
#[derive(Clone)]
pub struct NexusPro;

impl ServerProduct for NexusPro {
    fn name(&self) -> &'static str {
        "m2settings"
    }

    fn display_name(&self) -> &'static str {
        "Nexus Settings"
    }

    fn required_edition(&self) -> &'static str {
        "PRO"
    }

    fn version_constraint(&self) -> &'static str {
        "[2.3,)"
    }

    fn url_env(&self) -> &'static str {
        "NEXUS_URL"
    }

    fn default_output_file(&self) -> Option<PathBuf> {
        default_settings_file()
    }

    fn customizers(&self) -> CustomizerChain {
        CustomizerChain::new()
            .with(EnvironmentCustomizer::from_env())
            .with(ServerInfoCustomizer)
            .with(UserTokenCustomizer)
    }

    fn user_agent(&self) -> &'static str {
        concat!("m2settings/", env!("CARGO_PKG_VERSION"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "m2settings")]
#[command(about = "Download a settings template from Nexus and save it as a local settings file")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub download: CliDownloadArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a settings template (the default)
    Download(CliDownloadArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CliDownloadArgs {
    /// Nexus server URL (falls back to NEXUS_URL, then a prompt)
    #[arg(short, long)]
    pub url: Option<String>,

    /// User to connect as (defaults to the current user)
    #[arg(long)]
    pub username: Option<String>,

    /// Password of the user (prompted for when omitted)
    #[arg(long)]
    pub password: Option<String>,

    /// Template to download (listed and prompted for when omitted)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Allow plaintext http server URLs
    #[arg(long)]
    pub insecure: bool,

    /// File to save content to (defaults to ~/.m2/settings.xml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output text encoding (utf-8, utf-16le, utf-16be, utf-16, iso-8859-1, us-ascii)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Overwrite an existing output file without backing it up
    #[arg(long = "no-backup")]
    pub no_backup: bool,

    /// strftime suffix appended to backup file names
    #[arg(
        long = "backup-timestamp-format",
        default_value = DEFAULT_BACKUP_TIMESTAMP_FORMAT,
        allow_hyphen_values = true
    )]
    pub backup_timestamp_format: String,

    /// Fail on template tokens that have no value
    #[arg(long)]
    pub strict: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl From<CliDownloadArgs> for DownloadArgs {
    fn from(args: CliDownloadArgs) -> Self {
        DownloadArgs {
            url: args.url,
            username: args.username,
            password: args.password,
            template: args.template,
            secure: !args.insecure,
            output: args.output,
            encoding: args.encoding,
            backup: !args.no_backup,
            backup_timestamp_format: args.backup_timestamp_format,
            strict: args.strict,
        }
    }
}

/// Prints progress with cliclack
struct CliclackReporter;

impl Reporter for CliclackReporter {
    fn info(&mut self, message: &str) {
        let _ = cliclack::log::info(message);
    }

    fn warning(&mut self, message: &str) {
        let _ = cliclack::log::warning(message);
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

async fn download(product: &NexusPro, args: CliDownloadArgs) -> Result<DownloadReport, Failure> {
    let config = DownloadConfig::resolve(product, args.into())?;
    log::debug!("Output: {}", config.output.path.display());

    let prompts = PromptSession::new(ConsoleReader::new().map_err(|e| Failure {
        stage: Stage::Init,
        error: m2settings_core::DownloadError::Prompt(e.into()),
    })?);
    let connector = NexusConnector::new(product.user_agent());
    let mut reporter = CliclackReporter;

    Downloader::new(product, &connector, prompts, &mut reporter)
        .run(config)
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Ensure terminal cursor is restored on panic
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    // Handle Ctrl+C gracefully
    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        std::process::exit(130);
    })
    .ok();

    let args = Args::parse();
    let download_args = match args.command {
        Some(Command::Download(download_args)) => download_args,
        // No subcommand provided, default to download behavior
        None => args.download,
    };
    init_logging(download_args.debug);

    let product = NexusPro;
    log::debug!("{} {}", product.name(), CLI_VERSION);
    cliclack::intro(product.display_name())?;

    let result = download(&product, download_args).await;

    // Ensure cursor is visible on normal exit
    let _ = console::Term::stderr().show_cursor();

    match result {
        Ok(report) => {
            if let Some(backup) = &report.backup {
                cliclack::log::step(format!("Previous file kept at {}", backup.display()))?;
            }
            cliclack::outro(format!(
                "{} template {} to {}",
                "Saved".green().bold(),
                report.template_id.cyan(),
                report.output.display()
            ))?;
            Ok(())
        }
        Err(failure) => {
            log::debug!("Download failed while {}: {}", failure.stage, failure);
            cliclack::outro_cancel(failure.to_string())?;
            std::process::exit(1);
        }
    }
}
