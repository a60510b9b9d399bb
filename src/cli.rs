use clap::{Args, Parser, Subcommand, ValueEnum};
use pse_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pse")]
#[command(
    version,
    about = "Page Style Extractor - Capture the meaningful CSS of a page",
    long_about = "Page Style Extractor (PSE)\n\nReads a page (live URL via Playwright, or a saved capture) and emits a JSON snapshot of the styles that matter for reconstructing it: filtered computed styles, important stylesheet rules, media queries, used animations, and color/typography/layout summaries.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output (debug logging and progress)")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) for limits/importance/media/fetch/browser settings; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract a style snapshot from a URL or a saved capture
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, help = "Do not fetch cross-origin stylesheets the page cannot read")]
    pub no_fetch: bool,

    #[arg(
        long,
        default_value = "1440x900",
        help = "Viewport dimensions (WIDTHxHEIGHT) for URL rendering"
    )]
    pub viewport: Viewport,

    #[arg(long, value_enum, default_value = "json", help = "Output format")]
    pub format: OutputFormat,

    #[arg(long, short, help = "Output file path (stdout if omitted)")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Write the page capture JSON here (re-run later with --capture)"
    )]
    pub save_capture: Option<PathBuf>,

    #[arg(
        long,
        default_value = "30",
        help = "Navigation timeout (seconds) for URL rendering"
    )]
    pub nav_timeout: u64,

    #[arg(
        long,
        default_value = "10",
        help = "Network idle timeout (seconds) for URL rendering"
    )]
    pub network_idle_timeout: u64,

    #[arg(
        long,
        default_value = "45",
        help = "Process timeout (seconds) for Playwright invocation"
    )]
    pub process_timeout: u64,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    #[arg(long, value_name = "URL", help = "Page to render with Playwright")]
    pub url: Option<String>,

    #[arg(long, value_name = "PATH", help = "Previously saved page capture JSON")]
    pub capture: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
