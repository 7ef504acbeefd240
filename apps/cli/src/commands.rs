//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use kbmirror_client::ZammadClient;
use kbmirror_directory::export_directory;
use kbmirror_export::{ExportContext, ProgressReporter, run_export};
use kbmirror_shared::{
    AppConfig, config_file_path, init_config, load_config, resolve_base_url, resolve_token,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbmirror — mirror a Zammad knowledge base as a Markdown tree.
#[derive(Parser)]
#[command(
    name = "kbmirror",
    version,
    about = "Export a Zammad knowledge base as Markdown files for static site generators.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Export the knowledge base and directory data.
    Export {
        /// Knowledge base id (overrides the configured one).
        #[arg(long)]
        kb: Option<u64>,

        /// Output directory (overrides the configured one).
        #[arg(short, long)]
        out: Option<String>,

        /// Skip the directory pass (users, organizations, roles, groups).
        #[arg(long)]
        kb_only: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbmirror=info",
        1 => "kbmirror=debug",
        _ => "kbmirror=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Export { kb, out, kb_only } => cmd_export(kb, out.as_deref(), kb_only).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Export command
// ---------------------------------------------------------------------------

async fn cmd_export(kb: Option<u64>, out: Option<&str>, kb_only: bool) -> Result<()> {
    let config = load_config()?;
    let base_url = resolve_base_url(&config)?;
    let token = resolve_token(&config)?;

    // CLI flags win over the config file
    let kb_id = kb.unwrap_or(config.export.kb_id);
    let output_root = PathBuf::from(out.unwrap_or(&config.export.output_dir));

    let client = ZammadClient::new(&base_url, &token, config.export.rate_limit_ms)?;

    info!(
        base_url = %base_url,
        kb_id,
        output = %output_root.display(),
        "starting export"
    );

    let reporter = CliProgress::new();

    // Directory data first: a wrong kb_id must not cost us the user,
    // organization, role and group dumps.
    let directory = if kb_only {
        None
    } else {
        reporter.phase("exporting directory data");
        Some(export_directory(&client, &output_root).await?)
    };

    let mut ctx = ExportContext::new(client, kb_id, &output_root, config.export.frontmatter);
    let result = run_export(&mut ctx, &reporter).await?;

    println!();
    println!("  Export complete!");
    println!("  Categories: {}", result.categories);
    println!(
        "  Answers:    {}/{}",
        result.answers_written, result.answers_total
    );
    println!("  Images:     {}", result.images);
    if let Some(dir) = directory {
        println!(
            "  Directory:  {} users, {} organizations, {} roles, {} groups",
            dir.users, dir.organizations, dir.roles, dir.groups
        );
    }
    println!("  Output:     {}", output_root.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, label: &str) {
        self.spinner.set_message(label.to_string());
    }

    fn category(&self, path: &str) {
        self.spinner.set_message(format!("Writing {path}"));
    }

    fn done(&self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config command handlers
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_file_path()?.display());
    println!("{toml_str}");
    Ok(())
}
