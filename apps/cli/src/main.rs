//! kbmirror CLI — mirror a Zammad knowledge base as Markdown.
//!
//! Exports categories and answers into a static-site-ready directory
//! tree, along with the instance's users, organizations, roles and
//! groups as YAML data files.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
