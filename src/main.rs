mod archive;
mod config;
mod error;
mod media;
mod pipeline;
mod query;
mod response;
#[cfg(test)]
mod testing;
mod tools;

pub const USER_AGENT: &str = concat!("nli-scout/", env!("CARGO_PKG_VERSION"), " (MCP Server)");

use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use tools::NliScout;
use tracing::info;

use config::Settings;
use query::Language;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Print the interpretation of a question as JSON, without searching
    Interpret {
        text: String,
        #[arg(long, value_parser = parse_language, default_value = "auto")]
        language: Language,
    },
}

fn parse_language(s: &str) -> Result<Language, String> {
    match s {
        "he" => Ok(Language::He),
        "en" => Ok(Language::En),
        "auto" => Ok(Language::Auto),
        other => Err(format!("unknown language '{other}' (expected he, en or auto)")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nli_scout=info".parse()?),
        )
        .init();

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Interpret { text, language } => {
            let query = query::interpret(&text, language)?;
            println!("{}", serde_json::to_string_pretty(&query)?);
            Ok(())
        }
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    info!(
        tier = ?settings.tier,
        search_url = %settings.search_url,
        "starting nli-scout MCP server"
    );

    let service = NliScout::new(settings)?
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("failed to start server: {e}"))?;

    service.waiting().await?;
    info!("server stopped");
    Ok(())
}
