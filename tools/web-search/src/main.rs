//! Web search agent
//!
//! Sends a query to the chat model with a Tavily search tool attached and
//! prints the final answer.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use llmner_agent::search::{DEFAULT_QUERY, DEFAULT_TAVILY_URL};
use llmner_agent::{ModelProvider, OpenAiCompatProvider, Settings, TavilyClient, WebSearchAgent};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser)]
#[command(name = "web-search")]
#[command(about = "Answer a query with an LLM that can search the web")]
#[command(version)]
struct Cli {
    /// Question to answer
    #[arg(default_value = DEFAULT_QUERY)]
    query: String,

    #[command(flatten)]
    settings: Settings,

    /// Tavily API key
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    tavily_api_key: Option<String>,

    /// Tavily API base URL
    #[arg(long, env = "TAVILY_BASE_URL", default_value = DEFAULT_TAVILY_URL)]
    tavily_base_url: String,

    /// Model calls allowed before giving up
    #[arg(long, default_value_t = 5)]
    max_turns: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    cli.settings.validate().context("invalid configuration")?;
    let tavily_key = cli
        .tavily_api_key
        .filter(|k| !k.trim().is_empty())
        .context("TAVILY_API_KEY is required")?;

    let provider = OpenAiCompatProvider::from_settings(&cli.settings)?;
    let tavily = TavilyClient::new(provider.http_client().clone(), tavily_key)
        .with_base_url(cli.tavily_base_url);

    let agent = WebSearchAgent::new(provider.get_model(None), Arc::new(tavily))
        .with_max_turns(cli.max_turns);

    info!(query = %cli.query, "running web search agent");
    let answer = agent.run(&cli.query).await?;

    println!("\n--- FINAL OUTPUT ---");
    println!("{answer}");
    Ok(())
}
