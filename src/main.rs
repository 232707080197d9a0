use anyhow::{bail, Context};
use std::path::PathBuf;

use mercari_scraper::config::FileConfigManager;
use mercari_scraper::models::{SortBy, SortOrder};
use mercari_scraper::pages::SearchRequest;
use mercari_scraper::scraper::MarketScraper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercari_scraper=info".into()),
        )
        .init();

    let config_manager = FileConfigManager::new(PathBuf::from("config.toml"));
    let config = config_manager.load_config()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--clear-cache") {
        let scraper = MarketScraper::launch(config).await?;
        scraper.clear_cache().await?;
        scraper.close().await?;
        return Ok(());
    }

    let request = parse_request(&args)?;

    tracing::info!("Starting marketplace search");
    let scraper = MarketScraper::launch(config).await?;

    let result = scraper.search_items(&request).await;
    scraper.close().await?;

    let listings = result.context("search failed")?;
    println!("{}", serde_json::to_string_pretty(&listings)?);
    Ok(())
}

fn parse_request(args: &[String]) -> anyhow::Result<SearchRequest> {
    let mut query = None;
    let mut request = SearchRequest::new("");

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--min" => {
                let value = iter.next().context("--min requires a value")?;
                request.min_price = Some(value.parse().context("--min must be a whole number")?);
            }
            "--max" => {
                let value = iter.next().context("--max requires a value")?;
                request.max_price = Some(value.parse().context("--max must be a whole number")?);
            }
            "--limit" => {
                let value = iter.next().context("--limit requires a value")?;
                request.max_items = value.parse().context("--limit must be a whole number")?;
            }
            "--sort" => {
                let value = iter.next().context("--sort requires a value")?;
                request.sort = match value.as_str() {
                    "relevance" => SortBy::Relevance,
                    "price" => SortBy::Price,
                    "created" => SortBy::Created,
                    "likes" => SortBy::Likes,
                    other => bail!("unknown sort '{}'", other),
                };
            }
            "--order" => {
                let value = iter.next().context("--order requires a value")?;
                request.order = match value.as_str() {
                    "asc" => SortOrder::Asc,
                    "desc" => SortOrder::Desc,
                    other => bail!("unknown order '{}'", other),
                };
            }
            other if other.starts_with("--") => bail!("unknown flag '{}'", other),
            other => {
                // extra words join the query
                query = Some(match query.take() {
                    Some(existing) => format!("{} {}", existing, other),
                    None => other.to_string(),
                });
            }
        }
    }

    let query = query.context(
        "usage: mercari-scraper <query> [--min N] [--max N] [--limit N] \
         [--sort relevance|price|created|likes] [--order asc|desc] | --clear-cache",
    )?;
    request.query = query;
    Ok(request)
}
