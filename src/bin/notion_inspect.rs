use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use notion_relay::config::Notion as NotionCfg;
use notion_relay::notion::model::plain_text;
use notion_relay::notion::NotionClient;

#[derive(Parser, Debug)]
#[command(about = "Print the configured Notion database schema, or list visible databases")]
struct Args {
    /// Path to YAML config (reads only `notion`)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// List every database shared with the integration instead
    #[arg(long)]
    list: bool,
}

#[derive(Debug, serde::Deserialize)]
struct NotionOnlyConfig {
    notion: NotionCfg,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    let raw = fs::read_to_string(&args.config)?;
    let cfg: NotionOnlyConfig = serde_yaml::from_str(&raw)?;
    let client = NotionClient::new(
        cfg.notion.token,
        cfg.notion.version,
        cfg.notion.database_id,
        cfg.notion.fields,
    );

    if args.list {
        let dbs = client.list_databases().await?;
        println!("Found {} databases:", dbs.len());
        for db in dbs {
            let title = plain_text(&db.title);
            let title = if title.is_empty() { "Untitled" } else { title.as_str() };
            println!("- {}: {}", db.id, title);
        }
        return Ok(());
    }

    let db = client.retrieve_database().await?;
    let mut props: Vec<_> = db.properties.into_iter().collect();
    props.sort_by(|a, b| a.0.cmp(&b.0));
    println!("Database ID: {}", db.id);
    println!("Title: {}", plain_text(&db.title));
    println!("Properties:");
    for (name, prop) in props {
        println!("  {} -> {{ id: {}, type: {} }}", name, prop.id, prop.typ);
    }
    Ok(())
}
