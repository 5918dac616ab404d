/// One-shot ingestion of the payload directory, with a database summary
use colored::Colorize;
use std::env;
use tracing_subscriber::EnvFilter;
use wachat_core::{ChatService, Config};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let service = ChatService::open(config)?;
    let report = service.ingest()?;

    println!("{}", "✓ All payloads processed".green().bold());
    println!();
    println!("{}", "Database summary".bold());
    println!("  Inserted messages:    {}", report.processed_messages);
    println!("  Updated statuses:     {}", report.updated_statuses);
    if report.unmatched_statuses > 0 {
        println!(
            "  {}",
            format!("Unmatched statuses:   {}", report.unmatched_statuses).yellow()
        );
    }
    if report.skipped_files > 0 {
        println!(
            "  {}",
            format!("Skipped files:        {}", report.skipped_files).yellow()
        );
    }
    println!("  Total messages:       {}", report.total_messages);
    println!("  Active conversations: {}", report.conversations_count);

    for conv in service.store().conversation_counts()? {
        println!(
            "  - {} ({}): {} messages",
            conv.contact_name.cyan(),
            conv.wa_id,
            conv.message_count
        );
    }

    Ok(())
}
