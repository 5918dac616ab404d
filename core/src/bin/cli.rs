/// CLI for browsing conversations and sending messages through the API
use chrono::{TimeZone, Utc};
use colored::Colorize;
use reqwest::Method;
use std::time::Duration;

const DEFAULT_API_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "conversations" => list_conversations().await?,
        "messages" => {
            if args.len() < 3 {
                eprintln!("Usage: wachat messages <wa_id>");
                return Ok(());
            }
            list_messages(&args[2]).await?;
        }
        "send" => {
            if args.len() < 5 {
                eprintln!("Usage: wachat send <wa_id> <contact_name> <message>");
                return Ok(());
            }
            send_message(&args[2], &args[3], &args[4..].join(" ")).await?;
        }
        "ingest" => ingest().await?,
        "status" => show_status().await?,
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("wachat CLI");
    println!();
    println!("Usage: wachat <command> [args]");
    println!();
    println!("Commands:");
    println!("  conversations                        List conversations, newest first");
    println!("  messages <wa_id>                     Show one conversation");
    println!("  send <wa_id> <contact_name> <text>   Send a message");
    println!("  ingest                               Process the server's payload directory");
    println!("  status                               Show store counts");
    println!();
    println!("The API port is read from WACHAT_API_PORT (default {}).", DEFAULT_API_PORT);
}

fn api_port() -> u16 {
    std::env::var("WACHAT_API_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_API_PORT)
}

/// One API call; returns status code and parsed JSON body
async fn request(
    method: Method,
    path: &str,
    body: Option<&serde_json::Value>,
) -> anyhow::Result<(u16, serde_json::Value)> {
    let port = api_port();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let mut req = client.request(method, format!("http://127.0.0.1:{}{}", port, path));
    if let Some(body) = body {
        req = req.json(body);
    }
    let resp = req.send().await.map_err(|e| {
        anyhow::anyhow!("could not reach the API on port {} ({}); is the server running?", port, e)
    })?;

    let status = resp.status().as_u16();
    let json = resp.json().await.unwrap_or(serde_json::Value::Null);
    Ok((status, json))
}

fn fail(resp: &serde_json::Value) -> ! {
    let error = resp["error"].as_str().unwrap_or("Unknown error");
    eprintln!("{} {}", "✗ Error:".red(), error);
    std::process::exit(1);
}

fn format_time(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

async fn list_conversations() -> anyhow::Result<()> {
    let (status, resp) = request(Method::GET, "/api/messages", None).await?;
    if status != 200 {
        fail(&resp);
    }

    let convs = resp.as_array().cloned().unwrap_or_default();
    if convs.is_empty() {
        println!("No conversations yet");
        return Ok(());
    }

    println!("Conversations ({}):", convs.len());
    println!("{:-<60}", "");
    for conv in convs {
        let name = conv["contact_name"].as_str().unwrap_or("?");
        let wa_id = conv["wa_id"].as_str().unwrap_or("?");
        let unread = conv["unreadCount"].as_u64().unwrap_or(0);
        let last = &conv["lastMessage"];
        let when = format_time(last["timestamp"].as_i64().unwrap_or(0));
        let preview = last["text"].as_str().unwrap_or("");

        let badge = if unread > 0 {
            format!(" [{}]", unread).green().bold().to_string()
        } else {
            String::new()
        };
        println!("  {} ({}){}  {}", name.bold(), wa_id, badge, when.dimmed());
        println!("    {}", preview);
    }
    Ok(())
}

async fn list_messages(wa_id: &str) -> anyhow::Result<()> {
    let path = format!("/api/messages?wa_id={}", urlencoding::encode(wa_id));
    let (status, resp) = request(Method::GET, &path, None).await?;
    if status != 200 {
        fail(&resp);
    }

    let messages = resp.as_array().cloned().unwrap_or_default();
    if messages.is_empty() {
        println!("No messages for {}", wa_id);
        return Ok(());
    }

    for msg in messages {
        let when = format_time(msg["timestamp"].as_i64().unwrap_or(0));
        let text = msg["text"].as_str().unwrap_or("");
        let kind = msg["type"].as_str().unwrap_or("text");
        let body = if text.is_empty() { format!("<{}>", kind) } else { text.to_string() };
        let state = msg["status"].as_str().unwrap_or("?");

        if msg["isIncoming"].as_bool().unwrap_or(false) {
            let name = msg["contact_name"].as_str().unwrap_or("?");
            println!("{} {}: {}", when.dimmed(), name.cyan(), body);
        } else {
            println!("{} {}: {} {}", when.dimmed(), "you".green(), body, format!("({})", state).dimmed());
        }
    }
    Ok(())
}

async fn send_message(wa_id: &str, contact_name: &str, text: &str) -> anyhow::Result<()> {
    let body = serde_json::json!({
        "text": text,
        "wa_id": wa_id,
        "contact_name": contact_name,
    });
    let (status, resp) = request(Method::POST, "/api/messages", Some(&body)).await?;
    if status != 200 {
        fail(&resp);
    }
    println!("✓ Message sent (id: {})", resp["id"].as_str().unwrap_or("?"));
    Ok(())
}

async fn ingest() -> anyhow::Result<()> {
    let (status, resp) = request(Method::POST, "/api/process-payloads", None).await?;
    if status != 200 {
        fail(&resp);
    }
    println!("✓ Payloads processed");
    println!("{:-<60}", "");
    println!("  Inserted messages:  {}", resp["processedMessages"].as_u64().unwrap_or(0));
    println!("  Updated statuses:   {}", resp["updatedStatuses"].as_u64().unwrap_or(0));
    println!("  Total messages:     {}", resp["totalMessages"].as_u64().unwrap_or(0));
    println!("  Conversations:      {}", resp["conversationsCount"].as_u64().unwrap_or(0));
    Ok(())
}

async fn show_status() -> anyhow::Result<()> {
    let (status, resp) = request(Method::GET, "/api/status", None).await?;
    if status != 200 {
        fail(&resp);
    }
    println!("Store Status:");
    println!("{:-<60}", "");
    println!("  Total messages: {}", resp["totalMessages"].as_u64().unwrap_or(0));
    println!("  Conversations:  {}", resp["conversationsCount"].as_u64().unwrap_or(0));
    Ok(())
}
