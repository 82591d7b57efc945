use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::types::EVENT_FORMAT;
use rollcall_core::{AttendanceRow, InboundEvent, RecordView};

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance CLI")]
struct Cli {
    /// Base URL of the rollcalld HTTP interface
    #[arg(long, default_value = "http://127.0.0.1:5000", global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a sighting of a person
    Record {
        /// Person identifier
        person: String,
        /// Event time as "YYYY-MM-DD HH:MM:SS" (default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// List attendance for all days
    List,
    /// List attendance for one day (YYYY-MM-DD)
    Day { day: String },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Record { person, at } => {
            let timestamp =
                at.unwrap_or_else(|| chrono::Local::now().format(EVENT_FORMAT).to_string());
            let response = client
                .post(format!("{base}/events"))
                .json(&InboundEvent { person, timestamp })
                .send()
                .await
                .context("rollcalld unreachable")?;
            let record: RecordView = parse(response).await?;
            println!(
                "{} on {}: {} ({}{})",
                record.person,
                record.day,
                record.timestamps.join(", "),
                record.total_hours,
                if record.open_session { ", logged in" } else { "" }
            );
        }
        Commands::List => {
            let rows: Vec<AttendanceRow> = fetch(&client, &format!("{base}/attendance")).await?;
            print_rows(&rows);
        }
        Commands::Day { day } => {
            let rows: Vec<AttendanceRow> =
                fetch(&client, &format!("{base}/attendance/{day}")).await?;
            print_rows(&rows);
        }
        Commands::Status => {
            let status: serde_json::Value = fetch(&client, &format!("{base}/status")).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

async fn fetch<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await.context("rollcalld unreachable")?;
    parse(response).await
}

async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body["error"].as_str().unwrap_or("no detail");
        bail!("rollcalld answered {status}: {message}");
    }
    Ok(response.json().await?)
}

fn print_rows(rows: &[AttendanceRow]) {
    if rows.is_empty() {
        println!("No attendance recorded");
        return;
    }
    println!("{:>4}  {:<20} {:<10}  {:<21} {:>9}", "#", "Name", "Day", "Login - Logout", "Total");
    for r in rows {
        println!(
            "{:>4}  {:<20} {:<10}  {:<21} {:>9}",
            r.rank, r.person, r.day, r.session, r.total_hours
        );
    }
}
