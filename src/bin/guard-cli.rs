use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use marketplace_guard::security::password::PasswordReport;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for the marketplace guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check guard status
    Status,
    /// Show authentication counters for the current window
    AuthMetrics,
    /// Show rate limit tiers and tracked clients
    RateLimits,
    /// Evaluate a password against the policy (local, no server needed)
    Password { candidate: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match cli.command {
        Commands::Status => "/admin/status",
        Commands::AuthMetrics => "/admin/auth-metrics",
        Commands::RateLimits => "/admin/rate-limits",
        Commands::Password { candidate } => {
            print_password_report(&PasswordReport::evaluate(&candidate));
            return Ok(());
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = reqwest::Client::new()
        .get(format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

fn print_password_report(report: &PasswordReport) {
    match &report.violation {
        None => println!("valid"),
        Some(violation) => println!("invalid ({}): {}", violation.code, violation.message),
    }
    println!("score: {}/100 ({})", report.score, report.label);
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
