use std::path::PathBuf;

use api_gateway::auth::{verify_token, VerificationKey};
use api_gateway::config::GatewayConfig;
use api_gateway::routing::{PathRewrite, RoutingTable};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the API gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the gateway's liveness endpoint
    Health {
        #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:3000")]
        url: String,
    },
    /// Print the routing table resolved from the environment
    Routes,
    /// Verify a bearer token offline against a public key
    Verify {
        /// PEM file holding the RSA public key
        #[arg(short, long)]
        key: PathBuf,
        /// The token, without the `Bearer ` scheme
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health { url } => {
            let res = reqwest::get(format!("{}/health", url.trim_end_matches('/'))).await?;
            print_response(res).await?;
        }
        Commands::Routes => {
            let config = GatewayConfig::from_env()?;
            let table = RoutingTable::new(config.routes())?;
            for route in table.routes() {
                let rewrite = match &route.rewrite {
                    PathRewrite::Preserve => "preserve".to_string(),
                    PathRewrite::StripPrefix => "strip_prefix".to_string(),
                    PathRewrite::ReplacePrefix(to) => format!("replace_prefix({to})"),
                };
                println!(
                    "{:<16} {:<24} {:<32} {:<14} auth={:<5} upgrade={}",
                    route.name,
                    route.matcher.prefix(),
                    route.target,
                    rewrite,
                    route.requires_auth,
                    route.upgrade
                );
            }
        }
        Commands::Verify { key, token } => {
            let pem = std::fs::read_to_string(&key)?;
            let key = VerificationKey::from_pem(pem)?;
            match verify_token(token.trim(), &key) {
                Ok(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
                Err(e) => {
                    eprintln!("Rejected: {} ({})", e, e.error_code());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
