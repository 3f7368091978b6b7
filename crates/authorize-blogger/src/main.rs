use anyhow::{Context, Result};
use clap::Parser;
use shared::{Authorizer, ClientSecrets, Config, CredentialStore, InstalledAppFlow};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "authorize-blogger")]
#[command(about = "Authorize Blogger access and write the OAuth token file used by crypto-blog")]
struct Args {
    /// Client secrets file (defaults to CLIENT_SECRETS_FILE or client_secrets.json)
    #[arg(short, long)]
    secrets: Option<PathBuf>,

    /// Token file to write (defaults to BLOGGER_TOKEN_FILE or token_blogger.json)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    Config::try_load_dotenv();

    let secrets_env = std::env::var("GOOGLE_CLIENT_SECRETS_JSON")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let secrets_path = args
        .secrets
        .or_else(|| std::env::var_os("CLIENT_SECRETS_FILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("client_secrets.json"));
    let token_path = args
        .output
        .or_else(|| std::env::var_os("BLOGGER_TOKEN_FILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("token_blogger.json"));

    let secrets = ClientSecrets::resolve(secrets_env.as_deref(), &secrets_path)
        .context("Failed to load OAuth client secrets")?;
    let flow = InstalledAppFlow::new(secrets)?;

    let credential = flow.authorize().await.context("Authorization failed")?;
    if credential.refresh_token.is_none() {
        println!("⚠ No refresh token was issued. Revoke the app's access and run this again.");
    }

    let store = CredentialStore::new(&token_path);
    store.save(&credential)?;

    println!("\n✓ Token saved to {}", store.path().display());
    println!("  For CI, store its contents in the GOOGLE_OAUTH_TOKEN_JSON secret.");
    Ok(())
}
