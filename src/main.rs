// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FCMS CAPI command line tool
//!
//! Runs the Frontier OAuth flow and fetches CAPI data for a user record
//! kept in a JSON file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fcms_capi::{config::Config, models::User, services::CapiService};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Frontier OAuth and CAPI helper for FCMS user records.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the Frontier authorization URL and the state to pass to `login`.
    AuthUrl,

    /// Exchange an OAuth callback for a credential and store it on the user record.
    Login {
        /// User record (JSON); created if missing
        #[arg(short, long)]
        user: PathBuf,

        /// Username for a newly created record
        #[arg(long)]
        username: Option<String>,

        /// State printed by `auth-url`
        #[arg(short, long)]
        state: String,

        /// Full callback URL the browser was redirected to
        #[arg(short, long)]
        callback: String,
    },

    /// Fetch a CAPI resource, refreshing the credential when needed.
    Fetch {
        /// User record (JSON)
        #[arg(short, long)]
        user: PathBuf,

        resource: Resource,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Resource {
    Profile,
    Fleetcarrier,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let service = CapiService::new(&config)?;

    match cli.command {
        Command::AuthUrl => {
            let request = service.acquire_authorization_url()?;
            println!("{}", request.url);
            println!("state: {}", request.state);
        }
        Command::Login {
            user,
            username,
            state,
            callback,
        } => {
            let mut record = if user.exists() {
                load_user(&user)?
            } else {
                let Some(username) = username else {
                    bail!("--username is required when creating {}", user.display());
                };
                User::new(username)
            };

            let credential = service.exchange_code_for_token(&callback, &state).await?;
            record.store_credential(&credential)?;
            save_user(&user, &record)?;

            tracing::info!(username = %record.username, "Credential stored");
        }
        Command::Fetch { user, resource } => {
            let mut record = load_user(&user)?;

            let data = match resource {
                Resource::Profile => {
                    let profile = service.get_cmdr(&mut record).await;
                    if let Some(name) = profile
                        .as_ref()
                        .and_then(|p| p.get("commander"))
                        .and_then(|c| c.get("name"))
                        .and_then(|n| n.as_str())
                    {
                        record.cmdr_name.get_or_insert_with(|| name.to_string());
                    }
                    profile
                }
                Resource::Fleetcarrier => service.get_carrier(&mut record).await,
            };

            // Persist whatever the token lifecycle did to the record.
            save_user(&user, &record)?;

            match data {
                Some(map) => println!("{}", serde_json::to_string_pretty(&map)?),
                None if record.access_token.is_none() => {
                    bail!("Not authorized with Frontier; run `auth-url` and `login` again")
                }
                None => bail!("No data returned from CAPI"),
            }
        }
    }

    Ok(())
}

fn load_user(path: &Path) -> Result<User> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid user record {}", path.display()))
}

fn save_user(path: &Path, user: &User) -> Result<()> {
    let raw = serde_json::to_string_pretty(user)?;
    std::fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))
}

/// Initialize structured JSON logging on stderr.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fcms_capi=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
