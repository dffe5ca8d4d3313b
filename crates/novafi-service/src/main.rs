use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use novafi_config::{Config, ConfigLoader};
use novafi_core::{ClientBuilder, MarketplaceClient};
use novafi_identity::implementations::{memory as memory_identity, supabase};
use novafi_ledger::implementations::{evm::alloy, memory as memory_ledger};
use novafi_types::{IntentId, ProposalId};
use novafi_wallet::implementations::local;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "novafi")]
#[command(about = "NovaFi intent marketplace client", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[arg(short, long, value_name = "FILE", default_value = "config/novafi.toml")]
	config: PathBuf,

	/// Overrides `app.log_level` from the configuration file
	#[arg(long, env = "NOVAFI_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Validate the configuration file and provider settings
	Validate,
	/// List the most recent intents
	Browse {
		/// Number of intents to load
		#[arg(short, long)]
		limit: Option<u64>,
	},
	/// List your intents with their proposals
	Mine,
	/// Post a new intent
	CreateIntent {
		description: String,
	},
	/// Offer to fulfil an intent for an amount in ETH
	Propose {
		intent_id: IntentId,
		amount: String,
		#[arg(default_value = "")]
		message: String,
	},
	/// Accept a proposal on one of your intents and pay the solver
	Accept {
		proposal_id: ProposalId,
	},
	/// Reject a proposal on one of your intents
	Reject {
		proposal_id: ProposalId,
	},
	/// Cancel one of your open intents
	Cancel {
		intent_id: IntentId,
	},
	/// Keep the wallet session bound and print marketplace activity
	Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	setup_tracing(cli.log_level.as_deref().unwrap_or(&config.app.log_level))?;
	info!("Loaded configuration from {:?}", cli.config);

	let client = build_client(config.clone()).context("Failed to build marketplace client")?;

	match cli.command {
		Commands::Validate => {
			info!("Configuration is valid");
			info!("Application: {}", config.app.name);
			info!("  Wallet: {}", config.wallet.provider);
			info!("  Ledger: {}", config.ledger.provider);
			info!("  Identity: {}", config.identity.provider);
			Ok(())
		}
		Commands::Browse { limit } => commands::browse(&client, limit).await,
		Commands::Mine => commands::mine(&client).await,
		Commands::CreateIntent { description } => {
			commands::create_intent(&client, &description).await
		}
		Commands::Propose {
			intent_id,
			amount,
			message,
		} => commands::propose(&client, intent_id, &amount, &message).await,
		Commands::Accept { proposal_id } => commands::accept(&client, proposal_id).await,
		Commands::Reject { proposal_id } => commands::reject(&client, proposal_id).await,
		Commands::Cancel { intent_id } => commands::cancel(&client, intent_id).await,
		Commands::Watch => commands::watch(client).await,
	}
}

/// Registers every shipped provider and builds the client.
fn build_client(config: Config) -> Result<MarketplaceClient> {
	let client = ClientBuilder::new(config)
		.with_wallet_factory("local", local::create_wallet)
		.with_ledger_factory("alloy", alloy::create_ledger)
		.with_ledger_factory("memory", memory_ledger::create_ledger)
		.with_identity_factory("supabase", supabase::create_identity)
		.with_identity_factory("memory", memory_identity::create_identity)
		.build()?;
	Ok(client)
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}
