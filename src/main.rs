use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fantia_archiver::api::FantiaClient;
use fantia_archiver::config::Config;
use fantia_archiver::db::{
    create_subscription, delete_subscription, get_subscription_by_name, list_subscriptions,
    Database, Subscription,
};
use fantia_archiver::normalizer::Normalizer;
use fantia_archiver::paginator::FetchDirection;
use fantia_archiver::session::SyncSession;
use fantia_archiver::source::{resolve, ResolvedInput, SourceAdapter};
use fantia_archiver::store::FileStore;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a single post by id or URL
    Download {
        /// Post id or post URL
        url: String,

        /// Only fetch thumbnails, skip full assets
        #[arg(long)]
        preview: bool,
    },

    /// Create a subscription to a creator
    Sub {
        /// Subscription name
        name: String,

        /// Fanclub id or fanclub URL
        target: String,
    },

    /// Get all new posts for a subscription
    Update {
        /// Subscription name
        name: String,
    },

    /// Get older posts for a subscription
    Fetch {
        /// Subscription name
        name: String,

        /// Number of posts to fetch
        n: u64,
    },

    /// Get all new posts for every subscription
    UpdateAll,

    /// List subscriptions and their cursors
    List,

    /// Delete a subscription
    Unsub {
        /// Subscription name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create work directory: {}",
                config.work_dir.display()
            )
        })?;
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let client = FantiaClient::new(&config).context("Failed to initialize API client")?;
    let store = FileStore::new(config.storage_dir.clone());
    store.ensure_layout().await?;
    let normalizer = Normalizer::new(
        db.clone(),
        client.clone(),
        store,
        config.work_dir.clone(),
    );

    match cli.command {
        Commands::Download { url, preview } => {
            let adapter = SourceAdapter::new(client, normalizer);
            match adapter.fetch_one(&url, preview).await? {
                Some(post) => println!("downloaded post {}", post.original_id),
                None => println!("nothing to download for {url}"),
            }
        }

        Commands::Sub { name, target } => {
            let creator_id = resolve_creator(&target)?;
            if get_subscription_by_name(db.pool(), &name).await?.is_some() {
                bail!("subscription named '{name}' already exists");
            }
            let subscription = create_subscription(db.pool(), &name, creator_id).await?;
            println!(
                "created subscription '{}' for fanclub {}",
                subscription.name, subscription.creator_id
            );
        }

        Commands::Update { name } => {
            let subscription = require_subscription(&db, &name).await?;
            let count =
                run_fetch(&db, &client, &normalizer, subscription, FetchDirection::Newer, None)
                    .await?;
            println!("'{name}': {count} posts");
        }

        Commands::Fetch { name, n } => {
            let subscription = require_subscription(&db, &name).await?;
            let count = run_fetch(
                &db,
                &client,
                &normalizer,
                subscription,
                FetchDirection::Older,
                Some(n),
            )
            .await?;
            println!("'{name}': {count} posts");
        }

        Commands::UpdateAll => {
            for subscription in list_subscriptions(db.pool()).await? {
                let name = subscription.name.clone();
                info!(subscription = %name, "updating subscription");
                let count = run_fetch(
                    &db,
                    &client,
                    &normalizer,
                    subscription,
                    FetchDirection::Newer,
                    None,
                )
                .await?;
                println!("'{name}': {count} posts");
            }
        }

        Commands::List => {
            for subscription in list_subscriptions(db.pool()).await? {
                println!(
                    "'{}': fanclub {} (head {:?}, tail {:?})",
                    subscription.name,
                    subscription.creator_id,
                    subscription.head_id,
                    subscription.tail_id
                );
            }
        }

        Commands::Unsub { name } => {
            if delete_subscription(db.pool(), &name).await? {
                println!("deleted subscription '{name}'");
            } else {
                bail!("subscription named '{name}' doesn't exist");
            }
        }
    }

    Ok(())
}

/// A creator reference for `sub`: a bare id or a fanclub URL.
fn resolve_creator(target: &str) -> Result<i64> {
    if !target.is_empty() && target.bytes().all(|b| b.is_ascii_digit()) {
        return target.parse().context("fanclub id out of range");
    }
    match resolve(target) {
        ResolvedInput::Creator(id) => Ok(id),
        _ => bail!("can't subscribe to '{target}': expected a fanclub id or URL"),
    }
}

async fn require_subscription(db: &Database, name: &str) -> Result<Subscription> {
    get_subscription_by_name(db.pool(), name)
        .await?
        .with_context(|| format!("subscription named '{name}' doesn't exist"))
}

/// Drive one fetch run to completion, printing each post as it lands.
async fn run_fetch(
    db: &Database,
    client: &FantiaClient,
    normalizer: &Normalizer,
    subscription: Subscription,
    direction: FetchDirection,
    limit: Option<u64>,
) -> Result<usize> {
    let mut session = SyncSession::for_subscription(
        db.clone(),
        client.clone(),
        normalizer.clone(),
        subscription,
    );
    let mut run = session.fetch(direction, limit);

    let mut count = 0;
    while let Some(post) = run.next().await? {
        println!("  {} {}", post.original_id, post.title.as_deref().unwrap_or(""));
        count += 1;
    }

    Ok(count)
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fantia_archiver=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(())
}
