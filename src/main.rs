use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use objstore_client::{ClientConfig, ObjectStoreClient};

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("OBJSTORE_BUILD_TIME"), ")");

/// Command line client for S3-compatible object storage / 对象存储命令行客户端
#[derive(Parser)]
#[command(name = "objstore", version, long_version = LONG_VERSION)]
struct Cli {
    /// JSON config file; environment variables (and .env) are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a bucket
    CreateBucket {
        bucket: String,
        /// Succeed when the bucket already exists
        #[arg(long)]
        ignore_existing: bool,
    },
    /// Upload a local file
    Put {
        file: PathBuf,
        bucket: String,
        key: String,
        /// Guessed from the key when empty
        #[arg(long, default_value = "")]
        content_type: String,
    },
    /// Download an object to a local file
    Get {
        bucket: String,
        key: String,
        dest: PathBuf,
    },
    /// List objects under a prefix
    List {
        bucket: String,
        #[arg(long, default_value = "")]
        prefix: String,
        /// Only the first level below the prefix
        #[arg(long)]
        flat: bool,
    },
    /// Check whether an object exists
    Exists { bucket: String, key: String },
    /// Show object metadata
    Stat { bucket: String, key: String },
    /// Print a presigned download URL
    Presign {
        bucket: String,
        key: String,
        #[arg(long, default_value_t = 180)]
        expires_secs: u64,
    },
}

fn load_config(path: Option<&Path>) -> objstore_client::Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_file(path),
        None => ClientConfig::from_env(),
    }
}

async fn run(client: &ObjectStoreClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::CreateBucket { bucket, ignore_existing } => {
            if ignore_existing {
                let created = client.ensure_bucket(&bucket).await?;
                println!("{}", if created { "Bucket created successfully!" } else { "Bucket already exists" });
            } else {
                client.create_bucket(&bucket).await?;
                println!("Bucket created successfully!");
            }
        }
        Command::Put { file, bucket, key, content_type } => {
            let info = client.put_object(&file, &bucket, &key, &content_type).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Get { bucket, key, dest } => {
            let bytes = client.get_object(&bucket, &key, &dest).await?;
            println!("Downloaded {} bytes to {}", bytes, dest.display());
        }
        Command::List { bucket, prefix, flat } => {
            let mut listing = client.list_objects(&bucket, &prefix, !flat);
            while let Some(object) = listing.next().await {
                println!("{}", serde_json::to_string(&object?)?);
            }
        }
        Command::Exists { bucket, key } => {
            let exists = client.object_exists(&bucket, &key).await?;
            println!("{}", exists);
        }
        Command::Stat { bucket, key } => {
            let stat = client.stat_object(&bucket, &key).await?;
            println!("{}", serde_json::to_string_pretty(&stat)?);
        }
        Command::Presign { bucket, key, expires_secs } => {
            let url = client
                .presigned_get_url(&bucket, &key, Duration::from_secs(expires_secs))
                .await?;
            println!("{}", url);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "objstore_client=debug,objstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Startup failures are fatal; per-operation errors are returned below / 初始化失败直接退出
    let client = match load_config(cli.config.as_deref()).and_then(|config| {
        tracing::debug!("Configuration loaded: {:?}", config);
        ObjectStoreClient::new(&config)
    }) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to initialize storage client: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Using {} driver", client.driver_name());

    run(&client, cli.command).await
}
