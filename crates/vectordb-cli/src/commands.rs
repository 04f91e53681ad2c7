//! Command implementations for the vectordb admin tool.
//!
//! Every command opens the data directory through a [`VectorDbClient`],
//! loads the persisted collections, does its work and flushes pending
//! snapshots before returning. Output is pretty-printed JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use vectordb_embeddings::{Embedder, HashEmbedder, HttpEmbedder, HttpEmbedderConfig};
use vectordb_store::{Collection, SearchOptions, Settings, VectorDbClient};

use crate::cli::{Commands, VectorSource};

/// Load settings and apply CLI overrides.
pub fn load_settings(
    config_path: Option<&str>,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. Logs go to stderr so stdout
/// stays clean JSON.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Embedder from settings: the configured HTTP endpoint, or the offline
/// hash embedder when none is configured.
pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match &settings.embedder {
        Some(remote) => {
            let api_key = remote.api_key.clone().unwrap_or_default();
            let mut config = HttpEmbedderConfig::openai(api_key, &remote.model, settings.dimension)
                .with_base_url(&remote.base_url)
                .with_max_retries(remote.max_retries);
            config.timeout = Duration::from_secs(remote.timeout_secs);

            let embedder = HttpEmbedder::new(config).context("Failed to build HTTP embedder")?;
            info!(model = %remote.model, base_url = %remote.base_url, "Using HTTP embedder");
            Ok(Arc::new(embedder))
        }
        None => {
            debug!(dimension = settings.dimension, "Using hash embedder");
            Ok(Arc::new(HashEmbedder::new(settings.dimension)))
        }
    }
}

/// Open the data directory and load every persisted collection.
pub async fn open_client(settings: &Settings) -> Result<VectorDbClient> {
    settings.validate().context("Invalid configuration")?;
    let embedder = build_embedder(settings)?;
    let client = VectorDbClient::local(settings.store_config(), embedder);
    client
        .load_all()
        .await
        .with_context(|| format!("Failed to load collections from {}", settings.data_dir))?;
    Ok(client)
}

/// Parse `"0.1, 0.2,0.3"` into a vector.
pub fn parse_vector(csv: &str) -> Result<Vec<f32>> {
    csv.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid vector component: {:?}", part))
        })
        .collect()
}

/// Parse a payload argument: JSON if it parses, otherwise a plain string.
pub fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn collection(client: &VectorDbClient, name: &str) -> Result<Arc<Collection>> {
    client
        .get(name)
        .with_context(|| format!("Collection not found: {}", name))
}

async fn query_vector(client: &VectorDbClient, source: &VectorSource) -> Result<Vec<f32>> {
    match (&source.vector, &source.text) {
        (Some(csv), _) => parse_vector(csv),
        (None, Some(text)) => {
            let embedding = client
                .embedder()
                .embed(text)
                .await
                .context("Failed to embed query text")?;
            Ok(embedding.into_vec())
        }
        (None, None) => bail!("Either --vector or --text is required"),
    }
}

/// Run one command against a loaded client and return its JSON output.
pub async fn execute(client: &VectorDbClient, command: Commands) -> Result<Value> {
    let output = match command {
        Commands::Collections => {
            let mut rows = Vec::new();
            for name in client.list_names() {
                if let Some(c) = client.get(&name) {
                    rows.push(json!({ "name": name, "size": c.size() }));
                }
            }
            Value::Array(rows)
        }

        Commands::Stats { collection: name } => {
            let stats = collection(client, &name)?.stats().await?;
            serde_json::to_value(stats)?
        }

        Commands::List {
            collection: name,
            limit,
        } => {
            let items = collection(client, &name)?.list(limit).await?;
            serde_json::to_value(items)?
        }

        Commands::Get {
            collection: name,
            id,
        } => {
            let item = collection(client, &name)?
                .get(id)
                .await?
                .with_context(|| format!("No item {} in {}", id, name))?;
            serde_json::to_value(item)?
        }

        Commands::Put {
            collection: name,
            payload,
            source,
        } => {
            let target = client.ensure_schema(&name).await?;
            let payload = payload.as_deref().map(parse_payload);
            let vector = query_vector(client, &source).await?;
            let item = target.insert_with_vector(payload, &vector).await?;
            info!(collection = %name, id = item.id, "Inserted item");
            serde_json::to_value(item)?
        }

        Commands::DeleteItem {
            collection: name,
            id,
        } => {
            collection(client, &name)?.delete_item(id).await?;
            json!({ "deleted": id })
        }

        Commands::Search {
            collections,
            source,
            limit,
        } => {
            let names: Vec<&str> = collections.iter().map(String::as_str).collect();
            let options = SearchOptions::new().with_limit(limit);
            let hits = match &source.text {
                Some(text) => {
                    client
                        .find_text_in_collections(&names, text, &options)
                        .await?
                }
                None => {
                    let vector = query_vector(client, &source).await?;
                    client.find_in_collections(&names, &vector, &options).await?
                }
            };
            Value::Array(
                hits.into_iter()
                    .map(|h| {
                        json!({
                            "collection": h.collection,
                            "id": h.hit.item.id,
                            "distance": h.hit.distance,
                            "payload": h.hit.item.payload,
                        })
                    })
                    .collect(),
            )
        }

        Commands::Drop { collection: name } => {
            client.delete(&name).await?;
            json!({ "dropped": name })
        }
    };

    Ok(output)
}

/// Load settings, run `command`, flush, and print the result.
pub async fn run(
    config_path: Option<&str>,
    data_dir_override: Option<&str>,
    log_level_override: Option<&str>,
    command: Commands,
) -> Result<()> {
    let settings = load_settings(config_path, data_dir_override, log_level_override)?;
    init_logging(&settings)?;

    let client = open_client(&settings).await?;
    let result = execute(&client, command).await;
    client
        .shutdown()
        .await
        .context("Failed to flush collections")?;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
