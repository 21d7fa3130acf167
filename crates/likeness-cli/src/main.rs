use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use likeness_core::{IdentityRecord, Person, Training};
use likeness_engine::{spawn_engine, Collaborators, Config, EngineHandle};
use likeness_imaging::{GrayVectorizer, PngRenderer, WholeImageDetector};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "likeness", about = "Enroll and recognize faces against a local identity store")]
struct Cli {
    /// TOML config file (LIKENESS_* environment variables take precedence)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in the given images, train, and store the identity
    Enroll {
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        /// Source images for this person
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Match the faces in an image against stored identities
    Recognize { image: PathBuf },
    /// Score a pre-cropped face against every trained identity
    Compare { face: PathBuf },
    /// List stored identities
    List,
    /// Show store status
    Status,
}

fn start(config: &Config) -> Result<EngineHandle> {
    let (width, height) = config.face_size();
    let engine = spawn_engine(
        config,
        Collaborators {
            detector: Box::new(WholeImageDetector::new(width, height)),
            vectorizer: Box::new(GrayVectorizer::new(width, height)),
            renderer: Box::new(PngRenderer),
        },
    )?;
    Ok(engine)
}

fn summary(record: &IdentityRecord) -> Value {
    json!({
        "key": record.key(),
        "first_name": record.person.first_name,
        "last_name": record.person.last_name,
        "trained": record.is_trained(),
        "training_images": record.training_images.len(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading config")?;
    tracing::debug!(?config, "config loaded");

    let engine = start(&config)?;

    let output = match cli.command {
        Commands::Enroll {
            first,
            last,
            images,
        } => {
            let result = engine
                .enroll(Person::new(first, last), images)
                .await
                .context("enrollment failed")?;
            let trained = match result.training {
                Training::Skipped => {
                    tracing::warn!(key = %result.key, "no faces found; identity stored untrained");
                    false
                }
                Training::Trained {
                    render_failures, ..
                } => {
                    if render_failures > 0 {
                        tracing::warn!(render_failures, "some renders could not be written");
                    }
                    true
                }
            };
            json!({
                "key": result.key,
                "faces_found": result.faces_found,
                "trained": trained,
                "persisted": result.persisted,
            })
        }
        Commands::Recognize { image } => {
            let recognition = engine
                .recognize(&image)
                .await
                .with_context(|| format!("recognizing {}", image.display()))?;
            let matched = recognition.matched.as_ref().map(|m| {
                json!({
                    "key": m.key,
                    "first_name": m.record.person.first_name,
                    "last_name": m.record.person.last_name,
                    "score": m.score,
                })
            });
            json!({
                "matched": matched,
                "faces_detected": recognition.probe_vectors.len(),
            })
        }
        Commands::Compare { face } => {
            let result = engine
                .compare(&face)
                .await
                .with_context(|| format!("comparing {}", face.display()))?;
            let scores: Vec<Value> = result
                .comparisons
                .iter()
                .map(|c| json!({ "key": c.key, "score": c.score }))
                .collect();
            json!({
                "scores": scores,
                "closest": result.closest.map(|c| c.key),
            })
        }
        Commands::List => {
            let identities = engine.identities().await?;
            Value::Array(identities.iter().map(summary).collect())
        }
        Commands::Status => serde_json::to_value(engine.status().await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
