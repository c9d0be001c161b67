use anyhow::{bail, Context, Result};
use recommendation_engine::{
    Config, InMemoryInteractionSource, InteractionSource, ModelStore, RecommendationService,
    TrainingPipeline,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str =
    "usage: recommendation-engine <train|sanity|summary|recommend [user] [limit]|stats <user> [limit]|evaluate [limit]>";

const DEFAULT_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        bail!(USAGE);
    };

    info!(
        service = %config.service.service_name,
        command = command,
        model_path = %config.store.model_path.display(),
        "Starting {}",
        env!("CARGO_PKG_NAME")
    );

    let source: Arc<dyn InteractionSource> = Arc::new(load_source(&config));
    let pipeline = TrainingPipeline::new(&config, source.clone());
    let store = Arc::new(ModelStore::new(&config.store, pipeline));
    let service = RecommendationService::new(&config, source.clone(), store.clone());

    match command {
        "train" => {
            let summary = store.retrain().await.context("training failed")?;
            print_json(&summary)?;
        }
        "sanity" => {
            let samples = service.sanity_check().await.context("sanity check failed")?;
            print_json(&samples)?;
        }
        "summary" => {
            let summary = service.model_summary().await;
            print_json(&summary)?;
        }
        "recommend" => {
            let user_id = match args.get(1).map(String::as_str) {
                None | Some("-") | Some("anonymous") => None,
                Some(raw) => Some(raw.parse::<i64>().with_context(|| format!("invalid user id: {}", raw))?),
            };
            let limit = parse_limit(args.get(2))?;
            let (rows, diagnostics) = service
                .recommend_with_diagnostics(user_id, limit)
                .await
                .context("recommendation failed")?;
            print_json(&serde_json::json!({
                "user_id": user_id,
                "items": rows,
                "diagnostics": diagnostics,
            }))?;
        }
        "stats" => {
            let Some(raw) = args.get(1) else {
                bail!(USAGE);
            };
            let user_id = raw
                .parse::<i64>()
                .with_context(|| format!("invalid user id: {}", raw))?;
            let limit = parse_limit(args.get(2))?;
            let stats = service
                .category_stats(user_id, limit)
                .await
                .context("category stats failed")?;
            print_json(&serde_json::json!({ "user_id": user_id, "items": stats }))?;
        }
        "evaluate" => {
            let limit = match args.get(1) {
                Some(_) => parse_limit(args.get(1))?,
                None => config.evaluation.rec_limit,
            };
            store.retrain().await.context("training failed")?;
            let members = source.member_ids().await.context("member listing failed")?;
            let metrics = service
                .evaluate(&members, limit, config.evaluation.seed)
                .await
                .context("evaluation failed")?;
            print_json(&metrics)?;
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr so stdout stays machine-readable
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_source(config: &Config) -> InMemoryInteractionSource {
    match InMemoryInteractionSource::load_json(&config.service.events_path) {
        Ok(source) => source,
        Err(e) => {
            warn!(
                path = %config.service.events_path.display(),
                error = %e,
                "Interaction snapshot unavailable, starting empty"
            );
            InMemoryInteractionSource::default()
        }
    }
}

fn parse_limit(raw: Option<&String>) -> Result<usize> {
    match raw {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid limit: {}", raw)),
        None => Ok(DEFAULT_LIMIT),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
