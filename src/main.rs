mod auth;
mod config;
mod db;
mod error;
mod extraction;
mod llm;
mod models;
mod pipeline;
mod routes;

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config};
use crate::extraction::RulesetGenerator;
use crate::llm::openai::OpenAiModel;
use crate::models::ruleset::NewRuleset;
use crate::pipeline::{IngestReport, IngestSettings};
use crate::routes::AppState;

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(pool: PgPool) -> impl IntoResponse {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jobextract=info,tower_http=info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_generator(config: &Config) -> anyhow::Result<Option<RulesetGenerator>> {
    let Some(api_key) = config.openai_api_key.as_deref() else {
        tracing::warn!("OPENAI_API_KEY not set, ruleset generation disabled");
        return Ok(None);
    };
    let model = OpenAiModel::new(
        &config.openai_base_url,
        api_key,
        &config.openai_model,
        config.openai_timeout(),
    )?;
    tracing::info!(model = %config.openai_model, "Ruleset generation enabled");
    Ok(Some(RulesetGenerator::new(Arc::new(model))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    match config.resolved_command() {
        Command::Serve { listen_addr } => serve(&config, pool, &listen_addr).await,
        Command::Extract {
            url,
            file,
            no_generate,
            no_persist,
        } => {
            let mut settings = config.ingest_settings();
            settings.generate = !no_generate;
            extract_file(&config, &pool, settings, &url, &file, !no_persist).await
        }
        Command::Seed { file } => seed(&pool, &file).await,
    }
}

async fn serve(config: &Config, pool: PgPool, listen_addr: &str) -> anyhow::Result<()> {
    if config.api_token.is_none() {
        tracing::warn!("API_TOKEN not set, /api/v1 will reject every request");
    }
    let state = AppState {
        pool: pool.clone(),
        generator: build_generator(config)?,
        settings: config.ingest_settings(),
        api_token_hash: config.api_token.as_deref().map(auth::hash_token),
    };

    let readyz_pool = pool;
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(readyz_pool.clone())))
        .merge(routes::api::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {listen_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn extract_file(
    config: &Config,
    pool: &PgPool,
    settings: IngestSettings,
    url: &str,
    file: &Path,
    persist: bool,
) -> anyhow::Result<()> {
    let html = tokio::fs::read_to_string(file).await?;
    let generator = if settings.generate {
        build_generator(config)?
    } else {
        None
    };

    let outcome = pipeline::ingest(pool, generator.as_ref(), &settings, &html, url).await?;
    let job_id = if persist {
        pipeline::persist_job(pool, url, &outcome).await?
    } else {
        None
    };

    let report = IngestReport::new(outcome, job_id);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn seed(pool: &PgPool, file: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(file).await?;
    let rulesets: Vec<NewRuleset> = serde_json::from_str(&raw)?;
    let total = rulesets.len();

    for ruleset in rulesets {
        let config = ruleset.into_config();
        let saved = pipeline::save_next_version(pool, &config).await?;
        tracing::info!(
            "Seeded ruleset '{}' v{} ({})",
            saved.name,
            saved.version,
            saved.match_hash
        );
    }

    tracing::info!("Seeded {total} rulesets from {}", file.display());
    Ok(())
}
