use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, bail, Context};
use blog_service::cache::PageCache;
use blog_service::config::{Config, StoreBackend};
use blog_service::db::{create_pool, run_migrations, EntityStore, MemoryStore, PostgresStore};
use blog_service::middleware::MetricsMiddleware;
use blog_service::services::{GroupForm, GroupService};
use blog_service::{routes, AppState};
use crypto_core::TokenIssuer;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const COMMANDS: &str = "serve, migrate, healthcheck, clear-cache, create-group, delete-group";

/// Blog Service
///
/// Serves the blog's web pages and its `/api/v1` JSON API from one process.
///
/// # Commands
///
/// - `blog-service` / `blog-service serve`: run the HTTP server
/// - `blog-service migrate`: apply database migrations and exit
/// - `blog-service healthcheck`: probe `/health` of a running instance
/// - `blog-service clear-cache`: drop every cached feed page and exit
/// - `blog-service create-group <slug> <title> [description]`: add a group
/// - `blog-service delete-group <slug>`: delete a group; its posts keep no group
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().cloned();

    if command.as_deref() == Some("healthcheck") {
        return healthcheck().await;
    }

    init_tracing();

    let config = Config::from_env().map_err(|e| anyhow!("configuration error: {}", e))?;
    tracing::info!("Starting blog-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    match command.as_deref() {
        None | Some("serve") => serve(config).await,
        Some("migrate") => migrate(&config).await,
        Some("clear-cache") => clear_cache(&config).await,
        Some("create-group") => create_group(&config, &args[1..]).await,
        Some("delete-group") => delete_group(&config, &args[1..]).await,
        Some(other) => bail!("unknown command '{}' (expected one of: {})", other, COMMANDS),
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("BLOG_SERVICE_PORT").unwrap_or_else(|_| "8000".to_string());
    let url = format!("http://127.0.0.1:{}/health", port);

    let resp = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("healthcheck request to {} failed", url))?;

    if !resp.status().is_success() {
        bail!("healthcheck HTTP status: {}", resp.status());
    }
    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn EntityStore>> {
    match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database)
                .await
                .context("failed to create database pool")?;
            run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            tracing::info!("Connected to database");
            Ok(Arc::new(PostgresStore::new(pool)))
        }
    }
}

async fn build_page_cache(config: &Config) -> anyhow::Result<PageCache> {
    let ttl = Duration::from_secs(config.cache.page_ttl_secs);
    match &config.cache.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("invalid REDIS_URL")?;
            let manager = ConnectionManager::new(client)
                .await
                .context("failed to connect to Redis")?;
            tracing::info!(ttl_secs = config.cache.page_ttl_secs, "Page cache backed by Redis");
            Ok(PageCache::redis(manager, ttl))
        }
        None => {
            tracing::info!(ttl_secs = config.cache.page_ttl_secs, "Page cache held in process");
            Ok(PageCache::memory(ttl))
        }
    }
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
    if config.database.backend == StoreBackend::Memory {
        bail!("migrate requires STORE_BACKEND=postgres");
    }
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Migrations applied");
    Ok(())
}

async fn clear_cache(config: &Config) -> anyhow::Result<()> {
    if config.cache.redis_url.is_none() {
        tracing::warn!("REDIS_URL not set; the in-process cache belongs to the running server");
        return Ok(());
    }
    let cache = build_page_cache(config).await?;
    let removed = cache.clear().await.context("failed to clear page cache")?;
    tracing::info!(removed, "Page cache cleared");
    Ok(())
}

async fn group_service(config: &Config) -> anyhow::Result<GroupService> {
    if config.database.backend == StoreBackend::Memory {
        bail!("group administration requires STORE_BACKEND=postgres");
    }
    Ok(GroupService::new(build_store(config).await?))
}

async fn create_group(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let [slug, title, rest @ ..] = args else {
        bail!("usage: blog-service create-group <slug> <title> [description]");
    };

    let group = group_service(config)
        .await?
        .create(GroupForm {
            title: title.clone(),
            slug: slug.clone(),
            description: rest.join(" "),
        })
        .await
        .map_err(|e| anyhow!("failed to create group: {}", e))?;
    tracing::info!(group_id = group.id, slug = %group.slug, "Group created");
    Ok(())
}

async fn delete_group(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let [slug] = args else {
        bail!("usage: blog-service delete-group <slug>");
    };

    group_service(config)
        .await?
        .delete_by_slug(slug)
        .await
        .map_err(|e| anyhow!("failed to delete group: {}", e))?;
    tracing::info!(slug = %slug, "Group deleted");
    Ok(())
}

fn build_cors(allowed_origins: &str) -> Cors {
    let mut cors = Cors::default();
    for origin in allowed_origins.split(',') {
        let origin = origin.trim();
        if origin == "*" {
            cors = cors.allow_any_origin();
        } else if !origin.is_empty() {
            cors = cors.allowed_origin(origin);
        }
    }
    cors.allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let store = build_store(&config).await?;
    let page_cache = build_page_cache(&config).await?;
    let issuer = Arc::new(
        TokenIssuer::new(
            &config.auth.jwt_secret,
            config.auth.access_ttl_secs,
            config.auth.refresh_ttl_secs,
        )
        .context("failed to initialize token issuer")?,
    );

    let state = web::Data::new(AppState::new(&config, store, page_cache, issuer));
    let bind_address = (config.app.host.clone(), config.app.port);
    let allowed_origins = config.cors.allowed_origins.clone();

    tracing::info!("Starting HTTP server at {}:{}", bind_address.0, bind_address.1);

    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(MetricsMiddleware)
            .wrap(build_cors(&allowed_origins))
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(move |cfg| routes::configure(cfg, state))
    })
    .bind(bind_address)?
    .run();

    let server_handle = server.handle();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tokio::select! {
        result = server => {
            result.context("HTTP server failed")?;
        }
        _ = &mut shutdown => {
            tracing::info!("Shutdown signal received");
            server_handle.stop(true).await;
        }
    }

    tracing::info!("blog-service shutting down");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
