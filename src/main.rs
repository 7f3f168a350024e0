use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use storefront_payments::api::{self, AppState};
use storefront_payments::cache::{Cache, CounterStore, InMemoryCache};
use storefront_payments::config::Config;
use storefront_payments::database::{InMemoryOrderRepository, OrderRepository};
use storefront_payments::notifications::{HttpNotifier, NotificationDispatcher};
use storefront_payments::payments::providers::MoolreGateway;
use storefront_payments::payments::{GatewayStatus, PaymentGateway, PaymentService};
use storefront_payments::rate_limit::RateLimiter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_CURRENCY: &str = "GHS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Starting storefront payments service");
    info!("Environment: {}", config.server.environment);

    let orders = order_store(&config).await?;
    let (status_cache, counters) = cache_stores(&config).await?;

    let gateway: Option<Arc<dyn PaymentGateway>> = match config.moolre.clone() {
        Some(moolre) => {
            info!("Moolre gateway configured: {}", moolre.base_url);
            Some(Arc::new(MoolreGateway::new(moolre)?))
        }
        None => {
            warn!("Moolre credentials missing; payment links and status checks are disabled");
            None
        }
    };

    info!(
        "Notification channels: {:?}",
        config.notifications.enabled_channels()
    );
    let currency = config
        .moolre
        .as_ref()
        .map(|m| m.currency.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let notifier = HttpNotifier::new(config.notifications.clone())?;
    let notifications = NotificationDispatcher::new(Arc::new(notifier), currency);

    if config.payments.trust_redirect_fallback {
        warn!("TRUST_REDIRECT_FALLBACK is enabled: redirects alone can mark orders paid");
    }

    let payments = PaymentService::new(
        orders,
        gateway,
        notifications,
        status_cache,
        config.payments.clone(),
    );

    let rate_limiter = RateLimiter::new(counters);
    rate_limiter.spawn_sweeper(SWEEP_INTERVAL);

    let app = api::router(AppState {
        payments,
        rate_limiter,
        environment: config.server.environment.clone(),
        app_url: config.server.app_url.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a socket address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn order_store(config: &Config) -> anyhow::Result<Arc<dyn OrderRepository>> {
    match &config.database.url {
        #[cfg(feature = "database")]
        Some(url) => {
            use storefront_payments::database::{init_pool, PgOrderRepository, PoolConfig};

            let pool = init_pool(
                url,
                Some(PoolConfig {
                    max_connections: config.database.max_connections,
                    ..PoolConfig::default()
                }),
            )
            .await?;
            info!("Database connection pool initialized");
            Ok(Arc::new(PgOrderRepository::new(pool)))
        }
        #[cfg(not(feature = "database"))]
        Some(_) => anyhow::bail!("DATABASE_URL is set but the `database` feature is disabled"),
        None => {
            warn!("DATABASE_URL not set; using the in-memory order store");
            Ok(Arc::new(InMemoryOrderRepository::new()))
        }
    }
}

type Stores = (Arc<dyn Cache<GatewayStatus>>, Arc<dyn CounterStore>);

async fn cache_stores(config: &Config) -> anyhow::Result<Stores> {
    match &config.redis.url {
        #[cfg(feature = "cache")]
        Some(url) => {
            use storefront_payments::cache::{init_cache_pool, CacheConfig, RedisCache};

            let pool = init_cache_pool(CacheConfig {
                redis_url: url.clone(),
                ..CacheConfig::default()
            })
            .await?;
            info!("Cache connection pool initialized");
            let redis = Arc::new(RedisCache::new(pool));
            let status_cache: Arc<dyn Cache<GatewayStatus>> = redis.clone();
            let counters: Arc<dyn CounterStore> = redis;
            Ok((status_cache, counters))
        }
        #[cfg(not(feature = "cache"))]
        Some(_) => anyhow::bail!("REDIS_URL is set but the `cache` feature is disabled"),
        None => {
            info!("REDIS_URL not set; rate limits and caches are per instance");
            let memory = Arc::new(InMemoryCache::new());
            let status_cache: Arc<dyn Cache<GatewayStatus>> = memory.clone();
            let counters: Arc<dyn CounterStore> = memory;
            Ok((status_cache, counters))
        }
    }
}
