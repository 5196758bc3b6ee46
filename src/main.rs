//! Application entry point.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ticket_checkout::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use ticket_checkout::app::{AppService, AppState, MonitorConfig, RetryPolicy, ServiceConfig};
use ticket_checkout::domain::{ChainObserver, ConfirmationPolicy, Currency, Network, WalletDirectory};
use ticket_checkout::infra::{
    BlockCypherObserver, CoinGeckoPriceFeed, CurrencyRouter, EtherscanObserver, PostgresClient,
    PostgresConfig, SimulatedObserver,
};

/// Application configuration
struct Config {
    database_url: String,
    host: String,
    port: u16,
    /// Use the deterministic ledger instead of public explorers
    demo_mode: bool,
    wallets: WalletDirectory,
    usdt_contract: Option<String>,
    blockcypher_api_url: Option<String>,
    etherscan_api_url: Option<String>,
    etherscan_api_key: Option<SecretString>,
    coingecko_api_url: Option<String>,
    external_timeout: Duration,
    service: ServiceConfig,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_opt(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_parse("PORT", 3000u16)?;
        let demo_mode = env_flag("DEMO_MODE", true);

        let network: Network = env_opt("WALLET_NETWORK")
            .map(|n| n.parse().map_err(anyhow::Error::msg))
            .transpose()?
            .unwrap_or_default();
        let defaults = WalletDirectory::testnet_defaults();
        let mut wallets = WalletDirectory::new();
        for (currency, key) in [
            (Currency::Btc, "BTC_WALLET_ADDRESS"),
            (Currency::Eth, "ETH_WALLET_ADDRESS"),
            (Currency::Usdt, "USDT_WALLET_ADDRESS"),
        ] {
            let address = env_opt(key).or_else(|| defaults.get(currency).map(|w| w.address.clone()));
            match address {
                Some(address) => wallets = wallets.with_wallet(currency, address, network),
                None => warn!(currency = %currency, "No collection wallet configured"),
            }
        }

        let external_timeout = Duration::from_secs(env_parse("EXTERNAL_TIMEOUT_SECS", 10u64)?);
        let service = ServiceConfig {
            payment_timeout: chrono::Duration::minutes(env_parse("PAYMENT_TIMEOUT_MINUTES", 30i64)?),
            monitor: MonitorConfig {
                interval: Duration::from_secs(env_parse("MONITOR_INTERVAL_SECS", 30u64)?),
                ..Default::default()
            },
            observer_timeout: external_timeout,
            price_cache_ttl: Duration::from_secs(env_parse("PRICE_CACHE_TTL_SECS", 60u64)?),
            price_feed_timeout: external_timeout,
            retry: RetryPolicy::new(
                env_parse("ALLOCATOR_MAX_ATTEMPTS", 5u32)?,
                RetryPolicy::default().base_delay,
            ),
        };
        service.validate()?;

        Ok(Self {
            database_url,
            host,
            port,
            demo_mode,
            wallets,
            usdt_contract: env_opt("USDT_CONTRACT_ADDRESS"),
            blockcypher_api_url: env_opt("BLOCKCYPHER_API_URL"),
            etherscan_api_url: env_opt("ETHERSCAN_API_URL"),
            etherscan_api_key: env_opt("ETHERSCAN_API_KEY").map(SecretString::from),
            coingecko_api_url: env_opt("COINGECKO_API_URL"),
            external_timeout,
            service,
            enable_rate_limiting: env_flag("ENABLE_RATE_LIMITING", false),
            rate_limit_config: RateLimitConfig::from_env(),
        })
    }

    fn chain_observer(&self) -> Result<Arc<dyn ChainObserver>> {
        let policy = ConfirmationPolicy::default();
        if self.demo_mode {
            warn!("   ⚠ DEMO_MODE enabled: payments confirm on a simulated ledger");
            return Ok(Arc::new(SimulatedObserver::new(policy)));
        }

        let mut router = CurrencyRouter::new(policy.clone());
        if let Some(wallet) = self.wallets.get(Currency::Btc) {
            router = router.route(
                Currency::Btc,
                Arc::new(BlockCypherObserver::new(
                    self.blockcypher_api_url.clone(),
                    wallet.address.clone(),
                    policy.clone(),
                    self.external_timeout,
                )?),
            );
        }
        for currency in [Currency::Eth, Currency::Usdt] {
            if let Some(wallet) = self.wallets.get(currency) {
                router = router.route(
                    currency,
                    Arc::new(EtherscanObserver::new(
                        self.etherscan_api_url.clone(),
                        self.etherscan_api_key.clone(),
                        wallet.address.clone(),
                        self.usdt_contract.clone(),
                        policy.clone(),
                        self.external_timeout,
                    )?),
                );
            }
        }
        Ok(Arc::new(router))
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🎟️  Ticket Checkout v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("📦 Initializing infrastructure...");

    let postgres_client = PostgresClient::new(&config.database_url, PostgresConfig::default()).await?;
    postgres_client.run_migrations().await?;
    info!("   ✓ Database connected and migrations applied");
    let db_client = Arc::new(postgres_client);

    let price_feed = Arc::new(CoinGeckoPriceFeed::new(
        config.coingecko_api_url.clone(),
        config.external_timeout,
    )?);
    info!("   ✓ Price feed created (CoinGecko)");

    let chain_observer = config.chain_observer()?;
    info!("   ✓ Chain observer created");

    let service = Arc::new(AppService::new(
        db_client.clone(),
        price_feed,
        chain_observer,
        config.wallets.clone(),
        config.service.clone(),
    ));

    let resumed = service.monitors().resume_in_flight().await?;
    info!("   ✓ Resumed {} payment monitor(s)", resumed);

    let app_state = Arc::new(AppState::new(Arc::clone(&service), db_client));

    let router = if config.enable_rate_limiting {
        info!("   ✓ Rate limiting enabled");
        create_router_with_rate_limit(app_state, config.rate_limit_config)
    } else {
        info!("   ○ Rate limiting disabled");
        create_router(app_state)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.monitors().shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
