use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use switchyard::{
    adapters::{
        ConfigWatcher, HttpClientAdapter, InMemoryRouteStore, build_app,
        config_watcher::{self, DEFAULT_DEBOUNCE},
    },
    config::{GatewayConfig, GatewayConfigValidator, load_config},
    core::{HotReloadManager, PluginRegistry, RouteTableBuilder},
    plugins,
    ports::{Reloader, RouteStore},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Start the gateway (default)
    Serve {
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Parse and validate a configuration file
    Validate {
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Write a starter configuration file
    Init {
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {config_path}"))?;
    tracing_setup::init_tracing(&config.logging)?;
    GatewayConfigValidator::validate_settings(&config).wrap_err("Invalid configuration")?;
    for problem in GatewayConfigValidator::route_errors(&config) {
        tracing::warn!(error = %problem, "Route will be skipped or disabled");
    }

    let upstream_timeout = config
        .upstream_timeout()
        .wrap_err("Invalid upstream_timeout")?;

    let mut registry = PluginRegistry::new();
    plugins::register_builtin(&mut registry);
    let registry = Arc::new(registry.with_settings(config.plugins.clone()));

    let client = Arc::new(HttpClientAdapter::new()?);
    let builder = RouteTableBuilder::new(registry, client, upstream_timeout);

    let (store, memory_store) = select_store(&config).await?;
    let manager = Arc::new(
        HotReloadManager::new(store.clone(), builder)
            .await
            .wrap_err("Initial route load failed")?,
    );
    let reloader: Arc<dyn Reloader> = manager.clone();

    if config.watch_config {
        match memory_store {
            Some(memory_store) => {
                let watcher = ConfigWatcher::new(config_path)?;
                config_watcher::spawn_route_sync(
                    watcher,
                    memory_store,
                    reloader.clone(),
                    DEFAULT_DEBOUNCE,
                );
            }
            None => tracing::warn!("watch_config only applies to the in-memory route store"),
        }
    }

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_shutdown = shutdown.clone();
    let signal_reloader = reloader.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_shutdown.run_signal_handler(signal_reloader).await {
            tracing::error!(error = ?e, "Signal handler error");
        }
    });

    let app = build_app(manager, store, &config.admin);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Gateway listening");

    let graceful = shutdown.clone();
    let server = async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            graceful.wait_for_shutdown_signal().await;
        })
        .await
    };

    tokio::select! {
        result = server => {
            result.wrap_err("Server error")?;
            tracing::info!("Graceful shutdown completed");
        }
        _ = shutdown.drain_deadline() => {
            tracing::warn!("Exiting with requests still in flight");
        }
    }
    Ok(())
}

/// Pick the route store: MongoDB when configured, otherwise the file's `routes:`.
///
/// The in-memory store is also returned separately so the config watcher can
/// replace its contents.
async fn select_store(
    config: &GatewayConfig,
) -> Result<(Arc<dyn RouteStore>, Option<Arc<InMemoryRouteStore>>)> {
    match &config.persistence.mongodb {
        #[cfg(feature = "mongodb")]
        Some(mongo) => {
            let store = switchyard::adapters::MongoRouteStore::connect(mongo)
                .await
                .wrap_err("Failed to connect to MongoDB")?;
            tracing::info!("Loaded route configuration from MongoDB");
            Ok((Arc::new(store), None))
        }
        #[cfg(not(feature = "mongodb"))]
        Some(_) => Err(eyre!(
            "persistence.mongodb is configured but this binary was built without the `mongodb` feature"
        )),
        None => {
            let store = Arc::new(InMemoryRouteStore::new(config.routes.clone()));
            tracing::info!(routes = config.routes.len(), "Loaded route configuration from config file");
            Ok((store.clone(), Some(store)))
        }
    }
}

async fn validate_config_command(config_path: &str) -> Result<()> {
    if !Path::new(config_path).exists() {
        return Err(eyre!("Configuration file '{config_path}' not found"));
    }

    let config = load_config(config_path)
        .await
        .wrap_err("Configuration parsing failed")?;
    GatewayConfigValidator::validate(&config).wrap_err("Configuration validation failed")?;

    println!("Configuration {config_path} is valid");
    println!("  listen address: {}", config.listen_addr);
    println!("  routes:         {}", config.routes.len());
    println!(
        "  route store:    {}",
        if config.persistence.mongodb.is_some() {
            "mongodb"
        } else {
            "in-memory"
        }
    );
    println!("  admin api:      {}", config.admin.enabled);
    Ok(())
}

const STARTER_CONFIG: &str = r#"# Switchyard gateway configuration

listen_addr: "0.0.0.0:8080"
upstream_timeout: "30s"
watch_config: true

logging:
  level: info
  format: pretty

admin:
  enabled: true
  # api_key: "change-me"

# persistence:
#   mongodb:
#     uri: "mongodb://localhost:27017"
#     database: apigateway
#     collection: routes

plugins:
  jwt-auth:
    tokens: ["valid-token"]

routes:
  - path: /users
    methods: [GET, POST]
    upstream: http://localhost:3000
    plugins: [jwt-auth, logging]
  - path: /echo/*
    upstream: http://localhost:9000
    strip_prefix: true
    plugins: [logging]
"#;

async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        return Err(eyre!("Configuration file '{config_path}' already exists"));
    }

    tokio::fs::write(path, STARTER_CONFIG)
        .await
        .wrap_err_with(|| format!("Failed to write {config_path}"))?;
    println!("Wrote starter configuration to {config_path}");
    Ok(())
}
