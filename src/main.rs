use std::{path::Path, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::WrapErr};
use pollpulse_gateway::{
    DrainOutcome, GatewayServer, HttpClientAdapter, HttpHandler, ProxyDispatcher, RouteRegistry,
    TracingEventSink,
    config::{ConfigValidator, GatewayConfig, SAMPLE_CONFIG, load_config},
    ports::{event_sink::EventSink, http_client::HttpClient},
    tracing_setup,
    utils::GracefulShutdown,
};
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (YAML, JSON, TOML or INI). Defaults apply when omitted.
    #[clap(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and print a summary
    Validate,
    /// Write a sample configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.toml")]
        output: String,
    },
    /// Start the gateway server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(config_path).await,
        Commands::Init { output } => init_config_command(&output).await,
        Commands::Serve => {
            let config = load_config(config_path)
                .await
                .wrap_err("Failed to load configuration")?;
            tracing_setup::init_tracing(&config.logging)
                .wrap_err("Failed to initialize tracing")?;

            let root = tracing_setup::create_service_span(&config.logging);
            serve(config).instrument(root).await
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    ConfigValidator::validate(&config).wrap_err("Invalid configuration")?;

    let registry =
        RouteRegistry::load(config.routes.clone()).wrap_err("Failed to load route registry")?;
    for route in registry.routes() {
        tracing::info!(
            route = route.name(),
            prefix = route.path_prefix(),
            backend = %route.backend(),
            auth_required = route.auth_required(),
            strip_path_prefix = route.strip_path_prefix(),
            "Configured route"
        );
    }

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().wrap_err("Failed to create HTTP client adapter")?);
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);

    let dispatcher = ProxyDispatcher::new(http_client, config.request_timeout());
    let handler = Arc::new(HttpHandler::new(registry, dispatcher, events.clone()));
    let app = handler.into_router(&config.cors);

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    // Start signal handler for graceful shutdown
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(
        async move {
            if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
                tracing::error!("Signal handler error: {:?}", e);
            }
        }
        .in_current_span(),
    );

    let mut shutdown_token = graceful_shutdown.shutdown_token();
    let listen_addr = config.effective_listen_addr();
    tracing::info!(
        listen_addr = %listen_addr,
        request_timeout = ?config.request_timeout(),
        shutdown_grace_period = ?config.shutdown_grace_period(),
        "Starting PollPulse API Gateway"
    );

    let server = GatewayServer::new(config.shutdown_grace_period(), events);
    let outcome = server
        .run(&listen_addr, app, async move {
            shutdown_token.wait_for_shutdown().await
        })
        .await
        .wrap_err("Gateway server failed")?;

    match outcome {
        DrainOutcome::Completed => tracing::info!("Graceful shutdown completed"),
        DrainOutcome::ForcedClose { abandoned } => tracing::warn!(
            abandoned,
            "Shutdown completed after forcibly closing connections"
        ),
    }
    Ok(())
}

/// Validate configuration and exit
async fn validate_config_command(config_path: Option<&str>) -> Result<()> {
    match config_path {
        Some(path) => {
            println!("🔍 Validating configuration file: {path}");
            if !Path::new(path).exists() {
                eprintln!("❌ Error: Configuration file '{path}' not found");
                std::process::exit(1);
            }
        }
        None => println!("🔍 Validating built-in defaults and environment overrides"),
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        println!();
        println!("💡 Common fixes:");
        println!("   • Ensure every backend URL starts with http:// or https://");
        println!("   • Path prefixes must start with '/'");
        println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
        std::process::exit(1);
    }

    println!("✅ Configuration validation: OK");
    println!();
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.effective_listen_addr());
    println!("   • Request Timeout: {}s", config.request_timeout_secs);
    println!("   • Shutdown Grace Period: {}s", config.shutdown_grace_period_secs);
    println!("   • CORS Enabled: {}", config.cors.enabled);
    println!("   • Routes (matched in this order):");
    for route in &config.routes {
        println!(
            "     {} {} -> {}{}{}",
            route.name,
            route.path_prefix,
            route.backend_base_url,
            if route.strip_path_prefix { " [strip]" } else { "" },
            if route.auth_required { " [auth]" } else { "" },
        );
    }
    Ok(())
}

/// Initialize a new configuration file
async fn init_config_command(output: &str) -> Result<()> {
    let path = Path::new(output);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{output}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, SAMPLE_CONFIG)
        .await
        .wrap_err("Failed to write config file")?;
    println!("✅ Created default configuration at: {output}");
    println!("   Run 'pollpulse-gateway serve --config {output}' to start the server");
    Ok(())
}
