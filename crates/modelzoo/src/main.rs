//! `modelzoo` CLI entry point: `serve` runs the long-lived control plane;
//! `launch`/`stop`/`list`/`logs` are thin clients over the running `serve`
//! process's own admin API.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colorful::Colorful;
use modelzoo::admin::{self, AdminClient, AdminState};
use modelzoo::config::{params_from_yaml, Config};
use modelzoo::history::LaunchHistory;
use modelzoo::proxy::{self, AppState, ConnectionCounter};
use modelzoo::registry::{ModelRegistry, ZooCatalog};
use modelzoo::shutdown;
use modelzoo_types::Model;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "ModelZoo - a local control plane and reverse proxy for ML inference servers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane: proxy, registry, and peer fan-out.
    Serve {
        /// Path to the YAML zoo/runtime/environment/peer configuration.
        #[arg(long)]
        config: String,
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "0.0.0.0:9696")]
        bind: String,
        /// Path to the launch-history JSON file.
        #[arg(long, default_value = "history.json")]
        history: String,
    },

    /// Launch a model on a running `serve` process.
    Launch {
        zoo: String,
        model_id: String,
        #[arg(long)]
        runtime: String,
        #[arg(long = "env")]
        environment: Vec<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Custom display name overriding the catalog's `model_name`.
        #[arg(long = "name")]
        custom_name: Option<String>,
        /// YAML mapping of extra launch parameters, e.g. `'{context: 8K}'`.
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value = "http://127.0.0.1:9696")]
        admin_url: String,
    },

    /// Stop a running model by name.
    Stop {
        model_name: String,
        #[arg(long, default_value = "http://127.0.0.1:9696")]
        admin_url: String,
    },

    /// List every locally and peer-advertised model.
    List {
        #[arg(long, default_value = "http://127.0.0.1:9696")]
        admin_url: String,
    },

    /// Print the last 100 log lines for a running model.
    Logs {
        model_name: String,
        #[arg(long, default_value = "http://127.0.0.1:9696")]
        admin_url: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;

    match cli.command {
        Command::Serve { config, bind, history } => rt.block_on(run_serve(config, bind, history)),
        Command::Launch {
            zoo,
            model_id,
            runtime,
            environment,
            port,
            custom_name,
            params,
            admin_url,
        } => rt.block_on(run_launch(
            zoo, model_id, runtime, environment, port, custom_name, params, admin_url,
        )),
        Command::Stop { model_name, admin_url } => rt.block_on(run_stop(model_name, admin_url)),
        Command::List { admin_url } => rt.block_on(run_list(admin_url)),
        Command::Logs { model_name, admin_url } => rt.block_on(run_logs(model_name, admin_url)),
    }
}

/// A zoo catalog backend is owned by the glue layer: this core never
/// scans a filesystem or calls a remote listing API itself.
/// `serve` registers each configured zoo name with an empty catalog so
/// toggle/enumerate mechanics work structurally; a real deployment
/// supplies its own `ZooCatalog` impl in place of this one.
struct EmptyCatalog;

impl ZooCatalog for EmptyCatalog {
    fn catalog(&self) -> Vec<Model> {
        Vec::new()
    }
}

async fn run_serve(config_path: String, bind: String, history_path: String) -> Result<()> {
    let config = Config::load(&config_path)
        .await
        .with_context(|| format!("failed to load config from {config_path}"))?;

    let registry = Arc::new(ModelRegistry::new(config.peers));
    for zoo_name in &config.zoo_names {
        registry.register_zoo(zoo_name.clone(), Box::new(EmptyCatalog)).await;
    }

    let history = Arc::new(
        LaunchHistory::load(&history_path)
            .await
            .with_context(|| format!("failed to load launch history from {history_path}"))?,
    );

    let admin_state = AdminState {
        registry: registry.clone(),
        history,
        runtimes: Arc::new(config.runtimes),
        environments: Arc::new(config.environments),
    };

    let proxy_state = AppState {
        registry: registry.clone(),
        connections: ConnectionCounter::new(),
        http_client: reqwest::Client::new(),
    };

    let app = proxy::router(proxy_state)
        .merge(admin::router(admin_state))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = bind.parse().with_context(|| format!("invalid bind address: {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "modelzoo listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_and_stop_all(registry))
        .await
        .context("server error")?;

    Ok(())
}

async fn run_launch(
    zoo: String,
    model_id: String,
    runtime: String,
    environment: Vec<String>,
    port: Option<u16>,
    custom_name: Option<String>,
    params: String,
    admin_url: String,
) -> Result<()> {
    let params_value: serde_yaml::Value = serde_yaml::from_str(&params).context("invalid --params YAML")?;
    let params = params_from_yaml(params_value);

    let client = AdminClient::new(admin_url);
    let response = client
        .launch(&zoo, &model_id, &runtime, environment, port, custom_name, params)
        .await?;
    println!("{} {}", "launched".green().bold(), serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_stop(model_name: String, admin_url: String) -> Result<()> {
    let client = AdminClient::new(admin_url);
    client.stop(&model_name).await?;
    println!("{} {model_name}", "stopped".red().bold());
    Ok(())
}

async fn run_list(admin_url: String) -> Result<()> {
    let client = AdminClient::new(admin_url);
    let response = client.list().await?;
    let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for model in response.running_models {
        let readiness = if model.status.ready {
            "ready".green().to_string()
        } else {
            "not ready".yellow().to_string()
        };
        by_name
            .entry(model.model_name.clone())
            .or_default()
            .push(format!("{} ({}, {readiness})", model.source, model.listener));
    }
    for (name, instances) in by_name {
        println!("{}", name.as_str().bold());
        for instance in instances {
            println!("  {instance}");
        }
    }
    Ok(())
}

async fn run_logs(model_name: String, admin_url: String) -> Result<()> {
    let client = AdminClient::new(admin_url);
    for line in client.logs(&model_name).await? {
        println!("{line}");
    }
    Ok(())
}
