use crate::config::{Config, get_config_path, load_config, save_config};
use crate::engine::SyncEngine;
use crate::gateway::GatewayState;
use crate::providers::Provider;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub(super) fn init(force: bool) -> Result<()> {
    let config_path = get_config_path()?;
    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }

    let config = Config::default();
    save_config(&config, Some(config_path.as_path()))?;
    println!("\u{2713} Created config at {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Add provider credentials to {}", config_path.display());
    println!("  2. Check them: unibox doctor");
    println!("  3. Start syncing: unibox run");

    Ok(())
}

pub(super) async fn run_engine(config_path: Option<&Path>) -> Result<()> {
    info!("Loading configuration...");
    let config = load_config(config_path)?;
    let engine = Arc::new(SyncEngine::new(config.clone()));

    let mut connected = Vec::new();
    for provider in Provider::all() {
        if !config.providers.get(provider).enabled {
            continue;
        }
        match engine.connect(provider).await {
            Ok(()) => connected.push(provider),
            Err(e) => error!("{} connect failed: {}", provider, e),
        }
    }
    if connected.is_empty() {
        anyhow::bail!("no providers connected; check credentials with `unibox doctor`");
    }

    let gateway_task = if config.gateway.enabled {
        let state = GatewayState::from_config(&config, engine.relay());
        let task =
            crate::gateway::start(&config.gateway.host, config.gateway.port, state).await?;
        Some(task)
    } else {
        info!("webhook gateway disabled; inbound events arrive via sync polling only");
        None
    };

    let names: Vec<&str> = connected.iter().map(Provider::as_str).collect();
    println!("unibox is running. Connected providers: {}", names.join(", "));
    if config.gateway.enabled {
        println!(
            "Webhook gateway listening on {}:{}",
            config.gateway.host, config.gateway.port
        );
    }
    println!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    if let Some(task) = gateway_task {
        task.abort();
    }
    for provider in connected {
        engine.disconnect(provider).await;
    }
    info!("shutdown complete");

    Ok(())
}

pub(super) fn status(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };
    let config = load_config(config_path)?;

    println!("unibox Status\n");

    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() {
            "\u{2713}"
        } else {
            "\u{2717} (using defaults)"
        }
    );

    for provider in Provider::all() {
        let settings = config.providers.get(provider);
        if !settings.enabled {
            println!("{}: disabled", provider);
            continue;
        }
        let token = if settings.access_token.trim().is_empty() {
            "access token not set"
        } else {
            "access token \u{2713}"
        };
        println!("{}: enabled, {}", provider, token);
        println!(
            "  webhook: verify token {}, app secret {}",
            if settings.verify_token.is_empty() {
                "not set"
            } else {
                "\u{2713}"
            },
            if settings.app_secret.is_empty() {
                "not set"
            } else {
                "\u{2713}"
            }
        );
        println!(
            "  sync poll: every {}s, page size {}",
            settings.sync_poll_interval_secs, settings.sync_page_size
        );
    }

    if config.gateway.enabled {
        println!("Gateway: {}:{}", config.gateway.host, config.gateway.port);
    } else {
        println!("Gateway: disabled");
    }

    Ok(())
}
