mod cli;

use hlscast::{config, CastController, CastOptions, CastState, HardwareProfile};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use tokio::signal;

struct CastArgs {
    input: PathBuf,
    subtitles: Option<PathBuf>,
    hw: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    max_height: Option<u32>,
}

async fn cast(args: CastArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override from CLI if specified
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(hw) = args.hw.as_deref() {
        config.hardware.backends =
            HardwareProfile::parse_backends(hw).context("Invalid --hw backend list")?;
    }
    config::validate_config(&config)?;

    if let Some(ref subs) = args.subtitles {
        if !hlscast_common::paths::is_subtitle_file(subs) {
            tracing::warn!("{:?} does not look like a subtitle file", subs);
        }
    }

    let options = CastOptions {
        subtitle_path: args.subtitles,
        max_height: args.max_height,
        max_bitrate: None,
    };

    let controller = CastController::new(config);
    let mut status_rx = controller.subscribe();

    let handle = controller
        .start(&args.input, options)
        .await
        .with_context(|| format!("Failed to start casting {:?}", args.input))?;

    println!("Casting {}", args.input.display());
    println!("Stream URL: {}", handle.url());

    let result = loop {
        tokio::select! {
            _ = shutdown_signal() => break Ok(()),
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let status = status_rx.borrow_and_update().clone();
                tracing::info!(state = %status.state, "Cast state changed");
                if status.state == CastState::Failed {
                    let error = status.error.unwrap_or_else(|| "unknown error".to_string());
                    break Err(anyhow::anyhow!("Cast failed: {}", error));
                }
                if status.state == CastState::Idle {
                    break Ok(());
                }
            }
        }
    };

    tracing::info!("Stopping cast...");
    controller.stop().await;

    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hlscast=trace,hlscast_av=trace,tower_http=debug".to_string()
        } else {
            "hlscast=debug,hlscast_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Cast {
            input,
            subtitles,
            hw,
            host,
            port,
            max_height,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let args = CastArgs {
                input,
                subtitles,
                hw,
                host,
                port,
                max_height,
            };
            rt.block_on(cast(args, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hlscast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let program = &config.encoder.program;

    for tool in hlscast_av::check_tools(program) {
        match (&tool.path, &tool.version) {
            (Some(path), Some(version)) => {
                println!("✓ {} ({}) - {}", tool.name, version, path.display())
            }
            (Some(path), None) => println!("? {} - {} (no version banner)", tool.name, path.display()),
            _ => println!("✗ {} not found", tool.name),
        }
    }

    match hlscast_av::compiled_backends(program) {
        Ok(compiled) => {
            println!();
            for backend in config.hardware.ranked() {
                let mark = if compiled.contains(&backend) { "✓" } else { "✗" };
                println!("{} {} ({})", mark, backend, backend.video_encoder());
            }
        }
        Err(e) => {
            println!("\nCannot list encoders: {}", e);
            println!("Install ffmpeg or set [encoder].program to enable casting.");
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Segments: {}s x {}",
        config.encoder.segment_duration_secs, config.encoder.window_size
    );
    let backends: Vec<&str> = config
        .hardware
        .ranked()
        .iter()
        .map(|b| b.name())
        .collect();
    println!("  Encoders: {}", backends.join(", "));
    println!(
        "  Startup timeout: {}s",
        config.session.startup_timeout_secs
    );

    Ok(())
}
