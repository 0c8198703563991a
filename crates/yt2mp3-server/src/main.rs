mod args;
mod delivery;
mod error;
mod handlers;
mod progress;
mod state;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Args;
use state::AppState;
use yt2mp3_core::config::{resolve_save_dir, Config};

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Args::parse();

    // Initialize logging based on verbosity
    let filter = match cli.verbose {
        0 => "yt2mp3=info,yt2mp3_core=info,actix_web=info",
        1 => "yt2mp3=debug,yt2mp3_core=debug,actix_web=info",
        2 => "yt2mp3=trace,yt2mp3_core=trace,actix_web=debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = Config::load(cli.config.as_deref())?;

    // CLI beats env beats config file
    if let Some(dir) = cli.save_dir {
        config.output.save_directory = Some(dir);
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Some(dir) = config.output.save_directory.take() {
        let resolved = resolve_save_dir(&dir);
        info!("Files will be saved to: {}", resolved.display());
        config.output.save_directory = Some(resolved);
    } else {
        info!("No save directory configured; finished files stream to the browser");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    info!("Listening on {}:{}", host, port);

    let app_state = web::Data::new(AppState::new(config));

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
