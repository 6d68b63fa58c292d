//! Command-line publisher for Dot Quote/0 screens.
//!
//! Reads configuration from the environment (and `.env`), then lists
//! devices or pushes images and text to a screen.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use dot_client::{DotClient, RenderMode, SendOptions};
use dot_service::cli::{self, Command};
use dot_service::{AppConfig, Publisher};
use quote_image::TextLayoutRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = match cli::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e:#}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    let config = AppConfig::from_env()?;
    let mut client = DotClient::new(config.dot_config()?)?;
    if let Command::Text { render: Some(_), .. } = command {
        if let Some(rasterizer) = config.load_rasterizer()? {
            client = client.with_rasterizer(rasterizer);
        }
    }

    let options = SendOptions {
        border: config.border,
        ..SendOptions::default()
    };
    let publisher =
        Publisher::new(Arc::new(client), config.default_device_id.clone()).with_options(options);

    run(&publisher, command).await
}

async fn run(publisher: &Publisher, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Devices => {
            let devices = publisher.devices().await?;
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        Command::Status { device } => {
            let id = publisher.resolve_device(device.as_deref())?;
            let status = publisher.client().device_status(id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Tasks { device, task_type } => {
            let id = publisher.resolve_device(device.as_deref())?;
            let tasks = publisher.client().list_tasks(id, &task_type).await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Command::Image {
            path,
            algorithm,
            fit,
            device,
            preview,
        } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;

            if let Some(out) = preview {
                let frame = publisher.preview_image(&bytes, fit, algorithm)?;
                std::fs::write(&out, frame.to_png()?)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                tracing::info!(path = %out.display(), "Preview written");
                return Ok(());
            }

            let ack = publisher
                .publish_image(&bytes, fit, algorithm, device.as_deref())
                .await?;
            tracing::info!(code = ack.code, message = %ack.message, "Image accepted");
        }
        Command::Text {
            body,
            title,
            signature,
            render,
            device,
        } => {
            let mut request = TextLayoutRequest::new(body);
            request.title = title;
            request.signature = signature;
            let mode = render.map_or(RenderMode::Native, RenderMode::Image);

            let ack = publisher
                .publish_text(&request, mode, device.as_deref())
                .await?;
            tracing::info!(code = ack.code, message = %ack.message, "Text accepted");
        }
        Command::Next { device } => {
            let ack = publisher.next(device.as_deref()).await?;
            tracing::info!(code = ack.code, message = %ack.message, "Switched to next page");
        }
    }
    Ok(())
}
