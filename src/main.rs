//! WSI Reader - inspect whole slide images from the command line.

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_reader::{
    config::{Cli, Command, InfoArgs, RegionArgs, ThumbnailArgs},
    encoder::save_jpeg,
    slide::SlideAdapter,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.command.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let adapter = SlideAdapter::new(cli.command.config().slide_options());

    let result = match &cli.command {
        Command::Info(args) => run_info(&adapter, args).await,
        Command::Thumbnail(args) => run_thumbnail(&adapter, args).await,
        Command::Region(args) => run_region(&adapter, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_reader=debug"
    } else {
        "wsi_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(adapter: &SlideAdapter, args: &InfoArgs) -> Result<(), String> {
    let slide = adapter.initialize().await.map_err(|e| e.to_string())?;
    let format = slide.reader().format();

    let mut summary = json!({
        "path": adapter.path().display().to_string(),
        "name": adapter.name(),
        "extension": adapter.extension(),
        "format": format,
        "format_name": format.name(),
        "dimensions": slide.dimensions(),
        "level_count": slide.level_count(),
        "level_dimensions": slide.level_dimensions(),
        "level_downsamples": slide.level_downsamples(),
        "mpp": slide.mpp(),
        "mag": slide.mag(),
        "tissue_contours": slide.tissue_contours().map(|c| c.len()),
    });
    if args.properties {
        summary["properties"] = slide.properties().clone();
    }

    let text = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// Thumbnail Command
// =============================================================================

async fn run_thumbnail(adapter: &SlideAdapter, args: &ThumbnailArgs) -> Result<(), String> {
    let thumbnail = adapter
        .get_thumbnail((args.width, args.height))
        .await
        .map_err(|e| e.to_string())?;

    save_jpeg(&thumbnail, &args.output, args.jpeg_quality)
        .await
        .map_err(|e| e.to_string())?;

    info!(
        "Wrote {}x{} thumbnail to {}",
        args.width,
        args.height,
        args.output.display()
    );
    Ok(())
}

// =============================================================================
// Region Command
// =============================================================================

async fn run_region(adapter: &SlideAdapter, args: &RegionArgs) -> Result<(), String> {
    let region = adapter
        .read_region_as(
            (args.x, args.y),
            args.level,
            (args.width, args.height),
            &args.device,
            &args.read_as,
        )
        .await
        .map_err(|e| e.to_string())?;

    save_jpeg(&region.to_image(), &args.output, args.jpeg_quality)
        .await
        .map_err(|e| e.to_string())?;

    info!(
        "Wrote {}x{} region at ({}, {}) level {} as {} to {}",
        args.width,
        args.height,
        args.x,
        args.y,
        args.level,
        args.read_as,
        args.output.display()
    );
    Ok(())
}
