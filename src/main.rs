pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a GeoJSON scene for every year in the configured range
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the GeoJSON scene for one year
    Scene {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        year: i32,
    },
    /// Serve the interactive map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!("Generating scenes with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::DatasetHandle::initialize(&app_config)?;

            let out_dir = &app_config.output.scene_dir;
            fs::create_dir_all(out_dir)
                .with_context(|| format!("Failed to create scene directory: {:?}", out_dir))?;

            let scenes = dataset.build_scenes(app_config.year_range());
            let entries = scenes
                .par_iter()
                .map(|scene| render::write_scene(out_dir, scene))
                .collect::<Result<Vec<_>>>()?;
            render::write_index(out_dir, &entries)?;

            info!("Wrote {} scenes to {:?}", entries.len(), out_dir);
        }
        Commands::Scene { config, year } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::DatasetHandle::initialize(&app_config)?;

            let scene = dataset.build_scene(*year);
            let body = serde_json::to_string_pretty(&render::scene_to_geojson(&scene)?)
                .context("Failed to serialize scene")?;
            println!("{}", body);
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::DatasetHandle::initialize(&app_config)?;

            server::start_server(app_config, dataset).await?;
        }
    }

    Ok(())
}
