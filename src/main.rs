use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ecal_showers::batch::DataLoader;
use ecal_showers::{DatasetConfig, Pipeline, SampleSource};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load a calorimeter shower dataset and iterate its batches")]
struct Cli {
    /// Dataset configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Number of passes over the training split
    #[arg(long, default_value_t = 1)]
    epochs: usize,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut cfg = DatasetConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(v) = cli.batch_size {
        cfg.loader.batch_size = v;
    }
    if let Some(v) = cli.seed {
        cfg.seed = v;
    }

    let pipeline = Pipeline::from_config(&cfg).context("building dataset")?;
    let names: Vec<&str> = pipeline.augmentations.iter().map(|a| a.name()).collect();
    info!("augmentations: {names:?}");
    for (count, samples) in pipeline.dataset.shower_histogram() {
        info!("  {count:>4} showers: {samples} samples");
    }

    let loader = DataLoader::new(&pipeline, &cfg.loader, cfg.seed)?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    for epoch in 0..cli.epochs {
        let mut showers = 0usize;
        let mut energy = 0.0f64;
        let mut seen = 0usize;
        for batch in loader.iter_epoch(&mut rng) {
            let batch = batch?;
            showers += batch.shower_counts.iter().sum::<usize>();
            energy += f64::from(batch.projections.sum());
            seen += batch.len();
        }
        info!(
            "epoch {epoch}: {seen} samples, {showers} showers, mean deposited energy {:.3}",
            energy / seen.max(1) as f64
        );
    }

    if let Some(valid) = loader.split_validation() {
        let mut seen = 0usize;
        for batch in valid.iter_epoch(&mut rng) {
            seen += batch?.len();
        }
        info!("validation: {seen} samples");
    }

    println!(
        "Loaded {} samples ({} classes); {} batches per epoch",
        pipeline.len(),
        pipeline.dataset.num_classes(),
        loader.num_batches()
    );
    Ok(())
}
