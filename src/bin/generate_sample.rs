use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ecal_showers::config::DatasetConfig;
use ecal_showers::data::loader::{
    write_deposits_parquet, write_energies_parquet, write_noise_parquet, DepositTable, EnergyTable,
};
use ecal_showers::data::model::{
    NoiseTable, ShowerRecord, Voxel, GRID_LEN, GRID_X, GRID_Y, GRID_Z,
};

#[derive(Debug, Parser)]
#[command(about = "Write a synthetic calorimeter shower dataset")]
struct Cli {
    /// Output directory
    #[arg(long, default_value = "sample_data")]
    output: PathBuf,

    /// Number of samples
    #[arg(long, default_value_t = 200)]
    samples: usize,

    /// Maximum showers per sample
    #[arg(long, default_value_t = 6)]
    max_showers: usize,

    /// Number of noise grids
    #[arg(long, default_value_t = 50)]
    noise_samples: u32,

    /// Number of energy bins
    #[arg(long, default_value_t = 12)]
    classes: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Deposits of one shower: a narrow core that develops along z and fades.
fn shower_deposits(rng: &mut StdRng, energy: f64, record: &mut ShowerRecord) {
    let x0 = rng.gen_range(5.0..(GRID_X as f64 - 5.0));
    let y0 = rng.gen_range(1.0..(GRID_Y as f64 - 1.0));
    let depth = 2.0 + energy.ln();

    for z in 0..GRID_Z {
        // Gamma-like longitudinal profile peaking near `depth`.
        let t = z as f64 + 0.5;
        let weight = (t / depth).powf(2.0) * (-(t / depth)).exp();
        let layer_energy = energy * weight * 0.15;
        if layer_energy < 1e-3 {
            continue;
        }
        for _ in 0..3 {
            let x = gauss(rng, x0, 1.0).round().clamp(0.0, (GRID_X - 1) as f64) as usize;
            let y = gauss(rng, y0, 0.7).round().clamp(0.0, (GRID_Y - 1) as f64) as usize;
            record.push(Voxel::new(z, x, y), layer_energy / 3.0);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut rng = StdRng::seed_from_u64(cli.seed);

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;

    let mut deposits = DepositTable::new();
    let mut energies = EnergyTable::new();
    for i in 0..cli.samples {
        let key = format!("{i:05}");
        let n = rng.gen_range(0..=cli.max_showers);
        let mut record = ShowerRecord::default();
        let mut list = Vec::with_capacity(n);
        for _ in 0..n {
            let e = rng.gen_range(1.0..13.0);
            shower_deposits(&mut rng, e, &mut record);
            list.push(e);
        }
        deposits.insert(key.clone(), record);
        energies.insert(key, list);
    }

    // Sparse electronic noise, stored in (z, x, y) order.
    let mut noise = NoiseTable::new();
    for k in 0..cli.noise_samples {
        let mut values = vec![0.0f32; GRID_LEN];
        for v in values.iter_mut() {
            if rng.gen_bool(0.02) {
                *v = gauss(&mut rng, 0.0, 0.01).abs() as f32;
            }
        }
        noise.insert(k.to_string(), values);
    }

    let deposit_path = cli.output.join("edep.parquet");
    let energy_path = cli.output.join("energies.parquet");
    let noise_path = cli.output.join("noise.parquet");
    let classes_path = cli.output.join("num_classes.txt");
    let config_path = cli.output.join("dataset.json");

    write_deposits_parquet(&deposit_path, &deposits)?;
    write_energies_parquet(&energy_path, &energies)?;
    write_noise_parquet(&noise_path, &noise)?;
    std::fs::write(&classes_path, format!("{}\n", cli.classes))?;

    let mut cfg = DatasetConfig::new("edep.parquet", "energies.parquet");
    cfg.noise_file = Some("noise.parquet".into());
    cfg.num_classes_file = Some("num_classes.txt".into());
    cfg.augment.noise = cli.noise_samples > 0;
    cfg.augment.noise_keys = 0..=cli.noise_samples.saturating_sub(1);
    cfg.loader.batch_size = 32;
    cfg.loader.validation_split = 0.1;
    std::fs::write(&config_path, serde_json::to_string_pretty(&cfg)?)?;

    println!(
        "Wrote {} samples and {} noise grids to {}",
        cli.samples,
        cli.noise_samples,
        cli.output.display()
    );
    println!("Run: ecal-showers --config {}", config_path.display());
    Ok(())
}
