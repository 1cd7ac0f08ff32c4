use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{arr1, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ecal_showers::batch::DataLoader;
use ecal_showers::data::loader::{
    load_deposits, load_energies, load_noise, write_deposits_parquet, write_energies_parquet,
    write_noise_parquet, DepositTable, EnergyTable,
};
use ecal_showers::data::model::{
    NoiseTable, ShowerRecord, Voxel, GRID_LEN, GRID_SHAPE, GRID_X, GRID_Z,
};
use ecal_showers::{DatasetConfig, DatasetError, Pipeline, ShowerDataset, Target, TargetKind};

fn two_sample_tables() -> (DepositTable, EnergyTable) {
    let deposits = DepositTable::from([
        (
            "s0".to_string(),
            ShowerRecord::new(vec![
                (Voxel::new(1, 2, 3), 1.5),
                (Voxel::new(1, 2, 3), 0.5),
                (Voxel::new(0, 109, 10), 2.0),
            ]),
        ),
        (
            "s1".to_string(),
            ShowerRecord::new(vec![(Voxel::new(20, 0, 0), 4.0)]),
        ),
    ]);
    let energies = EnergyTable::from([
        ("s0".to_string(), vec![2.5, 12.0]),
        ("s1".to_string(), vec![1.0, 13.0, 0.5, 7.0]),
    ]);
    (deposits, energies)
}

fn write_fixture(dir: &Path) -> DatasetConfig {
    let (deposits, energies) = two_sample_tables();
    write_deposits_parquet(&dir.join("edep.parquet"), &deposits).unwrap();
    write_energies_parquet(&dir.join("energies.parquet"), &energies).unwrap();
    std::fs::write(dir.join("num_classes.txt"), "4").unwrap();

    let mut cfg = DatasetConfig::new(dir.join("edep.parquet"), dir.join("energies.parquet"));
    cfg.num_classes_file = Some(dir.join("num_classes.txt"));
    cfg
}

#[test]
fn end_to_end_two_samples() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_fixture(dir.path());
    let ds = ShowerDataset::from_config(&cfg).unwrap();

    assert_eq!(ds.len(), 2);
    assert_eq!(ds.num_classes(), 4);
    assert_eq!(ds.edges().edges(), &[1.0, 4.0, 7.0, 10.0, 13.0]);

    let s0 = ds.sample(0).unwrap();
    let mut expected = Array3::<f32>::zeros(GRID_SHAPE);
    expected[[2, 3, 1]] = 2.0;
    expected[[109, 10, 0]] = 2.0;
    assert_eq!(s0.tensor, expected);
    assert_eq!(s0.target, Target::Bins(arr1(&[1.0, 0.0, 0.0, 1.0])));
    assert_eq!(s0.shower_count, 2);
    assert_eq!(s0.index, 0);

    let s1 = ds.sample(1).unwrap();
    let mut expected = Array3::<f32>::zeros(GRID_SHAPE);
    expected[[0, 0, 20]] = 4.0;
    assert_eq!(s1.tensor, expected);
    // 13.0 and 0.5 fall outside [1, 13) and are dropped.
    assert_eq!(s1.target, Target::Bins(arr1(&[1.0, 0.0, 1.0, 0.0])));
    assert_eq!(s1.shower_count, 4);

    let proj = s1.projection();
    assert_eq!(proj.dim(), (GRID_X, GRID_Z));
    assert_eq!(proj[[0, 20]], 4.0);
}

#[test]
fn mismatched_tables_fail_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_fixture(dir.path());
    let mut energies = EnergyTable::from([("s0".to_string(), vec![2.0])]);
    energies.insert("other".to_string(), vec![]);
    write_energies_parquet(&cfg.energy_file, &energies).unwrap();

    let err = ShowerDataset::from_config(&cfg).unwrap_err();
    assert!(matches!(err, DatasetError::KeyMismatch { .. }));
}

#[test]
fn filter_and_missing_class_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = write_fixture(dir.path());

    cfg.min_shower_num = 2;
    cfg.max_shower_num = 3;
    let ds = ShowerDataset::from_config(&cfg).unwrap();
    assert_eq!(ds.keys().collect::<Vec<_>>(), ["s0"]);

    cfg.min_shower_num = 5;
    cfg.max_shower_num = 9;
    assert!(matches!(
        ShowerDataset::from_config(&cfg),
        Err(DatasetError::EmptyAfterFiltering { min: 5, max: 9 })
    ));

    cfg.min_shower_num = 0;
    cfg.max_shower_num = 10_000;
    cfg.num_classes_file = Some(dir.path().join("missing.txt"));
    assert!(matches!(
        ShowerDataset::from_config(&cfg),
        Err(DatasetError::Config { .. })
    ));
}

#[test]
fn parquet_tables_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (deposits, energies) = two_sample_tables();
    let dep_path = dir.path().join("edep.parquet");
    let en_path = dir.path().join("energies.parquet");
    write_deposits_parquet(&dep_path, &deposits).unwrap();
    write_energies_parquet(&en_path, &energies).unwrap();

    assert_eq!(load_deposits(&dep_path).unwrap(), deposits);
    assert_eq!(load_energies(&en_path).unwrap(), energies);

    let mut grid = vec![0.0f32; GRID_LEN];
    grid[17] = 0.25;
    let noise = NoiseTable::from([("3".to_string(), grid)]);
    let noise_path = dir.path().join("noise.parquet");
    write_noise_parquet(&noise_path, &noise).unwrap();
    assert_eq!(load_noise(&noise_path).unwrap(), noise);

    let bad = NoiseTable::from([("4".to_string(), vec![1.0f32; 3])]);
    write_noise_parquet(&noise_path, &bad).unwrap();
    let mut cfg = DatasetConfig::new(&dep_path, &en_path);
    cfg.num_classes = Some(4);
    cfg.noise_file = Some(noise_path);
    cfg.augment.noise = true;
    cfg.augment.noise_keys = 4..=4;
    assert!(matches!(
        Pipeline::from_config(&cfg),
        Err(DatasetError::InvalidNoiseShape { len: 3, .. })
    ));
}

#[test]
fn pipeline_batches_with_superposition() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = write_fixture(dir.path());
    cfg.target = TargetKind::ShowerCount;
    cfg.augment.superimpose = 1;
    cfg.loader.batch_size = 2;
    cfg.loader.shuffle = false;

    let pipeline = Pipeline::from_config(&cfg).unwrap();
    let loader = DataLoader::new(&pipeline, &cfg.loader, cfg.seed).unwrap();
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let batches: Vec<_> = loader
        .iter_epoch(&mut rng)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];

    // Each sample picks up the only other one: 2 + 4 showers either way.
    assert_eq!(batch.shower_counts, vec![6, 6]);
    assert_eq!(batch.targets, vec![Target::Count(6), Target::Count(6)]);
    let totals: Vec<f32> = (0..2)
        .map(|i| batch.projections.index_axis(ndarray::Axis(0), i).sum())
        .collect();
    assert_eq!(totals, vec![8.0, 8.0]);
}

#[test]
fn json_and_csv_inputs_agree() {
    let dir = tempfile::tempdir().unwrap();
    let json_dep = dir.path().join("edep.json");
    let json_en = dir.path().join("en.json");
    let csv_dep = dir.path().join("edep.csv");
    let csv_en = dir.path().join("en.csv");

    std::fs::write(&json_dep, r#"{"a": [[3, 4, 5, 1.25]], "b": [[0, 0, 0, 2.0]]}"#).unwrap();
    std::fs::write(&json_en, r#"{"a": [3.0], "b": []}"#).unwrap();
    std::fs::write(&csv_dep, "key,z,x,y,energy\na,3,4,5,1.25\nb,0,0,0,2.0\n").unwrap();
    std::fs::write(&csv_en, "key,energies\na,3.0\nb,\n").unwrap();

    let build = |dep: &Path, en: &Path| {
        let mut cfg = DatasetConfig::new(dep, en);
        cfg.num_classes = Some(2);
        ShowerDataset::from_config(&cfg).unwrap()
    };
    let from_json = build(&json_dep, &json_en);
    let from_csv = build(&csv_dep, &csv_en);

    for i in 0..2 {
        let a = from_json.sample(i).unwrap();
        let b = from_csv.sample(i).unwrap();
        assert_eq!(a.tensor, b.tensor);
        assert_eq!(a.target, b.target);
        assert_eq!(a.shower_count, b.shower_count);
    }
    assert_eq!(from_csv.sample(1).unwrap().shower_count, 0);

    let hist = from_json.shower_histogram();
    assert_eq!(hist, BTreeMap::from([(0, 1), (1, 1)]));
}
