/// Data layer: core types, loading, joining, filtering and tensors.
///
/// Architecture:
/// ```text
///  deposits (.parquet / .json / .csv)    energies (.parquet / .json / .csv)
///        │                                   │
///        ▼                                   ▼
///   ┌──────────┐                        ┌──────────┐
///   │  loader   │  parse → BTreeMap     │  loader   │
///   └──────────┘                        └──────────┘
///        └───────────────┬───────────────────┘
///                        ▼
///                  ┌──────────┐
///                  │   join    │  key-set check → ShowerTables
///                  └──────────┘
///                        │
///                        ▼
///                  ┌──────────┐
///                  │  filter   │  shower count in [min, max)
///                  └──────────┘
///                        │
///                        ▼
///                  ┌──────────┐
///                  │  tensor   │  scatter (z, x, y) → grid[x, y, z]
///                  └──────────┘
/// ```

pub mod filter;
pub mod join;
pub mod loader;
pub mod model;
pub mod tensor;
