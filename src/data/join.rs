use std::collections::BTreeMap;

use log::debug;

use super::model::{EnergyList, SampleKey, ShowerEntry, ShowerRecord, ShowerTables};
use crate::error::{DatasetError, Result};

/// Join deposit records and energy lists by sample key.
///
/// Both tables must hold exactly the same keys. The result is ordered by key,
/// which fixes the index → key mapping used for retrieval.
pub fn join_tables(
    mut deposits: BTreeMap<SampleKey, ShowerRecord>,
    energies: BTreeMap<SampleKey, EnergyList>,
) -> Result<ShowerTables> {
    let deposit_only: Vec<&SampleKey> = deposits
        .keys()
        .filter(|k| !energies.contains_key(*k))
        .collect();
    let energy_only: Vec<&SampleKey> = energies
        .keys()
        .filter(|k| !deposits.contains_key(*k))
        .collect();

    if !deposit_only.is_empty() || !energy_only.is_empty() {
        return Err(DatasetError::KeyMismatch {
            deposit_only: deposit_only.len(),
            energy_only: energy_only.len(),
            deposit_example: deposit_only.first().map(|k| k.to_string()),
            energy_example: energy_only.first().map(|k| k.to_string()),
        });
    }

    let tables: ShowerTables = energies
        .into_iter()
        .map(|(key, energies)| {
            let record = deposits.remove(&key).unwrap_or_default();
            (key, ShowerEntry { record, energies })
        })
        .collect();

    debug!("joined {} samples by key", tables.len());
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Voxel;

    fn record(e: f64) -> ShowerRecord {
        ShowerRecord::new(vec![(Voxel::new(0, 0, 0), e)])
    }

    #[test]
    fn joins_by_key_not_by_position() {
        let deposits = BTreeMap::from([("b".to_string(), record(2.0)), ("a".to_string(), record(1.0))]);
        let energies = BTreeMap::from([
            ("a".to_string(), vec![1.0]),
            ("b".to_string(), vec![2.0, 3.0]),
        ]);
        let tables = join_tables(deposits, energies).unwrap();

        let keys: Vec<&String> = tables.keys().collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(tables["a"].record, record(1.0));
        assert_eq!(tables["b"].shower_count(), 2);
    }

    #[test]
    fn mismatched_keys_fail_fast() {
        let deposits = BTreeMap::from([("a".to_string(), record(1.0)), ("c".to_string(), record(1.0))]);
        let energies = BTreeMap::from([("a".to_string(), vec![1.0]), ("b".to_string(), vec![])]);
        let err = join_tables(deposits, energies).unwrap_err();
        match err {
            DatasetError::KeyMismatch {
                deposit_only,
                energy_only,
                deposit_example,
                energy_example,
            } => {
                assert_eq!(deposit_only, 1);
                assert_eq!(energy_only, 1);
                assert_eq!(deposit_example.as_deref(), Some("c"));
                assert_eq!(energy_example.as_deref(), Some("b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
