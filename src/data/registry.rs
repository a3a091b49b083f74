use std::path::Path;

use crate::data::dataset::SegmentationDataset;
use crate::data::folder::FolderDataset;
use crate::data::synthetic::SyntheticDataset;
use crate::error::{Error, Result};

/// Dataset identifiers accepted in `RunConfig::dataset`.
pub const KNOWN_DATASETS: [&str; 2] = ["synthetic", "folder"];

const SYNTHETIC_TRAIN_LEN: usize = 400;
const SYNTHETIC_TEST_LEN: usize = 120;

/// Training and held-out splits of one dataset.
pub struct DatasetSplits {
    pub train: Box<dyn SegmentationDataset>,
    pub test: Box<dyn SegmentationDataset>,
}

/// Fails with `Error::Config` for identifiers not in `KNOWN_DATASETS`.
pub fn check_identifier(id: &str) -> Result<()> {
    if KNOWN_DATASETS.contains(&id) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "unknown dataset '{}' (expected one of: {})",
            id,
            KNOWN_DATASETS.join(", ")
        )))
    }
}

/// Opens both splits of the dataset named `id`.
///
/// `folder` expects `<data_path>/train` and `<data_path>/test`, each laid out
/// as described in [`crate::data::folder`].
pub fn open_splits(id: &str, data_path: Option<&Path>, image_size: usize, seed: u64) -> Result<DatasetSplits> {
    check_identifier(id)?;
    match id {
        "synthetic" => Ok(DatasetSplits {
            train: Box::new(SyntheticDataset::new(SYNTHETIC_TRAIN_LEN, image_size, seed)),
            test: Box::new(SyntheticDataset::new(SYNTHETIC_TEST_LEN, image_size, seed.wrapping_add(1))),
        }),
        _ => {
            let root = data_path.ok_or_else(|| Error::config("dataset 'folder' requires data_path"))?;
            let size = image_size as u32;
            Ok(DatasetSplits {
                train: Box::new(FolderDataset::open(&root.join("train"), size)?),
                test: Box::new(FolderDataset::open(&root.join("test"), size)?),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identifier_is_a_config_error() {
        assert!(matches!(check_identifier("REFUGE2"), Err(Error::Config(_))));
        assert!(matches!(open_splits("nope", None, 8, 0), Err(Error::Config(_))));
    }

    #[test]
    fn synthetic_splits_are_independent() {
        let splits = open_splits("synthetic", None, 8, 5).unwrap();
        assert_eq!(splits.train.len(), SYNTHETIC_TRAIN_LEN);
        assert_eq!(splits.test.len(), SYNTHETIC_TEST_LEN);
        assert_ne!(splits.train.get(0).unwrap().image, splits.test.get(0).unwrap().image);
    }

    #[test]
    fn folder_without_path_is_a_config_error() {
        assert!(matches!(open_splits("folder", None, 8, 0), Err(Error::Config(_))));
    }
}
