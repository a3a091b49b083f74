use crate::data::sample::Example;
use crate::error::{Error, Result};

/// Indexed collection of segmentation examples.
///
/// Implementations may decode lazily; `get` is the only place data is
/// materialized.
pub trait SegmentationDataset {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Example>;
}

/// Dataset held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    examples: Vec<Example>,
}

impl InMemoryDataset {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }
}

impl SegmentationDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.examples.len()
    }

    fn get(&self, index: usize) -> Result<Example> {
        self.examples
            .get(index)
            .cloned()
            .ok_or_else(|| Error::dataset(format!("index {} out of range ({} examples)", index, self.examples.len())))
    }
}

/// Index view over a borrowed dataset. No example data is copied.
pub struct Subset<'a> {
    dataset: &'a dyn SegmentationDataset,
    indices: Vec<usize>,
}

impl<'a> Subset<'a> {
    pub fn new(dataset: &'a dyn SegmentationDataset, indices: Vec<usize>) -> Self {
        Self { dataset, indices }
    }

    /// View over every example, in dataset order.
    pub fn full(dataset: &'a dyn SegmentationDataset) -> Self {
        let indices = (0..dataset.len()).collect();
        Self { dataset, indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Example at `position` within the subset.
    pub fn get(&self, position: usize) -> Result<Example> {
        let index = *self
            .indices
            .get(position)
            .ok_or_else(|| Error::dataset(format!("subset position {} out of range", position)))?;
        self.dataset.get(index)
    }

    /// Loads the examples at the given subset positions.
    pub fn load(&self, positions: &[usize]) -> Result<Vec<Example>> {
        positions.iter().map(|&p| self.get(p)).collect()
    }
}
