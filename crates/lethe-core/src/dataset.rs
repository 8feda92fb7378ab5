use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Empty training dataset")]
    EmptyDataset,
    #[error("Labels length mismatch with training data")]
    LabelsMismatch,
    #[error("Non-binary feature value {value} at row {row}, column {col}")]
    NonBinaryFeature { row: usize, col: usize, value: u8 },
    #[error("Non-binary label {value} at row {row}")]
    NonBinaryLabel { row: usize, value: u8 },
    #[error("Unknown sample id {0}")]
    UnknownId(usize),
    #[error("Sample id {0} has already been removed")]
    AlreadyRemoved(usize),
}

/// Owns the training matrix and tracks which sample ids are still live.
///
/// Rows are never physically deleted; removal flips a validity bit so ids
/// stay stable across removal batches. A removed row must not enter any
/// later statistic update, which callers enforce by iterating
/// [`Dataset::valid_ids`] or checking [`Dataset::is_valid`].
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<u8>,
    y: Array1<u8>,
    valid: Vec<bool>,
    n_valid: usize,
}

impl Dataset {
    /// Creates a dataset from a binary feature matrix and binary labels.
    pub fn new(x: Array2<u8>, y: Array1<u8>) -> Result<Self, DataError> {
        if x.nrows() == 0 {
            return Err(DataError::EmptyDataset);
        }
        if y.len() != x.nrows() {
            return Err(DataError::LabelsMismatch);
        }
        for ((row, col), &value) in x.indexed_iter() {
            if value > 1 {
                return Err(DataError::NonBinaryFeature { row, col, value });
            }
        }
        for (row, &value) in y.iter().enumerate() {
            if value > 1 {
                return Err(DataError::NonBinaryLabel { row, value });
            }
        }

        let n = x.nrows();
        Ok(Self {
            x,
            y,
            valid: vec![true; n],
            n_valid: n,
        })
    }

    /// Total number of rows, removed ones included.
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Number of rows that have not been removed.
    pub fn n_valid(&self) -> usize {
        self.n_valid
    }

    pub fn is_valid(&self, id: usize) -> bool {
        id < self.valid.len() && self.valid[id]
    }

    /// Ids of all live rows, ascending.
    pub fn valid_ids(&self) -> Vec<usize> {
        self.valid
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn feature(&self, id: usize, feature: usize) -> u8 {
        self.x[[id, feature]]
    }

    pub fn label(&self, id: usize) -> u8 {
        self.y[id]
    }

    pub fn x(&self) -> ArrayView2<u8> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<u8> {
        self.y.view()
    }

    /// Returns the rows and labels for the given ids.
    ///
    /// Every id must be in range and still live.
    pub fn select(&self, ids: &[usize]) -> Result<(Array2<u8>, Array1<u8>), DataError> {
        for &id in ids {
            self.check_live(id)?;
        }
        let rows = self.x.select(Axis(0), ids);
        let labels = ids.iter().map(|&id| self.y[id]).collect();
        Ok((rows, labels))
    }

    /// Marks the given ids as removed. Either all ids are marked or none.
    ///
    /// A duplicate id within the batch counts as a double removal and
    /// fails with [`DataError::AlreadyRemoved`].
    pub fn mark_removed(&mut self, ids: &[usize]) -> Result<(), DataError> {
        for &id in ids {
            self.check_live(id)?;
        }
        let mut batch: Vec<usize> = ids.to_vec();
        batch.sort_unstable();
        for pair in batch.windows(2) {
            if pair[0] == pair[1] {
                return Err(DataError::AlreadyRemoved(pair[0]));
            }
        }

        for &id in ids {
            self.valid[id] = false;
        }
        self.n_valid -= ids.len();
        Ok(())
    }

    fn check_live(&self, id: usize) -> Result<(), DataError> {
        if id >= self.valid.len() {
            return Err(DataError::UnknownId(id));
        }
        if !self.valid[id] {
            return Err(DataError::AlreadyRemoved(id));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "dataset_test.rs"]
mod tests;
