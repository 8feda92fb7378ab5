/*!
Training data management for unlearning models.

A [`Dataset`] owns an immutable binary feature matrix and its labels, and
tracks which sample ids are still live. Removal is logical: a removed row
keeps its slot so that sample ids referenced by fitted models stay stable
across removal batches.
*/

pub mod dataset;

pub use dataset::{DataError, Dataset};
