//! Batched access to persisted training samples.
//!
//! A `SampleSequence` is a finite, restartable sequence of batches. Batches
//! are addressed by index within a pass; `end_pass` starts the next pass with
//! a fresh permutation when shuffling is on.
use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array3, Array4, ArrayView3, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::samples::{SampleRef, discover_samples};

/// One batch: inputs keyed by resolution identifier, each `(N, C, h, w)`,
/// and labels `(N, C, h, w)`.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub inputs: BTreeMap<String, Array4<f32>>,
    pub label: Array4<f32>,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.label.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SampleSequence {
    samples: Vec<SampleRef>,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    rng: StdRng,
    pass: usize,
}

impl SampleSequence {
    /// `batch_size` is capped at the number of samples.
    pub fn new(samples: Vec<SampleRef>, batch_size: usize, shuffle: bool, seed: Option<u64>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::config("no training samples to iterate over"));
        }
        if batch_size == 0 {
            return Err(Error::config("batch size must be positive"));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut seq = Self {
            batch_size: batch_size.min(samples.len()),
            order: (0..samples.len()).collect(),
            samples,
            shuffle,
            rng,
            pass: 0,
        };
        if seq.shuffle {
            seq.order.shuffle(&mut seq.rng);
        }
        Ok(seq)
    }

    /// Sequence over every sample persisted under `root`.
    pub fn from_dir(root: &Path, batch_size: usize, shuffle: bool, seed: Option<u64>) -> Result<Self> {
        Self::new(discover_samples(root)?, batch_size, shuffle, seed)
    }

    /// Batches per pass (the last one may be short).
    pub fn len(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn samples(&self) -> &[SampleRef] {
        &self.samples
    }

    /// Sample indices in the order of the current pass.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn pass(&self) -> usize {
        self.pass
    }

    /// Load batch `idx` of the current pass.
    pub fn get(&self, idx: usize) -> Result<SampleBatch> {
        if idx >= self.len() {
            return Err(Error::config(format!(
                "batch {} out of range, the sequence has {} batches",
                idx,
                self.len()
            )));
        }
        let start = idx * self.batch_size;
        let end = (start + self.batch_size).min(self.order.len());

        let mut inputs: BTreeMap<String, Vec<Array3<f32>>> = BTreeMap::new();
        let mut labels = Vec::with_capacity(end - start);
        for &i in &self.order[start..end] {
            let sample = self.samples[i].load()?;
            for (res, data) in sample.inputs {
                inputs.entry(res.id()).or_default().push(data);
            }
            labels.push(sample.label);
        }

        let inputs = inputs
            .into_iter()
            .map(|(key, arrays)| Ok((key, stack(&arrays)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(SampleBatch {
            inputs,
            label: stack(&labels)?,
        })
    }

    /// Finish the current pass; the next one gets a new permutation when
    /// shuffling.
    pub fn end_pass(&mut self) {
        self.pass += 1;
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        debug!("Starting pass {} over {} samples", self.pass, self.samples.len());
    }

    /// Every batch of the current pass, in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<SampleBatch>> + '_ {
        (0..self.len()).map(move |idx| self.get(idx))
    }
}

fn stack(arrays: &[Array3<f32>]) -> Result<Array4<f32>> {
    let views: Vec<ArrayView3<'_, f32>> = arrays.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| Error::Processing(format!("cannot batch samples of different shapes: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::sampling::{SampleSink, TrainingSample};
    use crate::io::samples::{SampleStore, TileManifest};
    use crate::types::{Resolution, SatelliteKind};

    fn persist(root: &Path, tile: &str, count: usize) {
        let mut store = SampleStore::create(root, tile).unwrap();
        for i in 0..count {
            let v = i as f32;
            let mut inputs = BTreeMap::new();
            inputs.insert(Resolution(10), Array3::from_elem((2, 4, 4), v));
            inputs.insert(Resolution(20), Array3::from_elem((1, 4, 4), v));
            let sample = TrainingSample {
                inputs,
                label: Array3::from_elem((1, 4, 4), v),
                label_resolution: Resolution(20),
            };
            store.persist(i, &sample).unwrap();
        }
        store
            .finish(&TileManifest {
                tile: tile.into(),
                satellite: SatelliteKind::Sentinel2,
                levels: vec![Resolution(10), Resolution(20)],
                label_resolution: Resolution(20),
                samples: count,
                lr_patch_size: 2,
                created: "2026-01-01T00:00:00Z".into(),
            })
            .unwrap();
    }

    #[test]
    fn batches_cover_every_sample_once_per_pass() {
        let dir = tempfile::tempdir().unwrap();
        persist(dir.path(), "A", 3);
        persist(dir.path(), "B", 4);
        let seq = SampleSequence::from_dir(dir.path(), 3, false, None).unwrap();
        assert_eq!(seq.len(), 3);

        let mut seen = 0;
        for batch in seq.iter() {
            let batch = batch.unwrap();
            assert_eq!(batch.inputs["10"].shape()[1..], [2, 4, 4]);
            assert_eq!(batch.inputs["20"].shape()[0], batch.len());
            seen += batch.len();
        }
        assert_eq!(seen, 7);
        assert!(seq.get(3).is_err());
    }

    #[test]
    fn batch_size_is_capped_and_passes_reshuffle() {
        let dir = tempfile::tempdir().unwrap();
        persist(dir.path(), "A", 20);
        let mut seq = SampleSequence::from_dir(dir.path(), 64, true, Some(3)).unwrap();
        assert_eq!(seq.batch_size(), 20);
        assert_eq!(seq.len(), 1);

        let first = seq.order().to_vec();
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());

        seq.end_pass();
        assert_eq!(seq.pass(), 1);
        assert_ne!(seq.order(), first.as_slice());
    }

    #[test]
    fn empty_store_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SampleSequence::from_dir(dir.path(), 8, true, None).is_err());
    }
}
