//! On-disk layout of training samples.
//!
//! One directory per source tile holding `input{res}_{i}.npy` for every level,
//! `label{res}_{i}.npy` for the label level and a `manifest.json` describing
//! what was written.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Ix3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::processing::sampling::{SampleSink, TrainingSample};
use crate::error::{Error, Result};
use crate::io::npy::{read_npy, write_npy};
use crate::types::{Resolution, SatelliteKind};

pub const MANIFEST_FILE: &str = "manifest.json";

pub fn input_file_name(res: Resolution, index: usize) -> String {
    format!("input{}_{}.npy", res, index)
}

pub fn label_file_name(res: Resolution, index: usize) -> String {
    format!("label{}_{}.npy", res, index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileManifest {
    pub tile: String,
    pub satellite: SatelliteKind,
    pub levels: Vec<Resolution>,
    pub label_resolution: Resolution,
    pub samples: usize,
    pub lr_patch_size: usize,
    pub created: String,
}

impl TileManifest {
    pub fn read(dir: &Path) -> Result<Self> {
        let text = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Sample directory of one tile, cleared when opened.
#[derive(Debug)]
pub struct SampleStore {
    dir: PathBuf,
    written: usize,
}

impl SampleStore {
    /// Open `root/<tile_name>`, removing whatever a previous run left there.
    pub fn create(root: &Path, tile_name: &str) -> Result<Self> {
        let dir = root.join(tile_name);
        if dir.exists() {
            debug!("Clearing previous samples in {:?}", dir);
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Write the manifest and hand back the directory.
    pub fn finish(self, manifest: &TileManifest) -> Result<PathBuf> {
        manifest.write(&self.dir)?;
        info!("Stored {} samples in {:?}", self.written, self.dir);
        Ok(self.dir)
    }

    /// Remove the directory and everything written so far.
    pub fn discard(self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl SampleSink for SampleStore {
    fn persist(&mut self, index: usize, sample: &TrainingSample) -> Result<()> {
        for (res, input) in &sample.inputs {
            write_npy(&self.dir.join(input_file_name(*res, index)), input.view())?;
        }
        write_npy(
            &self.dir.join(label_file_name(sample.label_resolution, index)),
            sample.label.view(),
        )?;
        self.written += 1;
        Ok(())
    }
}

/// Address of one persisted sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRef {
    pub dir: PathBuf,
    pub index: usize,
    pub levels: Vec<Resolution>,
    pub label_resolution: Resolution,
}

impl SampleRef {
    pub fn load(&self) -> Result<TrainingSample> {
        let mut inputs = BTreeMap::new();
        for res in &self.levels {
            let path = self.dir.join(input_file_name(*res, self.index));
            inputs.insert(*res, read_3d(&path)?);
        }
        let label = read_3d(&self.dir.join(label_file_name(self.label_resolution, self.index)))?;
        Ok(TrainingSample {
            inputs,
            label,
            label_resolution: self.label_resolution,
        })
    }
}

fn read_3d(path: &Path) -> Result<ndarray::Array3<f32>> {
    read_npy::<f32>(path)?
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::Processing(format!("{:?}: {}", path, e)))
}

/// Every sample under `root`, tile directories in name order. Directories
/// without a manifest are skipped.
pub fn discover_samples(root: &Path) -> Result<Vec<SampleRef>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut samples = Vec::new();
    for dir in dirs {
        let manifest = match TileManifest::read(&dir) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping {:?}: no readable manifest ({})", dir, e);
                continue;
            }
        };
        for index in 0..manifest.samples {
            samples.push(SampleRef {
                dir: dir.clone(),
                index,
                levels: manifest.levels.clone(),
                label_resolution: manifest.label_resolution,
            });
        }
    }
    info!("Discovered {} samples under {:?}", samples.len(), root);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn sample(v: f32) -> TrainingSample {
        let mut inputs = BTreeMap::new();
        inputs.insert(Resolution(10), Array3::from_elem((2, 4, 4), v));
        inputs.insert(Resolution(20), Array3::from_elem((1, 4, 4), v + 1.0));
        TrainingSample {
            inputs,
            label: Array3::from_elem((1, 4, 4), v + 2.0),
            label_resolution: Resolution(20),
        }
    }

    fn manifest(samples: usize) -> TileManifest {
        TileManifest {
            tile: "T1".into(),
            satellite: SatelliteKind::Sentinel2,
            levels: vec![Resolution(10), Resolution(20)],
            label_resolution: Resolution(20),
            samples,
            lr_patch_size: 2,
            created: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn file_names() {
        assert_eq!(input_file_name(Resolution(60), 3), "input60_3.npy");
        assert_eq!(label_file_name(Resolution(20), 0), "label20_0.npy");
    }

    #[test]
    fn persisted_samples_are_discovered_and_loaded() {
        let root = tempfile::tempdir().unwrap();
        let mut store = SampleStore::create(root.path(), "T1").unwrap();
        store.persist(0, &sample(1.0)).unwrap();
        store.persist(1, &sample(5.0)).unwrap();
        assert!(store.dir().join("input10_1.npy").exists());
        assert!(store.dir().join("label20_1.npy").exists());
        store.finish(&manifest(2)).unwrap();

        let refs = discover_samples(root.path()).unwrap();
        assert_eq!(refs.len(), 2);
        let loaded = refs[1].load().unwrap();
        assert_eq!(loaded.inputs[&Resolution(10)].dim(), (2, 4, 4));
        assert_eq!(loaded.inputs[&Resolution(20)][[0, 0, 0]], 6.0);
        assert_eq!(loaded.label[[0, 3, 3]], 7.0);
    }

    #[test]
    fn create_clears_previous_run() {
        let root = tempfile::tempdir().unwrap();
        let mut store = SampleStore::create(root.path(), "T1").unwrap();
        store.persist(0, &sample(1.0)).unwrap();
        let store = SampleStore::create(root.path(), "T1").unwrap();
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 0);
    }

    #[test]
    fn discarded_tile_leaves_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mut store = SampleStore::create(root.path(), "T1").unwrap();
        store.persist(0, &sample(1.0)).unwrap();
        store.discard().unwrap();
        assert!(!root.path().join("T1").exists());
        assert!(discover_samples(root.path()).unwrap().is_empty());
    }
}
