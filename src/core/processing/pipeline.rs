//! End-to-end super-resolution of one in-memory raster.
//!
//! For every target level: keep the levels not coarser than the target, cut
//! them into aligned patches, hand the bundle to the predictor, stitch the
//! predictions back at the finest grid and restore no-data pixels. The output
//! band list optionally starts with the original finest bands.
use std::collections::BTreeMap;

use ndarray::{Array2, Array3, Array4, Axis};
use tracing::{debug, info};

use crate::core::processing::fill_mask::FillMask;
use crate::core::processing::recompose::recompose;
use crate::core::processing::tiling::{PatchGeometry, extract_patches};
use crate::core::raster::Raster;
use crate::core::resolution::ResolutionModel;
use crate::error::{Error, Result};
use crate::types::Resolution;

/// Opaque model mapping a per-level patch bundle to patches at the finest grid.
///
/// `inputs` is keyed by resolution identifier (`"10"`, `"20"`, ...), every
/// entry `(N, C_level, p, p)` with the same `p`. The returned array must be
/// `(N, C_target, p, p)`.
pub trait Predictor {
    fn predict(
        &self,
        target: Resolution,
        inputs: &BTreeMap<String, Array4<f32>>,
    ) -> Result<Array4<f32>>;
}

impl<F> Predictor for F
where
    F: Fn(Resolution, &BTreeMap<String, Array4<f32>>) -> Result<Array4<f32>>,
{
    fn predict(
        &self,
        target: Resolution,
        inputs: &BTreeMap<String, Array4<f32>>,
    ) -> Result<Array4<f32>> {
        self(target, inputs)
    }
}

/// Interpolation baseline: returns the bilinearly upsampled input of the
/// target level unchanged. Useful as a reference and for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearBaseline;

impl Predictor for BilinearBaseline {
    fn predict(
        &self,
        target: Resolution,
        inputs: &BTreeMap<String, Array4<f32>>,
    ) -> Result<Array4<f32>> {
        inputs
            .get(&target.id())
            .cloned()
            .ok_or_else(|| Error::Predictor(format!("no {}m input in the patch bundle", target)))
    }
}

/// One band of the assembled output.
#[derive(Debug, Clone)]
pub struct OutputBand {
    /// Short name, e.g. `B4` or `SRB5`
    pub name: String,
    pub description: String,
    pub data: Array2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperResolveOptions {
    /// Put the original finest bands in front of the super-resolved ones
    pub copy_original_bands: bool,
}

impl Default for SuperResolveOptions {
    fn default() -> Self {
        Self {
            copy_original_bands: true,
        }
    }
}

/// Super-resolve a single `target` level to the finest grid.
///
/// Returns `(height, width, C_target)` in physical units with no-data pixels
/// restored.
pub fn super_resolve_level<P: Predictor + ?Sized>(
    raster: &Raster,
    model: &ResolutionModel,
    target: Resolution,
    predictor: &P,
    mask: &FillMask,
) -> Result<Array3<f32>> {
    let sub = raster.restricted(target)?;
    let scales = sub.scales();
    if scales.coarsest() != target {
        return Err(Error::config(format!(
            "raster has no {}m level to super-resolve",
            target
        )));
    }
    let finest = scales.finest();
    let (height, width) = sub.size();

    let mut patch_size = model.patch_size(target);
    let min_side = height.min(width);
    if patch_size > min_side {
        info!(
            "Patch size {} exceeds the {}x{} image, using {}",
            patch_size, height, width, min_side
        );
        patch_size = min_side;
    }
    let geometry = PatchGeometry::new(scales, patch_size, model.border(target))?;
    let pixels = model.pixels();

    info!("Super resolving {}m ...", target);
    let batch = extract_patches(&sub, &geometry, pixels.norm, true)?;
    let inputs = batch.predictor_inputs();
    let prediction = predictor.predict(target, &inputs)?;

    let bands = model.bands(target)?.len();
    let edge = geometry.patch_size(finest);
    let expected = (batch.len(), bands, edge, edge);
    if prediction.dim() != expected {
        return Err(Error::Predictor(format!(
            "prediction for {}m has shape {:?}, expected {:?}",
            target,
            prediction.dim(),
            expected
        )));
    }

    let mut out = recompose(
        prediction.view(),
        &batch.grid,
        &geometry,
        finest,
        batch.image_size,
        pixels,
    )?;
    mask.restore_super_resolved(&mut out);
    debug!("Super-resolved {}m into {:?}", target, out.dim());
    Ok(out)
}

/// Super-resolve every level up to `max_res` and assemble the output bands.
pub fn super_resolve<P: Predictor + ?Sized>(
    raster: &Raster,
    model: &ResolutionModel,
    max_res: Resolution,
    predictor: &P,
    options: SuperResolveOptions,
) -> Result<Vec<OutputBand>> {
    let targets = model.target_levels(max_res)?;
    let active = model.active_levels(max_res)?;
    let raster = raster.restricted(max_res)?;
    if raster.resolutions() != active {
        return Err(Error::config(format!(
            "raster levels {:?} do not match the expected levels {:?}",
            raster.resolutions(),
            active
        )));
    }
    for (res, data) in raster.levels() {
        let expected = model.bands(*res)?;
        if data.len_of(Axis(2)) != expected.len() {
            return Err(Error::MissingBand {
                resolution: *res,
                expected: expected.to_vec(),
                found: (0..data.len_of(Axis(2)))
                    .map(|i| format!("band #{}", i + 1))
                    .collect(),
            });
        }
    }

    let pixels = model.pixels();
    if raster.is_empty(pixels.fill_val) {
        return Err(Error::EmptyRegion("the image holds no data".into()));
    }
    let mask = FillMask::record(&raster, pixels.fill_val);

    let mut output = Vec::new();
    let finest = raster.finest();
    if options.copy_original_bands {
        let mut original = raster
            .level(finest)
            .cloned()
            .ok_or_else(|| Error::Processing(format!("raster has no {}m level", finest)))?;
        mask.restore_level(finest, &mut original)?;
        for (i, name) in model.bands(finest)?.iter().enumerate() {
            output.push(OutputBand {
                name: name.clone(),
                description: model.band_description(name),
                data: original.index_axis(Axis(2), i).to_owned(),
            });
        }
    }

    for target in targets {
        let sr = super_resolve_level(&raster, model, target, predictor, &mask)?;
        for (i, name) in model.bands(target)?.iter().enumerate() {
            output.push(OutputBand {
                name: format!("SR{}", name),
                description: format!("SR{}", model.band_description(name)),
                data: sr.index_axis(Axis(2), i).to_owned(),
            });
        }
    }

    info!(
        "Assembled {} output bands: {:?}",
        output.len(),
        output.iter().map(|b| b.name.as_str()).collect::<Vec<_>>()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoReference;
    use crate::core::resolution::{BandSet, PixelSemantics};

    fn model() -> ResolutionModel {
        ResolutionModel::new(
            vec![BandSet::new(10, &["B4", "B8"]), BandSet::new(20, &["B5"])],
            PixelSemantics::default(),
        )
        .unwrap()
        .with_descriptions(&[("B5", "B5 (705 nm)")])
        .with_patch_geometry(&[(20, 16, 2)])
    }

    fn raster() -> Raster {
        let mut levels = BTreeMap::new();
        levels.insert(
            Resolution(10),
            Array3::from_shape_fn((30, 30, 2), |(r, c, b)| (100 + r + c + b) as f32),
        );
        levels.insert(Resolution(20), Array3::from_elem((15, 15, 1), 700.0));
        Raster::new(levels, GeoReference::default()).unwrap()
    }

    #[test]
    fn output_band_layout() {
        let out = super_resolve(
            &raster(),
            &model(),
            Resolution(20),
            &BilinearBaseline,
            SuperResolveOptions::default(),
        )
        .unwrap();
        let names: Vec<&str> = out.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["B4", "B8", "SRB5"]);
        assert_eq!(out[2].description, "SRB5 (705 nm)");
        assert!(out.iter().all(|b| b.data.dim() == (30, 30)));
        for &v in out[2].data.iter() {
            assert!((v - 700.0).abs() < 0.1);
        }
    }

    #[test]
    fn originals_can_be_left_out() {
        let out = super_resolve(
            &raster(),
            &model(),
            Resolution(20),
            &BilinearBaseline,
            SuperResolveOptions {
                copy_original_bands: false,
            },
        )
        .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn bad_prediction_shape_is_predictor_error() {
        let wrong = |_: Resolution, inputs: &BTreeMap<String, Array4<f32>>| -> Result<Array4<f32>> {
            let n = inputs["10"].len_of(Axis(0));
            Ok(Array4::zeros((n, 3, 4, 4)))
        };
        let err = super_resolve(
            &raster(),
            &model(),
            Resolution(20),
            &wrong,
            SuperResolveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Predictor(_)));
    }

    #[test]
    fn empty_image_is_rejected() {
        let mut levels = BTreeMap::new();
        levels.insert(Resolution(10), Array3::zeros((30, 30, 2)));
        levels.insert(Resolution(20), Array3::from_elem((15, 15, 1), 5.0));
        let raster = Raster::new(levels, GeoReference::default()).unwrap();
        let err = super_resolve(
            &raster,
            &model(),
            Resolution(20),
            &BilinearBaseline,
            SuperResolveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyRegion(_)));
    }

    #[test]
    fn finest_level_is_not_a_target() {
        let err = super_resolve(
            &raster(),
            &model(),
            Resolution(10),
            &BilinearBaseline,
            SuperResolveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
