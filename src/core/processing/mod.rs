//! Array-level building blocks of the engine, leaves first: padding and
//! resizing primitives, the degradation model, tiling and recomposition,
//! no-data masks, training-patch sampling, the super-resolution pipeline and
//! output saving.
pub mod padding;
pub mod resize;

pub mod downsample;
pub mod fill_mask;
pub mod recompose;
pub mod sampling;
pub mod tiling;

pub mod pipeline;
pub mod save;
