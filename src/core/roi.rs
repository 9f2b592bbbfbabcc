//! Region-of-interest resolution.
//!
//! Converts a user request (nothing, a pixel box or a geographic box) into an
//! inclusive pixel rectangle at the finest level, clamped to the raster and
//! snapped inward so both sides are exact multiples of the coarsest scale.
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::raster::GeoReference;
use crate::error::{Error, Result};

/// Region requested by the caller. Corner order is free.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoiRequest {
    /// Whole raster
    #[default]
    Full,
    /// Pixel corners at the finest level
    Pixels { x1: i64, y1: i64, x2: i64, y2: i64 },
    /// WGS84 corners
    LonLat {
        lon1: f64,
        lat1: f64,
        lon2: f64,
        lat2: f64,
    },
}

impl RoiRequest {
    /// Parse `"x1,y1,x2,y2"` as a pixel box.
    pub fn parse_pixels(s: &str) -> Result<Self> {
        let v = parse_four::<i64>(s)?;
        Ok(RoiRequest::Pixels {
            x1: v[0],
            y1: v[1],
            x2: v[2],
            y2: v[3],
        })
    }

    /// Parse `"lon1,lat1,lon2,lat2"` as a geographic box.
    pub fn parse_lonlat(s: &str) -> Result<Self> {
        let v = parse_four::<f64>(s)?;
        Ok(RoiRequest::LonLat {
            lon1: v[0],
            lat1: v[1],
            lon2: v[2],
            lat2: v[3],
        })
    }
}

fn parse_four<T: std::str::FromStr>(s: &str) -> Result<[T; 4]> {
    let parts: Vec<T> = s
        .split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::InvalidRoi(format!("cannot parse ROI `{}`", s)))?;
    <[T; 4]>::try_from(parts)
        .map_err(|_| Error::InvalidRoi(format!("ROI `{}` must have exactly 4 values", s)))
}

/// Inclusive pixel rectangle at the finest level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub xmin: usize,
    pub ymin: usize,
    pub xmax: usize,
    pub ymax: usize,
}

impl Roi {
    pub fn width(&self) -> usize {
        self.xmax - self.xmin + 1
    }

    pub fn height(&self) -> usize {
        self.ymax - self.ymin + 1
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Read window `(xoff, yoff, width, height)` of a level whose scale
    /// relative to the finest level is `scale`.
    pub fn window(&self, scale: usize) -> (usize, usize, usize, usize) {
        (
            self.xmin / scale,
            self.ymin / scale,
            self.width() / scale,
            self.height() / scale,
        )
    }
}

/// Pixel corners `[x1, y1, x2, y2]` for a box given in the raster's own CRS.
pub fn projected_to_pixel_corners(georef: &GeoReference, corners: [f64; 4]) -> Result<[i64; 4]> {
    let (px1, py1) = georef.geo_to_pixel(corners[0], corners[1])?;
    let (px2, py2) = georef.geo_to_pixel(corners[2], corners[3])?;
    debug!(
        "projected corners ({:.2}, {:.2}) ({:.2}, {:.2}) -> pixels ({:.1}, {:.1}) ({:.1}, {:.1})",
        corners[0], corners[1], corners[2], corners[3], px1, py1, px2, py2
    );
    Ok([
        px1.floor() as i64,
        py1.floor() as i64,
        px2.floor() as i64,
        py2.floor() as i64,
    ])
}

/// Clamp and snap pixel corners into an ROI.
///
/// `size` is the finest-level `(width, height)`, `snap` the coarsest scale.
/// `None` selects the whole raster.
pub fn resolve_pixel_roi(corners: Option<[i64; 4]>, size: (usize, usize), snap: usize) -> Result<Roi> {
    let (width, height) = size;
    if width == 0 || height == 0 {
        return Err(Error::EmptyRegion("raster has no pixels".into()));
    }
    if snap == 0 {
        return Err(Error::config("ROI snapping factor must be positive"));
    }
    let (w, h) = (width as i64, height as i64);

    let (xmin, ymin, xmax, ymax) = match corners {
        None => (0, 0, w - 1, h - 1),
        Some([x1, y1, x2, y2]) => {
            let off_x = (x1 < 0 && x2 < 0) || (x1 >= w && x2 >= w);
            let off_y = (y1 < 0 && y2 < 0) || (y1 >= h && y2 >= h);
            if off_x || off_y {
                return Err(Error::EmptyRegion(format!(
                    "ROI [{}, {}, {}, {}] lies outside the {}x{} raster",
                    x1, y1, x2, y2, width, height
                )));
            }
            (
                x1.min(x2).min(w - 1).max(0),
                y1.min(y2).min(h - 1).max(0),
                x1.max(x2).max(0).min(w - 1),
                y1.max(y2).max(0).min(h - 1),
            )
        }
    };

    let m = snap as i64;
    let xmin = (xmin / m) * m;
    let ymin = (ymin / m) * m;
    let xmax = ((xmax + 1) / m) * m - 1;
    let ymax = ((ymax + 1) / m) * m - 1;

    if xmax < xmin || ymax < ymin {
        return Err(Error::InvalidRoi(format!(
            "region collapses after snapping to multiples of {}: x=[{}, {}], y=[{}, {}]",
            snap, xmin, xmax, ymin, ymax
        )));
    }

    let roi = Roi {
        xmin: xmin as usize,
        ymin: ymin as usize,
        xmax: xmax as usize,
        ymax: ymax as usize,
    };
    info!(
        "Selected pixel region: xmin={}, ymin={}, xmax={}, ymax={} ({}x{})",
        roi.xmin,
        roi.ymin,
        roi.xmax,
        roi.ymax,
        roi.width(),
        roi.height()
    );
    Ok(roi)
}
