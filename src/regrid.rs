//! Area-weighted regridding of model cells onto satellite pixel footprints.
//!
//! When satellite pixels are comparable in size to (or larger than) the model cells,
//! a single point lookup misrepresents the model. Instead each model cell that the
//! pixel footprint overlaps contributes in proportion to the overlapping area.
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::ArrayView1;

use crate::{
    error::ShapeError,
    grid::{colocate_pixels, CellBounds, CellIndex, ModelGrid},
    observations::PixelCorners,
    settings::{AreaWeighting, ColocationSettings, SpatialMethod},
};

const FULL_CIRCLE: f64 = 360.0;

/// A satellite pixel footprint as a convex polygon of `(lon, lat)` vertices.
///
/// Longitudes are unwrapped relative to the first vertex, so a pixel crossing the
/// dateline has vertices like 179.9 and 180.1 rather than 179.9 and -179.9.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFootprint {
    vertices: Vec<(f64, f64)>,
}

impl PixelFootprint {
    /// Build a footprint from corner coordinates listed in order around the pixel.
    /// Non-finite corners are dropped; returns `None` if fewer than 3 remain.
    pub fn from_corners(lat: ArrayView1<f64>, lon: ArrayView1<f64>) -> Option<Self> {
        let corners = lat
            .iter()
            .zip(lon.iter())
            .filter(|(y, x)| y.is_finite() && x.is_finite())
            .map(|(&y, &x)| (x, y))
            .collect_vec();
        if corners.len() < 3 {
            return None;
        }
        let lon0 = corners[0].0;
        let vertices = corners
            .into_iter()
            .map(|(x, y)| (lon0 + (x - lon0 + 180.0).rem_euclid(FULL_CIRCLE) - 180.0, y))
            .collect();
        Some(Self { vertices })
    }

    /// A square footprint `size` degrees on a side centered on a point.
    pub fn square(lat: f64, lon: f64, size: f64) -> Self {
        let h = 0.5 * size;
        Self {
            vertices: vec![
                (lon - h, lat - h),
                (lon + h, lat - h),
                (lon + h, lat + h),
                (lon - h, lat + h),
            ],
        }
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Mean of the vertices as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        let n = self.vertices.len() as f64;
        let (sx, sy) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        (sy / n, sx / n)
    }

    /// The larger of the latitude and longitude spans, in degrees.
    pub fn extent(&self) -> f64 {
        let (s, n, w, e) = bounding_box(&self.vertices);
        (n - s).max(e - w)
    }

    fn shifted(&self, dlon: f64) -> Vec<(f64, f64)> {
        self.vertices.iter().map(|(x, y)| (x + dlon, *y)).collect()
    }
}

/// Model cells contributing to one satellite pixel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellWeights {
    /// Cells and their weights; weights sum to 1 unless the list is empty.
    pub cells: Vec<(CellIndex, f64)>,
    /// Fraction of the pixel footprint that falls on the model grid.
    pub coverage: f64,
}

impl CellWeights {
    pub fn single(cell: CellIndex) -> Self {
        Self { cells: vec![(cell, 1.0)], coverage: 1.0 }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    West(f64),
    East(f64),
    South(f64),
    North(f64),
}

impl Boundary {
    fn inside(&self, (x, y): (f64, f64)) -> bool {
        match *self {
            Boundary::West(w) => x >= w,
            Boundary::East(e) => x <= e,
            Boundary::South(s) => y >= s,
            Boundary::North(n) => y <= n,
        }
    }

    fn intersect(&self, a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
        match *self {
            Boundary::West(v) | Boundary::East(v) => {
                let t = (v - a.0) / (b.0 - a.0);
                (v, a.1 + t * (b.1 - a.1))
            }
            Boundary::South(v) | Boundary::North(v) => {
                let t = (v - a.1) / (b.1 - a.1);
                (a.0 + t * (b.0 - a.0), v)
            }
        }
    }
}

/// Clip a polygon to a cell rectangle (Sutherland-Hodgman). The polygon must be
/// convex for the result to be exact.
pub fn clip_to_rect(polygon: &[(f64, f64)], rect: &CellBounds) -> Vec<(f64, f64)> {
    let boundaries = [
        Boundary::West(rect.west),
        Boundary::East(rect.east),
        Boundary::South(rect.south),
        Boundary::North(rect.north),
    ];

    let mut output = polygon.to_vec();
    for boundary in boundaries {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let n = input.len();
        for i in 0..n {
            let cur = input[i];
            let prev = input[(i + n - 1) % n];
            match (boundary.inside(prev), boundary.inside(cur)) {
                (true, true) => output.push(cur),
                (false, true) => {
                    output.push(boundary.intersect(prev, cur));
                    output.push(cur);
                }
                (true, false) => output.push(boundary.intersect(prev, cur)),
                (false, false) => (),
            }
        }
    }
    output
}

/// Area of a simple polygon in square degrees (shoelace formula).
pub fn polygon_area(polygon: &[(f64, f64)]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let twice_area: f64 = polygon
        .iter()
        .circular_tuple_windows()
        .map(|(a, b)| a.0 * b.1 - b.0 * a.1)
        .sum();
    0.5 * twice_area.abs()
}

fn weighted_area(polygon: &[(f64, f64)], weighting: AreaWeighting) -> f64 {
    let area = polygon_area(polygon);
    match weighting {
        AreaWeighting::None => area,
        AreaWeighting::CosLat => {
            let mean_lat = polygon.iter().map(|(_, y)| y).sum::<f64>() / polygon.len() as f64;
            area * mean_lat.to_radians().cos().max(0.0)
        }
    }
}

fn bounding_box(vertices: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    vertices.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(s, n, w, e), &(x, y)| (s.min(y), n.max(y), w.min(x), e.max(x)),
    )
}

/// Weight each model cell by its area of overlap with `footprint`.
///
/// The weights are normalized over the part of the footprint that lies on the grid;
/// [`CellWeights::coverage`] says how large that part is. On global grids, footprints
/// crossing the grid's longitude seam are split across both sides. A footprint with
/// zero area falls back to the cell containing its center.
pub fn overlap_weights(footprint: &PixelFootprint, grid: &ModelGrid, weighting: AreaWeighting) -> CellWeights {
    let total_area = weighted_area(footprint.vertices(), weighting);
    let (clat, clon) = footprint.center();
    if !(total_area > 0.0) {
        return grid.find_cell(clat, clon).map(CellWeights::single).unwrap_or_default();
    }

    let base_shift = if clon.is_finite() { grid.normalize_lon(clon) - clon } else { 0.0 };
    let offsets: &[f64] = if grid.is_global_lon() {
        &[0.0, -FULL_CIRCLE, FULL_CIRCLE]
    } else {
        &[0.0]
    };

    let mut areas: IndexMap<CellIndex, f64> = IndexMap::new();
    for offset in offsets {
        let polygon = footprint.shifted(base_shift + offset);
        let (south, north, west, east) = bounding_box(&polygon);
        for cell in grid.cells_in_box(south, north, west, east) {
            let clipped = clip_to_rect(&polygon, &grid.cell_bounds(cell));
            let area = weighted_area(&clipped, weighting);
            if area > 0.0 {
                *areas.entry(cell).or_default() += area;
            }
        }
    }

    let covered: f64 = areas.values().sum();
    if covered <= 0.0 {
        return CellWeights::default();
    }
    CellWeights {
        cells: areas.into_iter().map(|(cell, a)| (cell, a / covered)).collect(),
        coverage: (covered / total_area).min(1.0),
    }
}

/// Find the model cells, and their weights, representing each satellite pixel.
///
/// The spatial method comes from `settings`: `point` uses only the cell containing
/// the pixel center, `overlap` weights cells by their overlap with the pixel footprint
/// (from `corners` if given, else a square of `default_footprint_deg`), and `auto`
/// uses overlap weighting only for pixels that are large relative to the grid spacing.
/// Pixels entirely off the grid get an empty [`CellWeights`].
pub fn regrid_gc_to_sat_pixels(
    sat_lat: ArrayView1<f64>,
    sat_lon: ArrayView1<f64>,
    corners: Option<&PixelCorners>,
    grid: &ModelGrid,
    settings: &ColocationSettings,
) -> Result<Vec<CellWeights>, ShapeError> {
    let nobs = sat_lat.len();
    let center_cells = colocate_pixels(sat_lat, sat_lon, grid)?;
    if let Some(c) = corners {
        if c.lat.nrows() != nobs || c.lon.nrows() != nobs {
            return Err(ShapeError::mismatch("pixel corners", &[nobs, c.lat.ncols()], c.lat.shape()));
        }
    }

    let auto_threshold = settings.auto_overlap_ratio * grid.min_spacing();
    let weights = (0..nobs)
        .map(|i| {
            let (lat, lon) = (sat_lat[i], sat_lon[i]);
            let footprint = || {
                corners
                    .and_then(|c| {
                        let (clat, clon) = c.pixel(i);
                        PixelFootprint::from_corners(clat, clon)
                    })
                    .unwrap_or_else(|| PixelFootprint::square(lat, lon, settings.default_footprint_deg))
            };
            let point = || center_cells[i].map(CellWeights::single).unwrap_or_default();

            match settings.method {
                SpatialMethod::Point => point(),
                SpatialMethod::Overlap => overlap_weights(&footprint(), grid, settings.area_weighting),
                SpatialMethod::Auto => {
                    let fp = footprint();
                    if fp.extent() >= auto_threshold {
                        overlap_weights(&fp, grid, settings.area_weighting)
                    } else {
                        point()
                    }
                }
            }
        })
        .collect();
    Ok(weights)
}
