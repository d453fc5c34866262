//! Horizontal model grids and point-in-cell colocation.
//!
//! Model grids are rectilinear: a 1D array of latitude cell centers and a 1D array of
//! longitude cell centers. Cell edges are the midpoints between centers, with the outer
//! edges placed half a spacing beyond the outermost centers. Latitude edges are clamped
//! to the poles and the polar cells made symmetric about their centers, which matches
//! GEOS-Chem's polar half-cells.
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;

const FULL_CIRCLE: f64 = 360.0;
const GLOBAL_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("The {axis} axis must have at least 2 cell centers, got {n}")]
    TooFewCells { axis: &'static str, n: usize },
    #[error("{axis} cell centers must be finite and strictly monotonic (problem at index {index})")]
    NotMonotonic { axis: &'static str, index: usize },
    #[error("Longitude cell centers must increase (problem at index {0})")]
    LongitudeDecreasing(usize),
    #[error("Latitude cell center {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
}

/// Index of a model grid cell, in the order of the model's own latitude and longitude arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub ilat: usize,
    pub ilon: usize,
}

impl CellIndex {
    pub fn new(ilat: usize, ilon: usize) -> Self {
        Self { ilat, ilon }
    }
}

/// Edges of one grid cell, in degrees. `west` and `east` are in the grid's own longitude frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

#[derive(Debug, Clone)]
pub struct ModelGrid {
    lat_centers: Array1<f64>,
    lon_centers: Array1<f64>,
    /// Always ascending; `lat_reversed` records whether the centers were given north to south.
    lat_edges: Vec<f64>,
    lat_reversed: bool,
    lon_edges: Vec<f64>,
    global_lon: bool,
}

impl ModelGrid {
    pub fn new(lat_centers: ArrayView1<f64>, lon_centers: ArrayView1<f64>) -> Result<Self, GridError> {
        if lat_centers.len() < 2 {
            return Err(GridError::TooFewCells { axis: "latitude", n: lat_centers.len() });
        }
        if lon_centers.len() < 2 {
            return Err(GridError::TooFewCells { axis: "longitude", n: lon_centers.len() });
        }
        if let Some(&lat) = lat_centers.iter().find(|v| v.abs() > 90.0) {
            return Err(GridError::LatitudeOutOfRange(lat));
        }

        let lat_reversed = lat_centers[0] > lat_centers[1];
        let mut sorted_lat = lat_centers.to_vec();
        if lat_reversed {
            sorted_lat.reverse();
        }
        if let Some(index) = first_non_increasing(&sorted_lat) {
            let index = if lat_reversed { sorted_lat.len() - 1 - index } else { index };
            return Err(GridError::NotMonotonic { axis: "latitude", index });
        }

        let lon = lon_centers.to_vec();
        if let Some(index) = first_non_increasing(&lon) {
            return Err(GridError::LongitudeDecreasing(index));
        }

        let lat_edges = polar_lat_edges(&sorted_lat);

        let mut lon_edges = edges_from_centers(&lon);
        let nlon = lon_edges.len() - 1;
        let global_lon = lon_edges[nlon] - lon_edges[0] >= FULL_CIRCLE - GLOBAL_TOLERANCE;
        if global_lon {
            lon_edges[nlon] = lon_edges[0] + FULL_CIRCLE;
        }

        Ok(Self {
            lat_centers: lat_centers.to_owned(),
            lon_centers: lon_centers.to_owned(),
            lat_edges,
            lat_reversed,
            lon_edges,
            global_lon,
        })
    }

    pub fn nlat(&self) -> usize {
        self.lat_centers.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon_centers.len()
    }

    pub fn lat_centers(&self) -> ArrayView1<f64> {
        self.lat_centers.view()
    }

    pub fn lon_centers(&self) -> ArrayView1<f64> {
        self.lon_centers.view()
    }

    /// True if the longitude cells wrap all the way around the globe.
    pub fn is_global_lon(&self) -> bool {
        self.global_lon
    }

    /// Westernmost and easternmost longitude edges, in the grid's frame.
    pub fn lon_extent(&self) -> (f64, f64) {
        (self.lon_edges[0], self.lon_edges[self.lon_edges.len() - 1])
    }

    /// Shift a longitude by a multiple of 360 degrees into the grid's frame, that is,
    /// into `[west edge, west edge + 360)`. Works for grids defined on -180 to 180 or 0 to 360.
    pub fn normalize_lon(&self, lon: f64) -> f64 {
        let west = self.lon_edges[0];
        west + (lon - west).rem_euclid(FULL_CIRCLE)
    }

    /// Find the cell containing a point, or `None` if the point is not on the grid
    /// (outside a regional domain, or a non-finite coordinate).
    pub fn find_cell(&self, lat: f64, lon: f64) -> Option<CellIndex> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        let ilat = locate(&self.lat_edges, lat)?;
        let ilon = locate(&self.lon_edges, self.normalize_lon(lon))?;
        Some(CellIndex::new(self.lat_index(ilat), ilon))
    }

    pub fn cell_bounds(&self, cell: CellIndex) -> CellBounds {
        let i = self.lat_index(cell.ilat);
        CellBounds {
            south: self.lat_edges[i],
            north: self.lat_edges[i + 1],
            west: self.lon_edges[cell.ilon],
            east: self.lon_edges[cell.ilon + 1],
        }
    }

    /// All cells overlapping a latitude/longitude box given in the grid's longitude frame.
    /// Cells that only touch the box along an edge are not included.
    pub fn cells_in_box(&self, south: f64, north: f64, west: f64, east: f64) -> Vec<CellIndex> {
        let lat_range = overlapping_range(&self.lat_edges, south, north);
        let lon_range = overlapping_range(&self.lon_edges, west, east);
        lat_range
            .cartesian_product(lon_range)
            .map(|(i, j)| CellIndex::new(self.lat_index(i), j))
            .collect()
    }

    /// The smallest spacing between adjacent cell centers along either axis, in degrees.
    pub fn min_spacing(&self) -> f64 {
        spacings(&self.lat_centers)
            .chain(spacings(&self.lon_centers))
            .fold(f64::INFINITY, f64::min)
    }

    /// Mean (latitude, longitude) spacing of cell centers, in degrees.
    pub fn resolution(&self) -> (f64, f64) {
        let mean = |v: &Array1<f64>| {
            let n = (v.len() - 1) as f64;
            spacings(v).sum::<f64>() / n
        };
        (mean(&self.lat_centers), mean(&self.lon_centers))
    }

    // Converts between positions in the ascending edge array and the caller's latitude
    // index. Applying it twice gives back the original index.
    fn lat_index(&self, i: usize) -> usize {
        if self.lat_reversed {
            self.lat_centers.len() - 1 - i
        } else {
            i
        }
    }
}

fn first_non_increasing(values: &[f64]) -> Option<usize> {
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Some(i);
    }
    values
        .iter()
        .tuple_windows()
        .position(|(a, b)| b <= a)
        .map(|i| i + 1)
}

fn edges_from_centers(centers: &[f64]) -> Vec<f64> {
    let n = centers.len();
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(centers[0] - 0.5 * (centers[1] - centers[0]));
    edges.extend(centers.iter().tuple_windows().map(|(a, b)| 0.5 * (a + b)));
    edges.push(centers[n - 1] + 0.5 * (centers[n - 1] - centers[n - 2]));
    edges
}

/// Latitude edges for ascending centers. Outer edges past a pole are clamped to it,
/// and the polar cell is then made symmetric about its center. On the GEOS-Chem 4x5
/// grid this puts the edges around the -89 center at -90 and -88.
fn polar_lat_edges(centers: &[f64]) -> Vec<f64> {
    let mut edges = edges_from_centers(centers);
    let n = centers.len();
    if edges[0] < -90.0 {
        edges[0] = -90.0;
        let inner = 2.0 * centers[0] + 90.0;
        if inner > centers[0] && inner < centers[1] {
            edges[1] = inner;
        }
    }
    if edges[n] > 90.0 {
        edges[n] = 90.0;
        let inner = 2.0 * centers[n - 1] - 90.0;
        if inner < centers[n - 1] && inner > centers[n - 2] {
            edges[n - 1] = inner;
        }
    }
    edges
}

fn spacings(centers: &Array1<f64>) -> impl Iterator<Item = f64> + '_ {
    centers.iter().tuple_windows().map(|(a, b)| (b - a).abs())
}

/// Index of the cell (between `edges[i]` and `edges[i+1]`) containing `x`. A point exactly
/// on an interior edge belongs to the cell above it; one on the last edge to the last cell.
fn locate(edges: &[f64], x: f64) -> Option<usize> {
    let n = edges.len() - 1;
    if x < edges[0] || x > edges[n] {
        return None;
    }
    let count = edges.partition_point(|&e| e <= x);
    Some((count - 1).min(n - 1))
}

fn overlapping_range(edges: &[f64], lo: f64, hi: f64) -> std::ops::Range<usize> {
    let n = edges.len() - 1;
    let start = edges.partition_point(|&e| e <= lo).saturating_sub(1);
    let end = edges.partition_point(|&e| e < hi).min(n);
    // Trim cells that only touch the box at a shared edge
    let start = (start..end).find(|&i| edges[i + 1] > lo).unwrap_or(end);
    start..end
}

/// Find the model grid cell containing each satellite pixel center.
///
/// This assumes model cells are much larger than satellite pixels, so that each pixel can
/// be assigned to a single cell. Pixels off the grid get `None`.
pub fn colocate_pixels(
    sat_lat: ArrayView1<f64>,
    sat_lon: ArrayView1<f64>,
    grid: &ModelGrid,
) -> Result<Vec<Option<CellIndex>>, ShapeError> {
    if sat_lat.len() != sat_lon.len() {
        return Err(ShapeError::mismatch("satellite longitude", &[sat_lat.len()], &[sat_lon.len()]));
    }
    Ok(sat_lat
        .iter()
        .zip(sat_lon.iter())
        .map(|(&lat, &lon)| grid.find_cell(lat, lon))
        .collect())
}

/// Round a coordinate to the nearest multiple of `resolution`, e.g. snapping latitudes
/// to a 0.25 degree grid.
pub fn snap_to_grid(value: f64, resolution: f64) -> f64 {
    (value / resolution).round() * resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};
    use rstest::{fixture, rstest};

    #[fixture]
    fn global_grid() -> ModelGrid {
        // 2 x 5 degree cells covering the tropics, longitudes -180 to 175
        let lat = array![-3.0, -1.0, 1.0, 3.0];
        let lon = Array1::range(-180.0, 180.0, 5.0);
        ModelGrid::new(lat.view(), lon.view()).unwrap()
    }

    #[rstest]
    fn test_global_grid_edges(global_grid: ModelGrid) {
        assert!(global_grid.is_global_lon());
        assert_eq!(global_grid.nlon(), 72);
        let (west, east) = global_grid.lon_extent();
        assert_abs_diff_eq!(west, -182.5);
        assert_abs_diff_eq!(east, 177.5);
        let b = global_grid.cell_bounds(CellIndex::new(0, 0));
        assert_abs_diff_eq!(b.south, -4.0);
        assert_abs_diff_eq!(b.north, -2.0);
    }

    #[rstest]
    #[case(0.5, 0.0, Some(CellIndex::new(2, 36)))]
    #[case(0.5, 179.0, Some(CellIndex::new(2, 0)))]
    #[case(0.5, 359.0, Some(CellIndex::new(2, 36)))]
    #[case(-3.5, 12.6, Some(CellIndex::new(0, 39)))]
    #[case(4.1, 0.0, None)]
    #[case(f64::NAN, 0.0, None)]
    fn test_global_find_cell(
        global_grid: ModelGrid,
        #[case] lat: f64,
        #[case] lon: f64,
        #[case] expected: Option<CellIndex>,
    ) {
        assert_eq!(global_grid.find_cell(lat, lon), expected);
    }

    #[test]
    fn test_descending_latitudes() {
        let grid = ModelGrid::new(array![3.0, 1.0, -1.0].view(), array![10.0, 20.0].view()).unwrap();
        assert_eq!(grid.find_cell(0.5, 12.0), Some(CellIndex::new(1, 0)));
        assert_eq!(grid.find_cell(3.5, 16.0), Some(CellIndex::new(0, 1)));
        let b = grid.cell_bounds(CellIndex::new(0, 0));
        assert_abs_diff_eq!(b.south, 2.0);
        assert_abs_diff_eq!(b.north, 4.0);
    }

    #[test]
    fn test_regional_grid_lon_conventions() {
        let grid = ModelGrid::new(array![30.0, 31.0].view(), array![-100.0, -99.0, -98.0].view()).unwrap();
        assert!(!grid.is_global_lon());
        assert_eq!(grid.find_cell(30.2, 260.0), Some(CellIndex::new(0, 0)));
        assert_eq!(grid.find_cell(30.2, -97.6), Some(CellIndex::new(0, 2)));
        assert_eq!(grid.find_cell(30.2, -97.4), None);
    }

    #[test]
    fn test_polar_edges_clamped() {
        let grid = ModelGrid::new(array![-89.0, -86.0, 86.0, 89.0].view(), array![0.0, 5.0].view()).unwrap();
        assert_abs_diff_eq!(grid.cell_bounds(CellIndex::new(0, 0)).south, -90.0);
        assert_abs_diff_eq!(grid.cell_bounds(CellIndex::new(3, 0)).north, 90.0);
        assert_eq!(grid.find_cell(-90.0, 1.0), Some(CellIndex::new(0, 0)));
        assert_eq!(grid.find_cell(90.0, 1.0), Some(CellIndex::new(3, 0)));
    }

    #[rstest]
    #[case::geos_chem_4x5(4.0, -88.0)]
    #[case::geos_chem_2x25(2.0, -89.0)]
    fn test_geos_chem_polar_cells(#[case] dlat: f64, #[case] polar_north_edge: f64) {
        let n = (180.0 / dlat) as usize + 1;
        let mut lat = Array1::range(-90.0, 90.0 + 0.5 * dlat, dlat);
        assert_eq!(lat.len(), n);
        lat[0] = -90.0 + 0.25 * dlat;
        lat[n - 1] = 90.0 - 0.25 * dlat;
        let grid = ModelGrid::new(lat.view(), array![0.0, 5.0].view()).unwrap();

        let south_pole = grid.cell_bounds(CellIndex::new(0, 0));
        assert_abs_diff_eq!(south_pole.south, -90.0);
        assert_abs_diff_eq!(south_pole.north, polar_north_edge, epsilon = 1e-12);
        let next = grid.cell_bounds(CellIndex::new(1, 0));
        assert_abs_diff_eq!(next.north, -90.0 + 1.5 * dlat, epsilon = 1e-12);
        let north_pole = grid.cell_bounds(CellIndex::new(n - 1, 0));
        assert_abs_diff_eq!(north_pole.south, -polar_north_edge, epsilon = 1e-12);
        assert_abs_diff_eq!(north_pole.north, 90.0);

        let just_above = polar_north_edge + 0.2 * dlat;
        assert_eq!(grid.find_cell(just_above, 1.0), Some(CellIndex::new(1, 0)));
        assert_eq!(grid.find_cell(-just_above, 1.0), Some(CellIndex::new(n - 2, 0)));
    }

    #[test]
    fn test_invalid_grids() {
        assert!(matches!(
            ModelGrid::new(array![1.0].view(), array![1.0, 2.0].view()),
            Err(GridError::TooFewCells { axis: "latitude", n: 1 })
        ));
        assert!(matches!(
            ModelGrid::new(array![1.0, 2.0, 2.0].view(), array![1.0, 2.0].view()),
            Err(GridError::NotMonotonic { index: 2, .. })
        ));
        assert!(matches!(
            ModelGrid::new(array![1.0, 2.0].view(), array![5.0, 2.0].view()),
            Err(GridError::LongitudeDecreasing(1))
        ));
    }

    #[rstest]
    fn test_cells_in_box(global_grid: ModelGrid) {
        // A box from -0.5 to 1.5 lat, 1 to 4 lon straddles lat cells 1 and 2, lon cells 36 and 37
        let cells = global_grid.cells_in_box(-0.5, 1.5, 1.0, 4.0);
        assert_eq!(
            cells,
            vec![
                CellIndex::new(1, 36),
                CellIndex::new(1, 37),
                CellIndex::new(2, 36),
                CellIndex::new(2, 37)
            ]
        );

        // Touching an edge does not count
        let cells = global_grid.cells_in_box(0.0, 1.0, 2.5, 3.0);
        assert_eq!(cells, vec![CellIndex::new(2, 37)]);
    }

    #[rstest]
    fn test_colocate_pixels(global_grid: ModelGrid) {
        let lat = array![0.5, 10.0, -2.5];
        let lon = array![0.0, 0.0, -179.0];
        let cells = colocate_pixels(lat.view(), lon.view(), &global_grid).unwrap();
        assert_eq!(cells, vec![Some(CellIndex::new(2, 36)), None, Some(CellIndex::new(0, 0))]);

        colocate_pixels(lat.view(), array![0.0].view(), &global_grid).unwrap_err();
    }

    #[test]
    fn test_spacing_and_snap() {
        let grid = ModelGrid::new(array![0.0, 0.25, 0.5].view(), array![10.0, 10.3125, 10.625].view()).unwrap();
        assert_abs_diff_eq!(grid.min_spacing(), 0.25);
        let (dlat, dlon) = grid.resolution();
        assert_abs_diff_eq!(dlat, 0.25);
        assert_abs_diff_eq!(dlon, 0.3125);

        assert_abs_diff_eq!(snap_to_grid(10.4, 0.3125), 10.3125);
        assert_abs_diff_eq!(snap_to_grid(-0.13, 0.25), -0.25);
    }
}
