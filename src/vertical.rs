//! Vertical operators: putting a model profile on a satellite retrieval's vertical grid.
//!
//! All pressures here are in hPa and every profile is ordered from the surface upward,
//! i.e. with decreasing pressure. Readers are responsible for flipping data stored
//! top-first (see [`LevelOrder`]).
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::interpolation::{log_pressure_interp, InterpolationError};

#[derive(Debug, thiserror::Error)]
pub enum VerticalError {
    #[error("{what} must have at least {min} levels, got {n}")]
    TooFewLevels { what: &'static str, n: usize, min: usize },
    #[error("{what} pressures must strictly decrease from the surface upward (problem at index {index})")]
    NotDecreasing { what: &'static str, index: usize },
    #[error("{what} pressures must be finite and non-negative (problem at index {index})")]
    InvalidPressure { what: &'static str, index: usize },
    #[error("Model profile has {nvalues} values but {nedges} edges, expected one fewer value than edges")]
    ProfileLength { nvalues: usize, nedges: usize },
    #[error("Could not interpolate model profile to satellite levels: {0}")]
    Interpolation(#[from] InterpolationError),
}

/// Whether satellite pressure levels are layer centers or layer edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LevelKind {
    /// `n` pressures describe `n` layers; model values are interpolated to each pressure.
    Centers,
    /// `n` pressures bound `n - 1` layers; model values are averaged over each layer.
    Edges,
}

impl LevelKind {
    /// Number of retrieval layers (the length of the averaging kernel) for `nlevels` pressures.
    pub fn nlayers(&self, nlevels: usize) -> usize {
        match self {
            LevelKind::Centers => nlevels,
            LevelKind::Edges => nlevels.saturating_sub(1),
        }
    }
}

/// Order of the vertical dimension as stored in a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LevelOrder {
    #[default]
    SurfaceFirst,
    TopFirst,
}

/// The vertical grid of one satellite retrieval.
#[derive(Debug, Clone)]
pub struct SatelliteVerticalGrid {
    kind: LevelKind,
    levels: Array1<f64>,
    edges: Array1<f64>,
}

impl SatelliteVerticalGrid {
    pub fn new(levels: ArrayView1<f64>, kind: LevelKind) -> Result<Self, VerticalError> {
        check_pressures("satellite", levels, 2)?;
        let edges = match kind {
            LevelKind::Edges => levels.to_owned(),
            LevelKind::Centers => edges_from_centers(levels),
        };
        Ok(Self { kind, levels: levels.to_owned(), edges })
    }

    pub fn kind(&self) -> LevelKind {
        self.kind
    }

    pub fn nlayers(&self) -> usize {
        self.kind.nlayers(self.levels.len())
    }

    /// Layer edge pressures, `nlayers + 1` values. For grids defined by centers the
    /// edges are midpoints, with the outermost edges half a spacing beyond the end centers.
    pub fn edges(&self) -> ArrayView1<f64> {
        self.edges.view()
    }

    /// The pressures that represent each layer: the levels themselves for `Centers`,
    /// the edge midpoints for `Edges`.
    pub fn layer_pressures(&self) -> Array1<f64> {
        match self.kind {
            LevelKind::Centers => self.levels.clone(),
            LevelKind::Edges => layer_midpoints(self.edges.view()),
        }
    }
}

fn check_pressures(what: &'static str, p: ArrayView1<f64>, min: usize) -> Result<(), VerticalError> {
    if p.len() < min {
        return Err(VerticalError::TooFewLevels { what, n: p.len(), min });
    }
    if let Some(index) = p.iter().position(|v| !v.is_finite() || *v < 0.0) {
        return Err(VerticalError::InvalidPressure { what, index });
    }
    if let Some((index, _)) = p.iter().tuple_windows().find_position(|(a, b)| b >= a) {
        return Err(VerticalError::NotDecreasing { what, index: index + 1 });
    }
    Ok(())
}

fn edges_from_centers(centers: ArrayView1<f64>) -> Array1<f64> {
    let n = centers.len();
    let mut edges = Array1::zeros(n + 1);
    edges[0] = centers[0] + 0.5 * (centers[0] - centers[1]);
    for i in 1..n {
        edges[i] = 0.5 * (centers[i - 1] + centers[i]);
    }
    edges[n] = (centers[n - 1] - 0.5 * (centers[n - 2] - centers[n - 1])).max(0.0);
    edges
}

fn layer_midpoints(edges: ArrayView1<f64>) -> Array1<f64> {
    edges.iter().tuple_windows().map(|(a, b)| 0.5 * (a + b)).collect()
}

/// Fraction of each satellite layer's pressure thickness covered by each model layer.
///
/// Returns a `(n_satellite_layers, n_model_layers)` matrix whose rows sum to one. If the
/// satellite surface pressure is higher than the model's, the lowest model layer is
/// stretched down to it; likewise the top model layer is stretched up to the satellite top.
pub fn pressure_overlap_matrix(
    model_edges: ArrayView1<f64>,
    sat_edges: ArrayView1<f64>,
) -> Result<Array2<f64>, VerticalError> {
    check_pressures("model", model_edges, 2)?;
    check_pressures("satellite", sat_edges, 2)?;

    let nmod = model_edges.len() - 1;
    let nsat = sat_edges.len() - 1;

    let mut mod_edges = model_edges.to_owned();
    mod_edges[0] = mod_edges[0].max(sat_edges[0]);
    mod_edges[nmod] = mod_edges[nmod].min(sat_edges[nsat]);

    let mut weights = Array2::zeros((nsat, nmod));
    for (j, (&p_bot, &p_top)) in sat_edges.iter().tuple_windows().enumerate() {
        let thickness = p_bot - p_top;
        for (i, (&q_bot, &q_top)) in mod_edges.iter().tuple_windows().enumerate() {
            let overlap = p_bot.min(q_bot) - p_top.max(q_top);
            if overlap > 0.0 {
                weights[(j, i)] = overlap / thickness;
            }
        }
    }
    Ok(weights)
}

/// Put one model column profile onto a satellite vertical grid.
///
/// `model_edges` are the `nlev + 1` model pressure edges and `model_values` the `nlev`
/// layer values. For satellite layer edges this is a pressure-weighted layer average;
/// for satellite level centers it is interpolation in ln(p) from the model layer centers.
pub fn remap_profile(
    model_edges: ArrayView1<f64>,
    model_values: ArrayView1<f64>,
    sat_grid: &SatelliteVerticalGrid,
    extrapolate: bool,
) -> Result<Array1<f64>, VerticalError> {
    if model_values.len() + 1 != model_edges.len() {
        return Err(VerticalError::ProfileLength {
            nvalues: model_values.len(),
            nedges: model_edges.len(),
        });
    }

    match sat_grid.kind() {
        LevelKind::Edges => {
            if !extrapolate {
                let n = model_edges.len() - 1;
                let sat_edges = sat_grid.edges();
                let outside = sat_edges[0] > model_edges[0]
                    || sat_edges[sat_edges.len() - 1] < model_edges[n];
                if outside {
                    return Err(InterpolationError::OutOfDomain {
                        left: format!("{}", model_edges[0]),
                        right: format!("{}", model_edges[n]),
                        out: format!("{} to {}", sat_edges[0], sat_edges[sat_edges.len() - 1]),
                    }
                    .into());
                }
            }
            let weights = pressure_overlap_matrix(model_edges, sat_grid.edges())?;
            Ok(weights.dot(&model_values))
        }
        LevelKind::Centers => {
            check_pressures("model", model_edges, 2)?;
            let model_centers = layer_midpoints(model_edges).to_vec();
            let values = model_values.to_vec();
            sat_grid
                .layer_pressures()
                .iter()
                .map(|&p| {
                    log_pressure_interp(&model_centers, &values, p, extrapolate)
                        .map_err(VerticalError::from)
                })
                .collect()
        }
    }
}
