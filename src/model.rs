//! Gridded model output (e.g. GEOS-Chem species concentrations) as used by the column operator.
use approx::AbsDiffEq;
use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use itertools::Itertools;
use ndarray::{concatenate, s, Array1, Array3, Array4, ArrayView1, Axis};

use crate::{
    error::{check_shape, ShapeError},
    grid::{CellIndex, GridError, ModelGrid},
    vertical::LevelOrder,
};

#[derive(Debug, thiserror::Error)]
pub enum ModelDataError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("Model times must strictly increase, but time {index} ({time}) does not come after the previous one")]
    TimesNotIncreasing { index: usize, time: DateTime<Utc> },
    #[error("Cannot combine model data: {0}")]
    Incompatible(String),
}

/// Source of the model pressure edges.
#[derive(Debug, Clone)]
pub enum ModelPressure {
    /// Edge pressures in hPa, shape `(ntime, nlev + 1, nlat, nlon)`.
    Edges(Array4<f64>),
    /// Hybrid coefficients (`ap` in hPa, `bp` unitless, both `nlev + 1` long) and the
    /// surface pressure in hPa, shape `(ntime, nlat, nlon)`.
    Hybrid {
        ap: Array1<f64>,
        bp: Array1<f64>,
        surface_pressure: Array3<f64>,
    },
}

/// One species' mixing ratio on the model grid at one or more output times.
///
/// Vertical arrays are ordered from the surface up.
#[derive(Debug, Clone)]
pub struct ModelFields {
    pub species: String,
    /// Mole fraction units of `mixing_ratio`, e.g. "mol/mol" or "ppb".
    pub units: String,
    pub times: Vec<DateTime<Utc>>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub pressure: ModelPressure,
    /// Shape `(ntime, nlev, nlat, nlon)`.
    pub mixing_ratio: Array4<f64>,
}

impl ModelFields {
    pub fn ntime(&self) -> usize {
        self.times.len()
    }

    pub fn nlev(&self) -> usize {
        self.mixing_ratio.dim().1
    }

    pub fn grid(&self) -> Result<ModelGrid, GridError> {
        ModelGrid::new(self.lat.view(), self.lon.view())
    }

    pub fn validate(&self) -> Result<(), ModelDataError> {
        if self.times.is_empty() {
            return Err(ShapeError::empty("model times").into());
        }
        if let Some((index, (_, t))) = self.times.iter().tuple_windows().find_position(|(a, b)| b <= a) {
            return Err(ModelDataError::TimesNotIncreasing { index: index + 1, time: *t });
        }

        let (nt, nlat, nlon) = (self.ntime(), self.lat.len(), self.lon.len());
        let nlev = self.nlev();
        if nlev == 0 {
            return Err(ShapeError::empty("model levels").into());
        }
        check_shape("model mixing ratio", &[nt, nlev, nlat, nlon], self.mixing_ratio.shape())?;
        match &self.pressure {
            ModelPressure::Edges(edges) => {
                check_shape("model pressure edges", &[nt, nlev + 1, nlat, nlon], edges.shape())?;
            }
            ModelPressure::Hybrid { ap, bp, surface_pressure } => {
                check_shape("hybrid ap coefficients", &[nlev + 1], ap.shape())?;
                check_shape("hybrid bp coefficients", &[nlev + 1], bp.shape())?;
                check_shape("model surface pressure", &[nt, nlat, nlon], surface_pressure.shape())?;
            }
        }
        Ok(())
    }

    /// Pressure edges (hPa, surface first) of one model column.
    pub fn column_edges(&self, itime: usize, cell: CellIndex) -> Array1<f64> {
        match &self.pressure {
            ModelPressure::Edges(edges) => edges.slice(s![itime, .., cell.ilat, cell.ilon]).to_owned(),
            ModelPressure::Hybrid { ap, bp, surface_pressure } => {
                let ps = surface_pressure[(itime, cell.ilat, cell.ilon)];
                ap + &(bp * ps)
            }
        }
    }

    /// Mixing ratio profile (surface first) of one model column.
    pub fn column_profile(&self, itime: usize, cell: CellIndex) -> ArrayView1<f64> {
        self.mixing_ratio.slice(s![itime, .., cell.ilat, cell.ilon])
    }

    /// Reverse the vertical axis of the mixing ratio and pressure.
    pub fn flip_levels(&mut self) {
        self.mixing_ratio = self.mixing_ratio.slice(s![.., ..;-1, .., ..]).to_owned();
        match &mut self.pressure {
            ModelPressure::Edges(edges) => {
                *edges = edges.slice(s![.., ..;-1, .., ..]).to_owned();
            }
            ModelPressure::Hybrid { ap, bp, .. } => {
                *ap = ap.slice(s![..;-1]).to_owned();
                *bp = bp.slice(s![..;-1]).to_owned();
            }
        }
    }

    pub fn ensure_surface_first(&mut self, stored_order: LevelOrder) {
        if let LevelOrder::TopFirst = stored_order {
            self.flip_levels();
        }
    }

    /// Multiply all pressures by `factor`, e.g. to convert Pa to hPa.
    pub fn scale_pressure(&mut self, factor: f64) {
        match &mut self.pressure {
            ModelPressure::Edges(edges) => edges.mapv_inplace(|p| p * factor),
            ModelPressure::Hybrid { ap, surface_pressure, .. } => {
                ap.mapv_inplace(|p| p * factor);
                surface_pressure.mapv_inplace(|p| p * factor);
            }
        }
    }
}

/// Join model fields from several files (e.g. one file per day) along time.
///
/// The pieces are sorted by their first time and must share a grid, species, units and
/// vertical coordinate.
pub fn concat_time(mut pieces: Vec<ModelFields>) -> error_stack::Result<ModelFields, ModelDataError> {
    if pieces.is_empty() {
        return Err(ModelDataError::from(ShapeError::empty("list of model fields to concatenate")).into());
    }
    pieces.sort_by_key(|p| p.times.first().copied());
    if pieces.len() == 1 {
        return Ok(pieces.remove(0));
    }

    let first = &pieces[0];
    for (i, other) in pieces.iter().enumerate().skip(1) {
        if other.species != first.species || other.units != first.units {
            return Err(ModelDataError::Incompatible(format!(
                "piece {i} has species {} in {}, expected {} in {}",
                other.species, other.units, first.species, first.units
            ))
            .into());
        }
        if !other.lat.abs_diff_eq(&first.lat, 1e-6) || !other.lon.abs_diff_eq(&first.lon, 1e-6) {
            return Err(ModelDataError::Incompatible(format!("piece {i} is on a different horizontal grid")).into());
        }
    }

    let times = pieces.iter().flat_map(|p| p.times.iter().copied()).collect_vec();
    let mixing_ratio = concatenate(Axis(0), &pieces.iter().map(|p| p.mixing_ratio.view()).collect_vec())
        .change_context_lazy(|| ModelDataError::Incompatible("mixing ratios have different numbers of levels".to_string()))?;

    let pressure = match &first.pressure {
        ModelPressure::Edges(_) => {
            let views = pieces
                .iter()
                .map(|p| match &p.pressure {
                    ModelPressure::Edges(e) => Ok(e.view()),
                    ModelPressure::Hybrid { .. } => Err(ModelDataError::Incompatible(
                        "some pieces use pressure edges and others hybrid coefficients".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let edges = concatenate(Axis(0), &views)
                .change_context_lazy(|| ModelDataError::Incompatible("pressure edges have different shapes".to_string()))?;
            ModelPressure::Edges(edges)
        }
        ModelPressure::Hybrid { ap, bp, .. } => {
            let mut ps_views = vec![];
            for p in pieces.iter() {
                match &p.pressure {
                    ModelPressure::Hybrid { ap: ap2, bp: bp2, surface_pressure } => {
                        if !ap2.abs_diff_eq(ap, 1e-9) || !bp2.abs_diff_eq(bp, 1e-9) {
                            return Err(ModelDataError::Incompatible("hybrid coefficients differ".to_string()).into());
                        }
                        ps_views.push(surface_pressure.view());
                    }
                    ModelPressure::Edges(_) => {
                        return Err(ModelDataError::Incompatible(
                            "some pieces use pressure edges and others hybrid coefficients".to_string(),
                        )
                        .into())
                    }
                }
            }
            let surface_pressure = concatenate(Axis(0), &ps_views)
                .change_context_lazy(|| ModelDataError::Incompatible("surface pressures have different shapes".to_string()))?;
            ModelPressure::Hybrid { ap: ap.clone(), bp: bp.clone(), surface_pressure }
        }
    };

    let combined = ModelFields {
        species: first.species.clone(),
        units: first.units.clone(),
        times,
        lat: first.lat.clone(),
        lon: first.lon.clone(),
        pressure,
        mixing_ratio,
    };
    combined.validate()?;
    Ok(combined)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use ndarray::array;

    /// A 2 x 2 x 3 hour model with two layers: 1000-500 hPa and 500-0.01 hPa. The lower
    /// layer holds 1.8e-6 mol/mol and the upper 1.7e-6, plus 1e-8 per hour.
    pub(crate) fn small_model() -> ModelFields {
        let t0 = Utc.with_ymd_and_hms(2019, 1, 1, 11, 0, 0).unwrap();
        let times = (0..3).map(|h| t0 + chrono::Duration::hours(h)).collect_vec();
        let mut mixing_ratio = Array4::zeros((3, 2, 2, 2));
        let mut edges = Array4::zeros((3, 3, 2, 2));
        for t in 0..3 {
            for (k, base) in [1.8e-6, 1.7e-6].into_iter().enumerate() {
                mixing_ratio.slice_mut(s![t, k, .., ..]).fill(base + 1e-8 * t as f64);
            }
            for (k, p) in [1000.0, 500.0, 0.01].into_iter().enumerate() {
                edges.slice_mut(s![t, k, .., ..]).fill(p);
            }
        }
        ModelFields {
            species: "CH4".to_string(),
            units: "mol/mol".to_string(),
            times,
            lat: array![0.0, 2.0],
            lon: array![0.0, 2.5],
            pressure: ModelPressure::Edges(edges),
            mixing_ratio,
        }
    }

    #[test]
    fn test_validate() {
        let model = small_model();
        model.validate().unwrap();

        let mut bad = small_model();
        bad.times.swap(0, 1);
        assert!(matches!(bad.validate(), Err(ModelDataError::TimesNotIncreasing { index: 1, .. })));

        let mut bad = small_model();
        bad.pressure = ModelPressure::Edges(Array4::zeros((3, 2, 2, 2)));
        assert!(matches!(bad.validate(), Err(ModelDataError::Shape(_))));
    }

    #[test]
    fn test_hybrid_edges() {
        let mut model = small_model();
        model.pressure = ModelPressure::Hybrid {
            ap: array![0.0, 100.0, 0.01],
            bp: array![1.0, 0.4, 0.0],
            surface_pressure: Array3::from_elem((3, 2, 2), 1000.0),
        };
        model.validate().unwrap();
        let edges = model.column_edges(0, CellIndex::new(1, 1));
        assert_abs_diff_eq!(edges, array![1000.0, 500.0, 0.01]);
    }

    #[test]
    fn test_flip_and_scale() {
        let mut model = small_model();
        model.ensure_surface_first(LevelOrder::TopFirst);
        model.scale_pressure(100.0);
        let edges = model.column_edges(2, CellIndex::new(0, 0));
        assert_abs_diff_eq!(edges, array![1.0, 50000.0, 100000.0]);
        assert_abs_diff_eq!(model.column_profile(0, CellIndex::new(0, 0))[0], 1.7e-6);
    }

    #[test]
    fn test_concat_time() {
        let a = small_model();
        let mut b = small_model();
        for t in b.times.iter_mut() {
            *t = *t + chrono::Duration::hours(3);
        }
        // Out-of-order input should still come out sorted
        let combined = concat_time(vec![b, a]).unwrap();
        assert_eq!(combined.ntime(), 6);
        assert_eq!(combined.times[0], Utc.with_ymd_and_hms(2019, 1, 1, 11, 0, 0).unwrap());
        assert_eq!(combined.mixing_ratio.dim(), (6, 2, 2, 2));

        let mut c = small_model();
        c.lat = array![0.0, 4.0];
        let err = concat_time(vec![small_model(), c]).unwrap_err();
        assert!(matches!(err.current_context(), ModelDataError::Incompatible(_)));
    }
}
