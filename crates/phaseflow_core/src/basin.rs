use crate::flow::{terminal_state, Stepper};
use crate::grid::GridSpec;
use crate::traits::VectorField;
use nalgebra::{distance, Point2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap on the attractor list. The raster encoding and the
/// downstream 8-color palette reserve label 0 for "unclassified" and
/// 1..=7 for attractors, so longer lists are rejected before any
/// trajectory is integrated.
pub const MAX_ATTRACTORS: usize = 7;

/// Errors that abort a basin run before any integration starts.
///
/// Per-trajectory integration failures are deliberately absent: a single
/// diverging trajectory classifies as label 0 and the run continues.
#[derive(Debug, Error)]
pub enum BasinError {
    #[error("attractor list has {got} entries; at most {} are supported", MAX_ATTRACTORS)]
    TooManyAttractors { got: usize },
    #[error("grid limits must be finite with max > min on both axes and delta positive")]
    InvalidGrid,
    #[error("classification tolerance maxdist must be positive and finite")]
    InvalidTolerance,
    #[error("integration horizon tmax must be positive and finite")]
    InvalidHorizon,
    #[error("integration step dt must be positive and finite")]
    InvalidStep,
    #[error("vector field dimension is {dim}; basins need at least the two grid coordinates")]
    DimensionTooSmall { dim: usize },
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// One basin-classification run: where to sample, how to integrate, and
/// which attractors to match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasinRequest {
    pub grid: GridSpec,
    /// Known attractors in label order: entry `k` carries label `k + 1`.
    pub attractors: Vec<Point2<f64>>,
    /// A terminal state within this Euclidean distance of an attractor
    /// (first two coordinates) takes that attractor's label.
    pub maxdist: f64,
    /// Integration horizon; the state at `tmax` stands in for "where the
    /// trajectory converged".
    pub tmax: f64,
    /// Fixed integration step.
    pub dt: f64,
    pub stepper: Stepper,
    /// Worker threads for the trajectory batch. 0 selects one per
    /// logical CPU.
    pub workers: usize,
    /// Force the `(xmin, ymin)` corner cell to label 0 after assembly.
    /// See [`LabelRaster::anchor_origin_cell`].
    pub anchor_corner: bool,
}

/// The classification raster: one label per grid cell, 0 for
/// unclassified, `1..=k` for the k-th attractor. Storage is x-fastest
/// (`ix + iy*nx`), so `get(ix, iy)` is the label of grid point
/// `(x_ix, y_iy)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRaster {
    pub nx: usize,
    pub ny: usize,
    pub labels: Vec<u8>,
}

impl LabelRaster {
    pub fn get(&self, ix: usize, iy: usize) -> u8 {
        self.labels[ix + iy * self.nx]
    }

    /// Forces the cell nearest `(xmin, ymin)` to label 0.
    ///
    /// Carried over from the reference renderer, whose color scale
    /// anchors on this cell. It is a post-processing step kept separate
    /// from classification so it can be toggled and tested on its own.
    pub fn anchor_origin_cell(&mut self) {
        if let Some(first) = self.labels.first_mut() {
            *first = 0;
        }
    }
}

/// Labels one terminal state against the attractor list.
///
/// Attractors are tested in list order and the first one within
/// `maxdist` (Euclidean distance in the first two coordinates) wins,
/// even when a later attractor is strictly closer. This first-match
/// policy is load-bearing: raster colors produced downstream depend on
/// it, and the tie-break test pins it.
pub fn classify_terminal(terminal: &[f64], attractors: &[Point2<f64>], maxdist: f64) -> u8 {
    let end = Point2::new(terminal[0], terminal[1]);
    for (idx, attractor) in attractors.iter().enumerate() {
        if distance(attractor, &end) <= maxdist {
            return (idx + 1) as u8;
        }
    }
    0
}

/// Classifies the basin of attraction of every cell in the request's
/// grid.
///
/// Each cell's initial condition (grid coordinates, zeros in any extra
/// dimensions) is integrated to `tmax`; the terminal state is matched
/// against the attractor list. Cells whose trajectory goes non-finite
/// stay at label 0. The batch runs on a dedicated worker pool as an
/// order-preserving parallel map, so repeated runs produce identical
/// rasters regardless of completion order.
pub fn compute_basins(
    field: &(impl VectorField<f64> + Sync),
    params: &[f64],
    request: &BasinRequest,
) -> Result<LabelRaster, BasinError> {
    validate(request, field.dimension())?;

    let grid = &request.grid;
    let (nx, ny) = (grid.nx(), grid.ny());
    let seeds = grid.seeds(field.dimension());
    log::info!(
        "classifying {nx} x {ny} basin grid ({} trajectories, {} attractors)",
        seeds.len(),
        request.attractors.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(request.workers)
        .build()
        .map_err(|err| BasinError::WorkerPool(err.to_string()))?;

    let labels: Vec<u8> = pool.install(|| {
        seeds
            .par_iter()
            .map(|seed| {
                match terminal_state(
                    field,
                    params,
                    request.stepper,
                    seed,
                    0.0,
                    request.tmax,
                    request.dt,
                ) {
                    Some(end) => classify_terminal(&end, &request.attractors, request.maxdist),
                    None => 0,
                }
            })
            .collect()
    });

    let mut raster = LabelRaster { nx, ny, labels };
    if request.anchor_corner {
        raster.anchor_origin_cell();
    }
    Ok(raster)
}

fn validate(request: &BasinRequest, dim: usize) -> Result<(), BasinError> {
    // The attractor cap comes first: an oversized list must be rejected
    // before anything else is even looked at.
    if request.attractors.len() > MAX_ATTRACTORS {
        return Err(BasinError::TooManyAttractors {
            got: request.attractors.len(),
        });
    }
    if !request.grid.is_valid() {
        return Err(BasinError::InvalidGrid);
    }
    if !(request.maxdist > 0.0) || !request.maxdist.is_finite() {
        return Err(BasinError::InvalidTolerance);
    }
    if !(request.tmax > 0.0) || !request.tmax.is_finite() {
        return Err(BasinError::InvalidHorizon);
    }
    if !(request.dt > 0.0) || !request.dt.is_finite() {
        return Err(BasinError::InvalidStep);
    }
    if dim < 2 {
        return Err(BasinError::DimensionTooSmall { dim });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        classify_terminal, compute_basins, BasinError, BasinRequest, LabelRaster, MAX_ATTRACTORS,
    };
    use crate::flow::Stepper;
    use crate::grid::GridSpec;
    use crate::traits::VectorField;
    use nalgebra::Point2;

    /// No motion at all: every terminal state equals its seed.
    struct ZeroField;

    impl VectorField<f64> for ZeroField {
        fn dimension(&self) -> usize {
            2
        }

        fn eval(&self, _t: f64, _x: &[f64], _p: &[f64], out: &mut [f64]) {
            out[0] = 0.0;
            out[1] = 0.0;
        }
    }

    /// Zero motion except near one marked point, where the derivative is
    /// NaN: the trajectory started there fails, nothing else does.
    struct PoisonedCell {
        x: f64,
        y: f64,
    }

    impl VectorField<f64> for PoisonedCell {
        fn dimension(&self) -> usize {
            2
        }

        fn eval(&self, _t: f64, x: &[f64], _p: &[f64], out: &mut [f64]) {
            if (x[0] - self.x).abs() < 1e-9 && (x[1] - self.y).abs() < 1e-9 {
                out[0] = f64::NAN;
                out[1] = f64::NAN;
            } else {
                out[0] = 0.0;
                out[1] = 0.0;
            }
        }
    }

    /// dx/dt = x - x^3, dy/dt = -y: two attractors at (±1, 0), separated
    /// by the x = 0 line.
    struct Pitchfork;

    impl VectorField<f64> for Pitchfork {
        fn dimension(&self) -> usize {
            2
        }

        fn eval(&self, _t: f64, x: &[f64], _p: &[f64], out: &mut [f64]) {
            out[0] = x[0] - x[0] * x[0] * x[0];
            out[1] = -x[1];
        }
    }

    fn request(attractors: Vec<Point2<f64>>, maxdist: f64) -> BasinRequest {
        BasinRequest {
            grid: GridSpec::new((-1.0, 1.0), (-1.0, 1.0), 1.0),
            attractors,
            maxdist,
            tmax: 1.0,
            dt: 0.1,
            stepper: Stepper::Rk4,
            workers: 0,
            anchor_corner: true,
        }
    }

    #[test]
    fn rejects_more_than_seven_attractors_before_any_work() {
        let attractors = vec![Point2::new(0.0, 0.0); MAX_ATTRACTORS + 1];
        let err = compute_basins(&ZeroField, &[], &request(attractors, 0.5))
            .expect_err("eight attractors must fail");
        assert!(matches!(err, BasinError::TooManyAttractors { got: 8 }));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut bad = request(vec![Point2::new(0.0, 0.0)], 0.5);
        bad.grid.delta = 0.0;
        assert!(matches!(
            compute_basins(&ZeroField, &[], &bad),
            Err(BasinError::InvalidGrid)
        ));

        let mut bad = request(vec![Point2::new(0.0, 0.0)], 0.5);
        bad.maxdist = -1.0;
        assert!(matches!(
            compute_basins(&ZeroField, &[], &bad),
            Err(BasinError::InvalidTolerance)
        ));

        let mut bad = request(vec![Point2::new(0.0, 0.0)], 0.5);
        bad.tmax = 0.0;
        assert!(matches!(
            compute_basins(&ZeroField, &[], &bad),
            Err(BasinError::InvalidHorizon)
        ));

        let mut bad = request(vec![Point2::new(0.0, 0.0)], 0.5);
        bad.dt = f64::NAN;
        assert!(matches!(
            compute_basins(&ZeroField, &[], &bad),
            Err(BasinError::InvalidStep)
        ));
    }

    #[test]
    fn every_label_stays_within_the_attractor_range() {
        let attractors = vec![Point2::new(-1.0, -1.0), Point2::new(1.0, 1.0)];
        let raster = compute_basins(&ZeroField, &[], &request(attractors, 10.0))
            .expect("basins should compute");
        assert_eq!(raster.labels.len(), 9);
        assert!(raster.labels.iter().all(|&label| label <= 2));
    }

    #[test]
    fn zero_field_three_by_three_scenario() {
        // Per the reference scenario: only the center cell sits within
        // 0.5 of the lone attractor at the origin.
        let raster = compute_basins(&ZeroField, &[], &request(vec![Point2::new(0.0, 0.0)], 0.5))
            .expect("basins should compute");
        for iy in 0..3 {
            for ix in 0..3 {
                let expected = if ix == 1 && iy == 1 { 1 } else { 0 };
                assert_eq!(raster.get(ix, iy), expected, "cell ({ix}, {iy})");
            }
        }
    }

    #[test]
    fn corner_cell_is_forced_to_zero_when_anchored() {
        // An attractor sitting exactly on the (xmin, ymin) corner would
        // label that cell 1; the anchor must override it.
        let mut req = request(vec![Point2::new(-1.0, -1.0)], 0.25);
        req.anchor_corner = true;
        let raster = compute_basins(&ZeroField, &[], &req).expect("basins should compute");
        assert_eq!(raster.get(0, 0), 0);

        req.anchor_corner = false;
        let raster = compute_basins(&ZeroField, &[], &req).expect("basins should compute");
        assert_eq!(raster.get(0, 0), 1);
    }

    #[test]
    fn anchor_origin_cell_is_independent_of_classification() {
        let mut raster = LabelRaster {
            nx: 2,
            ny: 1,
            labels: vec![5, 3],
        };
        raster.anchor_origin_cell();
        assert_eq!(raster.labels, vec![0, 3]);
    }

    #[test]
    fn classification_is_idempotent() {
        let attractors = vec![Point2::new(0.0, 0.0), Point2::new(2.0, 0.0)];
        let terminal = [1.9, 0.1, 7.0];
        let first = classify_terminal(&terminal, &attractors, 0.5);
        let second = classify_terminal(&terminal, &attractors, 0.5);
        assert_eq!(first, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn tie_break_prefers_the_first_listed_attractor() {
        let attractors = vec![Point2::new(0.0, 0.0), Point2::new(0.0, 0.01)];
        // Both attractors are within maxdist; the second is closer, but
        // the first in list order wins.
        assert_eq!(classify_terminal(&[0.0, 0.005], &attractors, 1.0), 1);
    }

    #[test]
    fn unmatched_terminal_state_gets_label_zero() {
        let attractors = vec![Point2::new(0.0, 0.0)];
        assert_eq!(classify_terminal(&[5.0, 5.0], &attractors, 0.5), 0);
        assert_eq!(classify_terminal(&[f64::NAN, 0.0], &attractors, 0.5), 0);
    }

    #[test]
    fn diverging_cell_classifies_zero_without_touching_neighbors() {
        // Poison the (1, 1) grid point: cell (2, 2). Every healthy cell
        // matches the lone attractor at huge tolerance.
        let field = PoisonedCell { x: 1.0, y: 1.0 };
        let mut req = request(vec![Point2::new(0.0, 0.0)], 100.0);
        req.anchor_corner = false;
        let raster = compute_basins(&field, &[], &req).expect("basins should compute");
        for iy in 0..3 {
            for ix in 0..3 {
                let expected = if ix == 2 && iy == 2 { 0 } else { 1 };
                assert_eq!(raster.get(ix, iy), expected, "cell ({ix}, {iy})");
            }
        }
    }

    #[test]
    fn pitchfork_basins_split_along_the_separatrix() {
        let attractors = vec![Point2::new(-1.0, 0.0), Point2::new(1.0, 0.0)];
        let req = BasinRequest {
            grid: GridSpec::new((-1.0, 1.0), (-1.0, 1.0), 0.5),
            attractors,
            maxdist: 0.3,
            tmax: 20.0,
            dt: 0.05,
            stepper: Stepper::Tsit5,
            workers: 0,
            anchor_corner: false,
        };
        let raster = compute_basins(&Pitchfork, &[], &req).expect("basins should compute");
        for iy in 0..raster.ny {
            for ix in 0..raster.nx {
                let x = -1.0 + ix as f64 * 0.5;
                let expected = if x < 0.0 {
                    1
                } else if x > 0.0 {
                    2
                } else {
                    // x = 0 is the unstable manifold; it converges to
                    // neither attractor.
                    0
                };
                assert_eq!(raster.get(ix, iy), expected, "cell ({ix}, {iy})");
            }
        }
    }

    #[test]
    fn repeated_parallel_runs_are_bit_identical() {
        let attractors = vec![Point2::new(-1.0, 0.0), Point2::new(1.0, 0.0)];
        let req = BasinRequest {
            grid: GridSpec::new((-1.0, 1.0), (-1.0, 1.0), 0.25),
            attractors,
            maxdist: 0.3,
            tmax: 10.0,
            dt: 0.05,
            stepper: Stepper::Rk4,
            workers: 0,
            anchor_corner: true,
        };
        let first = compute_basins(&Pitchfork, &[], &req).expect("basins should compute");
        let second = compute_basins(&Pitchfork, &[], &req).expect("basins should compute");
        assert_eq!(first, second);
    }

    #[test]
    fn explicit_worker_count_is_honored() {
        let raster = {
            let mut req = request(vec![Point2::new(0.0, 0.0)], 0.5);
            req.workers = 1;
            compute_basins(&ZeroField, &[], &req).expect("basins should compute")
        };
        assert_eq!(raster.get(1, 1), 1);
    }
}
