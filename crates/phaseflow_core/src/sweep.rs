use crate::flow::{terminal_state, Stepper};
use crate::traits::VectorField;
use anyhow::{bail, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One swept parameter: `samples` evenly spaced values of
/// `base_params[param_index]` over `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepAxis {
    pub param_index: usize,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Orbit-diagram data: `(parameter value, recorded coordinate value)`
/// pairs, grouped by ascending parameter.
#[derive(Debug, Clone, Serialize)]
pub struct OrbitDiagram {
    pub param_index: usize,
    pub points: Vec<[f64; 2]>,
}

/// Builds an orbit (bifurcation) diagram over one parameter.
///
/// For each parameter value the flow is integrated from `x0` past the
/// `transient` horizon, then for a further `horizon` time units every
/// strict local maximum of `record_coord` is recorded. Parameter values
/// are independent and run on the global worker pool; a value whose
/// trajectory diverges contributes no points and is skipped rather than
/// failing the sweep.
pub fn orbit_diagram(
    field: &(impl VectorField<f64> + Sync),
    base_params: &[f64],
    axis: &SweepAxis,
    stepper: Stepper,
    x0: &[f64],
    record_coord: usize,
    transient: f64,
    horizon: f64,
    dt: f64,
) -> Result<OrbitDiagram> {
    let dim = field.dimension();
    if x0.is_empty() || x0.len() != dim {
        bail!("Initial state must match the field dimension {dim}.");
    }
    if axis.param_index >= base_params.len() {
        bail!(
            "Sweep parameter index {} out of range for {} parameters.",
            axis.param_index,
            base_params.len()
        );
    }
    if axis.samples < 2 {
        bail!("A sweep needs at least 2 parameter samples.");
    }
    if !axis.min.is_finite() || !axis.max.is_finite() || axis.max <= axis.min {
        bail!("Sweep range must be finite with max > min.");
    }
    if record_coord >= dim {
        bail!("Recorded coordinate {} out of range for dimension {}.", record_coord, dim);
    }
    if transient < 0.0 {
        bail!("Transient time must be non-negative.");
    }
    if !(horizon > 0.0) || !horizon.is_finite() {
        bail!("Sampling horizon must be positive and finite.");
    }
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Step size dt must be positive and finite.");
    }

    let step = (axis.max - axis.min) / (axis.samples - 1) as f64;
    log::info!(
        "orbit diagram: sweeping parameter {} over [{}, {}] in {} samples",
        axis.param_index,
        axis.min,
        axis.max,
        axis.samples
    );

    let per_value: Vec<Vec<[f64; 2]>> = (0..axis.samples)
        .into_par_iter()
        .map(|i| {
            let value = axis.min + step * i as f64;
            let mut params = base_params.to_vec();
            params[axis.param_index] = value;
            match record_maxima(
                field,
                &params,
                stepper,
                x0,
                record_coord,
                transient,
                horizon,
                dt,
            ) {
                Some(maxima) => maxima.into_iter().map(|m| [value, m]).collect(),
                None => {
                    log::debug!("orbit diagram: trajectory diverged at parameter {value}; skipped");
                    Vec::new()
                }
            }
        })
        .collect();

    Ok(OrbitDiagram {
        param_index: axis.param_index,
        points: per_value.into_iter().flatten().collect(),
    })
}

/// Strict local maxima of one coordinate over the sampling window, or
/// `None` if the trajectory goes non-finite anywhere along the way.
fn record_maxima(
    field: &impl VectorField<f64>,
    params: &[f64],
    stepper: Stepper,
    x0: &[f64],
    record_coord: usize,
    transient: f64,
    horizon: f64,
    dt: f64,
) -> Option<Vec<f64>> {
    let start = if transient > 0.0 {
        terminal_state(field, params, stepper, x0, 0.0, transient, dt)?
    } else {
        x0.to_vec()
    };

    let mut internal = stepper.build(start.len());
    let mut state = start;
    let mut t = transient;
    let end = transient + horizon;
    let steps = (horizon / dt).ceil() as usize;

    let mut maxima = Vec::new();
    let mut prev2 = state[record_coord];
    let mut prev1 = prev2;
    let mut seen = 0usize;

    for _ in 0..steps {
        let step = dt.min(end - t);
        if step <= 0.0 {
            break;
        }
        internal.step(field, params, &mut t, &mut state, step);
        if !state.iter().all(|v| v.is_finite()) {
            return None;
        }
        let current = state[record_coord];
        if seen >= 2 && prev1 > prev2 && prev1 > current {
            maxima.push(prev1);
        }
        prev2 = prev1;
        prev1 = current;
        seen += 1;
    }

    Some(maxima)
}
