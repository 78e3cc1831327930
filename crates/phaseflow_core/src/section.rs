use crate::flow::Stepper;
use crate::nullcline::interpolate_factor;
use crate::traits::VectorField;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Which sign changes of the monitored coordinate count as crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingDirection {
    /// Below the level to at or above it.
    Positive,
    /// Above the level to at or below it.
    Negative,
    Both,
}

/// The hyperplane `state[coord] = level`, crossed in `direction`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SectionPlane {
    pub coord: usize,
    pub level: f64,
    pub direction: CrossingDirection,
}

/// Accumulates Poincaré-section points for one trajectory.
///
/// The orbit is stepped from `t0` to `tmax`; whenever the monitored
/// coordinate crosses the plane in the requested direction after the
/// `transient` time has passed, the crossing state is linearly
/// interpolated between the bracketing steps and its `(project.0,
/// project.1)` coordinates are recorded. Divergence is a hard error.
pub fn poincare_section(
    field: &impl VectorField<f64>,
    params: &[f64],
    stepper: Stepper,
    x0: &[f64],
    t0: f64,
    tmax: f64,
    dt: f64,
    plane: SectionPlane,
    transient: f64,
    project: (usize, usize),
) -> Result<Vec<[f64; 2]>> {
    let dim = field.dimension();
    validate_trajectory_inputs(dim, x0, t0, tmax, dt)?;
    if plane.coord >= dim {
        bail!("Section coordinate {} out of range for dimension {}.", plane.coord, dim);
    }
    if project.0 >= dim || project.1 >= dim {
        bail!("Projection coordinates must be within the state dimension.");
    }
    if transient < 0.0 {
        bail!("Transient time must be non-negative.");
    }

    let mut internal = stepper.build(dim);
    let mut state = x0.to_vec();
    let mut t = t0;
    let mut prev = state.clone();
    let mut crossings = Vec::new();
    let steps = ((tmax - t0) / dt).ceil() as usize;

    for _ in 0..steps {
        let step = dt.min(tmax - t);
        if step <= 0.0 {
            break;
        }
        prev.copy_from_slice(&state);
        internal.step(field, params, &mut t, &mut state, step);
        if !state.iter().all(|v| v.is_finite()) {
            bail!("Trajectory diverged (non-finite state) at t = {t}.");
        }

        let g_prev = prev[plane.coord] - plane.level;
        let g_cur = state[plane.coord] - plane.level;
        let crossed = match plane.direction {
            CrossingDirection::Positive => g_prev < 0.0 && g_cur >= 0.0,
            CrossingDirection::Negative => g_prev > 0.0 && g_cur <= 0.0,
            CrossingDirection::Both => {
                (g_prev < 0.0 && g_cur >= 0.0) || (g_prev > 0.0 && g_cur <= 0.0)
            }
        };
        if crossed && t >= t0 + transient {
            let frac = interpolate_factor(g_prev, g_cur);
            let a = prev[project.0] + (state[project.0] - prev[project.0]) * frac;
            let b = prev[project.1] + (state[project.1] - prev[project.1]) * frac;
            crossings.push([a, b]);
        }
    }

    Ok(crossings)
}

/// Samples the orbit of a periodically forced flow once per forcing
/// period (a stroboscopic section): the state is recorded at
/// `t0 + k*period` for every `k` in `(skip_periods, periods]`, projected
/// onto the two chosen coordinates.
pub fn stroboscopic_section(
    field: &impl VectorField<f64>,
    params: &[f64],
    stepper: Stepper,
    x0: &[f64],
    t0: f64,
    period: f64,
    periods: usize,
    skip_periods: usize,
    dt: f64,
    project: (usize, usize),
) -> Result<Vec<[f64; 2]>> {
    let dim = field.dimension();
    if x0.is_empty() || x0.len() != dim {
        bail!("Initial state must match the field dimension {dim}.");
    }
    if !(period > 0.0) || !period.is_finite() {
        bail!("Forcing period must be positive and finite.");
    }
    if periods == 0 {
        bail!("At least one period must be sampled.");
    }
    if skip_periods >= periods {
        bail!("skip_periods must be smaller than periods.");
    }
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Step size dt must be positive and finite.");
    }
    if project.0 >= dim || project.1 >= dim {
        bail!("Projection coordinates must be within the state dimension.");
    }

    let mut internal = stepper.build(dim);
    let mut state = x0.to_vec();
    let mut t = t0;
    let mut samples = Vec::with_capacity(periods - skip_periods);

    for k in 1..=periods {
        let target = t0 + k as f64 * period;
        while t < target {
            let step = dt.min(target - t);
            if step <= 0.0 {
                break;
            }
            internal.step(field, params, &mut t, &mut state, step);
            if !state.iter().all(|v| v.is_finite()) {
                bail!("Trajectory diverged (non-finite state) at t = {t}.");
            }
        }
        if k > skip_periods {
            samples.push([state[project.0], state[project.1]]);
        }
    }

    Ok(samples)
}

fn validate_trajectory_inputs(dim: usize, x0: &[f64], t0: f64, tmax: f64, dt: f64) -> Result<()> {
    if x0.is_empty() || x0.len() != dim {
        bail!("Initial state must match the field dimension {dim}.");
    }
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Step size dt must be positive and finite.");
    }
    if !t0.is_finite() || !tmax.is_finite() || tmax <= t0 {
        bail!("Time span requires finite t0 and tmax with tmax > t0.");
    }
    Ok(())
}
