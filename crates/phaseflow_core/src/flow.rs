use crate::solvers::{Tsit5, RK4};
use crate::traits::{Integrator, VectorField};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Stepper selection for the trajectory drivers in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stepper {
    Rk4,
    Tsit5,
}

impl Stepper {
    pub(crate) fn build(self, dim: usize) -> InternalStepper {
        match self {
            Stepper::Rk4 => InternalStepper::Rk4(RK4::new(dim)),
            Stepper::Tsit5 => InternalStepper::Tsit5(Tsit5::new(dim)),
        }
    }
}

pub(crate) enum InternalStepper {
    Rk4(RK4<f64>),
    Tsit5(Tsit5<f64>),
}

impl InternalStepper {
    pub(crate) fn step(
        &mut self,
        field: &impl VectorField<f64>,
        p: &[f64],
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) {
        match self {
            InternalStepper::Rk4(s) => s.step(field, p, t, state, dt),
            InternalStepper::Tsit5(s) => s.step(field, p, t, state, dt),
        }
    }
}

/// Integrates from `t0` to `tmax` with fixed step `dt` and returns only
/// the state at the horizon; intermediate samples are never stored. The
/// final step is shortened so the trajectory lands exactly on `tmax`.
///
/// Returns `None` as soon as any state component stops being finite (a
/// NaN or infinite derivative poisons the step and is detected the same
/// way), so a diverging trajectory reports failure instead of garbage.
/// Callers are expected to validate `dt > 0` and `tmax > t0`.
pub fn terminal_state(
    field: &impl VectorField<f64>,
    params: &[f64],
    stepper: Stepper,
    x0: &[f64],
    t0: f64,
    tmax: f64,
    dt: f64,
) -> Option<Vec<f64>> {
    if !x0.iter().all(|v| v.is_finite()) {
        return None;
    }

    let mut state = x0.to_vec();
    let mut t = t0;
    let mut internal = stepper.build(state.len());
    let steps = ((tmax - t0) / dt).ceil() as usize;

    for _ in 0..steps {
        let step = dt.min(tmax - t);
        if step <= 0.0 {
            break;
        }
        internal.step(field, params, &mut t, &mut state, step);
        if !state.iter().all(|v| v.is_finite()) {
            return None;
        }
    }

    Some(state)
}

/// A sampled orbit: `states` is row-major, one `dim`-length row per entry
/// of `times`.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    pub dim: usize,
    pub times: Vec<f64>,
    pub states: Vec<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn state(&self, idx: usize) -> &[f64] {
        &self.states[idx * self.dim..(idx + 1) * self.dim]
    }

    /// One coordinate of the orbit as a contiguous series (e.g. for a
    /// power spectrum).
    pub fn coordinate(&self, coord: usize) -> Vec<f64> {
        (0..self.len()).map(|i| self.state(i)[coord]).collect()
    }
}

/// Integrates from `t0` to `tmax` with fixed step `dt`, recording the
/// state after every step (plus the initial condition). Unlike
/// [`terminal_state`], divergence is a hard error here: the caller asked
/// for the whole orbit.
pub fn sample_trajectory(
    field: &impl VectorField<f64>,
    params: &[f64],
    stepper: Stepper,
    x0: &[f64],
    t0: f64,
    tmax: f64,
    dt: f64,
) -> Result<Trajectory> {
    let dim = field.dimension();
    if x0.is_empty() {
        bail!("Initial state must have positive dimension.");
    }
    if x0.len() != dim {
        bail!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            dim,
            x0.len()
        );
    }
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Step size dt must be positive and finite.");
    }
    if !tmax.is_finite() || !t0.is_finite() || tmax <= t0 {
        bail!("Time span requires finite t0 and tmax with tmax > t0.");
    }

    let mut state = x0.to_vec();
    let mut t = t0;
    let mut internal = stepper.build(dim);
    let steps = ((tmax - t0) / dt).ceil() as usize;

    let mut trajectory = Trajectory {
        dim,
        times: Vec::with_capacity(steps + 1),
        states: Vec::with_capacity((steps + 1) * dim),
    };
    trajectory.times.push(t);
    trajectory.states.extend_from_slice(&state);

    for _ in 0..steps {
        let step = dt.min(tmax - t);
        if step <= 0.0 {
            break;
        }
        internal.step(field, params, &mut t, &mut state, step);
        if !state.iter().all(|v| v.is_finite()) {
            bail!("Trajectory diverged (non-finite state) at t = {t}.");
        }
        trajectory.times.push(t);
        trajectory.states.extend_from_slice(&state);
    }

    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::{sample_trajectory, terminal_state, Stepper};
    use crate::traits::VectorField;

    struct Decay;

    impl VectorField<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn eval(&self, _t: f64, x: &[f64], p: &[f64], out: &mut [f64]) {
            out[0] = p[0] * x[0];
        }
    }

    struct Blowup;

    impl VectorField<f64> for Blowup {
        fn dimension(&self) -> usize {
            1
        }

        fn eval(&self, _t: f64, _x: &[f64], _p: &[f64], out: &mut [f64]) {
            out[0] = f64::NAN;
        }
    }

    #[test]
    fn terminal_state_lands_exactly_on_the_horizon() {
        // 0.7 is not a multiple of 0.2; the last step must be shortened.
        let end = terminal_state(&Decay, &[-1.0], Stepper::Rk4, &[1.0], 0.0, 0.7, 0.2)
            .expect("trajectory should stay finite");
        let expected = (-0.7f64).exp();
        assert!((end[0] - expected).abs() < 1e-4);
    }

    #[test]
    fn terminal_state_reports_divergence_as_none() {
        assert!(terminal_state(&Blowup, &[], Stepper::Rk4, &[1.0], 0.0, 1.0, 0.1).is_none());
    }

    #[test]
    fn terminal_state_rejects_non_finite_seed() {
        assert!(
            terminal_state(&Decay, &[-1.0], Stepper::Rk4, &[f64::NAN], 0.0, 1.0, 0.1).is_none()
        );
    }

    #[test]
    fn sample_trajectory_records_every_step() {
        let orbit = sample_trajectory(&Decay, &[-1.0], Stepper::Tsit5, &[1.0], 0.0, 1.0, 0.1)
            .expect("trajectory should compute");
        assert_eq!(orbit.len(), 11);
        assert!((orbit.times[0] - 0.0).abs() < 1e-15);
        assert!((*orbit.times.last().unwrap() - 1.0).abs() < 1e-12);
        assert!((orbit.state(10)[0] - (-1.0f64).exp()).abs() < 1e-6);
        let xs = orbit.coordinate(0);
        assert_eq!(xs.len(), 11);
        assert!(xs.windows(2).all(|w| w[1] < w[0]), "decay must be monotone");
    }

    #[test]
    fn sample_trajectory_rejects_invalid_inputs() {
        let err = sample_trajectory(&Decay, &[-1.0], Stepper::Rk4, &[1.0], 0.0, 1.0, 0.0)
            .expect_err("zero dt should fail");
        assert!(format!("{err}").contains("dt must be positive"));

        let err = sample_trajectory(&Decay, &[-1.0], Stepper::Rk4, &[1.0, 2.0], 0.0, 1.0, 0.1)
            .expect_err("dimension mismatch should fail");
        assert!(format!("{err}").contains("dimension mismatch"));
    }

    #[test]
    fn sample_trajectory_errors_on_divergence() {
        let err = sample_trajectory(&Blowup, &[], Stepper::Rk4, &[1.0], 0.0, 1.0, 0.1)
            .expect_err("NaN derivative should fail");
        assert!(format!("{err}").contains("diverged"));
    }
}
