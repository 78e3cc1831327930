use crate::flow::Stepper;
use crate::traits::VectorField;
use anyhow::{bail, Result};

/// Estimates the largest Lyapunov exponent by the two-trajectory
/// (Benettin) method: a fiducial orbit and a companion offset by `d0`
/// are integrated side by side; every `renorm_interval` time units the
/// separation is measured, its log-growth accumulated, and the
/// companion pulled back to distance `d0` along the current separation
/// direction. The estimate is the accumulated log divided by the total
/// time.
///
/// The method needs no Jacobian, which is what makes it usable with an
/// opaque vector field; the price is slower convergence than
/// tangent-space variants, so expect to need many renormalizations.
pub fn largest_lyapunov_exponent(
    field: &impl VectorField<f64>,
    params: &[f64],
    stepper: Stepper,
    x0: &[f64],
    t0: f64,
    d0: f64,
    renorm_interval: f64,
    renorms: usize,
    dt: f64,
) -> Result<f64> {
    let dim = field.dimension();
    if x0.is_empty() || x0.len() != dim {
        bail!("Initial state must match the field dimension {dim}.");
    }
    if !(d0 > 0.0) || !d0.is_finite() {
        bail!("Initial separation d0 must be positive and finite.");
    }
    if !(renorm_interval > 0.0) || !renorm_interval.is_finite() {
        bail!("Renormalization interval must be positive and finite.");
    }
    if renorms == 0 {
        bail!("At least one renormalization window is required.");
    }
    if !(dt > 0.0) || !dt.is_finite() {
        bail!("Step size dt must be positive and finite.");
    }

    let mut fiducial = x0.to_vec();
    let mut companion = x0.to_vec();
    companion[0] += d0;

    let mut stepper_a = stepper.build(dim);
    let mut stepper_b = stepper.build(dim);
    let mut accum = 0.0;

    for window in 0..renorms {
        let start = t0 + window as f64 * renorm_interval;
        let end = start + renorm_interval;
        let mut ta = start;
        let mut tb = start;
        let steps = (renorm_interval / dt).ceil() as usize;

        for _ in 0..steps {
            let step = dt.min(end - ta);
            if step <= 0.0 {
                break;
            }
            stepper_a.step(field, params, &mut ta, &mut fiducial, step);
            stepper_b.step(field, params, &mut tb, &mut companion, step);
        }
        if !fiducial.iter().all(|v| v.is_finite()) || !companion.iter().all(|v| v.is_finite()) {
            bail!("Trajectory diverged (non-finite state) during window {window}.");
        }

        let mut dist_sq = 0.0;
        for i in 0..dim {
            let diff = companion[i] - fiducial[i];
            dist_sq += diff * diff;
        }
        let dist = dist_sq.sqrt();
        if dist <= 0.0 || !dist.is_finite() {
            bail!("Separation collapsed to zero in window {window}; exponent is undefined.");
        }

        accum += (dist / d0).ln();

        let scale = d0 / dist;
        for i in 0..dim {
            companion[i] = fiducial[i] + (companion[i] - fiducial[i]) * scale;
        }
    }

    Ok(accum / (renorms as f64 * renorm_interval))
}
