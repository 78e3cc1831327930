use crate::traits::VectorField;
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

/// Linearized stability of a fixed point, read off the Jacobian
/// spectrum. Real parts within `SPECTRAL_EPS` of zero count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    StableNode,
    StableSpiral,
    UnstableNode,
    UnstableSpiral,
    Saddle,
    Center,
    /// Some eigenvalue sits on the imaginary axis without forming a pure
    /// center spectrum; linearization alone cannot decide.
    Marginal,
}

const SPECTRAL_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Serialize)]
pub struct FixedPoint {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major dim x dim Jacobian at the fixed point.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex64>,
    pub stability: Stability,
}

/// Finds a zero of the vector field near `initial_guess` by damped
/// Newton iteration at frozen time `t`, then classifies its linearized
/// stability.
///
/// The Jacobian is formed by central finite differences (step
/// `cbrt(eps) * max(1, |x_j|)` per column), solved by LU. A singular
/// Jacobian or a failure to converge within `max_steps` is an error.
pub fn find_fixed_point(
    field: &impl VectorField<f64>,
    params: &[f64],
    t: f64,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<FixedPoint> {
    let dim = field.dimension();
    if dim == 0 {
        bail!("Vector field has zero dimension.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.damping <= 0.0 {
        bail!("damping must be positive.");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive.");
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    field.eval(t, &state, params, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    loop {
        if residual_norm <= settings.tolerance {
            break;
        }

        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let jacobian = fd_jacobian(field, params, t, &state);
        let delta = solve_linear_system(dim, &jacobian, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;

        for i in 0..dim {
            state[i] -= settings.damping * delta[i];
        }

        iterations += 1;
        field.eval(t, &state, params, &mut residual);
        residual_norm = l2_norm(&residual);
    }

    let jacobian = fd_jacobian(field, params, t, &state);
    let eigenvalues = compute_eigenvalues(dim, &jacobian);
    let stability = classify_spectrum(&eigenvalues);

    Ok(FixedPoint {
        state,
        residual_norm,
        iterations,
        jacobian,
        eigenvalues,
        stability,
    })
}

/// Central-difference Jacobian, row-major.
fn fd_jacobian(field: &impl VectorField<f64>, params: &[f64], t: f64, x: &[f64]) -> Vec<f64> {
    let dim = x.len();
    let mut jacobian = vec![0.0; dim * dim];
    let mut forward = vec![0.0; dim];
    let mut backward = vec![0.0; dim];
    let mut probe = x.to_vec();

    for j in 0..dim {
        let h = f64::EPSILON.cbrt() * x[j].abs().max(1.0);
        probe[j] = x[j] + h;
        field.eval(t, &probe, params, &mut forward);
        probe[j] = x[j] - h;
        field.eval(t, &probe, params, &mut backward);
        probe[j] = x[j];

        for i in 0..dim {
            jacobian[i * dim + j] = (forward[i] - backward[i]) / (2.0 * h);
        }
    }

    jacobian
}

fn solve_linear_system(dim: usize, jacobian: &[f64], residual: &[f64]) -> Result<Vec<f64>> {
    let j_matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let rhs = DVector::from_column_slice(residual);
    j_matrix
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().cloned().collect())
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

fn compute_eigenvalues(dim: usize, jacobian: &[f64]) -> Vec<Complex64> {
    let matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    matrix.complex_eigenvalues().iter().cloned().collect()
}

fn classify_spectrum(eigenvalues: &[Complex64]) -> Stability {
    let on_axis = eigenvalues.iter().any(|e| e.re.abs() <= SPECTRAL_EPS);
    if on_axis {
        let pure_center = eigenvalues
            .iter()
            .all(|e| e.re.abs() <= SPECTRAL_EPS && e.im.abs() > SPECTRAL_EPS);
        return if pure_center {
            Stability::Center
        } else {
            Stability::Marginal
        };
    }

    let any_positive = eigenvalues.iter().any(|e| e.re > 0.0);
    let any_negative = eigenvalues.iter().any(|e| e.re < 0.0);
    if any_positive && any_negative {
        return Stability::Saddle;
    }

    let rotating = eigenvalues.iter().any(|e| e.im.abs() > SPECTRAL_EPS);
    match (any_negative, rotating) {
        (true, true) => Stability::StableSpiral,
        (true, false) => Stability::StableNode,
        (false, true) => Stability::UnstableSpiral,
        (false, false) => Stability::UnstableNode,
    }
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
