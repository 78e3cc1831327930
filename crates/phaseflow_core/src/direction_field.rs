use crate::grid::GridSpec;
use crate::traits::VectorField;
use anyhow::{bail, Result};
use serde::Serialize;

/// Direction-field samples over a 2D window: `positions` holds (x, y)
/// lattice coordinates and `vectors` the (dx/dt, dy/dt) derivative at
/// each, aligned pairwise, x varying fastest.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionField {
    pub nx: usize,
    pub ny: usize,
    pub positions: Vec<f64>,
    pub vectors: Vec<f64>,
}

/// Evaluates the vector field at every lattice point of the window:
/// the data behind an arrow plot. `frozen` is a full-dimension state
/// template whose first two entries are overwritten by the lattice
/// coordinates; the derivative is projected onto the first two
/// components.
pub fn sample_direction_field(
    field: &impl VectorField<f64>,
    params: &[f64],
    grid: &GridSpec,
    t: f64,
    frozen: &[f64],
) -> Result<DirectionField> {
    let dim = field.dimension();
    if dim < 2 {
        bail!("Direction fields need at least a 2-dimensional state space.");
    }
    if frozen.len() != dim {
        bail!(
            "Frozen state length ({}) does not match field dimension ({}).",
            frozen.len(),
            dim
        );
    }
    if !grid.is_valid() {
        bail!("Grid window must have finite limits with max > min and positive delta.");
    }

    let nx = grid.nx();
    let ny = grid.ny();
    let mut positions = Vec::with_capacity(nx * ny * 2);
    let mut vectors = Vec::with_capacity(nx * ny * 2);
    let mut state = frozen.to_vec();
    let mut deriv = vec![0.0; dim];

    for iy in 0..ny {
        let y = grid.y(iy);
        for ix in 0..nx {
            let x = grid.x(ix);
            state[0] = x;
            state[1] = y;
            field.eval(t, &state, params, &mut deriv);
            positions.extend([x, y]);
            vectors.extend([deriv[0], deriv[1]]);
        }
    }

    Ok(DirectionField {
        nx,
        ny,
        positions,
        vectors,
    })
}
