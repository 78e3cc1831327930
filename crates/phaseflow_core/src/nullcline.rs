use crate::grid::GridSpec;
use crate::traits::VectorField;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Zero contour of one vector-field component over a 2D window, as line
/// segments: `points` holds (x, y) pairs, `segments` holds pairs of
/// point indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullclineGeometry {
    pub points: Vec<f64>,
    pub segments: Vec<u32>,
}

/// Extracts the `component`-th nullcline (the curve where that
/// derivative component vanishes) over the grid window by marching
/// squares with linear edge interpolation.
///
/// `frozen` is a full-dimension state template: its first two entries
/// are overwritten by the lattice coordinates, the rest (extra phases,
/// slow variables) stay fixed during sampling. The field is evaluated at
/// time `t` throughout.
pub fn compute_nullcline(
    field: &impl VectorField<f64>,
    params: &[f64],
    component: usize,
    grid: &GridSpec,
    t: f64,
    frozen: &[f64],
) -> Result<NullclineGeometry> {
    let dim = field.dimension();
    if dim < 2 {
        bail!("Nullclines need at least a 2-dimensional state space.");
    }
    if component >= dim {
        bail!("Component index {} out of range for dimension {}.", component, dim);
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
    let index = |ix: usize, iy: usize| -> usize { ix + iy * nx };

    let mut values = vec![0.0; nx * ny];
    let mut state = frozen.to_vec();
    let mut deriv = vec![0.0; dim];
    for iy in 0..ny {
        let y = grid.y(iy);
        for ix in 0..nx {
            state[0] = grid.x(ix);
            state[1] = y;
            field.eval(t, &state, params, &mut deriv);
            values[index(ix, iy)] = deriv[component];
        }
    }

    let mut points = Vec::new();
    let mut segments = Vec::new();
    let mut point_count = 0u32;
    for iy in 0..ny.saturating_sub(1) {
        let y0 = grid.y(iy);
        let y1 = grid.y(iy + 1);
        for ix in 0..nx.saturating_sub(1) {
            let x0 = grid.x(ix);
            let x1 = grid.x(ix + 1);
            let v0 = values[index(ix, iy)];
            let v1 = values[index(ix + 1, iy)];
            let v2 = values[index(ix + 1, iy + 1)];
            let v3 = values[index(ix, iy + 1)];

            let mut case_index = 0u8;
            if v0 >= 0.0 {
                case_index |= 1;
            }
            if v1 >= 0.0 {
                case_index |= 2;
            }
            if v2 >= 0.0 {
                case_index |= 4;
            }
            if v3 >= 0.0 {
                case_index |= 8;
            }

            for (edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                let (ax, ay) = interpolate_square_edge(*edge_a, x0, x1, y0, y1, v0, v1, v2, v3);
                let (bx, by) = interpolate_square_edge(*edge_b, x0, x1, y0, y1, v0, v1, v2, v3);
                points.extend([ax, ay]);
                points.extend([bx, by]);
                segments.push(point_count);
                segments.push(point_count + 1);
                point_count += 2;
            }
        }
    }

    Ok(NullclineGeometry { points, segments })
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        0 | 15 => &[],
        1 => &[(3, 0)],
        2 => &[(0, 1)],
        3 => &[(3, 1)],
        4 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 => &[(0, 2)],
        7 => &[(3, 2)],
        8 => &[(2, 3)],
        9 => &[(0, 2)],
        10 => &[(0, 3), (1, 2)],
        11 => &[(1, 2)],
        12 => &[(1, 3)],
        13 => &[(0, 1)],
        14 => &[(3, 0)],
        _ => &[],
    }
}

fn interpolate_square_edge(
    edge: u8,
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    v0: f64,
    v1: f64,
    v2: f64,
    v3: f64,
) -> (f64, f64) {
    match edge {
        0 => {
            let t = interpolate_factor(v0, v1);
            (x0 + (x1 - x0) * t, y0)
        }
        1 => {
            let t = interpolate_factor(v1, v2);
            (x1, y0 + (y1 - y0) * t)
        }
        2 => {
            let t = interpolate_factor(v2, v3);
            (x1 + (x0 - x1) * t, y1)
        }
        3 => {
            let t = interpolate_factor(v3, v0);
            (x0, y1 + (y0 - y1) * t)
        }
        _ => (x0, y0),
    }
}

pub(crate) fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}
