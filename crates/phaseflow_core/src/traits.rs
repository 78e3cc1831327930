use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A continuous-time vector field dx/dt = f(t, x, p).
///
/// The evaluation signature is fixed: time, state, parameter vector,
/// output buffer. The parameter vector is opaque to everything in this
/// crate and is handed through to `eval` unchanged on every call.
pub trait VectorField<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// p: parameter vector
    /// out: buffer to write the result (dx/dt)
    fn eval(&self, t: T, x: &[T], p: &[T], out: &mut [T]);
}

/// Adapts a closure with the exact `(t, x, p, out)` signature into a
/// [`VectorField`] of a stated dimension. Anything with another calling
/// convention has to be wrapped by hand, which is the point.
pub struct FnField<F> {
    dim: usize,
    f: F,
}

impl<F> FnField<F> {
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<T: Scalar, F: Fn(T, &[T], &[T], &mut [T])> VectorField<T> for FnField<F> {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn eval(&self, t: T, x: &[T], p: &[T], out: &mut [T]) {
        (self.f)(t, x, p, out)
    }
}

/// A trait for integrators that can step a vector field forward.
pub trait Integrator<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(
        &mut self,
        field: &impl VectorField<T>,
        p: &[T],
        t: &mut T,
        state: &mut [T],
        dt: T,
    );
}

#[cfg(test)]
mod tests {
    use super::{FnField, VectorField};

    #[test]
    fn fn_field_forwards_time_state_and_params() {
        let field = FnField::new(2, |t: f64, x: &[f64], p: &[f64], out: &mut [f64]| {
            out[0] = p[0] * x[1];
            out[1] = t - x[0];
        });
        let mut out = [0.0; 2];
        field.eval(3.0, &[1.0, 2.0], &[10.0], &mut out);
        assert_eq!(field.dimension(), 2);
        assert!((out[0] - 20.0).abs() < 1e-15);
        assert!((out[1] - 2.0).abs() < 1e-15);
    }
}
