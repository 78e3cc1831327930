pub mod basin;
pub mod direction_field;
pub mod equilibrium;
pub mod flow;
pub mod grid;
pub mod lyapunov;
pub mod nullcline;
pub mod section;
pub mod solvers;
pub mod spectrum;
pub mod sweep;
/// The `phaseflow_core` crate is the numerical engine behind the
/// phaseflow teaching toolkit. Every public operation returns plain data
/// (rasters, geometries, point sets) for an external renderer; nothing
/// here draws.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `VectorField` (the
///   fixed `(t, x, p, out)` evaluation signature), `Integrator` (solvers).
/// - **Solvers**: fixed-step integrators (RK4, Tsit5) behind the
///   `Integrator` seam.
/// - **Basin**: the basin-of-attraction classifier (grid sampling,
///   parallel terminal-state integration, first-match labeling, raster
///   assembly).
/// - **Exploration helpers**: nullclines, fixed points with stability,
///   Poincaré sections, orbit diagrams, Lyapunov estimates, power
///   spectra, direction fields.
pub mod traits;
