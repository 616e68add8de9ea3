//! The `Integrand` trait, which defines the function to be integrated.

/// A trait representing a function to be integrated.
///
/// Users of the library must implement this trait for their function.
pub trait Integrand {
    /// Returns the number of dimensions of the integration space.
    fn dim(&self) -> usize;

    /// Evaluates the function at a given point `x` of the integration domain.
    ///
    /// Non-finite return values are treated as zero by the driver.
    fn eval(&self, x: &[f64]) -> f64;
}

impl<F: Integrand + ?Sized> Integrand for &F {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn eval(&self, x: &[f64]) -> f64 {
        (**self).eval(x)
    }
}
