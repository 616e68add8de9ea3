//! A small interface for maps from the unit hypercube onto an integration domain.

use crate::error::{MapError, Result};
use crate::grid::{validate_edges, Grid};

/// A map from uniform random numbers onto points of an integration domain.
///
/// Both directions return the weight (jacobian) of the forward map at the
/// point in question.
pub trait Mapper {
    /// Number of dimensions of both the random numbers and the points.
    fn dims(&self) -> usize;

    /// Maps `rans` from the unit hypercube onto `point`.
    fn generate_point(&self, rans: &[f64], point: &mut [f64]) -> Result<f64>;

    /// Recovers the random numbers `rans` that map onto `point`.
    fn generate_weight(&self, point: &[f64], rans: &mut [f64]) -> Result<f64>;
}

impl Mapper for Grid {
    fn dims(&self) -> usize {
        Grid::dims(self)
    }

    fn generate_point(&self, rans: &[f64], point: &mut [f64]) -> Result<f64> {
        self.check_unit(rans)?;
        check_len(self.dims(), point.len())?;

        let mut bins = vec![0; self.dims()];
        Ok(self.map_into(rans, point, &mut bins))
    }

    fn generate_weight(&self, point: &[f64], rans: &mut [f64]) -> Result<f64> {
        self.invert_into(point, rans)
    }
}

/// Affine rescaling of the unit hypercube onto a box.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundaries {
    limits: Vec<(f64, f64)>,
    volume: f64,
}

impl Boundaries {
    /// Creates the map onto the box with the given `(min, max)` limits.
    pub fn new(limits: &[(f64, f64)]) -> Result<Self> {
        if limits.is_empty() {
            return Err(MapError::ZeroDimensions);
        }
        for (dim, &(min, max)) in limits.iter().enumerate() {
            validate_edges(dim, &[min, max])?;
        }

        Ok(Self {
            limits: limits.to_vec(),
            volume: limits.iter().map(|(min, max)| max - min).product(),
        })
    }

    /// The unit hypercube itself.
    pub fn unit(dims: usize) -> Result<Self> {
        Self::new(&vec![(0.0, 1.0); dims])
    }

    pub fn limits(&self) -> &[(f64, f64)] {
        &self.limits
    }

    /// The volume of the box, which is also the constant weight of the map.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Rescales `unit` onto `x` without any checks.
    pub fn rescale_into(&self, unit: &[f64], x: &mut [f64]) -> f64 {
        for ((&(min, max), &y), x) in self.limits.iter().zip(unit).zip(x) {
            *x = min + y * (max - min);
        }

        self.volume
    }
}

impl Mapper for Boundaries {
    fn dims(&self) -> usize {
        self.limits.len()
    }

    fn generate_point(&self, rans: &[f64], point: &mut [f64]) -> Result<f64> {
        check_len(self.dims(), rans.len())?;
        check_len(self.dims(), point.len())?;
        if let Some(dim) = rans.iter().position(|y| !(0.0..=1.0).contains(y)) {
            return Err(MapError::OutOfUnitInterval {
                dim,
                value: rans[dim],
            });
        }

        Ok(self.rescale_into(rans, point))
    }

    fn generate_weight(&self, point: &[f64], rans: &mut [f64]) -> Result<f64> {
        check_len(self.dims(), point.len())?;
        check_len(self.dims(), rans.len())?;

        for (dim, ((&(min, max), &x), y)) in self.limits.iter().zip(point).zip(rans).enumerate() {
            if !(min..=max).contains(&x) {
                return Err(MapError::OutOfDomain {
                    dim,
                    value: x,
                    min,
                    max,
                });
            }
            *y = (x - min) / (max - min);
        }

        Ok(self.volume)
    }
}

/// Two mappers applied one after the other: the points of `first` are the
/// random numbers of `second`, and the weights multiply.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: Mapper, B: Mapper> Chain<A, B> {
    pub fn new(first: A, second: B) -> Result<Self> {
        check_len(first.dims(), second.dims())?;
        Ok(Self { first, second })
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

impl<A: Mapper, B: Mapper> Mapper for Chain<A, B> {
    fn dims(&self) -> usize {
        self.first.dims()
    }

    fn generate_point(&self, rans: &[f64], point: &mut [f64]) -> Result<f64> {
        let mut inner = vec![0.0; self.dims()];
        let w1 = self.first.generate_point(rans, &mut inner)?;
        let w2 = self.second.generate_point(&inner, point)?;
        Ok(w1 * w2)
    }

    fn generate_weight(&self, point: &[f64], rans: &mut [f64]) -> Result<f64> {
        let mut inner = vec![0.0; self.dims()];
        let w2 = self.second.generate_weight(point, &mut inner)?;
        let w1 = self.first.generate_weight(&inner, rans)?;
        Ok(w1 * w2)
    }
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(MapError::DimensionMismatch { expected, got })
    }
}
