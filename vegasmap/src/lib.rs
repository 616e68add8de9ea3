//! `vegasmap` is the adaptive importance-sampling map of the VEGAS algorithm.
//!
//! An [`AdaptiveMap`] maps uniform random numbers onto a grid whose bins
//! shrink where the integrand is large. Training data collected while
//! sampling is turned into a refined grid by [`AdaptiveMap::adapt`]. Training
//! data of several threads or processes is merged before adapting, and the
//! resulting grid can be persisted and restored.
//!
//! [`SplitMap`] is an alternative histogram that refines itself by splitting
//! individual bins, and [`Vegas`] is a small integrator built on top of the map.

pub mod accumulator;
pub mod adapt;
pub mod config;
pub mod error;
pub mod grid;
pub mod integrand;
pub mod map;
pub mod mapper;
pub mod persist;
pub mod split;
pub mod vegas;

#[cfg(feature = "mpi")]
pub mod mpi;

pub use accumulator::Accumulator;
pub use config::VegasConfig;
pub use error::{MapError, Result};
pub use grid::{Axis, Grid};
pub use integrand::Integrand;
pub use map::{AdaptiveMap, SamplePoint};
pub use mapper::{Boundaries, Chain, Mapper};
pub use split::{Split, SplitMap};
pub use vegas::{Vegas, VegasResult};
