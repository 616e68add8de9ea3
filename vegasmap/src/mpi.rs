//! Synchronization of adaptive maps across MPI processes.
use mpi::collective::SystemOperation;
use mpi::topology::{Communicator, Rank};
use mpi::traits::*;
use tracing::debug;

use crate::accumulator::Accumulator;
use crate::error::Result;
use crate::grid::Grid;
use crate::map::AdaptiveMap;

impl AdaptiveMap {
    /// Sums the training data of all processes in `world`.
    ///
    /// This method must be called by all processes in the communicator; on
    /// return every process holds the global training data.
    pub fn mpi_sync<C: Communicator>(&mut self, world: &C) -> Result<()> {
        let local = &self.training;
        let mut sums = vec![0.0; local.sums().len()];
        let mut hits = vec![0u64; local.hits().len()];

        world.all_reduce_into(local.sums(), &mut sums[..], SystemOperation::sum());
        world.all_reduce_into(local.hits(), &mut hits[..], SystemOperation::sum());

        self.training = Accumulator::from_parts(local.dims(), local.n_bins(), sums, hits)?;
        debug!(
            rank = world.rank(),
            samples = self.training.samples(),
            "training data synchronized"
        );
        Ok(())
    }

    /// Broadcasts the grid of process `root` and installs it on every other
    /// process, resetting their training data.
    ///
    /// This method must be called by all processes in the communicator.
    pub fn mpi_broadcast_grid<C: Communicator>(&mut self, world: &C, root: Rank) -> Result<()> {
        let process = world.process_at_rank(root);

        let mut shape = [self.dims() as u64, self.bins() as u64];
        process.broadcast_into(&mut shape[..]);
        let (dims, n_bins) = (shape[0] as usize, shape[1] as usize);

        let mut edges = if world.rank() == root {
            self.grid.flat_edges()
        } else {
            vec![0.0; dims * (n_bins + 1)]
        };
        process.broadcast_into(&mut edges[..]);

        if world.rank() == root {
            self.training.reset();
            Ok(())
        } else {
            self.install_grid(Grid::from_flat(dims, n_bins, &edges)?)
        }
    }
}
