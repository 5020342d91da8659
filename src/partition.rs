//! Cell partitions and partitioned assembly.
//!
//! Every worker assembles the cells it owns into a full-size residual or Jacobian, and the
//! contributions are summed through a [`Communicator`]. Only a single-node implementation is
//! provided here: [`InProcessCommunicator`] connects worker threads of the same process.
use crate::assembly::buffers::populate_element_dofs;
use crate::assembly::{AssemblyError, SystemAssembler};
use crate::form::WeakForm;
use crate::nalgebra::DVector;
use crate::space::MixedSpace;
use crate::Real;
use log::debug;
use nalgebra_sparse::CsrMatrix;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};

/// Collective operations among a fixed group of workers.
///
/// All workers of a group must call the same collective operations in the same order.
pub trait Communicator<T>: Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Replaces `values` on every worker by the element-wise sum over all workers.
    fn all_reduce_sum(&self, values: &mut [T]);

    /// Collects the values of every worker, in rank order.
    fn gather(&self, values: &[T]) -> Vec<Vec<T>>;
}

/// The trivial group consisting of a single worker.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerialCommunicator;

impl<T: Clone> Communicator<T> for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _values: &mut [T]) {}

    fn gather(&self, values: &[T]) -> Vec<Vec<T>> {
        vec![values.to_vec()]
    }
}

#[derive(Debug)]
struct Exchange<T> {
    slots: Mutex<Vec<Vec<T>>>,
    barrier: Barrier,
}

/// A communicator connecting threads of the same process.
#[derive(Debug, Clone)]
pub struct InProcessCommunicator<T> {
    rank: usize,
    size: usize,
    exchange: Arc<Exchange<T>>,
}

impl<T: Real> InProcessCommunicator<T> {
    /// Creates a connected group of `size` communicators, one per worker.
    ///
    /// Each communicator must be driven by its own thread, since collective operations block
    /// until every worker has joined.
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "A group needs at least one worker");
        let exchange = Arc::new(Exchange {
            slots: Mutex::new(vec![Vec::new(); size]),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                exchange: Arc::clone(&exchange),
            })
            .collect()
    }

    /// Publishes `values`, waits for all workers and reads the published values of the group.
    fn exchange<R>(&self, values: &[T], read: impl FnOnce(&[Vec<T>]) -> R) -> R {
        {
            let mut slots = self.exchange.slots.lock();
            slots[self.rank].clear();
            slots[self.rank].extend_from_slice(values);
        }
        self.exchange.barrier.wait();
        let result = read(&self.exchange.slots.lock());
        // Nobody may publish again before everybody has read
        self.exchange.barrier.wait();
        result
    }
}

impl<T: Real> Communicator<T> for InProcessCommunicator<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, values: &mut [T]) {
        let local = values.to_vec();
        self.exchange(&local, |contributions| {
            assert!(
                contributions.iter().all(|c| c.len() == values.len()),
                "All workers must reduce buffers of the same length"
            );
            // Summing in rank order gives identical results on every worker
            for (i, value) in values.iter_mut().enumerate() {
                *value = contributions
                    .iter()
                    .fold(T::zero(), |sum, contribution| sum + contribution[i]);
            }
        });
    }

    fn gather(&self, values: &[T]) -> Vec<Vec<T>> {
        self.exchange(values, |contributions| contributions.to_vec())
    }
}

/// Runs `worker` on `size` scoped threads, each with its own member of an in-process group.
///
/// Returns the results in rank order.
pub fn run_in_process<T, R, W>(size: usize, worker: W) -> Vec<R>
where
    T: Real,
    R: Send,
    W: Fn(InProcessCommunicator<T>) -> R + Sync,
{
    let worker = &worker;
    std::thread::scope(|scope| {
        let handles: Vec<_> = InProcessCommunicator::group(size)
            .into_iter()
            .map(|communicator| scope.spawn(move || worker(communicator)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Whether a DOF is owned by the local worker or by another one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Ghost { owner: usize },
    /// Not touched by any cell of the worker.
    Absent,
}

/// The cells and DOFs associated with one worker.
///
/// A DOF is owned by the lowest-ranked worker with an owned cell containing it. Ghost DOFs are
/// DOFs of owned cells that another worker owns, and ghost cells are cells of other workers
/// sharing at least one DOF with the owned cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPartition {
    rank: usize,
    owned_cells: Vec<usize>,
    ghost_cells: Vec<usize>,
    owned_dofs: Vec<usize>,
    ghost_dofs: Vec<(usize, usize)>,
}

impl CellPartition {
    /// Splits the cells of the space into `num_parts` contiguous blocks of nearly equal size.
    ///
    /// Zero-mean multipliers are coupled to every cell and are owned by the first non-empty part.
    pub fn contiguous<T: Real>(space: &MixedSpace<T>, num_parts: usize) -> Vec<Self> {
        assert!(num_parts > 0, "Need at least one part");
        let num_cells = space.num_cells();
        let base = num_cells / num_parts;
        let remainder = num_cells % num_parts;

        let mut cell_owner = Vec::with_capacity(num_cells);
        for part in 0..num_parts {
            let len = base + usize::from(part < remainder);
            cell_owner.extend(std::iter::repeat(part).take(len));
        }

        let mut element_dofs = Vec::with_capacity(num_cells);
        let mut dofs = Vec::new();
        for cell in 0..num_cells {
            populate_element_dofs(space, cell, &mut dofs);
            element_dofs.push(dofs.clone());
        }

        // Parts are contiguous and ascending, so the first encounter is the lowest rank
        let mut dof_owner = vec![usize::MAX; space.system_size()];
        for (cell_dofs, &owner) in element_dofs.iter().zip(&cell_owner) {
            for &dof in cell_dofs {
                if dof_owner[dof] == usize::MAX {
                    dof_owner[dof] = owner;
                }
            }
        }

        let partitions: Vec<_> = (0..num_parts)
            .map(|rank| {
                let owned_cells: Vec<_> = (0..num_cells).filter(|&c| cell_owner[c] == rank).collect();
                let touched: BTreeSet<usize> = owned_cells
                    .iter()
                    .flat_map(|&cell| element_dofs[cell].iter().copied())
                    .collect();
                let ghost_cells = (0..num_cells)
                    .filter(|&c| cell_owner[c] != rank)
                    .filter(|&c| element_dofs[c].iter().any(|dof| touched.contains(dof)))
                    .collect();
                let owned_dofs = touched
                    .iter()
                    .copied()
                    .filter(|&dof| dof_owner[dof] == rank)
                    .collect();
                let ghost_dofs = touched
                    .iter()
                    .filter(|&&dof| dof_owner[dof] != rank)
                    .map(|&dof| (dof, dof_owner[dof]))
                    .collect();
                Self {
                    rank,
                    owned_cells,
                    ghost_cells,
                    owned_dofs,
                    ghost_dofs,
                }
            })
            .collect();

        debug!(
            "Partitioned {} cells into {} parts (ghost DOFs per part: {:?})",
            num_cells,
            num_parts,
            partitions.iter().map(|p| p.ghost_dofs.len()).collect::<Vec<_>>()
        );
        partitions
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn owned_cells(&self) -> &[usize] {
        &self.owned_cells
    }

    pub fn ghost_cells(&self) -> &[usize] {
        &self.ghost_cells
    }

    /// Sorted global indices of the owned DOFs.
    pub fn owned_dofs(&self) -> &[usize] {
        &self.owned_dofs
    }

    /// Sorted global indices of the ghost DOFs, paired with the rank of their owner.
    pub fn ghost_dofs(&self) -> &[(usize, usize)] {
        &self.ghost_dofs
    }

    pub fn ownership(&self, dof: usize) -> Ownership {
        if self.owned_dofs.binary_search(&dof).is_ok() {
            Ownership::Owned
        } else if let Ok(index) = self
            .ghost_dofs
            .binary_search_by_key(&dof, |&(ghost, _)| ghost)
        {
            Ownership::Ghost {
                owner: self.ghost_dofs[index].1,
            }
        } else {
            Ownership::Absent
        }
    }
}

/// Assembles a system on one worker of a group, summing contributions of all workers.
///
/// Every method is a collective operation.
pub struct PartitionedAssembler<'s, 'a, T: Real, F, C> {
    assembler: &'s SystemAssembler<'a, T, F>,
    partition: &'s CellPartition,
    communicator: &'s C,
}

impl<'s, 'a, T, F, C> PartitionedAssembler<'s, 'a, T, F, C>
where
    T: Real,
    F: WeakForm<T>,
    C: Communicator<T>,
{
    pub fn new(assembler: &'s SystemAssembler<'a, T, F>, partition: &'s CellPartition, communicator: &'s C) -> Self {
        assert_eq!(
            partition.rank(),
            communicator.rank(),
            "Partition must belong to the communicator's worker"
        );
        Self {
            assembler,
            partition,
            communicator,
        }
    }

    pub fn partition(&self) -> &CellPartition {
        self.partition
    }

    /// Agrees on whether all workers succeeded, so that either all or none enter a reduction.
    fn synchronize<R>(&self, local: &Result<R, AssemblyError>) -> Result<(), AssemblyError> {
        let flag = if local.is_err() { T::one() } else { T::zero() };
        let flags = self.communicator.gather(&[flag]);
        match flags.iter().position(|flag| flag[0] != T::zero()) {
            // A local failure is reported by the caller
            Some(rank) if local.is_ok() => Err(AssemblyError::WorkerFailed { rank }),
            _ => Ok(()),
        }
    }

    /// The residual over all cells of the group, without constraints applied.
    pub fn residual(&self, u: &DVector<T>) -> Result<DVector<T>, AssemblyError> {
        let local = self
            .assembler
            .residual_for_cells(u, self.partition.owned_cells());
        self.synchronize(&local)?;
        let mut residual = local?;
        self.communicator.all_reduce_sum(residual.as_mut_slice());
        Ok(residual)
    }

    /// The Jacobian over all cells of the group, without constraints applied.
    ///
    /// All workers share the sparsity pattern of the assembler, so only values are reduced.
    pub fn jacobian(&self, u: &DVector<T>) -> Result<CsrMatrix<T>, AssemblyError> {
        let local = self
            .assembler
            .jacobian_for_cells(u, self.partition.owned_cells());
        self.synchronize(&local)?;
        let mut jacobian = local?;
        self.communicator.all_reduce_sum(jacobian.values_mut());
        Ok(jacobian)
    }

    pub fn constrained_residual(&self, u: &DVector<T>) -> Result<DVector<T>, AssemblyError> {
        let mut residual = self.residual(u)?;
        self.assembler.constrain_residual(u, &mut residual);
        Ok(residual)
    }

    pub fn constrained_jacobian(&self, u: &DVector<T>) -> Result<CsrMatrix<T>, AssemblyError> {
        let mut jacobian = self.jacobian(u)?;
        self.assembler.constrain_jacobian(&mut jacobian);
        Ok(jacobian)
    }

    /// Reconstructs a global vector from the owned entries of every worker.
    ///
    /// Entries not owned by any worker are zero.
    pub fn gather_owned(&self, partitions: &[CellPartition], local: &DVector<T>) -> DVector<T> {
        assert_eq!(partitions.len(), self.communicator.size(), "Need the partition of every worker");
        let owned: Vec<_> = self
            .partition
            .owned_dofs()
            .iter()
            .map(|&dof| local[dof])
            .collect();
        let mut global = DVector::zeros(local.len());
        for (partition, values) in partitions.iter().zip(self.communicator.gather(&owned)) {
            for (&dof, value) in partition.owned_dofs().iter().zip(values) {
                global[dof] = value;
            }
        }
        global
    }
}
