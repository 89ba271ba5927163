//! Cross-worker reduction seam.
//!
//! The training loop never talks to a collective-communication library directly.
//! It only needs to sum a handful of scalars across workers, once per batch for
//! logging and once per epoch for the final averages, so that is all this trait asks for.

use std::collections::BTreeMap;

/// A group of cooperating training processes.
pub trait ProcessGroup: Send + Sync {
    /// Number of participating workers.
    fn world_size(&self) -> usize;

    /// Index of this worker in `0..world_size()`.
    fn rank(&self) -> usize;

    /// Sum `values` element-wise across all workers, in place.
    ///
    /// Blocks until every worker has contributed.
    fn all_reduce_sum(&self, values: &mut [f64]);

    fn is_main_process(&self) -> bool {
        self.rank() == 0
    }
}

/// The single-process group. Reductions are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn world_size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) {}
}

/// Reduce a name → value mapping across workers.
///
/// With `average` the sums are divided by the world size. Keys are reduced in
/// sorted order so every worker lines up the same slots.
pub fn reduce_dict(
    values: &BTreeMap<String, f64>,
    group: &dyn ProcessGroup,
    average: bool,
) -> BTreeMap<String, f64> {
    let world_size = group.world_size();
    if world_size < 2 {
        return values.clone();
    }

    let mut flat: Vec<f64> = values.values().copied().collect();
    group.all_reduce_sum(&mut flat);
    if average {
        for v in &mut flat {
            *v /= world_size as f64;
        }
    }

    values.keys().cloned().zip(flat).collect()
}
