//! What happens when training diverges.

use std::collections::BTreeMap;

/// Called when the combined training loss is NaN or infinite.
///
/// The method never returns: a diverged run cannot be resumed from within the
/// epoch, and no optimiser step may follow.
pub trait DivergenceHandler: Send + Sync {
    fn diverged(&self, loss: f64, reduced: &BTreeMap<String, f64>) -> !;
}

/// Print the diagnosis and exit the process with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitOnDivergence;

impl DivergenceHandler for ExitOnDivergence {
    fn diverged(&self, loss: f64, reduced: &BTreeMap<String, f64>) -> ! {
        tracing::error!(loss, ?reduced, "loss is not finite, stopping training");
        eprintln!("Loss is {loss}, stopping training");
        eprintln!("{reduced:?}");
        std::process::exit(1)
    }
}
