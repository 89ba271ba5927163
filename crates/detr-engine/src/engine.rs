use std::sync::Arc;

use detr_metric::{ProcessGroup, SingleProcess};

use crate::{
    config::EngineConfig,
    divergence::{DivergenceHandler, ExitOnDivergence},
    error::EngineResult,
    visualize::MaskVisualizer,
};

/// Runs training epochs and evaluation passes.
///
/// Holds everything the loops need besides the model, criterion, data and
/// optimizer: the settings, the worker group used for metric reduction, and
/// the policy applied when the loss diverges.
#[derive(Clone)]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) group: Arc<dyn ProcessGroup>,
    pub(crate) on_divergence: Arc<dyn DivergenceHandler>,
}

impl Engine {
    /// A single-process engine that exits the process when the loss diverges.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            group: Arc::new(SingleProcess),
            on_divergence: Arc::new(ExitOnDivergence),
        })
    }

    pub fn with_process_group(mut self, group: Arc<dyn ProcessGroup>) -> Self {
        self.group = group;
        self
    }

    pub fn with_divergence_handler(mut self, handler: Arc<dyn DivergenceHandler>) -> Self {
        self.on_divergence = handler;
        self
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn process_group(&self) -> &dyn ProcessGroup {
        self.group.as_ref()
    }

    pub fn visualizer(&self) -> EngineResult<MaskVisualizer> {
        MaskVisualizer::new(&self.config)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("world_size", &self.group.world_size())
            .field("rank", &self.group.rank())
            .finish_non_exhaustive()
    }
}
