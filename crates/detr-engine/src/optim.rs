use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
    LearningRate,
};

/// A burn [`Optimizer`] together with the learning rate it is stepped with.
///
/// Burn optimizers take the learning rate per step; this keeps the current
/// value next to the optimizer so the loop can both apply and log it.
#[derive(Debug, Clone)]
pub struct TrainOptimizer<O> {
    optimizer: O,
    lr: LearningRate,
    steps: usize,
}

impl<O> TrainOptimizer<O> {
    pub const fn new(optimizer: O, lr: LearningRate) -> Self {
        Self {
            optimizer,
            lr,
            steps: 0,
        }
    }

    pub const fn lr(&self) -> LearningRate {
        self.lr
    }

    /// Change the learning rate used from the next step on.
    pub fn set_lr(&mut self, lr: LearningRate) {
        self.lr = lr;
    }

    /// Number of steps applied so far.
    pub const fn steps(&self) -> usize {
        self.steps
    }

    pub const fn inner(&self) -> &O {
        &self.optimizer
    }

    pub fn into_inner(self) -> O {
        self.optimizer
    }

    /// Apply `grads` to `module` at the current learning rate.
    pub fn step<B, M>(&mut self, module: M, grads: GradientsParams) -> M
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        self.steps += 1;
        self.optimizer.step(self.lr, module, grads)
    }
}
