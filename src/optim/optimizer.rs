use serde::{Deserialize, Serialize};

use crate::optim::{adam::Adam, sgd::Sgd};

/// Mutable view of one parameter tensor and its accumulated gradient.
pub struct ParamView<'a> {
    pub values: &'a mut [f64],
    pub grads: &'a [f64],
}

/// Applies one update to every parameter of a model.
///
/// Parameters are always presented in the same order, so stateful optimizers
/// may key their buffers by position.
pub trait Optimizer {
    fn step(&mut self, params: &mut [ParamView<'_>]);

    fn learning_rate(&self) -> f64;

    fn name(&self) -> &'static str;
}

/// Which optimizer a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn step(&mut self, params: &mut [ParamView<'_>]) {
        (**self).step(params)
    }

    fn learning_rate(&self) -> f64 {
        (**self).learning_rate()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
