use crate::optim::{Optimizer, ParamView};

/// Plain stochastic gradient descent: `θ ← θ - lr · g`.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [ParamView<'_>]) {
        for param in params.iter_mut() {
            for (v, g) in param.values.iter_mut().zip(param.grads) {
                *v -= self.learning_rate * g;
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}
