//! Adam optimizer.

use crate::optim::{Optimizer, ParamView};

/// Adam with bias correction and no weight decay.
///
/// The first/second moment buffers live for the whole run: they are created
/// lazily on the first step (one per parameter position) and carried across
/// epochs. They are not part of saved checkpoints.
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: u64,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    /// Adam with β1 = 0.9, β2 = 0.999, ε = 1e-8.
    pub fn new(lr: f64) -> Self {
        Self::with_params(lr, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(lr: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self { lr, beta1, beta2, epsilon, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Number of updates applied so far.
    pub fn step_count(&self) -> u64 {
        self.t
    }

    fn ensure_moments(&mut self, params: &[ParamView<'_>]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| vec![0.0; p.values.len()]).collect();
            self.v = params.iter().map(|p| vec![0.0; p.values.len()]).collect();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [ParamView<'_>]) {
        self.ensure_moments(params);
        self.t += 1;

        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for ((param, m), v) in params.iter_mut().zip(&mut self.m).zip(&mut self.v) {
            for (((theta, &g), m_i), v_i) in param
                .values
                .iter_mut()
                .zip(param.grads)
                .zip(m.iter_mut())
                .zip(v.iter_mut())
            {
                *m_i = self.beta1 * *m_i + (1.0 - self.beta1) * g;
                *v_i = self.beta2 * *v_i + (1.0 - self.beta2) * g * g;
                let m_hat = *m_i / bias1;
                let v_hat = *v_i / bias2;
                *theta -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}
