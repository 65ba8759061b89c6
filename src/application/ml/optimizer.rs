//! Adam (Adaptive Moment Estimation) over the LSTM parameter set.

use super::lstm::{LstmGradients, LstmParams};
use ndarray::{Array, Dimension, Zip};

/// Adam with the usual defaults (beta1 0.9, beta2 0.999, eps 1e-8).
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    m: LstmGradients,
    v: LstmGradients,
}

impl Adam {
    pub fn new(learning_rate: f64, params: &LstmParams) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m: LstmParams::zeros_like(params),
            v: LstmParams::zeros_like(params),
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Applies one update to every parameter tensor.
    pub fn step(&mut self, params: &mut LstmParams, grads: &LstmGradients) {
        self.t += 1;
        let rule = Rule {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            correction1: 1.0 - self.beta1.powi(self.t),
            correction2: 1.0 - self.beta2.powi(self.t),
        };

        rule.apply(
            &mut params.w_input,
            &grads.w_input,
            &mut self.m.w_input,
            &mut self.v.w_input,
        );
        rule.apply(
            &mut params.w_hidden,
            &grads.w_hidden,
            &mut self.m.w_hidden,
            &mut self.v.w_hidden,
        );
        rule.apply(
            &mut params.bias,
            &grads.bias,
            &mut self.m.bias,
            &mut self.v.bias,
        );
        rule.apply(
            &mut params.w_out,
            &grads.w_out,
            &mut self.m.w_out,
            &mut self.v.w_out,
        );
        rule.apply(
            &mut params.b_out,
            &grads.b_out,
            &mut self.m.b_out,
            &mut self.v.b_out,
        );
    }
}

struct Rule {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    correction1: f64,
    correction2: f64,
}

impl Rule {
    fn apply<D: Dimension>(
        &self,
        weights: &mut Array<f64, D>,
        grads: &Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
    ) {
        Zip::from(weights)
            .and(grads)
            .and(m)
            .and(v)
            .for_each(|w, &g, m, v| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / self.correction1;
                let v_hat = *v / self.correction2;
                *w -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
            });
    }
}
