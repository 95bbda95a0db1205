//! Adam optimiser over flat parameter buffers.
//!
//! ```text
//! m_t = β₁ m_{t-1} + (1 − β₁) g_t
//! v_t = β₂ v_{t-1} + (1 − β₂) g_t²
//! θ_t = θ_{t-1} − α · m̂_t / (√v̂_t + ε),   m̂_t = m_t / (1 − β₁ᵗ),  v̂_t = v_t / (1 − β₂ᵗ)
//! ```
//!
//! No weight decay: regularisation is part of the loss.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Option<Vec<f64>>,
    v: Option<Vec<f64>>,
    t: usize,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: None,
            v: None,
            t: 0,
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn steps(&self) -> usize {
        self.t
    }

    /// Update `params` in place. Moment buffers are sized on first use.
    pub fn step(&mut self, params: &mut [f64], gradients: &[f64]) {
        assert_eq!(
            params.len(),
            gradients.len(),
            "parameter and gradient lengths differ"
        );
        let n = params.len();
        if self.m.as_ref().map(|m| m.len()) != Some(n) {
            self.m = Some(vec![0.0; n]);
            self.v = Some(vec![0.0; n]);
            self.t = 0;
        }
        self.t += 1;

        let (b1, b2) = (self.beta1, self.beta2);
        let bias1 = 1.0 - b1.powi(self.t as i32);
        let bias2 = 1.0 - b2.powi(self.t as i32);

        if let (Some(m), Some(v)) = (self.m.as_mut(), self.v.as_mut()) {
            for i in 0..n {
                let g = gradients[i];
                m[i] = b1 * m[i] + (1.0 - b1) * g;
                v[i] = b2 * v[i] + (1.0 - b2) * g * g;
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                params[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }

    pub fn reset(&mut self) {
        self.m = None;
        self.v = None;
        self.t = 0;
    }
}
