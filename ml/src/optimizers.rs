use ndarray::{ArrayD, Zip};

use crate::{layers::ParameterMut, WeightPrecision};

/// Adam as described in Kingma & Ba, 2014, https://arxiv.org/abs/1412.6980,
/// in the formulation keras uses (epsilon outside of the bias correction).
pub struct Adam {
    pub learning_rate: WeightPrecision,
    pub beta_1: WeightPrecision,
    pub beta_2: WeightPrecision,
    pub epsilon: WeightPrecision,
    iterations: i32,
    /// First and second moment estimate per parameter, created lazily on the first step
    moments: Vec<(ArrayD<WeightPrecision>, ArrayD<WeightPrecision>)>,
}

impl Default for Adam {
    fn default() -> Self {
        Adam::new(0.001)
    }
}

impl Adam {
    pub fn new(learning_rate: WeightPrecision) -> Self {
        Adam {
            learning_rate,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
            iterations: 0,
            moments: Vec::new(),
        }
    }

    pub fn iterations(&self) -> i32 {
        self.iterations
    }

    /// Applies one update step. The parameters have to be passed in the same
    /// order on every call.
    pub fn step(&mut self, mut parameters: Vec<ParameterMut<'_>>) {
        if self.moments.len() != parameters.len() {
            self.moments = parameters
                .iter()
                .map(|p| (ArrayD::zeros(p.value.raw_dim()), ArrayD::zeros(p.value.raw_dim())))
                .collect();
        }
        self.iterations += 1;

        let (beta_1, beta_2, epsilon) = (self.beta_1, self.beta_2, self.epsilon);
        let lr = self.learning_rate * (1. - beta_2.powi(self.iterations)).sqrt()
            / (1. - beta_1.powi(self.iterations));

        for (param, (m, v)) in parameters.iter_mut().zip(self.moments.iter_mut()) {
            Zip::from(&mut param.value)
                .and(&param.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta_1 * *m + (1. - beta_1) * g;
                    *v = beta_2 * *v + (1. - beta_2) * g * g;
                    *w -= lr * *m / (v.sqrt() + epsilon);
                });
        }
    }
}
