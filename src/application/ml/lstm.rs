//! Single-layer LSTM with a linear read-out unit.
//!
//! Gate weights are stacked into one matrix per input in the order
//! input, forget, cell candidate, output. Gradients are exact
//! (backpropagation through time over the whole input window).

use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip, s};
use rand::Rng;

/// Trainable weights of the recurrent layer and the dense output.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmParams {
    /// (4H, D) input → gates
    pub w_input: Array2<f64>,
    /// (4H, H) hidden → gates
    pub w_hidden: Array2<f64>,
    /// (4H)
    pub bias: Array1<f64>,
    /// (H) hidden → output
    pub w_out: Array1<f64>,
    /// (1)
    pub b_out: Array1<f64>,
}

/// Gradients share the exact layout of the parameters they belong to.
pub type LstmGradients = LstmParams;

struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
    h: Array1<f64>,
}

impl LstmParams {
    /// Uniform init in ±1/sqrt(H) with the forget-gate bias at 1.0.
    pub fn new<R: Rng + ?Sized>(input_width: usize, hidden: usize, rng: &mut R) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let mut uniform = |shape: (usize, usize)| {
            Array2::from_shape_fn(shape, |_| rng.random_range(-limit..limit))
        };

        let w_input = uniform((4 * hidden, input_width));
        let w_hidden = uniform((4 * hidden, hidden));
        let w_out = uniform((hidden, 1)).remove_axis(Axis(1));

        let mut bias = Array1::zeros(4 * hidden);
        bias.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            w_input,
            w_hidden,
            bias,
            w_out,
            b_out: Array1::zeros(1),
        }
    }

    pub fn zeros_like(other: &Self) -> Self {
        Self {
            w_input: Array2::zeros(other.w_input.raw_dim()),
            w_hidden: Array2::zeros(other.w_hidden.raw_dim()),
            bias: Array1::zeros(other.bias.raw_dim()),
            w_out: Array1::zeros(other.w_out.raw_dim()),
            b_out: Array1::zeros(other.b_out.raw_dim()),
        }
    }

    pub fn input_width(&self) -> usize {
        self.w_input.ncols()
    }

    pub fn hidden(&self) -> usize {
        self.w_hidden.ncols()
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.w_input += &other.w_input;
        self.w_hidden += &other.w_hidden;
        self.bias += &other.bias;
        self.w_out += &other.w_out;
        self.b_out += &other.b_out;
    }

    pub fn scale(&mut self, factor: f64) {
        self.w_input *= factor;
        self.w_hidden *= factor;
        self.bias *= factor;
        self.w_out *= factor;
        self.b_out *= factor;
    }

    /// L2 norm over every element.
    pub fn norm(&self) -> f64 {
        let sq = |a: f64, v: &f64| a + v * v;
        (self.w_input.iter().fold(0.0, sq)
            + self.w_hidden.iter().fold(0.0, sq)
            + self.bias.iter().fold(0.0, sq)
            + self.w_out.iter().fold(0.0, sq)
            + self.b_out.iter().fold(0.0, sq))
        .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.w_input.iter().all(|v| v.is_finite())
            && self.w_hidden.iter().all(|v| v.is_finite())
            && self.bias.iter().all(|v| v.is_finite())
            && self.w_out.iter().all(|v| v.is_finite())
            && self.b_out.iter().all(|v| v.is_finite())
    }

    /// Runs a window of rows (oldest first) and returns the read-out.
    pub fn forward(&self, sequence: ArrayView2<f64>) -> f64 {
        let hidden = self.hidden();
        let mut h = Array1::zeros(hidden);
        let mut c = Array1::zeros(hidden);
        for x in sequence.rows() {
            let (i, f, g, o) = self.gates(x, &h);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
        }
        self.w_out.dot(&h) + self.b_out[0]
    }

    /// Squared error of one sample and its gradients, with the loss
    /// derivative multiplied by `scale`.
    pub fn sample_gradients(
        &self,
        sequence: ArrayView2<f64>,
        target: f64,
        scale: f64,
    ) -> (f64, LstmGradients) {
        let (output, caches) = self.forward_cached(sequence);
        let error = output - target;
        let grads = self.backward(&caches, 2.0 * error * scale);
        (error * error, grads)
    }

    fn gates(
        &self,
        x: ArrayView1<f64>,
        h_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let hidden = self.hidden();
        let z = self.w_input.dot(&x) + self.w_hidden.dot(h_prev) + &self.bias;
        let i = z.slice(s![0..hidden]).mapv(sigmoid);
        let f = z.slice(s![hidden..2 * hidden]).mapv(sigmoid);
        let g = z.slice(s![2 * hidden..3 * hidden]).mapv(f64::tanh);
        let o = z.slice(s![3 * hidden..4 * hidden]).mapv(sigmoid);
        (i, f, g, o)
    }

    fn forward_cached(&self, sequence: ArrayView2<f64>) -> (f64, Vec<StepCache>) {
        let hidden = self.hidden();
        let mut h: Array1<f64> = Array1::zeros(hidden);
        let mut c: Array1<f64> = Array1::zeros(hidden);
        let mut caches = Vec::with_capacity(sequence.nrows());

        for x in sequence.rows() {
            let (i, f, g, o) = self.gates(x, &h);
            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            caches.push(StepCache {
                x: x.to_owned(),
                h_prev: std::mem::replace(&mut h, h_next.clone()),
                c_prev: std::mem::replace(&mut c, c_next),
                i,
                f,
                g,
                o,
                tanh_c,
                h: h_next,
            });
        }

        (self.w_out.dot(&h) + self.b_out[0], caches)
    }

    fn backward(&self, caches: &[StepCache], d_output: f64) -> LstmGradients {
        let hidden = self.hidden();
        let mut grads = Self::zeros_like(self);

        let Some(last) = caches.last() else {
            grads.b_out[0] = d_output;
            return grads;
        };

        grads.w_out = &last.h * d_output;
        grads.b_out[0] = d_output;

        let mut dh = &self.w_out * d_output;
        let mut dc: Array1<f64> = Array1::zeros(hidden);
        let mut dz: Array1<f64> = Array1::zeros(4 * hidden);

        for step in caches.iter().rev() {
            let d_o = &dh * &step.tanh_c;
            let d_tanh = step.tanh_c.mapv(|t| 1.0 - t * t);
            dc = dc + &dh * &step.o * &d_tanh;

            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;

            // Pre-activation gradients, stacked like the gate weights.
            Zip::from(dz.slice_mut(s![0..hidden]))
                .and(&d_i)
                .and(&step.i)
                .for_each(|z, &d, &a| *z = d * a * (1.0 - a));
            Zip::from(dz.slice_mut(s![hidden..2 * hidden]))
                .and(&d_f)
                .and(&step.f)
                .for_each(|z, &d, &a| *z = d * a * (1.0 - a));
            Zip::from(dz.slice_mut(s![2 * hidden..3 * hidden]))
                .and(&d_g)
                .and(&step.g)
                .for_each(|z, &d, &a| *z = d * (1.0 - a * a));
            Zip::from(dz.slice_mut(s![3 * hidden..4 * hidden]))
                .and(&d_o)
                .and(&step.o)
                .for_each(|z, &d, &a| *z = d * a * (1.0 - a));

            let dz_col = dz.view().insert_axis(Axis(1));
            general_mat_mul(
                1.0,
                &dz_col,
                &step.x.view().insert_axis(Axis(0)),
                1.0,
                &mut grads.w_input,
            );
            general_mat_mul(
                1.0,
                &dz_col,
                &step.h_prev.view().insert_axis(Axis(0)),
                1.0,
                &mut grads.w_hidden,
            );
            grads.bias += &dz;

            dh = self.w_hidden.t().dot(&dz);
            dc = &dc * &step.f;
        }

        grads
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
