//! Direct-form digital filter.

/// A direct-form II IIR filter defined by moving-average (numerator) and
/// autoregressive (denominator) coefficient vectors, with an output gain.
///
/// The autoregressive coefficients are in the convention
/// `y[n] = sum(ma[k] * w[n-k]) ; w[n] = x[n] - sum(ar[k] * w[n-k], k >= 1)`
/// with `ar[0]` assumed to be 1.
#[derive(Debug, Clone)]
pub struct Filter {
    ma: Vec<f64>,
    ar: Vec<f64>,
    delay: Vec<f64>,
    gain: f64,
}

impl Filter {
    /// Creates a filter from coefficient slices and an output gain.
    /// The leading autoregressive coefficient is assumed to be 1.
    pub fn new(ma: &[f64], ar: &[f64], gain: f64) -> Self {
        let order = ma.len().max(ar.len());
        Self {
            ma: ma.to_vec(),
            ar: ar.to_vec(),
            delay: vec![0.0; order],
            gain,
        }
    }

    /// Filters one sample.
    pub fn apply(&mut self, x: f64) -> f64 {
        let mut w = x;
        for (k, &a) in self.ar.iter().enumerate().skip(1) {
            w -= a * self.delay[k - 1];
        }

        let mut y = self.ma[0] * w;
        for (k, &b) in self.ma.iter().enumerate().skip(1) {
            y += b * self.delay[k - 1];
        }

        // shift the delay line
        for k in (1..self.delay.len()).rev() {
            self.delay[k] = self.delay[k - 1];
        }
        self.delay[0] = w;

        y * self.gain
    }

    /// Clears the delay line.
    pub fn clear(&mut self) {
        self.delay.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fir_impulse_response() {
        // pure moving average: the impulse response is the coefficients
        let mut f = Filter::new(&[0.5, 0.25, 0.125], &[1.0], 1.0);
        let response: Vec<f64> = (0..4)
            .map(|i| f.apply(if i == 0 { 1.0 } else { 0.0 }))
            .collect();
        assert_eq!(response, vec![0.5, 0.25, 0.125, 0.0]);
    }

    #[test]
    fn test_one_pole_decay() {
        // y[n] = x[n] + 0.5 y[n-1]
        let mut f = Filter::new(&[1.0], &[1.0, -0.5], 1.0);
        let response: Vec<f64> = (0..4)
            .map(|i| f.apply(if i == 0 { 1.0 } else { 0.0 }))
            .collect();
        for (i, y) in response.iter().enumerate() {
            assert!((y - 0.5f64.powi(i as i32)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_clear_resets_state() {
        let mut f = Filter::new(&[1.0], &[1.0, -0.9], 1.0);
        f.apply(1.0);
        f.clear();
        assert_eq!(f.apply(0.0), 0.0);
    }

    #[test]
    fn test_gain() {
        let mut f = Filter::new(&[1.0], &[1.0], 2.5);
        assert_eq!(f.apply(1.0), 2.5);
    }
}
