use eyre::bail;
use color_eyre::Report;

/// Natural cubic spline in ln r.
///
/// Outside the sampled range the interpolator either freezes to the
/// configured underflow / overflow values or, if freezing is off, to the
/// first / last sample.
#[derive(Debug, Clone)]
pub struct Interpolator {
    ln_x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots
    y2: Vec<f64>,
    freeze: bool,
    underflow: f64,
    overflow: f64,
}

impl Interpolator {
    pub fn new(x: &[f64], y: &[f64]) -> Result<Interpolator, Report> {
        if x.len() != y.len() {
            bail!(
                "Interpolator needs as many values as points: {} != {}",
                y.len(),
                x.len()
            );
        }
        if x.len() < 3 {
            bail!("Interpolator needs at least 3 points, got {}", x.len());
        }
        if x.iter().any(|&xi| !(xi > 0.)) {
            bail!("Interpolator points must be positive");
        }

        let ln_x: Vec<f64> = x.iter().map(|xi| xi.ln()).collect();
        if ln_x.windows(2).any(|w| !(w[1] > w[0])) {
            bail!("Interpolator points must be strictly increasing");
        }

        let y2 = natural_spline_second_derivatives(&ln_x, y);

        Ok(Interpolator {
            ln_x,
            y: y.to_vec(),
            y2,
            freeze: false,
            underflow: y[0],
            overflow: y[y.len() - 1],
        })
    }

    pub fn set_freeze(&mut self, freeze: bool) {
        self.freeze = freeze;
    }

    pub fn set_underflow(&mut self, value: f64) {
        self.underflow = value;
    }

    pub fn set_overflow(&mut self, value: f64) {
        self.overflow = value;
    }

    pub fn min_x(&self) -> f64 {
        self.ln_x[0].exp()
    }

    pub fn max_x(&self) -> f64 {
        self.ln_x[self.ln_x.len() - 1].exp()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.ln_x.len();
        let t = x.ln();

        if !(t >= self.ln_x[0]) {
            return if self.freeze { self.underflow } else { self.y[0] };
        }
        if t > self.ln_x[n - 1] {
            return if self.freeze { self.overflow } else { self.y[n - 1] };
        }

        // first knot strictly greater than t, the last interval includes its right end
        let hi = self.ln_x.partition_point(|&v| v <= t).min(n - 1).max(1);
        let lo = hi - 1;

        let h = self.ln_x[hi] - self.ln_x[lo];
        let a = (self.ln_x[hi] - t) / h;
        let b = (t - self.ln_x[lo]) / h;

        a * self.y[lo]
            + b * self.y[hi]
            + ((a * a * a - a) * self.y2[lo] + (b * b * b - b) * self.y2[hi]) * h * h / 6.
    }
}

fn natural_spline_second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut y2 = vec![0.; n];
    let mut u = vec![0.; n];

    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * y2[i - 1] + 2.;
        y2[i] = (sig - 1.) / p;
        let slope_diff =
            (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        u[i] = (6. * slope_diff / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
    }

    y2[n - 1] = 0.;
    for k in (0..n - 1).rev() {
        y2[k] = y2[k] * y2[k + 1] + u[k];
    }
    y2
}
