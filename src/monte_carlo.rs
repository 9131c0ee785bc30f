//! Monte Carlo integration over hyper-rectangles with the Cuba library.
//!
//! `Vegas` runs a survey that adapts the importance sampling grid, followed by
//! refinement passes of independent runs that all start from the survey grid.
//! `suave` is a single Suave integration. Cuba is driven in-process
//! (no worker cores) so that the calling rayon task owns the evaluation.

use cuba::{CubaIntegrator, CubaResult, CubaVerbosity};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Independent runs in one refinement pass.
pub const REFINE_RUNS: usize = 10;
/// Grid adaptation iterations of the survey.
pub const SURVEY_ITERATIONS: usize = 5;

static STATE_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Copy, Clone, Default)]
pub struct MonteCarloResult {
    pub value: f64,
    pub error: f64,
    /// chi^2 per degree of freedom between the combined runs
    pub chi_sq: f64,
    pub evaluations: usize,
}

impl MonteCarloResult {
    pub fn relative_error(&self) -> f64 {
        (self.error / self.value).abs()
    }

    fn from_cuba(r: &CubaResult) -> MonteCarloResult {
        MonteCarloResult {
            value: r.result[0],
            error: r.error[0],
            chi_sq: 0.,
            evaluations: r.neval as usize,
        }
    }
}

/// Seconds since the epoch.
pub fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Cuba takes a non-negative 32 bit seed.
fn cuba_seed(seed: u64) -> i32 {
    (seed % i32::MAX as u64) as i32
}

fn volume(lower: &[f64], upper: &[f64]) -> f64 {
    lower.iter().zip(upper).map(|(l, u)| u - l).product()
}

/// Combine independent estimates with inverse variance weights. The chi^2
/// per degree of freedom measures their mutual consistency.
pub fn combine(runs: &[MonteCarloResult]) -> MonteCarloResult {
    let evaluations = runs.iter().map(|r| r.evaluations).sum();

    // a run without variance is exact
    if let Some(exact) = runs.iter().find(|r| r.error == 0.) {
        return MonteCarloResult {
            value: exact.value,
            error: 0.,
            chi_sq: 0.,
            evaluations,
        };
    }

    let mut sum_wgts = 0.;
    let mut wtd_int_sum = 0.;
    for r in runs {
        let w = 1. / (r.error * r.error);
        sum_wgts += w;
        wtd_int_sum += r.value * w;
    }
    let value = wtd_int_sum / sum_wgts;

    let chi_sq = if runs.len() > 1 {
        runs.iter()
            .map(|r| ((r.value - value) / r.error).powi(2))
            .sum::<f64>()
            / (runs.len() - 1) as f64
    } else {
        0.
    };

    MonteCarloResult {
        value,
        error: (1. / sum_wgts).sqrt(),
        chi_sq,
        evaluations,
    }
}

struct UserData<'a> {
    integrand: &'a mut dyn FnMut(&[f64]) -> f64,
    lower: &'a [f64],
    upper: &'a [f64],
    x: Vec<f64>,
    volume: f64,
}

impl<'a> UserData<'a> {
    fn new(
        integrand: &'a mut dyn FnMut(&[f64]) -> f64,
        lower: &'a [f64],
        upper: &'a [f64],
    ) -> UserData<'a> {
        UserData {
            integrand,
            lower,
            upper,
            x: vec![0.; lower.len()],
            volume: volume(lower, upper),
        }
    }
}

/// Maps the unit hypercube sampled by Cuba onto the integration region.
#[allow(unused_variables)]
#[inline(always)]
fn integrand(
    x: &[f64],
    f: &mut [f64],
    user_data: &mut UserData,
    nvec: usize,
    core: i32,
    weight: &[f64],
    iter: usize,
) -> Result<(), &'static str> {
    let dim = user_data.lower.len();
    if x.len() < dim * nvec {
        return Err("Insane dimension in integrand");
    }

    for (xi, fi) in x.chunks(dim).zip(f.iter_mut()).take(nvec) {
        for j in 0..dim {
            user_data.x[j] = user_data.lower[j] + xi[j] * (user_data.upper[j] - user_data.lower[j]);
        }
        let v = (user_data.integrand)(&user_data.x) * user_data.volume;
        *fi = if v.is_finite() { v } else { 0. };
    }
    Ok(())
}

fn integrator(seed: u64) -> CubaIntegrator {
    let mut ci = CubaIntegrator::new();
    ci.set_mineval(10)
        .set_epsrel(0.)
        .set_epsabs(0.)
        .set_seed(cuba_seed(seed))
        .set_cores(0, 1);
    ci
}

/// Vegas with a survey and refinement passes, the grid of the survey being
/// shared through a Cuba state file.
pub struct Vegas<'a> {
    lower: &'a [f64],
    upper: &'a [f64],
    seed: u64,
    state_filename: String,
    survey_filename: String,
    runs: Vec<MonteCarloResult>,
    surveyed: bool,
}

impl<'a> Vegas<'a> {
    pub fn new(lower: &'a [f64], upper: &'a [f64], seed: u64) -> Vegas<'a> {
        let prefix = std::env::temp_dir().join(format!(
            "nlobk_vegas_{}_{}",
            std::process::id(),
            STATE_FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let prefix = prefix.to_string_lossy();

        Vegas {
            lower,
            upper,
            seed,
            state_filename: format!("{}_state.dat", prefix),
            survey_filename: format!("{}_survey.dat", prefix),
            runs: vec![],
            surveyed: false,
        }
    }

    /// Adapt the grid with `calls` evaluations. The estimate of the survey is
    /// returned but not kept.
    pub fn survey(&mut self, f: &mut dyn FnMut(&[f64]) -> f64, calls: usize) -> MonteCarloResult {
        let _ = std::fs::remove_file(&self.state_filename);
        let _ = std::fs::remove_file(&self.survey_filename);

        let points = (calls / SURVEY_ITERATIONS).max(100);
        let mut ci = integrator(self.seed);
        ci.set_nstart(points as i64)
            .set_nincrease(0)
            .set_maxeval((SURVEY_ITERATIONS * points) as i64)
            .set_save_state_file(self.state_filename.clone())
            .set_keep_state_file(true)
            .set_reset_vegas_integrator(true)
            .set_use_only_last_sample(false);

        let r = ci.vegas(
            self.lower.len(),
            1,
            1,
            CubaVerbosity::Silent,
            0,
            integrand,
            UserData::new(f, self.lower, self.upper),
        );

        self.surveyed = std::fs::rename(&self.state_filename, &self.survey_filename).is_ok();
        MonteCarloResult::from_cuba(&r)
    }

    /// Run `REFINE_RUNS` independent runs sharing `calls` evaluations, starting
    /// from the survey grid when there is one, and return the combination of
    /// every run made so far.
    pub fn refine(&mut self, f: &mut dyn FnMut(&[f64]) -> f64, calls: usize) -> MonteCarloResult {
        let points = (calls / REFINE_RUNS).max(100);
        let mut ci = integrator(self.seed);
        ci.set_nstart(points as i64)
            .set_nincrease(0)
            .set_maxeval(points as i64)
            .set_reset_vegas_integrator(true)
            .set_use_only_last_sample(true)
            .set_keep_state_file(false);
        if self.surveyed {
            ci.set_save_state_file(self.state_filename.clone());
        }

        for _ in 0..REFINE_RUNS {
            let run = self.runs.len();
            ci.set_seed(cuba_seed(self.seed.wrapping_add(run as u64 + 1)));
            if self.surveyed {
                let _ = std::fs::copy(&self.survey_filename, &self.state_filename);
            }

            let r = ci.vegas(
                self.lower.len(),
                1,
                1,
                CubaVerbosity::Silent,
                0,
                integrand,
                UserData::new(f, self.lower, self.upper),
            );
            let _ = std::fs::remove_file(&self.state_filename);
            self.runs.push(MonteCarloResult::from_cuba(&r));
        }

        combine(&self.runs)
    }
}

impl<'a> Drop for Vegas<'a> {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.state_filename);
        let _ = std::fs::remove_file(&self.survey_filename);
    }
}

/// Suave with at most `calls` evaluations, stopping at relative error `epsrel`.
pub fn suave(
    f: &mut dyn FnMut(&[f64]) -> f64,
    lower: &[f64],
    upper: &[f64],
    calls: usize,
    epsrel: f64,
    seed: u64,
) -> MonteCarloResult {
    let mut ci = integrator(seed);
    ci.set_epsrel(epsrel).set_maxeval(calls as i64);

    let r = ci.suave(
        lower.len(),
        1,
        1,
        1000,
        2,
        25.,
        CubaVerbosity::Silent,
        integrand,
        UserData::new(f, lower, upper),
    );
    MonteCarloResult::from_cuba(&r)
}
