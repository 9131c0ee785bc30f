use crate::dashboard::{StatusUpdate, StatusUpdateSender};
use crate::dipole::AmplitudeGrid;
use crate::interpolation::Interpolator;
use crate::kernels::BkKernel;
use crate::kinematics::{
    exceeds_reference_fraction, k_minus_total_shift, k_plus_shift, rapidity_shift, step_function,
    target_shift,
};
use crate::monte_carlo::{suave, wall_clock_seed, Vegas};
use crate::quadrature::{GaussKronrodRule, Qag, QuadratureStatus};
use crate::stepper::{Euler, OdeSystem, Rk2Adaptive};
use crate::{KinematicalConstraint, NloIntegration, Settings, Stepper};
use color_eyre::Report;
use eyre::bail;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Everything the LO integrand needs at one parent dipole.
#[derive(Clone, Copy)]
pub struct LoContext<'a> {
    pub r: f64,
    pub rapidity: f64,
    pub interp_n: &'a Interpolator,
}

/// Everything the NLO integrand needs at one parent dipole.
#[derive(Clone, Copy)]
pub struct NloContext<'a> {
    pub r: f64,
    pub interp_s: &'a Interpolator,
}

pub struct BkSolver<D: AmplitudeGrid> {
    settings: Settings,
    dipole: D,
    kernel: BkKernel,
    checkpoint: Option<String>,
    x0: f64,
    icx0_nlo_impfac: f64,
    ic_typical_parton_virtuality_q0sqr: f64,
    status_update_sender: StatusUpdateSender,
}

impl<D: AmplitudeGrid> BkSolver<D> {
    pub fn new(settings: Settings, dipole: D, status_update_sender: StatusUpdateSender) -> BkSolver<D> {
        let kernel = BkKernel::new(&settings.kernel, &settings.coupling);
        let x0 = dipole.initial_condition().x0();
        let icx0_nlo_impfac = settings.initial_condition.icx0_nlo_impfac;
        let ic_typical_parton_virtuality_q0sqr =
            settings.initial_condition.typical_parton_virtuality_q0sqr;
        let checkpoint = settings.general.checkpoint.clone();

        BkSolver {
            settings,
            dipole,
            kernel,
            checkpoint,
            x0,
            icx0_nlo_impfac,
            ic_typical_parton_virtuality_q0sqr,
            status_update_sender,
        }
    }

    pub fn set_checkpoint_path(&mut self, path: &str) {
        self.checkpoint = Some(path.to_owned());
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dipole(&self) -> &D {
        &self.dipole
    }

    pub fn into_dipole(self) -> D {
        self.dipole
    }

    pub fn alphas(&self, r: f64) -> f64 {
        self.kernel.alphas(r)
    }

    pub fn kernel_lo(&self, r: f64, z: f64, theta: f64) -> f64 {
        self.kernel.kernel_lo(r, z, theta)
    }

    pub fn kernel_nlo(&self, r: f64, x: f64, y: f64, x2: f64, y2: f64, z: f64) -> f64 {
        self.kernel.kernel_nlo(r, x, y, x2, y2, z)
    }

    pub fn kernel_nlo_fermion(&self, r: f64, x: f64, y: f64, x2: f64, y2: f64, z: f64) -> f64 {
        self.kernel.kernel_nlo_fermion(r, x, y, x2, y2, z)
    }

    fn message(&self, m: String) {
        let _ = self.status_update_sender.send(StatusUpdate::Message(m));
    }

    fn warn(&self, m: String) {
        let _ = self.status_update_sender.send(StatusUpdate::Warning(m));
    }

    pub fn describe(&self) -> String {
        let s = &self.settings;
        format!(
            "# LO coupling: {}, NLO coupling: {}, resummation coupling: {}\n\
             # Kinematical constraint: {}, target constraint: {}, dlog resummation: {}, single log resummation: {}\n\
             # NLO kernel: {} ({}), stepper: {}\n\
             # Nc={}, Nf={}, alpha_s(r=1)={:.5}\n\
             # {}",
            s.kernel.rc_lo,
            s.kernel.rc_nlo,
            s.kernel.resum_rc,
            s.kernel.kinematical_constraint,
            s.kernel.target_kinematical_constraint,
            s.kernel.resum_dlog,
            s.kernel.resum_single_log,
            s.kernel.nlo,
            s.integration.nlo_method,
            s.evolution.stepper,
            s.coupling.nc,
            s.coupling.nf,
            self.alphas(1.),
            self.dipole.initial_condition().info()
        )
    }

    /// Evolve the amplitude from the last stored rapidity up to `max_y`,
    /// appending one slice per step of `Evolution.step_size`.
    pub fn solve(&mut self, max_y: f64) -> Result<(), Report> {
        self.settings.validate()?;

        let step = self.settings.evolution.step_size;
        let slice = self.dipole.rapidities().len() - 1;
        let y_start = self.dipole.rapidities()[slice];

        if !(max_y > y_start) {
            bail!(
                "Cannot evolve to y={}: the amplitude is already known up to y={}",
                max_y,
                y_start
            );
        }

        self.message(format!("#### Solving BK equation up to y={}", max_y));
        if self.settings.general.verbose {
            self.message(self.describe());
        }

        self.dipole.initialize_interpolation(slice)?;
        let mut amplitude: Vec<f64> = (0..self.dipole.r_points())
            .map(|i| self.dipole.n(self.dipole.r_val(i)))
            .collect();

        let dim = amplitude.len();
        let mut adaptive = Rk2Adaptive::new(
            dim,
            self.settings.evolution.abs_tolerance,
            self.settings.evolution.rel_tolerance,
        );
        let mut euler = Euler::new(dim);

        let increments = ((max_y - y_start) / step - 1e-9).ceil().max(1.) as usize;
        let mut y = y_start;
        let mut h = step;

        for k in 1..=increments {
            let target = (y_start + k as f64 * step).min(max_y);

            match self.settings.evolution.stepper {
                Stepper::Adaptive => {
                    while y < target {
                        adaptive.evolve(&*self, &mut y, target, &mut h, &mut amplitude)?;
                        let _ = self.status_update_sender.send(StatusUpdate::Progress {
                            rapidity: y,
                            max_rapidity: max_y,
                            step: h,
                        });
                    }
                }
                Stepper::Euler => {
                    let h_euler = target - y;
                    euler.step(&*self, &mut y, &mut amplitude, h_euler)?;
                    y = target;
                    let _ = self.status_update_sender.send(StatusUpdate::Progress {
                        rapidity: y,
                        max_rapidity: max_y,
                        step: h_euler,
                    });
                }
            }

            if let Some((i, v)) = amplitude.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                bail!(
                    "Amplitude N[{}]={} at r={} is not finite after evolving to y={}",
                    i,
                    v,
                    self.dipole.r_val(i),
                    y
                );
            }

            let slice = self.dipole.add_rapidity(y, &amplitude)?;

            if let Some(path) = &self.checkpoint {
                self.dipole.save(path)?;
            }

            self.dipole.initialize_interpolation(slice)?;
        }

        Ok(())
    }

    /// dN/dy at every grid point for the amplitude vector `amplitude` at rapidity `y`.
    pub fn evolve(&self, y: f64, amplitude: &[f64]) -> Result<Vec<f64>, Report> {
        let force_positive = self.settings.general.force_positive_n;
        let saturation_freeze = self.settings.evolution.saturation_freeze;

        let r_values: Vec<f64> = (0..self.dipole.r_points())
            .map(|i| self.dipole.r_val(i))
            .collect();
        if amplitude.len() != r_values.len() {
            bail!(
                "Amplitude has {} values but the grid has {} points",
                amplitude.len(),
                r_values.len()
            );
        }

        let mut n_values = Vec::with_capacity(amplitude.len());
        let mut s_values = Vec::with_capacity(amplitude.len());
        for &a in amplitude {
            let mut n = a.min(1.);
            if n < 0. && force_positive {
                n = 0.;
            }
            n_values.push(n);

            let mut s = (1. - a).max(0.);
            if s > 1. && force_positive {
                s = 1.;
            }
            s_values.push(s);
        }

        (0..r_values.len())
            .into_par_iter()
            .map(|i| -> Result<f64, Report> {
                let r = r_values[i];

                // deep in the saturation region nothing happens
                if amplitude[i] > saturation_freeze {
                    return Ok(0.);
                }

                let mut interp_n = Interpolator::new(&r_values, &n_values)?;
                interp_n.set_freeze(true);
                interp_n.set_underflow(0.);
                interp_n.set_overflow(1.);

                let lo = self.rapidity_derivative_lo(r, &interp_n, y);

                let nlo = if self.settings.kernel.nlo {
                    let mut interp_s = Interpolator::new(&r_values, &s_values)?;
                    interp_s.set_freeze(true);
                    interp_s.set_underflow(1.);
                    interp_s.set_overflow(0.);
                    self.rapidity_derivative_nlo(r, &interp_s)
                } else {
                    0.
                };

                if self.settings.general.print_derivatives {
                    let _ = self.status_update_sender.send(StatusUpdate::Derivative {
                        r,
                        lo,
                        nlo,
                        amplitude: amplitude[i],
                    });
                }

                let derivative = lo + nlo;
                if derivative.is_finite() {
                    Ok(derivative)
                } else {
                    self.warn(format!(
                        "dN/dy={} at r={} (lo={}, nlo={}), using 0",
                        derivative, r, lo, nlo
                    ));
                    Ok(0.)
                }
            })
            .collect()
    }

    fn log_integration_range(&self) -> (f64, f64) {
        (
            (0.5 * self.dipole.min_r()).ln(),
            (2. * self.dipole.max_r()).ln(),
        )
    }

    /// LO contribution to dN(r)/dy: the kernel integrated over the transverse
    /// position of the emitted gluon.
    pub fn rapidity_derivative_lo(&self, r: f64, interp_n: &Interpolator, rapidity: f64) -> f64 {
        let ctx = LoContext {
            r,
            rapidity,
            interp_n,
        };
        let integration = &self.settings.integration;
        let (min_ln_z, max_ln_z) = self.log_integration_range();

        let z_integrator = Qag::new(
            GaussKronrodRule::GK21,
            0.,
            integration.accuracy,
            integration.r_int_points,
        );
        let theta_integrator = Qag::new(
            GaussKronrodRule::GK21,
            0.,
            integration.accuracy,
            integration.theta_int_points,
        );

        let res = z_integrator.integrate(
            |ln_z| {
                let z = ln_z.exp();
                let theta_res = theta_integrator.integrate(|theta| self.lo_integrand(&ctx, z, theta), 0., PI);

                if theta_res.status != QuadratureStatus::Converged
                    && theta_res.status != QuadratureStatus::MaxSubdivisions
                    && theta_res.value.abs() > 1e-7
                {
                    self.warn(format!(
                        "theta integral: {} at z={:e}, r={:e}, result {:e}, relerr {:e}",
                        theta_res.status,
                        z,
                        r,
                        theta_res.value,
                        theta_res.relative_error()
                    ));
                }

                // Jacobian z^2 d ln z, and 2 as theta only covers [0, pi]
                theta_res.value * (2. * ln_z).exp() * 2.
            },
            min_ln_z,
            max_ln_z,
        );

        if res.status == QuadratureStatus::Singularity || res.status == QuadratureStatus::RoundOff {
            self.warn(format!(
                "z integral: {} at r={:e}, result {:e}, relerr {:e}",
                res.status,
                r,
                res.value,
                res.relative_error()
            ));
        }

        res.value
    }

    /// Integrand of the LO derivative at gluon position (z, theta), the kernel
    /// times the amplitude combination of the configured kinematical constraint.
    pub fn lo_integrand(&self, ctx: &LoContext, z: f64, theta: f64) -> f64 {
        let r = ctx.r;
        let min_r = self.settings.kernel.min_r;

        let x_sqr = r * r + z * z - 2. * r * z * theta.cos();
        if x_sqr < min_r * min_r || z < min_r || r < min_r {
            return 0.;
        }
        let x = x_sqr.sqrt();
        let y = z;

        if self.settings.kernel.target_kinematical_constraint {
            let delta = target_shift(self.ic_typical_parton_virtuality_q0sqr, x, y);
            if exceeds_reference_fraction(self.x0, ctx.rapidity - delta, self.icx0_nlo_impfac) {
                return 0.;
            }
        }

        match self.settings.kernel.kinematical_constraint {
            KinematicalConstraint::None => {
                let n_x = ctx.interp_n.evaluate(x);
                let n_y = ctx.interp_n.evaluate(y);
                let n_r = ctx.interp_n.evaluate(r);

                self.kernel_lo(r, z, theta) * (n_x + n_y - n_r - n_x * n_y)
            }
            KinematicalConstraint::KPlus => {
                let shifted_rapidity = ctx.rapidity - k_plus_shift(r, x, y);

                if exceeds_reference_fraction(self.x0, shifted_rapidity, self.icx0_nlo_impfac) {
                    return 0.;
                }

                // the amplitude is frozen to the initial condition below y=0
                let shifted_rapidity = shifted_rapidity.max(0.);

                let s01 = 1. - ctx.interp_n.evaluate(r);
                let s02 = 1. - self.dipole.interpolate_n(x, shifted_rapidity);
                let s12 = 1. - self.dipole.interpolate_n(y, shifted_rapidity);

                self.kernel_lo(r, z, theta) * (s01 - s02 * s12)
            }
            KinematicalConstraint::KMinus => {
                let allowed = step_function(ctx.rapidity - k_minus_total_shift(r, x, y));
                if allowed == 0. {
                    return 0.;
                }

                let shifted_s = |size: f64| {
                    let shifted_rapidity = ctx.rapidity - rapidity_shift(r, size);
                    if shifted_rapidity > 0. {
                        1. - self.dipole.interpolate_n(size, shifted_rapidity)
                    } else {
                        1. - self.dipole.initial_condition().dipole_amplitude(size)
                    }
                };

                let s_x = shifted_s(x).max(0.);
                let s_y = shifted_s(y).max(0.);
                let n_r = if ctx.rapidity > 0. {
                    ctx.interp_n.evaluate(r)
                } else {
                    self.dipole.initial_condition().dipole_amplitude(r)
                };
                let s_r = (1. - n_r).max(0.);

                let res = -self.kernel_lo(r, z, theta) * (s_x * s_y - s_r);
                if res.is_finite() {
                    res
                } else {
                    self.warn(format!(
                        "K- integrand {} at y={}, r={:e}, X={:e}, Y={:e}, S_X={}, S_Y={}, using 0",
                        res, ctx.rapidity, r, x, y, s_x, s_y
                    ));
                    0.
                }
            }
        }
    }

    /// NLO contribution to dN(r)/dy, integrated over the positions of the two
    /// emitted gluons.
    pub fn rapidity_derivative_nlo(&self, r: f64, interp_s: &Interpolator) -> f64 {
        let ctx = NloContext { r, interp_s };
        let integration = &self.settings.integration;
        let (min_ln_z, max_ln_z) = self.log_integration_range();

        match integration.nlo_method {
            NloIntegration::Multiple => {
                let z_integrator = Qag::new(
                    GaussKronrodRule::GK15,
                    0.,
                    integration.accuracy,
                    integration.r_int_points,
                );
                let theta_integrator = Qag::new(
                    GaussKronrodRule::GK15,
                    0.,
                    integration.accuracy,
                    integration.theta_int_points,
                );

                z_integrator
                    .integrate(
                        |ln_z| {
                            let z = ln_z.exp();
                            theta_integrator
                                .integrate(
                                    |theta_z| {
                                        z_integrator
                                            .integrate(
                                                |ln_z2| {
                                                    let z2 = ln_z2.exp();
                                                    theta_integrator
                                                        .integrate(
                                                            |theta_z2| {
                                                                self.nlo_integrand(
                                                                    &ctx, z, theta_z, z2, theta_z2,
                                                                )
                                                            },
                                                            0.,
                                                            2. * PI,
                                                        )
                                                        .value
                                                        * (2. * ln_z2).exp()
                                                },
                                                min_ln_z,
                                                max_ln_z,
                                            )
                                            .value
                                    },
                                    0.,
                                    2. * PI,
                                )
                                .value
                                * (2. * ln_z).exp()
                        },
                        min_ln_z,
                        max_ln_z,
                    )
                    .value
            }
            NloIntegration::Vegas | NloIntegration::Miser => self.nlo_monte_carlo(&ctx, min_ln_z, max_ln_z),
        }
    }

    fn nlo_monte_carlo(&self, ctx: &NloContext, min_ln_z: f64, max_ln_z: f64) -> f64 {
        let integration = &self.settings.integration;
        let r = ctx.r;
        let lower = [min_ln_z, min_ln_z, 0., 0.];
        let upper = [max_ln_z, max_ln_z, 2. * PI, 2. * PI];
        let seed = integration.mc_seed.unwrap_or_else(wall_clock_seed);
        let calls = integration.mc_calls;

        // v = [ln z, ln z2, theta_z, theta_z2]
        let mut integrand = |v: &[f64]| {
            self.nlo_integrand(ctx, v[0].exp(), v[2], v[1].exp(), v[3]) * (2. * v[0]).exp() * (2. * v[1]).exp()
        };

        match integration.nlo_method {
            NloIntegration::Miser => {
                let mut last = None;
                for attempt in 0..integration.miser_max_attempts {
                    let res = suave(
                        &mut integrand,
                        &lower,
                        &upper,
                        calls,
                        integration.mc_accuracy,
                        seed.wrapping_add(attempt as u64),
                    );
                    if res.error == 0. || res.relative_error() <= integration.mc_accuracy {
                        return res.value;
                    }
                    last = Some(res);
                }
                if let Some(res) = last {
                    self.warn(format!(
                        "Suave integral did not converge in {} attempts at r={:e}, result {:e} relerr {:e}, using 0",
                        integration.miser_max_attempts,
                        r,
                        res.value,
                        res.relative_error()
                    ));
                }
                0.
            }
            _ => {
                let mut vegas = Vegas::new(&lower, &upper, seed);
                vegas.survey(&mut integrand, (calls / 5).max(1));

                let mut last = None;
                for pass in 1..=integration.vegas_max_iterations {
                    let res = vegas.refine(&mut integrand, calls);
                    let _ = self.status_update_sender.send(StatusUpdate::VegasPass {
                        r,
                        pass,
                        result: res.value,
                        error: res.error,
                        chi_sq: res.chi_sq,
                        evaluations: res.evaluations,
                    });

                    if res.error == 0.
                        || (res.relative_error() <= integration.vegas_max_relative_error
                            && (res.chi_sq - 1.).abs() <= integration.vegas_max_chisq_deviation)
                    {
                        return res.value;
                    }
                    last = Some(res);
                }

                if let Some(res) = last {
                    self.warn(format!(
                        "Vegas integral failed at r={:e}, best result {:e} relerr {:e} chi^2 {:.3}, using 0",
                        r,
                        res.value,
                        res.relative_error(),
                        res.chi_sq
                    ));
                }
                0.
            }
        }
    }

    /// Integrand of the NLO derivative at gluon positions (z, theta_z) and
    /// (z2, theta_z2), including the coupling prefactor.
    pub fn nlo_integrand(&self, ctx: &NloContext, z: f64, theta_z: f64, z2: f64, theta_z2: f64) -> f64 {
        let r = ctx.r;
        let x = (r * r + z * z - 2. * r * z * theta_z.cos()).sqrt();
        let y = z;
        let x2 = (r * r + z2 * z2 - 2. * r * z2 * theta_z2.cos()).sqrt();
        let y2 = z2;
        let z_m_z2 = (z * z + z2 * z2 - 2. * z * z2 * (theta_z - theta_z2).cos()).sqrt();

        let k = self.kernel.kernel_nlo(r, x, y, x2, y2, z_m_z2);
        let k_swap = self.kernel.kernel_nlo(r, x2, y2, x, y, z_m_z2);

        let s_x = ctx.interp_s.evaluate(x);
        let s_y = ctx.interp_s.evaluate(y);
        let s_x2 = ctx.interp_s.evaluate(x2);
        let s_y2 = ctx.interp_s.evaluate(y2);
        let s_z = ctx.interp_s.evaluate(z_m_z2);

        // written for S = 1 - N, hence the signs
        let dipole = -(s_x * s_z * s_y2 - s_x * s_y);
        let dipole_swap = -(s_x2 * s_z * s_y - s_x2 * s_y2);

        let mut result = (k * dipole + k_swap * dipole_swap) / 2.;

        if self.kernel.nf > 0. {
            let k_f = self.kernel.kernel_nlo_fermion(r, x, y, x2, y2, z_m_z2);
            let k_f_swap = self.kernel.kernel_nlo_fermion(r, x2, y2, x, y, z_m_z2);

            let dipole_f = s_y * (s_x2 - s_x);
            let dipole_f_swap = s_y2 * (s_x - s_x2);

            result -= (k_f * dipole_f + k_f_swap * dipole_f_swap) / 2.;
        }

        result *= self.kernel.nlo_prefactor(r, x, y, x2, y2, z_m_z2);

        if result.is_finite() {
            result
        } else {
            0.
        }
    }
}

impl<D: AmplitudeGrid> OdeSystem for BkSolver<D> {
    fn dimension(&self) -> usize {
        self.dipole.r_points()
    }

    fn apply(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), Report> {
        let derivatives = self.evolve(t, y)?;
        out.copy_from_slice(&derivatives);
        Ok(())
    }
}
