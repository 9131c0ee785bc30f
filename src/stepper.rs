use color_eyre::Report;
use eyre::bail;

/// A first order system dy/dt = f(t, y).
pub trait OdeSystem {
    fn dimension(&self) -> usize;

    /// Evaluate f(t, y) into `out`.
    fn apply(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), Report>;
}

/// Explicit Euler, y += h f(t, y).
pub struct Euler {
    dydt: Vec<f64>,
}

impl Euler {
    pub fn new(dim: usize) -> Euler {
        Euler {
            dydt: vec![0.; dim],
        }
    }

    pub fn step(
        &mut self,
        system: &impl OdeSystem,
        t: &mut f64,
        y: &mut [f64],
        h: f64,
    ) -> Result<(), Report> {
        system.apply(*t, y, &mut self.dydt)?;
        for (yi, di) in y.iter_mut().zip(&self.dydt) {
            *yi += h * di;
        }
        *t += h;
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StepAdjustment {
    Decrease,
    Increase,
    Keep,
}

/// Embedded Runge-Kutta (2, 3) pair with a step size controller on the
/// absolute and relative error of y.
pub struct Rk2Adaptive {
    pub eps_abs: f64,
    pub eps_rel: f64,
    /// Consecutive rejected steps before giving up
    pub max_rejections: usize,
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    tmp: Vec<f64>,
    y0: Vec<f64>,
    yerr: Vec<f64>,
}

impl Rk2Adaptive {
    const ORDER: f64 = 2.;
    const SAFETY: f64 = 0.9;

    pub fn new(dim: usize, eps_abs: f64, eps_rel: f64) -> Rk2Adaptive {
        Rk2Adaptive {
            eps_abs,
            eps_rel,
            max_rejections: 100,
            k1: vec![0.; dim],
            k2: vec![0.; dim],
            k3: vec![0.; dim],
            tmp: vec![0.; dim],
            y0: vec![0.; dim],
            yerr: vec![0.; dim],
        }
    }

    /// One trial step of size h from (t, y), writing the error estimate to `yerr`.
    fn step(&mut self, system: &impl OdeSystem, t: f64, y: &mut [f64], h: f64) -> Result<(), Report> {
        // k1 = f(t, y)
        system.apply(t, y, &mut self.k1)?;

        // k2 = f(t + h/2, y + h/2 k1)
        for i in 0..y.len() {
            self.tmp[i] = y[i] + 0.5 * h * self.k1[i];
        }
        system.apply(t + 0.5 * h, &self.tmp, &mut self.k2)?;

        // k3 = f(t + h, y + h (-k1 + 2 k2))
        for i in 0..y.len() {
            self.tmp[i] = y[i] + h * (-self.k1[i] + 2. * self.k2[i]);
        }
        system.apply(t + h, &self.tmp, &mut self.k3)?;

        for (yi, ei, k1, k2, k3) in izip!(
            y.iter_mut(),
            self.yerr.iter_mut(),
            &self.k1,
            &self.k2,
            &self.k3
        ) {
            let ksum3 = (k1 + 4. * k2 + k3) / 6.;
            *yi += h * ksum3;
            *ei = h * (k2 - ksum3);
        }
        Ok(())
    }

    fn adjust(&self, y: &[f64], h: &mut f64) -> Result<StepAdjustment, Report> {
        let mut rmax = 0f64;
        for (yi, ei) in y.iter().zip(&self.yerr) {
            let d = self.eps_abs + self.eps_rel * yi.abs();
            rmax = rmax.max(ei.abs() / d);
        }

        if !rmax.is_finite() {
            bail!("Non-finite error estimate in the adaptive step (h={})", h);
        }

        if rmax > 1.1 {
            let r = (Self::SAFETY / rmax.powf(1. / Self::ORDER)).max(0.2);
            *h *= r;
            Ok(StepAdjustment::Decrease)
        } else if rmax < 0.5 {
            let r = (Self::SAFETY / rmax.powf(1. / (Self::ORDER + 1.))).min(5.).max(1.);
            *h *= r;
            Ok(StepAdjustment::Increase)
        } else {
            Ok(StepAdjustment::Keep)
        }
    }

    /// Advance (t, y) towards t1 by one accepted step. `h` is the proposed step
    /// on entry and the suggested next step on exit. The step is truncated so
    /// that t never passes t1.
    pub fn evolve(
        &mut self,
        system: &impl OdeSystem,
        t: &mut f64,
        t1: f64,
        h: &mut f64,
        y: &mut [f64],
    ) -> Result<(), Report> {
        if !(*h > 0.) {
            bail!("The step size must be positive, got {}", h);
        }

        self.y0.copy_from_slice(y);
        let mut rejections = 0;

        loop {
            let final_step = *t + *h >= t1;
            let mut h0 = if final_step { t1 - *t } else { *h };

            self.step(system, *t, y, h0)?;

            let h_trial = h0;
            let adjustment = self.adjust(y, &mut h0)?;

            if adjustment == StepAdjustment::Decrease {
                y.copy_from_slice(&self.y0);
                rejections += 1;

                if !(h0 > 0.) || *t + h0 == *t || rejections > self.max_rejections {
                    bail!(
                        "Adaptive step size collapsed at t={}: h={:e} after {} rejected steps",
                        t,
                        h0,
                        rejections
                    );
                }
                *h = h0;
                continue;
            }

            *t = if final_step { t1 } else { *t + h_trial };

            // a truncated last step does not shrink the step proposed for the next interval
            *h = if final_step { h0.max(*h) } else { h0 };
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// dy/dt = -y
    struct Decay;

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, y: &[f64], out: &mut [f64]) -> Result<(), Report> {
            out[0] = -y[0];
            Ok(())
        }
    }

    #[test]
    fn euler_first_order() {
        let mut euler = Euler::new(1);
        let mut t = 0.;
        let mut y = [1.];
        euler.step(&Decay, &mut t, &mut y, 0.1).unwrap();
        assert!((y[0] - 0.9).abs() < 1e-15);
        assert!((t - 0.1).abs() < 1e-15);
    }

    #[test]
    fn adaptive_reaches_target_accurately() {
        let mut stepper = Rk2Adaptive::new(1, 1e-8, 1e-8);
        let mut t = 0.;
        let mut h = 0.5;
        let mut y = [1.];
        let mut steps = 0;
        while t < 2. {
            stepper.evolve(&Decay, &mut t, 2., &mut h, &mut y).unwrap();
            steps += 1;
        }
        assert_eq!(t, 2.);
        assert!((y[0] - (-2f64).exp()).abs() < 1e-5);
        assert!(steps > 10);
    }

    #[test]
    fn local_error_scales_as_h4() {
        // the propagated solution is third order, so halving h divides the local error by ~16
        let local_error = |h: f64| {
            let mut stepper = Rk2Adaptive::new(1, 1., 1.);
            let mut y = [1.];
            stepper.step(&Decay, 0., &mut y, h).unwrap();
            (y[0] - (-h).exp()).abs()
        };
        let ratio = local_error(0.04) / local_error(0.02);
        assert!(ratio > 14. && ratio < 18., "ratio {}", ratio);
    }

    #[test]
    fn error_estimate_shrinks_rejected_steps() {
        let mut stepper = Rk2Adaptive::new(1, 1e-10, 1e-10);
        let mut t = 0.;
        let mut h = 1.;
        let mut y = [1.];
        stepper.evolve(&Decay, &mut t, 1., &mut h, &mut y).unwrap();
        assert!(t < 1e-2);
        assert!(h < 1e-2);
    }
}
