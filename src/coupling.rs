use crate::{CouplingSettings, KernelSettings, LoCoupling, NloCoupling, ResummationCoupling};
use std::f64::consts::PI;

/// Heavy quark masses (charm, bottom) at which the number of active flavors changes.
const HEAVY_QUARK_MASSES: [f64; 2] = [1.3, 4.5];
/// Effective Lambda_QCD for 3, 4 and 5 active flavors, fixed by continuity of the coupling
/// and alpha_s(M_Z) = 0.1184.
const LAMBDA_NF: [f64; 3] = [0.146159, 0.122944, 0.0904389];

/// One-loop coordinate space running coupling with infrared freezing.
#[derive(Debug, Clone)]
pub struct RunningCoupling {
    pub nc: f64,
    pub nf: f64,
    pub lambda_qcd: f64,
    pub alphas_scaling: f64,
    pub max_alphas: f64,
    pub freeze_mu0: f64,
    pub freeze_c: f64,
    /// Set when any of the LO, NLO or resummation prescriptions is the fixed one
    pub fixed: Option<f64>,
}

impl RunningCoupling {
    pub fn new(settings: &CouplingSettings, kernel: &KernelSettings) -> RunningCoupling {
        let fixed = if kernel.rc_lo == LoCoupling::Fixed
            || kernel.rc_nlo == NloCoupling::Fixed
            || kernel.resum_rc == ResummationCoupling::Fixed
        {
            Some(settings.fixed_as)
        } else {
            None
        };

        RunningCoupling {
            nc: settings.nc,
            nf: settings.nf,
            lambda_qcd: settings.lambda_qcd,
            alphas_scaling: settings.alphas_scaling,
            max_alphas: settings.max_alphas,
            freeze_mu0: settings.freeze_mu0,
            freeze_c: settings.freeze_c,
            fixed,
        }
    }

    /// alpha_s at the dipole size `r`.
    pub fn alphas(&self, r: f64) -> f64 {
        if let Some(alpha) = self.fixed {
            return alpha;
        }

        if self.nf > 3. {
            return self.alphas_variable_flavor(r);
        }

        let c = self.freeze_c;
        let b0 = (11. * self.nc - 2. * self.nf) / 3.;
        let scale = 4. * self.alphas_scaling / (r * r * self.lambda_qcd * self.lambda_qcd);

        4. * PI
            / (b0
                * (self.freeze_mu0.powf(2. / c) + scale.powf(1. / c))
                    .powf(c)
                    .ln())
    }

    fn alphas_variable_flavor(&self, r: f64) -> f64 {
        let dipole_scale = 4. * self.alphas_scaling / (r * r);

        let nf = if dipole_scale < HEAVY_QUARK_MASSES[0] * HEAVY_QUARK_MASSES[0] {
            3
        } else if dipole_scale < HEAVY_QUARK_MASSES[1] * HEAVY_QUARK_MASSES[1] {
            4
        } else {
            5
        };

        let lambda = LAMBDA_NF[nf - 3];
        let b0 = 11. - 2. / 3. * nf as f64;

        let log_arg = dipole_scale / (lambda * lambda);
        if log_arg < 1. {
            return self.max_alphas;
        }

        let alpha = 4. * PI / (b0 * log_arg.ln());
        alpha.min(self.max_alphas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupling(nf: f64) -> RunningCoupling {
        let mut settings = CouplingSettings::default();
        settings.nf = nf;
        RunningCoupling::new(&settings, &KernelSettings::default())
    }

    #[test]
    fn fixed_prescription_wins() {
        let mut kernel = KernelSettings::default();
        kernel.rc_nlo = NloCoupling::Fixed;
        let mut settings = CouplingSettings::default();
        settings.fixed_as = 0.21;
        let rc = RunningCoupling::new(&settings, &kernel);

        for r in [1e-5, 0.3, 40.] {
            assert_eq!(rc.alphas(r), 0.21);
        }
    }

    #[test]
    fn small_dipoles_have_weak_coupling() {
        let rc = coupling(3.);
        let a_small = rc.alphas(1e-4);
        let a_large = rc.alphas(1.);
        assert!(a_small > 0. && a_small < 0.1);
        assert!(a_large > a_small);
    }

    #[test]
    fn frozen_value_at_large_r() {
        let rc = coupling(3.);
        // (mu0^(2/c))^c = mu0^2 once the r-dependent term vanishes
        let b0 = 9.;
        let frozen = 4. * PI / (b0 * (2.5f64 * 2.5).ln());
        assert!((rc.alphas(1e4) - frozen).abs() < 1e-6);
    }

    #[test]
    fn variable_flavor_saturates() {
        let rc = coupling(5.);
        assert_eq!(rc.alphas(50.), 1.0);
        assert!(rc.alphas(1e-3) < 0.2);
    }
}
