//! BK evolution kernels in coordinate space.
//!
//! The parent dipole has size `r`, the daughters sizes `x` (from the quark)
//! and `y` (from the antiquark). For the NLO kernels `x2`, `y2` are the
//! daughters of the second emitted gluon and `z` the distance between the two
//! gluons.

use crate::coupling::RunningCoupling;
use crate::special::{bessel_i1, bessel_j1};
use crate::{
    CouplingSettings, KernelSettings, KinematicalConstraint, LoCoupling, NloCoupling,
    ResummationCoupling,
};
use std::f64::consts::PI;

const EPS: f64 = 1e-50;
/// Coefficient A1 of the single log resummation
const A1: f64 = 11. / 12.;

#[derive(Debug, Clone)]
pub struct BkKernel {
    pub settings: KernelSettings,
    pub coupling: RunningCoupling,
    pub nc: f64,
    pub nf: f64,
    pub fixed_as: f64,
}

impl BkKernel {
    pub fn new(kernel: &KernelSettings, coupling: &CouplingSettings) -> BkKernel {
        BkKernel {
            settings: kernel.clone(),
            coupling: RunningCoupling::new(coupling, kernel),
            nc: coupling.nc,
            nf: coupling.nf,
            fixed_as: coupling.fixed_as,
        }
    }

    #[inline]
    pub fn alphas(&self, r: f64) -> f64 {
        self.coupling.alphas(r)
    }

    /// LO kernel for emitting a gluon at distance `z` from the antiquark, at
    /// angle `theta` with respect to the parent dipole. Includes the
    /// resummations and the finite part of K1 when they are enabled.
    pub fn kernel_lo(&self, r: f64, z: f64, theta: f64) -> f64 {
        let nc = self.nc;
        let y = z;
        let x = (r * r + z * z - 2. * r * z * theta.cos()).sqrt();
        let min = x.min(y).min(r);
        let dipole_factor = (r / (x * y)).powi(2);

        let (mut result, alphas_scale) = match self.settings.rc_lo {
            LoCoupling::Fixed => (nc / (2. * PI * PI) * self.fixed_as * dipole_factor, r),
            LoCoupling::Balitsky => {
                let alphas_x = self.alphas(x);
                let alphas_y = self.alphas(y);
                (
                    nc / (2. * PI * PI)
                        * self.alphas(r)
                        * (r * r / (x * x * y * y)
                            + 1. / (y * y) * (alphas_y / alphas_x - 1.)
                            + 1. / (x * x) * (alphas_x / alphas_y - 1.)),
                    r,
                )
            }
            LoCoupling::Smallest => (nc * self.alphas(min) / (2. * PI * PI) * dipole_factor, min),
            LoCoupling::Parent => (nc * self.alphas(r) / (2. * PI * PI) * dipole_factor, r),
            LoCoupling::Frac => {
                let asbar_r = self.alphas(r) * nc / PI;
                let asbar_x = self.alphas(x) * nc / PI;
                let asbar_y = self.alphas(y) * nc / PI;
                let effective = 1. / asbar_r
                    + (x * x - y * y) / (r * r) * (asbar_x - asbar_y) / (asbar_x * asbar_y);
                (1. / (2. * PI) / effective * dipole_factor, r)
            }
            LoCoupling::Guillaume => {
                let r_eff = (r * r * (y * y / (x * x)).powf((x * x - y * y) / (r * r))).sqrt();
                (nc * self.alphas(r_eff) / (2. * PI * PI) * dipole_factor, r_eff)
            }
        };

        if !result.is_finite() {
            result = 0.;
        }

        let resummation_alphas = match self.settings.resum_rc {
            ResummationCoupling::Smallest => self.alphas(min),
            ResummationCoupling::Guillaume => self.alphas(alphas_scale),
            ResummationCoupling::Parent
            | ResummationCoupling::Balitsky
            | ResummationCoupling::Fixed => self.alphas(r),
        };
        let alphabar = resummation_alphas * nc / PI;

        let dlog = if !self.settings.doublelog_lo_kernel
            || self.settings.resum_dlog
            || self.settings.kinematical_constraint == KinematicalConstraint::KPlus
        {
            0.
        } else {
            1.
        };

        let mut resum = 1.;
        if self.settings.resum_dlog && r > 1.01 * self.settings.min_r {
            // rho^2
            let rho_sqr = 4. * (x / r).ln() * (y / r).ln();
            let as_x = (alphabar * rho_sqr.abs()).sqrt();
            resum = if rho_sqr >= 0. {
                bessel_j1(2. * as_x) / as_x
            } else {
                bessel_i1(2. * as_x) / as_x
            };

            if resum.is_nan() {
                // 0/0 at rho = 0
                resum = 1.;
            } else if resum.is_infinite() {
                return 0.;
            }
        }

        let mut singlelog_resum = 1.;
        let mut singlelog_resum_expansion = 0.;
        if self.settings.resum_single_log {
            let mut minxy = x.min(y);
            if minxy.abs() < EPS {
                minxy = EPS;
            }
            let ksub = self.settings.ksub;
            singlelog_resum = (-alphabar * A1 * (ksub * (r / minxy).powi(2)).ln().abs()).exp();
            // order alpha_s^2 part, already included in K2
            singlelog_resum_expansion = -alphabar * A1 * (2. * (ksub.sqrt() * r / minxy).ln()).abs();
        }

        let alphas_k1 = self.alphas(alphas_scale);
        let lo_kernel = alphas_k1 * nc / (2. * PI * PI) * dipole_factor;
        let k1fin = lo_kernel * alphas_k1 * nc / (4. * PI)
            * (67. / 9. - PI * PI / 3. - 10. / 9. * self.nf / nc
                - dlog * 2. * 2. * (x / r).ln() * 2. * (y / r).ln());

        if self.settings.kinematical_constraint == KinematicalConstraint::KPlus && self.settings.nlo {
            return result + k1fin;
        }

        if !self.settings.resummation() {
            return result;
        }

        if !self.settings.nlo {
            return resum * singlelog_resum * result;
        }

        let subtract = if self.settings.resum_rc == ResummationCoupling::Balitsky {
            result * singlelog_resum_expansion
        } else {
            lo_kernel * singlelog_resum_expansion
        };

        resum * singlelog_resum * result - subtract + k1fin
    }

    /// Gluon part of the NLO kernel, without the alpha_s^2 Nc^2 / (8 pi^4) prefactor.
    pub fn kernel_nlo(&self, r: f64, x: f64, y: f64, x2: f64, y2: f64, z: f64) -> f64 {
        let xy2 = (x * y2).powi(2);
        let x2y = (x2 * y).powi(2);
        let z4 = z.powi(4);

        let kernel = -2. / z4
            + ((xy2 + x2y - 4. * (r * z).powi(2)) / (z4 * (xy2 - x2y))
                + r.powi(4) / (xy2 * (xy2 - x2y))
                + r * r / (xy2 * z * z))
                * 2.
                * (x * y2 / (x2 * y)).ln();

        if kernel.is_finite() {
            kernel
        } else {
            0.
        }
    }

    /// Quark loop part of the NLO kernel, scaled by Nf/Nc so that it shares the
    /// prefactor of `kernel_nlo`.
    pub fn kernel_nlo_fermion(&self, r: f64, x: f64, y: f64, x2: f64, y2: f64, z: f64) -> f64 {
        let xy2 = (x * y2).powi(2);
        let x2y = (x2 * y).powi(2);
        let z4 = z.powi(4);

        let kernel = (2. / z4
            - (xy2 + x2y - (r * z).powi(2)) / (z4 * (xy2 - x2y)) * 2. * (x * y2 / (x2 * y)).ln())
            * self.nf
            / self.nc;

        if kernel.is_finite() {
            kernel
        } else {
            0.
        }
    }

    /// alpha_s^2 Nc^2 / (8 pi^4) with the coupling scale of the NLO prescription.
    pub fn nlo_prefactor(&self, r: f64, x: f64, y: f64, x2: f64, y2: f64, z: f64) -> f64 {
        let alpha = match self.settings.rc_nlo {
            NloCoupling::Fixed => self.fixed_as,
            NloCoupling::Parent => self.alphas(r),
            NloCoupling::Smallest => self.alphas(r.min(x).min(y).min(x2).min(y2).min(z)),
        };
        (alpha * self.nc).powi(2) / (8. * PI.powi(4))
    }
}
