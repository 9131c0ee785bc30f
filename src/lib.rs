#[macro_use]
extern crate itertools;

use color_eyre::{Report, Section};
use eyre::{bail, WrapErr};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;

pub mod coupling;
pub mod dashboard;
pub mod dipole;
pub mod initial_condition;
pub mod interpolation;
pub mod kernels;
pub mod kinematics;
pub mod monte_carlo;
pub mod quadrature;
pub mod solver;
pub mod special;
pub mod stepper;

/// Numerical floor below which dipole sizes are treated as zero.
pub const MIN_R: f64 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoCoupling {
    #[serde(rename = "fixed")]
    Fixed,
    #[serde(rename = "balitsky")]
    Balitsky,
    #[serde(rename = "smallest")]
    Smallest,
    #[serde(rename = "parent")]
    Parent,
    /// Fastest apparent convergence
    #[serde(rename = "frac")]
    Frac,
    /// Position-dependent effective scale
    #[serde(rename = "guillaume")]
    Guillaume,
}

impl Default for LoCoupling {
    fn default() -> LoCoupling {
        LoCoupling::Balitsky
    }
}

impl fmt::Display for LoCoupling {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoCoupling::Fixed => write!(f, "fixed"),
            LoCoupling::Balitsky => write!(f, "balitsky"),
            LoCoupling::Smallest => write!(f, "smallest dipole"),
            LoCoupling::Parent => write!(f, "parent dipole"),
            LoCoupling::Frac => write!(f, "fastest apparent convergence"),
            LoCoupling::Guillaume => write!(f, "effective scale"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NloCoupling {
    #[serde(rename = "fixed")]
    Fixed,
    #[serde(rename = "parent")]
    Parent,
    #[serde(rename = "smallest")]
    Smallest,
}

impl Default for NloCoupling {
    fn default() -> NloCoupling {
        NloCoupling::Smallest
    }
}

impl fmt::Display for NloCoupling {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NloCoupling::Fixed => write!(f, "fixed"),
            NloCoupling::Parent => write!(f, "parent dipole"),
            NloCoupling::Smallest => write!(f, "smallest dipole"),
        }
    }
}

/// Scale of the coupling inside the double and single log resummation factors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResummationCoupling {
    #[serde(rename = "parent")]
    Parent,
    #[serde(rename = "smallest")]
    Smallest,
    #[serde(rename = "guillaume")]
    Guillaume,
    #[serde(rename = "balitsky")]
    Balitsky,
    #[serde(rename = "fixed")]
    Fixed,
}

impl Default for ResummationCoupling {
    fn default() -> ResummationCoupling {
        ResummationCoupling::Smallest
    }
}

impl fmt::Display for ResummationCoupling {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResummationCoupling::Parent => write!(f, "parent dipole"),
            ResummationCoupling::Smallest => write!(f, "smallest dipole"),
            ResummationCoupling::Guillaume => write!(f, "effective scale"),
            ResummationCoupling::Balitsky => write!(f, "balitsky"),
            ResummationCoupling::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KinematicalConstraint {
    #[serde(rename = "none")]
    None,
    /// Target frame constraint with the K+ ordering
    #[serde(rename = "k_plus")]
    KPlus,
    /// Projectile frame resummed constraint with the K- ordering
    #[serde(rename = "k_minus")]
    KMinus,
}

impl Default for KinematicalConstraint {
    fn default() -> KinematicalConstraint {
        KinematicalConstraint::None
    }
}

impl fmt::Display for KinematicalConstraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KinematicalConstraint::None => write!(f, "none"),
            KinematicalConstraint::KPlus => write!(f, "K+ (target frame)"),
            KinematicalConstraint::KMinus => write!(f, "K- (projectile frame, resummed)"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stepper {
    #[serde(rename = "adaptive")]
    Adaptive,
    #[serde(rename = "euler")]
    Euler,
}

impl Default for Stepper {
    fn default() -> Stepper {
        Stepper::Adaptive
    }
}

impl fmt::Display for Stepper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stepper::Adaptive => write!(f, "adaptive rk2"),
            Stepper::Euler => write!(f, "euler"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NloIntegration {
    /// Four nested one-dimensional adaptive quadratures
    #[serde(rename = "multiple")]
    Multiple,
    #[serde(rename = "vegas")]
    Vegas,
    #[serde(rename = "miser")]
    Miser,
}

impl Default for NloIntegration {
    fn default() -> NloIntegration {
        NloIntegration::Multiple
    }
}

impl fmt::Display for NloIntegration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NloIntegration::Multiple => write!(f, "nested quadrature"),
            NloIntegration::Vegas => write!(f, "vegas"),
            NloIntegration::Miser => write!(f, "miser"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialConditionModel {
    #[serde(rename = "mv")]
    MV,
    #[serde(rename = "gbw")]
    GBW,
}

impl Default for InitialConditionModel {
    fn default() -> InitialConditionModel {
        InitialConditionModel::MV
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub verbose: bool,
    /// Send the (r, lo, nlo, N) table of every right-hand side evaluation to the log
    pub print_derivatives: bool,
    pub force_positive_n: bool,
    pub output: String,
    pub checkpoint: Option<String>,
}

impl Default for GeneralSettings {
    fn default() -> GeneralSettings {
        GeneralSettings {
            verbose: false,
            print_derivatives: false,
            force_positive_n: true,
            output: "bk_evolution.yaml".to_owned(),
            checkpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    pub stepper: Stepper,
    pub step_size: f64,
    pub max_rapidity: f64,
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    /// Amplitudes above this value are not evolved
    pub saturation_freeze: f64,
}

impl Default for EvolutionSettings {
    fn default() -> EvolutionSettings {
        EvolutionSettings {
            stepper: Stepper::Adaptive,
            step_size: 0.2,
            max_rapidity: 10.,
            abs_tolerance: 1e-5,
            rel_tolerance: 1e-5,
            saturation_freeze: 0.99999,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    pub rc_lo: LoCoupling,
    pub rc_nlo: NloCoupling,
    pub resum_rc: ResummationCoupling,
    pub kinematical_constraint: KinematicalConstraint,
    pub target_kinematical_constraint: bool,
    pub resum_dlog: bool,
    pub resum_single_log: bool,
    /// Subtraction constant inside the single log resummation
    pub ksub: f64,
    pub doublelog_lo_kernel: bool,
    /// Include the NLO kernel (K2 and the finite part of K1)
    pub nlo: bool,
    pub min_r: f64,
}

impl Default for KernelSettings {
    fn default() -> KernelSettings {
        KernelSettings {
            rc_lo: LoCoupling::Balitsky,
            rc_nlo: NloCoupling::Smallest,
            resum_rc: ResummationCoupling::Smallest,
            kinematical_constraint: KinematicalConstraint::None,
            target_kinematical_constraint: false,
            resum_dlog: false,
            resum_single_log: false,
            ksub: 0.65,
            doublelog_lo_kernel: true,
            nlo: true,
            min_r: MIN_R,
        }
    }
}

impl KernelSettings {
    pub fn resummation(&self) -> bool {
        self.resum_dlog || self.resum_single_log
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingSettings {
    pub nc: f64,
    pub nf: f64,
    pub fixed_as: f64,
    pub lambda_qcd: f64,
    /// C^2 in the coordinate space scale 4 C^2 / r^2
    pub alphas_scaling: f64,
    pub max_alphas: f64,
    /// Infrared freezing scale mu0 / Lambda
    pub freeze_mu0: f64,
    pub freeze_c: f64,
}

impl Default for CouplingSettings {
    fn default() -> CouplingSettings {
        CouplingSettings {
            nc: 3.,
            nf: 3.,
            fixed_as: 0.2,
            lambda_qcd: 0.241,
            alphas_scaling: 1.0,
            max_alphas: 1.0,
            freeze_mu0: 2.5,
            freeze_c: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub r_int_points: usize,
    pub theta_int_points: usize,
    pub accuracy: f64,
    pub nlo_method: NloIntegration,
    pub mc_calls: usize,
    pub mc_accuracy: f64,
    /// Fixed Monte Carlo seed. Without it every call is seeded from the wall clock.
    pub mc_seed: Option<u64>,
    pub vegas_max_iterations: usize,
    pub vegas_max_relative_error: f64,
    pub vegas_max_chisq_deviation: f64,
    pub miser_max_attempts: usize,
}

impl Default for IntegrationSettings {
    fn default() -> IntegrationSettings {
        IntegrationSettings {
            r_int_points: 400,
            theta_int_points: 400,
            accuracy: 0.005,
            nlo_method: NloIntegration::Multiple,
            mc_calls: 100000,
            mc_accuracy: 0.05,
            mc_seed: None,
            vegas_max_iterations: 3,
            vegas_max_relative_error: 0.3,
            vegas_max_chisq_deviation: 0.5,
            miser_max_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub min_r: f64,
    pub r_multiplier: f64,
    pub r_points: usize,
}

impl Default for GridSettings {
    fn default() -> GridSettings {
        GridSettings {
            min_r: 1e-6,
            r_multiplier: 1.1,
            r_points: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConditionSettings {
    pub model: InitialConditionModel,
    pub qsqr: f64,
    pub anomalous_dimension: f64,
    pub ec: f64,
    pub lambda_qcd: f64,
    pub x0: f64,
    /// Reference momentum fraction of the kinematical constraint step function
    pub icx0_nlo_impfac: f64,
    pub typical_parton_virtuality_q0sqr: f64,
}

impl Default for InitialConditionSettings {
    fn default() -> InitialConditionSettings {
        InitialConditionSettings {
            model: InitialConditionModel::MV,
            qsqr: 0.2,
            anomalous_dimension: 1.0,
            ec: 1.0,
            lambda_qcd: 0.241,
            x0: 0.01,
            icx0_nlo_impfac: 1.0,
            typical_parton_virtuality_q0sqr: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "General", default)]
    pub general: GeneralSettings,
    #[serde(rename = "Evolution", default)]
    pub evolution: EvolutionSettings,
    #[serde(rename = "Kernel", default)]
    pub kernel: KernelSettings,
    #[serde(rename = "Coupling", default)]
    pub coupling: CouplingSettings,
    #[serde(rename = "Integration", default)]
    pub integration: IntegrationSettings,
    #[serde(rename = "Grid", default)]
    pub grid: GridSettings,
    #[serde(rename = "InitialCondition", default)]
    pub initial_condition: InitialConditionSettings,
}

impl Settings {
    pub fn from_file(filename: &str) -> Result<Settings, Report> {
        let f = File::open(filename)
            .wrap_err_with(|| format!("Could not open settings file {}", filename))
            .suggestion("Does the path exist?")?;
        serde_yaml::from_reader(f)
            .wrap_err("Could not parse settings file")
            .suggestion("Is it a correct yaml file")
    }

    /// Check the combinations of kernel, constraint and stepper options that
    /// cannot be evolved together.
    pub fn validate(&self) -> Result<(), Report> {
        let kernel = &self.kernel;

        if kernel.resum_dlog && kernel.kinematical_constraint != KinematicalConstraint::None {
            bail!(
                "Double log resummation cannot be combined with the kinematical constraint {}",
                kernel.kinematical_constraint
            );
        }

        if kernel.kinematical_constraint != KinematicalConstraint::None
            && self.evolution.stepper != Stepper::Euler
        {
            bail!(
                "Kinematical constraint {} requires the euler stepper, not {}",
                kernel.kinematical_constraint,
                self.evolution.stepper
            );
        }

        if kernel.kinematical_constraint == KinematicalConstraint::KPlus
            && kernel.nlo
            && kernel.resummation()
        {
            bail!("The K+ kinematical constraint with NLO corrections cannot be combined with log resummation");
        }

        if !(self.evolution.step_size > 0.) {
            bail!(
                "The rapidity step size must be positive, got {}",
                self.evolution.step_size
            );
        }

        Ok(())
    }
}
