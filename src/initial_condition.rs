use crate::{InitialConditionModel, InitialConditionSettings};
use std::f64::consts::E;

/// Dipole amplitude at the initial rapidity.
pub trait InitialCondition: Send + Sync {
    fn dipole_amplitude(&self, r: f64) -> f64;
    /// Bjorken x at which the evolution starts
    fn x0(&self) -> f64;
    fn info(&self) -> String;
}

/// McLerran-Venugopalan model with anomalous dimension and infrared regulator e_c.
#[derive(Debug, Clone)]
pub struct MV {
    pub qsqr: f64,
    pub anomalous_dimension: f64,
    pub ec: f64,
    pub lambda_qcd: f64,
    pub x0: f64,
}

impl MV {
    pub fn new(qsqr: f64, anomalous_dimension: f64, ec: f64, lambda_qcd: f64, x0: f64) -> MV {
        MV {
            qsqr,
            anomalous_dimension,
            ec,
            lambda_qcd,
            x0,
        }
    }
}

impl InitialCondition for MV {
    fn dipole_amplitude(&self, r: f64) -> f64 {
        let exponent = (r * r * self.qsqr).powf(self.anomalous_dimension) / 4.
            * (1. / (r * self.lambda_qcd) + self.ec * E).ln();
        1. - (-exponent).exp()
    }

    fn x0(&self) -> f64 {
        self.x0
    }

    fn info(&self) -> String {
        format!(
            "MV initial condition, Q_s0^2={} GeV^2, gamma={}, e_c={}, Lambda_QCD={} GeV, x0={}",
            self.qsqr, self.anomalous_dimension, self.ec, self.lambda_qcd, self.x0
        )
    }
}

/// Golec-Biernat - Wusthoff saturation model.
#[derive(Debug, Clone)]
pub struct GBW {
    pub qsqr: f64,
    pub anomalous_dimension: f64,
    pub x0: f64,
}

impl InitialCondition for GBW {
    fn dipole_amplitude(&self, r: f64) -> f64 {
        1. - (-(r * r * self.qsqr).powf(self.anomalous_dimension) / 4.).exp()
    }

    fn x0(&self) -> f64 {
        self.x0
    }

    fn info(&self) -> String {
        format!(
            "GBW initial condition, Q_s0^2={} GeV^2, gamma={}, x0={}",
            self.qsqr, self.anomalous_dimension, self.x0
        )
    }
}

pub fn from_settings(settings: &InitialConditionSettings) -> Box<dyn InitialCondition> {
    match settings.model {
        InitialConditionModel::MV => Box::new(MV::new(
            settings.qsqr,
            settings.anomalous_dimension,
            settings.ec,
            settings.lambda_qcd,
            settings.x0,
        )),
        InitialConditionModel::GBW => Box::new(GBW {
            qsqr: settings.qsqr,
            anomalous_dimension: settings.anomalous_dimension,
            x0: settings.x0,
        }),
    }
}
