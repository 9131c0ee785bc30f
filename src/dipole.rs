use crate::initial_condition::InitialCondition;
use crate::interpolation::Interpolator;
use crate::GridSettings;
use color_eyre::{Report, Section};
use eyre::{bail, eyre, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

/// Amplitude N(r, y) stored on a fixed grid of dipole sizes at a growing set of rapidities.
pub trait AmplitudeGrid: Sync {
    fn r_points(&self) -> usize;
    fn r_val(&self, index: usize) -> f64;
    fn min_r(&self) -> f64;
    fn max_r(&self) -> f64;
    /// Amplitude at the slice selected with `initialize_interpolation`
    fn n(&self, r: f64) -> f64;
    fn initialize_interpolation(&mut self, slice: usize) -> Result<(), Report>;
    /// Append a slice and return its index. Rapidities must be strictly increasing.
    fn add_rapidity(&mut self, rapidity: f64, amplitude: &[f64]) -> Result<usize, Report>;
    fn interpolate_n(&self, r: f64, rapidity: f64) -> f64;
    fn save(&self, path: &str) -> Result<(), Report>;
    fn initial_condition(&self) -> &dyn InitialCondition;
    fn rapidities(&self) -> Vec<f64>;
    fn amplitudes_at(&self, slice: usize) -> &[f64];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapiditySlice {
    pub rapidity: f64,
    pub amplitude: Vec<f64>,
}

/// Checkpoint content: everything but the initial condition model and the interpolators.
#[derive(Debug, Serialize, Deserialize)]
struct DipoleSnapshot {
    r_values: Vec<f64>,
    slices: Vec<RapiditySlice>,
    initial_condition: String,
}

#[derive(Serialize)]
struct DipoleOutput<'a> {
    initial_condition: String,
    r_values: &'a [f64],
    slices: &'a [RapiditySlice],
}

pub struct Dipole {
    r_values: Vec<f64>,
    slices: Vec<RapiditySlice>,
    interpolators: Vec<Interpolator>,
    current: usize,
    ic: Box<dyn InitialCondition>,
}

impl Dipole {
    /// Sample the initial condition at r_i = min_r * r_multiplier^i, i < r_points.
    pub fn new(ic: Box<dyn InitialCondition>, grid: &GridSettings) -> Result<Dipole, Report> {
        if !(grid.min_r > 0.) || !(grid.r_multiplier > 1.) || grid.r_points < 3 {
            return Err(eyre!(
                "Invalid dipole grid: min_r={}, r_multiplier={}, r_points={}",
                grid.min_r,
                grid.r_multiplier,
                grid.r_points
            ))
            .suggestion("Use min_r > 0, r_multiplier > 1 and at least 3 points");
        }

        let r_values: Vec<f64> = (0..grid.r_points)
            .map(|i| grid.min_r * grid.r_multiplier.powi(i as i32))
            .collect();
        let amplitude: Vec<f64> = r_values.iter().map(|&r| ic.dipole_amplitude(r)).collect();

        Dipole::from_slices(
            r_values,
            vec![RapiditySlice {
                rapidity: 0.,
                amplitude,
            }],
            ic,
        )
    }

    fn from_slices(
        r_values: Vec<f64>,
        slices: Vec<RapiditySlice>,
        ic: Box<dyn InitialCondition>,
    ) -> Result<Dipole, Report> {
        let interpolators = slices
            .iter()
            .map(|s| Interpolator::new(&r_values, &s.amplitude))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dipole {
            r_values,
            slices,
            interpolators,
            current: 0,
            ic,
        })
    }

    /// Restore a checkpoint written by `save`. The initial condition is not
    /// serialized and has to be supplied again.
    pub fn load(path: &str, ic: Box<dyn InitialCondition>) -> Result<Dipole, Report> {
        let f = File::open(path)
            .wrap_err_with(|| format!("Could not open checkpoint {}", path))
            .suggestion("Does the path exist?")?;
        let snapshot: DipoleSnapshot = bincode::deserialize_from(BufReader::new(f))
            .wrap_err_with(|| format!("Could not read checkpoint {}", path))?;

        if snapshot.slices.is_empty() {
            bail!("Checkpoint {} contains no rapidity slices", path);
        }

        let mut dipole = Dipole::from_slices(snapshot.r_values, snapshot.slices, ic)?;
        dipole.current = dipole.slices.len() - 1;
        Ok(dipole)
    }

    /// Write all slices as a YAML document.
    pub fn write_yaml(&self, path: &str) -> Result<(), Report> {
        let output = DipoleOutput {
            initial_condition: self.ic.info(),
            r_values: &self.r_values,
            slices: &self.slices,
        };

        let f = File::create(path).wrap_err_with(|| format!("Could not create output file {}", path))?;
        let mut writer = BufWriter::new(f);
        serde_yaml::to_writer(&mut writer, &output).wrap_err("Could not serialize the dipole amplitude")?;
        writeln!(writer, "...").wrap_err("Could not write the output file")?;
        Ok(())
    }

    pub fn r_values(&self) -> &[f64] {
        &self.r_values
    }

    pub fn slices(&self) -> &[RapiditySlice] {
        &self.slices
    }

    pub fn current_slice(&self) -> usize {
        self.current
    }
}

impl AmplitudeGrid for Dipole {
    fn r_points(&self) -> usize {
        self.r_values.len()
    }

    fn r_val(&self, index: usize) -> f64 {
        self.r_values[index]
    }

    fn min_r(&self) -> f64 {
        self.r_values[0]
    }

    fn max_r(&self) -> f64 {
        self.r_values[self.r_values.len() - 1]
    }

    fn n(&self, r: f64) -> f64 {
        self.interpolators[self.current].evaluate(r)
    }

    fn initialize_interpolation(&mut self, slice: usize) -> Result<(), Report> {
        if slice >= self.slices.len() {
            bail!(
                "Cannot interpolate at slice {}, only {} rapidities stored",
                slice,
                self.slices.len()
            );
        }
        self.current = slice;
        Ok(())
    }

    fn add_rapidity(&mut self, rapidity: f64, amplitude: &[f64]) -> Result<usize, Report> {
        if amplitude.len() != self.r_values.len() {
            bail!(
                "Amplitude has {} values but the grid has {} points",
                amplitude.len(),
                self.r_values.len()
            );
        }
        if let Some(last) = self.slices.last() {
            if !(rapidity > last.rapidity) {
                bail!(
                    "Rapidity {} does not follow the last stored rapidity {}",
                    rapidity,
                    last.rapidity
                );
            }
        }

        self.interpolators.push(Interpolator::new(&self.r_values, amplitude)?);
        self.slices.push(RapiditySlice {
            rapidity,
            amplitude: amplitude.to_vec(),
        });
        Ok(self.slices.len() - 1)
    }

    /// Linear in rapidity between the neighbouring slices; below the first and
    /// above the last slice the boundary slice is used.
    fn interpolate_n(&self, r: f64, rapidity: f64) -> f64 {
        let upper = self.slices.partition_point(|s| s.rapidity < rapidity);

        if upper == 0 {
            return self.interpolators[0].evaluate(r);
        }
        if upper == self.slices.len() {
            return self.interpolators[upper - 1].evaluate(r);
        }
        if self.slices[upper].rapidity == rapidity {
            return self.interpolators[upper].evaluate(r);
        }

        let (y0, y1) = (self.slices[upper - 1].rapidity, self.slices[upper].rapidity);
        let t = (rapidity - y0) / (y1 - y0);
        (1. - t) * self.interpolators[upper - 1].evaluate(r) + t * self.interpolators[upper].evaluate(r)
    }

    fn save(&self, path: &str) -> Result<(), Report> {
        let snapshot = DipoleSnapshot {
            r_values: self.r_values.clone(),
            slices: self.slices.clone(),
            initial_condition: self.ic.info(),
        };

        let f = File::create(path).wrap_err_with(|| format!("Could not create checkpoint {}", path))?;
        let mut writer = BufWriter::new(f);
        bincode::serialize_into(&mut writer, &snapshot)
            .wrap_err_with(|| format!("Could not write checkpoint {}", path))?;
        writer
            .flush()
            .wrap_err_with(|| format!("Could not write checkpoint {}", path))
    }

    fn initial_condition(&self) -> &dyn InitialCondition {
        self.ic.as_ref()
    }

    fn rapidities(&self) -> Vec<f64> {
        self.slices.iter().map(|s| s.rapidity).collect()
    }

    fn amplitudes_at(&self, slice: usize) -> &[f64] {
        &self.slices[slice].amplitude
    }
}
