//! Rapidity shifts and step functions of the kinematical constraints.
//!
//! All sizes are transverse distances: `r` is the parent dipole, `x` and `y`
//! the two daughters.

/// Daughter sizes below this are treated as coinciding with a parent endpoint.
pub const SHIFT_FLOOR: f64 = 1e-10;
pub const EPS: f64 = 1e-50;

/// Rapidity shift of a daughter dipole in the projectile frame (K- ordering),
/// max(0, ln(r^2/x^2)).
pub fn rapidity_shift(r: f64, x: f64) -> f64 {
    if x < SHIFT_FLOOR {
        return 0.;
    }
    (r * r / (x * x)).ln().max(0.)
}

/// Shift of the K+ ordered constraint, max(0, ln(min(x^2, y^2)/r^2)).
pub fn k_plus_shift(r: f64, x: f64, y: f64) -> f64 {
    ((x * x).min(y * y) / (r * r)).ln().max(0.)
}

/// Combined shift that decides if the K- ordered emission is allowed at all.
pub fn k_minus_total_shift(r: f64, x: f64, y: f64) -> f64 {
    (r * r / (x * x + EPS).min(y * y + EPS)).ln().max(0.)
}

/// Rapidity shift of the target kinematical constraint for a parton of typical
/// virtuality `q0sqr`.
pub fn target_shift(q0sqr: f64, x: f64, y: f64) -> f64 {
    (1. / (q0sqr * (x * x).min(y * y) + EPS)).ln()
}

pub fn step_function(x: f64) -> f64 {
    if x >= 0. {
        1.
    } else {
        0.
    }
}

/// True when the momentum fraction x0 e^{-y} of the emitted gluon exceeds the
/// reference fraction, in which case the emission is kinematically forbidden.
pub fn exceeds_reference_fraction(x0: f64, rapidity: f64, reference: f64) -> bool {
    x0 * (-rapidity).exp() > reference
}
