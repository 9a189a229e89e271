//! Weight/energy conversions.
//!
//! Weights are probabilities up to scale, energies their negated logs:
//! `weight = exp(-energy)`. Weight `0.0` and energy `+inf` both denote
//! an impossible cell, and a NaN energy is treated as `+inf`.

/// Converts a weight to its energy. Zero maps to `+inf`.
#[inline]
pub fn weight_to_energy(weight: f64) -> f64 {
    -weight.ln()
}

/// Converts an energy to its weight. `+inf` and NaN map to `0.0`.
#[inline]
pub fn energy_to_weight(energy: f64) -> f64 {
    if energy.is_nan() {
        0.0
    } else {
        (-energy).exp()
    }
}

/// Canonical stored form of an energy: NaN denotes an impossible cell
/// and is stored as `+inf`.
#[inline]
pub(crate) fn canon_energy(energy: f64) -> f64 {
    if energy.is_nan() {
        f64::INFINITY
    } else {
        energy
    }
}

/// Relative fuzzy comparison used for normalization totals.
#[inline]
pub(crate) fn fuzzy_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0)
}
