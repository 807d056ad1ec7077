//! Kinematic vector types used by the response estimators.
//!
//! The estimators only ever need two shapes: a 2D polar vector in the
//! transverse plane (momentum magnitude + azimuth) for the projection-based
//! responses, and a full four-vector for composite tags (Z boson from a
//! lepton pair, recoil jet-system in the multijet channel).

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Wrap an azimuthal difference `a - b` into `(-pi, pi]`.
pub fn delta_phi(a: f64, b: f64) -> f64 {
    let mut d = a - b;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d <= -PI {
        d += 2.0 * PI;
    }
    d
}

/// Angular distance in the eta-phi plane.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    (deta * deta + dphi * dphi).sqrt()
}

/// A 2D polar vector in the transverse plane: magnitude and azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarVec2 {
    /// Magnitude (transverse momentum).
    pub mag: f64,
    /// Azimuthal angle in radians.
    pub phi: f64,
}

impl PolarVec2 {
    /// Construct from magnitude and azimuth.
    pub fn new(mag: f64, phi: f64) -> Self {
        Self { mag, phi }
    }

    /// Dot product: `|A| |B| cos(delta_phi)`.
    pub fn dot(&self, other: &PolarVec2) -> f64 {
        self.mag * other.mag * delta_phi(self.phi, other.phi).cos()
    }

    /// Vector sum, computed via cartesian components.
    pub fn add(&self, other: &PolarVec2) -> PolarVec2 {
        let x = self.mag * self.phi.cos() + other.mag * other.phi.cos();
        let y = self.mag * self.phi.sin() + other.mag * other.phi.sin();
        PolarVec2 { mag: (x * x + y * y).sqrt(), phi: y.atan2(x) }
    }
}

/// A four-vector stored in cartesian components.
///
/// Built from `(pt, eta, phi, mass)` and summed component-wise; used where a
/// tag is a composite object rather than a single jet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FourVec {
    /// x momentum component.
    pub px: f64,
    /// y momentum component.
    pub py: f64,
    /// z momentum component.
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl FourVec {
    /// Construct from collider coordinates `(pt, eta, phi, mass)`.
    pub fn from_ptetaphim(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e = (p2 + mass * mass).sqrt();
        Self { px, py, pz, e }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        (self.px * self.px + self.py * self.py).sqrt()
    }

    /// Pseudorapidity. Returns 0.0 for a zero transverse+longitudinal vector.
    pub fn eta(&self) -> f64 {
        let p = (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt();
        if p == 0.0 {
            return 0.0;
        }
        let denom = p - self.pz;
        if denom <= 0.0 {
            // Along the beam axis; saturate rather than return inf.
            return if self.pz >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
        }
        0.5 * ((p + self.pz) / denom).ln()
    }

    /// Azimuthal angle.
    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }

    /// Invariant mass. Spacelike vectors (from subtraction round-off) clamp
    /// to zero.
    pub fn mass(&self) -> f64 {
        let m2 =
            self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz);
        if m2 > 0.0 { m2.sqrt() } else { 0.0 }
    }

    /// Transverse-plane polar view of this vector.
    pub fn polar(&self) -> PolarVec2 {
        PolarVec2 { mag: self.pt(), phi: self.phi() }
    }
}

impl std::ops::Add for FourVec {
    type Output = FourVec;

    fn add(self, rhs: FourVec) -> FourVec {
        FourVec {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

impl std::ops::Sub for FourVec {
    type Output = FourVec;

    fn sub(self, rhs: FourVec) -> FourVec {
        FourVec {
            px: self.px - rhs.px,
            py: self.py - rhs.py,
            pz: self.pz - rhs.pz,
            e: self.e - rhs.e,
        }
    }
}

impl std::iter::Sum for FourVec {
    fn sum<I: Iterator<Item = FourVec>>(iter: I) -> FourVec {
        iter.fold(FourVec::default(), |acc, v| acc + v)
    }
}
