//! Gravitational force laws for the n-body engine
//!
//! Every law is expressed through a radial kernel `g(d²)` so that the pull of
//! body j on body i is
//!
//! ```text
//! a_i += m_j * g(d²) * (r_j - r_i),   d² = |r_j - r_i|² + eps2
//! ```
//!
//! The law is chosen once per sweep (`with_kernel!`) and the pair loop is
//! monomorphised for it, so there is no dispatch inside the O(N²) loops.

use serde::Deserialize;

use crate::simulation::states::{BodyArrays, NVec3};

/// Radial kernel of a force law
pub trait Kernel {
    /// Acceleration factor per unit source mass and unit separation
    fn g(d2: f64) -> f64;
    /// `g` together with its derivative with respect to d², for jerk terms
    fn g_dg(d2: f64) -> (f64, f64);
    /// Pair potential per unit mass product, chosen so that F = -dU/dr
    fn potential(d2: f64) -> f64;
}

/// F ∝ 1/r² (Newton)
pub struct InverseSquare;
/// F ∝ 1/r
pub struct InverseR;
/// F ∝ 1/r³
pub struct InverseR3;
/// F ∝ r
pub struct Linear;
/// F ∝ r²
pub struct Quadratic;

impl Kernel for InverseSquare {
    #[inline]
    fn g(d2: f64) -> f64 {
        let inv_r = d2.sqrt().recip();
        inv_r * inv_r * inv_r
    }
    #[inline]
    fn g_dg(d2: f64) -> (f64, f64) {
        let g = Self::g(d2);
        (g, -1.5 * g / d2)
    }
    #[inline]
    fn potential(d2: f64) -> f64 {
        -d2.sqrt().recip()
    }
}

impl Kernel for InverseR {
    #[inline]
    fn g(d2: f64) -> f64 {
        d2.recip()
    }
    #[inline]
    fn g_dg(d2: f64) -> (f64, f64) {
        let g = d2.recip();
        (g, -g * g)
    }
    #[inline]
    fn potential(d2: f64) -> f64 {
        0.5 * d2.ln()
    }
}

impl Kernel for InverseR3 {
    #[inline]
    fn g(d2: f64) -> f64 {
        let inv = d2.recip();
        inv * inv
    }
    #[inline]
    fn g_dg(d2: f64) -> (f64, f64) {
        let inv = d2.recip();
        (inv * inv, -2.0 * inv * inv * inv)
    }
    #[inline]
    fn potential(d2: f64) -> f64 {
        -0.5 * d2.recip()
    }
}

impl Kernel for Linear {
    #[inline]
    fn g(_d2: f64) -> f64 {
        1.0
    }
    #[inline]
    fn g_dg(_d2: f64) -> (f64, f64) {
        (1.0, 0.0)
    }
    #[inline]
    fn potential(d2: f64) -> f64 {
        0.5 * d2
    }
}

impl Kernel for Quadratic {
    #[inline]
    fn g(d2: f64) -> f64 {
        d2.sqrt()
    }
    #[inline]
    fn g_dg(d2: f64) -> (f64, f64) {
        let d = d2.sqrt();
        (d, 0.5 / d)
    }
    #[inline]
    fn potential(d2: f64) -> f64 {
        d2 * d2.sqrt() / 3.0
    }
}

/// Selectable force law
/// force: "inverse_square" | "inverse_r" | "inverse_r3" | "linear" | "quadratic"
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForceLaw {
    #[default]
    InverseSquare,
    InverseR,
    InverseR3,
    Linear,
    Quadratic,
}

/// Bind the kernel type for `$law` to `$k` and evaluate `$body` with it
macro_rules! with_kernel {
    ($law:expr, $k:ident => $body:expr) => {
        match $law {
            ForceLaw::InverseSquare => {
                type $k = InverseSquare;
                $body
            }
            ForceLaw::InverseR => {
                type $k = InverseR;
                $body
            }
            ForceLaw::InverseR3 => {
                type $k = InverseR3;
                $body
            }
            ForceLaw::Linear => {
                type $k = Linear;
                $body
            }
            ForceLaw::Quadratic => {
                type $k = Quadratic;
                $body
            }
        }
    };
}

/// Softened gravity under a chosen law. Masses are already in physics units
/// (scaled by the mass scale), so there is no separate G here
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub law: ForceLaw,
    pub eps2: f64, // softening squared
}

impl Gravity {
    pub fn new(law: ForceLaw, softening: f64) -> Self {
        Self { law, eps2: softening * softening }
    }

    /// Accelerations of the first `bodies.len()` entries of `out`.
    /// Inactive bodies neither pull nor get pulled
    pub fn accelerations(&self, bodies: &BodyArrays, out: &mut [NVec3]) {
        with_kernel!(self.law, K => pair_accelerations::<K>(bodies, self.eps2, out))
    }

    /// Accelerations and their time derivatives (jerk), for Hermite
    pub fn accelerations_and_jerks(
        &self,
        bodies: &BodyArrays,
        v: &[NVec3],
        acc: &mut [NVec3],
        jerk: &mut [NVec3],
    ) {
        with_kernel!(self.law, K => pair_jerks::<K>(bodies, v, self.eps2, acc, jerk))
    }

    /// Pull of the active massive bodies on test points that exert no force
    pub fn field(&self, bodies: &BodyArrays, points: &[NVec3], active: &[bool], out: &mut [NVec3]) {
        with_kernel!(self.law, K => test_field::<K>(bodies, points, active, self.eps2, out))
    }

    /// Σ_{i<j} m_i m_j U(d²) over active bodies
    pub fn potential_energy(&self, bodies: &BodyArrays) -> f64 {
        with_kernel!(self.law, K => pair_potential::<K>(bodies, self.eps2))
    }
}

fn pair_accelerations<K: Kernel>(bodies: &BodyArrays, eps2: f64, out: &mut [NVec3]) {
    let n = bodies.len();
    for a in out[..n].iter_mut() {
        *a = NVec3::zeros();
    }

    // each unordered pair once, equal and opposite
    for i in 0..n {
        if !bodies.is_active(i) {
            continue;
        }
        let xi = bodies.r[i];
        let mi = bodies.m[i];
        for j in (i + 1)..n {
            if !bodies.is_active(j) {
                continue;
            }
            let r = bodies.r[j] - xi;
            let coef = K::g(r.dot(&r) + eps2);
            out[i] += coef * bodies.m[j] * r;
            out[j] -= coef * mi * r;
        }
    }
}

fn pair_jerks<K: Kernel>(
    bodies: &BodyArrays,
    v: &[NVec3],
    eps2: f64,
    acc: &mut [NVec3],
    jerk: &mut [NVec3],
) {
    let n = bodies.len();
    for i in 0..n {
        acc[i] = NVec3::zeros();
        jerk[i] = NVec3::zeros();
    }

    for i in 0..n {
        if !bodies.is_active(i) {
            continue;
        }
        let mi = bodies.m[i];
        for j in (i + 1)..n {
            if !bodies.is_active(j) {
                continue;
            }
            let r = bodies.r[j] - bodies.r[i];
            let w = v[j] - v[i];
            let (g, dg) = K::g_dg(r.dot(&r) + eps2);
            // d/dt [g(d²) r] = g w + 2 g'(d²) (r·w) r
            let a = g * r;
            let j_term = g * w + 2.0 * dg * r.dot(&w) * r;
            acc[i] += bodies.m[j] * a;
            acc[j] -= mi * a;
            jerk[i] += bodies.m[j] * j_term;
            jerk[j] -= mi * j_term;
        }
    }
}

fn test_field<K: Kernel>(
    bodies: &BodyArrays,
    points: &[NVec3],
    active: &[bool],
    eps2: f64,
    out: &mut [NVec3],
) {
    for (k, p) in points.iter().enumerate() {
        let mut a = NVec3::zeros();
        if active[k] {
            for j in 0..bodies.len() {
                if !bodies.is_active(j) {
                    continue;
                }
                let r = bodies.r[j] - p;
                a += bodies.m[j] * K::g(r.dot(&r) + eps2) * r;
            }
        }
        out[k] = a;
    }
}

fn pair_potential<K: Kernel>(bodies: &BodyArrays, eps2: f64) -> f64 {
    let n = bodies.len();
    let mut u = 0.0;
    for i in 0..n {
        if !bodies.is_active(i) {
            continue;
        }
        for j in (i + 1)..n {
            if !bodies.is_active(j) {
                continue;
            }
            let r = bodies.r[j] - bodies.r[i];
            u += bodies.m[i] * bodies.m[j] * K::potential(r.dot(&r) + eps2);
        }
    }
    u
}
