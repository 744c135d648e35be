//! Piecewise quadratic Bézier response curves
//!
//! A curve has 2-4 points sorted by `x`, each adjacent pair joined by one
//! quadratic segment with its own control point. Evaluation solves
//! `x(t) = x_in` for the segment parameter with integer arithmetic only,
//! `t` in 1/1024 steps, then evaluates `y(t)`.

use core::fmt;

use heapless::Vec;
use picontrol_protocol::mapping::{WireCurve, MAX_CURVE_POINTS};
use serde::{Deserialize, Serialize};

use super::MappingError;

/// Fixed-point representation of t = 1.0
const T_ONE: i64 = 1024;

/// Roots this far outside [0, 1] are snapped onto the nearest end
const T_TOLERANCE: i64 = 50;

/// A curve point or control point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurvePoint {
    pub x: u8,
    pub y: u8,
}

impl CurvePoint {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

/// Response curve applied to normalized 0-255 values
///
/// Either empty (identity) or 2-4 points with one control per segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Curve {
    points: Vec<CurvePoint, MAX_CURVE_POINTS>,
    controls: Vec<CurvePoint, { MAX_CURVE_POINTS - 1 }>,
}

impl Default for Curve {
    fn default() -> Self {
        Self::linear()
    }
}

impl Curve {
    /// Straight line from (0,0) to (255,255)
    pub fn linear() -> Self {
        let mut points = Vec::new();
        let mut controls = Vec::new();
        // Capacity is at least two points and one control
        let _ = points.push(CurvePoint::new(0, 0));
        let _ = points.push(CurvePoint::new(255, 255));
        let _ = controls.push(CurvePoint::new(127, 127));
        Self { points, controls }
    }

    /// A curve with no points, evaluating to its input
    pub const fn identity() -> Self {
        Self {
            points: Vec::new(),
            controls: Vec::new(),
        }
    }

    /// Build a validated curve
    pub fn new(points: &[CurvePoint], controls: &[CurvePoint]) -> Result<Self, MappingError> {
        if points.len() < 2
            || points.len() > MAX_CURVE_POINTS
            || controls.len() + 1 != points.len()
            || points.windows(2).any(|w| w[0].x > w[1].x)
        {
            return Err(MappingError::InvalidCurve);
        }
        Ok(Self {
            points: Vec::from_slice(points).map_err(|_| MappingError::InvalidCurve)?,
            controls: Vec::from_slice(controls).map_err(|_| MappingError::InvalidCurve)?,
        })
    }

    /// Re-check the shape of a curve built by deserialization
    pub fn validated(self) -> Option<Self> {
        if self.points.is_empty() && self.controls.is_empty() {
            return Some(self);
        }
        Self::new(&self.points, &self.controls).ok()
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn controls(&self) -> &[CurvePoint] {
        &self.controls
    }

    /// Evaluate the curve at `x`
    pub fn eval(&self, x: u8) -> u8 {
        if self.points.len() < 2 {
            return x;
        }

        for (i, pair) in self.points.windows(2).enumerate() {
            let (p0, p1) = (pair[0], pair[1]);
            if x > p1.x {
                continue;
            }
            let Some(c) = self.controls.get(i) else {
                return x;
            };
            let t = solve_t(p0.x as i64, c.x as i64, p1.x as i64, x as i64);
            let y = bezier(p0.y as i64, c.y as i64, p1.y as i64, t);
            return y.clamp(0, 255) as u8;
        }

        self.points.last().map_or(x, |p| p.y)
    }

    /// Decode the `count, points, controls` byte layout used by the console
    ///
    /// A count below 2 yields the identity curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MappingError> {
        let (&count, body) = bytes.split_first().ok_or(MappingError::InvalidCurve)?;
        let count = count as usize;
        if count < 2 {
            return Ok(Self::identity());
        }
        if count > MAX_CURVE_POINTS || body.len() < count * 2 + (count - 1) * 2 {
            return Err(MappingError::InvalidCurve);
        }

        let mut pairs = body
            .chunks_exact(2)
            .map(|pair| CurvePoint::new(pair[0], pair[1]));
        let points: Vec<CurvePoint, MAX_CURVE_POINTS> = pairs.by_ref().take(count).collect();
        let controls: Vec<CurvePoint, { MAX_CURVE_POINTS - 1 }> =
            pairs.take(count - 1).collect();
        Self::new(&points, &controls)
    }

    /// Convert a curve received from a module
    pub fn from_wire(wire: &WireCurve) -> Result<Self, MappingError> {
        let count = wire.count as usize;
        if count < 2 {
            return Ok(Self::identity());
        }
        if count > MAX_CURVE_POINTS {
            return Err(MappingError::InvalidCurve);
        }
        let points: Vec<CurvePoint, MAX_CURVE_POINTS> = wire.points[..count]
            .iter()
            .map(|&(x, y)| CurvePoint::new(x, y))
            .collect();
        let controls: Vec<CurvePoint, { MAX_CURVE_POINTS - 1 }> = wire.controls[..count - 1]
            .iter()
            .map(|&(x, y)| CurvePoint::new(x, y))
            .collect();
        Self::new(&points, &controls)
    }

    pub fn to_wire(&self) -> WireCurve {
        let mut wire = WireCurve {
            count: self.points.len() as u8,
            ..Default::default()
        };
        for (slot, p) in wire.points.iter_mut().zip(&self.points) {
            *slot = (p.x, p.y);
        }
        for (slot, c) in wire.controls.iter_mut().zip(&self.controls) {
            *slot = (c.x, c.y);
        }
        wire
    }
}

/// Uppercase hex of the console byte layout; `00` for the identity curve
impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.points.len() < 2 {
            return f.write_str("00");
        }
        write!(f, "{:02X}", self.points.len())?;
        for p in self.points.iter().chain(self.controls.iter()) {
            write!(f, "{:02X}{:02X}", p.x, p.y)?;
        }
        Ok(())
    }
}

/// Integer square root (floor)
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Signed division rounding half away from zero
fn div_round(n: i64, d: i64) -> i64 {
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
    if n >= 0 {
        (n + d / 2) / d
    } else {
        -((-n + d / 2) / d)
    }
}

/// Solve `x(t) = x` for one segment, returning t in 0..=1024
fn solve_t(x0: i64, cx: i64, x1: i64, x: i64) -> i64 {
    // (x0 - 2cx + x1) t² + 2(cx - x0) t + (x0 - x) = 0
    let a = x0 - 2 * cx + x1;
    let b = 2 * (cx - x0);
    let c = x0 - x;

    if a == 0 {
        if b == 0 {
            return 0;
        }
        return div_round(-c * T_ONE, b).clamp(0, T_ONE);
    }

    let disc = b * b - 4 * a * c;
    if disc < 0 {
        return 0;
    }
    // sqrt(disc) scaled by T_ONE
    let root = isqrt(disc as u64 * (T_ONE * T_ONE) as u64) as i64;
    let t1 = div_round(-b * T_ONE + root, 2 * a);
    let t2 = div_round(-b * T_ONE - root, 2 * a);

    for t in [t1, t2] {
        if (0..=T_ONE).contains(&t) {
            return t;
        }
    }
    for t in [t1, t2] {
        if (-T_TOLERANCE..0).contains(&t) {
            return 0;
        }
        if t > T_ONE && t <= T_ONE + T_TOLERANCE {
            return T_ONE;
        }
    }
    t1.clamp(0, T_ONE)
}

/// One coordinate of a quadratic Bézier at fixed-point `t`, rounded
fn bezier(p0: i64, c: i64, p1: i64, t: i64) -> i64 {
    let inv = T_ONE - t;
    (inv * inv * p0 + 2 * inv * t * c + t * t * p1 + (1 << 19)) >> 20
}
