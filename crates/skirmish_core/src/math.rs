//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation state uses fixed-point arithmetic so that every
//! host computes bit-identical results. Trigonometry is implemented
//! here with range reduction plus polynomials rather than delegated
//! to platform float routines.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// π in fixed-point.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);
/// π / 2 in fixed-point.
pub const HALF_PI: Fixed = Fixed::from_bits(6_746_518_852);
/// 2π in fixed-point.
pub const TAU: Fixed = Fixed::from_bits(26_986_075_409);
/// One degree in radians.
pub const ONE_DEGREE: Fixed = Fixed::from_bits(74_961_321);

/// Remaining time at or below which a countdown counts as expired.
///
/// `dt` values such as 1/20 s are not exact in binary, so a countdown
/// that should land on zero may stop a few ulps above it.
pub const TIMER_EPSILON: Fixed = Fixed::from_bits(1 << 12);

/// Fixed-point 2D vector on the ground plane.
///
/// `x` is the world right axis and `y` the world forward axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for human-edited fixed-point values.
///
/// Config files write `2.5` rather than raw bits. Parsing happens once at
/// load time, never inside a tick.
pub mod decimal_serde {
    use super::Fixed;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| D::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

/// Serde support for a human-edited `Vec2Fixed` written as `(x, y)`.
pub mod decimal_vec2_serde {
    use super::{Fixed, Vec2Fixed};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a vector as a decimal pair.
    pub fn serialize<S>(value: &Vec2Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (value.x.to_num::<f64>(), value.y.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize a vector from a decimal pair.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        match (Fixed::checked_from_num(x), Fixed::checked_from_num(y)) {
            (Some(x), Some(y)) => Ok(Vec2Fixed::new(x, y)),
            _ => Err(D::Error::custom(format!(
                "({x}, {y}) is out of fixed-point range"
            ))),
        }
    }
}

/// Serde support for a list of human-edited vectors.
pub mod decimal_vec2_list_serde {
    use super::{Fixed, Vec2Fixed};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize vectors as a list of decimal pairs.
    pub fn serialize<S>(value: &[Vec2Fixed], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value
            .iter()
            .map(|v| (v.x.to_num::<f64>(), v.y.to_num::<f64>()))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    /// Deserialize vectors from a list of decimal pairs.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec2Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<(f64, f64)>::deserialize(deserializer)?
            .into_iter()
            .map(|(x, y)| match (Fixed::checked_from_num(x), Fixed::checked_from_num(y)) {
                (Some(x), Some(y)) => Ok(Vec2Fixed::new(x, y)),
                _ => Err(D::Error::custom(format!(
                    "({x}, {y}) is out of fixed-point range"
                ))),
            })
            .collect()
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Squared length of the vector.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Dot product of two vectors, saturating at the fixed-point range.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Scale both components.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Normalize vector using fixed-point math.
    ///
    /// Vectors whose squared length is below `min_length_sq` normalize to
    /// zero instead of dividing by a vanishing length.
    #[must_use]
    pub fn normalize_or_zero(self, min_length_sq: Fixed) -> Self {
        let len_sq = self.length_squared();
        if len_sq <= min_length_sq || len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Normalize vector, returning zero for the zero vector.
    #[must_use]
    pub fn normalize(self) -> Self {
        self.normalize_or_zero(Fixed::ZERO)
    }

    /// Rotate the vector by `yaw` radians (clockwise when viewed from above,
    /// matching the yaw convention where 0 faces +y).
    #[must_use]
    pub fn rotate(self, yaw: Fixed) -> Self {
        let (s, c) = (sin(yaw), cos(yaw));
        Self::new(self.x * c + self.y * s, self.y * c - self.x * s)
    }
}

/// Computes the square root of a fixed-point number using binary search.
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = value.max(Fixed::ONE);

    for _ in 0..48 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Clamp a value to `[0, 1]`.
#[must_use]
pub fn saturate(value: Fixed) -> Fixed {
    value.clamp(Fixed::ZERO, Fixed::ONE)
}

/// Wrap an angle into `(-π, π]`.
///
/// Reduces first, so any finite input is safe.
#[must_use]
pub fn wrap_angle(angle: Fixed) -> Fixed {
    let wrapped = (angle.rem_euclid(TAU) + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

/// Sine of an angle in radians.
#[must_use]
pub fn sin(angle: Fixed) -> Fixed {
    let mut x = wrap_angle(angle);
    if x > HALF_PI {
        x = PI - x;
    } else if x < -HALF_PI {
        x = -PI - x;
    }

    // Taylor series to x^9, nested: accurate to ~4e-6 on [-π/2, π/2].
    let x2 = x * x;
    let one = Fixed::ONE;
    let mut acc = one - x2 / Fixed::from_num(72);
    acc = one - x2 / Fixed::from_num(42) * acc;
    acc = one - x2 / Fixed::from_num(20) * acc;
    acc = one - x2 / Fixed::from_num(6) * acc;
    x * acc
}

/// Cosine of an angle in radians.
#[must_use]
pub fn cos(angle: Fixed) -> Fixed {
    sin(wrap_angle(angle) + HALF_PI)
}

/// Arctangent of `z` for `|z| <= 1`.
fn atan_unit(z: Fixed) -> Fixed {
    const A1: Fixed = Fixed::from_bits(4_294_391_770);
    const A3: Fixed = Fixed::from_bits(-1_418_625_550);
    const A5: Fixed = Fixed::from_bits(773_699_704);
    const A7: Fixed = Fixed::from_bits(-365_643_451);
    const A9: Fixed = Fixed::from_bits(89_486_073);

    let z2 = z * z;
    z * (A1 + z2 * (A3 + z2 * (A5 + z2 * (A7 + z2 * A9))))
}

/// Four-quadrant arctangent of `y / x`, in `(-π, π]`.
#[must_use]
pub fn atan2(y: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && y == Fixed::ZERO {
        return Fixed::ZERO;
    }

    if x.abs() >= y.abs() {
        let base = atan_unit(y / x);
        if x > Fixed::ZERO {
            base
        } else if y >= Fixed::ZERO {
            base + PI
        } else {
            base - PI
        }
    } else {
        let base = atan_unit(x / y);
        if y > Fixed::ZERO {
            HALF_PI - base
        } else {
            -HALF_PI - base
        }
    }
}

/// Yaw that faces along `direction` (0 faces +y).
#[must_use]
pub fn yaw_towards(direction: Vec2Fixed) -> Fixed {
    atan2(direction.x, direction.y)
}

/// Unit vector pointing along `yaw`.
#[must_use]
pub fn forward(yaw: Fixed) -> Vec2Fixed {
    Vec2Fixed::new(sin(yaw), cos(yaw))
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
