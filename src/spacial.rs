use nalgebra::Matrix3;

pub type Position = nalgebra::Point2<f64>;
pub type Vector = nalgebra::Vector2<f64>;

/// Unit of measurement declared by the gerber file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    Millimeters,
    Inches,
}

const MM_PER_INCH: f64 = 25.4;

impl Unit {
    pub fn convert_to(&self, unit: Unit, value: f64) -> f64 {
        match (self, unit) {
            (Unit::Millimeters, Unit::Millimeters) => value,
            (Unit::Millimeters, Unit::Inches) => value / MM_PER_INCH,
            (Unit::Inches, Unit::Millimeters) => value * MM_PER_INCH,
            (Unit::Inches, Unit::Inches) => value,
        }
    }
}

/// A length together with the unit it was expressed in. Conversion happens on demand,
/// the original value is preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    value: f64,
    unit: Unit,
}

impl Length {
    pub const ZERO: Length = Length {
        value: 0.0,
        unit: Unit::Millimeters,
    };

    pub fn new(unit: Unit, value: f64) -> Self {
        Self {
            value,
            unit,
        }
    }

    pub fn mm(value: f64) -> Self {
        Self::new(Unit::Millimeters, value)
    }

    pub fn value_in(&self, unit: Unit) -> f64 {
        self.unit.convert_to(unit, self.value)
    }

    /// The value as given, without conversion. Used where a parameter is a count or
    /// an angle rather than a distance, e.g. polygon vertex counts.
    pub fn original_value(&self) -> f64 {
        self.value
    }

    pub fn to_mm(&self) -> f64 {
        self.value_in(Unit::Millimeters)
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.unit, self.value * factor)
    }
}

impl core::ops::Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        Length::new(self.unit, self.value + rhs.value_in(self.unit))
    }
}

impl core::ops::Sub for Length {
    type Output = Length;

    fn sub(self, rhs: Length) -> Length {
        Length::new(self.unit, self.value - rhs.value_in(self.unit))
    }
}

impl core::ops::Neg for Length {
    type Output = Length;

    fn neg(self) -> Length {
        self.scale(-1.0)
    }
}

impl PartialOrd for Length {
    fn partial_cmp(&self, other: &Length) -> Option<core::cmp::Ordering> {
        self.value
            .partial_cmp(&other.value_in(self.unit))
    }
}

/// Axis mirroring flags, as loaded by the LM command.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mirroring {
    pub x: bool,
    pub y: bool,
}

/// Composable 2D similarity transform (translate/rotate/scale/mirror), represented as a
/// homogeneous 3x3 matrix. Composition is matrix multiplication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Matrix3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn translation(offset: Vector) -> Self {
        Self {
            matrix: Matrix3::new_translation(&offset),
        }
    }

    pub fn rotation_degrees(degrees: f64) -> Self {
        Self {
            matrix: Matrix3::new_rotation(degrees.to_radians()),
        }
    }

    pub fn mirror_scale(mirroring: Mirroring, scaling: f64) -> Self {
        let sx = if mirroring.x { -scaling } else { scaling };
        let sy = if mirroring.y { -scaling } else { scaling };
        Self {
            matrix: Matrix3::new_nonuniform_scaling(&Vector::new(sx, sy)),
        }
    }

    /// Compose with `other`, where `other` is applied to points first.
    pub fn concat(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    pub fn apply(&self, position: Position) -> Position {
        self.matrix
            .transform_point(&position)
    }

    /// Apply to a direction or offset, ignoring the translation part.
    pub fn apply_vector(&self, v: Vector) -> Vector {
        self.matrix
            .transform_vector(&v)
    }

    /// True when the transform flips orientation (negative determinant), which reverses
    /// arc winding.
    pub fn is_mirroring(&self) -> bool {
        let m = &self.matrix;
        (m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]) < 0.0
    }

    /// The uniform scale factor of the similarity transform.
    pub fn uniform_scale(&self) -> f64 {
        let m = &self.matrix;
        (m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)])
            .abs()
            .sqrt()
    }
}

/// Angle in degrees between (1,0) and `v`, counter-clockwise, normalized to [0, 360).
pub fn vector_angle(v: Vector) -> f64 {
    let mut result = v.y.atan2(v.x).to_degrees();
    if result < 0.0 {
        result += 360.0;
    }
    // a tiny negative angle rounds up to exactly 360 above
    if result >= 360.0 {
        result -= 360.0;
    }
    result
}

/// Vector of length `r` at `angle_degrees` counter-clockwise from (1,0).
pub fn polar(r: f64, angle_degrees: f64) -> Vector {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    Vector::new(r * cos, r * sin)
}

/// Rotate `v` counter-clockwise by `angle_degrees`.
pub fn rotate(v: Vector, angle_degrees: f64) -> Vector {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    Vector::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
}

/// Signed sweep from `start` to `end` (both normalized to [0, 360)) consistent with the
/// requested winding: clockwise sweeps are negative, counter-clockwise positive. The
/// magnitude is the absolute difference of the normalized angles, never more than 360.
pub fn sweep(start: f64, end: f64, clockwise: bool) -> f64 {
    let magnitude = (start - end).abs();
    if clockwise {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Length::mm(25.4), Unit::Inches, 1.0)]
    #[case(Length::new(Unit::Inches, 2.0), Unit::Millimeters, 50.8)]
    #[case(Length::mm(1.5), Unit::Millimeters, 1.5)]
    fn length_conversion(#[case] length: Length, #[case] unit: Unit, #[case] expected: f64) {
        assert!((length.value_in(unit) - expected).abs() < 1e-12);
    }

    #[test]
    fn length_arithmetic_mixes_units() {
        // given
        let a = Length::mm(10.0);
        let b = Length::new(Unit::Inches, 1.0);

        // when
        let sum = a + b;

        // then
        assert_eq!(sum.to_mm(), 35.4);
        assert!(b > a);
    }

    #[test]
    fn transform_translate_then_rotate() {
        // rotation applied first, then translation
        let transform = Transform::translation(Vector::new(10.0, 0.0)).concat(&Transform::rotation_degrees(90.0));

        let result = transform.apply(Position::new(1.0, 0.0));

        assert!((result.x - 10.0).abs() < 1e-9);
        assert!((result.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn transform_mirroring_detection() {
        let plain = Transform::rotation_degrees(45.0);
        let mirrored = Transform::mirror_scale(
            Mirroring {
                x: true,
                y: false,
            },
            1.0,
        );

        assert!(!plain.is_mirroring());
        assert!(mirrored.is_mirroring());
        assert!((mirrored.uniform_scale() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn transform_uniform_scale() {
        let transform = Transform::mirror_scale(Mirroring::default(), 2.5).concat(&Transform::rotation_degrees(30.0));

        assert!((transform.uniform_scale() - 2.5).abs() < 1e-12);
    }

    #[rstest]
    #[case(Vector::new(1.0, 0.0), 0.0)]
    #[case(Vector::new(0.0, 1.0), 90.0)]
    #[case(Vector::new(-1.0, 0.0), 180.0)]
    #[case(Vector::new(0.0, -1.0), 270.0)]
    #[case(Vector::new(1.0, -1e-16), 0.0)] // rounds to 360 without the wrap
    fn vector_angle_normalized(#[case] v: Vector, #[case] expected: f64) {
        let angle = vector_angle(v);
        assert!((angle - expected).abs() < 1e-9);
        assert!(angle < 360.0);
    }

    #[rstest]
    #[case(0.0, 90.0, false, 90.0)]
    #[case(90.0, 0.0, false, 90.0)]
    #[case(0.0, 90.0, true, -90.0)]
    #[case(350.0, 10.0, true, -340.0)]
    fn sweep_sign_follows_winding(
        #[case] start: f64,
        #[case] end: f64,
        #[case] clockwise: bool,
        #[case] expected: f64,
    ) {
        assert_eq!(sweep(start, end, clockwise), expected);
    }
}
