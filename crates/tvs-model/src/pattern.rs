//! Antenna pattern point lists.
//!
//! Patterns are only constructed through validating constructors, so a held
//! [`AntPattern`] or [`MatrixPattern`] always satisfies the point-count, range,
//! and ordering rules.

use serde::{Deserialize, Serialize};

use crate::{ModelError, Result};

/// Minimum number of points in a pattern (and slices in a matrix pattern).
pub const PATTERN_REQUIRED_POINTS: usize = 2;

pub const FIELD_MIN: f64 = 0.001;
pub const FIELD_MAX: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Azimuth pattern, angles in degrees true 0 to less than 360.
    Horizontal,
    /// Elevation pattern, depression angles -90 to 90.
    Vertical,
}

impl PatternKind {
    pub fn label(self) -> &'static str {
        match self {
            PatternKind::Horizontal => "horizontal",
            PatternKind::Vertical => "vertical",
        }
    }

    fn angle_in_range(self, angle: f64) -> bool {
        match self {
            PatternKind::Horizontal => (0.0..360.0).contains(&angle),
            PatternKind::Vertical => (-90.0..=90.0).contains(&angle),
        }
    }

    fn angle_bounds(self) -> (f64, f64) {
        match self {
            PatternKind::Horizontal => (0.0, 360.0),
            PatternKind::Vertical => (-90.0, 90.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternPoint {
    pub angle: f64,
    pub field: f64,
}

impl PatternPoint {
    pub fn new(angle: f64, field: f64) -> Self {
        Self { angle, field }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntPattern {
    kind: PatternKind,
    points: Vec<PatternPoint>,
}

impl AntPattern {
    pub fn new(kind: PatternKind, points: Vec<PatternPoint>) -> Result<Self> {
        validate_points(kind, &points)?;
        Ok(Self { kind, points })
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn points(&self) -> &[PatternPoint] {
        &self.points
    }
}

fn validate_points(kind: PatternKind, points: &[PatternPoint]) -> Result<()> {
    if points.len() < PATTERN_REQUIRED_POINTS {
        return Err(ModelError::TooFewPoints {
            kind: kind.label(),
            found: points.len(),
            required: PATTERN_REQUIRED_POINTS,
        });
    }
    let mut last: Option<f64> = None;
    for point in points {
        if !kind.angle_in_range(point.angle) {
            let (min, max) = kind.angle_bounds();
            return Err(ModelError::AngleOutOfRange {
                kind: kind.label(),
                angle: point.angle,
                min,
                max,
            });
        }
        if !(FIELD_MIN..=FIELD_MAX).contains(&point.field) {
            return Err(ModelError::FieldOutOfRange {
                kind: kind.label(),
                field: point.field,
                min: FIELD_MIN,
                max: FIELD_MAX,
            });
        }
        if let Some(previous) = last
            && point.angle <= previous
        {
            return Err(ModelError::AnglesOutOfOrder {
                kind: kind.label(),
                angle: point.angle,
            });
        }
        last = Some(point.angle);
    }
    Ok(())
}

/// One azimuth slice of a matrix pattern: a vertical pattern at that azimuth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSlice {
    pub azimuth: f64,
    pub pattern: AntPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixPattern {
    slices: Vec<MatrixSlice>,
}

impl MatrixPattern {
    /// Builds a matrix pattern from `(azimuth, points)` slices.
    pub fn new(slices: Vec<(f64, Vec<PatternPoint>)>) -> Result<Self> {
        if slices.len() < PATTERN_REQUIRED_POINTS {
            return Err(ModelError::TooFewPoints {
                kind: "matrix",
                found: slices.len(),
                required: PATTERN_REQUIRED_POINTS,
            });
        }
        let mut built = Vec::with_capacity(slices.len());
        let mut last: Option<f64> = None;
        for (azimuth, points) in slices {
            if !PatternKind::Horizontal.angle_in_range(azimuth) {
                return Err(ModelError::AngleOutOfRange {
                    kind: "matrix",
                    angle: azimuth,
                    min: 0.0,
                    max: 360.0,
                });
            }
            if let Some(previous) = last
                && azimuth <= previous
            {
                return Err(ModelError::AnglesOutOfOrder {
                    kind: "matrix",
                    angle: azimuth,
                });
            }
            last = Some(azimuth);
            built.push(MatrixSlice {
                azimuth,
                pattern: AntPattern::new(PatternKind::Vertical, points)?,
            });
        }
        Ok(Self { slices: built })
    }

    pub fn slices(&self) -> &[MatrixSlice] {
        &self.slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[(f64, f64)]) -> Vec<PatternPoint> {
        values
            .iter()
            .map(|&(angle, field)| PatternPoint::new(angle, field))
            .collect()
    }

    #[test]
    fn accepts_ordered_points() {
        let pattern =
            AntPattern::new(PatternKind::Horizontal, points(&[(0.0, 1.0), (180.0, 0.5)])).unwrap();
        assert_eq!(pattern.points().len(), 2);
    }

    #[test]
    fn rejects_single_point() {
        let err = AntPattern::new(PatternKind::Horizontal, points(&[(0.0, 1.0)])).unwrap_err();
        assert!(matches!(err, ModelError::TooFewPoints { found: 1, .. }));
    }

    #[test]
    fn rejects_duplicate_angle() {
        let err = AntPattern::new(
            PatternKind::Vertical,
            points(&[(-10.0, 0.5), (0.0, 1.0), (0.0, 0.9)]),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::AnglesOutOfOrder { .. }));
    }

    #[test]
    fn rejects_field_out_of_range() {
        let err = AntPattern::new(PatternKind::Horizontal, points(&[(0.0, 1.5), (90.0, 1.0)]))
            .unwrap_err();
        assert!(matches!(err, ModelError::FieldOutOfRange { .. }));
    }

    #[test]
    fn horizontal_rejects_360() {
        let err = AntPattern::new(PatternKind::Horizontal, points(&[(0.0, 1.0), (360.0, 1.0)]))
            .unwrap_err();
        assert!(matches!(err, ModelError::AngleOutOfRange { .. }));
    }

    #[test]
    fn matrix_requires_ordered_slices() {
        let slice = points(&[(-5.0, 0.5), (5.0, 1.0)]);
        assert!(MatrixPattern::new(vec![(0.0, slice.clone()), (90.0, slice.clone())]).is_ok());
        let err = MatrixPattern::new(vec![(90.0, slice.clone()), (0.0, slice)]).unwrap_err();
        assert!(matches!(err, ModelError::AnglesOutOfOrder { kind: "matrix", .. }));
    }
}
