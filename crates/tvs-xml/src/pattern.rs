//! Antenna pattern element content: numbers separated by commas or newlines.

use tvs_model::{AntPattern, MatrixPattern, PatternKind, PatternPoint};

use crate::{Result, XmlError};

fn tokens(element: &'static str, text: &str) -> Result<Vec<f64>> {
    text.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| XmlError::Pattern {
                    element,
                    message: format!("'{token}' is not a number"),
                })
        })
        .collect()
}

fn pattern_error(element: &'static str, err: impl std::fmt::Display) -> XmlError {
    XmlError::Pattern {
        element,
        message: err.to_string(),
    }
}

/// Parses `angle,field` pairs into a validated pattern.
pub(crate) fn parse_pattern(
    element: &'static str,
    kind: PatternKind,
    text: &str,
) -> Result<AntPattern> {
    let values = tokens(element, text)?;
    if values.len() % 2 != 0 {
        return Err(pattern_error(element, "odd number of values"));
    }
    let points = values
        .chunks_exact(2)
        .map(|pair| PatternPoint::new(pair[0], pair[1]))
        .collect();
    AntPattern::new(kind, points).map_err(|err| pattern_error(element, err))
}

/// Parses `azimuth,angle,field` triples, grouped into slices by azimuth.
pub(crate) fn parse_matrix(element: &'static str, text: &str) -> Result<MatrixPattern> {
    let values = tokens(element, text)?;
    if values.len() % 3 != 0 {
        return Err(pattern_error(element, "value count is not a multiple of three"));
    }
    let mut slices: Vec<(f64, Vec<PatternPoint>)> = Vec::new();
    for triple in values.chunks_exact(3) {
        let point = PatternPoint::new(triple[1], triple[2]);
        match slices.last_mut() {
            Some((azimuth, points)) if *azimuth == triple[0] => points.push(point),
            _ => slices.push((triple[0], vec![point])),
        }
    }
    MatrixPattern::new(slices).map_err(|err| pattern_error(element, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_commas_and_newlines() {
        let pattern = parse_pattern("APAT", PatternKind::Horizontal, "0,1\n90,0.5\r\n180,0.25\n")
            .unwrap();
        assert_eq!(pattern.points().len(), 3);
        assert_eq!(pattern.points()[1], PatternPoint::new(90.0, 0.5));
    }

    #[test]
    fn out_of_order_points_are_rejected() {
        let err = parse_pattern("APAT", PatternKind::Horizontal, "0,1\n0,0.5").unwrap_err();
        assert!(matches!(err, XmlError::Pattern { element: "APAT", .. }));
    }

    #[test]
    fn too_few_points_are_rejected() {
        assert!(parse_pattern("EPAT", PatternKind::Vertical, "-10,1").is_err());
        assert!(parse_pattern("EPAT", PatternKind::Vertical, "-10,1,5").is_err());
    }

    #[test]
    fn matrix_groups_by_azimuth() {
        let matrix = parse_matrix("MPAT", "0,-10,1\n0,10,0.5\n180,-10,1\n180,10,0.2").unwrap();
        assert_eq!(matrix.slices().len(), 2);
        assert_eq!(matrix.slices()[1].azimuth, 180.0);
        assert!(parse_matrix("MPAT", "0,-10,1\n0,10").is_err());
    }
}
