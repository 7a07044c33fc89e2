//! Validation of contour level sequences.
use super::ContourError;

/// Which way a level sequence runs. Positive contour sets are typically
/// increasing, negative sets decreasing; the direction decides how the
/// active-region tracker interprets edge cases between levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelDirection {
    Increasing,
    Decreasing,
}

impl LevelDirection {
    #[inline]
    pub fn is_increasing(&self) -> bool {
        matches!(self, LevelDirection::Increasing)
    }
}

/// Check that `levels` is monotone and report its direction.
///
/// The direction is fixed by the first two entries (a tie reads as
/// increasing); any later violation fails the whole request. Sequences
/// of length 0 or 1 are trivially increasing.
pub(crate) fn validate_levels(levels: &[f32]) -> Result<LevelDirection, ContourError> {
    if levels.len() < 2 {
        return Ok(LevelDirection::Increasing);
    }
    let increasing = levels[0] <= levels[1];
    for pair in levels[1..].windows(2) {
        if increasing && pair[0] > pair[1] {
            return Err(ContourError::InvalidLevels(
                "levels initially increasing but later decrease",
            ));
        }
        if !increasing && pair[0] < pair[1] {
            return Err(ContourError::InvalidLevels(
                "levels initially decreasing but later increase",
            ));
        }
    }
    Ok(if increasing {
        LevelDirection::Increasing
    } else {
        LevelDirection::Decreasing
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty(&[], LevelDirection::Increasing)]
    #[case::single(&[3.0], LevelDirection::Increasing)]
    #[case::ascending(&[1.0, 2.0, 2.0, 5.0], LevelDirection::Increasing)]
    #[case::descending(&[-1.0, -2.0, -4.0], LevelDirection::Decreasing)]
    fn test_directions(#[case] levels: &[f32], #[case] expected: LevelDirection) {
        assert_eq!(validate_levels(levels).unwrap(), expected);
    }

    #[rstest]
    #[case::rises_then_falls(&[0.1, 0.2, 0.1])]
    #[case::falls_then_rises(&[0.5, 0.2, 0.3])]
    fn test_non_monotone_rejected(#[case] levels: &[f32]) {
        assert!(matches!(
            validate_levels(levels),
            Err(ContourError::InvalidLevels(_))
        ));
    }
}
