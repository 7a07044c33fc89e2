use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A peak located by [`PeakFinder`](crate::PeakFinder): an integer grid
/// position and the sample height there. Sub-pixel refinement is a
/// separate step.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakCandidate {
    pub position: Vec<i32>,
    pub height: f32,
}

impl PeakCandidate {
    pub fn new(position: Vec<i32>, height: f32) -> Self {
        Self { position, height }
    }

    pub fn rank(&self) -> usize {
        self.position.len()
    }
}

impl fmt::Display for PeakCandidate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PeakCandidate({:?}, {})", self.position, self.height)
    }
}

/// Per-parameter standard deviations recovered from the fit covariance.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitUncertainty {
    pub height: f32,
    pub position: Vec<f32>,
    pub linewidth: Vec<f32>,
}

/// A sub-pixel peak: height, fractional grid position and full width at
/// half maximum along each axis, with optional parameter uncertainties
/// when produced by the iterative fitter.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FittedPeak {
    pub height: f32,
    pub position: Vec<f32>,
    pub linewidth: Vec<f32>,
    pub uncertainty: Option<FitUncertainty>,
}

impl FittedPeak {
    pub fn new(height: f32, position: Vec<f32>, linewidth: Vec<f32>) -> Self {
        Self {
            height,
            position,
            linewidth,
            uncertainty: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.position.len()
    }
}

impl fmt::Display for FittedPeak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FittedPeak({}, {:?}, {:?})",
            self.height, self.position, self.linewidth
        )
    }
}
