//! Tap-to-angle conversion tables of phase-shifting transformers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RaoError, RaoResult};

/// Contiguous tap → angle (degrees) table with a current tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapTable {
    angles: BTreeMap<i32, f64>,
    initial_tap: i32,
}

impl TapTable {
    /// Build a table, rejecting gaps, non-finite angles and non-monotonic
    /// angle sequences.
    pub fn new(angles: BTreeMap<i32, f64>, initial_tap: i32) -> RaoResult<Self> {
        let (Some(&lowest), Some(&highest)) = (angles.keys().next(), angles.keys().next_back())
        else {
            return Err(RaoError::Validation("tap table is empty".into()));
        };
        if (highest - lowest + 1) as usize != angles.len() {
            return Err(RaoError::Validation(format!(
                "tap table [{lowest}, {highest}] has missing taps"
            )));
        }
        if !angles.contains_key(&initial_tap) {
            return Err(RaoError::Validation(format!(
                "initial tap {initial_tap} is outside [{lowest}, {highest}]"
            )));
        }
        if angles.values().any(|a| !a.is_finite()) {
            return Err(RaoError::Validation("tap table has non-finite angles".into()));
        }
        let steps: Vec<f64> = angles
            .values()
            .zip(angles.values().skip(1))
            .map(|(a, b)| b - a)
            .collect();
        if !(steps.iter().all(|s| *s > 0.0) || steps.iter().all(|s| *s < 0.0)) {
            return Err(RaoError::Validation("tap table angles are not monotonic".into()));
        }
        Ok(Self { angles, initial_tap })
    }

    /// Linear table: `angle(tap) = tap * step`.
    pub fn linear(lowest: i32, highest: i32, step: f64, initial_tap: i32) -> RaoResult<Self> {
        let angles = (lowest..=highest).map(|t| (t, t as f64 * step)).collect();
        Self::new(angles, initial_tap)
    }

    pub fn lowest_tap(&self) -> i32 {
        self.angles.keys().next().copied().unwrap_or(self.initial_tap)
    }

    pub fn highest_tap(&self) -> i32 {
        self.angles.keys().next_back().copied().unwrap_or(self.initial_tap)
    }

    pub fn initial_tap(&self) -> i32 {
        self.initial_tap
    }

    pub fn angle(&self, tap: i32) -> Option<f64> {
        self.angles.get(&tap).copied()
    }

    pub fn initial_angle(&self) -> f64 {
        self.angle(self.initial_tap).unwrap_or(0.0)
    }

    /// Angle of `tap`, clamped to the table.
    pub fn clamped_angle(&self, tap: i32) -> f64 {
        let tap = tap.clamp(self.lowest_tap(), self.highest_tap());
        self.angle(tap).unwrap_or(0.0)
    }

    pub fn min_angle(&self) -> f64 {
        self.angles.values().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_angle(&self) -> f64 {
        self.angles.values().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Tap whose angle is closest to `angle`. Angles outside the table map
    /// to the extreme taps; ties go to the lower tap.
    pub fn closest_tap(&self, angle: f64) -> i32 {
        let mut best = self.initial_tap;
        let mut best_distance = f64::INFINITY;
        for (&tap, &a) in &self.angles {
            let distance = (a - angle).abs();
            if distance < best_distance {
                best = tap;
                best_distance = distance;
            }
        }
        best
    }

    /// Smallest absolute angle difference between two consecutive taps.
    pub fn smallest_angle_step(&self) -> f64 {
        self.steps().fold(f64::INFINITY, f64::min)
    }

    pub fn average_angle_step(&self) -> f64 {
        let count = self.angles.len().saturating_sub(1);
        if count == 0 {
            return 0.0;
        }
        (self.max_angle() - self.min_angle()) / count as f64
    }

    fn steps(&self) -> impl Iterator<Item = f64> + '_ {
        self.angles
            .values()
            .zip(self.angles.values().skip(1))
            .map(|(a, b)| (b - a).abs())
    }
}
