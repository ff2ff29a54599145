//! A partial 3-tuple of machine coordinates, used throughout the pipeline as
//! the carrier of "whatever X/Y/Z (or I/J/K) this line happens to set".
//!
//! Unlike the teacher's `Vec3` (always fully populated), a [`Coord`] tracks
//! *which* axes are actually present — a G-code line like `G1 X10` only sets
//! X, and Phase 1's argument augmentation (see [`crate::phase1`]) depends on
//! being able to tell "unset" apart from "set to zero".

use std::ops::{Add, Sub};

/// One of the three linear axes a [`Coord`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

/// A partial `(x, y, z)` triple plus an implicit bitmask of which axes are set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coord {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl Coord {
    pub const fn empty() -> Self {
        Coord {
            x: None,
            y: None,
            z: None,
        }
    }

    pub fn new(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Coord { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn with(&self, axis: Axis, value: f64) -> Self {
        let mut c = *self;
        match axis {
            Axis::X => c.x = Some(value),
            Axis::Y => c.y = Some(value),
            Axis::Z => c.z = Some(value),
        }
        c
    }

    /// The set of axes actually present on this coord.
    pub fn set(&self) -> Vec<Axis> {
        Axis::ALL.iter().copied().filter(|a| self.get(*a).is_some()).collect()
    }

    pub fn is_set(&self, axis: Axis) -> bool {
        self.get(axis).is_some()
    }

    /// True when at least two axes are present.
    pub fn has_coord_pair(&self) -> bool {
        self.set().len() >= 2
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }

    /// Returns the axes that are identical across every coord in `list`.
    ///
    /// Empty for zero inputs; all-set for exactly one input; for two or more,
    /// an axis qualifies only when every coord has it set AND the values
    /// agree exactly.
    pub fn ortho(list: &[Coord]) -> Vec<Axis> {
        match list.len() {
            0 => Vec::new(),
            1 => list[0].set(),
            _ => Axis::ALL
                .iter()
                .copied()
                .filter(|&axis| {
                    let mut values = list.iter().map(|c| c.get(axis));
                    let first = match values.next() {
                        Some(Some(v)) => v,
                        _ => return false,
                    };
                    values.all(|v| v == Some(first))
                })
                .collect(),
        }
    }

    /// Returns a new coord equal to `self` with each axis of `other` copied
    /// in when `self` is unset on that axis, or unconditionally when
    /// `overwrite` is true.
    pub fn merge(&self, other: &Coord, overwrite: bool) -> Coord {
        let mut out = *self;
        for axis in Axis::ALL {
            if let Some(v) = other.get(axis) {
                if overwrite || !self.is_set(axis) {
                    out = out.with(axis, v);
                }
            }
        }
        out
    }
}

impl Add for Coord {
    type Output = Coord;

    /// Componentwise add, producing the union of the operand sets.
    fn add(self, rhs: Coord) -> Coord {
        combine(self, rhs, |a, b| a + b)
    }
}

impl Sub for Coord {
    type Output = Coord;

    /// Componentwise subtract, producing the union of the operand sets.
    fn sub(self, rhs: Coord) -> Coord {
        combine(self, rhs, |a, b| a - b)
    }
}

fn combine(a: Coord, b: Coord, op: impl Fn(f64, f64) -> f64) -> Coord {
    let mut out = Coord::empty();
    for axis in Axis::ALL {
        out = match (a.get(axis), b.get(axis)) {
            (Some(x), Some(y)) => out.with(axis, op(x, y)),
            (Some(x), None) => out.with(axis, x),
            (None, Some(y)) => out.with(axis, y),
            (None, None) => out,
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz(x: f64, y: f64, z: f64) -> Coord {
        Coord::new(Some(x), Some(y), Some(z))
    }

    #[test]
    fn add_is_componentwise() {
        let a = xyz(1.0, 2.0, 3.0);
        let b = xyz(10.0, 20.0, 30.0);
        assert_eq!(a + b, xyz(11.0, 22.0, 33.0));
    }

    #[test]
    fn sub_is_componentwise() {
        let a = xyz(10.0, 20.0, 30.0);
        let b = xyz(1.0, 2.0, 3.0);
        assert_eq!(a - b, xyz(9.0, 18.0, 27.0));
    }

    #[test]
    fn add_unions_partial_sets() {
        let a = Coord::new(Some(1.0), None, None);
        let b = Coord::new(None, Some(2.0), None);
        let sum = a + b;
        assert_eq!(sum, Coord::new(Some(1.0), Some(2.0), None));
    }

    #[test]
    fn has_coord_pair_requires_two_axes() {
        assert!(!Coord::new(Some(1.0), None, None).has_coord_pair());
        assert!(Coord::new(Some(1.0), Some(2.0), None).has_coord_pair());
        assert!(xyz(1.0, 2.0, 3.0).has_coord_pair());
    }

    #[test]
    fn ortho_empty_for_zero_inputs() {
        assert!(Coord::ortho(&[]).is_empty());
    }

    #[test]
    fn ortho_all_set_for_one_input() {
        let axes = Coord::ortho(&[xyz(1.0, 2.0, 3.0)]);
        assert_eq!(axes.len(), 3);
    }

    #[test]
    fn ortho_finds_constant_axis_across_three() {
        let a = xyz(1.0, 2.0, 5.0);
        let b = xyz(1.0, 3.0, 5.0);
        let c = xyz(1.0, 4.0, 5.0);
        let axes = Coord::ortho(&[a, b, c]);
        assert_eq!(axes, vec![Axis::X, Axis::Z]);
    }

    #[test]
    fn ortho_empty_when_nothing_constant() {
        let a = xyz(1.0, 2.0, 3.0);
        let b = xyz(4.0, 5.0, 6.0);
        assert!(Coord::ortho(&[a, b]).is_empty());
    }

    #[test]
    fn merge_identity_without_overwrite() {
        let a = xyz(1.0, 2.0, 3.0);
        assert_eq!(a.merge(&a, false), a);
    }

    #[test]
    fn merge_with_overwrite_takes_other_on_set_axes() {
        let a = xyz(1.0, 2.0, 3.0);
        let b = Coord::new(Some(99.0), None, Some(100.0));
        let merged = a.merge(&b, true);
        assert_eq!(merged, Coord::new(Some(99.0), Some(2.0), Some(100.0)));
    }

    #[test]
    fn merge_without_overwrite_only_fills_unset_axes() {
        let a = Coord::new(Some(1.0), None, None);
        let b = xyz(99.0, 98.0, 97.0);
        let merged = a.merge(&b, false);
        assert_eq!(merged, Coord::new(Some(1.0), Some(98.0), Some(97.0)));
    }

    #[test]
    fn merge_fills_all_unset_axes_from_fully_empty() {
        let a = Coord::empty();
        let b = xyz(1.0, 2.0, 3.0);
        assert_eq!(a.merge(&b, false), b);
    }
}
