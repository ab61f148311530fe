use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::Delta;

/// Element of the dihedral group of order 8, stored as the images of the
/// right and down unit vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Orientation {
    pub right: Delta,
    pub down: Delta,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid orientation '{value}': expected two of E/S/W/N on different axes, e.g. \"ES\"")]
pub struct OrientationParseError {
    pub value: String,
}

impl Orientation {
    pub const fn identity() -> Self {
        Self {
            right: Delta::east(),
            down: Delta::south(),
        }
    }

    pub const fn flip_x() -> Self {
        Self {
            right: Delta::west(),
            down: Delta::south(),
        }
    }

    pub const fn flip_y() -> Self {
        Self {
            right: Delta::east(),
            down: Delta::north(),
        }
    }

    /// Reflection across the main diagonal; swaps the axes.
    pub const fn flip_diagonal() -> Self {
        Self {
            right: Delta::south(),
            down: Delta::east(),
        }
    }

    pub const fn turn_right() -> Self {
        Self {
            right: Delta::south(),
            down: Delta::west(),
        }
    }

    pub const fn turn_left() -> Self {
        Self {
            right: Delta::north(),
            down: Delta::east(),
        }
    }

    pub const fn turn_around() -> Self {
        Self {
            right: Delta::west(),
            down: Delta::north(),
        }
    }

    pub fn all() -> [Orientation; 8] {
        [
            Self::identity(),
            Self::turn_right(),
            Self::turn_around(),
            Self::turn_left(),
            Self::flip_x(),
            Self::flip_y(),
            Self::flip_diagonal(),
            Self::flip_diagonal().concat(Self::turn_around()),
        ]
    }

    pub fn apply(self, d: Delta) -> Delta {
        self.right.mul(d.dx) + self.down.mul(d.dy)
    }

    /// Matrix product: `a.concat(b).apply(d) == a.apply(b.apply(d))`.
    pub fn concat(self, other: Orientation) -> Orientation {
        Orientation {
            right: self.apply(other.right),
            down: self.apply(other.down),
        }
    }

    /// Transpose, which is the inverse for orthonormal matrices.
    pub fn inverse(self) -> Orientation {
        Orientation {
            right: Delta::new(self.right.dx, self.down.dx),
            down: Delta::new(self.right.dy, self.down.dy),
        }
    }

    pub fn determinant(self) -> i32 {
        self.right.dx * self.down.dy - self.right.dy * self.down.dx
    }

    pub fn parse(value: &str) -> Result<Orientation, OrientationParseError> {
        let err = || OrientationParseError {
            value: value.to_string(),
        };
        let mut chars = value.chars();
        let (Some(r), Some(d), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(err());
        };
        let right = compass_delta(r).ok_or_else(err)?;
        let down = compass_delta(d).ok_or_else(err)?;
        if right.dot(down) != 0 {
            return Err(err());
        }
        Ok(Orientation { right, down })
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

fn compass_delta(letter: char) -> Option<Delta> {
    match letter {
        'E' => Some(Delta::east()),
        'S' => Some(Delta::south()),
        'W' => Some(Delta::west()),
        'N' => Some(Delta::north()),
        _ => None,
    }
}

fn compass_letter(d: Delta) -> char {
    match (d.dx, d.dy) {
        (1, 0) => 'E',
        (0, 1) => 'S',
        (-1, 0) => 'W',
        _ => 'N',
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", compass_letter(self.right), compass_letter(self.down))
    }
}

impl FromStr for Orientation {
    type Err = OrientationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Orientation::parse(s)
    }
}

impl Serialize for Orientation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Orientation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Orientation::parse(&raw).map_err(serde::de::Error::custom)
    }
}
