use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

mod orientation;

pub use orientation::{Orientation, OrientationParseError};

/// Integer position, in pixels or tiles depending on context.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

/// Integer displacement between two [`Pos`] values.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Delta {
    pub dx: i32,
    pub dy: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Floor division of both coordinates; maps pixels to the tile containing them.
    pub fn div_floor(self, divisor: i32) -> Pos {
        Pos::new(div_floor(self.x, divisor), div_floor(self.y, divisor))
    }

    pub fn scale(self, factor: i32) -> Pos {
        Pos::new(self.x * factor, self.y * factor)
    }

    /// Offset of this position from `other`.
    pub fn delta(self, other: Pos) -> Delta {
        Delta::new(self.x - other.x, self.y - other.y)
    }

    pub fn as_delta(self) -> Delta {
        Delta::new(self.x, self.y)
    }
}

impl Delta {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub const fn east() -> Self {
        Self::new(1, 0)
    }

    pub const fn south() -> Self {
        Self::new(0, 1)
    }

    pub const fn west() -> Self {
        Self::new(-1, 0)
    }

    pub const fn north() -> Self {
        Self::new(0, -1)
    }

    pub fn is_zero(self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    pub fn mul(self, factor: i32) -> Delta {
        Delta::new(self.dx * factor, self.dy * factor)
    }

    pub fn div_floor(self, divisor: i32) -> Delta {
        Delta::new(div_floor(self.dx, divisor), div_floor(self.dy, divisor))
    }

    /// `self * n / d` per component, rounded half up.
    pub fn mul_frac(self, n: i32, d: i32) -> Delta {
        Delta::new(mul_frac_round(self.dx, n, d), mul_frac_round(self.dy, n, d))
    }

    pub fn dot(self, other: Delta) -> i32 {
        self.dx * other.dx + self.dy * other.dy
    }

    /// Chebyshev length.
    pub fn norm0(self) -> i32 {
        self.dx.abs().max(self.dy.abs())
    }

    /// Manhattan length.
    pub fn norm1(self) -> i32 {
        self.dx.abs() + self.dy.abs()
    }

    pub fn length2(self) -> i32 {
        self.dot(self)
    }

    pub fn signum(self) -> Delta {
        Delta::new(self.dx.signum(), self.dy.signum())
    }

    pub fn abs(self) -> Delta {
        Delta::new(self.dx.abs(), self.dy.abs())
    }
}

impl Add<Delta> for Pos {
    type Output = Pos;

    fn add(self, rhs: Delta) -> Pos {
        Pos::new(self.x + rhs.dx, self.y + rhs.dy)
    }
}

impl AddAssign<Delta> for Pos {
    fn add_assign(&mut self, rhs: Delta) {
        *self = *self + rhs;
    }
}

impl Sub<Delta> for Pos {
    type Output = Pos;

    fn sub(self, rhs: Delta) -> Pos {
        Pos::new(self.x - rhs.dx, self.y - rhs.dy)
    }
}

impl SubAssign<Delta> for Pos {
    fn sub_assign(&mut self, rhs: Delta) {
        *self = *self - rhs;
    }
}

impl Sub<Pos> for Pos {
    type Output = Delta;

    fn sub(self, rhs: Pos) -> Delta {
        self.delta(rhs)
    }
}

impl Add for Delta {
    type Output = Delta;

    fn add(self, rhs: Delta) -> Delta {
        Delta::new(self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

impl AddAssign for Delta {
    fn add_assign(&mut self, rhs: Delta) {
        *self = *self + rhs;
    }
}

impl Sub for Delta {
    type Output = Delta;

    fn sub(self, rhs: Delta) -> Delta {
        Delta::new(self.dx - rhs.dx, self.dy - rhs.dy)
    }
}

impl SubAssign for Delta {
    fn sub_assign(&mut self, rhs: Delta) {
        *self = *self - rhs;
    }
}

impl Neg for Delta {
    type Output = Delta;

    fn neg(self) -> Delta {
        Delta::new(-self.dx, -self.dy)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.dx, self.dy)
    }
}

/// Axis-aligned rectangle. `size` is always non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Pos,
    pub size: Delta,
}

impl Rect {
    pub const fn new(origin: Pos, size: Delta) -> Self {
        Self { origin, size }
    }

    /// Last pixel inside the rectangle (inclusive corner).
    pub fn opposite_corner(&self) -> Pos {
        self.origin + self.size - Delta::new(1, 1)
    }

    pub fn contains(&self, pos: Pos) -> bool {
        let end = self.opposite_corner();
        pos.x >= self.origin.x && pos.x <= end.x && pos.y >= self.origin.y && pos.y <= end.y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.delta(other).is_zero()
    }

    /// Shortest move that would make `other` touch this rectangle; zero when they overlap.
    pub fn delta(&self, other: &Rect) -> Delta {
        let a_end = self.opposite_corner();
        let b_end = other.opposite_corner();
        let dx = if b_end.x < self.origin.x {
            b_end.x - self.origin.x
        } else if other.origin.x > a_end.x {
            other.origin.x - a_end.x
        } else {
            0
        };
        let dy = if b_end.y < self.origin.y {
            b_end.y - self.origin.y
        } else if other.origin.y > a_end.y {
            other.origin.y - a_end.y
        } else {
            0
        };
        Delta::new(dx, dy)
    }

    /// Center in doubled coordinates, exact for every integer rectangle.
    pub fn center2(&self) -> Pos {
        Pos::new(
            2 * self.origin.x + self.size.dx - 1,
            2 * self.origin.y + self.size.dy - 1,
        )
    }

    /// Center rounded down to whole pixels.
    pub fn center(&self) -> Pos {
        self.center2().div_floor(2)
    }

    /// Inclusive tile range covered by this pixel rectangle.
    pub fn tile_span(&self, tile_size: i32) -> (Pos, Pos) {
        (
            self.origin.div_floor(tile_size),
            self.opposite_corner().div_floor(tile_size),
        )
    }
}

pub fn div_floor(value: i32, divisor: i32) -> i32 {
    let quotient = value / divisor;
    if value % divisor != 0 && (value < 0) != (divisor < 0) {
        quotient - 1
    } else {
        quotient
    }
}

fn mul_frac_round(value: i32, n: i32, d: i32) -> i32 {
    let scaled = i64::from(value) * i64::from(n);
    let d = i64::from(d);
    let rounded = (2 * scaled + d).div_euclid(2 * d);
    rounded as i32
}
