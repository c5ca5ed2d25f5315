//! Planar geometry and flight trajectories.

/// Divisor (in seconds) used instead of a zero flight duration.
const MIN_FLIGHT_SECS: f64 = 0.1;

/// Point of the scene.
///
/// The vertical axis grows downwards, as on screen.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Axis-aligned rectangle anchored at its top-left corner.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Rect {
    pub origin: Point,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Check whether `point` lies inside the rectangle, borders included.
    pub fn contains(&self, point: &Point) -> bool {
        (self.origin.x..=self.origin.x + self.width).contains(&point.x)
            && (self.origin.y..=self.origin.y + self.height).contains(&point.y)
    }
}

/// Directed flight from an origin to a target.
///
/// Progress `t` runs from 0 to 1 over `total_secs`. The position is the
/// linear interpolation between both ends minus a vertical bow of
/// `arc_height * 4t(1 - t)`, so a positive arc lifts the midpoint above the
/// straight line while leaving both ends untouched.
#[derive(Debug, PartialEq, Clone)]
pub struct Flight {
    origin: Point,
    target: Point,
    t: f64,
    total_secs: f64,
    arc_height: f64,
}

impl Flight {
    /// Create a flight lasting `total_secs`.
    pub fn new(origin: Point, target: Point, total_secs: f64, arc_height: f64) -> Self {
        Self {
            origin,
            target,
            t: 0.0,
            total_secs,
            arc_height,
        }
    }

    /// Create a flight at constant `speed` (distance per second).
    pub fn at_speed(origin: Point, target: Point, speed: f64, arc_factor: f64) -> Self {
        let distance = origin.distance(&target);
        Self::new(origin, target, distance / speed, distance * arc_factor)
    }

    /// Advance the flight by `dt` seconds and return whether it has arrived.
    pub fn advance(&mut self, dt: f64) -> bool {
        let divisor = if self.total_secs > 0.0 {
            self.total_secs
        } else {
            MIN_FLIGHT_SECS
        };
        self.t = (self.t + dt / divisor).min(1.0);
        self.arrived()
    }

    pub fn arrived(&self) -> bool {
        self.t >= 1.0
    }

    /// Current position along the flight.
    pub fn position(&self) -> Point {
        if self.arrived() {
            return self.target;
        }
        let t = self.t;
        let bow = self.arc_height * 4.0 * t * (1.0 - t);
        Point {
            x: self.origin.x + (self.target.x - self.origin.x) * t,
            y: self.origin.y + (self.target.y - self.origin.y) * t - bow,
        }
    }
}
