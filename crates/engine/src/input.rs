use std::collections::BTreeSet;

use bureau_protocol::{Direction, PadButton};

use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadEffect {
    None,
    Interact,
}

/// Held-key movement for the operator avatar. The on-screen pad maps onto the
/// same press/hold/release calls as the keyboard.
#[derive(Debug, Clone)]
pub struct InputController {
    held: BTreeSet<Direction>,
    position: Point,
    viewport: (f64, f64),
}

impl InputController {
    pub fn new(start: Point) -> Self {
        Self {
            held: BTreeSet::new(),
            position: start,
            viewport: (0.0, 0.0),
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, p: Point) {
        self.position = p;
    }

    pub fn key_down(&mut self, dir: Direction) {
        self.held.insert(dir);
    }

    pub fn key_up(&mut self, dir: Direction) {
        self.held.remove(&dir);
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn pad_press(&mut self, button: PadButton) -> PadEffect {
        match pad_direction(button) {
            Some(dir) => {
                self.key_down(dir);
                PadEffect::None
            }
            None => PadEffect::Interact,
        }
    }

    pub fn pad_release(&mut self, button: PadButton) {
        if let Some(dir) = pad_direction(button) {
            self.key_up(dir);
        }
    }

    pub fn is_moving(&self) -> bool {
        let (vx, vy) = self.axis();
        vx != 0.0 || vy != 0.0
    }

    fn axis(&self) -> (f64, f64) {
        let mut x = 0.0;
        let mut y = 0.0;
        for dir in &self.held {
            match dir {
                Direction::Up => y -= 1.0,
                Direction::Down => y += 1.0,
                Direction::Left => x -= 1.0,
                Direction::Right => x += 1.0,
            }
        }
        (x, y)
    }

    /// Velocity for this frame; diagonals are normalised to `speed`.
    pub fn velocity(&self, speed: f64) -> Point {
        let (x, y) = self.axis();
        let len = (x * x + y * y).sqrt();
        if len == 0.0 {
            return Point::default();
        }
        Point::new(x / len * speed, y / len * speed)
    }

    /// Integrate one frame and clamp inside `[radius, bound - radius]`.
    pub fn step(&mut self, speed: f64, width: f64, height: f64, radius: f64) -> Point {
        let v = self.velocity(speed);
        let p = self.position.offset(v.x, v.y);
        self.position = clamp_point(p, width, height, radius);
        self.position
    }

    pub fn clamp_to(&mut self, width: f64, height: f64, radius: f64) {
        self.position = clamp_point(self.position, width, height, radius);
    }

    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = (width.max(0.0), height.max(0.0));
    }

    /// Scroll offset that centres the avatar, clamped so the viewport never
    /// leaves the canvas.
    pub fn camera(&self, canvas_width: f64, canvas_height: f64) -> Point {
        let (vw, vh) = self.viewport;
        if vw <= 0.0 || vh <= 0.0 {
            return Point::default();
        }
        let x = (self.position.x - vw / 2.0).clamp(0.0, (canvas_width - vw).max(0.0));
        let y = (self.position.y - vh / 2.0).clamp(0.0, (canvas_height - vh).max(0.0));
        Point::new(x, y)
    }
}

fn pad_direction(button: PadButton) -> Option<Direction> {
    match button {
        PadButton::Up => Some(Direction::Up),
        PadButton::Down => Some(Direction::Down),
        PadButton::Left => Some(Direction::Left),
        PadButton::Right => Some(Direction::Right),
        PadButton::Interact => None,
    }
}

fn clamp_point(p: Point, width: f64, height: f64, radius: f64) -> Point {
    let clamp = |v: f64, max: f64| {
        if max <= 2.0 * radius {
            max / 2.0
        } else {
            v.clamp(radius, max - radius)
        }
    };
    Point::new(clamp(p.x, width), clamp(p.y, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_speed_is_normalised() {
        let mut input = InputController::new(Point::new(50.0, 50.0));
        input.key_down(Direction::Right);
        input.key_down(Direction::Down);
        let v = input.velocity(3.0);
        assert!(((v.x * v.x + v.y * v.y).sqrt() - 3.0).abs() < 1e-9);
        input.key_down(Direction::Left);
        let v = input.velocity(3.0);
        assert_eq!(v.x, 0.0);
        assert_eq!(v.y, 3.0);
    }

    #[test]
    fn step_clamps_to_bounds() {
        let mut input = InputController::new(Point::new(12.0, 12.0));
        input.key_down(Direction::Left);
        input.key_down(Direction::Up);
        for _ in 0..10 {
            input.step(3.0, 200.0, 100.0, 10.0);
        }
        assert_eq!(input.position(), Point::new(10.0, 10.0));
    }

    #[test]
    fn pad_emulates_keys() {
        let mut input = InputController::new(Point::new(50.0, 50.0));
        assert_eq!(input.pad_press(PadButton::Right), PadEffect::None);
        assert!(input.is_moving());
        input.pad_release(PadButton::Right);
        assert!(!input.is_moving());
        assert_eq!(input.pad_press(PadButton::Interact), PadEffect::Interact);
    }

    #[test]
    fn camera_follows_and_clamps() {
        let mut input = InputController::new(Point::new(50.0, 50.0));
        input.set_viewport(400.0, 300.0);
        assert_eq!(input.camera(1200.0, 900.0), Point::new(0.0, 0.0));
        input.set_position(Point::new(1150.0, 600.0));
        assert_eq!(input.camera(1200.0, 900.0), Point::new(800.0, 450.0));
        input.set_position(Point::new(600.0, 450.0));
        assert_eq!(input.camera(1200.0, 900.0), Point::new(400.0, 300.0));
    }
}
