use std::collections::VecDeque;

use bureau_protocol::{ParticleKind, ParticleView};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::geometry::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub kind: ParticleKind,
    pub position: Point,
    pub velocity: Point,
    pub alpha: f64,
    pub decay: f64,
}

/// Short-lived decorative particles. Bounded: the oldest particle is dropped
/// when the field is full.
#[derive(Debug)]
pub struct ParticleField {
    particles: VecDeque<Particle>,
    capacity: usize,
    rng: SmallRng,
}

impl ParticleField {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            particles: VecDeque::new(),
            capacity: capacity.max(1),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn spawn(&mut self, kind: ParticleKind, origin: Point) {
        let rng = &mut self.rng;
        let (vx, vy, decay) = match kind {
            ParticleKind::Spark => (
                rng.gen_range(-0.6..0.6),
                rng.gen_range(-1.2..-0.6),
                rng.gen_range(0.03..0.05),
            ),
            ParticleKind::Sweat => (rng.gen_range(-0.1..0.1), rng.gen_range(0.4..0.7), 0.025),
            ParticleKind::Sleep => (rng.gen_range(0.2..0.4), rng.gen_range(-0.5..-0.3), 0.012),
            ParticleKind::Steam => (rng.gen_range(-0.2..0.2), rng.gen_range(-0.6..-0.4), 0.02),
        };
        if self.particles.len() >= self.capacity {
            self.particles.pop_front();
        }
        self.particles.push_back(Particle {
            kind,
            position: origin,
            velocity: Point::new(vx, vy),
            alpha: 1.0,
            decay,
        });
    }

    pub fn advance(&mut self) {
        for p in self.particles.iter_mut() {
            p.position = p.position.offset(p.velocity.x, p.velocity.y);
            p.alpha -= p.decay;
        }
        self.particles.retain(|p| p.alpha > 0.0);
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn count(&self, kind: ParticleKind) -> usize {
        self.particles.iter().filter(|p| p.kind == kind).count()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    pub fn views(&self) -> Vec<ParticleView> {
        self.particles
            .iter()
            .map(|p| ParticleView {
                kind: p.kind,
                position: p.position.view(),
                alpha: p.alpha.clamp(0.0, 1.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particles_fade_out() {
        let mut field = ParticleField::new(16, 7);
        field.spawn(ParticleKind::Spark, Point::new(10.0, 10.0));
        assert_eq!(field.len(), 1);
        for _ in 0..40 {
            field.advance();
        }
        assert!(field.is_empty());
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut field = ParticleField::new(2, 7);
        field.spawn(ParticleKind::Sleep, Point::default());
        field.spawn(ParticleKind::Spark, Point::default());
        field.spawn(ParticleKind::Steam, Point::default());
        assert_eq!(field.len(), 2);
        assert_eq!(field.count(ParticleKind::Sleep), 0);
    }

    #[test]
    fn sparks_rise() {
        let mut field = ParticleField::new(4, 1);
        field.spawn(ParticleKind::Spark, Point::new(0.0, 100.0));
        field.advance();
        assert!(field.views()[0].position.y < 100.0);
    }
}
