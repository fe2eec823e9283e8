//! Synthetic frame sources standing in for a camera.

use clap::ValueEnum;
use ef_core::Lattice;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scene {
    /// Static vertical step at the centre, with sensor noise
    Step,
    /// Bright vertical bar sweeping left to right
    Bar,
    /// Pure uniform noise, no persistent structure
    Noise,
}

pub struct SceneSource {
    scene: Scene,
    size: usize,
    noise: f64,
    frame: usize,
    rng: SmallRng,
}

impl SceneSource {
    pub fn new(scene: Scene, size: usize, noise: f64, seed: u64) -> Self {
        Self {
            scene,
            size,
            noise: noise.max(0.0),
            frame: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn jitter(&mut self) -> f64 {
        if self.noise > 0.0 {
            self.rng.random_range(-self.noise..self.noise)
        } else {
            0.0
        }
    }

    pub fn next_frame(&mut self) -> ef_core::Result<Lattice> {
        let n = self.size;
        let mut data = Vec::with_capacity(n * n);
        let bar_width = (n / 8).max(1);
        let bar_start = self.frame % n.max(1);
        for _y in 0..n {
            for x in 0..n {
                let base = match self.scene {
                    Scene::Step => {
                        if x >= n / 2 {
                            0.8
                        } else {
                            0.2
                        }
                    }
                    Scene::Bar => {
                        let offset = (x + n - bar_start) % n;
                        if offset < bar_width { 0.9 } else { 0.1 }
                    }
                    Scene::Noise => self.rng.random::<f64>(),
                };
                let v = base + self.jitter();
                data.push(v.clamp(0.0, 1.0));
            }
        }
        self.frame += 1;
        Lattice::square(n, data)
    }
}
