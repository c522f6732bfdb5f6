use std::collections::VecDeque;

use gatekeeper_clock::MonoTs;

const CAPACITY: usize = 32;
const DIRECTION_CHANGE_THRESHOLD_DEGREES: f64 = 45.0;

/// One observed movement/rotation update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub at: MonoTs,
}

/// Bounded ring buffer of recent position samples (spec §3: capacity ≈32),
/// with path-length and spawn-distance maintained incrementally so a
/// status read never re-walks the whole buffer.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    spawn: Option<(f64, f64, f64)>,
    samples: VecDeque<PositionSample>,
    path_length: f64,
    last_heading: Option<(f64, f64)>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            spawn: None,
            samples: VecDeque::with_capacity(CAPACITY),
            path_length: 0.0,
            last_heading: None,
        }
    }

    /// Appends `sample`, folding its contribution into the running
    /// path-length and evicting the oldest entry once over capacity.
    /// Returns `true` if this update represents a significant (>45°)
    /// change in horizontal heading versus the previous segment.
    pub fn push(&mut self, sample: PositionSample) -> bool {
        if self.spawn.is_none() {
            self.spawn = Some((sample.x, sample.y, sample.z));
        }

        let mut direction_change = false;
        if let Some(prev) = self.samples.back() {
            let dx = sample.x - prev.x;
            let dz = sample.z - prev.z;
            let dy = sample.y - prev.y;
            self.path_length += (dx * dx + dy * dy + dz * dz).sqrt();

            if dx.abs() > f64::EPSILON || dz.abs() > f64::EPSILON {
                let heading = dz.atan2(dx);
                if let Some((px, pz)) = self.last_heading {
                    let prev_heading = pz.atan2(px);
                    let delta = angular_diff_degrees(prev_heading, heading);
                    direction_change = delta > DIRECTION_CHANGE_THRESHOLD_DEGREES;
                }
                self.last_heading = Some((dx, dz));
            }
        }

        if self.samples.len() == CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);

        direction_change
    }

    pub fn path_length(&self) -> f64 {
        self.path_length
    }

    pub fn distance_from_spawn(&self) -> f64 {
        let Some((sx, sy, sz)) = self.spawn else {
            return 0.0;
        };
        let Some(last) = self.samples.back() else {
            return 0.0;
        };
        let dx = last.x - sx;
        let dy = last.y - sy;
        let dz = last.z - sz;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn previous_y(&self) -> Option<f64> {
        let len = self.samples.len();
        if len < 2 {
            return None;
        }
        self.samples.get(len - 2).map(|s| s.y)
    }

    pub fn samples(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn angular_diff_degrees(a_rad: f64, b_rad: f64) -> f64 {
    let diff = (b_rad - a_rad).to_degrees() % 360.0;
    let diff = (diff + 360.0) % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64, z: f64) -> PositionSample {
        PositionSample {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            at: MonoTs::ZERO,
        }
    }

    #[test]
    fn path_length_accumulates_euclidean_distance() {
        let mut history = PositionHistory::new();
        history.push(sample(0.0, 64.0, 0.0));
        history.push(sample(3.0, 64.0, 4.0));
        assert!((history.path_length() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_identical_sample_does_not_grow_path_length() {
        let mut history = PositionHistory::new();
        history.push(sample(1.0, 64.0, 1.0));
        let before = history.path_length();
        history.push(sample(1.0, 64.0, 1.0));
        assert_eq!(before, history.path_length());
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let mut history = PositionHistory::new();
        for i in 0..(CAPACITY + 5) {
            history.push(sample(i as f64, 64.0, 0.0));
        }
        assert_eq!(history.len(), CAPACITY);
    }

    #[test]
    fn distance_from_spawn_uses_first_sample_as_origin() {
        let mut history = PositionHistory::new();
        history.push(sample(0.0, 64.0, 0.0));
        history.push(sample(3.0, 64.0, 4.0));
        assert!((history.distance_from_spawn() - 5.0).abs() < 1e-9);
    }
}
