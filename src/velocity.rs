use nalgebra::Vector2;

/// Unit conversion applied to the raw displacement-over-time quotient.
/// Timestamps are in seconds, so velocities come out in pixels per second.
pub const VELOCITY_SCALE: f64 = 1.0;

/// Derives a velocity vector from two consecutive timestamped centroid
/// samples.
#[derive(Debug, Default)]
pub struct VelocityEstimator {
    prev: Option<(Vector2<f64>, f64)>,
}

impl VelocityEstimator {
    pub fn new() -> Self {
        VelocityEstimator { prev: None }
    }

    /// Feed the next centroid sample and get the velocity estimate.
    ///
    /// The first sample after construction or [`reset`](Self::reset)
    /// reports zero, as does a sample with no elapsed time (a stalled
    /// feed must not divide by zero). The stored previous sample is
    /// updated on every call, degenerate or not.
    pub fn update(&mut self, centroid: Vector2<f64>, timestamp: f64) -> Vector2<f64> {
        let velocity = match self.prev {
            Some((prev_centroid, prev_time)) => {
                let elapsed = timestamp - prev_time;
                if elapsed > 0.0 {
                    (centroid - prev_centroid) * (VELOCITY_SCALE / elapsed)
                } else {
                    Vector2::zeros()
                }
            }
            None => Vector2::zeros(),
        };
        self.prev = Some((centroid, timestamp));
        velocity
    }

    /// Forget the stored sample so the next update reports zero again.
    pub fn reset(&mut self) {
        self.prev = None;
    }
}
