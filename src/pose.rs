use nalgebra::{Matrix2, Vector2};

/// Centroid and principal axes of the tracked object, derived fresh
/// every frame a lock exists.
#[derive(Debug, Clone, Copy)]
pub struct PoseEstimate {
    /// Geometric center of the pixel set, in pixel coordinates.
    pub centroid: Vector2<f64>,
    /// Major axis: unit eigenvector of the larger covariance eigenvalue,
    /// the direction of greatest spread.
    pub axis0: Vector2<f64>,
    /// Minor axis: unit eigenvector orthogonal to `axis0`.
    pub axis1: Vector2<f64>,
}

/// Estimate the pose of one blob from its pixel coordinates.
///
/// Computes the 2x2 covariance of the coordinates about their mean and
/// eigen-decomposes it. Fewer than two pixels leave the covariance
/// undefined, which surfaces as `None` rather than NaN axes.
pub fn estimate_pose(pixels: &[(u32, u32)]) -> Option<PoseEstimate> {
    if pixels.len() < 2 {
        return None;
    }
    let n = pixels.len() as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for &(x, y) in pixels {
        sum_x += x as f64;
        sum_y += y as f64;
    }
    let centroid = Vector2::new(sum_x / n, sum_y / n);

    let mut cov_xx = 0.0;
    let mut cov_xy = 0.0;
    let mut cov_yy = 0.0;
    for &(x, y) in pixels {
        let dx = x as f64 - centroid.x;
        let dy = y as f64 - centroid.y;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    let covariance = Matrix2::new(cov_xx / n, cov_xy / n, cov_xy / n, cov_yy / n);

    let eigen = covariance.symmetric_eigen();
    let major = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        0
    } else {
        1
    };
    let axis0: Vector2<f64> = eigen.eigenvectors.column(major).into_owned();
    let axis1: Vector2<f64> = eigen.eigenvectors.column(1 - major).into_owned();

    if !(axis0.x.is_finite() && axis0.y.is_finite() && axis1.x.is_finite() && axis1.y.is_finite()) {
        return None;
    }

    Some(PoseEstimate {
        centroid,
        axis0,
        axis1,
    })
}

impl PoseEstimate {
    /// Angle between the major axis and the frame's vertical axis, in
    /// degrees within [0, 180].
    ///
    /// The major axis carries no front/back sign, so an orientation and
    /// its 180-degree flip report the same axis line; callers that need
    /// a heading must disambiguate externally.
    pub fn angle_degrees(&self) -> f64 {
        let vertical = Vector2::new(0.0, 1.0);
        let dot = self.axis0.dot(&vertical).clamp(-1.0, 1.0);
        dot.acos().to_degrees()
    }

    /// Corners of the rectangle centered on the centroid and aligned
    /// with the object's axes, offset by the given half-extents along
    /// the major and minor axis respectively.
    pub fn oriented_rect(&self, half_length: f64, half_width: f64) -> [Vector2<f64>; 4] {
        let a = self.axis0 * half_length;
        let b = self.axis1 * half_width;
        [
            self.centroid + a + b,
            self.centroid + a - b,
            self.centroid - a - b,
            self.centroid - a + b,
        ]
    }
}
