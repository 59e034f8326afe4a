use nalgebra::Vector2;
use serde::Deserialize;
use tracing::debug;

use crate::blob::{find_blobs, BlobCandidate};
use crate::config::{ColorRange, Config, ConfigError};
use crate::extractor::{AdaptiveBackgroundExtractor, ColorRangeExtractor, ForegroundExtractor};
use crate::frame::{Frame, Mask};
use crate::pose::{estimate_pose, PoseEstimate};
use crate::velocity::VelocityEstimator;

/// Which foreground extractor / candidate selection pairing is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Color-range thresholding. There is no candidate ambiguity: the
    /// largest region is the object.
    ColorRange,
    /// Adaptive background subtraction with nearest-neighbor identity
    /// continuity across frames.
    Motion,
}

/// Minimum blob area accepted by the motion strategy until configured
/// otherwise.
const DEFAULT_MIN_AREA: usize = 100;

/// Everything carried between `update` calls. Owned exclusively by one
/// [`Tracker`] and mutated only by its `update`.
#[derive(Debug)]
struct TrackerState {
    /// Pose for the current frame; present exactly while a lock exists.
    pose: Option<PoseEstimate>,
    /// Last locked centroid, the anchor for nearest-neighbor gating.
    prev_centroid: Option<Vector2<f64>>,
    /// Velocity computed at the last locked frame.
    velocity: Vector2<f64>,
}

impl Default for TrackerState {
    fn default() -> Self {
        TrackerState {
            pose: None,
            prev_centroid: None,
            velocity: Vector2::zeros(),
        }
    }
}

/// Single-object tracker: runs foreground extraction, blob selection,
/// pose and velocity estimation behind one `update` call per frame.
///
/// Each independent video source needs its own instance; nothing is
/// shared between trackers.
pub struct Tracker {
    strategy: Strategy,
    color: ColorRangeExtractor,
    motion: AdaptiveBackgroundExtractor,
    min_area: usize,
    state: TrackerState,
    velocity: VelocityEstimator,
    last_mask: Option<Mask>,
}

impl Tracker {
    pub fn new(strategy: Strategy) -> Self {
        Tracker {
            strategy,
            color: ColorRangeExtractor::new(ColorRange::full()),
            motion: AdaptiveBackgroundExtractor::new(),
            min_area: DEFAULT_MIN_AREA,
            state: TrackerState::default(),
            velocity: VelocityEstimator::new(),
            last_mask: None,
        }
    }

    /// Build a tracker from a loaded [`Config`], validating its bounds.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut tracker = Tracker::new(config.strategy);
        tracker.configure_color_range(config.color_low, config.color_high)?;
        tracker.configure_min_area(config.min_area);
        Ok(tracker)
    }

    /// Replace the color-range bounds, effective from the next update.
    /// An invalid range is rejected and the previous bounds stay active.
    pub fn configure_color_range(
        &mut self,
        low: [u8; 3],
        high: [u8; 3],
    ) -> Result<(), ConfigError> {
        let range = ColorRange::new(low, high)?;
        self.color.set_range(range);
        Ok(())
    }

    /// Minimum blob area accepted by the motion strategy, effective
    /// from the next update.
    pub fn configure_min_area(&mut self, threshold: usize) {
        self.min_area = threshold;
    }

    /// Switch the active strategy. Identity state from the previous
    /// strategy (pose, previous centroid, velocity history) is
    /// discarded. The background model is kept; use
    /// [`reset_background`](Self::reset_background) on a scene cut.
    pub fn select_strategy(&mut self, strategy: Strategy) {
        debug!(from = ?self.strategy, to = ?strategy, "strategy switch");
        self.strategy = strategy;
        self.state = TrackerState::default();
        self.velocity.reset();
    }

    /// Reinitialize the adaptive background model from the next frame.
    pub fn reset_background(&mut self) {
        self.motion.reset();
    }

    /// Run the full pipeline on one frame. Returns whether a lock
    /// exists after this call.
    ///
    /// `timestamp` is in seconds; it only has to be monotonic within
    /// one tracker's update sequence.
    pub fn update(&mut self, frame: &Frame, timestamp: f64) -> bool {
        // Configuration snapshot for this update; mutators apply to the
        // next one.
        let min_area = self.min_area;

        let mask = match self.strategy {
            Strategy::ColorRange => self.color.extract(frame),
            Strategy::Motion => self.motion.extract(frame),
        };
        let candidates = find_blobs(&mask);
        debug!(
            strategy = ?self.strategy,
            candidates = candidates.len(),
            foreground = mask.foreground_count(),
            "frame segmented"
        );

        let selected = match self.strategy {
            Strategy::ColorRange => select_largest(candidates),
            Strategy::Motion => select_nearest(candidates, self.state.prev_centroid, min_area),
        };
        let pose = selected.and_then(|blob| estimate_pose(&blob.pixels));
        self.last_mask = Some(mask);

        match pose {
            Some(pose) => {
                if self.state.pose.is_none() {
                    debug!(x = pose.centroid.x, y = pose.centroid.y, "lock acquired");
                }
                self.state.velocity = self.velocity.update(pose.centroid, timestamp);
                self.state.prev_centroid = Some(pose.centroid);
                self.state.pose = Some(pose);
                true
            }
            None => {
                if self.state.pose.is_some() {
                    debug!("lock lost");
                }
                // A fresh lock starts over: largest-area selection and
                // zero velocity.
                self.state = TrackerState::default();
                self.velocity.reset();
                false
            }
        }
    }

    pub fn has_lock(&self) -> bool {
        self.state.pose.is_some()
    }

    /// Centroid of the tracked object, if a lock exists.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.state.pose.map(|p| (p.centroid.x, p.centroid.y))
    }

    /// Orientation of the major axis against the frame's vertical, in
    /// degrees within [0, 180], if a lock exists.
    pub fn angle(&self) -> Option<f64> {
        self.state.pose.map(|p| p.angle_degrees())
    }

    /// Velocity at the last locked frame, in pixels per second. Zero
    /// before the first lock and after a lock is lost.
    pub fn velocity_vector(&self) -> Vector2<f64> {
        self.state.velocity
    }

    /// Corners of the axis-aligned-to-the-object rectangle, if a lock
    /// exists.
    pub fn oriented_bounding_box(
        &self,
        half_length: f64,
        half_width: f64,
    ) -> Option<[Vector2<f64>; 4]> {
        self.state
            .pose
            .map(|p| p.oriented_rect(half_length, half_width))
    }

    /// The mask computed by the last update, for callers that display it.
    pub fn last_mask(&self) -> Option<&Mask> {
        self.last_mask.as_ref()
    }
}

fn select_largest(candidates: Vec<BlobCandidate>) -> Option<BlobCandidate> {
    candidates.into_iter().max_by_key(|b| b.area)
}

/// Nearest-neighbor identity gating for the motion strategy.
///
/// Candidates below `min_area` are noise and never selectable. With a
/// previous centroid, the nearest surviving candidate wins; there is no
/// upper bound on the jump distance, so identity can move to a distant
/// blob when it is the closest survivor. Without a previous centroid
/// (first lock, or lock previously lost) the largest survivor is the
/// least arbitrary start.
fn select_nearest(
    candidates: Vec<BlobCandidate>,
    prev: Option<Vector2<f64>>,
    min_area: usize,
) -> Option<BlobCandidate> {
    let survivors = candidates.into_iter().filter(|b| b.area >= min_area);
    match prev {
        Some(prev) => survivors.min_by(|a, b| {
            let da = (a.centroid - prev).norm_squared();
            let db = (b.centroid - prev).norm_squared();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        }),
        None => survivors.max_by_key(|b| b.area),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const GRAY: [u8; 3] = [120, 120, 120];
    const GREEN: [u8; 3] = [40, 200, 40];

    fn solid_frame(w: usize, h: usize, rgb: [u8; 3]) -> Frame {
        let mut frame = Frame::new(w, h, 3);
        for y in 0..h {
            for x in 0..w {
                frame.set_pixel(x, y, &rgb);
            }
        }
        frame
    }

    fn frame_with_rect(x0: usize, y0: usize, w: usize, h: usize, rgb: [u8; 3]) -> Frame {
        let mut frame = solid_frame(120, 90, GRAY);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                frame.set_pixel(x, y, &rgb);
            }
        }
        frame
    }

    fn green_tracker() -> Tracker {
        let mut tracker = Tracker::new(Strategy::ColorRange);
        tracker
            .configure_color_range([40, 50, 50], [80, 255, 255])
            .unwrap();
        tracker
    }

    fn candidate(area: usize, x: f64, y: f64) -> BlobCandidate {
        // The resolver only looks at area and centroid.
        BlobCandidate {
            pixels: Vec::new(),
            area,
            centroid: Vector2::new(x, y),
        }
    }

    #[test]
    fn test_resolver_filters_noise_before_gating() {
        // The small candidate is nearer but below the area threshold,
        // so the distant large one must win.
        let prev = Some(Vector2::new(0.0, 0.0));
        let candidates = vec![candidate(5, 1.0, 0.0), candidate(500, 100.0, 0.0)];
        let selected = select_nearest(candidates, prev, 50).unwrap();
        assert_eq!(selected.area, 500);
    }

    #[test]
    fn test_resolver_picks_nearest_survivor() {
        let prev = Some(Vector2::new(50.0, 50.0));
        let candidates = vec![
            candidate(200, 10.0, 10.0),
            candidate(150, 55.0, 52.0),
            candidate(900, 100.0, 100.0),
        ];
        let selected = select_nearest(candidates, prev, 100).unwrap();
        assert_eq!(selected.area, 150);
    }

    #[test]
    fn test_resolver_without_history_prefers_largest() {
        let candidates = vec![candidate(200, 10.0, 10.0), candidate(900, 100.0, 100.0)];
        let selected = select_nearest(candidates, None, 100).unwrap();
        assert_eq!(selected.area, 900);
    }

    #[test]
    fn test_resolver_reports_no_selection() {
        let candidates = vec![candidate(5, 1.0, 0.0), candidate(8, 2.0, 0.0)];
        assert!(select_nearest(candidates, Some(Vector2::zeros()), 50).is_none());
        assert!(select_nearest(Vec::new(), None, 50).is_none());
    }

    #[test]
    fn test_lock_loss_and_regain() {
        let mut tracker = green_tracker();
        let visible = frame_with_rect(30, 30, 24, 12, GREEN);
        let empty = solid_frame(120, 90, GRAY);

        assert!(tracker.update(&visible, 0.0));
        assert!(tracker.has_lock());
        assert!(tracker.position().is_some());

        assert!(!tracker.update(&empty, 1.0 / 30.0));
        assert!(!tracker.has_lock());
        assert!(tracker.position().is_none());
        assert!(tracker.angle().is_none());
        assert_relative_eq!(tracker.velocity_vector().norm(), 0.0);

        assert!(tracker.update(&visible, 2.0 / 30.0));
        assert!(tracker.has_lock());
        // The regained lock starts its velocity history over.
        assert_relative_eq!(tracker.velocity_vector().norm(), 0.0);
    }

    #[test]
    fn test_stalled_feed_is_idempotent() {
        let mut tracker = green_tracker();
        let frame = frame_with_rect(40, 40, 24, 12, GREEN);

        tracker.update(&frame, 1.0);
        let first_pos = tracker.position().unwrap();
        let first_angle = tracker.angle().unwrap();

        tracker.update(&frame, 1.0);
        let second_pos = tracker.position().unwrap();
        assert_relative_eq!(first_pos.0, second_pos.0, epsilon = 1e-9);
        assert_relative_eq!(first_pos.1, second_pos.1, epsilon = 1e-9);
        assert_relative_eq!(first_angle, tracker.angle().unwrap(), epsilon = 1e-9);
        assert_relative_eq!(tracker.velocity_vector().norm(), 0.0);
    }

    #[test]
    fn test_velocity_points_along_motion() {
        let mut tracker = green_tracker();
        tracker.update(&frame_with_rect(30, 40, 24, 12, GREEN), 0.0);
        tracker.update(&frame_with_rect(40, 40, 24, 12, GREEN), 1.0);
        let v = tracker.velocity_vector();
        // The whole region shifted 10 px in +x over one second.
        assert_relative_eq!(v.x, 10.0, epsilon = 1e-6);
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wide_region_reports_perpendicular_angle() {
        let mut tracker = green_tracker();
        tracker.update(&frame_with_rect(30, 40, 48, 10, GREEN), 0.0);
        let angle = tracker.angle().unwrap();
        assert_relative_eq!(angle, 90.0, epsilon = 1.0);
    }

    #[test]
    fn test_oriented_bounding_box_brackets_position() {
        let mut tracker = green_tracker();
        tracker.update(&frame_with_rect(40, 40, 30, 12, GREEN), 0.0);
        let (cx, cy) = tracker.position().unwrap();
        let corners = tracker.oriented_bounding_box(20.0, 10.0).unwrap();
        let mean_x = corners.iter().map(|c| c.x).sum::<f64>() / 4.0;
        let mean_y = corners.iter().map(|c| c.y).sum::<f64>() / 4.0;
        assert_relative_eq!(mean_x, cx, epsilon = 1e-9);
        assert_relative_eq!(mean_y, cy, epsilon = 1e-9);
    }

    #[test]
    fn test_rejected_configuration_keeps_previous_range() {
        let mut tracker = green_tracker();
        let frame = frame_with_rect(30, 30, 24, 12, GREEN);
        assert!(tracker
            .configure_color_range([90, 0, 0], [10, 255, 255])
            .is_err());
        // The green range configured earlier is still in effect.
        assert!(tracker.update(&frame, 0.0));
    }

    #[test]
    fn test_strategy_switch_clears_carried_state() {
        let mut tracker = green_tracker();
        tracker.update(&frame_with_rect(30, 30, 24, 12, GREEN), 0.0);
        assert!(tracker.has_lock());

        tracker.select_strategy(Strategy::Motion);
        assert!(!tracker.has_lock());
        assert!(tracker.position().is_none());
        assert_relative_eq!(tracker.velocity_vector().norm(), 0.0);
    }

    #[test]
    fn test_motion_strategy_tracks_moving_object() {
        let mut tracker = Tracker::new(Strategy::Motion);
        tracker.configure_min_area(50);
        let background = solid_frame(120, 90, GRAY);

        // Seed and settle the background model.
        assert!(!tracker.update(&background, 0.0));
        assert!(!tracker.update(&background, 0.1));

        let bright = [250, 250, 250];
        assert!(tracker.update(&frame_with_rect(20, 20, 12, 12, bright), 0.2));
        let (x0, _) = tracker.position().unwrap();

        assert!(tracker.update(&frame_with_rect(24, 20, 12, 12, bright), 0.3));
        let (x1, _) = tracker.position().unwrap();
        assert!(x1 > x0);
        assert!(tracker.velocity_vector().x > 0.0);
    }

    #[test]
    fn test_motion_strategy_drops_noise_blobs() {
        let mut tracker = Tracker::new(Strategy::Motion);
        tracker.configure_min_area(100);
        let background = solid_frame(120, 90, GRAY);
        tracker.update(&background, 0.0);
        tracker.update(&background, 0.1);

        // A 6x6 intrusion survives the opening but is below min_area.
        let locked = tracker.update(&frame_with_rect(20, 20, 6, 6, [250, 250, 250]), 0.2);
        assert!(!locked);
        assert!(!tracker.has_lock());
    }

    #[test]
    fn test_last_mask_matches_frame_dimensions() {
        let mut tracker = green_tracker();
        assert!(tracker.last_mask().is_none());
        tracker.update(&solid_frame(120, 90, GRAY), 0.0);
        let mask = tracker.last_mask().unwrap();
        assert_eq!(mask.width(), 120);
        assert_eq!(mask.height(), 90);
    }
}
