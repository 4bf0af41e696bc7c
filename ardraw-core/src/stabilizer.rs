//! # Tracking stabilizer
//!
//! Temporal filter over the candidate poses of a tracked image. A pose is "stable" once it has
//! stayed within a small position and rotation tolerance of a baseline for several consecutive
//! frames. The first stable report of a session is what the orchestrator commits an anchor on, so
//! the overlay doesn't lock onto a pose that is still jittering.
//!
//! Fast movement during the stabilization window restarts the count from zero. That's the
//! intended throttle, trading time-to-lock for less jitter.

use crate::pose::Pose;

/// Tolerances and frame counts. Fixed for the lifetime of a [`Stabilizer`].
#[derive(Copy, Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Max position delta from baseline, in world units, for a frame to count as stable.
    pub position_tolerance: f32,
    /// Max rotation delta from baseline, in radians. See [`Pose::rotation_delta`].
    pub rotation_tolerance: f32,
    /// Consecutive stable frames before a pose is reported stable.
    pub stability_threshold: u32,
    /// Consecutive frames with nothing detected before the baseline is thrown away.
    pub lost_frame_limit: u32,
}
impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 0.02,
            rotation_tolerance: 0.05,
            stability_threshold: 5,
            lost_frame_limit: 90,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct StabilityState {
    pub baseline: Option<Pose>,
    /// Consecutive frames within tolerance of `baseline`.
    pub counter: u32,
    /// Sticky. Once an anchor is committed this is never cleared, not even by a loss reset.
    pub anchor_committed: bool,
    /// Consecutive frames with no tracked or paused trackable.
    pub lost_frames: u32,
}

#[derive(Debug, Default)]
pub struct Stabilizer {
    config: StabilizerConfig,
    state: StabilityState,
}
impl Stabilizer {
    #[must_use]
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            state: StabilityState::default(),
        }
    }
    #[must_use]
    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }
    #[must_use]
    pub fn state(&self) -> &StabilityState {
        &self.state
    }
    /// Feed this frame's candidate pose. Returns whether it is stable.
    pub fn observe(&mut self, current: &Pose) -> bool {
        let Some(baseline) = self.state.baseline else {
            self.state.baseline = Some(*current);
            self.state.counter = 1;
            return false;
        };

        let position_ok = baseline.position_delta(current) < self.config.position_tolerance;
        let rotation_ok = baseline.rotation_delta(current) < self.config.rotation_tolerance;

        if position_ok && rotation_ok {
            self.state.counter = self.state.counter.saturating_add(1);
            if self.state.counter >= self.config.stability_threshold {
                self.state.baseline = Some(*current);
                return true;
            }
        } else {
            self.state.counter = 0;
        }
        false
    }
    /// Something is tracked or paused this frame.
    pub fn mark_detected(&mut self) {
        self.state.lost_frames = 0;
    }
    /// Nothing is tracked or paused this frame. Returns `true` if this pushed the loss over the
    /// limit and the baseline was reset.
    pub fn mark_lost(&mut self) -> bool {
        self.state.lost_frames = self.state.lost_frames.saturating_add(1);
        if self.state.lost_frames > self.config.lost_frame_limit {
            log::debug!(
                "Tracking lost for {} frames, resetting stabilizer",
                self.state.lost_frames
            );
            self.reset_baseline();
            self.state.lost_frames = 0;
            true
        } else {
            false
        }
    }
    /// Forget the baseline and stable count. The committed flag is left as-is.
    pub fn reset_baseline(&mut self) {
        self.state.baseline = None;
        self.state.counter = 0;
    }
    pub fn commit_anchor(&mut self) {
        self.state.anchor_committed = true;
    }
    #[must_use]
    pub fn is_anchor_committed(&self) -> bool {
        self.state.anchor_committed
    }
    /// Stabilization progress in percent, `0..=100`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        let threshold = self.config.stability_threshold.max(1);
        // As OK - both are small frame counts.
        (self.state.counter as f32 / threshold as f32 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod test {
    use super::{Stabilizer, StabilizerConfig};
    use crate::pose::Pose;

    fn stabilizer() -> Stabilizer {
        Stabilizer::new(StabilizerConfig::default())
    }

    #[test]
    fn converges_on_fifth_call() {
        let mut stabilizer = stabilizer();
        let pose = Pose::from_translation([0.1, 0.2, -0.5]);
        // Baseline, then three more below threshold.
        for _ in 0..4 {
            assert!(!stabilizer.observe(&pose));
        }
        assert!(stabilizer.observe(&pose));
        assert_eq!(stabilizer.state().counter, 5);
        assert_eq!(stabilizer.progress(), 100.0);
        // Stays stable.
        assert!(stabilizer.observe(&pose));
    }
    #[test]
    fn jump_restarts_count() {
        let mut stabilizer = stabilizer();
        let pose = Pose::IDENTITY;
        let jumped = Pose::from_translation([0.05, 0.0, 0.0]);

        assert!(!stabilizer.observe(&pose));
        assert!(!stabilizer.observe(&pose));
        assert!(!stabilizer.observe(&jumped));
        assert_eq!(stabilizer.state().counter, 0);
        assert_eq!(stabilizer.progress(), 0.0);

        // Five more stable frames needed from here.
        for _ in 0..4 {
            assert!(!stabilizer.observe(&pose));
        }
        assert!(stabilizer.observe(&pose));
    }
    #[test]
    fn small_jitter_is_tolerated() {
        let mut stabilizer = stabilizer();
        stabilizer.observe(&Pose::IDENTITY);
        let jitter = [0.005, -0.01, 0.015, 0.0];
        let results: Vec<bool> = jitter
            .iter()
            .map(|&x| stabilizer.observe(&Pose::from_translation([x, 0.0, 0.0])))
            .collect();
        assert_eq!(results, [false, false, false, true]);
    }
    #[test]
    fn rotation_beyond_tolerance_resets() {
        let mut stabilizer = stabilizer();
        stabilizer.observe(&Pose::IDENTITY);
        stabilizer.observe(&Pose::IDENTITY);
        // acos(cos(0.1)) = 0.1 rad > 0.05
        let half: f32 = 0.1;
        let twisted = Pose::new([0.0; 3], [0.0, half.sin(), 0.0, half.cos()]);
        assert!(!stabilizer.observe(&twisted));
        assert_eq!(stabilizer.state().counter, 0);
    }
    #[test]
    fn loss_reset_keeps_commit() {
        let mut stabilizer = stabilizer();
        for _ in 0..5 {
            stabilizer.observe(&Pose::IDENTITY);
        }
        stabilizer.commit_anchor();

        for _ in 0..90 {
            assert!(!stabilizer.mark_lost());
        }
        assert!(stabilizer.state().baseline.is_some());
        assert!(stabilizer.mark_lost());

        let state = stabilizer.state();
        assert_eq!(state.baseline, None);
        assert_eq!(state.counter, 0);
        assert!(state.anchor_committed);
    }
    #[test]
    fn detection_clears_loss_count() {
        let mut stabilizer = stabilizer();
        for _ in 0..80 {
            stabilizer.mark_lost();
        }
        stabilizer.mark_detected();
        for _ in 0..80 {
            assert!(!stabilizer.mark_lost());
        }
    }
}
