//! Kettlebell swing phase state machine.
//!
//! Phases cycle `Top -> Connect -> Bottom -> Release -> Top`; closing the cycle
//! counts one rep. A transition fires only after its guard has held for
//! `min_dwell_frames` consecutive frames and the current phase has itself lasted
//! that long, so single-frame pose glitches never move the machine. The return
//! to Top additionally needs the bell to have reached its apex, confirmed by a
//! wrist-height peak or, failing that, by a run of horizontal-arm frames.
//!
//! Angles are read from the right arm only. Left-handed footage is expected to
//! be mirrored by the caller before it reaches the analyzer.

use super::peak_detector::WristPeakDetector;
use super::quality::{score_rep, RepStats};
use super::{FormAnalyzer, FormResult, PhasePeak, RepPosition, RepQuality, SwingPhase};
use crate::biomechanics::{candidate_score, prefers_candidate, BiomechanicsAnalyzer};
use crate::config::{AnalyzerConfig, BiomechanicsConfig};
use crate::constants::TIME_EPSILON;
use crate::skeleton::{AngleSnapshot, Skeleton};
use crate::Result;
use log::{debug, info};

/// Frame that met the guard into the next phase before the transition committed
struct PendingFrame {
    skeleton: Skeleton,
    angles: AngleSnapshot,
    timestamp_ms: f64,
    video_time: Option<f64>,
}

/// Peak-based kettlebell swing analyzer
pub struct KettlebellSwingAnalyzer {
    config: AnalyzerConfig,
    phase: SwingPhase,
    frames_in_phase: u32,
    /// Consecutive frames the guard into the next phase has held
    pending: u32,
    /// The frames counted by `pending`, offered to the next phase once it is entered
    pending_frames: Vec<PendingFrame>,
    rep_count: u32,
    peaks: [Option<PhasePeak>; 4],
    rep_stats: RepStats,
    wrist_peak: WristPeakDetector,
    wrist_peak_seen: bool,
    horizontal_frames: u32,
    last_video_time: Option<f64>,
    last_quality: Option<RepQuality>,
    biomechanics: BiomechanicsAnalyzer,
}

impl KettlebellSwingAnalyzer {
    /// Create an analyzer
    ///
    /// # Errors
    ///
    /// Returns a config error if the biomechanics filter settings are invalid
    pub fn new(config: AnalyzerConfig, biomechanics: BiomechanicsConfig) -> Result<Self> {
        let wrist_peak =
            WristPeakDetector::new(config.wrist_window, config.wrist_smoothing_window, config.peak_drop_ratio);
        Ok(Self {
            phase: SwingPhase::Top,
            frames_in_phase: 0,
            pending: 0,
            pending_frames: Vec::with_capacity(config.min_dwell_frames as usize),
            rep_count: 0,
            peaks: [None, None, None, None],
            rep_stats: RepStats::default(),
            wrist_peak,
            wrist_peak_seen: false,
            horizontal_frames: 0,
            last_video_time: None,
            last_quality: None,
            biomechanics: BiomechanicsAnalyzer::new(&biomechanics)?,
            config,
        })
    }

    /// Analyzer with default thresholds
    pub fn with_defaults() -> Result<Self> {
        Self::new(AnalyzerConfig::default(), BiomechanicsConfig::default())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Working set of phase peaks for the rep in progress
    pub fn peaks(&self) -> impl Iterator<Item = &PhasePeak> {
        self.peaks.iter().flatten()
    }

    pub fn frames_in_phase(&self) -> u32 {
        self.frames_in_phase
    }

    /// Biomechanics state, e.g. for standing calibration
    pub fn biomechanics_mut(&mut self) -> &mut BiomechanicsAnalyzer {
        &mut self.biomechanics
    }

    fn is_horizontal(&self, angles: &AngleSnapshot) -> bool {
        angles.arm_to_vertical >= self.config.top_arm_min
    }

    /// Guard for entering `target` from its predecessor
    fn guard(&self, target: SwingPhase, a: &AngleSnapshot) -> bool {
        let c = &self.config;
        let arm = a.arm_to_vertical;
        match target {
            SwingPhase::Connect => arm.abs() <= c.connect_arm_band && a.spine <= c.connect_spine_max,
            SwingPhase::Bottom => {
                arm <= -c.bottom_arm_behind_min
                    && arm.abs() <= c.bottom_arm_behind_max
                    && a.spine >= c.bottom_spine_min
                    && a.hip <= c.bottom_hip_max
            }
            SwingPhase::Release => arm >= c.release_arm_min && a.spine <= c.release_spine_max,
            SwingPhase::Top => a.spine <= c.top_spine_max && a.hip >= c.top_hip_min && self.is_horizontal(a),
        }
    }

    fn offer_peak(
        &mut self,
        phase: SwingPhase,
        skeleton: &Skeleton,
        angles: &AngleSnapshot,
        timestamp_ms: f64,
        video_time: Option<f64>,
    ) {
        let score = candidate_score(phase, angles);
        let slot = &mut self.peaks[phase.index()];
        if prefers_candidate(phase, slot.as_ref().map(|p| p.score), score) {
            *slot = Some(PhasePeak {
                phase,
                skeleton: skeleton.clone(),
                timestamp_ms,
                video_time,
                score,
                angles: *angles,
            });
        }
    }

    /// Hand buffered guard frames back to the current phase after the run broke
    fn flush_pending(&mut self) {
        let frames = std::mem::take(&mut self.pending_frames);
        if self.phase == SwingPhase::Top {
            return;
        }
        for frame in &frames {
            self.offer_peak(self.phase, &frame.skeleton, &frame.angles, frame.timestamp_ms, frame.video_time);
        }
    }

    fn enter(&mut self, phase: SwingPhase) {
        debug!("Swing phase {} -> {} after {} frames", self.phase, phase, self.frames_in_phase);
        self.phase = phase;
        self.frames_in_phase = 1;
        self.pending = 0;
        self.pending_frames.clear();
        if phase == SwingPhase::Release {
            self.wrist_peak.reset();
            self.wrist_peak_seen = false;
            self.horizontal_frames = 0;
        }
    }

    fn complete_rep(&mut self) -> (Vec<RepPosition>, RepQuality) {
        self.rep_count += 1;
        let positions: Vec<RepPosition> = self.peaks.iter_mut().filter_map(Option::take).map(RepPosition::from).collect();

        let metrics = self.rep_stats.metrics();
        let (score, feedback) = score_rep(&metrics);
        let composite = self.biomechanics.complete_rep(&metrics);
        self.rep_stats = RepStats::default();

        info!(
            "Rep {} complete: score {}, hinge {:.1}, lockout {:.1}, knee flexion {:.1}",
            self.rep_count, score, metrics.hinge_depth, metrics.lockout_angle, metrics.knee_flexion
        );
        let quality = RepQuality {
            score,
            metrics,
            feedback,
            composite: Some(composite),
        };
        self.last_quality = Some(quality.clone());
        (positions, quality)
    }
}

impl FormAnalyzer for KettlebellSwingAnalyzer {
    fn process_frame(&mut self, skeleton: &Skeleton, timestamp_ms: f64, video_time: Option<f64>) -> Result<FormResult> {
        if let (Some(time), Some(last)) = (video_time, self.last_video_time) {
            if time < last - TIME_EPSILON {
                debug!("Dropping stale frame at {time:.3}s (last {last:.3}s)");
                return Ok(FormResult::skipped(self.phase, self.rep_count));
            }
        }
        if !skeleton.has_visible_pose() {
            return Ok(FormResult::skipped(self.phase, self.rep_count));
        }
        let Some(angles) = skeleton.angles().filter(AngleSnapshot::is_finite) else {
            return Ok(FormResult::skipped(self.phase, self.rep_count));
        };
        if video_time.is_some() {
            self.last_video_time = video_time;
        }

        self.biomechanics.add_angles(angles, timestamp_ms);
        let velocity = self.biomechanics.velocity();
        self.rep_stats.update(angles.spine, angles.hip, angles.knee);
        self.frames_in_phase += 1;

        if self.phase == SwingPhase::Release {
            if let Some(torso) = skeleton.torso_length() {
                if self.wrist_peak.push(angles.wrist_height, torso) {
                    self.wrist_peak_seen = true;
                }
            }
            if self.is_horizontal(&angles) {
                self.horizontal_frames += 1;
                self.offer_peak(SwingPhase::Top, skeleton, &angles, timestamp_ms, video_time);
            } else {
                self.horizontal_frames = 0;
            }
        }

        let target = self.phase.next();
        let guard_met = self.guard(target, &angles);
        if guard_met {
            self.pending += 1;
            if target != SwingPhase::Top {
                self.pending_frames.push(PendingFrame {
                    skeleton: skeleton.clone(),
                    angles,
                    timestamp_ms,
                    video_time,
                });
            }
        } else {
            self.pending = 0;
            self.flush_pending();
        }

        let dwell = self.config.min_dwell_frames;
        let apex_confirmed = target != SwingPhase::Top
            || self.wrist_peak_seen
            || self.horizontal_frames >= self.config.top_fallback_frames;

        let mut result = FormResult {
            phase: self.phase,
            rep_completed: false,
            rep_count: self.rep_count,
            rep_positions: Vec::new(),
            quality: None,
            angles: Some(angles),
            velocity,
            skipped: false,
        };

        if self.pending >= dwell && self.frames_in_phase >= dwell && apex_confirmed {
            let buffered = std::mem::take(&mut self.pending_frames);
            self.enter(target);
            if target == SwingPhase::Top {
                let (positions, quality) = self.complete_rep();
                result.rep_completed = true;
                result.rep_positions = positions;
                result.quality = Some(quality);
            } else {
                // Oldest first, so timing phases keep the first qualifying frame
                for frame in &buffered {
                    self.offer_peak(target, &frame.skeleton, &frame.angles, frame.timestamp_ms, frame.video_time);
                }
            }
        } else if !guard_met && self.phase != SwingPhase::Top {
            self.offer_peak(self.phase, skeleton, &angles, timestamp_ms, video_time);
        }

        result.phase = self.phase;
        result.rep_count = self.rep_count;
        Ok(result)
    }

    fn reset(&mut self) {
        self.phase = SwingPhase::Top;
        self.frames_in_phase = 0;
        self.pending = 0;
        self.pending_frames.clear();
        self.rep_count = 0;
        self.peaks = [None, None, None, None];
        self.rep_stats = RepStats::default();
        self.wrist_peak.reset();
        self.wrist_peak_seen = false;
        self.horizontal_frames = 0;
        self.last_video_time = None;
        self.last_quality = None;
        self.biomechanics.reset();
    }

    fn rep_count(&self) -> u32 {
        self.rep_count
    }

    fn phase(&self) -> SwingPhase {
        self.phase
    }

    fn last_quality(&self) -> Option<&RepQuality> {
        self.last_quality.as_ref()
    }

    fn name(&self) -> &str {
        "kettlebell-swing"
    }
}
