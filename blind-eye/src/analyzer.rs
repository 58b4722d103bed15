//! Per-frame analysis: gate, stride, preprocess, classify, interpret

use crate::config::AnalyzerConfig;
use crate::detection::{self, Detection};
use crate::error::AnalyzerError;
use crate::frame::CameraFrame;
use crate::models::NudeNetClassifier;
use crate::preprocess;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared on/off switch deciding whether frames are analysed at all.
#[derive(Debug, Clone, Default)]
pub struct RecordingGate {
    recording: Arc<AtomicBool>,
}

impl RecordingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn start(&self) {
        self.set(true);
    }

    pub fn stop(&self) {
        self.set(false);
    }

    /// Flip the state and return the new one
    pub fn toggle(&self) -> bool {
        let recording = !self.recording.fetch_xor(true, Ordering::AcqRel);
        log_state(recording);
        recording
    }

    fn set(&self, recording: bool) {
        if self.recording.swap(recording, Ordering::AcqRel) != recording {
            log_state(recording);
        }
    }
}

fn log_state(recording: bool) {
    if recording {
        info!("Recording started");
    } else {
        info!("Recording stopped");
    }
}

/// Outcome of analysing one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameVerdict {
    /// Sequence number assigned by the analyzer
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    /// Set when an explicit label reaches the confidence threshold
    pub flagged: bool,
    pub max_confidence: f32,
    pub elapsed_ms: f64,
}

impl FrameVerdict {
    /// Detections that caused the frame to be flagged
    pub fn regions_of_interest(&self, confidence_threshold: f32) -> impl Iterator<Item = &Detection> {
        self.detections
            .iter()
            .filter(move |d| d.label.is_explicit() && d.confidence >= confidence_threshold)
    }
}

/// Receives every verdict the analyzer produces
pub trait VerdictSink: Send {
    fn deliver(&self, verdict: &FrameVerdict);
}

impl<F> VerdictSink for F
where
    F: Fn(&FrameVerdict) + Send,
{
    fn deliver(&self, verdict: &FrameVerdict) {
        self(verdict)
    }
}

/// Logs flagged frames with their regions of interest
pub struct LoggingSink {
    confidence_threshold: f32,
}

impl LoggingSink {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }
}

impl VerdictSink for LoggingSink {
    fn deliver(&self, verdict: &FrameVerdict) {
        if verdict.flagged {
            for roi in verdict.regions_of_interest(self.confidence_threshold) {
                warn!(
                    frame = verdict.frame_index,
                    label = %roi.label,
                    confidence = roi.confidence,
                    "Explicit content detected at ({:.0}, {:.0}) {:.0}x{:.0}",
                    roi.bbox.x,
                    roi.bbox.y,
                    roi.bbox.width,
                    roi.bbox.height
                );
            }
        } else {
            debug!(
                frame = verdict.frame_index,
                detections = verdict.detections.len(),
                "Frame clean"
            );
        }
    }
}

/// Converts camera frames into classifier input and interprets the result.
pub struct FrameAnalyzer {
    config: Arc<AnalyzerConfig>,
    classifier: NudeNetClassifier,
    gate: RecordingGate,
    sink: Box<dyn VerdictSink>,
    frame_counter: u64,
}

impl FrameAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        classifier: NudeNetClassifier,
        gate: RecordingGate,
    ) -> Result<Self, AnalyzerError> {
        config.validate().map_err(AnalyzerError::Config)?;
        let sink = Box::new(LoggingSink::new(config.confidence_threshold));
        Ok(Self {
            config: Arc::new(config),
            classifier,
            gate,
            sink,
            frame_counter: 0,
        })
    }

    /// Build an analyzer around the ONNX model named in `config`
    pub fn from_config(config: AnalyzerConfig, gate: RecordingGate) -> Result<Self, AnalyzerError> {
        config.validate().map_err(AnalyzerError::Config)?;
        let classifier = NudeNetClassifier::load(&config)?;
        Self::new(config, classifier, gate)
    }

    /// Replace the default logging sink
    pub fn with_sink(mut self, sink: impl VerdictSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn gate(&self) -> &RecordingGate {
        &self.gate
    }

    /// Analyse a live frame.
    ///
    /// Returns `Ok(None)` while not recording, and for frames skipped by the
    /// frame stride. The stride counter only advances while recording.
    pub fn analyze(&mut self, frame: &CameraFrame) -> Result<Option<FrameVerdict>, AnalyzerError> {
        if !self.gate.is_recording() {
            return Ok(None);
        }

        let index = self.frame_counter;
        self.frame_counter += 1;
        if index % self.config.frame_stride as u64 != 0 {
            return Ok(None);
        }

        self.run(frame, index).map(Some)
    }

    /// Analyse a frame regardless of recording state and stride
    pub fn inspect(&mut self, frame: &CameraFrame) -> Result<FrameVerdict, AnalyzerError> {
        let index = self.frame_counter;
        self.frame_counter += 1;
        self.run(frame, index)
    }

    fn run(&mut self, frame: &CameraFrame, index: u64) -> Result<FrameVerdict, AnalyzerError> {
        let started = Instant::now();
        let (width, height) = frame.dimensions();

        let rgb = frame.to_rgb(self.config.color_range)?;
        let input = preprocess::to_input_tensor(
            &rgb,
            self.config.input_size,
            self.config.tensor_layout,
            self.config.resize_filter,
        )?;
        let output = self.classifier.classify_image(&input)?;

        let candidates = detection::decode(
            &output,
            (width, height),
            self.config.input_size,
            self.config.score_threshold,
        );
        let detections = detection::non_max_suppression(candidates, self.config.nms_iou_threshold);
        let flagged = detection::is_explicit(&detections, self.config.confidence_threshold);
        let max_confidence = detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0f32, f32::max);

        let verdict = FrameVerdict {
            frame_index: index,
            width,
            height,
            detections,
            flagged,
            max_confidence,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        debug!(
            "Frame {} analysed in {:.1}ms ({} detections)",
            index,
            verdict.elapsed_ms,
            verdict.detections.len()
        );

        self.sink.deliver(&verdict);
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{MockInferenceBackend, OutputTensor};
    use image::RgbImage;
    use parking_lot::Mutex;

    const ROWS: usize = 22;

    // One anchor with a centred 8x8 box (in 32x32 input space) of `class` scoring `score`
    fn single_anchor(class: usize, score: f32) -> OutputTensor {
        let mut data = vec![0.0f32; ROWS];
        data[0] = 16.0;
        data[1] = 16.0;
        data[2] = 8.0;
        data[3] = 8.0;
        data[4 + class] = score;
        OutputTensor::new(vec![1, ROWS, 1], data).unwrap()
    }

    fn analyzer_with(output: OutputTensor, stride: u32) -> FrameAnalyzer {
        let mut backend = MockInferenceBackend::new();
        backend.expect_run().returning(move |_| Ok(output.clone()));

        let mut config = AnalyzerConfig::default();
        config.input_size = 32;
        config.frame_stride = stride;
        FrameAnalyzer::new(config, NudeNetClassifier::new(Box::new(backend)), RecordingGate::new())
            .unwrap()
    }

    fn frame() -> CameraFrame {
        CameraFrame::Rgb(RgbImage::new(64, 48))
    }

    #[test]
    fn test_gate_toggle() {
        let gate = RecordingGate::new();
        assert!(!gate.is_recording());
        assert!(gate.toggle());
        assert!(gate.is_recording());
        assert!(!gate.toggle());

        let shared = gate.clone();
        gate.start();
        assert!(shared.is_recording());
    }

    #[test]
    fn test_nothing_analysed_while_not_recording() {
        let mut backend = MockInferenceBackend::new();
        backend.expect_run().times(0);
        let mut analyzer = FrameAnalyzer::new(
            AnalyzerConfig::default(),
            NudeNetClassifier::new(Box::new(backend)),
            RecordingGate::new(),
        )
        .unwrap();

        for _ in 0..5 {
            assert!(analyzer.analyze(&frame()).unwrap().is_none());
        }
    }

    #[test]
    fn test_stride_analyses_every_third_frame() {
        let mut analyzer = analyzer_with(single_anchor(12, 0.9), 3);
        analyzer.gate().start();

        let analysed: Vec<u64> = (0..7)
            .filter_map(|_| analyzer.analyze(&frame()).unwrap())
            .map(|v| v.frame_index)
            .collect();
        assert_eq!(analysed, vec![0, 3, 6]);
    }

    #[test]
    fn test_counter_paused_while_not_recording() {
        let mut analyzer = analyzer_with(single_anchor(12, 0.9), 2);
        analyzer.gate().start();
        assert!(analyzer.analyze(&frame()).unwrap().is_some()); // 0
        analyzer.gate().stop();
        assert!(analyzer.analyze(&frame()).unwrap().is_none());
        assert!(analyzer.analyze(&frame()).unwrap().is_none());
        analyzer.gate().start();
        assert!(analyzer.analyze(&frame()).unwrap().is_none()); // 1
        assert_eq!(analyzer.analyze(&frame()).unwrap().unwrap().frame_index, 2);
    }

    #[test]
    fn test_explicit_detection_flags_frame() {
        let mut analyzer = analyzer_with(single_anchor(3, 0.8), 1);
        let verdict = analyzer.inspect(&frame()).unwrap();

        assert!(verdict.flagged);
        assert_eq!(verdict.detections.len(), 1);
        assert_eq!(verdict.max_confidence, 0.8);
        assert_eq!((verdict.width, verdict.height), (64, 48));
        assert_eq!(verdict.regions_of_interest(0.5).count(), 1);
    }

    #[test]
    fn test_covered_detection_does_not_flag() {
        let mut analyzer = analyzer_with(single_anchor(16, 0.95), 1);
        let verdict = analyzer.inspect(&frame()).unwrap();
        assert!(!verdict.flagged);
        assert_eq!(verdict.detections.len(), 1);
    }

    #[test]
    fn test_low_confidence_explicit_does_not_flag() {
        let mut analyzer = analyzer_with(single_anchor(4, 0.3), 1);
        let verdict = analyzer.inspect(&frame()).unwrap();
        assert!(!verdict.flagged);
    }

    #[test]
    fn test_sink_receives_verdicts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut analyzer = analyzer_with(single_anchor(2, 0.7), 1)
            .with_sink(move |v: &FrameVerdict| sink_seen.lock().push(v.flagged));

        analyzer.inspect(&frame()).unwrap();
        analyzer.inspect(&frame()).unwrap();
        assert_eq!(*seen.lock(), vec![true, true]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let backend = MockInferenceBackend::new();
        let mut config = AnalyzerConfig::default();
        config.frame_stride = 0;
        let result = FrameAnalyzer::new(config, NudeNetClassifier::new(Box::new(backend)), RecordingGate::new());
        assert!(matches!(result, Err(AnalyzerError::Config(_))));
    }

    #[test]
    fn test_frame_errors_propagate() {
        let mut analyzer = analyzer_with(single_anchor(2, 0.7), 1);
        let broken = CameraFrame::Nv21 {
            width: 4,
            height: 4,
            data: vec![0; 3],
        };
        assert!(matches!(analyzer.inspect(&broken), Err(AnalyzerError::Frame(_))));
    }
}
