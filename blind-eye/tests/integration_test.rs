//! Integration tests for blind-eye

mod common;

use blind_eye::{
    AnalyzerConfig, AnalyzerError, BoundingBox, CameraFrame, ColorRange, FrameVerdict, Label,
    Plane, RecordingGate, TensorLayout, Yuv420Frame,
};
use common::{analyzer, empty_output, one_detection, test_config, FixedBackend};
use image::{Rgb, RgbImage};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

fn grey_yuv420(width: u32, height: u32, luma: u8) -> Yuv420Frame {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
    Yuv420Frame::new(
        width,
        height,
        Plane::packed(vec![luma; w * h], w),
        Plane::packed(vec![128; cw * ch], cw),
        Plane::packed(vec![128; cw * ch], cw),
    )
}

#[test]
fn test_yuv_frame_flagged_end_to_end() {
    let backend = FixedBackend {
        output: one_detection(16.0, 16.0, 8.0, 8.0, 4, 0.87),
        seen_shapes: None,
    };
    let gate = RecordingGate::new();
    let mut analyzer = analyzer(test_config(32, 1), backend, gate.clone());

    let frame = CameraFrame::Yuv420(grey_yuv420(64, 48, 100));
    assert!(analyzer.analyze(&frame).unwrap().is_none());

    gate.toggle();
    let verdict = analyzer.analyze(&frame).unwrap().expect("frame should be analysed");

    assert!(verdict.flagged);
    assert_eq!(verdict.frame_index, 0);
    assert_eq!(verdict.detections.len(), 1);
    let detection = &verdict.detections[0];
    assert_eq!(detection.label, Label::FemaleGenitaliaExposed);
    assert_eq!(
        detection.bbox,
        BoundingBox {
            x: 24.0,
            y: 18.0,
            width: 16.0,
            height: 12.0,
        }
    );
}

#[test]
fn test_clean_frame_not_flagged() {
    let backend = FixedBackend {
        output: empty_output(),
        seen_shapes: None,
    };
    let mut analyzer = analyzer(test_config(16, 1), backend, RecordingGate::new());

    let verdict = analyzer
        .inspect(&CameraFrame::Rgb(RgbImage::new(20, 20)))
        .unwrap();
    assert!(!verdict.flagged);
    assert!(verdict.detections.is_empty());
    assert_eq!(verdict.max_confidence, 0.0);
}

#[test]
fn test_classifier_receives_expected_input_shape() {
    let (tx, rx) = mpsc::channel();
    let backend = FixedBackend {
        output: empty_output(),
        seen_shapes: Some(tx),
    };
    let mut analyzer = analyzer(test_config(24, 1), backend, RecordingGate::new());
    analyzer
        .inspect(&CameraFrame::Rgb(RgbImage::new(100, 30)))
        .unwrap();
    assert_eq!(rx.recv().unwrap(), [1, 3, 24, 24]);

    let (tx, rx) = mpsc::channel();
    let backend = FixedBackend {
        output: empty_output(),
        seen_shapes: Some(tx),
    };
    let mut config = test_config(24, 1);
    config.tensor_layout = TensorLayout::Nhwc;
    let mut analyzer = common::analyzer(config, backend, RecordingGate::new());
    analyzer
        .inspect(&CameraFrame::Rgb(RgbImage::new(100, 30)))
        .unwrap();
    assert_eq!(rx.recv().unwrap(), [1, 24, 24, 3]);
}

#[test]
fn test_image_file_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::from_pixel(10, 6, Rgb([200, 10, 10])).save(&path).unwrap();

    let frame = CameraFrame::from_image_file(&path).unwrap();
    assert_eq!(frame.dimensions(), (10, 6));
    let rgb = frame.to_rgb(ColorRange::Full).unwrap();
    assert_eq!(rgb.get_pixel(9, 5).0, [200, 10, 10]);

    assert!(matches!(
        CameraFrame::from_image_file(dir.path().join("missing.png")),
        Err(AnalyzerError::Image(_)) | Err(AnalyzerError::Io(_))
    ));
}

#[test]
fn test_verdicts_reach_custom_sink() {
    let flagged = Arc::new(Mutex::new(Vec::new()));
    let sink_flagged = flagged.clone();
    let backend = FixedBackend {
        output: one_detection(8.0, 8.0, 4.0, 4.0, 6, 0.99),
        seen_shapes: None,
    };
    let mut analyzer = analyzer(test_config(16, 1), backend, RecordingGate::new())
        .with_sink(move |v: &FrameVerdict| {
            let rois: Vec<Label> = v.regions_of_interest(0.5).map(|d| d.label).collect();
            sink_flagged.lock().unwrap().push(rois);
        });

    analyzer
        .inspect(&CameraFrame::Rgb(RgbImage::new(16, 16)))
        .unwrap();
    assert_eq!(*flagged.lock().unwrap(), vec![vec![Label::AnusExposed]]);
}

#[test]
fn test_verdict_serializes_to_json() {
    let backend = FixedBackend {
        output: one_detection(8.0, 8.0, 4.0, 4.0, 2, 0.75),
        seen_shapes: None,
    };
    let mut analyzer = analyzer(test_config(16, 1), backend, RecordingGate::new());
    let verdict = analyzer
        .inspect(&CameraFrame::Rgb(RgbImage::new(16, 16)))
        .unwrap();

    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["flagged"], true);
    assert_eq!(json["detections"][0]["label"], "BUTTOCKS_EXPOSED");

    let back: FrameVerdict = serde_json::from_value(json).unwrap();
    assert_eq!(back, verdict);
}

#[test]
fn test_config_serialization() {
    let config = AnalyzerConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let deserialized: AnalyzerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, deserialized);
}

#[test]
fn test_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
    let err: AnalyzerError = io_err.into();
    match err {
        AnalyzerError::Io(_) => {}
        _ => panic!("Expected Io error"),
    }
}
