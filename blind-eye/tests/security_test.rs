//! Security-focused tests for blind-eye

use blind_eye::{AnalyzerConfig, BoundingBox, CameraFrame, ColorRange, ModelManager, Plane, Yuv420Frame};
use std::sync::Arc;

#[test]
fn test_config_rejects_non_finite_thresholds() {
    let mut config = AnalyzerConfig::default();
    config.score_threshold = f32::INFINITY;
    assert!(config.validate().is_err());

    config.score_threshold = 0.25;
    config.nms_iou_threshold = f32::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn test_plane_stride_overflow_rejected() {
    let frame = Yuv420Frame::new(
        4,
        4,
        Plane::new(vec![0; 16], usize::MAX, 1),
        Plane::packed(vec![0; 4], 2),
        Plane::packed(vec![0; 4], 2),
    );
    assert!(frame.to_nv21().is_err());

    let frame = Yuv420Frame::new(
        4,
        4,
        Plane::new(vec![0; 16], 4, usize::MAX),
        Plane::packed(vec![0; 4], 2),
        Plane::packed(vec![0; 4], 2),
    );
    assert!(frame.to_nv21().is_err());
}

#[test]
fn test_truncated_nv21_rejected() {
    let frame = CameraFrame::Nv21 {
        width: 640,
        height: 480,
        data: vec![0; 640 * 480],
    };
    assert!(frame.to_rgb(ColorRange::Full).is_err());
}

#[test]
fn test_iou_nan_protection() {
    let a = BoundingBox {
        x: f32::NAN,
        y: 10.0,
        width: 50.0,
        height: 50.0,
    };
    let b = BoundingBox {
        x: 10.0,
        y: 10.0,
        width: 50.0,
        height: 50.0,
    };
    let iou = a.iou(&b);
    assert_eq!(iou, 0.0);
    assert!(iou.is_finite());
}

#[tokio::test]
async fn test_model_name_path_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AnalyzerConfig::default();
    config.model_path = dir.path().join("640m.onnx");
    let manager = ModelManager::new(Arc::new(config));

    for name in ["../../etc/passwd", "..", "a/b.onnx", "a\\b.onnx"] {
        assert!(manager
            .ensure_model(name, "https://example.invalid/m.onnx", "")
            .await
            .is_err());
    }
    assert!(!dir.path().join("passwd").exists());
}

#[tokio::test]
async fn test_plain_http_download_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AnalyzerConfig::default();
    config.model_path = dir.path().join("640m.onnx");
    config.model_url = "http://example.invalid/640m.onnx".to_string();
    let manager = ModelManager::new(Arc::new(config));

    assert!(manager.ensure_default_model().await.is_err());
}
