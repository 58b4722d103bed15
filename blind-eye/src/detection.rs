//! Decoding detector output into labelled boxes

use crate::models::classifier::BOX_ROWS;
use crate::models::OutputTensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// NudeNet v3 classes, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    FemaleGenitaliaCovered,
    FaceFemale,
    ButtocksExposed,
    FemaleBreastExposed,
    FemaleGenitaliaExposed,
    MaleBreastExposed,
    AnusExposed,
    FeetExposed,
    BellyCovered,
    FeetCovered,
    ArmpitsCovered,
    ArmpitsExposed,
    FaceMale,
    BellyExposed,
    MaleGenitaliaExposed,
    AnusCovered,
    FemaleBreastCovered,
    ButtocksCovered,
}

impl Label {
    pub const ALL: [Label; 18] = [
        Label::FemaleGenitaliaCovered,
        Label::FaceFemale,
        Label::ButtocksExposed,
        Label::FemaleBreastExposed,
        Label::FemaleGenitaliaExposed,
        Label::MaleBreastExposed,
        Label::AnusExposed,
        Label::FeetExposed,
        Label::BellyCovered,
        Label::FeetCovered,
        Label::ArmpitsCovered,
        Label::ArmpitsExposed,
        Label::FaceMale,
        Label::BellyExposed,
        Label::MaleGenitaliaExposed,
        Label::AnusCovered,
        Label::FemaleBreastCovered,
        Label::ButtocksCovered,
    ];

    pub fn from_index(index: usize) -> Option<Label> {
        Self::ALL.get(index).copied()
    }

    /// Labels that trigger an intervention
    pub fn is_explicit(self) -> bool {
        matches!(
            self,
            Label::ButtocksExposed
                | Label::FemaleBreastExposed
                | Label::FemaleGenitaliaExposed
                | Label::AnusExposed
                | Label::MaleGenitaliaExposed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::FemaleGenitaliaCovered => "FEMALE_GENITALIA_COVERED",
            Label::FaceFemale => "FACE_FEMALE",
            Label::ButtocksExposed => "BUTTOCKS_EXPOSED",
            Label::FemaleBreastExposed => "FEMALE_BREAST_EXPOSED",
            Label::FemaleGenitaliaExposed => "FEMALE_GENITALIA_EXPOSED",
            Label::MaleBreastExposed => "MALE_BREAST_EXPOSED",
            Label::AnusExposed => "ANUS_EXPOSED",
            Label::FeetExposed => "FEET_EXPOSED",
            Label::BellyCovered => "BELLY_COVERED",
            Label::FeetCovered => "FEET_COVERED",
            Label::ArmpitsCovered => "ARMPITS_COVERED",
            Label::ArmpitsExposed => "ARMPITS_EXPOSED",
            Label::FaceMale => "FACE_MALE",
            Label::BellyExposed => "BELLY_EXPOSED",
            Label::MaleGenitaliaExposed => "MALE_GENITALIA_EXPOSED",
            Label::AnusCovered => "ANUS_COVERED",
            Label::FemaleBreastCovered => "FEMALE_BREAST_COVERED",
            Label::ButtocksCovered => "BUTTOCKS_COVERED",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in original frame pixels (top-left corner + size)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection over union, 0.0 for degenerate or non-finite boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let values = [
            self.x, self.y, self.width, self.height, other.x, other.y, other.width, other.height,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return 0.0;
        }
        if self.width <= 0.0 || self.height <= 0.0 || other.width <= 0.0 || other.height <= 0.0 {
            return 0.0;
        }

        let inter_x_min = self.x.max(other.x);
        let inter_y_min = self.y.max(other.y);
        let inter_x_max = (self.x + self.width).min(other.x + other.width);
        let inter_y_max = (self.y + self.height).min(other.y + other.height);

        if inter_x_max <= inter_x_min || inter_y_max <= inter_y_min {
            return 0.0;
        }

        let inter_area = (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min);
        let union_area = self.area() + other.area() - inter_area;
        if union_area <= 0.0 {
            return 0.0;
        }

        (inter_area / union_area).clamp(0.0, 1.0)
    }
}

/// One labelled region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: Label,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Turn a `[1, 4 + labels, anchors]` output into detections in frame pixels.
///
/// Each anchor column holds `cx, cy, w, h` in model-input pixels followed by
/// one score per label. The best-scoring label of an anchor is kept when its
/// score reaches `score_threshold`. Boxes are scaled per axis, since frames
/// are stretched (not letterboxed) into the square input.
pub fn decode(
    output: &OutputTensor,
    frame_size: (u32, u32),
    input_size: u32,
    score_threshold: f32,
) -> Vec<Detection> {
    let (rows, anchors) = match output.shape() {
        [1, rows, anchors] => (*rows, *anchors),
        _ => return Vec::new(),
    };
    if rows <= BOX_ROWS || input_size == 0 {
        return Vec::new();
    }
    let data = output.data();
    if data.len() < rows * anchors {
        return Vec::new();
    }
    let num_classes = (rows - BOX_ROWS).min(Label::ALL.len());

    let (frame_w, frame_h) = (frame_size.0 as f32, frame_size.1 as f32);
    let scale_x = frame_w / input_size as f32;
    let scale_y = frame_h / input_size as f32;
    let at = |row: usize, anchor: usize| data[row * anchors + anchor];

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class in 0..num_classes {
            let score = at(BOX_ROWS + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < score_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        if !cx.is_finite() || !cy.is_finite() || !w.is_finite() || !h.is_finite() {
            continue;
        }

        let x_min = ((cx - w / 2.0) * scale_x).clamp(0.0, frame_w);
        let y_min = ((cy - h / 2.0) * scale_y).clamp(0.0, frame_h);
        let x_max = ((cx + w / 2.0) * scale_x).clamp(0.0, frame_w);
        let y_max = ((cy + h / 2.0) * scale_y).clamp(0.0, frame_h);
        if x_max <= x_min || y_max <= y_min {
            continue;
        }

        if let Some(label) = Label::from_index(best_class) {
            detections.push(Detection {
                label,
                confidence: best_score.min(1.0),
                bbox: BoundingBox {
                    x: x_min,
                    y: y_min,
                    width: x_max - x_min,
                    height: y_max - y_min,
                },
            });
        }
    }

    detections
}

/// Greedy per-label non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep
            .iter()
            .any(|kept| kept.label == candidate.label && kept.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Whether any detection is explicit with at least `confidence_threshold`
pub fn is_explicit(detections: &[Detection], confidence_threshold: f32) -> bool {
    detections
        .iter()
        .any(|d| d.label.is_explicit() && d.confidence >= confidence_threshold)
}
