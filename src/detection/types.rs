// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测数据结构定义
/// Data structures for the jamaah detection overlay
use serde::{Deserialize, Serialize};

use super::classes;

// ========== 公共常量 ==========

/// 唯一关心的类别
pub const PERSON_LABEL: &str = "person";

// ========== 数据结构 ==========

/// 检测框 (x, y, width, height), 源帧像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates (x1, y1, x2, y2).
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn xmax(&self) -> f32 {
        self.x + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// width / height, 0 for a degenerate box
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }

    /// Finite coordinates and non-negative dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.x.max(another.x);
        let t = self.y.max(another.y);
        let r = self.xmax().min(another.xmax());
        let b = self.ymax().min(another.ymax());
        let w = r - l;
        let h = b - t;
        if w < 0.0 || h < 0.0 {
            return 0.0;
        }
        w * h
    }

    pub fn union(&self, another: &BBox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    /// Intersection over union, 0 when the union is empty.
    pub fn iou(&self, another: &BBox) -> f32 {
        let union = self.union(another);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(another) / union
    }
}

/// 推理服务输出的单个候选 (只读)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: BBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }

    /// Build from a raw COCO class id as emitted by YOLO-style heads.
    pub fn from_class_id(class_id: u32, score: f32, bbox: BBox) -> Self {
        Self::new(classes::class_name(class_id), score, bbox)
    }

    pub fn is_person(&self) -> bool {
        self.label == PERSON_LABEL
    }

    /// Score in [0, 1] and a well-formed box.
    pub fn is_well_formed(&self) -> bool {
        (0.0..=1.0).contains(&self.score) && self.bbox.is_well_formed()
    }
}

/// 源帧尺寸 (像素)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameContext {
    pub width: u32,
    pub height: u32,
}

impl FrameContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }
}

/// 已接受的检测 + 本帧显示序号 (1-based, 不跨帧)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDetection {
    pub rank: usize,
    pub detection: Detection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.intersection_area(&b), 0.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // 重叠 50x100, 并集 150x100
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(50.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&b) - 5000.0 / 15000.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_empty_union() {
        let a = BBox::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn test_malformed() {
        assert!(!BBox::new(0.0, 0.0, -1.0, 10.0).is_well_formed());
        assert!(!BBox::new(f32::NAN, 0.0, 1.0, 10.0).is_well_formed());
        let det = Detection::new(PERSON_LABEL, 1.5, BBox::new(0.0, 0.0, 40.0, 80.0));
        assert!(!det.is_well_formed());
    }

    #[test]
    fn test_from_class_id() {
        let det = Detection::from_class_id(0, 0.9, BBox::from_xyxy(10.0, 10.0, 60.0, 110.0));
        assert!(det.is_person());
        assert_eq!(det.bbox, BBox::new(10.0, 10.0, 50.0, 100.0));
    }

    #[test]
    fn test_detection_json_uses_box_key() {
        let json = r#"{"label":"person","score":0.9,"box":{"x":1,"y":2,"width":3,"height":4}}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
