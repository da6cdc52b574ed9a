// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 看板配置参数
pub mod detection; // 检测后处理与周期循环
pub mod renderer; // 叠加层绘制
pub mod schedule; // 礼拜时间表

pub use crate::config::{BoardConfig, PostprocessConfig};
pub use crate::detection::{
    AttendanceReport, BBox, Detection, DetectionPostProcessor, Detector, FrameContext,
    RankedDetection,
};
pub use crate::renderer::{OverlayRenderer, OverlayStyle};
pub use crate::schedule::{gen_time_string, PrayerSchedule};

/// One-shot post-processing with the default thresholds.
pub fn count_jamaah(detections: &[Detection], frame: FrameContext) -> Vec<RankedDetection> {
    DetectionPostProcessor::default().process(detections, frame)
}
