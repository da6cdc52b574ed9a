// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// 推理输出 → 过滤/NMS → 本帧人数
/// - Detector:      周期驱动的检测循环
/// - PostProcessor: 候选过滤 + 去重 + 排序
/// - Backend:       帧来源 / 推理后端接口
pub mod backend;
pub mod classes;
pub mod detector;
pub mod postprocess;
pub mod types;

pub use backend::{
    Frame, FrameRecord, FrameSource, InferenceBackend, Replay, ReplayBackend, ReplaySource,
};
pub use detector::{AttendanceReport, Cycle, Detector, DetectorSummary};
pub use postprocess::DetectionPostProcessor;
pub use types::{BBox, Detection, FrameContext, RankedDetection, PERSON_LABEL};
