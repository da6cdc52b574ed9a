// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测后处理 (Detection post-processing)
//!
//! 原始候选 → 类别/合理性过滤 → 按置信度排序 → NMS → 带序号输出
//!
//! 纯函数: 不持有跨帧状态, 不修改输入, 从不返回错误.

use super::types::{Detection, FrameContext, RankedDetection};
use crate::config::PostprocessConfig;

#[derive(Debug, Clone, Default)]
pub struct DetectionPostProcessor {
    config: PostprocessConfig,
}

impl DetectionPostProcessor {
    pub fn new(config: PostprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    /// 完整流程: filter → sort → NMS → rank
    pub fn process(&self, detections: &[Detection], frame: FrameContext) -> Vec<RankedDetection> {
        let mut candidates: Vec<&Detection> = detections
            .iter()
            .filter(|det| self.is_plausible(det, frame))
            .collect();

        // sort_by is stable: equal scores keep input order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        self.non_max_suppression(candidates)
            .into_iter()
            .enumerate()
            .map(|(i, det)| RankedDetection {
                rank: i + 1,
                detection: det.clone(),
            })
            .collect()
    }

    /// Stage 1: 类别 + 置信度 + 尺寸/长宽比/面积
    pub fn is_plausible(&self, det: &Detection, frame: FrameContext) -> bool {
        let c = &self.config;
        if !det.is_well_formed() || det.label != c.label || det.score < c.min_score {
            return false;
        }

        let (w, h) = (det.bbox.width, det.bbox.height);
        let (fw, fh) = (frame.width as f32, frame.height as f32);

        if w >= c.max_width_ratio * fw || h >= c.max_height_ratio * fh {
            return false;
        }
        if w <= c.min_width_px || h <= c.min_height_px {
            return false;
        }

        let aspect = det.bbox.aspect_ratio();
        if aspect <= c.min_aspect || aspect >= c.max_aspect {
            return false;
        }

        det.bbox.area() < c.max_area_ratio * frame.area()
    }

    /// NMS 内部的二次过滤: 又宽又扁的框
    pub fn is_wide_box(&self, det: &Detection) -> bool {
        det.bbox.width > self.config.wide_box_width_px
            && det.bbox.aspect_ratio() > self.config.wide_box_aspect
    }

    /// Stage 3: greedy NMS over candidates already sorted by score.
    ///
    /// A candidate rejected by the wide-box check is dropped without
    /// suppressing its neighbours.
    fn non_max_suppression<'a>(&self, mut pool: Vec<&'a Detection>) -> Vec<&'a Detection> {
        let mut kept = Vec::with_capacity(pool.len());
        let mut head = 0;
        while head < pool.len() {
            let best = pool[head];
            head += 1;
            if self.is_wide_box(best) {
                continue;
            }
            kept.push(best);
            let rest = pool.split_off(head);
            pool.extend(
                rest.into_iter()
                    .filter(|det| best.bbox.iou(&det.bbox) <= self.config.iou_threshold),
            );
        }
        kept
    }
}
