// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//! 职责: 按固定周期取帧 → 推理 → 后处理 → 发送AttendanceReport

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, info, warn};
use serde::Serialize;

use super::backend::{FrameSource, InferenceBackend};
use super::postprocess::DetectionPostProcessor;
use super::types::RankedDetection;
use crate::config::BoardConfig;

/// 检测结果 (检测模块 → 渲染/计数)
#[derive(Clone, Debug, Serialize)]
pub struct AttendanceReport {
    pub frame_index: u64,
    pub count: usize,
    pub detections: Vec<RankedDetection>,
    pub fps: f64,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// 单个周期的结果
#[derive(Debug)]
pub enum Cycle {
    Report(AttendanceReport),
    /// 推理失败, 本周期跳过
    Skipped,
    /// 帧来源已结束
    Finished,
}

/// 运行统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectorSummary {
    pub frames: u64,
    pub skipped: u64,
    pub max_count: usize,
    pub total_count: u64,
}

impl DetectorSummary {
    pub fn mean_count(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_count as f64 / self.frames as f64
        }
    }

    fn record(&mut self, report: &AttendanceReport) {
        self.frames += 1;
        self.total_count += report.count as u64;
        self.max_count = self.max_count.max(report.count);
    }
}

pub struct Detector<S, B> {
    source: S,
    backend: B,
    processor: DetectionPostProcessor,
    interval: Duration,
    stats_every: u64,

    // 统计
    count: u64,
    last: Instant,
    current_fps: f64,
    cycles: u64,
}

impl<S: FrameSource, B: InferenceBackend> Detector<S, B> {
    pub fn new(source: S, backend: B, config: &BoardConfig) -> Self {
        Self {
            source,
            backend,
            processor: DetectionPostProcessor::new(config.postprocess.clone()),
            interval: Duration::from_millis(config.interval_ms.max(1)),
            stats_every: config.stats_every.max(1),
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            cycles: 0,
        }
    }

    /// 周期驱动主循环
    ///
    /// Ticks that arrive while a cycle is still running are coalesced, so
    /// cycles never overlap. Returns when the source ends, `stop` fires or
    /// disconnects, or the report receiver is dropped.
    pub fn run(
        &mut self,
        tx: Sender<AttendanceReport>,
        stop: Receiver<()>,
    ) -> Result<DetectorSummary> {
        info!("🔍 检测模块启动 (后端: {}, 周期: {:?})", self.backend.name(), self.interval);
        self.backend.warm_up()?;

        let ticker = crossbeam_channel::tick(self.interval);
        let mut summary = DetectorSummary::default();

        loop {
            select! {
                recv(stop) -> _ => {
                    info!("🛑 收到停止信号");
                    break;
                }
                recv(ticker) -> _ => {
                    match self.step()? {
                        Cycle::Report(report) => {
                            summary.record(&report);
                            if tx.send(report).is_err() {
                                info!("📭 结果接收端已关闭");
                                break;
                            }
                        }
                        Cycle::Skipped => summary.skipped += 1,
                        Cycle::Finished => {
                            info!("🏁 帧来源结束");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            "✅ 检测模块退出: {}帧 | 跳过{} | 最多{}人 | 平均{:.1}人",
            summary.frames,
            summary.skipped,
            summary.max_count,
            summary.mean_count()
        );
        Ok(summary)
    }

    /// 处理单帧 (同步, 不依赖计时器)
    pub fn step(&mut self) -> Result<Cycle> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(Cycle::Finished);
        };
        let start_total = Instant::now();

        // 1. 推理
        let raw = match self.backend.infer(&frame) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ 推理失败, 跳过第{}帧: {:#}", frame.index, e);
                return Ok(Cycle::Skipped);
            }
        };

        // 2. 后处理
        let detections = self.processor.process(&raw, frame.context);
        debug!(
            "第{}帧: 原始{}个 → 保留{}个",
            frame.index,
            raw.len(),
            detections.len()
        );

        // 3. 更新统计
        self.count += 1;
        self.cycles += 1;
        let now = Instant::now();
        if now.duration_since(self.last).as_secs() >= 1 {
            self.current_fps = self.count as f64 / now.duration_since(self.last).as_secs_f64();
            self.count = 0;
            self.last = now;
        }

        let latency_ms = start_total.elapsed().as_secs_f64() * 1000.0;

        if self.cycles % self.stats_every == 0 {
            info!(
                "🎯 检测: {}人 | {:.1}ms/帧 | {:.1}fps",
                detections.len(),
                latency_ms,
                self.current_fps
            );
        }

        Ok(Cycle::Report(AttendanceReport {
            frame_index: frame.index,
            count: detections.len(),
            detections,
            fps: self.current_fps,
            latency_ms,
            timestamp: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection, Frame, FrameRecord, Replay};
    use anyhow::anyhow;

    fn record(dets: Vec<Detection>) -> FrameRecord {
        FrameRecord {
            width: 640,
            height: 480,
            detections: dets,
        }
    }

    fn person(score: f32, x: f32) -> Detection {
        Detection::new("person", score, BBox::new(x, 10.0, 50.0, 100.0))
    }

    fn fast_config() -> BoardConfig {
        BoardConfig {
            interval_ms: 1,
            ..BoardConfig::default()
        }
    }

    #[test]
    fn test_step_counts_people() {
        let replay = Replay::new(vec![
            record(vec![person(0.9, 10.0), person(0.8, 300.0)]),
            record(vec![]),
        ]);
        let (source, backend) = replay.split();
        let mut detector = Detector::new(source, backend, &BoardConfig::default());

        match detector.step().unwrap() {
            Cycle::Report(r) => {
                assert_eq!(r.count, 2);
                assert_eq!(r.detections[0].rank, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        match detector.step().unwrap() {
            Cycle::Report(r) => assert_eq!(r.count, 0),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(detector.step().unwrap(), Cycle::Finished));
    }

    struct FlakyBackend;

    impl InferenceBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
            if frame.index % 2 == 0 {
                Err(anyhow!("model unavailable"))
            } else {
                Ok(vec![Detection::new(
                    "person",
                    0.9,
                    BBox::new(10.0, 10.0, 50.0, 100.0),
                )])
            }
        }
    }

    #[test]
    fn test_run_skips_failed_inference() {
        let replay = Replay::new((0..4).map(|_| record(vec![])).collect());
        let (source, _) = replay.split();
        let mut detector = Detector::new(source, FlakyBackend, &fast_config());

        let (tx, rx) = crossbeam_channel::unbounded();
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let summary = detector.run(tx, stop_rx).unwrap();

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.max_count, 1);
        let reports: Vec<_> = rx.try_iter().collect();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.frame_index % 2 == 1));
    }

    #[test]
    fn test_run_stops_on_signal() {
        let replay = Replay::new((0..1000).map(|_| record(vec![])).collect());
        let (source, backend) = replay.split();
        let config = BoardConfig {
            interval_ms: 50,
            ..BoardConfig::default()
        };
        let mut detector = Detector::new(source, backend, &config);

        let (tx, _rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        stop_tx.send(()).unwrap();
        let summary = detector.run(tx, stop_rx).unwrap();
        assert!(summary.frames < 1000);
    }

    #[test]
    fn test_run_stops_when_receiver_dropped() {
        let replay = Replay::new((0..10).map(|_| record(vec![])).collect());
        let (source, backend) = replay.split();
        let mut detector = Detector::new(source, backend, &fast_config());

        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let summary = detector.run(tx, stop_rx).unwrap();
        assert_eq!(summary.frames, 1);
    }

    #[test]
    fn test_frame_context_passed_through() {
        // 640x480 下 300px 超出宽度上限 (256), 1280x720 下 (512) 可通过
        let replay = Replay::new(vec![FrameRecord {
            width: 1280,
            height: 720,
            detections: vec![Detection::new("person", 0.9, BBox::new(0.0, 0.0, 300.0, 300.0))],
        }]);
        let (source, backend) = replay.split();
        let mut detector = Detector::new(source, backend, &BoardConfig::default());
        match detector.step().unwrap() {
            Cycle::Report(r) => assert_eq!(r.count, 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
