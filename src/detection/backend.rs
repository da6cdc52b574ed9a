// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧来源与推理后端接口
//!
//! 推理服务对本 crate 不透明: 只要求每帧返回一组候选检测.
//! `Replay` 从 JSON Lines 录像文件中回放每帧的推理输出.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use super::types::{Detection, FrameContext};

/// 视频帧 (帧来源 → 推理后端)
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    pub context: FrameContext,
}

/// Produces frames for the detector loop. `Ok(None)` ends the stream.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opaque object-detection service.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Raw candidate detections for one frame, in source-frame pixels.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 录像文件中的一行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub width: u32,
    pub height: u32,
    #[serde(default, deserialize_with = "skip_malformed")]
    pub detections: Vec<Detection>,
}

/// 逐条解析, 无效的检测丢弃而不是让整帧失败
fn skip_malformed<'de, D>(deserializer: D) -> std::result::Result<Vec<Detection>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Detection>(value) {
            Ok(det) => Some(det),
            Err(e) => {
                warn!("⚠️ 跳过无效检测: {}", e);
                None
            }
        })
        .collect())
}

impl FrameRecord {
    pub fn context(&self) -> FrameContext {
        FrameContext::new(self.width, self.height)
    }
}

/// Recorded inference output, one [`FrameRecord`] per frame.
#[derive(Clone, Debug, Default)]
pub struct Replay {
    records: Vec<FrameRecord>,
}

impl Replay {
    pub fn new(records: Vec<FrameRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON Lines recording. Blank lines are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: bad frame record", path.display(), lineno + 1))?;
            records.push(record);
        }
        info!("📼 录像已加载: {} ({} 帧)", path.display(), records.len());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Split into a frame source and the matching backend.
    pub fn split(self) -> (ReplaySource, ReplayBackend) {
        let contexts = self.records.iter().map(FrameRecord::context).collect();
        let detections = self.records.into_iter().map(|r| r.detections).collect();
        (
            ReplaySource {
                contexts,
                cursor: 0,
            },
            ReplayBackend { detections },
        )
    }
}

pub struct ReplaySource {
    contexts: Vec<FrameContext>,
    cursor: usize,
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(&context) = self.contexts.get(self.cursor) else {
            return Ok(None);
        };
        let frame = Frame {
            index: self.cursor as u64,
            context,
        };
        self.cursor += 1;
        Ok(Some(frame))
    }
}

pub struct ReplayBackend {
    detections: Vec<Vec<Detection>>,
}

impl InferenceBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.detections
            .get(frame.index as usize)
            .cloned()
            .ok_or_else(|| anyhow!("no recorded detections for frame {}", frame.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_and_split() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"width":640,"height":480,"detections":[{{"label":"person","score":0.9,"box":{{"x":10,"y":10,"width":50,"height":100}}}}]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"width":1280,"height":720}}"#).unwrap();

        let replay = Replay::load(file.path()).unwrap();
        assert_eq!(replay.len(), 2);

        let (mut source, mut backend) = replay.split();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.context, FrameContext::new(640, 480));
        assert_eq!(backend.infer(&first).unwrap().len(), 1);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert!(backend.infer(&second).unwrap().is_empty());

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_bad_line_reports_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"width":640,"height":480}}"#).unwrap();
        writeln!(file, "oops").unwrap();
        let err = Replay::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(":2:"));
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"width":640,"height":480,"detections":[{{"label":"person","score":null,"box":{{"x":0,"y":0,"width":50,"height":100}}}},{{"label":"person","score":0.8}},{{"label":"person","score":0.9,"box":{{"x":10,"y":10,"width":50,"height":100}}}}]}}"#
        )
        .unwrap();

        let replay = Replay::load(file.path()).unwrap();
        let (mut source, mut backend) = replay.split();
        let frame = source.next_frame().unwrap().unwrap();
        let dets = backend.infer(&frame).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].score, 0.9);
    }

    #[test]
    fn test_backend_missing_frame() {
        let (_, mut backend) = Replay::default().split();
        let frame = Frame {
            index: 3,
            context: FrameContext::new(640, 480),
        };
        assert!(backend.infer(&frame).is_err());
    }
}
