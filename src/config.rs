// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 看板配置 - 通过JSON文件调整参数

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::detection::PERSON_LABEL;

/// 后处理阈值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    // === 类别与置信度 ===
    pub label: String,
    pub min_score: f32,

    // === 相对帧尺寸 ===
    pub max_width_ratio: f32,  // width < ratio * frame_width
    pub max_height_ratio: f32, // height < ratio * frame_height
    pub max_area_ratio: f32,   // area < ratio * frame_area

    // === 绝对像素下限 ===
    pub min_width_px: f32,
    pub min_height_px: f32,

    // === 长宽比 (开区间) ===
    pub min_aspect: f32,
    pub max_aspect: f32,

    // === NMS ===
    pub iou_threshold: f32,
    pub wide_box_width_px: f32, // NMS 内二次过滤: width > w && aspect > a
    pub wide_box_aspect: f32,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            label: PERSON_LABEL.to_string(),
            min_score: 0.65,

            max_width_ratio: 0.40,
            max_height_ratio: 0.80,
            max_area_ratio: 0.15,

            min_width_px: 30.0,
            min_height_px: 50.0,

            min_aspect: 0.3,
            max_aspect: 2.5,

            iou_threshold: 0.3,
            wide_box_width_px: 200.0,
            wide_box_aspect: 1.8,
        }
    }
}

/// 看板整体配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub postprocess: PostprocessConfig,
    pub interval_ms: u64,      // 检测周期 (~6Hz)
    pub stats_every: u64,      // 每N帧打印一次性能日志
    pub utc_offset_hours: i32, // 显示时钟时区
    pub font_path: Option<PathBuf>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            postprocess: PostprocessConfig::default(),
            interval_ms: 166,
            stats_every: 60,
            utc_offset_hours: 7,
            font_path: None,
        }
    }
}

impl BoardConfig {
    /// `<config_dir>/jamaah-counter/board.json`, or `./board.json` when the
    /// platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("jamaah-counter"))
            .unwrap_or_default()
            .join("board.json")
    }

    /// 从JSON文件加载配置, 失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// Strict variant of [`BoardConfig::load`].
    pub fn try_load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        let p = &self.postprocess;
        info!("🎛️  当前看板配置:");
        info!("  类别: {} | 置信度 ≥ {:.2}", p.label, p.min_score);
        info!(
            "  尺寸: w < {:.2}·W, h < {:.2}·H, area < {:.2}·W·H, w > {}px, h > {}px",
            p.max_width_ratio, p.max_height_ratio, p.max_area_ratio, p.min_width_px, p.min_height_px
        );
        info!("  长宽比: ({:.2}, {:.2})", p.min_aspect, p.max_aspect);
        info!(
            "  NMS IOU: {:.2} | 宽框过滤: w > {}px && aspect > {:.2}",
            p.iou_threshold, p.wide_box_width_px, p.wide_box_aspect
        );
        info!("  检测周期: {}ms", self.interval_ms);
    }
}
