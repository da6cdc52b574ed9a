// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 清真寺显示屏 - 礼拜人数统计 (Jamaah counter)
///
/// 系统架构:
/// 1. 检测线程: 按周期回放推理输出 → 后处理 → 人数
/// 2. 主线程:   接收结果并输出
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use jamaah_counter::detection::{Detector, FrameContext, FrameRecord, Replay};
use jamaah_counter::schedule::{format_countdown, local_now};
use jamaah_counter::{
    gen_time_string, BoardConfig, DetectionPostProcessor, OverlayRenderer, OverlayStyle,
    PrayerSchedule,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "清真寺显示屏 - 礼拜人数统计", long_about = None)]
struct Args {
    /// 配置文件 (默认: <config_dir>/jamaah-counter/board.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 回放录制的推理输出 (JSON Lines), 按周期统计人数
    Count {
        /// 录像文件, 每行 {"width","height","detections":[...]}
        #[arg(short, long)]
        frames: PathBuf,

        /// 每帧结果以 JSON 输出到 stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// 在单张图片上绘制检测结果
    Annotate {
        /// 输入图片
        #[arg(short, long)]
        image: PathBuf,

        /// 检测记录 (单个 {"width","height","detections":[...]})
        #[arg(short, long)]
        detections: PathBuf,

        /// 输出图片 (默认: jamaah_<时间>.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 字体文件, 覆盖配置中的 font_path
        #[arg(long)]
        font: Option<PathBuf>,
    },
    /// 显示今日礼拜时间与下一次礼拜倒计时
    Schedule {
        /// 时间表 JSON
        #[arg(short, long)]
        table: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(BoardConfig::default_path);
    let config = BoardConfig::load(&config_path);

    match args.command {
        Command::Count { frames, json } => count(&config, frames, json),
        Command::Annotate {
            image,
            detections,
            output,
            font,
        } => annotate(&config, image, detections, output, font),
        Command::Schedule { table } => schedule(&config, table),
    }
}

fn count(config: &BoardConfig, frames: PathBuf, json: bool) -> Result<()> {
    config.print_summary();
    let replay = Replay::load(&frames)?;
    if replay.is_empty() {
        warn!("⚠️ 录像为空: {}", frames.display());
    }

    let (source, backend) = replay.split();
    let (tx, rx) = crossbeam_channel::bounded(16);
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

    // ========== 启动检测线程 ==========
    let detector_config = config.clone();
    let worker = thread::spawn(move || {
        let mut detector = Detector::new(source, backend, &detector_config);
        detector.run(tx, stop_rx)
    });

    // ========== 主线程: 输出结果 ==========
    for report in rx.iter() {
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "帧 {:>5} | 👥 {:>3} 人 | {:.2}ms",
                report.frame_index, report.count, report.latency_ms
            );
        }
    }

    drop(stop_tx);
    let summary = worker
        .join()
        .map_err(|_| anyhow!("detector thread panicked"))??;
    info!(
        "📊 共{}帧, 最多{}人, 平均{:.1}人",
        summary.frames,
        summary.max_count,
        summary.mean_count()
    );
    Ok(())
}

fn annotate(
    config: &BoardConfig,
    image_path: PathBuf,
    detections: PathBuf,
    output: Option<PathBuf>,
    font: Option<PathBuf>,
) -> Result<()> {
    let mut image = image::open(&image_path)
        .with_context(|| format!("failed to open image {}", image_path.display()))?
        .to_rgb8();

    let json = std::fs::read_to_string(&detections)
        .with_context(|| format!("failed to read {}", detections.display()))?;
    let record: FrameRecord = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse {}", detections.display()))?;

    let frame = FrameContext::new(image.width(), image.height());
    if record.context() != frame {
        warn!(
            "⚠️ 记录尺寸 {}x{} 与图片 {}x{} 不一致, 以图片为准",
            record.width, record.height, frame.width, frame.height
        );
    }

    let processor = DetectionPostProcessor::new(config.postprocess.clone());
    let ranked = processor.process(&record.detections, frame);
    info!("👥 原始{}个 → {}人", record.detections.len(), ranked.len());

    let renderer = match font.or_else(|| config.font_path.clone()) {
        Some(path) => OverlayRenderer::with_font_file(&path, OverlayStyle::default())?,
        None => {
            warn!("⚠️ 未配置字体, 仅绘制图形");
            OverlayRenderer::new(None, OverlayStyle::default())
        }
    };
    renderer.draw(&mut image, &ranked);

    let output = output.unwrap_or_else(|| {
        PathBuf::from(format!("jamaah_{}.png", gen_time_string("", config.utc_offset_hours)))
    });
    image
        .save(&output)
        .with_context(|| format!("failed to save {}", output.display()))?;
    info!("💾 已保存: {}", output.display());
    Ok(())
}

fn schedule(config: &BoardConfig, table: PathBuf) -> Result<()> {
    let schedule = PrayerSchedule::load(&table)?;
    let now = local_now(config.utc_offset_hours).naive_local();

    match schedule.day(now.date()) {
        Some(day) => {
            println!("🕌 {}", day.date);
            for (prayer, at) in day.entries() {
                println!("  {:<8} {}", prayer.to_string(), at.format("%H:%M"));
            }
        }
        None => warn!("⚠️ 时间表中没有 {}", now.date()),
    }

    if let Some((prayer, at)) = schedule.current_prayer(now) {
        println!("当前: {} ({})", prayer, at.format("%H:%M"));
    }
    match schedule.next_prayer(now) {
        Some(next) => println!(
            "下一次: {} {} (还有 {})",
            next.prayer,
            next.at.format("%H:%M"),
            format_countdown(next.remaining)
        ),
        None => warn!("⚠️ 时间表已用完"),
    }
    Ok(())
}
