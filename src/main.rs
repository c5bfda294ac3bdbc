use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{select, Receiver};
use log::{info, LevelFilter};
use myy_decode::core::{MediaFrame, PipelineConfig, Rational};
use myy_decode::player::{DecodePipeline, PlaybackConfig, PlaybackWorker};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "myy_decode")]
#[command(about = "解码媒体文件并统计输出帧（视频 / 音频）")]
#[command(version)]
struct Cli {
    /// 媒体文件路径
    path: PathBuf,

    /// JSON 配置文件
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 输出时间基，例如 1/1000
    #[arg(long, value_name = "NUM/DEN")]
    time_base: Option<Rational>,

    #[arg(short, long)]
    verbose: bool,
}

/// 单一类型帧的统计
#[derive(Default)]
struct FrameTally {
    frames: u64,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
    missing_pts: u64,
}

impl FrameTally {
    fn record(&mut self, frame: &MediaFrame) {
        self.frames += 1;
        match frame.pts {
            Some(pts) => {
                self.first_pts.get_or_insert(pts);
                self.last_pts = Some(pts);
            }
            None => self.missing_pts += 1,
        }
    }

    fn report(&self, label: &str, time_base: Rational) {
        let seconds = |pts: Option<i64>| pts.map(|p| p as f64 * time_base.as_f64());
        println!(
            "{}: {} 帧, PTS {:?} → {:?} ({:.3?}s → {:.3?}s), 无 PTS {} 帧",
            label,
            self.frames,
            self.first_pts,
            self.last_pts,
            seconds(self.first_pts),
            seconds(self.last_pts),
            self.missing_pts
        );
    }
}

fn drain_frames(
    video_rx: Receiver<MediaFrame>,
    audio_rx: Receiver<MediaFrame>,
) -> (FrameTally, FrameTally) {
    let mut video = FrameTally::default();
    let mut audio = FrameTally::default();
    let (mut video_open, mut audio_open) = (true, true);

    while video_open || audio_open {
        select! {
            recv(video_rx) -> msg => match msg {
                Ok(frame) => video.record(&frame),
                Err(_) => video_open = false,
            },
            recv(audio_rx) -> msg => match msg {
                Ok(frame) => audio.record(&frame),
                Err(_) => audio_open = false,
            },
        }
    }
    (video, audio)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    info!("🎬 MYY Decode 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(time_base) = cli.time_base {
        config.output_time_base = time_base;
    }

    let pipeline = DecodePipeline::open(&cli.path, config)
        .with_context(|| format!("无法准备解码管线: {}", cli.path.display()))?;

    let time_base = pipeline.output_time_base();
    println!("文件: {}", cli.path.display());
    if let Some(index) = pipeline.selection().video {
        println!("视频轨道 #{}: {}x{}", index, pipeline.width(), pipeline.height());
    }
    if let Some(index) = pipeline.selection().audio {
        println!(
            "音频轨道 #{}: {} Hz, {} 声道, 输出 {:?} ({} 字节/帧)",
            index,
            pipeline.sample_rate(),
            pipeline.channels(),
            pipeline.output_sample_format(),
            pipeline.audio_frame_bytes()
        );
    }
    println!("输出时间基: {}", time_base);

    let mut worker = PlaybackWorker::start(pipeline, PlaybackConfig::default());
    let (video_rx, audio_rx) = worker
        .take_receivers()
        .context("无法取得帧接收端")?;
    let (video, audio) = drain_frames(video_rx, audio_rx);
    let summary = worker.join()?;

    video.report("视频", time_base);
    audio.report("音频", time_base);
    println!(
        "结束原因: {:?}, Unknown {} 次, 读取 {} 包（跳过 {}）",
        summary.reason,
        summary.unknown_results,
        summary.pipeline.packets_read,
        summary.pipeline.packets_skipped
    );

    Ok(())
}
