use crate::core::{PipelineError, Rational, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 某个编码格式的候选解码器（按优先级排序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderPreference {
    pub codec: String,
    pub decoders: Vec<String>,
}

impl DecoderPreference {
    pub fn new(codec: &str, decoders: &[&str]) -> Self {
        Self {
            codec: codec.to_string(),
            decoders: decoders.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// 重采样实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerEngine {
    /// FFmpeg libswresample
    Swr,
    /// 内置交错转换（仅格式与布局转换，不改变采样率）
    Native,
}

/// 重采样失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFailurePolicy {
    /// 初始化失败时继续运行，平面帧原样输出；单帧失败时原样输出该帧
    PassThrough,
    /// 初始化失败时 prepare 失败；单帧失败时丢弃该帧
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerConfig {
    pub engine: ResamplerEngine,
    pub on_failure: ResampleFailurePolicy,
    /// 解码器没有报告固定帧长时使用的目标帧容量
    pub fallback_frame_size: usize,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            engine: ResamplerEngine::Swr,
            on_failure: ResampleFailurePolicy::PassThrough,
            fallback_frame_size: 8192,
        }
    }
}

/// 解码管线配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 所有输出帧的 PTS 都使用这个时间基
    pub output_time_base: Rational,
    /// 是否尝试 decoder_preferences 中的硬件解码器
    pub prefer_hardware: bool,
    pub decoder_preferences: Vec<DecoderPreference>,
    pub resampler: ResamplerConfig,
    /// 输入结束后是否冲刷解码器中缓存的帧
    pub flush_decoders_at_eof: bool,
    /// 单次 grab 内最多尝试的次数（读包 / 重送），None 表示不限制
    pub max_attempts_per_grab: Option<u32>,
    /// 解码器连续返回 "暂不接收" 时同一个包最多重送的次数
    pub max_packet_resends: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_time_base: Rational::new(1, 1_000_000),
            prefer_hardware: cfg!(feature = "hwaccel"),
            decoder_preferences: default_decoder_preferences(),
            resampler: ResamplerConfig::default(),
            flush_decoders_at_eof: true,
            max_attempts_per_grab: None,
            max_packet_resends: 8,
        }
    }
}

/// 默认的硬件解码器优先级（平台相关）
fn default_decoder_preferences() -> Vec<DecoderPreference> {
    let mut h264 = Vec::new();
    let mut hevc = Vec::new();

    if cfg!(target_os = "android") {
        h264.push("h264_mediacodec");
        hevc.push("hevc_mediacodec");
    }
    if cfg!(feature = "hwaccel-cuda") {
        h264.push("h264_cuvid");
        hevc.push("hevc_cuvid");
    }
    if cfg!(feature = "hwaccel-qsv") {
        h264.push("h264_qsv");
        hevc.push("hevc_qsv");
    }

    vec![
        DecoderPreference::new("h264", &h264),
        DecoderPreference::new("hevc", &hevc),
    ]
}

impl PipelineConfig {
    /// 从 JSON 文件加载配置，缺失字段使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        info!("已加载配置: {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.output_time_base.is_valid() {
            return Err(PipelineError::ConfigError(format!(
                "输出时间基无效: {}",
                self.output_time_base
            )));
        }
        if self.resampler.fallback_frame_size == 0 {
            return Err(PipelineError::ConfigError(
                "fallback_frame_size 必须大于 0".to_string(),
            ));
        }
        if self.max_attempts_per_grab == Some(0) {
            return Err(PipelineError::ConfigError(
                "max_attempts_per_grab 不能为 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 某个编码格式的首选解码器名称（不含通用解码器）
    pub fn preferred_decoders(&self, codec: &str) -> Vec<&str> {
        if !self.prefer_hardware {
            return Vec::new();
        }
        self.decoder_preferences
            .iter()
            .filter(|p| p.codec == codec)
            .flat_map(|p| p.decoders.iter().map(|d| d.as_str()))
            .collect()
    }
}
