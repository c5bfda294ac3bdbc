use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("无法打开容器 {path}: {reason}")]
    ContainerOpenFailed { path: String, reason: String },

    #[error("无法获取流信息: {0}")]
    StreamInfoUnavailable(String),

    #[error("文件中既没有视频轨道也没有音频轨道")]
    NoMediaTracks,

    #[error("找不到轨道 {track} 的解码器 (codec: {codec})")]
    CodecNotFound { track: usize, codec: String },

    #[error("无法打开轨道 {track} 的解码器 {decoder}: {reason}")]
    CodecOpenFailed {
        track: usize,
        decoder: String,
        reason: String,
    },

    #[error("重采样器初始化失败: {0}")]
    ResamplerInitFailed(String),

    #[error("重采样失败: {0}")]
    ResampleFailed(String),

    #[error("轨道 {track} 拒绝数据包: {reason}")]
    DecodeFeedRejected { track: usize, reason: String },

    #[error("读取数据包失败: {0}")]
    ReadFailed(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
