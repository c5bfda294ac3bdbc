//! MYY Decode - 基于 FFmpeg 的音视频解码管线
//!
//! 打开媒体文件，为第一个视频流和第一个音频流打开解码器（优先硬件解码），
//! 把平面音频转换为交错格式，并将所有帧的 PTS 换算到统一的输出时间基。

pub mod core;
pub mod player;

pub use crate::core::{GrabResult, MediaFrame, PipelineConfig, PipelineError, Result};
pub use crate::player::{DecodePipeline, Demuxer, PlaybackWorker};
