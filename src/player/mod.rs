// 解码管线模块

pub mod demuxer_source;  // 数据源 / 解码器抽象接口
pub mod demuxer;
pub mod decoder;
pub mod track_selector;
pub mod codec_activator;
pub mod resampler;
pub mod pts;
pub mod pipeline;
pub mod playback;        // 播放线程（帧拉取循环）

#[cfg(test)]
pub(crate) mod mock;

pub use demuxer::Demuxer;
pub use demuxer_source::{DemuxerSource, TrackDecoder};
pub use decoder::FfmpegDecoder;
pub use pipeline::{DecodePipeline, PipelineState};
pub use playback::{PlayState, PlaybackConfig, PlaybackSummary, PlaybackWorker, StopReason};
