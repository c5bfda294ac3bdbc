use crate::core::{PipelineConfig, PipelineError, Result, StreamDescriptor};
use crate::player::demuxer_source::{DecoderCandidate, DemuxerSource};
use log::{debug, info, warn};

/// 解码器激活：先按配置顺序尝试具名（硬件）解码器，最后回退到通用解码器
pub struct CodecActivator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> CodecActivator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// 按优先级解析出所有可用的候选解码器（已去重）
    pub fn candidates<S: DemuxerSource>(
        &self,
        source: &S,
        stream: &StreamDescriptor,
    ) -> Vec<DecoderCandidate> {
        let mut candidates: Vec<DecoderCandidate> = Vec::new();

        for name in self.config.preferred_decoders(&stream.codec) {
            match source.resolve_named(name) {
                Some(candidate) => {
                    if !candidates.iter().any(|c| c.name == candidate.name) {
                        candidates.push(candidate);
                    }
                }
                None => debug!("未找到解码器: {}", name),
            }
        }

        if let Some(generic) = source.resolve_generic(stream) {
            if !candidates.iter().any(|c| c.name == generic.name) {
                candidates.push(generic);
            }
        }

        candidates
    }

    /// 为轨道打开解码器，某个候选打开失败时继续尝试下一个
    pub fn activate<S: DemuxerSource>(
        &self,
        source: &S,
        stream: &StreamDescriptor,
    ) -> Result<S::Decoder> {
        let candidates = self.candidates(source, stream);
        if candidates.is_empty() {
            return Err(PipelineError::CodecNotFound {
                track: stream.index,
                codec: stream.codec.clone(),
            });
        }

        let mut last_error = None;
        for candidate in &candidates {
            match source.open_decoder(candidate, stream.index) {
                Ok(decoder) => {
                    info!(
                        "✓ 打开{}轨道 #{}: {} ({})",
                        candidate.kind.name(),
                        stream.index,
                        candidate.name,
                        if candidate.hardware { "硬件解码" } else { "软件解码" }
                    );
                    return Ok(decoder);
                }
                Err(e) => {
                    warn!("✗ 解码器 {} 打开失败: {}", candidate.name, e);
                    last_error = Some((candidate.name.clone(), e.to_string()));
                }
            }
        }

        let (decoder, reason) = last_error.unwrap_or_default();
        Err(PipelineError::CodecOpenFailed {
            track: stream.index,
            decoder,
            reason,
        })
    }
}
