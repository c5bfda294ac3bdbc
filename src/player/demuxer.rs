use crate::core::{
    AudioParams, MediaKind, PipelineConfig, PipelineError, Result, StreamDescriptor, VideoParams,
};
use crate::player::decoder::FfmpegDecoder;
use crate::player::demuxer_source::{DecoderCandidate, DemuxerSource, PacketSlot, ReadOutcome};
use crate::player::pipeline::DecodePipeline;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, ffi, format};
use log::{debug, info};
use std::ffi::CString;
use std::path::Path;
use std::ptr;

/// 解封装器 - 负责打开容器并按顺序读取数据包
pub struct Demuxer {
    input_ctx: format::context::Input,
    streams: Vec<StreamDescriptor>,  // 缓存流描述
    source_path: String,             // 媒体源路径（用于描述）
}

// AVFormatContext 只在持有管线的线程中使用
unsafe impl Send for Demuxer {}

impl Demuxer {
    /// 打开媒体文件并读取流信息
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();
        info!("正在打开文件: {}", path);

        let input_ctx = Self::open_input(&path)?;
        let streams = Self::describe_streams(&input_ctx);

        info!("📂 容器已打开: {}，共 {} 个流", path, streams.len());
        for stream in &streams {
            debug!(
                "流 #{}: {} ({}), 时间基 {}",
                stream.index,
                stream.kind.name(),
                stream.codec,
                stream.time_base
            );
        }

        Ok(Self {
            input_ctx,
            streams,
            source_path: path,
        })
    }

    /// 分两步打开，以区分 "无法打开" 和 "无法获取流信息"
    fn open_input(path: &str) -> Result<format::context::Input> {
        let c_path = CString::new(path).map_err(|e| PipelineError::ContainerOpenFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        unsafe {
            let mut ps: *mut ffi::AVFormatContext = ptr::null_mut();
            let ret = ffi::avformat_open_input(&mut ps, c_path.as_ptr(), ptr::null(), ptr::null_mut());
            if ret != 0 {
                return Err(PipelineError::ContainerOpenFailed {
                    path: path.to_string(),
                    reason: ffmpeg::Error::from(ret).to_string(),
                });
            }

            let ret = ffi::avformat_find_stream_info(ps, ptr::null_mut());
            if ret < 0 {
                ffi::avformat_close_input(&mut ps);
                return Err(PipelineError::StreamInfoUnavailable(
                    ffmpeg::Error::from(ret).to_string(),
                ));
            }

            Ok(format::context::Input::wrap(ps))
        }
    }

    /// 从流参数提取描述
    ///
    /// 直接读 AVCodecParameters，不分配解码器上下文；数据流、字幕流也能得到描述。
    fn describe_streams(input_ctx: &format::context::Input) -> Vec<StreamDescriptor> {
        input_ctx
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let kind: MediaKind = parameters.medium().into();
                let codec_name = parameters.id().name().to_string();

                let (video, audio) = unsafe {
                    let par = parameters.as_ptr();
                    match kind {
                        MediaKind::Video => (
                            Some(VideoParams {
                                width: (*par).width.max(0) as u32,
                                height: (*par).height.max(0) as u32,
                                pixel_format: Self::pixel_format((*par).format).into(),
                            }),
                            None,
                        ),
                        MediaKind::Audio => {
                            let layout = &(*par).ch_layout;
                            // 新旧两套声道字段，哪套有值用哪套
                            let channels = if layout.nb_channels > 0 {
                                layout.nb_channels
                            } else {
                                (*par).channels
                            };
                            let channel_layout =
                                if layout.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE {
                                    layout.u.mask
                                } else {
                                    (*par).channel_layout
                                };
                            (
                                None,
                                Some(AudioParams {
                                    sample_rate: (*par).sample_rate.max(0) as u32,
                                    channels: channels.max(0) as u16,
                                    channel_layout,
                                    sample_format: Self::sample_format((*par).format).into(),
                                    frame_size: (*par).frame_size.max(0) as usize,
                                }),
                            )
                        }
                        MediaKind::Other => (None, None),
                    }
                };

                StreamDescriptor {
                    index: stream.index(),
                    kind,
                    codec: codec_name,
                    time_base: stream.time_base().into(),
                    video,
                    audio,
                }
            })
            .collect()
    }

    /// AVCodecParameters::format 对视频流是 AVPixelFormat
    unsafe fn pixel_format(raw: i32) -> format::Pixel {
        match raw {
            -1 => format::Pixel::None,
            value => format::Pixel::from(std::mem::transmute::<i32, ffi::AVPixelFormat>(value)),
        }
    }

    /// AVCodecParameters::format 对音频流是 AVSampleFormat
    unsafe fn sample_format(raw: i32) -> format::Sample {
        match raw {
            -1 => format::Sample::None,
            value => format::Sample::from(std::mem::transmute::<i32, ffi::AVSampleFormat>(value)),
        }
    }

    fn candidate(codec: &codec::Codec, hardware: bool) -> DecoderCandidate {
        DecoderCandidate {
            name: codec.name().to_string(),
            kind: codec.medium().into(),
            hardware,
        }
    }
}

impl PacketSlot for ffmpeg::Packet {
    fn unref(&mut self) {
        // 旧包在 drop 时 av_packet_unref
        *self = ffmpeg::Packet::empty();
    }
}

impl DemuxerSource for Demuxer {
    type Packet = ffmpeg::Packet;
    type Decoder = FfmpegDecoder;

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn alloc_packet(&self) -> ffmpeg::Packet {
        ffmpeg::Packet::empty()
    }

    fn read_packet(&mut self, packet: &mut ffmpeg::Packet) -> ReadOutcome {
        match packet.read(&mut self.input_ctx) {
            Ok(()) => ReadOutcome::Packet(packet.stream()),
            Err(ffmpeg::Error::Eof) => ReadOutcome::EndOfInput,
            Err(e) => ReadOutcome::Failed(e.to_string()),
        }
    }

    fn resolve_named(&self, name: &str) -> Option<DecoderCandidate> {
        codec::decoder::find_by_name(name)
            .filter(|c| c.is_decoder())
            .map(|c| Self::candidate(&c, true))
    }

    fn resolve_generic(&self, stream: &StreamDescriptor) -> Option<DecoderCandidate> {
        let stream = self.input_ctx.stream(stream.index)?;
        codec::decoder::find(stream.parameters().id()).map(|c| Self::candidate(&c, false))
    }

    fn open_decoder(&self, candidate: &DecoderCandidate, track: usize) -> Result<FfmpegDecoder> {
        let stream = self
            .input_ctx
            .stream(track)
            .ok_or_else(|| PipelineError::Other(format!("流 {} 不存在", track)))?;
        let codec = codec::decoder::find_by_name(&candidate.name).ok_or_else(|| {
            PipelineError::CodecNotFound {
                track,
                codec: candidate.name.clone(),
            }
        })?;

        let mut context = codec::context::Context::from_parameters(stream.parameters())?;
        unsafe {
            // 告知解码器数据包的时间基，便于内部推算时间戳
            (*context.as_mut_ptr()).pkt_timebase = stream.time_base().into();
        }
        let opened = context.decoder().open_as(codec)?;

        match candidate.kind {
            MediaKind::Video => Ok(FfmpegDecoder::video(&candidate.name, opened.video()?)),
            MediaKind::Audio => Ok(FfmpegDecoder::audio(&candidate.name, opened.audio()?)),
            MediaKind::Other => Err(PipelineError::CodecOpenFailed {
                track,
                decoder: candidate.name.clone(),
                reason: "不是音频或视频解码器".to_string(),
            }),
        }
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}

impl DecodePipeline<Demuxer> {
    /// 打开文件并完成准备（选轨、打开解码器、初始化重采样器）
    pub fn open<P: AsRef<Path>>(path: P, config: PipelineConfig) -> Result<Self> {
        let demuxer = Demuxer::open(path)?;
        Self::prepare(demuxer, config)
    }
}
