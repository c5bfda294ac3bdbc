use crate::core::{AudioParams, MediaFrame, MediaKind, Rational, VideoParams};
use crate::player::demuxer_source::{FeedStatus, ReceiveStatus, TrackDecoder};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, util};
use log::debug;

/// 解码器内部类型
enum DecoderType {
    Video {
        decoder: codec::decoder::Video,
        scratch: util::frame::Video,
    },
    Audio {
        decoder: codec::decoder::Audio,
        scratch: util::frame::Audio,
    },
}

/// 基于 FFmpeg 的单轨道解码器（视频或音频）
pub struct FfmpegDecoder {
    name: String,
    inner: DecoderType,
}

// 解码上下文和临时帧只在持有管线的线程中使用
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    pub(crate) fn video(name: &str, decoder: codec::decoder::Video) -> Self {
        debug!(
            "视频解码器 {}: {}x{}, 格式: {:?}",
            name,
            decoder.width(),
            decoder.height(),
            decoder.format()
        );
        Self {
            name: name.to_string(),
            inner: DecoderType::Video {
                decoder,
                scratch: util::frame::Video::empty(),
            },
        }
    }

    pub(crate) fn audio(name: &str, decoder: codec::decoder::Audio) -> Self {
        debug!(
            "音频解码器 {}: {} Hz, {} 声道, 格式: {:?}, 帧长: {}",
            name,
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            decoder.frame_size()
        );
        Self {
            name: name.to_string(),
            inner: DecoderType::Audio {
                decoder,
                scratch: util::frame::Audio::empty(),
            },
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self.inner {
            DecoderType::Video { .. } => MediaKind::Video,
            DecoderType::Audio { .. } => MediaKind::Audio,
        }
    }

    pub fn video_params(&self) -> Option<VideoParams> {
        match &self.inner {
            DecoderType::Video { decoder, .. } => Some(VideoParams {
                width: decoder.width(),
                height: decoder.height(),
                pixel_format: decoder.format().into(),
            }),
            DecoderType::Audio { .. } => None,
        }
    }

    fn decoder_mut(&mut self) -> &mut codec::decoder::Opened {
        match &mut self.inner {
            DecoderType::Video { decoder, .. } => &mut **decoder,
            DecoderType::Audio { decoder, .. } => &mut **decoder,
        }
    }
}

fn feed_status(result: std::result::Result<(), ffmpeg::Error>) -> FeedStatus {
    match result {
        Ok(()) => FeedStatus::Accepted,
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => FeedStatus::NotReady,
        Err(e) => FeedStatus::Rejected(e.to_string()),
    }
}

/// 把视频帧的各个平面拷贝到 MediaFrame
fn copy_video(src: &util::frame::Video, dst: &mut MediaFrame) {
    dst.kind = MediaKind::Video;
    dst.pts = src.timestamp();
    dst.width = src.width();
    dst.height = src.height();
    dst.pixel_format = src.format().into();
    dst.samples = 0;

    let planes = src.planes();
    dst.set_plane_count(planes);
    for i in 0..planes {
        dst.write_plane(i, src.data(i), src.stride(i));
    }
}

/// 音频帧第 `index` 个平面的前 `len` 个字节
///
/// 平面音频只有 linesize[0] 有效，`frame::Audio::data(i)` 对 i > 0 返回空切片，
/// 因此直接按 extended_data 取指针。调用方保证 `len` 不超过平面实际大小。
pub(crate) fn audio_plane(frame: &util::frame::Audio, index: usize, len: usize) -> &[u8] {
    if index >= frame.planes() || len == 0 {
        return &[];
    }
    unsafe {
        let ptr = *(*frame.as_ptr()).extended_data.add(index);
        if ptr.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(ptr, len)
    }
}

/// 可写版本，用于填充预分配的重采样输入帧
pub(crate) fn audio_plane_mut(frame: &mut util::frame::Audio, index: usize, len: usize) -> &mut [u8] {
    if index >= frame.planes() || len == 0 {
        return &mut [];
    }
    unsafe {
        let ptr = *(*frame.as_mut_ptr()).extended_data.add(index);
        if ptr.is_null() {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(ptr, len)
    }
}

/// 单个平面中有效采样占用的字节数（不含对齐填充）
pub(crate) fn audio_plane_bytes(frame: &util::frame::Audio) -> usize {
    let format: crate::core::SampleFormat = frame.format().into();
    let per_plane_channels = if format.is_planar() { 1 } else { frame.channels() as usize };
    let valid = frame.samples() * format.bytes() * per_plane_channels;
    // linesize[0] 是每个平面的容量
    let capacity = unsafe { (*frame.as_ptr()).linesize[0].max(0) as usize };
    valid.min(capacity)
}

/// 把音频帧拷贝到 MediaFrame，只复制有效采样（忽略对齐填充）
fn copy_audio(src: &util::frame::Audio, dst: &mut MediaFrame) {
    dst.kind = MediaKind::Audio;
    dst.pts = src.timestamp();
    dst.sample_rate = src.rate();
    dst.channels = src.channels();
    dst.channel_layout = src.channel_layout().bits();
    dst.samples = src.samples();
    dst.sample_format = src.format().into();

    let valid = audio_plane_bytes(src);
    let planes = src.planes();
    dst.set_plane_count(planes);
    for i in 0..planes {
        dst.write_plane(i, audio_plane(src, i, valid), valid);
    }
}

impl TrackDecoder for FfmpegDecoder {
    type Packet = ffmpeg::Packet;

    fn name(&self) -> &str {
        &self.name
    }

    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> FeedStatus {
        feed_status(self.decoder_mut().send_packet(packet))
    }

    fn send_eof(&mut self) -> FeedStatus {
        feed_status(self.decoder_mut().send_eof())
    }

    fn receive_frame(&mut self, frame: &mut MediaFrame) -> ReceiveStatus {
        let result = match &mut self.inner {
            DecoderType::Video { decoder, scratch } => decoder
                .receive_frame(scratch)
                .map(|_| copy_video(scratch, frame)),
            DecoderType::Audio { decoder, scratch } => decoder
                .receive_frame(scratch)
                .map(|_| copy_audio(scratch, frame)),
        };

        match result {
            Ok(()) => ReceiveStatus::Frame,
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                ReceiveStatus::Again
            }
            Err(ffmpeg::Error::Eof) => ReceiveStatus::EndOfStream,
            Err(e) => ReceiveStatus::Failed(e.to_string()),
        }
    }

    fn time_base(&self) -> Option<Rational> {
        let ctx = match &self.inner {
            DecoderType::Video { decoder, .. } => unsafe { decoder.as_ptr() },
            DecoderType::Audio { decoder, .. } => unsafe { decoder.as_ptr() },
        };
        let tb = unsafe { (*ctx).time_base };
        let tb = Rational::new(tb.num, tb.den);
        tb.is_valid().then_some(tb)
    }

    fn audio_params(&self) -> Option<AudioParams> {
        match &self.inner {
            DecoderType::Audio { decoder, .. } => Some(AudioParams {
                sample_rate: decoder.rate(),
                channels: decoder.channels(),
                channel_layout: decoder.channel_layout().bits(),
                sample_format: decoder.format().into(),
                frame_size: decoder.frame_size() as usize,
            }),
            DecoderType::Video { .. } => None,
        }
    }
}
