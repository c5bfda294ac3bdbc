//! 脚本化的内存数据源，用于在没有媒体文件的情况下测试管线

use crate::core::{
    AudioParams, MediaFrame, MediaKind, PipelineError, PixelFormat, Rational, Result,
    SampleFormat, SampleLayout, StreamDescriptor, VideoParams,
};
use crate::player::demuxer_source::{
    DecoderCandidate, DemuxerSource, FeedStatus, PacketSlot, ReadOutcome, ReceiveStatus,
    TrackDecoder,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// 模拟音频帧中各声道的固定采样值
pub const MOCK_CHANNEL_VALUES: [f32; 2] = [0.5, -0.25];

/// 流描述构造
pub struct MockStream;

impl MockStream {
    pub fn video(index: usize, codec: &str) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind: MediaKind::Video,
            codec: codec.to_string(),
            time_base: Rational::new(1, 12800),
            video: Some(VideoParams {
                width: 16,
                height: 8,
                pixel_format: PixelFormat::YUV420P,
            }),
            audio: None,
        }
    }

    /// 48 kHz 立体声 fltp，帧长 1024
    pub fn audio(index: usize, codec: &str) -> StreamDescriptor {
        Self::audio_with(
            index,
            codec,
            AudioParams {
                sample_rate: 48000,
                channels: 2,
                channel_layout: 0,
                sample_format: SampleFormat::F32(SampleLayout::Planar),
                frame_size: 1024,
            },
        )
    }

    pub fn audio_with(index: usize, codec: &str, params: AudioParams) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind: MediaKind::Audio,
            codec: codec.to_string(),
            time_base: Rational::new(1, params.sample_rate.max(1) as i32),
            video: None,
            audio: Some(params),
        }
    }

    pub fn data(index: usize) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind: MediaKind::Other,
            codec: "bin_data".to_string(),
            time_base: Rational::new(1, 1000),
            video: None,
            audio: None,
        }
    }
}

/// 模拟数据包
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockPacket {
    pub stream: usize,
    pub pts: Option<i64>,
    /// 解码后产生的帧数
    pub frames: usize,
    /// 音频帧的采样数，None 表示使用帧长
    pub samples: Option<usize>,
    /// 解码器拒绝该包
    pub reject: bool,
    /// 解码器先返回多少次 "暂不接收"
    pub busy: u32,
}

impl MockPacket {
    pub fn new(stream: usize, pts: i64) -> Self {
        Self {
            stream,
            pts: Some(pts),
            frames: 1,
            ..Default::default()
        }
    }

    pub fn frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    pub fn samples(mut self, samples: usize) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn rejected(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn busy(mut self, times: u32) -> Self {
        self.busy = times;
        self
    }
}

impl PacketSlot for MockPacket {
    fn unref(&mut self) {
        *self = MockPacket::default();
    }
}

/// 数据源与解码器共享的事件记录
#[derive(Debug, Default)]
pub struct MockLog {
    /// 被解码器接收的包 (流索引, pts)
    pub accepted: Vec<(usize, Option<i64>)>,
    pub eof_sent: Vec<String>,
    /// 释放顺序
    pub dropped: Vec<String>,
}

enum Script {
    Packet(MockPacket),
    Fail(String),
}

/// 脚本化数据源
pub struct MockSource {
    streams: Vec<StreamDescriptor>,
    script: VecDeque<Script>,
    named: Vec<String>,
    failing: Vec<String>,
    no_generic: Vec<String>,
    codec_time_bases: HashMap<usize, Rational>,
    reorder_delay: usize,
    log: Arc<Mutex<MockLog>>,
}

impl MockSource {
    pub fn new(streams: Vec<StreamDescriptor>) -> Self {
        Self {
            streams,
            script: VecDeque::new(),
            named: Vec::new(),
            failing: Vec::new(),
            no_generic: Vec::new(),
            codec_time_bases: HashMap::new(),
            reorder_delay: 0,
            log: Arc::new(Mutex::new(MockLog::default())),
        }
    }

    pub fn push(&mut self, packet: MockPacket) {
        self.script.push_back(Script::Packet(packet));
    }

    pub fn push_packet(&mut self, stream: usize, pts: i64) {
        self.push(MockPacket::new(stream, pts));
    }

    pub fn push_failure(&mut self, reason: &str) {
        self.script.push_back(Script::Fail(reason.to_string()));
    }

    /// 注册一个可按名称找到的解码器
    pub fn register_decoder(&mut self, name: &str) {
        self.named.push(name.to_string());
    }

    /// 该解码器可以找到但打开失败
    pub fn fail_open(&mut self, name: &str) {
        self.failing.push(name.to_string());
    }

    /// 该编码格式没有通用解码器
    pub fn unregister_generic(&mut self, codec: &str) {
        self.no_generic.push(codec.to_string());
    }

    pub fn set_codec_time_base(&mut self, track: usize, time_base: Rational) {
        self.codec_time_bases.insert(track, time_base);
    }

    /// 解码器缓存多少帧后才开始输出（模拟 B 帧重排）
    pub fn set_reorder_delay(&mut self, frames: usize) {
        self.reorder_delay = frames;
    }

    pub fn log(&self) -> Arc<Mutex<MockLog>> {
        Arc::clone(&self.log)
    }

    fn kind_for_decoder(&self, name: &str) -> MediaKind {
        self.streams
            .iter()
            .find(|s| name.starts_with(&s.codec))
            .map(|s| s.kind)
            .unwrap_or(MediaKind::Video)
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.log.lock().dropped.push("source".to_string());
    }
}

impl DemuxerSource for MockSource {
    type Packet = MockPacket;
    type Decoder = MockDecoder;

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn alloc_packet(&self) -> MockPacket {
        MockPacket::default()
    }

    fn read_packet(&mut self, packet: &mut MockPacket) -> ReadOutcome {
        match self.script.pop_front() {
            Some(Script::Packet(next)) => {
                let stream = next.stream;
                *packet = next;
                ReadOutcome::Packet(stream)
            }
            Some(Script::Fail(reason)) => ReadOutcome::Failed(reason),
            None => ReadOutcome::EndOfInput,
        }
    }

    fn resolve_named(&self, name: &str) -> Option<DecoderCandidate> {
        self.named.iter().any(|n| n == name).then(|| DecoderCandidate {
            name: name.to_string(),
            kind: self.kind_for_decoder(name),
            hardware: true,
        })
    }

    fn resolve_generic(&self, stream: &StreamDescriptor) -> Option<DecoderCandidate> {
        if self.no_generic.contains(&stream.codec) {
            return None;
        }
        Some(DecoderCandidate {
            name: stream.codec.clone(),
            kind: stream.kind,
            hardware: false,
        })
    }

    fn open_decoder(&self, candidate: &DecoderCandidate, track: usize) -> Result<MockDecoder> {
        if self.failing.contains(&candidate.name) {
            return Err(PipelineError::CodecOpenFailed {
                track,
                decoder: candidate.name.clone(),
                reason: "模拟打开失败".to_string(),
            });
        }
        let stream = self
            .streams
            .iter()
            .find(|s| s.index == track)
            .ok_or_else(|| PipelineError::Other(format!("流 {} 不存在", track)))?;

        Ok(MockDecoder {
            name: candidate.name.clone(),
            stream: stream.clone(),
            time_base: self.codec_time_bases.get(&track).copied(),
            held: VecDeque::new(),
            ready: VecDeque::new(),
            reorder_delay: self.reorder_delay,
            refusals: 0,
            eof: false,
            log: Arc::clone(&self.log),
        })
    }

    fn description(&self) -> String {
        format!("Mock Source ({} streams)", self.streams.len())
    }
}

/// 待输出的帧：(pts, 采样数)
type PendingFrame = (Option<i64>, usize);

/// 模拟解码器：每个包产生固定数量的帧，可延迟输出
pub struct MockDecoder {
    name: String,
    stream: StreamDescriptor,
    time_base: Option<Rational>,
    held: VecDeque<PendingFrame>,
    ready: VecDeque<PendingFrame>,
    reorder_delay: usize,
    refusals: u32,
    eof: bool,
    log: Arc<Mutex<MockLog>>,
}

impl MockDecoder {
    fn fill_video(&self, frame: &mut MediaFrame, pts: Option<i64>) {
        let params = self.stream.video.unwrap_or_default();
        frame.pts = pts;
        frame.width = params.width;
        frame.height = params.height;
        frame.pixel_format = params.pixel_format;
        frame.samples = 0;
        let luma = vec![(pts.unwrap_or(0) & 0xff) as u8; (params.width * params.height) as usize];
        frame.set_plane_count(1);
        frame.write_plane(0, &luma, params.width as usize);
    }

    fn fill_audio(&self, frame: &mut MediaFrame, pts: Option<i64>, samples: usize) {
        let params = self.stream.audio.unwrap_or_default();
        frame.pts = pts;
        frame.sample_rate = params.sample_rate;
        frame.channels = params.channels;
        frame.channel_layout = params.channel_layout;
        frame.sample_format = params.sample_format;
        frame.samples = samples;

        let channels = params.channels as usize;
        frame.set_plane_count(channels);
        for ch in 0..channels {
            let value = MOCK_CHANNEL_VALUES[ch % MOCK_CHANNEL_VALUES.len()];
            let plane = vec![value; samples];
            let bytes: &[u8] = bytemuck::cast_slice(&plane);
            frame.write_plane(ch, bytes, bytes.len());
        }
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.log.lock().dropped.push(format!("decoder:{}", self.name));
    }
}

impl TrackDecoder for MockDecoder {
    type Packet = MockPacket;

    fn name(&self) -> &str {
        &self.name
    }

    fn send_packet(&mut self, packet: &MockPacket) -> FeedStatus {
        if self.eof {
            return FeedStatus::Rejected("解码器已收到结束信号".to_string());
        }
        if packet.reject {
            return FeedStatus::Rejected("无效数据".to_string());
        }
        if self.refusals < packet.busy {
            self.refusals += 1;
            return FeedStatus::NotReady;
        }
        self.refusals = 0;

        let samples = packet
            .samples
            .or_else(|| self.stream.audio.map(|a| a.frame_size))
            .unwrap_or(0);
        for i in 0..packet.frames {
            self.held.push_back((packet.pts.map(|p| p + i as i64), samples));
        }
        while self.held.len() > self.reorder_delay {
            if let Some(frame) = self.held.pop_front() {
                self.ready.push_back(frame);
            }
        }
        self.log.lock().accepted.push((packet.stream, packet.pts));
        FeedStatus::Accepted
    }

    fn send_eof(&mut self) -> FeedStatus {
        self.eof = true;
        self.ready.extend(self.held.drain(..));
        self.log.lock().eof_sent.push(self.name.clone());
        FeedStatus::Accepted
    }

    fn receive_frame(&mut self, frame: &mut MediaFrame) -> ReceiveStatus {
        match self.ready.pop_front() {
            Some((pts, samples)) => {
                match self.stream.kind {
                    MediaKind::Audio => self.fill_audio(frame, pts, samples),
                    _ => self.fill_video(frame, pts),
                }
                ReceiveStatus::Frame
            }
            None if self.eof => ReceiveStatus::EndOfStream,
            None => ReceiveStatus::Again,
        }
    }

    fn time_base(&self) -> Option<Rational> {
        self.time_base
    }

    fn audio_params(&self) -> Option<AudioParams> {
        self.stream.audio
    }
}
