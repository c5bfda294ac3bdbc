use crate::core::{
    AudioParams, GrabResult, MediaFrame, MediaKind, PipelineConfig, PipelineError, PipelineStats,
    Rational, Result, SampleFormat, StreamDescriptor,
};
use crate::player::codec_activator::CodecActivator;
use crate::player::demuxer_source::{
    DemuxerSource, FeedStatus, PacketSlot, ReadOutcome, ReceiveStatus, TrackDecoder,
};
use crate::player::pts::{PtsAligner, TrackTiming};
use crate::player::resampler::{ResampleOutcome, Resampler};
use crate::player::track_selector::{CurrentTrack, TrackSelection};
use log::{debug, error, info, warn};

/// 管线运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 正常读包解码
    Running,
    /// 输入已结束，正在取出解码器缓存的帧
    Flushing,
    /// 所有帧已输出，之后只返回 EOF
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackStatus {
    Active,
    /// 送包被拒绝，本次会话不再产出帧
    Disabled,
    /// 解码器已输出全部帧
    Drained,
}

/// 单条轨道的解码状态
struct TrackState<D> {
    index: usize,
    decoder: D,
    timing: TrackTiming,
    status: TrackStatus,
}

/// 从当前轨道取帧的结果
enum Drain {
    Frame(GrabResult),
    Empty,
    /// 帧被重采样策略丢弃，应继续取下一帧
    Dropped,
}

/// 等待重送的数据包（仍在包缓冲区中）
#[derive(Debug, Clone, Copy)]
struct PendingPacket {
    track: CurrentTrack,
    resends: u32,
}

/// 解码管线 - 单线程拉取式接口
///
/// 每次 `grab` 返回一帧（或 EOF / Unknown 标记）。包缓冲区和重采样目标
/// 缓冲都会被下一次 `grab` 覆盖，调用者需在下一次调用前拷贝出帧数据。
/// 管线不可重入，同一时刻只能有一个线程调用。
pub struct DecodePipeline<S: DemuxerSource> {
    // 字段按释放顺序声明：包缓冲 → 重采样器 → 解码器 → 容器
    packet: S::Packet,
    resampler: Option<Resampler>,
    video: Option<TrackState<S::Decoder>>,
    audio: Option<TrackState<S::Decoder>>,
    source: S,

    selection: TrackSelection,
    audio_params: Option<AudioParams>,
    aligner: PtsAligner,
    current: Option<CurrentTrack>,
    pending: Option<PendingPacket>,
    state: PipelineState,
    config: PipelineConfig,
    stats: PipelineStats,
}

impl<S: DemuxerSource> DecodePipeline<S> {
    /// 选轨、打开解码器、按需初始化重采样器、分配包缓冲
    ///
    /// 任一步骤失败都不会留下可用的管线。
    pub fn prepare(source: S, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        info!("🎬 准备解码管线: {}", source.description());

        let selection = TrackSelection::select(source.streams())?;
        let activator = CodecActivator::new(&config);

        let video = match selection.video {
            Some(index) => Some(Self::open_track(&source, &activator, index)?),
            None => None,
        };
        let audio = match selection.audio {
            Some(index) => Some(Self::open_track(&source, &activator, index)?),
            None => None,
        };

        let audio_params = audio.as_ref().and_then(|track| {
            track
                .decoder
                .audio_params()
                .or_else(|| Self::stream(&source, track.index).and_then(|s| s.audio))
        });

        let resampler = match audio_params {
            Some(params) if Resampler::is_needed(&params) => {
                Some(Resampler::new(&params, &config.resampler)?)
            }
            _ => None,
        };

        let packet = source.alloc_packet();
        let aligner = PtsAligner::new(config.output_time_base);

        let pipeline = Self {
            packet,
            resampler,
            video,
            audio,
            source,
            selection,
            audio_params,
            aligner,
            current: None,
            pending: None,
            state: PipelineState::Running,
            config,
            stats: PipelineStats::default(),
        };

        info!(
            "✅ 解码管线就绪: {}x{}, channels={}, sampleHz={}, frameSize={}, 输出时间基 {}",
            pipeline.width(),
            pipeline.height(),
            pipeline.channels(),
            pipeline.sample_rate(),
            pipeline.audio_params.map(|p| p.frame_size).unwrap_or(0),
            pipeline.aligner.output_time_base()
        );
        Ok(pipeline)
    }

    fn stream(source: &S, index: usize) -> Option<&StreamDescriptor> {
        source.streams().iter().find(|s| s.index == index)
    }

    fn open_track(
        source: &S,
        activator: &CodecActivator<'_>,
        index: usize,
    ) -> Result<TrackState<S::Decoder>> {
        let stream = Self::stream(source, index).ok_or(PipelineError::NoMediaTracks)?;
        if let Some(video) = stream.video {
            info!("视频轨道 #{}: {}x{} ({})", index, video.width, video.height, stream.codec);
        }
        let decoder = activator.activate(source, stream)?;
        let timing = TrackTiming::new(stream.time_base, decoder.time_base());
        debug!("轨道 #{} 时间基: 流 {} / 解码器 {:?}", index, timing.stream, timing.codec);

        Ok(TrackState {
            index,
            decoder,
            timing,
            status: TrackStatus::Active,
        })
    }

    /// 取下一帧，写入 `frame`
    ///
    /// 返回 Video / Audio 时 `frame` 有效，其 PTS 已换算到输出时间基；
    /// Unknown 表示本次没有帧（读包失败或解码器拒绝数据包）；EOF 表示播放结束。
    pub fn grab(&mut self, frame: &mut MediaFrame) -> GrabResult {
        let mut attempts: u32 = 0;

        loop {
            if let Some(limit) = self.config.max_attempts_per_grab {
                if attempts >= limit {
                    debug!("单次 grab 尝试次数达到上限 {}", limit);
                    return GrabResult::Unknown;
                }
            }
            attempts += 1;

            match self.state {
                PipelineState::Finished => return GrabResult::Eof,
                PipelineState::Flushing => return self.grab_flushing(frame),
                PipelineState::Running => {}
            }

            // 1 / 2. 当前轨道的解码器还有帧
            if let Some(current @ (CurrentTrack::Video | CurrentTrack::Audio)) = self.current {
                match self.drain(current, frame) {
                    Drain::Frame(result) => return result,
                    Drain::Dropped => continue,
                    Drain::Empty => {}
                }
            }

            // 解码器之前暂不接收的包，取完帧后重送
            if let Some(pending) = self.pending {
                if let Some(result) = self.resend(pending) {
                    return result;
                }
                continue;
            }

            // 3. 读取新的数据包
            self.packet.unref();
            match self.source.read_packet(&mut self.packet) {
                ReadOutcome::Packet(stream_index) => {
                    self.stats.packets_read += 1;
                    let track = self.selection.route(stream_index);
                    self.current = Some(track);

                    if track == CurrentTrack::Unmatched || !self.is_active(track) {
                        self.stats.packets_skipped += 1;
                        continue;
                    }
                    if let Some(result) = self.feed(track, 0) {
                        return result;
                    }
                }
                ReadOutcome::EndOfInput => {
                    info!("📄 输入结束（共读取 {} 个包）", self.stats.packets_read);
                    if self.config.flush_decoders_at_eof {
                        self.begin_flush();
                        continue;
                    }
                    self.state = PipelineState::Finished;
                    return GrabResult::Eof;
                }
                ReadOutcome::Failed(reason) => {
                    self.stats.read_failures += 1;
                    warn!("{}", PipelineError::ReadFailed(reason));
                    return GrabResult::Unknown;
                }
            }
        }
    }

    fn track(&self, track: CurrentTrack) -> Option<&TrackState<S::Decoder>> {
        match track {
            CurrentTrack::Video => self.video.as_ref(),
            CurrentTrack::Audio => self.audio.as_ref(),
            CurrentTrack::Unmatched => None,
        }
    }

    fn track_mut(&mut self, track: CurrentTrack) -> Option<&mut TrackState<S::Decoder>> {
        match track {
            CurrentTrack::Video => self.video.as_mut(),
            CurrentTrack::Audio => self.audio.as_mut(),
            CurrentTrack::Unmatched => None,
        }
    }

    fn is_active(&self, track: CurrentTrack) -> bool {
        self.track(track)
            .map(|t| t.status == TrackStatus::Active)
            .unwrap_or(false)
    }

    /// 把包缓冲中的数据包送入解码器；需要立即返回时给出结果
    fn feed(&mut self, track: CurrentTrack, resends: u32) -> Option<GrabResult> {
        let state = match track {
            CurrentTrack::Video => self.video.as_mut()?,
            CurrentTrack::Audio => self.audio.as_mut()?,
            CurrentTrack::Unmatched => return None,
        };
        let index = state.index;

        match state.decoder.send_packet(&self.packet) {
            FeedStatus::Accepted => {
                self.pending = None;
                None
            }
            FeedStatus::NotReady => {
                // 保留包缓冲，取完帧后重送
                self.pending = Some(PendingPacket { track, resends });
                None
            }
            FeedStatus::Rejected(reason) => {
                state.status = TrackStatus::Disabled;
                self.pending = None;
                self.stats.feed_rejections += 1;
                error!(
                    "{}，该轨道不再输出帧",
                    PipelineError::DecodeFeedRejected { track: index, reason }
                );
                Some(GrabResult::Unknown)
            }
        }
    }

    fn resend(&mut self, pending: PendingPacket) -> Option<GrabResult> {
        if pending.resends >= self.config.max_packet_resends {
            warn!(
                "数据包重送 {} 次仍未被接收，丢弃（{:?} 轨道）",
                pending.resends, pending.track
            );
            self.pending = None;
            return None;
        }
        self.stats.packet_resends += 1;
        self.current = Some(pending.track);
        self.feed(pending.track, pending.resends + 1)
    }

    /// 从指定轨道的解码器取一帧，完成重采样与 PTS 对齐
    fn drain(&mut self, track: CurrentTrack, frame: &mut MediaFrame) -> Drain {
        let state = match track {
            CurrentTrack::Video => self.video.as_mut(),
            CurrentTrack::Audio => self.audio.as_mut(),
            CurrentTrack::Unmatched => None,
        };
        let Some(state) = state else {
            return Drain::Empty;
        };
        if state.status != TrackStatus::Active {
            return Drain::Empty;
        }

        match state.decoder.receive_frame(frame) {
            ReceiveStatus::Frame => {}
            ReceiveStatus::Again => return Drain::Empty,
            ReceiveStatus::EndOfStream => {
                debug!("轨道 #{} 解码器已结束", state.index);
                state.status = TrackStatus::Drained;
                return Drain::Empty;
            }
            ReceiveStatus::Failed(reason) => {
                warn!("轨道 #{} 取帧失败（已跳过）: {}", state.index, reason);
                return Drain::Empty;
            }
        }

        match track {
            CurrentTrack::Video => {
                frame.kind = MediaKind::Video;
                self.aligner.align_frame(frame, &state.timing);
                self.stats.video_frames += 1;
                Drain::Frame(GrabResult::Video)
            }
            _ => {
                frame.kind = MediaKind::Audio;
                if let Some(resampler) = self.resampler.as_mut() {
                    match resampler.resample(frame) {
                        ResampleOutcome::Converted(_) => {}
                        ResampleOutcome::PassedThrough => {
                            if resampler.is_active() {
                                self.stats.resample_failures += 1;
                            }
                        }
                        ResampleOutcome::Dropped => {
                            self.stats.resample_failures += 1;
                            return Drain::Dropped;
                        }
                    }
                }
                self.aligner.align_frame(frame, &state.timing);
                self.stats.audio_frames += 1;
                Drain::Frame(GrabResult::Audio)
            }
        }
    }

    /// 输入结束：通知所有活动解码器，进入冲刷阶段
    fn begin_flush(&mut self) {
        self.pending = None;
        for track in [CurrentTrack::Video, CurrentTrack::Audio] {
            if let Some(state) = self.track_mut(track) {
                if state.status != TrackStatus::Active {
                    continue;
                }
                match state.decoder.send_eof() {
                    FeedStatus::Accepted => debug!("轨道 #{} 开始冲刷", state.index),
                    FeedStatus::NotReady | FeedStatus::Rejected(_) => {
                        warn!("轨道 #{} 无法进入冲刷，剩余帧丢弃", state.index);
                        state.status = TrackStatus::Drained;
                    }
                }
            }
        }
        self.state = PipelineState::Flushing;
    }

    /// 先取完视频缓存帧，再取音频，全部取完后返回 EOF
    fn grab_flushing(&mut self, frame: &mut MediaFrame) -> GrabResult {
        for track in [CurrentTrack::Video, CurrentTrack::Audio] {
            loop {
                if !self.is_active(track) {
                    break;
                }
                self.current = Some(track);
                match self.drain(track, frame) {
                    Drain::Frame(result) => return result,
                    Drain::Dropped => continue,
                    Drain::Empty => {
                        // 冲刷阶段没有帧即视为该轨道结束
                        if let Some(state) = self.track_mut(track) {
                            state.status = TrackStatus::Drained;
                        }
                    }
                }
            }
        }

        self.state = PipelineState::Finished;
        info!(
            "🏁 解码结束: 视频 {} 帧, 音频 {} 帧",
            self.stats.video_frames, self.stats.audio_frames
        );
        GrabResult::Eof
    }

    /// 结束会话并释放所有资源，返回最终统计
    pub fn close(self) -> PipelineStats {
        self.stats
    }

    // ============= 查询接口 =============

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn selection(&self) -> TrackSelection {
        self.selection
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn output_time_base(&self) -> Rational {
        self.aligner.output_time_base()
    }

    pub fn width(&self) -> u32 {
        self.video_stream()
            .and_then(|s| s.video)
            .map(|v| v.width)
            .unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.video_stream()
            .and_then(|s| s.video)
            .map(|v| v.height)
            .unwrap_or(0)
    }

    pub fn channels(&self) -> u16 {
        self.audio_params.map(|p| p.channels).unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio_params.map(|p| p.sample_rate).unwrap_or(0)
    }

    /// 输出音频的采样格式（重采样后的格式，或解码器原生交错格式）
    pub fn output_sample_format(&self) -> SampleFormat {
        match &self.resampler {
            Some(resampler) if resampler.is_active() => resampler.output_format(),
            _ => self
                .audio_params
                .map(|p| p.sample_format)
                .unwrap_or_default(),
        }
    }

    /// 输出格式下单个采样的字节数
    pub fn bytes_per_sample(&self) -> usize {
        self.output_sample_format().bytes()
    }

    /// 一个完整解码帧的输出字节数（帧长 × 采样字节数 × 声道数）
    pub fn audio_frame_bytes(&self) -> usize {
        let frame_size = self.audio_params.map(|p| p.frame_size).unwrap_or(0);
        frame_size * self.bytes_per_sample() * self.channels() as usize
    }

    fn video_stream(&self) -> Option<&StreamDescriptor> {
        self.selection
            .video
            .and_then(|index| Self::stream(&self.source, index))
    }
}

impl<S: DemuxerSource> Drop for DecodePipeline<S> {
    fn drop(&mut self) {
        // 字段随后按声明顺序释放：包缓冲、重采样帧、解码器，最后关闭容器
        info!(
            "🛑 释放解码管线 {}: 读取 {} 包（跳过 {}），视频 {} 帧，音频 {} 帧，拒绝 {}，重送 {}，重采样失败 {}，读取失败 {}",
            self.source.description(),
            self.stats.packets_read,
            self.stats.packets_skipped,
            self.stats.video_frames,
            self.stats.audio_frames,
            self.stats.feed_rejections,
            self.stats.packet_resends,
            self.stats.resample_failures,
            self.stats.read_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        AudioParams, ResampleFailurePolicy, ResamplerConfig, ResamplerEngine, SampleLayout,
    };
    use crate::player::mock::{MockPacket, MockSource, MockStream, MOCK_CHANNEL_VALUES};

    fn config() -> PipelineConfig {
        PipelineConfig {
            prefer_hardware: false,
            resampler: ResamplerConfig {
                engine: ResamplerEngine::Native,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn av_source() -> MockSource {
        MockSource::new(vec![
            MockStream::video(0, "h264"),
            MockStream::audio(1, "aac"),
            MockStream::data(2),
        ])
    }

    fn packed_i32(frame: &MediaFrame) -> Vec<i32> {
        frame
            .plane(0)
            .chunks_exact(4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    /// 连续 grab 直到 EOF，返回结果序列
    fn grab_all<S: DemuxerSource>(pipeline: &mut DecodePipeline<S>) -> Vec<(GrabResult, Option<i64>)> {
        let mut frame = MediaFrame::empty();
        let mut results = Vec::new();
        for _ in 0..10_000 {
            let result = pipeline.grab(&mut frame);
            if result == GrabResult::Eof {
                return results;
            }
            results.push((result, frame.pts));
        }
        panic!("管线没有结束");
    }

    #[test]
    fn test_prepare_reports_stream_params() {
        let pipeline = DecodePipeline::prepare(av_source(), config()).unwrap();

        assert!(pipeline.has_video());
        assert!(pipeline.has_audio());
        assert_eq!(pipeline.selection().video, Some(0));
        assert_eq!(pipeline.selection().audio, Some(1));
        assert_eq!(pipeline.width(), 16);
        assert_eq!(pipeline.height(), 8);
        assert_eq!(pipeline.channels(), 2);
        assert_eq!(pipeline.sample_rate(), 48000);
        assert_eq!(pipeline.output_sample_format(), SampleFormat::I32(SampleLayout::Packed));
        assert_eq!(pipeline.bytes_per_sample(), 4);
        assert_eq!(pipeline.audio_frame_bytes(), 1024 * 4 * 2);
        assert_eq!(pipeline.output_time_base(), Rational::new(1, 1_000_000));
        assert_eq!(pipeline.state(), PipelineState::Running);
    }

    #[test]
    fn test_prepare_without_media_tracks() {
        let source = MockSource::new(vec![MockStream::data(0)]);
        assert!(matches!(
            DecodePipeline::prepare(source, config()),
            Err(PipelineError::NoMediaTracks)
        ));
    }

    #[test]
    fn test_prepare_fails_when_codec_missing() {
        let mut source = av_source();
        source.unregister_generic("aac");
        assert!(matches!(
            DecodePipeline::prepare(source, config()),
            Err(PipelineError::CodecNotFound { track: 1, .. })
        ));
    }

    #[test]
    fn test_prepare_rejects_invalid_config() {
        let mut config = config();
        config.output_time_base = Rational::new(0, 1);
        assert!(matches!(
            DecodePipeline::prepare(av_source(), config),
            Err(PipelineError::ConfigError(_))
        ));
    }

    fn broken_audio_source() -> MockSource {
        // 0 声道的平面格式无法建立转换
        MockSource::new(vec![MockStream::audio_with(
            0,
            "aac",
            AudioParams {
                sample_rate: 44100,
                channels: 0,
                channel_layout: 0,
                sample_format: SampleFormat::F32(SampleLayout::Planar),
                frame_size: 1024,
            },
        )])
    }

    #[test]
    fn test_resampler_init_failure_policy() {
        let mut strict = config();
        strict.resampler.on_failure = ResampleFailurePolicy::Strict;
        assert!(matches!(
            DecodePipeline::prepare(broken_audio_source(), strict),
            Err(PipelineError::ResamplerInitFailed(_))
        ));

        // 宽松策略下照常准备，输出解码器原生格式
        let pipeline = DecodePipeline::prepare(broken_audio_source(), config()).unwrap();
        assert_eq!(
            pipeline.output_sample_format(),
            SampleFormat::F32(SampleLayout::Planar)
        );
    }

    #[test]
    fn test_grab_routes_and_aligns() {
        let mut source = av_source();
        source.push_packet(2, 0);
        source.push_packet(0, 512);
        source.push_packet(1, 1024);

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();

        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(frame.kind, MediaKind::Video);
        assert_eq!(frame.pts, Some(40_000));
        assert_eq!(frame.plane(0).len(), 16 * 8);

        assert_eq!(pipeline.grab(&mut frame), GrabResult::Audio);
        assert_eq!(frame.kind, MediaKind::Audio);
        // 1024 / 48000 秒 = 21333.33 微秒
        assert_eq!(frame.pts, Some(21_333));
        assert_eq!(frame.sample_format, SampleFormat::I32(SampleLayout::Packed));
        assert_eq!(frame.plane_count(), 1);
        assert_eq!(frame.plane(0).len(), 1024 * 2 * 4);
        let samples = packed_i32(&frame);
        assert_eq!(samples[0], (MOCK_CHANNEL_VALUES[0] as f64 * 2_147_483_648.0) as i32);
        assert_eq!(samples[1], (MOCK_CHANNEL_VALUES[1] as f64 * 2_147_483_648.0) as i32);

        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);

        let stats = pipeline.stats();
        assert_eq!(stats.packets_read, 3);
        assert_eq!(stats.packets_skipped, 1);
        assert_eq!(stats.video_frames, 1);
        assert_eq!(stats.audio_frames, 1);
    }

    #[test]
    fn test_unmatched_packets_never_reach_decoders() {
        let mut source = MockSource::new(vec![
            MockStream::video(0, "h264"),
            MockStream::video(1, "hevc"),
            MockStream::audio(2, "aac"),
        ]);
        source.push_packet(1, 0);
        source.push_packet(7, 0);
        source.push_packet(2, 0);
        let log = source.log();

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let results = grab_all(&mut pipeline);
        assert_eq!(results, vec![(GrabResult::Audio, Some(0))]);
        assert_eq!(log.lock().accepted, vec![(2, Some(0))]);
        assert_eq!(pipeline.stats().packets_skipped, 2);
    }

    #[test]
    fn test_pts_passes_through_codec_time_base() {
        let mut source = av_source();
        source.set_codec_time_base(0, Rational::new(1, 25));
        // 640 / 12800 = 0.05 秒，在 1/25 下取整为 1
        source.push_packet(0, 640);

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(frame.pts, Some(40_000));
    }

    #[test]
    fn test_missing_pts_stays_missing() {
        let mut source = av_source();
        source.push(MockPacket {
            pts: None,
            ..MockPacket::new(0, 0)
        });
        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(frame.pts, None);
    }

    #[test]
    fn test_ten_second_clip_end_to_end() {
        const VIDEO_FRAMES: i64 = 250;
        const AUDIO_FRAMES: i64 = 469;
        const TOTAL_SAMPLES: usize = 480_000;

        let mut source = av_source();
        source.set_reorder_delay(2);
        source.set_codec_time_base(1, Rational::new(1, 48000));

        // 按时间交织两条轨道的数据包
        let (mut v, mut a) = (0i64, 0i64);
        while v < VIDEO_FRAMES || a < AUDIO_FRAMES {
            let video_first = a >= AUDIO_FRAMES
                || (v < VIDEO_FRAMES && v * 512 * 48000 <= a * 1024 * 12800);
            if video_first {
                source.push_packet(0, v * 512);
                v += 1;
            } else {
                let mut packet = MockPacket::new(1, a * 1024);
                if a == AUDIO_FRAMES - 1 {
                    packet = packet.samples(TOTAL_SAMPLES - 1024 * (AUDIO_FRAMES as usize - 1));
                }
                source.push(packet);
                a += 1;
            }
        }

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();
        let mut video_pts = Vec::new();
        let mut audio_samples = 0usize;
        let mut audio_frames = 0;
        loop {
            match pipeline.grab(&mut frame) {
                GrabResult::Video => video_pts.push(frame.pts.unwrap()),
                GrabResult::Audio => {
                    audio_frames += 1;
                    audio_samples += frame.samples;
                    assert_eq!(frame.plane(0).len(), frame.samples * 2 * 4);
                }
                GrabResult::Unknown => panic!("不应出现 Unknown"),
                GrabResult::Eof => break,
            }
        }

        assert_eq!(video_pts.len(), VIDEO_FRAMES as usize);
        assert!(video_pts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(video_pts[0], 0);
        assert_eq!(*video_pts.last().unwrap(), 9_960_000);
        assert_eq!(audio_frames, AUDIO_FRAMES);
        assert_eq!(audio_samples, TOTAL_SAMPLES);
        assert_eq!(pipeline.state(), PipelineState::Finished);
    }

    #[test]
    fn test_flush_recovers_buffered_frames() {
        let mut source = av_source();
        source.set_reorder_delay(2);
        for i in 0..5 {
            source.push_packet(0, i * 512);
        }
        let log = source.log();

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let results = grab_all(&mut pipeline);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(r, _)| *r == GrabResult::Video));
        assert_eq!(log.lock().eof_sent.len(), 2);
    }

    #[test]
    fn test_without_flush_buffered_frames_are_lost() {
        let mut source = av_source();
        source.set_reorder_delay(2);
        for i in 0..5 {
            source.push_packet(0, i * 512);
        }
        let mut config = config();
        config.flush_decoders_at_eof = false;

        let mut pipeline = DecodePipeline::prepare(source, config).unwrap();
        assert_eq!(grab_all(&mut pipeline).len(), 3);
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut pipeline = DecodePipeline::prepare(av_source(), config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);
    }

    #[test]
    fn test_read_failure_returns_unknown_and_continues() {
        let mut source = av_source();
        source.push_failure("I/O 错误");
        source.push_packet(0, 0);

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Unknown);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);
        assert_eq!(pipeline.stats().read_failures, 1);
    }

    #[test]
    fn test_rejected_packet_disables_track() {
        let mut source = av_source();
        source.push(MockPacket::new(1, 0).rejected());
        source.push_packet(1, 1024);
        source.push_packet(0, 0);
        let log = source.log();

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Unknown);
        // 音频轨道已停用，后续音频包被跳过，视频不受影响
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);

        let stats = pipeline.stats();
        assert_eq!(stats.feed_rejections, 1);
        assert_eq!(stats.audio_frames, 0);
        assert_eq!(stats.packets_skipped, 1);
        assert!(!log.lock().accepted.contains(&(1, Some(1024))));
    }

    #[test]
    fn test_not_ready_packet_is_resent() {
        let mut source = av_source();
        source.push(MockPacket::new(0, 512).busy(2));

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(frame.pts, Some(40_000));
        assert_eq!(pipeline.stats().packet_resends, 2);
    }

    #[test]
    fn test_resend_limit_drops_packet() {
        let mut source = av_source();
        source.push(MockPacket::new(0, 512).busy(100));
        source.push_packet(0, 1024);
        let mut config = config();
        config.max_packet_resends = 3;

        let mut pipeline = DecodePipeline::prepare(source, config).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(frame.pts, Some(80_000));
        assert_eq!(pipeline.stats().packet_resends, 3);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);
    }

    #[test]
    fn test_attempt_limit_bounds_single_grab() {
        let mut source = av_source();
        for i in 0..6 {
            source.push_packet(2, i);
        }
        source.push_packet(0, 0);
        let mut config = config();
        config.max_attempts_per_grab = Some(4);

        let mut pipeline = DecodePipeline::prepare(source, config).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Unknown);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Video);
        assert_eq!(pipeline.stats().packets_skipped, 6);
    }

    #[test]
    fn test_multiple_frames_per_packet() {
        let mut source = av_source();
        source.push(MockPacket::new(0, 0).frames(3));
        source.push_packet(1, 0);

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        let kinds: Vec<GrabResult> = grab_all(&mut pipeline).into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            kinds,
            vec![GrabResult::Video, GrabResult::Video, GrabResult::Video, GrabResult::Audio]
        );
    }

    #[test]
    fn test_oversized_audio_frame_counts_as_resample_failure() {
        let source = || {
            let mut source = MockSource::new(vec![MockStream::audio(0, "aac")]);
            source.push_packet(0, 0);
            source.push(MockPacket::new(0, 1024).samples(1100));
            source.push_packet(0, 2124);
            source
        };

        // 宽松策略：超长帧原样输出，不截断
        let mut pipeline = DecodePipeline::prepare(source(), config()).unwrap();
        let mut frame = MediaFrame::empty();
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Audio);
        assert_eq!(frame.sample_format, SampleFormat::I32(SampleLayout::Packed));
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Audio);
        assert_eq!(frame.sample_format, SampleFormat::F32(SampleLayout::Planar));
        assert_eq!(frame.samples, 1100);
        assert_eq!(frame.plane(1).len(), 1100 * 4);
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Audio);
        assert_eq!(frame.sample_format, SampleFormat::I32(SampleLayout::Packed));
        assert_eq!(pipeline.grab(&mut frame), GrabResult::Eof);
        assert_eq!(pipeline.stats().resample_failures, 1);

        // 严格策略：丢弃该帧
        let mut strict = config();
        strict.resampler.on_failure = ResampleFailurePolicy::Strict;
        let mut pipeline = DecodePipeline::prepare(source(), strict).unwrap();
        let results = grab_all(&mut pipeline);
        assert_eq!(results.len(), 2);
        assert_eq!(pipeline.stats().resample_failures, 1);
        assert_eq!(pipeline.stats().audio_frames, 2);
    }

    #[test]
    fn test_audio_only_source() {
        let mut source = MockSource::new(vec![MockStream::audio(0, "aac")]);
        source.push_packet(0, 0);
        source.push_packet(0, 1024);

        let mut pipeline = DecodePipeline::prepare(source, config()).unwrap();
        assert!(!pipeline.has_video());
        assert_eq!(pipeline.width(), 0);
        assert_eq!(pipeline.height(), 0);

        let results = grab_all(&mut pipeline);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(r, _)| *r == GrabResult::Audio));
    }

    #[test]
    fn test_video_only_source_has_no_audio_queries() {
        let pipeline =
            DecodePipeline::prepare(MockSource::new(vec![MockStream::video(0, "h264")]), config())
                .unwrap();
        assert!(!pipeline.has_audio());
        assert_eq!(pipeline.channels(), 0);
        assert_eq!(pipeline.sample_rate(), 0);
        assert_eq!(pipeline.audio_frame_bytes(), 0);
    }

    #[test]
    fn test_teardown_releases_decoders_before_source() {
        let source = av_source();
        let log = source.log();
        let pipeline = DecodePipeline::prepare(source, config()).unwrap();
        pipeline.close();

        assert_eq!(
            log.lock().dropped,
            vec![
                "decoder:h264".to_string(),
                "decoder:aac".to_string(),
                "source".to_string()
            ]
        );
    }
}
