use crate::core::{GrabResult, MediaFrame, PipelineError, PipelineStats, Result};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::pipeline::DecodePipeline;
use crossbeam_channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 播放线程命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Pause,
    Resume,
    Stop,
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
}

/// 播放线程退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndOfStream,
    /// 收到 Stop 命令（或控制端已释放）
    Stopped,
    /// 所有帧接收端都已关闭
    Disconnected,
    /// 连续多次 grab 没有产出帧
    TooManyUnknown,
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// 视频帧通道容量（满时阻塞，形成背压）
    pub video_capacity: usize,
    pub audio_capacity: usize,
    /// 连续 Unknown 达到该次数后停止
    pub max_consecutive_unknown: u32,
    /// 通道满时每次等待的时长，期间会检查命令
    pub send_timeout: Duration,
    pub start_paused: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            video_capacity: 8,
            audio_capacity: 32,
            max_consecutive_unknown: 64,
            send_timeout: Duration::from_millis(50),
            start_paused: false,
        }
    }
}

/// 播放线程结束时的汇总
#[derive(Debug, Clone, Default)]
pub struct PlaybackSummary {
    pub reason: StopReason,
    pub video_frames: u64,
    pub audio_frames: u64,
    pub unknown_results: u64,
    pub pipeline: PipelineStats,
}

/// 命令处理结果
enum Control {
    Continue,
    Stop,
}

/// 播放线程：在独立线程中循环 grab，把帧拷贝到有界通道
pub struct PlaybackWorker {
    thread_handle: Option<JoinHandle<PlaybackSummary>>,
    command_tx: Sender<PlaybackCommand>,
    state: Arc<Mutex<PlayState>>,

    // 帧接收端，可通过 take_receivers 取出
    pub video_frames: Option<Receiver<MediaFrame>>,
    pub audio_frames: Option<Receiver<MediaFrame>>,
}

impl PlaybackWorker {
    /// 启动播放线程，管线的所有权移入线程
    pub fn start<S>(pipeline: DecodePipeline<S>, config: PlaybackConfig) -> Self
    where
        S: DemuxerSource + 'static,
    {
        let (command_tx, command_rx) = unbounded::<PlaybackCommand>();
        let (video_tx, video_rx) = bounded::<MediaFrame>(config.video_capacity);
        let (audio_tx, audio_rx) = bounded::<MediaFrame>(config.audio_capacity);

        let initial = if config.start_paused {
            PlayState::Paused
        } else {
            PlayState::Playing
        };
        let state = Arc::new(Mutex::new(initial));
        let thread_state = Arc::clone(&state);

        let thread_handle = thread::spawn(move || {
            let mut worker = LoopState {
                command_rx,
                state: thread_state,
                video_tx: Some(video_tx),
                audio_tx: Some(audio_tx),
                config,
                summary: PlaybackSummary::default(),
                consecutive_unknown: 0,
            };
            worker.run(pipeline)
        });

        Self {
            thread_handle: Some(thread_handle),
            command_tx,
            state,
            video_frames: Some(video_rx),
            audio_frames: Some(audio_rx),
        }
    }

    pub fn state(&self) -> PlayState {
        *self.state.lock()
    }

    pub fn pause(&self) -> Result<()> {
        self.send(PlaybackCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(PlaybackCommand::Resume)
    }

    fn send(&self, command: PlaybackCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| PipelineError::Other(format!("发送 {:?} 命令失败: {}", command, e)))
    }

    /// 取出帧接收端（视频, 音频）
    pub fn take_receivers(&mut self) -> Option<(Receiver<MediaFrame>, Receiver<MediaFrame>)> {
        Some((self.video_frames.take()?, self.audio_frames.take()?))
    }

    /// 等待播放线程自然结束
    pub fn join(mut self) -> Result<PlaybackSummary> {
        self.wait()
    }

    /// 停止播放线程并等待其退出
    pub fn stop(mut self) -> Result<PlaybackSummary> {
        info!("{} 🛑 PlaybackWorker::stop() called", log_ctx());
        let _ = self.command_tx.send(PlaybackCommand::Stop);
        // 未取出的接收端直接释放，避免线程阻塞在发送上
        self.video_frames.take();
        self.audio_frames.take();
        self.wait()
    }

    fn wait(&mut self) -> Result<PlaybackSummary> {
        let handle = self
            .thread_handle
            .take()
            .ok_or_else(|| PipelineError::Other("播放线程已结束".to_string()))?;
        handle
            .join()
            .map_err(|_| PipelineError::Other("播放线程 panic".to_string()))
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            warn!("{} ⚠ PlaybackWorker 被 drop，但未调用 stop()，正在尝试优雅停止", log_ctx());
            let _ = self.command_tx.send(PlaybackCommand::Stop);
            self.video_frames.take();
            self.audio_frames.take();
            let _ = handle.join();
        }
    }
}

/// 播放线程内部状态
struct LoopState {
    command_rx: Receiver<PlaybackCommand>,
    state: Arc<Mutex<PlayState>>,
    video_tx: Option<Sender<MediaFrame>>,
    audio_tx: Option<Sender<MediaFrame>>,
    config: PlaybackConfig,
    summary: PlaybackSummary,
    consecutive_unknown: u32,
}

impl LoopState {
    fn run<S: DemuxerSource>(&mut self, mut pipeline: DecodePipeline<S>) -> PlaybackSummary {
        info!("{} ▶ 播放线程启动", log_ctx());
        let mut frame = MediaFrame::empty();

        let reason = loop {
            if let Control::Stop = self.poll_commands() {
                break StopReason::Stopped;
            }
            if *self.state.lock() == PlayState::Paused {
                // 暂停时阻塞等待命令
                if let Control::Stop = self.wait_command() {
                    break StopReason::Stopped;
                }
                continue;
            }

            let result = pipeline.grab(&mut frame);
            match result {
                GrabResult::Video | GrabResult::Audio => {
                    self.consecutive_unknown = 0;
                    if result == GrabResult::Video {
                        self.summary.video_frames += 1;
                    } else {
                        self.summary.audio_frames += 1;
                    }
                    if let Some(reason) = self.deliver(result, &frame) {
                        break reason;
                    }
                }
                GrabResult::Unknown => {
                    self.summary.unknown_results += 1;
                    self.consecutive_unknown += 1;
                    if self.consecutive_unknown >= self.config.max_consecutive_unknown {
                        error!(
                            "{} ❌ 连续 {} 次未取得帧，停止播放",
                            log_ctx(),
                            self.consecutive_unknown
                        );
                        break StopReason::TooManyUnknown;
                    }
                }
                GrabResult::Eof => break StopReason::EndOfStream,
            }
        };

        *self.state.lock() = PlayState::Stopped;
        self.summary.reason = reason;
        self.summary.pipeline = pipeline.close();
        info!(
            "{} 🛑 播放线程退出（{:?}）：视频 {} 帧，音频 {} 帧，Unknown {} 次",
            log_ctx(),
            reason,
            self.summary.video_frames,
            self.summary.audio_frames,
            self.summary.unknown_results
        );
        // 发送端随 LoopState 一起释放，接收端的 recv() 随之返回 Err
        std::mem::take(&mut self.summary)
    }

    fn apply(&mut self, command: PlaybackCommand) -> Control {
        debug!("{} 收到命令: {:?}", log_ctx(), command);
        match command {
            PlaybackCommand::Pause => {
                *self.state.lock() = PlayState::Paused;
                Control::Continue
            }
            PlaybackCommand::Resume => {
                *self.state.lock() = PlayState::Playing;
                Control::Continue
            }
            PlaybackCommand::Stop => Control::Stop,
        }
    }

    fn poll_commands(&mut self) -> Control {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => {
                    if let Control::Stop = self.apply(command) {
                        return Control::Stop;
                    }
                }
                Err(TryRecvError::Empty) => return Control::Continue,
                // 控制端已释放
                Err(TryRecvError::Disconnected) => return Control::Stop,
            }
        }
    }

    fn wait_command(&mut self) -> Control {
        match self.command_rx.recv() {
            Ok(command) => self.apply(command),
            Err(_) => Control::Stop,
        }
    }

    /// 把帧拷贝到对应通道；通道满时等待，期间仍响应 Stop
    fn deliver(&mut self, kind: GrabResult, frame: &MediaFrame) -> Option<StopReason> {
        let mut pending = frame.clone();
        loop {
            let slot = match kind {
                GrabResult::Video => &mut self.video_tx,
                _ => &mut self.audio_tx,
            };
            let Some(tx) = slot.as_ref() else {
                // 该类型的接收端已关闭，丢弃
                return None;
            };

            match tx.send_timeout(pending, self.config.send_timeout) {
                Ok(()) => return None,
                Err(SendTimeoutError::Timeout(back)) => {
                    pending = back;
                    if let Control::Stop = self.poll_commands() {
                        return Some(StopReason::Stopped);
                    }
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    warn!("{} {:?} 帧接收端已关闭", log_ctx(), kind);
                    slot.take();
                    if self.video_tx.is_none() && self.audio_tx.is_none() {
                        return Some(StopReason::Disconnected);
                    }
                    return None;
                }
            }
        }
    }
}
