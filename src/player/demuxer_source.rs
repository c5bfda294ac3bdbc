use crate::core::{AudioParams, MediaFrame, MediaKind, Rational, Result, StreamDescriptor};

/// 读包结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 读到一个数据包，携带其所属流索引
    Packet(usize),
    /// 输入结束
    EndOfInput,
    /// 其他读取错误
    Failed(String),
}

/// 向解码器送包的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Accepted,
    /// 解码器需要先取走已解码的帧（EAGAIN）
    NotReady,
    /// 不可恢复：解码器状态无效、内存不足或已收到结束信号
    Rejected(String),
}

/// 从解码器取帧的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveStatus {
    Frame,
    /// 需要更多输入
    Again,
    EndOfStream,
    Failed(String),
}

/// 解析得到的候选解码器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderCandidate {
    pub name: String,
    pub kind: MediaKind,
    /// 来自硬件优先列表
    pub hardware: bool,
}

/// 可复用的数据包缓冲区
pub trait PacketSlot {
    /// 释放上一次读入的内容，之后不得再引用其中的数据
    fn unref(&mut self);
}

/// 单条轨道的解码器状态机（send / receive 语义）
pub trait TrackDecoder: Send {
    type Packet;

    fn name(&self) -> &str;

    fn send_packet(&mut self, packet: &Self::Packet) -> FeedStatus;

    /// 通知解码器输入结束，之后可以取出缓存的剩余帧
    fn send_eof(&mut self) -> FeedStatus;

    /// 取出一帧写入 `frame`，复用其缓冲区
    fn receive_frame(&mut self, frame: &mut MediaFrame) -> ReceiveStatus;

    /// 解码器内部时间基，未设置时返回 None
    fn time_base(&self) -> Option<Rational>;

    /// 打开后的音频参数（视频解码器返回 None）
    fn audio_params(&self) -> Option<AudioParams>;
}

/// 解封装数据源
///
/// 除了读包之外也负责按名称 / 编码格式解析解码器，并用对应流的参数
/// 打开解码器，因为只有数据源持有完整的流参数（extradata 等）。
pub trait DemuxerSource: Send {
    type Packet: PacketSlot + Send;
    type Decoder: TrackDecoder<Packet = Self::Packet>;

    /// 按索引顺序排列的流描述
    fn streams(&self) -> &[StreamDescriptor];

    fn alloc_packet(&self) -> Self::Packet;

    /// 读取下一个数据包到 `packet`（调用前应先 unref）
    fn read_packet(&mut self, packet: &mut Self::Packet) -> ReadOutcome;

    /// 按名称查找解码器（用于硬件解码器）
    fn resolve_named(&self, name: &str) -> Option<DecoderCandidate>;

    /// 查找该流编码格式注册的通用解码器
    fn resolve_generic(&self, stream: &StreamDescriptor) -> Option<DecoderCandidate>;

    fn open_decoder(&self, candidate: &DecoderCandidate, track: usize) -> Result<Self::Decoder>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
