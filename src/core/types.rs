use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::sample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 有理数时间基（单位时长 = num / den 秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 分子分母均为正数时才可用于时间戳换算
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Rational {
    type Err = String;

    /// 解析 "num/den" 形式
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, den) = s
            .split_once('/')
            .ok_or_else(|| format!("时间基格式应为 num/den: {}", s))?;
        let num: i32 = num.trim().parse().map_err(|e| format!("分子无效 {}: {}", num, e))?;
        let den: i32 = den.trim().parse().map_err(|e| format!("分母无效 {}: {}", den, e))?;
        let rational = Rational::new(num, den);
        if !rational.is_valid() {
            return Err(format!("时间基必须为正数: {}", s));
        }
        Ok(rational)
    }
}

impl From<ffmpeg::Rational> for Rational {
    fn from(r: ffmpeg::Rational) -> Self {
        Self::new(r.numerator(), r.denominator())
    }
}

impl From<Rational> for ffmpeg::Rational {
    fn from(r: Rational) -> Self {
        ffmpeg::Rational::new(r.num, r.den)
    }
}

/// 流的媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    #[default]
    Other,
}

impl MediaKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Other => "unknown",
        }
    }
}

impl From<ffmpeg::media::Type> for MediaKind {
    fn from(t: ffmpeg::media::Type) -> Self {
        match t {
            ffmpeg::media::Type::Video => MediaKind::Video,
            ffmpeg::media::Type::Audio => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }
}

/// 像素格式（解码器原生输出，不做颜色转换）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    RGB,
    YUV420P,
    YUV422P,
    YUV444P,
    NV12,
    #[default]
    Other,
}

impl From<ffmpeg::format::Pixel> for PixelFormat {
    fn from(p: ffmpeg::format::Pixel) -> Self {
        use ffmpeg::format::Pixel;
        match p {
            Pixel::RGBA => PixelFormat::RGBA,
            Pixel::RGB24 => PixelFormat::RGB,
            Pixel::YUV420P => PixelFormat::YUV420P,
            Pixel::YUV422P => PixelFormat::YUV422P,
            Pixel::YUV444P => PixelFormat::YUV444P,
            Pixel::NV12 => PixelFormat::NV12,
            _ => PixelFormat::Other,
        }
    }
}

/// 采样存储方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
    /// 交错存储（所有声道在同一缓冲区）
    Packed,
    /// 平面存储（每个声道独立缓冲区）
    Planar,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    #[default]
    None,
    U8(SampleLayout),
    I16(SampleLayout),
    I32(SampleLayout),
    I64(SampleLayout),
    F32(SampleLayout),
    F64(SampleLayout),
}

impl SampleFormat {
    pub fn layout(&self) -> Option<SampleLayout> {
        match *self {
            SampleFormat::None => None,
            SampleFormat::U8(l)
            | SampleFormat::I16(l)
            | SampleFormat::I32(l)
            | SampleFormat::I64(l)
            | SampleFormat::F32(l)
            | SampleFormat::F64(l) => Some(l),
        }
    }

    pub fn is_planar(&self) -> bool {
        self.layout() == Some(SampleLayout::Planar)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::F32(_) | SampleFormat::F64(_))
    }

    /// 对应的交错格式
    pub fn packed(&self) -> Self {
        self.with_layout(SampleLayout::Packed)
    }

    pub fn with_layout(&self, layout: SampleLayout) -> Self {
        match self {
            SampleFormat::None => SampleFormat::None,
            SampleFormat::U8(_) => SampleFormat::U8(layout),
            SampleFormat::I16(_) => SampleFormat::I16(layout),
            SampleFormat::I32(_) => SampleFormat::I32(layout),
            SampleFormat::I64(_) => SampleFormat::I64(layout),
            SampleFormat::F32(_) => SampleFormat::F32(layout),
            SampleFormat::F64(_) => SampleFormat::F64(layout),
        }
    }

    /// 单个采样的字节数
    pub fn bytes(&self) -> usize {
        match self {
            SampleFormat::None => 0,
            SampleFormat::U8(_) => 1,
            SampleFormat::I16(_) => 2,
            SampleFormat::I32(_) | SampleFormat::F32(_) => 4,
            SampleFormat::I64(_) | SampleFormat::F64(_) => 8,
        }
    }
}

impl From<sample::Type> for SampleLayout {
    fn from(t: sample::Type) -> Self {
        match t {
            sample::Type::Packed => SampleLayout::Packed,
            sample::Type::Planar => SampleLayout::Planar,
        }
    }
}

impl From<SampleLayout> for sample::Type {
    fn from(l: SampleLayout) -> Self {
        match l {
            SampleLayout::Packed => sample::Type::Packed,
            SampleLayout::Planar => sample::Type::Planar,
        }
    }
}

impl From<ffmpeg::format::Sample> for SampleFormat {
    fn from(s: ffmpeg::format::Sample) -> Self {
        use ffmpeg::format::Sample;
        match s {
            Sample::None => SampleFormat::None,
            Sample::U8(t) => SampleFormat::U8(t.into()),
            Sample::I16(t) => SampleFormat::I16(t.into()),
            Sample::I32(t) => SampleFormat::I32(t.into()),
            Sample::I64(t) => SampleFormat::I64(t.into()),
            Sample::F32(t) => SampleFormat::F32(t.into()),
            Sample::F64(t) => SampleFormat::F64(t.into()),
        }
    }
}

impl From<SampleFormat> for ffmpeg::format::Sample {
    fn from(s: SampleFormat) -> Self {
        use ffmpeg::format::Sample;
        match s {
            SampleFormat::None => Sample::None,
            SampleFormat::U8(l) => Sample::U8(l.into()),
            SampleFormat::I16(l) => Sample::I16(l.into()),
            SampleFormat::I32(l) => Sample::I32(l.into()),
            SampleFormat::I64(l) => Sample::I64(l.into()),
            SampleFormat::F32(l) => Sample::F32(l.into()),
            SampleFormat::F64(l) => Sample::F64(l.into()),
        }
    }
}

/// 视频流参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

/// 音频流 / 音频解码器参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,    // 声道布局位掩码，0 表示未知
    pub sample_format: SampleFormat,
    pub frame_size: usize,      // 每帧采样数，0 表示可变
}

/// 流描述（容器打开后不再变化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    pub time_base: Rational,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
}

/// grab 的结果标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabResult {
    Video,
    Audio,
    Unknown,
    Eof,
}

/// 解码后的帧
///
/// 管线会在每次 grab 时覆盖同一个帧对象的缓冲区，调用者需要在下一次
/// grab 之前拷贝出所需的数据。
#[derive(Debug, Clone, Default)]
pub struct MediaFrame {
    pub kind: MediaKind,
    pub pts: Option<i64>,       // 对齐后为输出时间基下的时间戳

    // 视频
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,

    // 音频
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,
    pub samples: usize,         // 每声道采样数
    pub sample_format: SampleFormat,

    /// 每个平面的数据（交错音频只有一个平面）
    pub planes: Vec<Vec<u8>>,
    pub strides: Vec<usize>,
}

impl MediaFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 调整平面数量，保留已有平面的分配
    pub fn set_plane_count(&mut self, count: usize) {
        self.planes.resize_with(count, Vec::new);
        self.strides.resize(count, 0);
    }

    /// 覆盖写入某个平面（复用原有内存）
    pub fn write_plane(&mut self, index: usize, bytes: &[u8], stride: usize) {
        if index >= self.planes.len() {
            self.set_plane_count(index + 1);
        }
        let plane = &mut self.planes[index];
        plane.clear();
        plane.extend_from_slice(bytes);
        self.strides[index] = stride;
    }

    pub fn plane(&self, index: usize) -> &[u8] {
        self.planes.get(index).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }
}

/// 管线运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub packets_read: u64,
    pub packets_skipped: u64,
    pub video_frames: u64,
    pub audio_frames: u64,
    pub feed_rejections: u64,
    pub packet_resends: u64,
    pub resample_failures: u64,
    pub read_failures: u64,
}
