use crate::core::{
    AudioParams, MediaFrame, PipelineError, ResampleFailurePolicy, ResamplerConfig,
    ResamplerEngine, Result, SampleFormat, SampleLayout,
};
use crate::player::decoder::{audio_plane, audio_plane_mut};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{software, util};
use log::{debug, info, warn};

/// 平面采样 → 交错采样的转换器
pub trait SampleConverter: Send {
    fn name(&self) -> &'static str;

    /// 把 `planes` 中每个声道的前 `samples` 个采样交错写入 `dst`，返回写入的采样数
    fn convert(&mut self, planes: &[Vec<u8>], samples: usize, dst: &mut [u8]) -> Result<usize>;
}

/// 单帧重采样结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleOutcome {
    Converted(usize),
    /// 没有可用的转换器或转换失败，帧原样输出
    PassedThrough,
    /// 转换失败且策略为 strict，调用方应丢弃该帧
    Dropped,
}

/// 音频重采样器：仅在解码器输出平面格式时启用
pub struct Resampler {
    input: AudioParams,
    output_format: SampleFormat,
    capacity: usize,
    target: Vec<u8>,    // 预分配的一帧输出缓冲，整个会话内不再重新分配
    converter: Option<Box<dyn SampleConverter>>,
    policy: ResampleFailurePolicy,
}

impl Resampler {
    /// 选择适合播放的交错格式：浮点转为 32 位定点，其余取对应交错格式
    pub fn output_format_for(input: SampleFormat) -> SampleFormat {
        match input.packed() {
            SampleFormat::F32(_) | SampleFormat::F64(_) => SampleFormat::I32(SampleLayout::Packed),
            packed => packed,
        }
    }

    pub fn is_needed(params: &AudioParams) -> bool {
        params.sample_format.is_planar()
    }

    pub fn new(params: &AudioParams, config: &ResamplerConfig) -> Result<Self> {
        let output_format = Self::output_format_for(params.sample_format);
        let capacity = if params.frame_size > 0 {
            params.frame_size
        } else {
            config.fallback_frame_size
        };
        let channels = params.channels as usize;
        let target = vec![0u8; capacity * channels * output_format.bytes()];

        info!(
            "🔧 初始化音频重采样器: {:?}/{}ch/{}Hz → {:?}/{}ch/{}Hz, 帧容量 {}",
            params.sample_format,
            params.channels,
            params.sample_rate,
            output_format,
            params.channels,
            params.sample_rate,
            capacity
        );

        let built = match config.engine {
            ResamplerEngine::Swr => SwrConverter::new(params, output_format, capacity)
                .map(|c| Box::new(c) as Box<dyn SampleConverter>),
            ResamplerEngine::Native => NativeConverter::new(params, output_format)
                .map(|c| Box::new(c) as Box<dyn SampleConverter>),
        };

        let converter = match built {
            Ok(converter) => Some(converter),
            Err(e) => {
                let err = PipelineError::ResamplerInitFailed(e.to_string());
                match config.on_failure {
                    ResampleFailurePolicy::Strict => return Err(err),
                    ResampleFailurePolicy::PassThrough => {
                        warn!("{}，平面音频帧将原样输出", err);
                        None
                    }
                }
            }
        };

        Ok(Self {
            input: *params,
            output_format,
            capacity,
            target,
            converter,
            policy: config.on_failure,
        })
    }

    pub fn output_format(&self) -> SampleFormat {
        self.output_format
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 是否有可用的转换器（初始化失败后为 false）
    pub fn is_active(&self) -> bool {
        self.converter.is_some()
    }

    /// 就地把平面音频帧转换为交错格式
    pub fn resample(&mut self, frame: &mut MediaFrame) -> ResampleOutcome {
        let Some(converter) = self.converter.as_mut() else {
            return ResampleOutcome::PassedThrough;
        };

        let result = if frame.sample_format != self.input.sample_format
            || frame.channels != self.input.channels
        {
            Err(PipelineError::ResampleFailed(format!(
                "帧格式 {:?}/{}ch 与解码器参数 {:?}/{}ch 不一致",
                frame.sample_format, frame.channels, self.input.sample_format, self.input.channels
            )))
        } else if frame.samples > self.capacity {
            // 目标缓冲不会重新分配，超长帧按转换失败处理
            Err(PipelineError::ResampleFailed(format!(
                "帧长 {} 超过预分配容量 {}",
                frame.samples, self.capacity
            )))
        } else {
            converter.convert(&frame.planes, frame.samples, &mut self.target)
        };

        match result {
            Ok(converted) => {
                let bytes = converted * self.input.channels as usize * self.output_format.bytes();
                frame.set_plane_count(1);
                frame.write_plane(0, &self.target[..bytes], bytes);
                frame.sample_format = self.output_format;
                frame.samples = converted;
                debug!(
                    "重采样: {:?} → {:?}, {} 采样",
                    self.input.sample_format, self.output_format, converted
                );
                ResampleOutcome::Converted(converted)
            }
            Err(e) => {
                warn!("重采样失败（{}）: {}", converter.name(), e);
                match self.policy {
                    ResampleFailurePolicy::PassThrough => ResampleOutcome::PassedThrough,
                    ResampleFailurePolicy::Strict => ResampleOutcome::Dropped,
                }
            }
        }
    }
}

// ============= FFmpeg libswresample =============

/// 基于 libswresample 的转换器，复用预分配的输入 / 输出帧
struct SwrConverter {
    context: software::resampling::Context,
    input: util::frame::Audio,
    output: util::frame::Audio,
    in_bytes: usize,
    out_bytes: usize,
    channels: usize,
    capacity: usize,
}

// SwrContext 本身不是 Send，但我们确保只在单个线程中使用它
// 管线不可重入，每个转换器实例同一时刻只会被一个线程访问
unsafe impl Send for SwrConverter {}

impl SwrConverter {
    fn new(params: &AudioParams, output_format: SampleFormat, capacity: usize) -> Result<Self> {
        let layout = if params.channel_layout != 0 {
            util::channel_layout::ChannelLayout::from_bits_truncate(params.channel_layout)
        } else {
            util::channel_layout::ChannelLayout::default(params.channels as i32)
        };
        let in_format: ffmpeg::format::Sample = params.sample_format.into();
        let out_format: ffmpeg::format::Sample = output_format.into();

        // 目标: (布局, 格式, 采样率) ← 源: (布局, 格式, 采样率)，只改变格式
        let context = software::resampling::Context::get(
            in_format,
            layout,
            params.sample_rate,
            out_format,
            layout,
            params.sample_rate,
        )?;

        let mut input = util::frame::Audio::new(in_format, capacity, layout);
        input.set_rate(params.sample_rate);
        let mut output = util::frame::Audio::new(out_format, capacity, layout);
        output.set_rate(params.sample_rate);

        Ok(Self {
            context,
            input,
            output,
            in_bytes: params.sample_format.bytes(),
            out_bytes: output_format.bytes(),
            channels: params.channels as usize,
            capacity,
        })
    }
}

impl SampleConverter for SwrConverter {
    fn name(&self) -> &'static str {
        "swresample"
    }

    fn convert(&mut self, planes: &[Vec<u8>], samples: usize, dst: &mut [u8]) -> Result<usize> {
        let samples = samples.min(self.capacity);
        let plane_bytes = samples * self.in_bytes;
        if planes.len() < self.channels || planes.iter().any(|p| p.len() < plane_bytes) {
            return Err(PipelineError::ResampleFailed(format!(
                "输入平面不足: 需要 {} 个平面, 每个 {} 字节",
                self.channels, plane_bytes
            )));
        }

        self.input.set_samples(samples);
        for (ch, plane) in planes.iter().take(self.channels).enumerate() {
            let target = audio_plane_mut(&mut self.input, ch, plane_bytes);
            if target.len() < plane_bytes {
                return Err(PipelineError::ResampleFailed(format!("输入帧平面 {} 未分配", ch)));
            }
            target.copy_from_slice(&plane[..plane_bytes]);
        }

        // swr_convert_frame 以输出帧的 nb_samples 作为容量
        self.output.set_samples(self.capacity);
        self.context.run(&self.input, &mut self.output)?;

        let converted = self.output.samples();
        let bytes = converted * self.channels * self.out_bytes;
        if dst.len() < bytes {
            return Err(PipelineError::ResampleFailed(format!(
                "目标缓冲不足: {} < {}",
                dst.len(),
                bytes
            )));
        }
        let packed = audio_plane(&self.output, 0, bytes);
        if packed.len() < bytes {
            return Err(PipelineError::ResampleFailed("输出帧未分配".to_string()));
        }
        dst[..bytes].copy_from_slice(packed);
        Ok(converted)
    }
}

// ============= 内置交错转换 =============

/// 纯 Rust 的平面 → 交错转换，不改变采样率与声道布局
pub struct NativeConverter {
    input: SampleFormat,
    output: SampleFormat,
    channels: usize,
}

impl NativeConverter {
    pub fn new(params: &AudioParams, output: SampleFormat) -> Result<Self> {
        let input = params.sample_format;
        let supported = output == input.packed()
            || (input.is_float() && output == SampleFormat::I32(SampleLayout::Packed));
        if !input.is_planar() || !supported || params.channels == 0 {
            return Err(PipelineError::ResamplerInitFailed(format!(
                "不支持的转换: {:?}/{}ch → {:?}",
                input, params.channels, output
            )));
        }
        Ok(Self {
            input,
            output,
            channels: params.channels as usize,
        })
    }

    fn write_sample(&self, src: &[u8], dst: &mut [u8]) {
        match (self.input, self.output) {
            (SampleFormat::F32(_), SampleFormat::I32(_)) => {
                let v: f32 = bytemuck::pod_read_unaligned(src);
                dst.copy_from_slice(bytemuck::bytes_of(&float_to_s32(v as f64)));
            }
            (SampleFormat::F64(_), SampleFormat::I32(_)) => {
                let v: f64 = bytemuck::pod_read_unaligned(src);
                dst.copy_from_slice(bytemuck::bytes_of(&float_to_s32(v)));
            }
            // 同类型只需交错
            _ => dst.copy_from_slice(src),
        }
    }
}

/// 与 libswresample 一致：乘以 2^31 后取最近整数并饱和
fn float_to_s32(v: f64) -> i32 {
    let scaled = (v * 2_147_483_648.0).round();
    scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

impl SampleConverter for NativeConverter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn convert(&mut self, planes: &[Vec<u8>], samples: usize, dst: &mut [u8]) -> Result<usize> {
        let in_bytes = self.input.bytes();
        let out_bytes = self.output.bytes();
        if planes.len() < self.channels || planes.iter().any(|p| p.len() < samples * in_bytes) {
            return Err(PipelineError::ResampleFailed(format!(
                "输入平面不足: 需要 {} 个平面, 每个 {} 字节",
                self.channels,
                samples * in_bytes
            )));
        }
        if dst.len() < samples * self.channels * out_bytes {
            return Err(PipelineError::ResampleFailed("目标缓冲不足".to_string()));
        }

        for s in 0..samples {
            for (ch, plane) in planes.iter().take(self.channels).enumerate() {
                let src = &plane[s * in_bytes..(s + 1) * in_bytes];
                let offset = (s * self.channels + ch) * out_bytes;
                self.write_sample(src, &mut dst[offset..offset + out_bytes]);
            }
        }
        Ok(samples)
    }
}
