use crate::core::{MediaFrame, Rational};

/// 将 `value` 从时间基 `from` 换算到 `to`，四舍五入（.5 远离零）
///
/// 结果与 FFmpeg `av_rescale_q_rnd(.., AV_ROUND_NEAR_INF)` 一致，但不依赖 FFmpeg，
/// 模拟后端的测试也能用。时间基无效或结果超出 i64 时返回 None。
pub fn rescale_near_inf(value: i64, from: Rational, to: Rational) -> Option<i64> {
    if !from.is_valid() || !to.is_valid() {
        return None;
    }
    let b = from.num as i128 * to.den as i128;
    let c = to.num as i128 * from.den as i128;
    let r = c / 2;

    let magnitude = (value as i128).abs();
    let scaled = (magnitude * b + r) / c;
    let signed = if value < 0 { -scaled } else { scaled };
    i64::try_from(signed).ok()
}

/// 某条轨道的时间基
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackTiming {
    pub stream: Rational,
    /// 解码器时间基，未设置时直接使用流时间基
    pub codec: Option<Rational>,
}

impl TrackTiming {
    pub fn new(stream: Rational, codec: Option<Rational>) -> Self {
        Self {
            stream,
            codec: codec.filter(|tb| tb.is_valid()),
        }
    }
}

/// PTS 对齐：流时间基 → 解码器时间基 → 统一输出时间基
#[derive(Debug, Clone, Copy)]
pub struct PtsAligner {
    output: Rational,
}

impl PtsAligner {
    pub fn new(output: Rational) -> Self {
        Self { output }
    }

    pub fn output_time_base(&self) -> Rational {
        self.output
    }

    pub fn align(&self, pts: Option<i64>, timing: &TrackTiming) -> Option<i64> {
        let pts = pts?;
        let codec = timing.codec.unwrap_or(timing.stream);
        let in_codec = rescale_near_inf(pts, timing.stream, codec)?;
        rescale_near_inf(in_codec, codec, self.output)
    }

    pub fn align_frame(&self, frame: &mut MediaFrame, timing: &TrackTiming) {
        frame.pts = self.align(frame.pts, timing);
    }
}
