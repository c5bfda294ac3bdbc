use crate::core::{MediaKind, PipelineError, Result, StreamDescriptor};
use log::debug;

/// 数据包所属的轨道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentTrack {
    Video,
    Audio,
    /// 不属于任何已选轨道
    Unmatched,
}

/// 选中的视频 / 音频轨道索引（各至多一个）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSelection {
    pub video: Option<usize>,
    pub audio: Option<usize>,
}

impl TrackSelection {
    /// 按索引顺序扫描，记录第一个视频流和第一个音频流
    pub fn select(streams: &[StreamDescriptor]) -> Result<Self> {
        let mut selection = TrackSelection::default();

        for stream in streams {
            match stream.kind {
                MediaKind::Video if selection.video.is_none() => {
                    selection.video = Some(stream.index);
                }
                MediaKind::Audio if selection.audio.is_none() => {
                    selection.audio = Some(stream.index);
                }
                _ => {}
            }
        }

        if selection.video.is_none() && selection.audio.is_none() {
            return Err(PipelineError::NoMediaTracks);
        }

        debug!("视频轨道索引: {:?}", selection.video);
        debug!("音频轨道索引: {:?}", selection.audio);
        Ok(selection)
    }

    pub fn route(&self, stream_index: usize) -> CurrentTrack {
        if Some(stream_index) == self.video {
            CurrentTrack::Video
        } else if Some(stream_index) == self.audio {
            CurrentTrack::Audio
        } else {
            CurrentTrack::Unmatched
        }
    }
}
