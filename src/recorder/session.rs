/// 录制会话
///
/// 开始录制时创建, 每编码一帧更新一次, 结束 (flush/封装) 时被丢弃。
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    /// 录制开始时间 (单调时钟, 微秒)
    pub start_us: i64,
    /// 上一个关键帧的相对时间 (毫秒); None 表示还没有关键帧
    pub last_keyframe_ms: Option<f64>,
    pub frame_count: u64,
    pub active: bool,
    keyframe_interval_ms: f64,
}

impl RecordingSession {
    pub fn new(start_us: i64, keyframe_interval_ms: f64) -> Self {
        Self {
            start_us,
            last_keyframe_ms: None,
            frame_count: 0,
            active: true,
            keyframe_interval_ms,
        }
    }

    /// 相对录制开始的毫秒数
    pub fn elapsed_ms(&self, timestamp_us: i64) -> f64 {
        (timestamp_us - self.start_us) as f64 / 1000.0
    }

    /// 距上一个关键帧 >= 间隔时返回 true 并把基准移到当前时间
    pub fn needs_keyframe(&mut self, elapsed_ms: f64) -> bool {
        let due = match self.last_keyframe_ms {
            None => true,
            Some(last) => elapsed_ms - last >= self.keyframe_interval_ms,
        };
        if due {
            self.last_keyframe_ms = Some(elapsed_ms);
        }
        due
    }
}
