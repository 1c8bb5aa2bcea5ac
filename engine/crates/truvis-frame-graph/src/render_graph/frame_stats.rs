use std::time::Duration;

/// 每次成功 execute 之后更新的帧统计
///
/// 统计的是 CPU 侧一次 execute 的耗时（从 build 到 present 返回），失败的帧不计入。
#[derive(Clone, Copy, Debug, Default)]
pub struct RgFrameStats {
    frame_count: u64,
    frame_time: Duration,
    total_time: Duration,
}

impl RgFrameStats {
    /// 每帧结束的时候调用
    pub(crate) fn record(&mut self, frame_time: Duration) {
        self.frame_count += 1;
        self.frame_time = frame_time;
        self.total_time += frame_time;
    }

    /// 成功执行的帧数
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    /// 上一帧的时间（毫秒）
    #[inline]
    pub fn frame_time_ms(&self) -> f32 {
        self.frame_time.as_secs_f32() * 1000.0
    }

    /// 上一帧的帧率；还没有执行过任何帧时为 0
    pub fn fps(&self) -> f32 {
        let seconds = self.frame_time.as_secs_f32();
        if seconds > 0.0 { 1.0 / seconds } else { 0.0 }
    }

    /// 所有帧的平均帧率
    pub fn average_fps(&self) -> f32 {
        let seconds = self.total_time.as_secs_f32();
        if seconds > 0.0 { self.frame_count as f32 / seconds } else { 0.0 }
    }
}
