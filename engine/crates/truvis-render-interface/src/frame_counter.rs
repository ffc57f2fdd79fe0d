/// 帧计数器
///
/// `frame_id` 单调递增，RenderGraph 用它计算 timeline semaphore 的值，
/// 设备用它判断延迟销毁的资源是否已经不再被 GPU 使用。
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    const FIF_COUNT: usize = 3;
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub const fn fif_count() -> usize {
        Self::FIF_COUNT
    }
    /// 当前帧使用的 frame-in-flight 槽位
    #[inline]
    pub fn frame_slot(&self) -> usize {
        (self.frame_id % Self::FIF_COUNT as u64) as usize
    }
    /// 在 `submitted_frame` 提交销毁的资源，当前帧是否已经可以安全销毁
    #[inline]
    pub fn is_retired(&self, submitted_frame: u64) -> bool {
        submitted_frame + Self::FIF_COUNT as u64 <= self.frame_id
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}-{}]", self.frame_id, self.frame_slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retire_after_fif_frames() {
        let mut counter = FrameCounter::new(10);
        assert!(!counter.is_retired(10));
        counter.next_frame();
        counter.next_frame();
        assert!(!counter.is_retired(10));
        counter.next_frame();
        assert!(counter.is_retired(10));
        assert_eq!(counter.frame_slot(), 1);
    }
}
