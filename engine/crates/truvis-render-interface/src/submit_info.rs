use ash::vk;

use crate::handles::GfxSemaphoreHandle;

/// 一次 timeline semaphore 的 wait 或 signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxSemaphoreSubmit {
    pub semaphore: GfxSemaphoreHandle,
    pub stage: vk::PipelineStageFlags2,
    /// binary semaphore 时为 0
    pub value: u64,
}

/// 对 submitInfo 的封装，和具体的图形 API 无关
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxSubmitInfo {
    pub wait_infos: Vec<GfxSemaphoreSubmit>,
    pub signal_infos: Vec<GfxSemaphoreSubmit>,
}

impl GfxSubmitInfo {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn wait(mut self, semaphore: GfxSemaphoreHandle, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.wait_infos.push(GfxSemaphoreSubmit {
            semaphore,
            stage,
            value: value.unwrap_or_default(),
        });
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: GfxSemaphoreHandle, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.signal_infos.push(GfxSemaphoreSubmit {
            semaphore,
            stage,
            value: value.unwrap_or_default(),
        });
        self
    }

    /// 对同一个 semaphore 的 signal 值
    pub fn signal_value(&self, semaphore: GfxSemaphoreHandle) -> Option<u64> {
        self.signal_infos.iter().find(|info| info.semaphore == semaphore).map(|info| info.value)
    }

    /// 对同一个 semaphore 的 wait 值
    pub fn wait_value(&self, semaphore: GfxSemaphoreHandle) -> Option<u64> {
        self.wait_infos.iter().find(|info| info.semaphore == semaphore).map(|info| info.value)
    }
}
