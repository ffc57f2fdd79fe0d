//! RenderGraph 依赖的设备接口
//!
//! RenderGraph 只通过 `GfxDevice` 与 `GfxCommandRecorder` 访问 GPU，
//! 每个图形后端各自实现一份。

use std::any::Any;

use ash::vk;

use crate::barrier::GfxDependencyInfo;
use crate::handles::{GfxBufferHandle, GfxSemaphoreHandle, GfxTextureHandle};
use crate::queue::QueueKind;
use crate::rendering_info::GfxRenderingInfo;
use crate::resource_info::{BufferInfo, TextureInfo, TextureViewInfo};
use crate::submit_info::GfxSubmitInfo;

#[derive(Debug, thiserror::Error)]
pub enum GfxDeviceError {
    #[error("queue {0} is not available on this device")]
    QueueUnavailable(QueueKind),

    #[error("submit to queue {queue} failed: {reason}")]
    SubmitFailed { queue: QueueKind, reason: String },

    #[error("device lost")]
    DeviceLost,
}

/// 记录命令的对象，对应一个 command buffer
pub trait GfxCommandRecorder: Any {
    fn queue(&self) -> QueueKind;

    fn begin_label(&mut self, name: &str, color: [f32; 4]);
    fn end_label(&mut self);

    fn pipeline_barrier(&mut self, dependency_info: &GfxDependencyInfo);

    fn begin_rendering(&mut self, rendering_info: &GfxRenderingInfo);
    fn end_rendering(&mut self);

    // 动态状态，只在 graphics 队列上使用
    fn set_viewport(&mut self, first_viewport: u32, viewports: &[vk::Viewport]);
    fn set_scissor(&mut self, first_scissor: u32, scissors: &[vk::Rect2D]);
    /// 对应 `VK_EXT_extended_dynamic_state3` 的 `vkCmdSetRasterizationSamplesEXT`
    fn set_rasterization_samples(&mut self, samples: vk::SampleCountFlags);

    /// 后端在 submit 时取回自己的具体类型
    fn as_any(&self) -> &dyn Any;
}

pub trait GfxDevice {
    // 资源
    fn create_texture(&mut self, info: &TextureInfo) -> GfxTextureHandle;
    /// 返回 view 在该纹理中的序号，0 是默认视图
    fn create_texture_view(&mut self, texture: GfxTextureHandle, info: &TextureViewInfo) -> u32;
    fn create_buffer(&mut self, info: &BufferInfo) -> GfxBufferHandle;

    /// 资源可能仍被 in-flight 的帧使用，实现需要延迟到安全时再真正释放
    fn destroy_texture(&mut self, texture: GfxTextureHandle);
    fn destroy_buffer(&mut self, buffer: GfxBufferHandle);

    fn texture_info(&self, texture: GfxTextureHandle) -> Option<&TextureInfo>;
    fn buffer_info(&self, buffer: GfxBufferHandle) -> Option<&BufferInfo>;

    // 队列
    fn has_queue(&self, queue: QueueKind) -> bool;
    fn queue_family_index(&self, queue: QueueKind) -> u32;

    // 同步
    fn create_timeline_semaphore(&mut self, initial_value: u64, name: &str) -> GfxSemaphoreHandle;
    fn destroy_semaphore(&mut self, semaphore: GfxSemaphoreHandle);

    // 命令
    fn allocate_command_recorder(&mut self, queue_index: usize, queue: QueueKind) -> Box<dyn GfxCommandRecorder>;
    fn submit(
        &mut self,
        queue: QueueKind,
        recorder: Box<dyn GfxCommandRecorder>,
        submit_info: &GfxSubmitInfo,
    ) -> Result<(), GfxDeviceError>;

    /// 单调递增的帧序号
    fn absolute_frame(&self) -> u64;
    fn wait_idle(&mut self);
}
