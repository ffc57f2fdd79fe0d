//! 不依赖 GPU 的设备实现
//!
//! 使用 SlotMap 分配句柄，记录所有的命令与提交，主要用于测试 RenderGraph。

use std::any::Any;

use ash::vk;
use slotmap::SlotMap;

use crate::barrier::GfxDependencyInfo;
use crate::device::{GfxCommandRecorder, GfxDevice, GfxDeviceError};
use crate::frame_counter::FrameCounter;
use crate::handles::{GfxBufferHandle, GfxSemaphoreHandle, GfxTextureHandle};
use crate::queue::QueueKind;
use crate::rendering_info::GfxRenderingInfo;
use crate::resource_info::{BufferInfo, TextureInfo, TextureViewInfo};
use crate::submit_info::GfxSubmitInfo;

/// recorder 记录下来的命令
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    BeginLabel(String),
    EndLabel,
    PipelineBarrier(GfxDependencyInfo),
    BeginRendering(GfxRenderingInfo),
    EndRendering,
    /// 每个 viewport 记录一条
    SetViewport {
        index: u32,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissor {
        index: u32,
        scissor: vk::Rect2D,
    },
    SetRasterizationSamples(vk::SampleCountFlags),
}

pub struct DummyRecorder {
    queue: QueueKind,
    queue_index: usize,
    commands: Vec<RecordedCommand>,
}

impl DummyRecorder {
    #[inline]
    pub fn queue_index(&self) -> usize {
        self.queue_index
    }

    #[inline]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }
}

impl GfxCommandRecorder for DummyRecorder {
    fn queue(&self) -> QueueKind {
        self.queue
    }

    fn begin_label(&mut self, name: &str, _color: [f32; 4]) {
        self.commands.push(RecordedCommand::BeginLabel(name.to_string()));
    }

    fn end_label(&mut self) {
        self.commands.push(RecordedCommand::EndLabel);
    }

    fn pipeline_barrier(&mut self, dependency_info: &GfxDependencyInfo) {
        self.commands.push(RecordedCommand::PipelineBarrier(dependency_info.clone()));
    }

    fn begin_rendering(&mut self, rendering_info: &GfxRenderingInfo) {
        self.commands.push(RecordedCommand::BeginRendering(rendering_info.clone()));
    }

    fn end_rendering(&mut self) {
        self.commands.push(RecordedCommand::EndRendering);
    }

    fn set_viewport(&mut self, first_viewport: u32, viewports: &[vk::Viewport]) {
        for (index, viewport) in (first_viewport..).zip(viewports) {
            self.commands.push(RecordedCommand::SetViewport {
                index,
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            });
        }
    }

    fn set_scissor(&mut self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        for (index, scissor) in (first_scissor..).zip(scissors) {
            self.commands.push(RecordedCommand::SetScissor {
                index,
                scissor: *scissor,
            });
        }
    }

    fn set_rasterization_samples(&mut self, samples: vk::SampleCountFlags) {
        self.commands.push(RecordedCommand::SetRasterizationSamples(samples));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 一次提交的完整记录
#[derive(Clone, Debug)]
pub struct DummySubmission {
    pub queue: QueueKind,
    pub frame: u64,
    pub commands: Vec<RecordedCommand>,
    pub submit_info: GfxSubmitInfo,
}

impl DummySubmission {
    /// 本次提交中出现的所有 label，即节点名
    pub fn labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::BeginLabel(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

struct DummyTexture {
    info: TextureInfo,
    views: Vec<TextureViewInfo>,
}

struct DummySemaphore {
    name: String,
    value: u64,
}

pub struct DummyDevice {
    textures: SlotMap<GfxTextureHandle, DummyTexture>,
    buffers: SlotMap<GfxBufferHandle, BufferInfo>,
    semaphores: SlotMap<GfxSemaphoreHandle, DummySemaphore>,

    // 待销毁队列 (handle, frame_index)
    pending_destroy_textures: Vec<(GfxTextureHandle, u64)>,
    pending_destroy_buffers: Vec<(GfxBufferHandle, u64)>,

    frame_counter: FrameCounter,

    has_async_compute: bool,
    has_async_transfer: bool,
    fail_submit: bool,

    submissions: Vec<DummySubmission>,
    wait_idle_count: usize,
}
impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl DummyDevice {
    /// 只有主队列的设备
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            semaphores: SlotMap::with_key(),

            pending_destroy_textures: Vec::new(),
            pending_destroy_buffers: Vec::new(),

            frame_counter: FrameCounter::default(),

            has_async_compute: false,
            has_async_transfer: false,
            fail_submit: false,

            submissions: Vec::new(),
            wait_idle_count: 0,
        }
    }

    /// 带有专用 compute 与 transfer 队列的设备
    pub fn with_async_queues() -> Self {
        Self {
            has_async_compute: true,
            has_async_transfer: true,
            ..Self::new()
        }
    }

    pub fn set_fail_submit(&mut self, fail: bool) {
        self.fail_submit = fail;
    }
}
// update
impl DummyDevice {
    /// 进入下一帧，并清理已经过期的资源
    pub fn next_frame(&mut self) {
        self.frame_counter.next_frame();
        self.cleanup();
    }

    fn cleanup(&mut self) {
        let frame_counter = &self.frame_counter;

        let mut textures_to_destroy = Vec::new();
        self.pending_destroy_textures.retain(|(handle, frame_index)| {
            if frame_counter.is_retired(*frame_index) {
                textures_to_destroy.push(*handle);
                false
            } else {
                true
            }
        });
        for handle in textures_to_destroy {
            if let Some(texture) = self.textures.remove(handle) {
                log::trace!("destroy texture: {}", texture.info.name);
            }
        }

        let mut buffers_to_destroy = Vec::new();
        self.pending_destroy_buffers.retain(|(handle, frame_index)| {
            if frame_counter.is_retired(*frame_index) {
                buffers_to_destroy.push(*handle);
                false
            } else {
                true
            }
        });
        for handle in buffers_to_destroy {
            if let Some(buffer) = self.buffers.remove(handle) {
                log::trace!("destroy buffer: {}", buffer.name);
            }
        }
    }
}
// getters
impl DummyDevice {
    #[inline]
    pub fn submissions(&self) -> &[DummySubmission] {
        &self.submissions
    }

    #[inline]
    pub fn clear_submissions(&mut self) {
        self.submissions.clear();
    }

    #[inline]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn contains_texture(&self, handle: GfxTextureHandle) -> bool {
        self.textures.contains_key(handle)
    }

    #[inline]
    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy_textures.len() + self.pending_destroy_buffers.len()
    }

    #[inline]
    pub fn texture_views(&self, handle: GfxTextureHandle) -> Option<&[TextureViewInfo]> {
        self.textures.get(handle).map(|texture| texture.views.as_slice())
    }

    /// semaphore 当前的值（最后一次 signal 的值）
    #[inline]
    pub fn semaphore_value(&self, semaphore: GfxSemaphoreHandle) -> Option<u64> {
        self.semaphores.get(semaphore).map(|s| s.value)
    }

    #[inline]
    pub fn semaphore_name(&self, semaphore: GfxSemaphoreHandle) -> Option<&str> {
        self.semaphores.get(semaphore).map(|s| s.name.as_str())
    }

    #[inline]
    pub fn semaphore_count(&self) -> usize {
        self.semaphores.len()
    }

    #[inline]
    pub fn wait_idle_count(&self) -> usize {
        self.wait_idle_count
    }
}

impl GfxDevice for DummyDevice {
    fn create_texture(&mut self, info: &TextureInfo) -> GfxTextureHandle {
        self.textures.insert(DummyTexture {
            info: info.clone(),
            views: vec![TextureViewInfo {
                name: info.name.clone(),
                ..Default::default()
            }],
        })
    }

    fn create_texture_view(&mut self, texture: GfxTextureHandle, info: &TextureViewInfo) -> u32 {
        let texture = self.textures.get_mut(texture).expect("create view on a destroyed texture");
        texture.views.push(info.clone());
        (texture.views.len() - 1) as u32
    }

    fn create_buffer(&mut self, info: &BufferInfo) -> GfxBufferHandle {
        self.buffers.insert(info.clone())
    }

    fn destroy_texture(&mut self, texture: GfxTextureHandle) {
        self.pending_destroy_textures.push((texture, self.frame_counter.frame_id()));
    }

    fn destroy_buffer(&mut self, buffer: GfxBufferHandle) {
        self.pending_destroy_buffers.push((buffer, self.frame_counter.frame_id()));
    }

    fn texture_info(&self, texture: GfxTextureHandle) -> Option<&TextureInfo> {
        self.textures.get(texture).map(|texture| &texture.info)
    }

    fn buffer_info(&self, buffer: GfxBufferHandle) -> Option<&BufferInfo> {
        self.buffers.get(buffer)
    }

    fn has_queue(&self, queue: QueueKind) -> bool {
        match queue {
            QueueKind::Main => true,
            QueueKind::AsyncCompute => self.has_async_compute,
            QueueKind::AsyncTransfer => self.has_async_transfer,
        }
    }

    fn queue_family_index(&self, queue: QueueKind) -> u32 {
        match queue {
            QueueKind::Main => 0,
            QueueKind::AsyncCompute if self.has_async_compute => 1,
            QueueKind::AsyncTransfer if self.has_async_transfer => 2,
            _ => 0,
        }
    }

    fn create_timeline_semaphore(&mut self, initial_value: u64, name: &str) -> GfxSemaphoreHandle {
        self.semaphores.insert(DummySemaphore {
            name: name.to_string(),
            value: initial_value,
        })
    }

    fn destroy_semaphore(&mut self, semaphore: GfxSemaphoreHandle) {
        self.semaphores.remove(semaphore);
    }

    fn allocate_command_recorder(&mut self, queue_index: usize, queue: QueueKind) -> Box<dyn GfxCommandRecorder> {
        Box::new(DummyRecorder {
            queue,
            queue_index,
            commands: Vec::new(),
        })
    }

    fn submit(
        &mut self,
        queue: QueueKind,
        recorder: Box<dyn GfxCommandRecorder>,
        submit_info: &GfxSubmitInfo,
    ) -> Result<(), GfxDeviceError> {
        if !self.has_queue(queue) {
            return Err(GfxDeviceError::QueueUnavailable(queue));
        }
        if self.fail_submit {
            return Err(GfxDeviceError::SubmitFailed {
                queue,
                reason: "submission failure injected".to_string(),
            });
        }

        let commands = recorder
            .as_any()
            .downcast_ref::<DummyRecorder>()
            .map(|recorder| recorder.commands.clone())
            .unwrap_or_default();

        // 立即完成：signal 直接写入 semaphore
        for signal in &submit_info.signal_infos {
            if let Some(semaphore) = self.semaphores.get_mut(signal.semaphore) {
                semaphore.value = semaphore.value.max(signal.value);
            }
        }

        self.submissions.push(DummySubmission {
            queue,
            frame: self.frame_counter.frame_id(),
            commands,
            submit_info: submit_info.clone(),
        });
        Ok(())
    }

    fn absolute_frame(&self) -> u64 {
        self.frame_counter.frame_id()
    }

    fn wait_idle(&mut self) {
        self.wait_idle_count += 1;
    }
}
