//! Barrier 描述
//!
//! RenderGraph 只和抽象设备打交道，所以这里的 barrier 引用的是资源句柄而不是 `vk::Image`，
//! 队列所有权转移使用 `QueueKind`，由设备映射到 queue family index。

use ash::vk;

use crate::handles::{GfxBufferHandle, GfxTextureHandle};
use crate::queue::QueueKind;
use crate::resource_state::GfxImageState;

/// 便捷创建 image barrier 的结构体
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxImageBarrier {
    /// 编译阶段由 RenderGraph 填入
    pub texture: Option<GfxTextureHandle>,
    pub src: GfxImageState,
    pub dst: GfxImageState,
    pub aspect: vk::ImageAspectFlags,
    /// (src_queue, dst_queue)，为 `None` 时不转移所有权
    pub queue_transfer: Option<(QueueKind, QueueKind)>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            texture: None,
            src: GfxImageState::new(
                vk::PipelineStageFlags2::NONE,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
            ),
            dst: GfxImageState::new(
                vk::PipelineStageFlags2::NONE,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
            ),
            aspect: vk::ImageAspectFlags::COLOR,
            queue_transfer: None,
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.src.layout = old_layout;
        self.dst.layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.src.stage = src_stage_mask;
        self.src.access = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.dst.stage = dst_stage_mask;
        self.dst.access = dst_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn src_state(mut self, state: GfxImageState) -> Self {
        self.src = state;
        self
    }

    /// builder
    #[inline]
    pub fn dst_state(mut self, state: GfxImageState) -> Self {
        self.dst = state;
        self
    }

    /// builder
    #[inline]
    pub fn queue_family_transfer(mut self, src_queue: QueueKind, dst_queue: QueueKind) -> Self {
        self.queue_transfer = if src_queue == dst_queue { None } else { Some((src_queue, dst_queue)) };
        self
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect_mask;
        self
    }

    /// builder
    #[inline]
    pub fn texture(mut self, texture: GfxTextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }

    #[inline]
    pub fn is_layout_transition(&self) -> bool {
        self.src.layout != self.dst.layout
    }

    #[inline]
    pub fn is_queue_transfer(&self) -> bool {
        self.queue_transfer.is_some()
    }

    /// 推断图像的 aspect flags
    ///
    /// 根据 format 自动推断（简化版本）
    pub fn infer_image_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }

            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }

            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// 便捷创建 buffer barrier 的结构体
///
/// 总是覆盖整个 buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferBarrier {
    pub buffer: Option<GfxBufferHandle>,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub queue_transfer: Option<(QueueKind, QueueKind)>,
}

impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            buffer: None,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            queue_transfer: None,
        }
    }
}

impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.src_stage = src_stage_mask;
        self.src_access = src_access_mask;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.dst_stage = dst_stage_mask;
        self.dst_access = dst_access_mask;
        self
    }

    #[inline]
    pub fn queue_family_transfer(mut self, src_queue: QueueKind, dst_queue: QueueKind) -> Self {
        self.queue_transfer = if src_queue == dst_queue { None } else { Some((src_queue, dst_queue)) };
        self
    }

    #[inline]
    pub fn buffer(mut self, buffer: GfxBufferHandle) -> Self {
        self.buffer = Some(buffer);
        self
    }
}

/// 一次 `pipeline_barrier` 调用携带的所有 barrier
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxDependencyInfo {
    pub image_barriers: Vec<GfxImageBarrier>,
    pub buffer_barriers: Vec<GfxBufferBarrier>,
}

impl GfxDependencyInfo {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_barrier_builder() {
        let barrier = GfxImageBarrier::new()
            .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .dst_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_SAMPLED_READ);

        assert!(barrier.is_layout_transition());
        assert!(!barrier.is_queue_transfer());
        assert_eq!(barrier.dst.access, vk::AccessFlags2::SHADER_SAMPLED_READ);
    }

    #[test]
    fn test_same_queue_is_not_a_transfer() {
        let barrier = GfxBufferBarrier::new().queue_family_transfer(QueueKind::Main, QueueKind::Main);
        assert_eq!(barrier.queue_transfer, None);

        let barrier = GfxBufferBarrier::new().queue_family_transfer(QueueKind::AsyncCompute, QueueKind::Main);
        assert_eq!(barrier.queue_transfer, Some((QueueKind::AsyncCompute, QueueKind::Main)));
    }

    #[test]
    fn test_infer_image_aspect() {
        assert_eq!(GfxImageBarrier::infer_image_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            GfxImageBarrier::infer_image_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(GfxImageBarrier::infer_image_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }
}
