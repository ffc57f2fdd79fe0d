//! dynamic rendering 的 attachment 描述

use ash::vk;

use crate::resource_info::TextureResource;

/// attachment 在 render pass 开始时的处理方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentLoad {
    /// 保留已有内容，等价于读取上一个版本
    Load,
    Clear,
    DontCare,
}

impl AttachmentLoad {
    #[inline]
    pub fn vk_load_op(self) -> vk::AttachmentLoadOp {
        match self {
            AttachmentLoad::Load => vk::AttachmentLoadOp::LOAD,
            AttachmentLoad::Clear => vk::AttachmentLoadOp::CLEAR,
            AttachmentLoad::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

/// attachment 在 render pass 结束时的处理方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentStore {
    Store,
    Discard,
}

impl AttachmentStore {
    #[inline]
    pub fn vk_store_op(self) -> vk::AttachmentStoreOp {
        match self {
            AttachmentStore::Store => vk::AttachmentStoreOp::STORE,
            AttachmentStore::Discard => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxRenderingAttachment {
    pub texture: TextureResource,
    pub layout: vk::ImageLayout,
    pub load: AttachmentLoad,
    pub store: AttachmentStore,
    /// multisample resolve 的目标
    pub resolve: Option<TextureResource>,
}

/// 一个 render pass 的 attachment 集合
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxRenderingInfo {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<GfxRenderingAttachment>,
    pub depth_attachment: Option<GfxRenderingAttachment>,
    pub samples: vk::SampleCountFlags,
}

impl Default for GfxRenderingInfo {
    fn default() -> Self {
        Self {
            render_area: vk::Rect2D::default(),
            color_attachments: Vec::new(),
            depth_attachment: None,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

impl GfxRenderingInfo {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    #[inline]
    pub fn has_attachments(&self) -> bool {
        !self.color_attachments.is_empty() || self.depth_attachment.is_some()
    }
}
