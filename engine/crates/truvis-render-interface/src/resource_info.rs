//! 纹理与缓冲区的创建信息，以及 RenderGraph 中绑定的物理资源

use ash::vk;

use crate::handles::{GfxBufferHandle, GfxTextureHandle};
use crate::resource_state::DeviceResourceState;

/// 纹理创建信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    /// 纹理在整个生命周期中可能出现的所有状态
    pub usage: DeviceResourceState,
}

impl Default for TextureInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            usage: DeviceResourceState::UNDEFINED,
        }
    }
}

impl TextureInfo {
    pub fn new_2d(
        name: impl Into<String>,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: DeviceResourceState,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage,
            ..Default::default()
        }
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }
}

/// 纹理视图创建信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureViewInfo {
    pub name: String,
    /// `None` 表示沿用纹理本身的格式
    pub format: Option<vk::Format>,
    pub base_mip_level: u32,
    /// `None` 表示从 `base_mip_level` 到最后一级
    pub mip_level_count: Option<u32>,
}

impl Default for TextureViewInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            format: None,
            base_mip_level: 0,
            mip_level_count: None,
        }
    }
}

/// 缓冲区创建信息
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub name: String,
    pub size: vk::DeviceSize,
    pub usage: DeviceResourceState,
    pub cpu_visible: bool,
}

impl BufferInfo {
    pub fn new(name: impl Into<String>, size: vk::DeviceSize, usage: DeviceResourceState) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
            cpu_visible: false,
        }
    }
}

/// RenderGraph 中绑定的纹理：句柄 + 默认视图
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureResource {
    pub handle: GfxTextureHandle,
    pub view: u32,
}

impl TextureResource {
    #[inline]
    pub fn new(handle: GfxTextureHandle, view: u32) -> Self {
        Self { handle, view }
    }
}

/// RenderGraph 中绑定的缓冲区
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferResource {
    pub handle: GfxBufferHandle,
}

impl BufferResource {
    #[inline]
    pub fn new(handle: GfxBufferHandle) -> Self {
        Self { handle }
    }
}
