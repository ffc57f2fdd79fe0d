//! transient 资源的创建描述
//!
//! 纹理的 format / extent / mip_levels / samples 都可以依赖另一个纹理版本，
//! 在编译时从被依赖的纹理读取实际值，例如「和 swapchain 一样大」。

use ash::vk;
use itertools::Itertools;
use truvis_render_interface::resource_info::{TextureInfo, TextureViewInfo};
use truvis_render_interface::resource_state::DeviceResourceState;

use crate::resource_version_registry::ResourceVersion;

/// 可能依赖其他资源的值
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DependentValue<T> {
    value: T,
    dependent_value: Option<T>,
    dependency: Option<ResourceVersion>,
}

impl<T: Copy + PartialEq> DependentValue<T> {
    pub fn fixed(value: T) -> Self {
        Self {
            value,
            dependent_value: None,
            dependency: None,
        }
    }

    /// `fallback` 在依赖解析之前作为占位值
    pub fn depends_on(dependency: ResourceVersion, fallback: T) -> Self {
        Self {
            value: fallback,
            dependent_value: None,
            dependency: Some(dependency),
        }
    }

    /// 有依赖时返回解析后的值，否则返回独立的值
    #[inline]
    pub fn get(&self) -> T {
        match self.dependency {
            Some(_) => self.dependent_value.unwrap_or(self.value),
            None => self.value,
        }
    }

    #[inline]
    pub fn dependency(&self) -> Option<ResourceVersion> {
        self.dependency
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.dependency.is_none() || self.dependent_value.is_some()
    }

    /// 写入依赖解析出的值，返回值是否发生了变化
    pub fn resolve(&mut self, value: T) -> bool {
        let changed = self.dependent_value != Some(value);
        self.dependent_value = Some(value);
        changed
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dependent_value = None;
        self.dependency = None;
    }
}

/// transient 纹理的描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependentTextureInfo {
    pub name: String,
    pub format: DependentValue<vk::Format>,
    pub extent: DependentValue<vk::Extent3D>,
    pub mip_levels: DependentValue<u32>,
    pub samples: DependentValue<vk::SampleCountFlags>,
    pub usage: DeviceResourceState,
    /// 默认视图之外的额外视图
    pub views: Vec<TextureViewInfo>,
}

impl DependentTextureInfo {
    pub fn new(name: impl Into<String>, usage: DeviceResourceState) -> Self {
        let defaults = TextureInfo::default();
        Self {
            name: name.into(),
            format: DependentValue::fixed(defaults.format),
            extent: DependentValue::fixed(defaults.extent),
            mip_levels: DependentValue::fixed(defaults.mip_levels),
            samples: DependentValue::fixed(defaults.samples),
            usage,
            views: Vec::new(),
        }
    }

    /// 所有字段都取自 `source`
    pub fn like(name: impl Into<String>, source: ResourceVersion, usage: DeviceResourceState) -> Self {
        Self::new(name, usage).format_of(source).extent_of(source).mip_levels_of(source).samples_of(source)
    }

    pub fn format(mut self, format: vk::Format) -> Self {
        self.format.set(format);
        self
    }

    pub fn format_of(mut self, source: ResourceVersion) -> Self {
        self.format = DependentValue::depends_on(source, self.format.get());
        self
    }

    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent.set(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });
        self
    }

    pub fn extent_of(mut self, source: ResourceVersion) -> Self {
        self.extent = DependentValue::depends_on(source, self.extent.get());
        self
    }

    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels.set(mip_levels);
        self
    }

    pub fn mip_levels_of(mut self, source: ResourceVersion) -> Self {
        self.mip_levels = DependentValue::depends_on(source, self.mip_levels.get());
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples.set(samples);
        self
    }

    pub fn samples_of(mut self, source: ResourceVersion) -> Self {
        self.samples = DependentValue::depends_on(source, self.samples.get());
        self
    }

    /// 去重后的依赖版本
    pub fn dependencies(&self) -> Vec<ResourceVersion> {
        [
            self.format.dependency(),
            self.extent.dependency(),
            self.mip_levels.dependency(),
            self.samples.dependency(),
        ]
        .into_iter()
        .flatten()
        .unique()
        .collect()
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.format.is_resolved()
            && self.extent.is_resolved()
            && self.mip_levels.is_resolved()
            && self.samples.is_resolved()
    }

    /// 用依赖纹理的实际信息解析各个字段，返回是否有值发生变化
    ///
    /// `lookup` 返回 `None` 表示依赖尚未绑定，对应字段保持未解析
    pub fn resolve_with(&mut self, mut lookup: impl FnMut(ResourceVersion) -> Option<TextureInfo>) -> bool {
        let mut changed = false;

        if let Some(info) = self.format.dependency().and_then(&mut lookup) {
            changed |= self.format.resolve(info.format);
        }
        if let Some(info) = self.extent.dependency().and_then(&mut lookup) {
            changed |= self.extent.resolve(info.extent);
        }
        if let Some(info) = self.mip_levels.dependency().and_then(&mut lookup) {
            changed |= self.mip_levels.resolve(info.mip_levels);
        }
        if let Some(info) = self.samples.dependency().and_then(&mut lookup) {
            changed |= self.samples.resolve(info.samples);
        }

        changed
    }

    pub fn to_texture_info(&self) -> TextureInfo {
        TextureInfo {
            name: self.name.clone(),
            format: self.format.get(),
            extent: self.extent.get(),
            mip_levels: self.mip_levels.get(),
            samples: self.samples.get(),
            usage: self.usage,
        }
    }
}
