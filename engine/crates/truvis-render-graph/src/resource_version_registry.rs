//! 资源版本注册表
//!
//! 每次写入都会产生一个新的 `ResourceVersion`，读取总是绑定到某个确定的版本。
//! 多个版本可以指向同一个存储槽（`ResourceId`），槽中保存实际绑定的物理资源。

use std::fmt;

use truvis_render_interface::resource_info::{BufferResource, TextureResource};

/// 资源版本，0 保留为无效版本，注册表分配的版本从 1 开始且不会复用
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceVersion(pub u32);

impl ResourceVersion {
    pub const INVALID: Self = Self(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// 存储槽的下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl ResourceId {
    const INVALID: Self = Self(u32::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceKind {
    Texture,
    Buffer,
    BufferPack,
}

impl fmt::Display for RgResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RgResourceKind::Texture => f.write_str("texture"),
            RgResourceKind::Buffer => f.write_str("buffer"),
            RgResourceKind::BufferPack => f.write_str("buffer pack"),
        }
    }
}

/// 存储槽中绑定的资源
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RgResource {
    /// 尚未绑定
    #[default]
    Null,
    Texture(TextureResource),
    Buffer(BufferResource),
    /// 包内的缓冲区由 `RenderGraph` 保存，可以每帧替换
    BufferPack,
}

impl RgResource {
    #[inline]
    pub fn kind(&self) -> Option<RgResourceKind> {
        match self {
            RgResource::Null => None,
            RgResource::Texture(_) => Some(RgResourceKind::Texture),
            RgResource::Buffer(_) => Some(RgResourceKind::Buffer),
            RgResource::BufferPack => Some(RgResourceKind::BufferPack),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, RgResource::Null)
    }
}

#[derive(Default)]
pub struct ResourceVersionRegistry {
    /// 以 `ResourceId` 为下标
    resources: Vec<RgResource>,
    /// 每个槽最新的版本
    last_versions: Vec<ResourceVersion>,

    /// 以 `ResourceVersion` 为下标，下标 0 是占位
    version_to_id: Vec<ResourceId>,
    /// 由 `next_version` 产生的版本记录其前一个版本，根版本为 INVALID
    previous_versions: Vec<ResourceVersion>,
}
// new & init
impl ResourceVersionRegistry {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            last_versions: Vec::new(),
            version_to_id: vec![ResourceId::INVALID],
            previous_versions: vec![ResourceVersion::INVALID],
        }
    }
}
// register
impl ResourceVersionRegistry {
    /// 新的存储槽，暂不绑定资源
    pub fn declare_resource(&mut self) -> ResourceVersion {
        self.add_resource(RgResource::Null)
    }

    /// 新的存储槽，立即绑定资源
    pub fn add_resource(&mut self, resource: RgResource) -> ResourceVersion {
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(resource);
        self.last_versions.push(ResourceVersion::INVALID);
        self.push_version(id, ResourceVersion::INVALID)
    }

    /// 原地重新绑定存储槽，指向该槽的所有版本都会看到新的资源
    pub fn update_resource(&mut self, id: ResourceId, resource: RgResource) {
        self.resources[id.index()] = resource;
    }

    /// 与 `prev` 共享存储槽的新版本
    ///
    /// # Panics
    /// `prev` 不是有效版本
    pub fn next_version(&mut self, prev: ResourceVersion) -> ResourceVersion {
        assert!(self.is_valid_version(prev), "next_version of invalid version {prev}");
        let id = self.version_to_id[prev.index()];
        self.push_version(id, prev)
    }

    fn push_version(&mut self, id: ResourceId, previous: ResourceVersion) -> ResourceVersion {
        let version = ResourceVersion(self.version_to_id.len() as u32);
        self.version_to_id.push(id);
        self.previous_versions.push(previous);
        self.last_versions[id.index()] = version;
        version
    }
}
// getter & iter
impl ResourceVersionRegistry {
    #[inline]
    pub fn is_valid_version(&self, version: ResourceVersion) -> bool {
        version.is_valid() && version.index() < self.version_to_id.len()
    }

    /// # Panics
    /// 无效版本
    #[inline]
    pub fn resource_id(&self, version: ResourceVersion) -> ResourceId {
        assert!(self.is_valid_version(version), "invalid resource version {version}");
        self.version_to_id[version.index()]
    }

    #[inline]
    pub fn resource(&self, id: ResourceId) -> &RgResource {
        &self.resources[id.index()]
    }

    #[inline]
    pub fn resource_of(&self, version: ResourceVersion) -> &RgResource {
        self.resource(self.resource_id(version))
    }

    #[inline]
    pub fn resource_kind(&self, version: ResourceVersion) -> Option<RgResourceKind> {
        self.resource_of(version).kind()
    }

    /// 槽中最新的版本
    #[inline]
    pub fn last_version(&self, id: ResourceId) -> ResourceVersion {
        self.last_versions[id.index()]
    }

    /// `version` 由 declare/add 创建，而不是 `next_version`
    #[inline]
    pub fn is_root_version(&self, version: ResourceVersion) -> bool {
        self.is_valid_version(version) && !self.previous_versions[version.index()].is_valid()
    }

    /// `next_version` 的参数，根版本返回 `None`
    #[inline]
    pub fn previous_version(&self, version: ResourceVersion) -> Option<ResourceVersion> {
        let previous = self.previous_versions[version.index()];
        previous.is_valid().then_some(previous)
    }

    /// # Panics
    /// 版本未绑定资源，或者绑定的不是纹理
    pub fn get_texture(&self, version: ResourceVersion) -> TextureResource {
        match self.resource_of(version) {
            RgResource::Texture(texture) => *texture,
            RgResource::Null => panic!("resource version {version} is not bound yet"),
            RgResource::Buffer(_) | RgResource::BufferPack => {
                panic!("resource version {version} is a buffer, not a texture")
            }
        }
    }

    /// # Panics
    /// 版本未绑定资源，或者绑定的不是缓冲区
    pub fn get_buffer(&self, version: ResourceVersion) -> BufferResource {
        match self.resource_of(version) {
            RgResource::Buffer(buffer) => *buffer,
            RgResource::Null => panic!("resource version {version} is not bound yet"),
            RgResource::Texture(_) => panic!("resource version {version} is a texture, not a buffer"),
            RgResource::BufferPack => panic!("resource version {version} is a buffer pack, use `get_buffer_pack`"),
        }
    }

    pub fn try_get_texture(&self, version: ResourceVersion) -> Option<TextureResource> {
        if !self.is_valid_version(version) {
            return None;
        }
        match self.resource_of(version) {
            RgResource::Texture(texture) => Some(*texture),
            _ => None,
        }
    }

    pub fn try_get_buffer(&self, version: ResourceVersion) -> Option<BufferResource> {
        if !self.is_valid_version(version) {
            return None;
        }
        match self.resource_of(version) {
            RgResource::Buffer(buffer) => Some(*buffer),
            _ => None,
        }
    }

    /// 已分配的版本数量，不含占位的 0
    #[inline]
    pub fn version_count(&self) -> usize {
        self.version_to_id.len() - 1
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn iter_resources(&self) -> impl Iterator<Item = (ResourceId, &RgResource)> {
        self.resources.iter().enumerate().map(|(idx, res)| (ResourceId(idx as u32), res))
    }
}

#[cfg(test)]
mod tests {
    use slotmap::KeyData;
    use truvis_render_interface::handles::{GfxBufferHandle, GfxTextureHandle};

    use super::*;

    fn texture(idx: u64) -> TextureResource {
        TextureResource::new(GfxTextureHandle::from(KeyData::from_ffi(idx | (1 << 32))), 0)
    }

    fn buffer(idx: u64) -> BufferResource {
        BufferResource::new(GfxBufferHandle::from(KeyData::from_ffi(idx | (1 << 32))))
    }

    #[test]
    fn test_versions_start_at_one_and_never_repeat() {
        let mut registry = ResourceVersionRegistry::new();
        let a = registry.declare_resource();
        let b = registry.add_resource(RgResource::Texture(texture(1)));
        let c = registry.next_version(a);

        assert_eq!(a, ResourceVersion(1));
        assert_eq!(b, ResourceVersion(2));
        assert_eq!(c, ResourceVersion(3));
        assert_eq!(registry.version_count(), 3);
        assert_eq!(registry.resource_count(), 2);
        assert!(!registry.is_valid_version(ResourceVersion::INVALID));
    }

    #[test]
    fn test_next_version_aliases_slot() {
        let mut registry = ResourceVersionRegistry::new();
        let v1 = registry.add_resource(RgResource::Texture(texture(1)));
        let v2 = registry.next_version(v1);

        assert_eq!(registry.resource_id(v1), registry.resource_id(v2));
        assert_eq!(registry.get_texture(v1), registry.get_texture(v2));
        assert_eq!(registry.last_version(registry.resource_id(v1)), v2);
        assert!(registry.is_root_version(v1));
        assert!(!registry.is_root_version(v2));
        assert_eq!(registry.previous_version(v2), Some(v1));

        // 重新绑定后所有版本都看到新资源
        registry.update_resource(registry.resource_id(v2), RgResource::Texture(texture(2)));
        assert_eq!(registry.get_texture(v1), texture(2));
        assert_eq!(registry.get_texture(v2), texture(2));
    }

    #[test]
    fn test_declared_resource_is_unbound() {
        let mut registry = ResourceVersionRegistry::new();
        let v = registry.declare_resource();
        assert_eq!(registry.resource_kind(v), None);
        assert_eq!(registry.try_get_texture(v), None);

        registry.update_resource(registry.resource_id(v), RgResource::Buffer(buffer(3)));
        assert_eq!(registry.resource_kind(v), Some(RgResourceKind::Buffer));
        assert_eq!(registry.get_buffer(v), buffer(3));
        assert_eq!(registry.try_get_texture(v), None);
    }

    #[test]
    #[should_panic(expected = "not bound yet")]
    fn test_get_unbound_panics() {
        let mut registry = ResourceVersionRegistry::new();
        let v = registry.declare_resource();
        registry.get_texture(v);
    }

    #[test]
    #[should_panic(expected = "is a buffer")]
    fn test_get_wrong_kind_panics() {
        let mut registry = ResourceVersionRegistry::new();
        let v = registry.add_resource(RgResource::Buffer(buffer(1)));
        registry.get_texture(v);
    }

    #[test]
    #[should_panic(expected = "invalid version")]
    fn test_next_version_of_invalid_panics() {
        let mut registry = ResourceVersionRegistry::new();
        registry.next_version(ResourceVersion::INVALID);
    }
}
