//! 编译后的 RenderGraph
//!
//! 每帧的状态流转：`compile (dirty 时) → schedule (build 时) → barriers (build 时) → execute`
//!
//! - `compile`: 解析 transient 资源的依赖字段并分配物理资源，设置 attachment，把物理句柄填入 barrier
//! - `schedule`: 把节点分配到队列，按依赖层级划分 submit，计算跨队列的 semaphore wait/signal
//! - `barriers`: 按执行顺序模拟资源状态，生成 image/buffer barrier 与队列所有权转移
//! - `execute`: 录制并提交
//! - `debug`: 打印执行计划、输出 graphviz

mod barriers;
mod compile;
mod debug;
mod execute;
mod schedule;

pub use barriers::{NodeBarriers, RgBufferBarrier, RgImageBarrier};
pub use execute::RgExternalSync;
pub use schedule::{RgSubmit, RgSubmitWait};

use std::fmt;

use indexmap::IndexMap;
use truvis_render_interface::device::GfxDevice;
use truvis_render_interface::handles::GfxSemaphoreHandle;
use truvis_render_interface::queue::QueueKind;
use truvis_render_interface::rendering_info::GfxRenderingInfo;
use truvis_render_interface::resource_info::{BufferResource, TextureInfo, TextureResource};
use truvis_render_interface::resource_state::DeviceResourceState;

use crate::buffer_pack::RgBufferPack;
use crate::builder::{ImportedResourceUsage, TransientBuffer, TransientTexture};
use crate::config::RenderGraphConfig;
use crate::dag::{Dag, DagSchedule, NodeHandle};
use crate::error::RgBuildError;
use crate::node::{Job, Node};
use crate::resource_version_registry::{ResourceId, ResourceVersion, ResourceVersionRegistry, RgResource, RgResourceKind};

/// 一个资源在依赖层级上最早和最晚的使用
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceUsageSpan {
    pub first_node: NodeHandle,
    pub first_state: DeviceResourceState,
    pub last_node: NodeHandle,
    pub last_state: DeviceResourceState,
}

/// 节点对每个资源的使用，同一节点内对同一资源的多个状态合并为一个
pub(crate) fn resource_usages<C>(
    registry: &ResourceVersionRegistry,
    node: &Node<C>,
) -> IndexMap<ResourceId, DeviceResourceState> {
    let mut usages: IndexMap<ResourceId, DeviceResourceState> = IndexMap::new();
    let accesses = node
        .reads
        .iter()
        .map(|read| (read.version, read.state))
        .chain(node.writes.iter().map(|write| (write.version, write.state)));
    for (version, state) in accesses {
        *usages.entry(registry.resource_id(version)).or_default() |= state;
    }
    usages
}

pub(crate) struct RenderGraphDesc<C> {
    pub config: RenderGraphConfig,
    pub registry: ResourceVersionRegistry,
    pub resource_kinds: Vec<RgResourceKind>,
    pub nodes: Dag<Node<C>>,
    pub schedule: DagSchedule,
    pub usage_spans: IndexMap<ResourceId, ResourceUsageSpan>,
    pub imported: IndexMap<ResourceId, ImportedResourceUsage>,
    pub buffer_packs: IndexMap<ResourceId, RgBufferPack>,
    pub transient_textures: Vec<TransientTexture>,
    pub transient_texture_order: Vec<usize>,
    pub transient_buffers: Vec<TransientBuffer>,
}

pub struct RenderGraph<C> {
    config: RenderGraphConfig,

    registry: ResourceVersionRegistry,
    resource_kinds: Vec<RgResourceKind>,

    nodes: Dag<Node<C>>,
    /// 反向图，用于查询前驱
    predecessors: Dag<()>,
    sorted_nodes: Vec<NodeHandle>,
    dependency_levels: Vec<u32>,
    max_dependency_level: u32,

    usage_spans: IndexMap<ResourceId, ResourceUsageSpan>,
    imported: IndexMap<ResourceId, ImportedResourceUsage>,
    buffer_packs: IndexMap<ResourceId, RgBufferPack>,
    transient_textures: Vec<TransientTexture>,
    /// transient 纹理的解析顺序，被依赖者在前
    transient_texture_order: Vec<usize>,
    transient_buffers: Vec<TransientBuffer>,

    // schedule
    queues: Vec<QueueKind>,
    /// 以节点句柄为下标的队列序号
    node_queues: Vec<usize>,
    nodes_per_queue: Vec<Vec<NodeHandle>>,
    /// 节点需要等待的其他队列上的节点
    cross_queue_dependencies: Vec<Vec<NodeHandle>>,
    submits: Vec<Vec<RgSubmit>>,
    /// 以节点句柄为下标，节点所在 submit 在其队列中的序号
    node_submits: Vec<usize>,
    semaphores: Vec<Option<GfxSemaphoreHandle>>,

    // barriers
    node_barriers: Vec<NodeBarriers>,
    rendering_infos: Vec<Option<GfxRenderingInfo>>,

    /// 外部资源被重新导入，下次执行前需要重新编译
    dirty: bool,
    /// 所有资源都已绑定，attachment 和 barrier 已经链接到物理资源
    compiled: bool,
}
impl<C> fmt::Debug for RenderGraph<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraph")
            .field("name", &self.config.name)
            .field("nodes", &self.nodes.len())
            .field("max_dependency_level", &self.max_dependency_level)
            .field("queues", &self.queues)
            .field("compiled", &self.compiled)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

// new & init
impl<C> RenderGraph<C> {
    pub(crate) fn new(desc: RenderGraphDesc<C>) -> Self {
        let node_count = desc.nodes.len();
        let predecessors = desc.nodes.reverse();

        Self {
            config: desc.config,
            registry: desc.registry,
            resource_kinds: desc.resource_kinds,
            nodes: desc.nodes,
            predecessors,
            sorted_nodes: desc.schedule.sorted,
            dependency_levels: desc.schedule.depth,
            max_dependency_level: desc.schedule.max_depth,
            usage_spans: desc.usage_spans,
            imported: desc.imported,
            buffer_packs: desc.buffer_packs,
            transient_textures: desc.transient_textures,
            transient_texture_order: desc.transient_texture_order,
            transient_buffers: desc.transient_buffers,

            queues: Vec::new(),
            node_queues: vec![0; node_count],
            nodes_per_queue: Vec::new(),
            cross_queue_dependencies: vec![Vec::new(); node_count],
            submits: Vec::new(),
            node_submits: vec![0; node_count],
            semaphores: Vec::new(),

            node_barriers: (0..node_count).map(|_| NodeBarriers::default()).collect(),
            rendering_infos: vec![None; node_count],

            dirty: false,
            compiled: false,
        }
    }
}
// getter & iter
impl<C> RenderGraph<C> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &ResourceVersionRegistry {
        &self.registry
    }

    /// # Panics
    /// 版本未绑定资源，或者不是纹理
    #[inline]
    pub fn get_texture(&self, version: ResourceVersion) -> TextureResource {
        self.registry.get_texture(version)
    }

    /// # Panics
    /// 版本未绑定资源，或者不是缓冲区
    #[inline]
    pub fn get_buffer(&self, version: ResourceVersion) -> BufferResource {
        self.registry.get_buffer(version)
    }

    /// # Panics
    /// 版本不是 buffer pack
    pub fn get_buffer_pack(&self, version: ResourceVersion) -> &RgBufferPack {
        let id = self.registry.resource_id(version);
        self.buffer_packs.get(&id).unwrap_or_else(|| panic!("resource version {version} is not a buffer pack"))
    }

    #[inline]
    pub fn try_get_texture(&self, version: ResourceVersion) -> Option<TextureResource> {
        self.registry.try_get_texture(version)
    }

    #[inline]
    pub fn try_get_buffer(&self, version: ResourceVersion) -> Option<BufferResource> {
        self.registry.try_get_buffer(version)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, handle: NodeHandle) -> &Node<C> {
        self.nodes.node(handle)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.iter().find(|(_, node)| node.name == name).map(|(handle, _)| handle)
    }

    #[inline]
    pub fn edge_exists(&self, from: NodeHandle, to: NodeHandle) -> bool {
        self.nodes.edge_exists(from, to)
    }

    #[inline]
    pub fn predecessors(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.predecessors.adjacency(handle)
    }

    #[inline]
    pub fn successors(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.nodes.adjacency(handle)
    }

    /// 按依赖层级排序后的节点
    #[inline]
    pub fn sorted_nodes(&self) -> &[NodeHandle] {
        &self.sorted_nodes
    }

    #[inline]
    pub fn dependency_level(&self, handle: NodeHandle) -> u32 {
        self.dependency_levels[handle.index()]
    }

    #[inline]
    pub fn max_dependency_level(&self) -> u32 {
        self.max_dependency_level
    }

    #[inline]
    pub fn usage_span(&self, version: ResourceVersion) -> Option<&ResourceUsageSpan> {
        self.usage_spans.get(&self.registry.resource_id(version))
    }

    #[inline]
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    #[inline]
    pub fn queues(&self) -> &[QueueKind] {
        &self.queues
    }

    #[inline]
    pub fn queue_of(&self, handle: NodeHandle) -> QueueKind {
        self.queues[self.node_queues[handle.index()]]
    }

    /// 队列中的节点，按执行顺序
    pub fn queue_nodes(&self, queue: QueueKind) -> &[NodeHandle] {
        self.queue_index(queue).map(|idx| self.nodes_per_queue[idx].as_slice()).unwrap_or(&[])
    }

    pub fn submits(&self, queue: QueueKind) -> &[RgSubmit] {
        self.queue_index(queue).map(|idx| self.submits[idx].as_slice()).unwrap_or(&[])
    }

    /// 节点需要通过 semaphore 等待的其他队列上的节点
    #[inline]
    pub fn cross_queue_dependencies(&self, handle: NodeHandle) -> &[NodeHandle] {
        &self.cross_queue_dependencies[handle.index()]
    }

    #[inline]
    pub fn barriers_of(&self, handle: NodeHandle) -> &NodeBarriers {
        &self.node_barriers[handle.index()]
    }

    #[inline]
    pub fn rendering_info(&self, handle: NodeHandle) -> Option<&GfxRenderingInfo> {
        self.rendering_infos[handle.index()].as_ref()
    }

    /// transient 纹理当前物理资源的创建信息，尚未分配时为 `None`
    pub fn transient_texture_info(&self, version: ResourceVersion) -> Option<&TextureInfo> {
        let id = self.registry.resource_id(version);
        self.transient_textures.iter().find(|transient| transient.id == id).and_then(|t| t.allocated.as_ref())
    }

    #[inline]
    pub fn semaphore(&self, queue: QueueKind) -> Option<GfxSemaphoreHandle> {
        self.queue_index(queue).and_then(|idx| self.semaphores[idx])
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    #[inline]
    pub(crate) fn queue_index(&self, queue: QueueKind) -> Option<usize> {
        self.queues.iter().position(|q| *q == queue)
    }

    #[inline]
    pub(crate) fn resource_kind(&self, id: ResourceId) -> RgResourceKind {
        self.resource_kinds[id.index()]
    }

    #[inline]
    pub(crate) fn is_imported(&self, id: ResourceId) -> bool {
        self.imported.contains_key(&id)
    }
}
// update
impl<C> RenderGraph<C> {
    /// 替换节点的回调
    pub fn set_job(&mut self, node_name: &str, job: Job<C>) -> Result<(), RgBuildError> {
        let handle = self.node_by_name(node_name).ok_or_else(|| RgBuildError::UnknownNode {
            name: node_name.to_string(),
        })?;
        self.nodes.node_mut(handle).job = Some(job);
        Ok(())
    }

    /// 重新绑定外部纹理（例如 swapchain 换了一张图），下次执行前会重新编译
    pub fn reimport_texture(&mut self, version: ResourceVersion, texture: TextureResource) {
        let id = self.registry.resource_id(version);
        assert!(self.is_imported(id), "reimport_texture on non-imported resource {version}");
        self.registry.update_resource(id, RgResource::Texture(texture));
        self.dirty = true;
    }

    /// 重新绑定外部缓冲区
    ///
    /// 没有资源依赖缓冲区的属性，不需要重新编译，只更新 barrier 中的句柄
    pub fn reimport_buffer(&mut self, version: ResourceVersion, buffer: BufferResource) {
        let id = self.registry.resource_id(version);
        assert!(self.is_imported(id), "reimport_buffer on non-imported resource {version}");
        self.registry.update_resource(id, RgResource::Buffer(buffer));
        if self.compiled {
            self.relink_buffer_barriers(id, buffer);
        }
    }

    /// 替换 buffer pack 中的缓冲区，barrier 在录制时展开，不需要重新编译
    pub fn set_buffer_pack(&mut self, version: ResourceVersion, buffers: Vec<BufferResource>) {
        let id = self.registry.resource_id(version);
        let Some(pack) = self.buffer_packs.get_mut(&id) else {
            panic!("set_buffer_pack on non buffer pack resource {version}");
        };
        pack.buffers = buffers;
    }

    /// 释放 graph 拥有的 semaphore 与 transient 资源，外部资源不受影响
    pub fn destroy(mut self, device: &mut dyn GfxDevice) {
        for semaphore in self.semaphores.drain(..).flatten() {
            device.destroy_semaphore(semaphore);
        }
        for transient in &self.transient_textures {
            if let RgResource::Texture(texture) = self.registry.resource(transient.id) {
                device.destroy_texture(texture.handle);
            }
        }
        for transient in &self.transient_buffers {
            if let RgResource::Buffer(buffer) = self.registry.resource(transient.id) {
                device.destroy_buffer(buffer.handle);
            }
        }
        log::debug!("render graph \"{}\" destroyed", self.config.name);
    }

    /// 修改 transient 纹理的采样数，值变化时下次编译会重建
    pub fn update_transient_texture_samples(&mut self, version: ResourceVersion, samples: ash::vk::SampleCountFlags) {
        let id = self.registry.resource_id(version);
        let Some(transient) = self.transient_textures.iter_mut().find(|transient| transient.id == id) else {
            log::warn!("update_transient_texture_samples: {version} is not a transient texture");
            return;
        };
        if transient.info.samples.get() != samples || transient.info.samples.dependency().is_some() {
            transient.info.samples.set(samples);
            transient.force_recreate = true;
            self.dirty = true;
        }
    }

    /// 修改 transient 缓冲区的大小，值变化时下次编译会重建
    pub fn update_transient_buffer_size(&mut self, version: ResourceVersion, size: ash::vk::DeviceSize) {
        let id = self.registry.resource_id(version);
        let Some(transient) = self.transient_buffers.iter_mut().find(|transient| transient.id == id) else {
            log::warn!("update_transient_buffer_size: {version} is not a transient buffer");
            return;
        };
        if transient.info.size != size {
            transient.info.size = size;
            transient.force_recreate = true;
            self.dirty = true;
        }
    }
}
