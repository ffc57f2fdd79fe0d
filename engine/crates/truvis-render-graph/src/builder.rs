//! RenderGraph 构建器
//!
//! 通过 begin/end 成对的调用描述节点，并在节点内声明对资源版本的读写。
//! 所有接口都只做记录，不会阻塞也不会失败；第一次误用会被记录，在 `build()` 时返回。
//!
//! # 使用流程
//!
//! ```ignore
//! let mut builder = RenderGraphBuilder::<FrameContext>::new(RenderGraphConfig::named("frame"));
//!
//! let swapchain = builder.import_texture(swapchain_texture, DeviceResourceState::UNDEFINED, DeviceResourceState::PRESENT_TEXTURE);
//! let depth = builder.declare_transient_texture(
//!     DependentTextureInfo::new("depth", DeviceResourceState::DEPTH_STENCIL_TARGET)
//!         .format(vk::Format::D32_SFLOAT)
//!         .extent_of(swapchain),
//! );
//!
//! builder.begin_render_pass("opaque", CommandCapability::GRAPHICS);
//! builder.set_depth_stencil(depth, AttachmentLoad::Clear, AttachmentStore::Store);
//! let output = builder.add_color_target(swapchain, AttachmentLoad::Load, AttachmentStore::Store);
//! builder.set_job(Box::new(|graph, ctx, cmd| { /* 录制绘制命令 */ }));
//! builder.end_render_pass();
//!
//! let graph = builder.build(&mut device)?;
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use itertools::Itertools;
use truvis_render_interface::device::GfxDevice;
use truvis_render_interface::queue::{CommandCapability, JobType};
use truvis_render_interface::rendering_info::{AttachmentLoad, AttachmentStore};
use truvis_render_interface::resource_info::{BufferInfo, BufferResource, TextureInfo, TextureResource, TextureViewInfo};
use truvis_render_interface::resource_state::DeviceResourceState;

use crate::buffer_pack::RgBufferPack;
use crate::config::RenderGraphConfig;
use crate::dag::{Dag, DagSchedule, NodeHandle};
use crate::dependent_info::DependentTextureInfo;
use crate::error::RgBuildError;
use crate::graph::{RenderGraph, RenderGraphDesc, ResourceUsageSpan, resource_usages};
use crate::node::{Job, Node, ResourceRead, ResourceWrite};
use crate::resource_version_registry::{
    ResourceId, ResourceVersion, ResourceVersionRegistry, RgResource, RgResourceKind,
};

/// graph 构建期间调用一次的回调，用于让后注册的功能模块追加读写声明
pub type SetupTask<C> = Box<dyn FnMut(&mut RenderGraphBuilder<C>)>;

/// 外部资源在进入与离开 graph 时的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportedResourceUsage {
    pub initial: DeviceResourceState,
    /// `UNDEFINED` 表示不关心离开 graph 时的状态
    pub final_state: DeviceResourceState,
}

/// graph 拥有的 transient 纹理
pub(crate) struct TransientTexture {
    pub id: ResourceId,
    pub version: ResourceVersion,
    pub info: DependentTextureInfo,
    /// 当前物理资源的创建信息
    pub allocated: Option<TextureInfo>,
    pub force_recreate: bool,
}

/// graph 拥有的 transient 缓冲区
pub(crate) struct TransientBuffer {
    pub id: ResourceId,
    pub version: ResourceVersion,
    pub info: BufferInfo,
    pub allocated: bool,
    pub force_recreate: bool,
}

pub struct RenderGraphBuilder<C> {
    config: RenderGraphConfig,

    registry: ResourceVersionRegistry,
    /// 以 `ResourceId` 为下标
    resource_kinds: Vec<RgResourceKind>,

    nodes: Dag<Node<C>>,
    open_node: Option<NodeHandle>,

    transient_textures: Vec<TransientTexture>,
    transient_buffers: Vec<TransientBuffer>,
    imported: IndexMap<ResourceId, ImportedResourceUsage>,
    buffer_packs: IndexMap<ResourceId, RgBufferPack>,

    /// 第一次误用
    error: Option<RgBuildError>,
}

fn job_type_tag(job_type: JobType) -> &'static str {
    match job_type {
        JobType::RenderPass => "render_pass",
        JobType::Compute => "compute",
        JobType::Transfer => "transfer",
    }
}

// new & init
impl<C> RenderGraphBuilder<C> {
    pub fn new(config: RenderGraphConfig) -> Self {
        Self {
            config,
            registry: ResourceVersionRegistry::new(),
            resource_kinds: Vec::new(),
            nodes: Dag::new(),
            open_node: None,
            transient_textures: Vec::new(),
            transient_buffers: Vec::new(),
            imported: IndexMap::new(),
            buffer_packs: IndexMap::new(),
            error: None,
        }
    }
}
// getters
impl<C> RenderGraphBuilder<C> {
    #[inline]
    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &ResourceVersionRegistry {
        &self.registry
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 与 `version` 共享存储槽的最新版本
    pub fn last_resource_version(&self, version: ResourceVersion) -> ResourceVersion {
        self.registry.last_version(self.registry.resource_id(version))
    }

    /// 已记录的第一个误用
    #[inline]
    pub fn error(&self) -> Option<&RgBuildError> {
        self.error.as_ref()
    }
}
// 资源声明
impl<C> RenderGraphBuilder<C> {
    fn declare_slot(&mut self, resource: RgResource, kind: RgResourceKind) -> ResourceVersion {
        let version = self.registry.add_resource(resource);
        debug_assert_eq!(self.registry.resource_id(version).index(), self.resource_kinds.len());
        self.resource_kinds.push(kind);
        version
    }

    /// 由 graph 分配的纹理，依赖字段在编译时解析
    pub fn declare_transient_texture(&mut self, info: DependentTextureInfo) -> ResourceVersion {
        let version = self.declare_slot(RgResource::Null, RgResourceKind::Texture);
        self.transient_textures.push(TransientTexture {
            id: self.registry.resource_id(version),
            version,
            info,
            allocated: None,
            force_recreate: false,
        });
        version
    }

    /// 为 transient 纹理额外声明一个视图
    pub fn declare_texture_view(&mut self, version: ResourceVersion, view: TextureViewInfo) {
        let id = self.registry.is_valid_version(version).then(|| self.registry.resource_id(version));
        let transient = id.and_then(|id| self.transient_textures.iter_mut().find(|transient| transient.id == id));
        if let Some(transient) = transient {
            transient.info.views.push(view);
            return;
        }

        self.record_error(RgBuildError::IncompatibleAccess {
            node: version.to_string(),
            operation: "declare_texture_view on a non-transient texture".to_string(),
        });
    }

    pub fn declare_transient_buffer(&mut self, info: BufferInfo) -> ResourceVersion {
        let version = self.declare_slot(RgResource::Null, RgResourceKind::Buffer);
        self.transient_buffers.push(TransientBuffer {
            id: self.registry.resource_id(version),
            version,
            info,
            allocated: false,
            force_recreate: false,
        });
        version
    }

    /// 外部纹理，资源在之后通过 `RenderGraph::reimport_texture` 绑定
    pub fn declare_import_texture(
        &mut self,
        initial: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> ResourceVersion {
        let version = self.declare_slot(RgResource::Null, RgResourceKind::Texture);
        self.imported.insert(self.registry.resource_id(version), ImportedResourceUsage { initial, final_state });
        version
    }

    pub fn declare_import_buffer(
        &mut self,
        initial: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> ResourceVersion {
        let version = self.declare_slot(RgResource::Null, RgResourceKind::Buffer);
        self.imported.insert(self.registry.resource_id(version), ImportedResourceUsage { initial, final_state });
        version
    }

    /// 外部的一组缓冲区，包内的缓冲区在之后通过 `RenderGraph::set_buffer_pack` 绑定
    ///
    /// 整个 pack 作为一个资源参与依赖分析，barrier 在录制时展开到包内的每个缓冲区
    pub fn declare_import_buffer_pack(
        &mut self,
        name: &str,
        initial: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> ResourceVersion {
        let version = self.declare_slot(RgResource::BufferPack, RgResourceKind::BufferPack);
        let id = self.registry.resource_id(version);
        self.imported.insert(id, ImportedResourceUsage { initial, final_state });
        self.buffer_packs.insert(id, RgBufferPack::new(name));
        version
    }

    /// 导入外部纹理，返回新逻辑资源的第一个版本
    pub fn import_texture(
        &mut self,
        texture: TextureResource,
        initial: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> ResourceVersion {
        let version = self.declare_slot(RgResource::Texture(texture), RgResourceKind::Texture);
        self.imported.insert(self.registry.resource_id(version), ImportedResourceUsage { initial, final_state });
        version
    }

    pub fn import_buffer(
        &mut self,
        buffer: BufferResource,
        initial: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> ResourceVersion {
        let version = self.declare_slot(RgResource::Buffer(buffer), RgResourceKind::Buffer);
        self.imported.insert(self.registry.resource_id(version), ImportedResourceUsage { initial, final_state });
        version
    }
}
// 节点
impl<C> RenderGraphBuilder<C> {
    fn record_error(&mut self, error: RgBuildError) {
        log::error!("render graph \"{}\": {}", self.config.name, error);
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn begin_node(&mut self, name: &str, job_type: JobType, is_async: bool, capabilities: CommandCapability) {
        if let Some(open) = self.open_node {
            let error = RgBuildError::NestedNode {
                open: self.nodes.node(open).name.clone(),
                requested: name.to_string(),
            };
            self.record_error(error);
            return;
        }

        let handle = self.nodes.emplace_node(Node::new(name.to_string(), job_type, capabilities, is_async));
        self.open_node = Some(handle);
    }

    fn end_node(&mut self, job_type: JobType) {
        let Some(open) = self.open_node.take() else {
            self.record_error(RgBuildError::EndWithoutBegin {
                found: job_type_tag(job_type).to_string(),
            });
            return;
        };

        let node = self.nodes.node(open);
        if node.job_type != job_type {
            let error = RgBuildError::MismatchedEnd {
                open: node.name.clone(),
                expected: job_type_tag(node.job_type).to_string(),
                found: job_type_tag(job_type).to_string(),
            };
            self.record_error(error);
        }
    }

    pub fn begin_render_pass(&mut self, name: &str, capabilities: CommandCapability) {
        self.begin_node(name, JobType::RenderPass, false, capabilities);
    }

    pub fn end_render_pass(&mut self) {
        self.end_node(JobType::RenderPass);
    }

    /// `is_async` 为 true 时节点可以被调度到专用 compute 队列
    pub fn begin_compute(&mut self, name: &str, is_async: bool, capabilities: CommandCapability) {
        self.begin_node(name, JobType::Compute, is_async, capabilities);
    }

    pub fn end_compute(&mut self) {
        self.end_node(JobType::Compute);
    }

    /// `is_async` 为 true 时节点可以被调度到专用 transfer 队列
    pub fn begin_transfer(&mut self, name: &str, is_async: bool, capabilities: CommandCapability) {
        self.begin_node(name, JobType::Transfer, is_async, capabilities);
    }

    pub fn end_transfer(&mut self) {
        self.end_node(JobType::Transfer);
    }

    /// 为当前打开的节点设置回调
    pub fn set_job(&mut self, job: Job<C>) {
        if let Some(handle) = self.current_node("set_job", None) {
            self.nodes.node_mut(handle).job = Some(job);
        }
    }

    /// 当前打开的节点，并检查节点类型
    fn current_node(&mut self, operation: &str, required: Option<JobType>) -> Option<NodeHandle> {
        let Some(handle) = self.open_node else {
            self.record_error(RgBuildError::AccessOutsideNode {
                operation: operation.to_string(),
            });
            return None;
        };

        let node = self.nodes.node(handle);
        if required.is_some_and(|required| required != node.job_type) {
            let error = RgBuildError::IncompatibleAccess {
                node: node.name.clone(),
                operation: operation.to_string(),
            };
            self.record_error(error);
            return None;
        }

        Some(handle)
    }

    /// 检查版本有效且资源类型匹配
    fn check_version(
        &mut self,
        handle: NodeHandle,
        version: ResourceVersion,
        kind: RgResourceKind,
        operation: &str,
    ) -> bool {
        if !self.registry.is_valid_version(version) {
            let error = RgBuildError::InvalidVersion {
                node: self.nodes.node(handle).name.clone(),
                version: version.0,
            };
            self.record_error(error);
            return false;
        }

        let actual = self.resource_kinds[self.registry.resource_id(version).index()];
        if actual != kind {
            let error = RgBuildError::IncompatibleAccess {
                node: self.nodes.node(handle).name.clone(),
                operation: format!("{operation} on {actual} {version}"),
            };
            self.record_error(error);
            return false;
        }

        true
    }

    fn access(
        &mut self,
        operation: &str,
        required: Option<JobType>,
        version: ResourceVersion,
        kind: RgResourceKind,
    ) -> Option<NodeHandle> {
        let handle = self.current_node(operation, required)?;
        self.check_version(handle, version, kind, operation).then_some(handle)
    }

    /// `Load` 时读取 `version` 并写入它的下一个版本；`Clear` / `DontCare` 时节点直接产生 `version`
    fn attachment_write(
        &mut self,
        operation: &str,
        version: ResourceVersion,
        state: DeviceResourceState,
        load: AttachmentLoad,
        store: AttachmentStore,
    ) -> ResourceVersion {
        let Some(handle) = self.access(operation, Some(JobType::RenderPass), version, RgResourceKind::Texture) else {
            return version;
        };

        let written = match load {
            AttachmentLoad::Load => {
                self.nodes.node_mut(handle).reads.push(ResourceRead { version, state });
                self.registry.next_version(version)
            }
            AttachmentLoad::Clear | AttachmentLoad::DontCare => version,
        };
        self.nodes.node_mut(handle).writes.push(ResourceWrite::attachment(written, state, load, store));
        written
    }

    pub fn add_color_target(
        &mut self,
        version: ResourceVersion,
        load: AttachmentLoad,
        store: AttachmentStore,
    ) -> ResourceVersion {
        self.attachment_write("add_color_target", version, DeviceResourceState::COLOR_TARGET, load, store)
    }

    pub fn set_depth_stencil(
        &mut self,
        version: ResourceVersion,
        load: AttachmentLoad,
        store: AttachmentStore,
    ) -> ResourceVersion {
        self.attachment_write("set_depth_stencil", version, DeviceResourceState::DEPTH_STENCIL_TARGET, load, store)
    }

    /// multisample color target 的 resolve 目标，按声明顺序对应 color target
    pub fn add_color_multisample_resolve(&mut self, version: ResourceVersion) -> ResourceVersion {
        self.attachment_write(
            "add_color_multisample_resolve",
            version,
            DeviceResourceState::COLOR_MULTISAMPLE_RESOLVE,
            AttachmentLoad::DontCare,
            AttachmentStore::Store,
        )
    }

    fn read(&mut self, operation: &str, version: ResourceVersion, state: DeviceResourceState, kind: RgResourceKind) {
        if let Some(handle) = self.access(operation, None, version, kind) {
            self.nodes.node_mut(handle).reads.push(ResourceRead { version, state });
        }
    }

    fn write(&mut self, operation: &str, version: ResourceVersion, state: DeviceResourceState, kind: RgResourceKind) {
        if let Some(handle) = self.access(operation, None, version, kind) {
            self.nodes.node_mut(handle).writes.push(ResourceWrite::new(version, state));
        }
    }

    fn read_write(
        &mut self,
        operation: &str,
        version: ResourceVersion,
        state: DeviceResourceState,
        kind: RgResourceKind,
    ) -> ResourceVersion {
        let Some(handle) = self.access(operation, None, version, kind) else {
            return version;
        };

        let next = self.registry.next_version(version);
        let node = self.nodes.node_mut(handle);
        node.reads.push(ResourceRead { version, state });
        node.writes.push(ResourceWrite::new(next, state));
        next
    }

    pub fn sample_texture(&mut self, version: ResourceVersion) {
        self.read("sample_texture", version, DeviceResourceState::SHADER_SAMPLED, RgResourceKind::Texture);
    }

    /// 以任意状态读取纹理，例如 transfer 节点的 `TRANSFER_SRC`
    pub fn read_texture(&mut self, version: ResourceVersion, state: DeviceResourceState) {
        self.read("read_texture", version, state, RgResourceKind::Texture);
    }

    /// 作为 storage image 写入，节点产生 `version`
    pub fn write_texture(&mut self, version: ResourceVersion) {
        self.write("write_texture", version, DeviceResourceState::STORAGE_TEXTURE_WRITE, RgResourceKind::Texture);
    }

    /// 以任意状态写入纹理，例如 transfer 节点的 `TRANSFER_DST`
    pub fn write_texture_as(&mut self, version: ResourceVersion, state: DeviceResourceState) {
        self.write("write_texture_as", version, state, RgResourceKind::Texture);
    }

    /// 读取 `version` 并写入它的下一个版本
    pub fn read_write_texture(&mut self, version: ResourceVersion) -> ResourceVersion {
        self.read_write("read_write_texture", version, DeviceResourceState::STORAGE_TEXTURE, RgResourceKind::Texture)
    }

    pub fn read_buffer(&mut self, version: ResourceVersion, usage: DeviceResourceState) {
        self.read("read_buffer", version, usage, RgResourceKind::Buffer);
    }

    pub fn write_buffer(&mut self, version: ResourceVersion, usage: DeviceResourceState) {
        self.write("write_buffer", version, usage, RgResourceKind::Buffer);
    }

    pub fn read_write_buffer(&mut self, version: ResourceVersion, usage: DeviceResourceState) -> ResourceVersion {
        self.read_write("read_write_buffer", version, usage, RgResourceKind::Buffer)
    }

    pub fn read_buffer_pack(&mut self, version: ResourceVersion, usage: DeviceResourceState) {
        self.read("read_buffer_pack", version, usage, RgResourceKind::BufferPack);
    }

    pub fn write_buffer_pack(&mut self, version: ResourceVersion, usage: DeviceResourceState) {
        self.write("write_buffer_pack", version, usage, RgResourceKind::BufferPack);
    }

    pub fn read_write_buffer_pack(&mut self, version: ResourceVersion, usage: DeviceResourceState) -> ResourceVersion {
        self.read_write("read_write_buffer_pack", version, usage, RgResourceKind::BufferPack)
    }
}
// build
impl<C> RenderGraphBuilder<C> {
    /// 校验并编译，得到可以执行的 RenderGraph
    ///
    /// transient 资源中依赖尚未绑定的，会推迟到第一次 `execute` 时分配。
    pub fn build(mut self, device: &mut dyn GfxDevice) -> Result<RenderGraph<C>, RgBuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if let Some(open) = self.open_node {
            return Err(RgBuildError::UnclosedNode {
                node: self.nodes.node(open).name.clone(),
            });
        }
        if let Some((_, node)) = self.nodes.iter().find(|(_, node)| node.job.is_none()) {
            return Err(RgBuildError::MissingJob {
                node: node.name.clone(),
            });
        }

        self.validate_versions()?;
        self.add_dependency_edges()?;

        let schedule = self.nodes.topological_sort_with_depth().map_err(|cycle| RgBuildError::Cycle {
            nodes: cycle.nodes.iter().map(|handle| self.nodes.node(*handle).name.clone()).collect(),
        })?;
        let usage_spans = self.compute_usage_spans(&schedule);
        let transient_texture_order = self.sort_transient_textures()?;

        log::debug!(
            "render graph \"{}\": {} nodes, {} edges, max dependency level {}",
            self.config.name,
            self.nodes.len(),
            self.nodes.edge_count(),
            schedule.max_depth
        );

        let mut graph = RenderGraph::new(RenderGraphDesc {
            config: self.config,
            registry: self.registry,
            resource_kinds: self.resource_kinds,
            nodes: self.nodes,
            schedule,
            usage_spans,
            imported: self.imported,
            buffer_packs: self.buffer_packs,
            transient_textures: self.transient_textures,
            transient_texture_order,
            transient_buffers: self.transient_buffers,
        });
        graph.schedule_to_queues(device);
        graph.setup_barriers();
        graph.create_semaphores(device);
        graph.compile(device, false);

        if graph.config().print_execution_plan {
            graph.print_execution_plan();
        }
        if let Some(path) = graph.config().graphviz_dump.clone() {
            if let Err(err) = graph.dump_graphviz(&path, graph.config().graphviz_detailed) {
                log::warn!("failed to dump render graph: {err:#}");
            }
        }

        Ok(graph)
    }

    fn validate_versions(&self) -> Result<(), RgBuildError> {
        for (_, node) in self.nodes.iter() {
            let versions = node.reads.iter().map(|read| read.version).chain(node.writes.iter().map(|w| w.version));
            for version in versions {
                if !self.registry.is_valid_version(version) {
                    return Err(RgBuildError::InvalidVersion {
                        node: node.name.clone(),
                        version: version.0,
                    });
                }
            }
        }
        Ok(())
    }

    /// 写入者 -> 读取者；读取旧版本的节点 -> 写入新版本的节点
    fn add_dependency_edges(&mut self) -> Result<(), RgBuildError> {
        let mut writers: HashMap<ResourceVersion, NodeHandle> = HashMap::new();
        for (handle, node) in self.nodes.iter() {
            for write in &node.writes {
                match writers.insert(write.version, handle) {
                    Some(first) if first != handle => {
                        return Err(RgBuildError::MultipleWriters {
                            version: write.version.0,
                            first: self.nodes.node(first).name.clone(),
                            second: node.name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        let mut readers: HashMap<ResourceVersion, Vec<NodeHandle>> = HashMap::new();
        let mut edges = Vec::new();
        for (handle, node) in self.nodes.iter() {
            for read in &node.reads {
                let version_readers = readers.entry(read.version).or_default();
                if !version_readers.contains(&handle) {
                    version_readers.push(handle);
                }

                match writers.get(&read.version) {
                    Some(&writer) if writer != handle => edges.push((writer, handle)),
                    Some(_) => {}
                    None => {
                        let id = self.registry.resource_id(read.version);
                        let imported_root =
                            self.imported.contains_key(&id) && self.registry.is_root_version(read.version);
                        if !imported_root {
                            return Err(RgBuildError::ReadOfUnwrittenVersion {
                                node: node.name.clone(),
                                version: read.version.0,
                            });
                        }
                    }
                }
            }
        }

        // 新版本与旧版本共享存储，写入前旧版本的读取必须完成
        for (handle, node) in self.nodes.iter() {
            for write in &node.writes {
                let Some(previous) = self.registry.previous_version(write.version) else {
                    continue;
                };
                for &reader in readers.get(&previous).into_iter().flatten() {
                    if reader != handle {
                        edges.push((reader, handle));
                    }
                }
            }
        }

        for (from, to) in edges {
            if !self.nodes.edge_exists(from, to) {
                self.nodes.add_edge(from, to);
            }
        }
        Ok(())
    }

    /// 每个资源在依赖层级上最早与最晚使用它的节点
    fn compute_usage_spans(&self, schedule: &DagSchedule) -> IndexMap<ResourceId, ResourceUsageSpan> {
        let mut spans: IndexMap<ResourceId, ResourceUsageSpan> = IndexMap::new();

        for &handle in &schedule.sorted {
            for (id, state) in resource_usages(&self.registry, self.nodes.node(handle)) {
                spans
                    .entry(id)
                    .and_modify(|span| {
                        span.last_node = handle;
                        span.last_state = state;
                    })
                    .or_insert(ResourceUsageSpan {
                        first_node: handle,
                        first_state: state,
                        last_node: handle,
                        last_state: state,
                    });
            }
        }

        spans
    }

    /// transient 纹理按依赖排序，被依赖者在前
    fn sort_transient_textures(&self) -> Result<Vec<usize>, RgBuildError> {
        let index_by_id: HashMap<ResourceId, usize> =
            self.transient_textures.iter().enumerate().map(|(idx, transient)| (transient.id, idx)).collect();

        let mut dag = Dag::<()>::with_nodes(self.transient_textures.len());
        for (idx, transient) in self.transient_textures.iter().enumerate() {
            for dependency in transient.info.dependencies() {
                if !self.registry.is_valid_version(dependency) {
                    return Err(RgBuildError::InvalidVersion {
                        node: transient.info.name.clone(),
                        version: dependency.0,
                    });
                }

                let id = self.registry.resource_id(dependency);
                let kind = self.resource_kinds[id.index()];
                if kind != RgResourceKind::Texture {
                    return Err(RgBuildError::IncompatibleAccess {
                        node: transient.info.name.clone(),
                        operation: format!("texture info depending on {kind} {dependency}"),
                    });
                }

                if let Some(&dependency_idx) = index_by_id.get(&id) {
                    dag.add_edge(NodeHandle(dependency_idx as u32), NodeHandle(idx as u32));
                }
            }
        }

        let order = dag.topological_sort().map_err(|cycle| RgBuildError::DependentResourceCycle {
            resources: cycle.nodes.iter().map(|handle| self.transient_textures[handle.index()].info.name.clone()).collect(),
        })?;
        Ok(order.into_iter().map(NodeHandle::index).collect_vec())
    }
}
