//! Barrier 计算
//!
//! 按执行顺序模拟每个资源的状态，在节点前后插入 barrier。
//! 计算时只记录 `ResourceId`，物理句柄在编译时填入。
//!
//! 资源的使用按写入分段：一次写入，以及之后对这个版本的所有读取。
//! barrier 的源只取节点在 DAG 上的前驱（被读版本的写入者，或者 WAR 边等待的读取者），
//! 跨队列的 release 与 acquire 之间总有 semaphore 保证先后。

use std::collections::HashMap;

use ash::vk;
use truvis_render_interface::barrier::{GfxBufferBarrier, GfxDependencyInfo, GfxImageBarrier};
use truvis_render_interface::device::GfxDevice;
use truvis_render_interface::queue::QueueKind;
use truvis_render_interface::resource_info::BufferResource;
use truvis_render_interface::resource_state::GfxImageState;

use crate::dag::NodeHandle;
use crate::graph::{RenderGraph, resource_usages};
use crate::resource_version_registry::{ResourceId, RgResource, RgResourceKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgImageBarrier {
    pub resource: ResourceId,
    pub barrier: GfxImageBarrier,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgBufferBarrier {
    pub resource: ResourceId,
    pub barrier: GfxBufferBarrier,
}

/// 节点执行前后的 barrier
#[derive(Clone, Debug, Default)]
pub struct NodeBarriers {
    pub in_images: Vec<RgImageBarrier>,
    pub in_buffers: Vec<RgBufferBarrier>,
    pub out_images: Vec<RgImageBarrier>,
    pub out_buffers: Vec<RgBufferBarrier>,

    /// buffer pack 的 barrier，录制时展开到包内的每个缓冲区
    pub in_buffer_packs: Vec<RgBufferBarrier>,
    pub out_buffer_packs: Vec<RgBufferBarrier>,

    /// 编译后带有物理句柄的 barrier
    pub in_info: GfxDependencyInfo,
    pub out_info: GfxDependencyInfo,
}

impl NodeBarriers {
    #[inline]
    pub fn in_barrier_count(&self) -> usize {
        self.in_images.len() + self.in_buffers.len() + self.in_buffer_packs.len()
    }

    #[inline]
    pub fn out_barrier_count(&self) -> usize {
        self.out_images.len() + self.out_buffers.len() + self.out_buffer_packs.len()
    }

    #[inline]
    pub fn has_barriers(&self) -> bool {
        self.in_barrier_count() + self.out_barrier_count() > 0
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BarrierSide {
    In,
    Out,
}

/// 资源的一次使用
#[derive(Clone, Copy, Debug)]
struct ResourceUse {
    node: NodeHandle,
    queue: QueueKind,
    /// 自上一次 barrier 以来所有使用的 stage/access 的并集，缓冲区的 layout 总是 `UNDEFINED`
    image: GfxImageState,
}

/// 资源在当前段内的状态
#[derive(Clone, Debug)]
struct ResourceTrack {
    /// 当前段的写入者，第一次使用是读取时为 `None`
    producer: Option<ResourceUse>,
    /// 写入之后的读取者，同一队列上的读取合并为一项
    readers: Vec<ResourceUse>,
    /// 拥有资源的队列
    owner: QueueKind,
    layout: vk::ImageLayout,
    /// 已经发生的写入次数，即当前段的序号
    epoch: usize,
    /// 当前段的读取者分布在多个队列上，写入者之后已经做过可见性转换
    shared: bool,
}

impl ResourceTrack {
    fn first_use(current: ResourceUse, is_write: bool) -> Self {
        Self {
            producer: is_write.then_some(current),
            readers: if is_write { Vec::new() } else { vec![current] },
            owner: current.queue,
            layout: current.image.layout,
            epoch: usize::from(is_write),
            shared: false,
        }
    }

    fn reader_on(&self, queue: QueueKind) -> Option<&ResourceUse> {
        self.readers.iter().find(|reader| reader.queue == queue)
    }

    /// 资源本帧最后的使用者：拥有者队列上的读取者，其次是任意读取者，最后是写入者
    fn last_use(&self) -> Option<ResourceUse> {
        self.reader_on(self.owner).or(self.readers.last()).or(self.producer.as_ref()).copied()
    }
}

// barrier 计算
impl<C> RenderGraph<C> {
    pub(crate) fn setup_barriers(&mut self) {
        for barriers in &mut self.node_barriers {
            barriers.clear();
        }

        let reader_queues = self.epoch_reader_queues();
        let mut tracks: HashMap<ResourceId, ResourceTrack> = HashMap::new();

        for position in 0..self.sorted_nodes.len() {
            let handle = self.sorted_nodes[position];
            let node = self.nodes.node(handle);
            let job_type = node.job_type;
            let queue = self.queue_of(handle);

            for (id, state) in resource_usages(&self.registry, node) {
                let is_texture = self.resource_kind(id) == RgResourceKind::Texture;
                let image = if is_texture {
                    state.image_state(job_type)
                } else {
                    GfxImageState::new(state.pipeline_stages(job_type), state.access_flags(), vk::ImageLayout::UNDEFINED)
                };
                let current = ResourceUse {
                    node: handle,
                    queue,
                    image,
                };

                match tracks.get_mut(&id) {
                    None => {
                        // 缓冲区第一次使用只记录状态
                        if is_texture {
                            let initial_write =
                                self.imported.get(&id).is_some_and(|imported| imported.initial.is_write());
                            let src = self.initial_image_state(id);
                            if src.layout != image.layout || initial_write || state.is_write() {
                                self.push_barrier(handle, BarrierSide::In, id, src, image, None);
                            }
                        }
                        tracks.insert(id, ResourceTrack::first_use(current, state.is_write()));
                    }
                    Some(track) if state.is_write() => self.write_barrier(id, track, current),
                    Some(track) => {
                        let queues = reader_queues
                            .get(&id)
                            .and_then(|epochs| epochs.get(track.epoch))
                            .map(Vec::as_slice)
                            .unwrap_or_default();
                        self.read_barrier(id, track, current, queues);
                    }
                }
            }
        }

        self.final_transitions(&tracks);
    }

    /// 每个资源每一段内只读使用者所在的队列，以段的序号为下标
    fn epoch_reader_queues(&self) -> HashMap<ResourceId, Vec<Vec<QueueKind>>> {
        let mut epochs: HashMap<ResourceId, Vec<Vec<QueueKind>>> = HashMap::new();
        for &handle in &self.sorted_nodes {
            let queue = self.queue_of(handle);
            for (id, state) in resource_usages(&self.registry, self.nodes.node(handle)) {
                let resource_epochs = epochs.entry(id).or_insert_with(|| vec![Vec::new()]);
                if state.is_write() {
                    resource_epochs.push(Vec::new());
                } else if let Some(queues) = resource_epochs.last_mut()
                    && !queues.contains(&queue)
                {
                    queues.push(queue);
                }
            }
        }
        epochs
    }

    /// 本帧第一次使用时的源状态
    fn initial_image_state(&self, id: ResourceId) -> GfxImageState {
        if let Some(imported) = self.imported.get(&id) {
            let initial = imported.initial;
            if initial.is_undefined() {
                return GfxImageState::UNDEFINED;
            }
            let access = if initial.is_write() { initial.access_flags() } else { vk::AccessFlags2::NONE };
            return GfxImageState::new(vk::PipelineStageFlags2::ALL_COMMANDS, access, initial.image_layout());
        }

        // transient 的内容不需要保留，但要等待上一帧的最后一次使用
        match self.usage_spans.get(&id) {
            Some(span) => {
                let last_job_type = self.nodes.node(span.last_node).job_type;
                GfxImageState::new(
                    span.last_state.pipeline_stages(last_job_type),
                    vk::AccessFlags2::NONE,
                    vk::ImageLayout::UNDEFINED,
                )
            }
            None => GfxImageState::UNDEFINED,
        }
    }

    fn read_barrier(&mut self, id: ResourceId, track: &mut ResourceTrack, current: ResourceUse, reader_queues: &[QueueKind]) {
        let dst = current.image;

        // 同一队列上已经有读取者，layout 相同时合并，由下一个写入者统一等待
        if let Some(reader) = track.readers.iter_mut().find(|reader| reader.queue == current.queue) {
            if reader.image.layout == dst.layout {
                reader.node = current.node;
                reader.image.stage |= dst.stage;
                reader.image.access |= dst.access;
            } else {
                let src = reader.image;
                *reader = current;
                track.layout = dst.layout;
                self.push_barrier(current.node, BarrierSide::In, id, src, dst, None);
            }
            return;
        }

        if reader_queues.len() > 1 {
            self.shared_read_barrier(id, track, current);
            return;
        }

        match track.producer {
            // 这一段的读取者都在同一个队列上，所有权从写入者的队列转移过来
            Some(producer) if producer.queue != current.queue => {
                self.push_ownership_transfer(id, producer, track.layout, current, vk::PipelineStageFlags2::NONE);
                track.owner = current.queue;
            }
            Some(producer) => {
                let src = GfxImageState::new(producer.image.stage, producer.image.access, track.layout);
                self.push_barrier(current.node, BarrierSide::In, id, src, dst, None);
            }
            None if track.layout != dst.layout => {
                let src = GfxImageState::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE, track.layout);
                self.push_barrier(current.node, BarrierSide::In, id, src, dst, None);
            }
            None => {}
        }
        track.layout = dst.layout;
        track.readers.push(current);
    }

    /// 同一段的读取者分布在多个队列上
    ///
    /// 并发的读取者之间没有先后，不能转移所有权。写入者之后统一做一次可见性转换，
    /// 转到第一个读取者的 layout，之后各队列的读取者只依赖 semaphore。
    fn shared_read_barrier(&mut self, id: ResourceId, track: &mut ResourceTrack, current: ResourceUse) {
        let dst = current.image;

        if !track.shared {
            track.shared = true;
            if let Some(producer) = track.producer {
                let src = GfxImageState::new(producer.image.stage, producer.image.access, track.layout);
                let visible =
                    GfxImageState::new(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ, dst.layout);
                self.push_barrier(producer.node, BarrierSide::Out, id, src, visible, None);
                track.layout = dst.layout;
            }
            log::warn!(
                "render graph \"{}\": {} is read on several queues at once, queue ownership is not transferred",
                self.config.name,
                self.resource_name(id)
            );
        }

        if track.layout != dst.layout {
            log::warn!(
                "render graph \"{}\": node \"{}\" reads {} as {:?} while other queues read it as {:?}",
                self.config.name,
                self.nodes.node(current.node).name,
                self.resource_name(id),
                dst.layout,
                track.layout
            );
            let src = GfxImageState::new(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::NONE, track.layout);
            self.push_barrier(current.node, BarrierSide::In, id, src, dst, None);
            track.layout = dst.layout;
        }
        track.readers.push(current);
    }

    fn write_barrier(&mut self, id: ResourceId, track: &mut ResourceTrack, current: ResourceUse) {
        let dst = current.image;

        if track.owner != current.queue {
            // 拥有者队列上最后的使用者 release，它通过 RAW 或 WAR 边是当前节点的前驱
            let from = track.reader_on(track.owner).or(track.producer.as_ref()).copied();
            let wait_stage = track
                .reader_on(current.queue)
                .map(|reader| reader.image.stage)
                .unwrap_or(vk::PipelineStageFlags2::NONE);
            if let Some(from) = from {
                self.push_ownership_transfer(id, from, track.layout, current, wait_stage);
            }
        } else {
            // 其他队列上的读取者由 semaphore 保证先于写入
            let last = track
                .reader_on(current.queue)
                .or(track.producer.as_ref())
                .map(|last| last.image)
                .unwrap_or(GfxImageState::UNDEFINED);
            let src = GfxImageState::new(last.stage, last.access, track.layout);
            self.push_barrier(current.node, BarrierSide::In, id, src, dst, None);
        }

        track.producer = Some(current);
        track.readers.clear();
        track.owner = current.queue;
        track.layout = dst.layout;
        track.epoch += 1;
        track.shared = false;
    }

    /// 源队列上的 `from` release，目标队列上的 `to` acquire，两侧的 layout 转换一致
    fn push_ownership_transfer(
        &mut self,
        id: ResourceId,
        from: ResourceUse,
        layout: vk::ImageLayout,
        to: ResourceUse,
        wait_stage: vk::PipelineStageFlags2,
    ) {
        let transfer = Some((from.queue, to.queue));
        let release_src = GfxImageState::new(from.image.stage, from.image.access, layout);
        let release_dst = GfxImageState::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE, to.image.layout);
        let acquire_src = GfxImageState::new(wait_stage, vk::AccessFlags2::NONE, layout);

        self.push_barrier(from.node, BarrierSide::Out, id, release_src, release_dst, transfer);
        self.push_barrier(to.node, BarrierSide::In, id, acquire_src, to.image, transfer);
    }

    fn push_barrier(
        &mut self,
        node: NodeHandle,
        side: BarrierSide,
        id: ResourceId,
        src: GfxImageState,
        dst: GfxImageState,
        transfer: Option<(QueueKind, QueueKind)>,
    ) {
        let kind = self.resource_kind(id);
        let barriers = &mut self.node_barriers[node.index()];

        if kind == RgResourceKind::Texture {
            let mut barrier = GfxImageBarrier::new().src_state(src).dst_state(dst);
            if let Some((src_queue, dst_queue)) = transfer {
                barrier = barrier.queue_family_transfer(src_queue, dst_queue);
            }
            let images = match side {
                BarrierSide::In => &mut barriers.in_images,
                BarrierSide::Out => &mut barriers.out_images,
            };
            images.push(RgImageBarrier { resource: id, barrier });
            return;
        }

        let mut barrier = GfxBufferBarrier::new().src_mask(src.stage, src.access).dst_mask(dst.stage, dst.access);
        if let Some((src_queue, dst_queue)) = transfer {
            barrier = barrier.queue_family_transfer(src_queue, dst_queue);
        }
        let buffers = match (kind, side) {
            (RgResourceKind::BufferPack, BarrierSide::In) => &mut barriers.in_buffer_packs,
            (RgResourceKind::BufferPack, BarrierSide::Out) => &mut barriers.out_buffer_packs,
            (_, BarrierSide::In) => &mut barriers.in_buffers,
            (_, BarrierSide::Out) => &mut barriers.out_buffers,
        };
        buffers.push(RgBufferBarrier { resource: id, barrier });
    }

    /// 外部纹理在最后一次使用之后转换到指定的最终状态
    fn final_transitions(&mut self, tracks: &HashMap<ResourceId, ResourceTrack>) {
        let transitions = self
            .imported
            .iter()
            .filter(|(id, usage)| {
                !usage.final_state.is_undefined() && self.resource_kind(**id) == RgResourceKind::Texture
            })
            .filter_map(|(id, usage)| tracks.get(id).map(|track| (*id, usage.final_state, track)))
            .filter_map(|(id, final_state, track)| {
                track.last_use().map(|last| (id, final_state, last, track.layout, track.readers.is_empty()))
            })
            .collect::<Vec<_>>();

        for (id, final_state, last, layout, last_wrote) in transitions {
            let final_layout = final_state.image_layout();
            if layout == final_layout && !last_wrote {
                continue;
            }

            let src = GfxImageState::new(last.image.stage, last.image.access, layout);
            let dst = GfxImageState::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, final_layout);
            self.push_barrier(last.node, BarrierSide::Out, id, src, dst, None);
        }
    }
}
// 链接物理资源
impl<C> RenderGraph<C> {
    /// 把物理句柄填入所有 barrier，并生成录制时使用的 `GfxDependencyInfo`
    ///
    /// # Panics
    /// 有资源尚未绑定
    pub(crate) fn link_barriers_to_resources(&mut self, device: &dyn GfxDevice) {
        let registry = &self.registry;
        let texture_handle = |id: ResourceId| match registry.resource(id) {
            RgResource::Texture(texture) => texture.handle,
            other => panic!("texture resource {id:?} is not bound: {other:?}"),
        };
        let buffer_handle = |id: ResourceId| match registry.resource(id) {
            RgResource::Buffer(buffer) => buffer.handle,
            other => panic!("buffer resource {id:?} is not bound: {other:?}"),
        };

        for barriers in &mut self.node_barriers {
            for image in barriers.in_images.iter_mut().chain(barriers.out_images.iter_mut()) {
                let handle = texture_handle(image.resource);
                let format = device.texture_info(handle).map(|info| info.format).unwrap_or(vk::Format::UNDEFINED);
                image.barrier = image.barrier.clone().texture(handle).image_aspect_flag(GfxImageBarrier::infer_image_aspect(format));
            }
            for buffer in barriers.in_buffers.iter_mut().chain(barriers.out_buffers.iter_mut()) {
                buffer.barrier = buffer.barrier.clone().buffer(buffer_handle(buffer.resource));
            }
            Self::rebuild_dependency_infos(barriers);
        }
    }

    /// 外部缓冲区被重新绑定后，只需要替换句柄
    pub(crate) fn relink_buffer_barriers(&mut self, id: ResourceId, buffer: BufferResource) {
        for barriers in &mut self.node_barriers {
            let mut changed = false;
            for rg_barrier in barriers.in_buffers.iter_mut().chain(barriers.out_buffers.iter_mut()) {
                if rg_barrier.resource == id {
                    rg_barrier.barrier.buffer = Some(buffer.handle);
                    changed = true;
                }
            }
            if changed {
                Self::rebuild_dependency_infos(barriers);
            }
        }
    }

    fn rebuild_dependency_infos(barriers: &mut NodeBarriers) {
        barriers.in_info = GfxDependencyInfo {
            image_barriers: barriers.in_images.iter().map(|b| b.barrier.clone()).collect(),
            buffer_barriers: barriers.in_buffers.iter().map(|b| b.barrier.clone()).collect(),
        };
        barriers.out_info = GfxDependencyInfo {
            image_barriers: barriers.out_images.iter().map(|b| b.barrier.clone()).collect(),
            buffer_barriers: barriers.out_buffers.iter().map(|b| b.barrier.clone()).collect(),
        };
    }
}
