//! 队列调度与跨队列同步
//!
//! 1. 每个节点分配到一个队列，async 节点在设备有专用队列时使用专用队列
//! 2. 用 SSIS（sufficient synchronization index set）去掉被传递覆盖的跨队列依赖
//! 3. 同一队列中的节点按依赖层级划分成 submit，submit 之间通过 timeline semaphore 同步

use ash::vk;
use itertools::Itertools;
use truvis_render_interface::device::GfxDevice;
use truvis_render_interface::queue::{JobType, QueueKind};
use truvis_render_interface::resource_state::DeviceResourceState;

use crate::dag::NodeHandle;
use crate::graph::{RenderGraph, resource_usages};
use crate::node::Node;

/// submit 对某个队列的等待
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgSubmitWait {
    /// 0 表示不等待
    pub base_value: u64,
    pub stages: vk::PipelineStageFlags2,
}

impl Default for RgSubmitWait {
    fn default() -> Self {
        Self {
            base_value: 0,
            stages: vk::PipelineStageFlags2::NONE,
        }
    }
}

/// 一次队列提交，包含同一队列上若干连续的节点
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgSubmit {
    /// 包含的节点中最大的依赖层级
    pub dependency_level: u32,
    pub nodes: Vec<NodeHandle>,
    /// 以队列序号为下标
    pub waits: [RgSubmitWait; QueueKind::MAX_QUEUES],
    /// 0 表示不 signal
    pub signal_base_value: u64,
}

impl RgSubmit {
    fn new(dependency_level: u32) -> Self {
        Self {
            dependency_level,
            nodes: Vec::new(),
            waits: [RgSubmitWait::default(); QueueKind::MAX_QUEUES],
            signal_base_value: 0,
        }
    }

    #[inline]
    pub fn has_waits(&self) -> bool {
        self.waits.iter().any(|wait| wait.base_value > 0)
    }
}

/// 节点希望使用的队列
fn preferred_queue<C>(node: &Node<C>) -> QueueKind {
    match (node.is_async, node.job_type) {
        (true, JobType::Compute) => QueueKind::AsyncCompute,
        (true, JobType::Transfer) => QueueKind::AsyncTransfer,
        _ => QueueKind::Main,
    }
}

// schedule
impl<C> RenderGraph<C> {
    pub(crate) fn schedule_to_queues(&mut self, device: &dyn GfxDevice) {
        self.assign_queues(device);
        self.reduce_cross_queue_dependencies();
        self.build_submits();
    }

    fn assign_queues(&mut self, device: &dyn GfxDevice) {
        let queue_enabled = |queue: QueueKind| match queue {
            QueueKind::Main => true,
            QueueKind::AsyncCompute => self.config.use_async_compute && device.has_queue(queue),
            QueueKind::AsyncTransfer => self.config.use_async_transfer && device.has_queue(queue),
        };

        let mut node_queue_kinds = Vec::with_capacity(self.nodes.len());
        for (_, node) in self.nodes.iter() {
            let preferred = preferred_queue(node);
            let queue = if queue_enabled(preferred) && preferred.capability().contains(node.capabilities) {
                preferred
            } else {
                if preferred != QueueKind::Main {
                    log::debug!("node \"{}\" falls back to the main queue", node.name);
                }
                QueueKind::Main
            };
            node_queue_kinds.push(queue);
        }

        // main 总是存在且序号为 0
        self.queues = [QueueKind::Main, QueueKind::AsyncCompute, QueueKind::AsyncTransfer]
            .into_iter()
            .filter(|queue| *queue == QueueKind::Main || node_queue_kinds.contains(queue))
            .collect_vec();

        self.node_queues = node_queue_kinds
            .iter()
            .map(|kind| self.queues.iter().position(|q| q == kind).unwrap_or_default())
            .collect_vec();

        self.nodes_per_queue = vec![Vec::new(); self.queues.len()];
        for &handle in &self.sorted_nodes {
            self.nodes_per_queue[self.node_queues[handle.index()]].push(handle);
        }
    }

    /// 只保留跨队列依赖中必要的那些
    ///
    /// 等待一个节点即等待了它已经同步过的所有队列上的位置，
    /// 同一队列中前面的节点已经等待过的位置也不需要再等。
    fn reduce_cross_queue_dependencies(&mut self) {
        let node_count = self.nodes.len();
        // 节点在全局执行顺序中的序号，从 1 开始
        let mut sync_index = vec![0u64; node_count];
        for (position, &handle) in self.sorted_nodes.iter().enumerate() {
            sync_index[handle.index()] = position as u64 + 1;
        }

        let mut ssis = vec![[0u64; QueueKind::MAX_QUEUES]; node_count];
        // 每个队列已经同步到的位置
        let mut queue_synced = vec![[0u64; QueueKind::MAX_QUEUES]; self.queues.len()];

        for &handle in &self.sorted_nodes {
            let own_queue = self.node_queues[handle.index()];

            let mut required = [0u64; QueueKind::MAX_QUEUES];
            let mut candidates = Vec::new();
            for &pred in self.predecessors.adjacency(handle) {
                let pred_queue = self.node_queues[pred.index()];
                if pred_queue == own_queue {
                    continue;
                }
                required[pred_queue] = required[pred_queue].max(sync_index[pred.index()]);
                candidates.push(pred);
            }

            let synced = queue_synced[own_queue];
            let mut uncovered = (0..self.queues.len())
                .filter(|&queue| required[queue] > 0 && synced[queue] < required[queue])
                .collect_vec();

            let mut chosen = Vec::new();
            while !uncovered.is_empty() {
                let covers = |dep: NodeHandle| {
                    uncovered.iter().filter(|&&queue| ssis[dep.index()][queue] >= required[queue]).count()
                };
                let Some(best) = candidates
                    .iter()
                    .copied()
                    .filter(|dep| !chosen.contains(dep))
                    .max_by_key(|&dep| (covers(dep), sync_index[dep.index()]))
                else {
                    break;
                };
                if covers(best) == 0 {
                    break;
                }

                uncovered.retain(|&queue| ssis[best.index()][queue] < required[queue]);
                chosen.push(best);
            }

            let mut node_ssis = synced;
            for dep in &chosen {
                for queue in 0..QueueKind::MAX_QUEUES {
                    node_ssis[queue] = node_ssis[queue].max(ssis[dep.index()][queue]);
                }
            }
            node_ssis[own_queue] = sync_index[handle.index()];

            ssis[handle.index()] = node_ssis;
            queue_synced[own_queue] = node_ssis;
            self.cross_queue_dependencies[handle.index()] = chosen;
        }
    }

    /// 等待其他队列时的 stage：节点使用资源的最早 stage
    fn wait_stages(&self, handle: NodeHandle) -> vk::PipelineStageFlags2 {
        let node = self.nodes.node(handle);
        let state = resource_usages(&self.registry, node)
            .values()
            .fold(DeviceResourceState::UNDEFINED, |acc, state| acc | *state);
        if state.is_undefined() {
            vk::PipelineStageFlags2::ALL_COMMANDS
        } else {
            state.pipeline_stages(node.job_type)
        }
    }

    fn build_submits(&mut self) {
        let node_count = self.nodes.len();
        let mut is_signaler = vec![false; node_count];
        for deps in &self.cross_queue_dependencies {
            for dep in deps {
                is_signaler[dep.index()] = true;
            }
        }
        let is_waiter = |handle: NodeHandle| !self.cross_queue_dependencies[handle.index()].is_empty();

        // 按依赖层级切分：前一组有被等待的节点，或者后一组有需要等待的节点
        let mut submits = vec![Vec::new(); self.queues.len()];
        for (queue_idx, queue_nodes) in self.nodes_per_queue.iter().enumerate() {
            let groups = queue_nodes.iter().copied().group_by(|handle| self.dependency_levels[handle.index()]);
            let mut queue_submits: Vec<RgSubmit> = Vec::new();
            let mut previous_group_signals = false;

            for (level, group) in &groups {
                let group = group.collect_vec();
                let group_waits = group.iter().any(|&handle| is_waiter(handle));

                match queue_submits.last_mut() {
                    Some(submit) if !previous_group_signals && !group_waits => {
                        submit.dependency_level = level;
                        submit.nodes.extend(group.iter().copied());
                    }
                    _ => {
                        let mut submit = RgSubmit::new(level);
                        submit.nodes.extend(group.iter().copied());
                        queue_submits.push(submit);
                    }
                }
                previous_group_signals = group.iter().any(|handle| is_signaler[handle.index()]);
            }

            submits[queue_idx] = queue_submits;
        }

        for (queue_submits, per_queue) in submits.iter().zip(self.nodes_per_queue.iter()) {
            debug_assert_eq!(queue_submits.iter().map(|s| s.nodes.len()).sum::<usize>(), per_queue.len());
        }
        for (queue_idx, queue_submits) in submits.iter().enumerate() {
            for (submit_idx, submit) in queue_submits.iter().enumerate() {
                for &handle in &submit.nodes {
                    self.node_submits[handle.index()] = submit_idx;
                    debug_assert_eq!(self.node_queues[handle.index()], queue_idx);
                }
            }
        }

        // signal 与 wait
        for queue_idx in 0..submits.len() {
            let submit_count = submits[queue_idx].len();
            for submit_idx in 0..submit_count {
                let signals = submit_idx + 1 == submit_count
                    || submits[queue_idx][submit_idx].nodes.iter().any(|handle| is_signaler[handle.index()]);
                if signals {
                    submits[queue_idx][submit_idx].signal_base_value = submit_idx as u64 + 1;
                }

                let mut waits = [RgSubmitWait::default(); QueueKind::MAX_QUEUES];
                for &handle in &submits[queue_idx][submit_idx].nodes {
                    for &dep in &self.cross_queue_dependencies[handle.index()] {
                        let dep_queue = self.node_queues[dep.index()];
                        let wait = &mut waits[dep_queue];
                        wait.base_value = wait.base_value.max(self.node_submits[dep.index()] as u64 + 1);
                        wait.stages |= self.wait_stages(handle);
                    }
                }
                submits[queue_idx][submit_idx].waits = waits;
            }
        }

        self.submits = submits;
    }

    /// 每个有 submit 的队列创建一个 timeline semaphore
    pub(crate) fn create_semaphores(&mut self, device: &mut dyn GfxDevice) {
        self.semaphores = self
            .queues
            .iter()
            .zip(self.submits.iter())
            .map(|(queue, submits)| {
                (!submits.is_empty())
                    .then(|| device.create_timeline_semaphore(0, &format!("{}-{}", self.config.name, queue)))
            })
            .collect_vec();
    }

    /// 某一帧中 submit 的 semaphore 值
    ///
    /// 每帧占用 `submit 数量 + 1` 个值，不同帧之间的值严格递增
    #[inline]
    pub(crate) fn semaphore_value(&self, absolute_frame: u64, queue_idx: usize, base_value: u64) -> u64 {
        absolute_frame * (self.submits[queue_idx].len() as u64 + 1) + base_value
    }
}

#[cfg(test)]
mod tests {
    use truvis_render_interface::dummy_device::DummyDevice;
    use truvis_render_interface::queue::CommandCapability;
    use truvis_render_interface::rendering_info::{AttachmentLoad, AttachmentStore};
    use truvis_render_interface::resource_info::BufferInfo;

    use crate::builder::RenderGraphBuilder;
    use crate::config::RenderGraphConfig;
    use crate::dependent_info::DependentTextureInfo;

    use super::*;

    fn noop_job() -> crate::node::Job<()> {
        Box::new(|_, _, _| {})
    }

    /// main: gbuffer -> lighting；async compute: ssao 读 gbuffer，lighting 读 ssao
    fn build_async_graph(device: &mut DummyDevice, use_async_compute: bool) -> RenderGraph<()> {
        let config = RenderGraphConfig {
            use_async_compute,
            ..RenderGraphConfig::named("async")
        };
        let mut builder = RenderGraphBuilder::<()>::new(config);
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let depth = builder.declare_transient_texture(
            DependentTextureInfo::new("depth", DeviceResourceState::DEPTH_STENCIL_TARGET)
                .format(vk::Format::D32_SFLOAT)
                .extent(extent),
        );
        let ao = builder.declare_transient_texture(
            DependentTextureInfo::new("ao", DeviceResourceState::STORAGE_TEXTURE).format(vk::Format::R8_UNORM).extent(extent),
        );
        let color = builder.declare_transient_texture(
            DependentTextureInfo::new("color", DeviceResourceState::COLOR_TARGET).extent(extent),
        );

        builder.begin_render_pass("gbuffer", CommandCapability::GRAPHICS);
        builder.set_depth_stencil(depth, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(noop_job());
        builder.end_render_pass();

        builder.begin_compute("ssao", true, CommandCapability::COMPUTE);
        builder.sample_texture(depth);
        builder.write_texture(ao);
        builder.set_job(noop_job());
        builder.end_compute();

        builder.begin_render_pass("lighting", CommandCapability::GRAPHICS);
        builder.sample_texture(ao);
        builder.add_color_target(color, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(noop_job());
        builder.end_render_pass();

        builder.build(device).unwrap()
    }

    #[test]
    fn test_async_node_on_dedicated_queue() {
        let mut device = DummyDevice::with_async_queues();
        let graph = build_async_graph(&mut device, true);

        let ssao = graph.node_by_name("ssao").unwrap();
        let lighting = graph.node_by_name("lighting").unwrap();
        let gbuffer = graph.node_by_name("gbuffer").unwrap();

        assert_eq!(graph.queues(), &[QueueKind::Main, QueueKind::AsyncCompute]);
        assert_eq!(graph.queue_of(ssao), QueueKind::AsyncCompute);
        assert_eq!(graph.queue_of(lighting), QueueKind::Main);
        assert_eq!(graph.cross_queue_dependencies(ssao), &[gbuffer]);
        assert_eq!(graph.cross_queue_dependencies(lighting), &[ssao]);

        // main 被切成两个 submit：gbuffer 之后 signal，lighting 之前 wait
        let main_submits = graph.submits(QueueKind::Main);
        assert_eq!(main_submits.len(), 2);
        assert_eq!(main_submits[0].nodes, vec![gbuffer]);
        assert_eq!(main_submits[0].signal_base_value, 1);
        assert_eq!(main_submits[1].waits[1].base_value, 1);
        assert!(main_submits[1].waits[1].stages.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));

        let compute_submits = graph.submits(QueueKind::AsyncCompute);
        assert_eq!(compute_submits.len(), 1);
        assert_eq!(compute_submits[0].waits[0].base_value, 1);
        assert_eq!(compute_submits[0].signal_base_value, 1);
    }

    #[test]
    fn test_async_node_falls_back_to_main() {
        let mut device = DummyDevice::new();
        let graph = build_async_graph(&mut device, true);
        assert_eq!(graph.queues(), &[QueueKind::Main]);
        assert!(graph.submits(QueueKind::AsyncCompute).is_empty());

        let mut device = DummyDevice::with_async_queues();
        let graph = build_async_graph(&mut device, false);
        assert_eq!(graph.queues(), &[QueueKind::Main]);

        // 单队列时没有跨队列依赖，所有节点在一个 submit 中
        let main_submits = graph.submits(QueueKind::Main);
        assert_eq!(main_submits.len(), 1);
        assert_eq!(main_submits[0].nodes.len(), 3);
        assert!(!main_submits[0].has_waits());
        for handle in graph.sorted_nodes() {
            assert!(graph.cross_queue_dependencies(*handle).is_empty());
        }
    }

    #[test]
    fn test_transitive_cross_queue_dependency_is_removed() {
        let mut device = DummyDevice::with_async_queues();
        let mut builder = RenderGraphBuilder::<()>::new(RenderGraphConfig::named("ssis"));
        let buffer_a = builder.declare_transient_buffer(BufferInfo::new(
            "a",
            256,
            DeviceResourceState::STORAGE_BUFFER,
        ));
        let buffer_b = builder.declare_transient_buffer(BufferInfo::new(
            "b",
            256,
            DeviceResourceState::STORAGE_BUFFER,
        ));

        // main: upload 写 a
        builder.begin_compute("upload", false, CommandCapability::COMPUTE);
        builder.write_buffer(buffer_a, DeviceResourceState::STORAGE_BUFFER_WRITE);
        builder.set_job(noop_job());
        builder.end_compute();

        // async: cull 读 a 写 b
        builder.begin_compute("cull", true, CommandCapability::COMPUTE);
        builder.read_buffer(buffer_a, DeviceResourceState::STORAGE_BUFFER_READ);
        builder.write_buffer(buffer_b, DeviceResourceState::STORAGE_BUFFER_WRITE);
        builder.set_job(noop_job());
        builder.end_compute();

        // async: consume 同时读 a 和 b，只需要队列内的顺序
        builder.begin_compute("consume", true, CommandCapability::COMPUTE);
        builder.read_buffer(buffer_a, DeviceResourceState::STORAGE_BUFFER_READ);
        builder.read_buffer(buffer_b, DeviceResourceState::STORAGE_BUFFER_READ);
        builder.set_job(noop_job());
        builder.end_compute();

        let graph = builder.build(&mut device).unwrap();
        let upload = graph.node_by_name("upload").unwrap();
        let cull = graph.node_by_name("cull").unwrap();
        let consume = graph.node_by_name("consume").unwrap();

        assert_eq!(graph.cross_queue_dependencies(cull), &[upload]);
        // upload 已经被 cull 等待过
        assert!(graph.cross_queue_dependencies(consume).is_empty());
    }

    #[test]
    fn test_semaphore_values_increase_across_frames() {
        let mut device = DummyDevice::with_async_queues();
        let graph = build_async_graph(&mut device, true);

        let mut last = 0;
        for frame in 0..4 {
            for submit in graph.submits(QueueKind::Main) {
                if submit.signal_base_value == 0 {
                    continue;
                }
                let value = graph.semaphore_value(frame, 0, submit.signal_base_value);
                assert!(value > last);
                last = value;
            }
        }
        assert!(graph.semaphore(QueueKind::Main).is_some());
        assert!(graph.semaphore(QueueKind::AsyncCompute).is_some());
        assert!(graph.semaphore(QueueKind::AsyncTransfer).is_none());
    }
}
