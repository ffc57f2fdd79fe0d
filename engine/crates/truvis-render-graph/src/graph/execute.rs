//! 录制与提交

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use truvis_render_interface::barrier::GfxDependencyInfo;
use truvis_render_interface::device::{GfxCommandRecorder, GfxDevice};
use truvis_render_interface::queue::JobType;
use truvis_render_interface::rendering_info::GfxRenderingInfo;
use truvis_render_interface::submit_info::{GfxSemaphoreSubmit, GfxSubmitInfo};

use crate::dag::NodeHandle;
use crate::graph::{RenderGraph, RgBufferBarrier};

/// graph 与外部的同步，例如等待 swapchain 的 acquire，signal 给 present
///
/// `wait` 加在 main 队列的第一个 submit 上，`signal` 加在 main 队列的最后一个 submit 上
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgExternalSync {
    pub wait: Option<GfxSemaphoreSubmit>,
    pub signal: Option<GfxSemaphoreSubmit>,
}

impl<C> RenderGraph<C> {
    /// 录制并提交一帧
    ///
    /// 外部资源被重新导入过，或者 build 时资源未能全部绑定，会先重新编译。
    ///
    /// # Panics
    /// 编译时仍有资源未绑定
    pub fn execute(
        &mut self,
        device: &mut dyn GfxDevice,
        ctx: &mut C,
        external: Option<&RgExternalSync>,
    ) -> anyhow::Result<()> {
        if self.dirty || !self.compiled {
            self.compile(device, true);
        }

        if self.submits[0].is_empty() {
            log::warn!("render graph \"{}\": no work on the main queue", self.config.name);
        }

        let frame = device.absolute_frame();

        // 同一队列内 level 递增，排序后仍保持队列内的顺序
        let order = self
            .submits
            .iter()
            .enumerate()
            .flat_map(|(queue_idx, submits)| {
                submits.iter().enumerate().map(move |(submit_idx, submit)| (submit.dependency_level, queue_idx, submit_idx))
            })
            .sorted()
            .collect_vec();

        for (_, queue_idx, submit_idx) in order {
            let queue = self.queues[queue_idx];
            let mut recorder = device.allocate_command_recorder(queue_idx, queue);
            for &handle in &self.submits[queue_idx][submit_idx].nodes {
                self.record_node(handle, ctx, recorder.as_mut());
            }

            let submit_info = self.submit_info(queue_idx, submit_idx, frame, external);
            device.submit(queue, recorder, &submit_info).with_context(|| {
                format!("Failed to submit #{} to queue {} of render graph \"{}\"", submit_idx, queue, self.config.name)
            })?;
        }

        Ok(())
    }

    fn record_node(&self, handle: NodeHandle, ctx: &mut C, recorder: &mut dyn GfxCommandRecorder) {
        let node = self.nodes.node(handle);
        let barriers = &self.node_barriers[handle.index()];

        recorder.begin_label(&node.name, node.job_type.label_color());
        if !barriers.in_info.is_empty() {
            recorder.pipeline_barrier(&barriers.in_info);
        }
        let in_packs = self.buffer_pack_dependency_info(&barriers.in_buffer_packs);
        if !in_packs.is_empty() {
            recorder.pipeline_barrier(&in_packs);
        }

        let rendering_info =
            self.rendering_infos[handle.index()].as_ref().filter(|_| node.job_type == JobType::RenderPass);
        if let Some(rendering_info) = rendering_info {
            recorder.begin_rendering(rendering_info);
            Self::set_render_area(recorder, rendering_info);
        }

        if let Some(job) = &node.job {
            job(self, ctx, &mut *recorder);
        }

        if rendering_info.is_some() {
            recorder.end_rendering();
        }
        if !barriers.out_info.is_empty() {
            recorder.pipeline_barrier(&barriers.out_info);
        }
        let out_packs = self.buffer_pack_dependency_info(&barriers.out_buffer_packs);
        if !out_packs.is_empty() {
            recorder.pipeline_barrier(&out_packs);
        }
        recorder.end_label();
    }

    /// viewport 翻转 y 轴，scissor 与采样数跟随 render area
    fn set_render_area(recorder: &mut dyn GfxCommandRecorder, rendering_info: &GfxRenderingInfo) {
        let area = rendering_info.render_area;
        recorder.set_viewport(
            0,
            &[vk::Viewport {
                x: area.offset.x as f32,
                y: area.offset.y as f32 + area.extent.height as f32,
                width: area.extent.width as f32,
                height: -(area.extent.height as f32),
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
        recorder.set_scissor(0, &[area]);
        recorder.set_rasterization_samples(rendering_info.samples);
    }

    /// buffer pack 的内容每帧可能不同，录制时才展开到包内的每个缓冲区
    fn buffer_pack_dependency_info(&self, pack_barriers: &[RgBufferBarrier]) -> GfxDependencyInfo {
        let buffer_barriers = pack_barriers
            .iter()
            .filter_map(|rg_barrier| self.buffer_packs.get(&rg_barrier.resource).map(|pack| (pack, &rg_barrier.barrier)))
            .flat_map(|(pack, barrier)| pack.expand_barrier(barrier))
            .collect_vec();
        GfxDependencyInfo {
            image_barriers: Vec::new(),
            buffer_barriers,
        }
    }

    fn submit_info(
        &self,
        queue_idx: usize,
        submit_idx: usize,
        frame: u64,
        external: Option<&RgExternalSync>,
    ) -> GfxSubmitInfo {
        let submit = &self.submits[queue_idx][submit_idx];
        let mut submit_info = GfxSubmitInfo::new();

        for (wait_queue, wait) in submit.waits.iter().enumerate() {
            if wait.base_value == 0 {
                continue;
            }
            let Some(semaphore) = self.semaphores.get(wait_queue).copied().flatten() else {
                log::error!("render graph \"{}\": queue {} has no semaphore to wait on", self.config.name, wait_queue);
                continue;
            };
            submit_info = submit_info.wait(
                semaphore,
                wait.stages,
                Some(self.semaphore_value(frame, wait_queue, wait.base_value)),
            );
        }

        if submit.signal_base_value > 0 {
            if let Some(semaphore) = self.semaphores[queue_idx] {
                submit_info = submit_info.signal(
                    semaphore,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    Some(self.semaphore_value(frame, queue_idx, submit.signal_base_value)),
                );
            }
        }

        if queue_idx == 0 {
            let external = external.copied().unwrap_or_default();
            if submit_idx == 0 {
                submit_info.wait_infos.extend(external.wait);
            }
            if submit_idx + 1 == self.submits[0].len() {
                submit_info.signal_infos.extend(external.signal);
            }
        }

        submit_info
    }
}

#[cfg(test)]
mod tests {
    use truvis_render_interface::dummy_device::{DummyDevice, RecordedCommand};
    use truvis_render_interface::queue::{CommandCapability, QueueKind};
    use truvis_render_interface::rendering_info::{AttachmentLoad, AttachmentStore};
    use truvis_render_interface::resource_info::{BufferInfo, BufferResource, TextureInfo, TextureResource};
    use truvis_render_interface::resource_state::DeviceResourceState;

    use crate::builder::RenderGraphBuilder;
    use crate::config::RenderGraphConfig;
    use crate::dependent_info::DependentTextureInfo;
    use crate::node::Job;
    use crate::resource_version_registry::ResourceVersion;

    use super::*;

    /// 每个节点执行时把自己的名字写入 ctx
    fn named_job(name: &'static str) -> Job<Vec<String>> {
        Box::new(move |_, ctx: &mut Vec<String>, _| ctx.push(name.to_string()))
    }

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 640,
            height: 360,
        }
    }

    struct Deferred {
        graph: RenderGraph<Vec<String>>,
        depth: ResourceVersion,
        color: ResourceVersion,
        output: ResourceVersion,
    }

    /// prepass 写 depth，lighting 采样 depth 写 color，tonemap 采样 color 写到外部的 output
    fn build_deferred(device: &mut DummyDevice) -> Deferred {
        let output_texture = device.create_texture(&TextureInfo::new_2d(
            "output",
            vk::Format::R8G8B8A8_UNORM,
            extent(),
            DeviceResourceState::COLOR_TARGET,
        ));

        let mut builder = RenderGraphBuilder::<Vec<String>>::new(RenderGraphConfig::named("deferred"));
        let output = builder.import_texture(
            TextureResource::new(output_texture, 0),
            DeviceResourceState::COLOR_TARGET,
            DeviceResourceState::SHADER_SAMPLED,
        );
        let depth = builder.declare_transient_texture(
            DependentTextureInfo::new("depth", DeviceResourceState::DEPTH_STENCIL_TARGET | DeviceResourceState::SHADER_SAMPLED)
                .format(vk::Format::D32_SFLOAT)
                .extent(extent()),
        );
        let color = builder.declare_transient_texture(
            DependentTextureInfo::new("color", DeviceResourceState::COLOR_TARGET | DeviceResourceState::SHADER_SAMPLED)
                .format(vk::Format::R16G16B16A16_SFLOAT)
                .extent(extent()),
        );

        builder.begin_render_pass("prepass", CommandCapability::GRAPHICS);
        builder.set_depth_stencil(depth, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(named_job("prepass"));
        builder.end_render_pass();

        builder.begin_render_pass("lighting", CommandCapability::GRAPHICS);
        builder.sample_texture(depth);
        builder.add_color_target(color, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(named_job("lighting"));
        builder.end_render_pass();

        builder.begin_render_pass("tonemap", CommandCapability::GRAPHICS);
        builder.sample_texture(color);
        let output_written = builder.add_color_target(output, AttachmentLoad::Load, AttachmentStore::Store);
        builder.set_job(named_job("tonemap"));
        builder.end_render_pass();

        Deferred {
            graph: builder.build(device).unwrap(),
            depth,
            color,
            output: output_written,
        }
    }

    #[test]
    fn test_linear_chain_schedule() {
        let mut device = DummyDevice::new();
        let deferred = build_deferred(&mut device);
        let graph = &deferred.graph;

        let names = graph.sorted_nodes().iter().map(|handle| graph.node(*handle).name()).collect_vec();
        assert_eq!(names, vec!["prepass", "lighting", "tonemap"]);
        let levels = graph.sorted_nodes().iter().map(|handle| graph.dependency_level(*handle)).collect_vec();
        assert_eq!(levels, vec![0, 1, 2]);

        // Load 产生了新版本
        assert!(graph.registry().previous_version(deferred.output).is_some());
        assert!(graph.is_compiled());
        assert!(graph.try_get_texture(deferred.depth).is_some());

        let tonemap = graph.node_by_name("tonemap").unwrap();
        let color_id = graph.registry().resource_id(deferred.color);
        let barrier = graph.barriers_of(tonemap).in_images.iter().find(|b| b.resource == color_id).unwrap();
        assert_eq!(barrier.barrier.src.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.barrier.dst.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_execute_records_nodes_in_order() {
        let mut device = DummyDevice::new();
        let mut deferred = build_deferred(&mut device);
        let mut ctx = Vec::new();

        deferred.graph.execute(&mut device, &mut ctx, None).unwrap();
        assert_eq!(ctx, vec!["prepass", "lighting", "tonemap"]);

        let submissions = device.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].queue, QueueKind::Main);
        assert_eq!(submissions[0].labels(), vec!["prepass", "lighting", "tonemap"]);

        // label -> barrier -> begin_rendering -> 动态状态 -> end_rendering -> ... -> end_label
        let commands = &submissions[0].commands;
        assert_eq!(commands[0], RecordedCommand::BeginLabel("prepass".to_string()));
        assert!(matches!(commands[1], RecordedCommand::PipelineBarrier(_)));
        assert!(matches!(commands[2], RecordedCommand::BeginRendering(_)));
        assert_eq!(commands[3], RecordedCommand::SetViewport {
            index: 0,
            x: 0.0,
            y: 360.0,
            width: 640.0,
            height: -360.0,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        assert_eq!(commands[4], RecordedCommand::SetScissor {
            index: 0,
            scissor: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: extent(),
            },
        });
        assert_eq!(commands[5], RecordedCommand::SetRasterizationSamples(vk::SampleCountFlags::TYPE_1));
        assert_eq!(commands[6], RecordedCommand::EndRendering);
        assert_eq!(commands[7], RecordedCommand::EndLabel);

        // 最后一个节点把 output 转换到最终状态
        let tonemap_end = commands.iter().rposition(|cmd| *cmd == RecordedCommand::EndRendering).unwrap();
        let RecordedCommand::PipelineBarrier(out_info) = &commands[tonemap_end + 1] else {
            panic!("expected final transition after tonemap");
        };
        assert_eq!(out_info.image_barriers[0].dst.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_external_sync_on_main_queue() {
        let mut device = DummyDevice::new();
        let mut deferred = build_deferred(&mut device);
        let acquire = device.create_timeline_semaphore(0, "acquire");
        let present = device.create_timeline_semaphore(0, "present");

        let external = RgExternalSync {
            wait: Some(GfxSemaphoreSubmit {
                semaphore: acquire,
                stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                value: 0,
            }),
            signal: Some(GfxSemaphoreSubmit {
                semaphore: present,
                stage: vk::PipelineStageFlags2::ALL_COMMANDS,
                value: 7,
            }),
        };
        deferred.graph.execute(&mut device, &mut Vec::new(), Some(&external)).unwrap();

        let submit_info = &device.submissions()[0].submit_info;
        assert_eq!(submit_info.wait_value(acquire), Some(0));
        assert_eq!(submit_info.signal_value(present), Some(7));
        assert_eq!(device.semaphore_value(present), Some(7));
    }

    #[test]
    fn test_timeline_values_never_repeat() {
        let mut device = DummyDevice::with_async_queues();
        let mut builder = RenderGraphBuilder::<Vec<String>>::new(RenderGraphConfig::named("timeline"));
        let ao = builder.declare_transient_texture(
            DependentTextureInfo::new("ao", DeviceResourceState::STORAGE_TEXTURE | DeviceResourceState::SHADER_SAMPLED)
                .format(vk::Format::R8_UNORM)
                .extent(extent()),
        );
        let color = builder.declare_transient_texture(
            DependentTextureInfo::new("color", DeviceResourceState::COLOR_TARGET).extent(extent()),
        );

        builder.begin_compute("ssao", true, CommandCapability::COMPUTE);
        builder.write_texture(ao);
        builder.set_job(named_job("ssao"));
        builder.end_compute();

        builder.begin_render_pass("lighting", CommandCapability::GRAPHICS);
        builder.sample_texture(ao);
        builder.add_color_target(color, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(named_job("lighting"));
        builder.end_render_pass();

        let mut graph = builder.build(&mut device).unwrap();
        let compute_semaphore = graph.semaphore(QueueKind::AsyncCompute).unwrap();

        let mut ctx = Vec::new();
        let mut last_signal = 0;
        for _ in 0..3 {
            device.clear_submissions();
            graph.execute(&mut device, &mut ctx, None).unwrap();

            // compute 先提交，main 等待 compute 本帧的 signal
            let submissions = device.submissions();
            assert_eq!(submissions.len(), 2);
            assert_eq!(submissions[0].queue, QueueKind::AsyncCompute);
            let signal = submissions[0].submit_info.signal_value(compute_semaphore).unwrap();
            let wait = submissions[1].submit_info.wait_value(compute_semaphore).unwrap();
            assert_eq!(signal, wait);
            assert!(signal > last_signal);
            last_signal = signal;

            device.next_frame();
        }
        assert_eq!(ctx.len(), 6);
    }

    #[test]
    fn test_submit_error_has_context() {
        let mut device = DummyDevice::new();
        let mut deferred = build_deferred(&mut device);
        device.set_fail_submit(true);

        let err = deferred.graph.execute(&mut device, &mut Vec::new(), None).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("render graph \"deferred\""));
        assert!(message.contains("submission failure injected"));
    }

    #[test]
    fn test_set_job_replaces_callback() {
        let mut device = DummyDevice::new();
        let mut deferred = build_deferred(&mut device);

        deferred.graph.set_job("tonemap", named_job("tonemap-v2")).unwrap();
        assert!(deferred.graph.set_job("missing", named_job("missing")).is_err());

        let mut ctx = Vec::new();
        deferred.graph.execute(&mut device, &mut ctx, None).unwrap();
        assert_eq!(ctx.last().map(String::as_str), Some("tonemap-v2"));
    }

    #[test]
    fn test_buffer_pack_barriers_expand_per_buffer() {
        let mut device = DummyDevice::new();
        let mut builder = RenderGraphBuilder::<Vec<String>>::new(RenderGraphConfig::named("pack"));
        let vertices = builder.declare_import_buffer_pack(
            "mesh-vertices",
            DeviceResourceState::UNDEFINED,
            DeviceResourceState::UNDEFINED,
        );
        let color = builder.declare_transient_texture(
            DependentTextureInfo::new("color", DeviceResourceState::COLOR_TARGET).extent(extent()),
        );

        builder.begin_compute("skinning", false, CommandCapability::COMPUTE);
        let skinned = builder.read_write_buffer_pack(vertices, DeviceResourceState::STORAGE_BUFFER);
        builder.set_job(named_job("skinning"));
        builder.end_compute();

        builder.begin_render_pass("draw", CommandCapability::GRAPHICS);
        builder.read_buffer_pack(skinned, DeviceResourceState::VERTEX_BUFFER);
        builder.add_color_target(color, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(named_job("draw"));
        builder.end_render_pass();

        let mut graph = builder.build(&mut device).unwrap();
        let draw = graph.node_by_name("draw").unwrap();
        assert_eq!(graph.barriers_of(draw).in_buffer_packs.len(), 1);
        assert!(graph.barriers_of(draw).in_buffers.is_empty());
        assert_eq!(graph.get_buffer_pack(skinned).name, "mesh-vertices");
        assert!(graph.get_buffer_pack(skinned).is_empty());

        let meshes = ["cube", "sphere", "plane"]
            .iter()
            .map(|name| {
                BufferResource::new(device.create_buffer(&BufferInfo::new(*name, 4096, DeviceResourceState::VERTEX_BUFFER)))
            })
            .collect_vec();
        graph.set_buffer_pack(vertices, meshes.clone());
        assert!(!graph.is_dirty());

        let pack_barriers = |device: &DummyDevice| {
            device.submissions()[0]
                .commands
                .iter()
                .filter_map(|cmd| match cmd {
                    RecordedCommand::PipelineBarrier(info) if !info.buffer_barriers.is_empty() => Some(info.clone()),
                    _ => None,
                })
                .collect_vec()
        };

        graph.execute(&mut device, &mut Vec::new(), None).unwrap();
        let recorded = pack_barriers(&device);
        assert_eq!(recorded.len(), 1);
        let handles = recorded[0].buffer_barriers.iter().map(|barrier| barrier.buffer).collect_vec();
        assert_eq!(handles, meshes.iter().map(|mesh| Some(mesh.handle)).collect_vec());
        for barrier in &recorded[0].buffer_barriers {
            assert_eq!(barrier.src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE | vk::AccessFlags2::SHADER_STORAGE_READ);
            assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT);
        }

        // 替换包内的缓冲区后，下一帧按新的内容展开
        device.clear_submissions();
        graph.set_buffer_pack(vertices, meshes[..1].to_vec());
        graph.execute(&mut device, &mut Vec::new(), None).unwrap();
        let recorded = pack_barriers(&device);
        assert_eq!(recorded[0].buffer_barriers.len(), 1);
        assert_eq!(recorded[0].buffer_barriers[0].buffer, Some(meshes[0].handle));
    }

    #[test]
    fn test_destroy_releases_resources() {
        let mut device = DummyDevice::new();
        let deferred = build_deferred(&mut device);
        assert_eq!(device.semaphore_count(), 1);

        deferred.graph.destroy(&mut device);
        assert_eq!(device.semaphore_count(), 0);
        // depth 与 color 延迟销毁，外部的 output 不属于 graph
        assert_eq!(device.pending_destroy_count(), 2);
    }
}
