//! 编译：分配 transient 资源，把物理资源链接到 attachment 与 barrier

use ash::vk;
use itertools::Itertools;
use truvis_render_interface::device::GfxDevice;
use truvis_render_interface::queue::JobType;
use truvis_render_interface::rendering_info::{GfxRenderingAttachment, GfxRenderingInfo};
use truvis_render_interface::resource_info::{BufferResource, TextureResource};
use truvis_render_interface::resource_state::DeviceResourceState;

use crate::graph::RenderGraph;
use crate::resource_version_registry::RgResource;

/// 旧资源可能仍在被 GPU 使用，销毁前等待设备空闲，一次编译只等待一次
fn wait_idle_once(device: &mut dyn GfxDevice, waited_idle: &mut bool) {
    if !*waited_idle {
        device.wait_idle();
        *waited_idle = true;
    }
}

impl<C> RenderGraph<C> {
    /// 编译 graph，使其可以执行
    ///
    /// `strict` 为 false 时，依赖尚未绑定的资源会让编译推迟到下一次；
    /// 为 true 时直接 panic。
    pub(crate) fn compile(&mut self, device: &mut dyn GfxDevice, strict: bool) {
        let mut waited_idle = false;
        let textures_ready = self.update_dependent_resource_values(device, strict, &mut waited_idle);
        self.recreate_transient_buffers(device, &mut waited_idle);

        let unbound_imports = self
            .imported
            .keys()
            .filter(|id| self.usage_spans.contains_key(*id) && self.registry.resource(**id).is_null())
            .count();

        if !textures_ready || unbound_imports > 0 {
            assert!(
                !strict,
                "render graph \"{}\": cannot compile, {} imported resources are not bound",
                self.config.name, unbound_imports
            );
            log::debug!("render graph \"{}\": compile deferred until all resources are bound", self.config.name);
            self.compiled = false;
            return;
        }

        self.setup_attachments(device);
        self.link_barriers_to_resources(device);

        self.dirty = false;
        self.compiled = true;
    }

    /// 按依赖顺序解析 transient 纹理的描述，描述变化时重建物理资源
    ///
    /// 返回是否所有纹理都已解析
    fn update_dependent_resource_values(
        &mut self,
        device: &mut dyn GfxDevice,
        strict: bool,
        waited_idle: &mut bool,
    ) -> bool {
        let mut all_resolved = true;

        for order_idx in 0..self.transient_texture_order.len() {
            let transient = &mut self.transient_textures[self.transient_texture_order[order_idx]];
            let registry = &self.registry;

            let lookup_device: &dyn GfxDevice = &*device;
            transient.info.resolve_with(|version| {
                registry.try_get_texture(version).and_then(|texture| lookup_device.texture_info(texture.handle).cloned())
            });

            if !transient.info.is_resolved() {
                assert!(
                    !strict,
                    "transient texture \"{}\" depends on a texture that is not bound",
                    transient.info.name
                );
                log::debug!("transient texture \"{}\" is waiting for its dependencies", transient.info.name);
                all_resolved = false;
                continue;
            }

            let info = transient.info.to_texture_info();
            let old = registry.try_get_texture(transient.version);
            if old.is_some() && transient.allocated.as_ref() == Some(&info) && !transient.force_recreate {
                continue;
            }

            let handle = device.create_texture(&info);
            for view in &transient.info.views {
                device.create_texture_view(handle, view);
            }
            if let Some(old) = old {
                wait_idle_once(device, waited_idle);
                device.destroy_texture(old.handle);
            }

            log::info!(
                "render graph \"{}\": create transient texture \"{}\" {}x{} {:?} samples {:?}",
                self.config.name,
                info.name,
                info.extent.width,
                info.extent.height,
                info.format,
                info.samples
            );

            let id = transient.id;
            transient.allocated = Some(info);
            transient.force_recreate = false;
            self.registry.update_resource(id, RgResource::Texture(TextureResource::new(handle, 0)));
        }

        all_resolved
    }

    fn recreate_transient_buffers(&mut self, device: &mut dyn GfxDevice, waited_idle: &mut bool) {
        for transient in &mut self.transient_buffers {
            if transient.allocated && !transient.force_recreate {
                continue;
            }

            if let RgResource::Buffer(old) = self.registry.resource(transient.id) {
                wait_idle_once(device, waited_idle);
                device.destroy_buffer(old.handle);
            }
            let handle = device.create_buffer(&transient.info);
            log::info!(
                "render graph \"{}\": create transient buffer \"{}\" {} {} bytes",
                self.config.name,
                transient.info.name,
                transient.version,
                transient.info.size
            );

            transient.allocated = true;
            transient.force_recreate = false;
            self.registry.update_resource(transient.id, RgResource::Buffer(BufferResource::new(handle)));
        }
    }

    /// 根据 render pass 节点的写入生成 dynamic rendering 的 attachment
    fn setup_attachments(&mut self, device: &dyn GfxDevice) {
        for handle in self.nodes.handles().collect_vec() {
            let node = self.nodes.node(handle);
            if node.job_type != JobType::RenderPass {
                self.rendering_infos[handle.index()] = None;
                continue;
            }

            let mut info = GfxRenderingInfo::default();
            let mut resolves = Vec::new();
            for write in &node.writes {
                let texture = self.registry.get_texture(write.version);
                let attachment = GfxRenderingAttachment {
                    texture,
                    layout: write.state.image_layout(),
                    load: write.load,
                    store: write.store,
                    resolve: None,
                };

                if write.state.contains(DeviceResourceState::COLOR_TARGET) {
                    info.color_attachments.push(attachment);
                } else if write.state.contains(DeviceResourceState::COLOR_MULTISAMPLE_RESOLVE) {
                    resolves.push(texture);
                } else if write.state.contains(DeviceResourceState::DEPTH_STENCIL_TARGET) {
                    if info.depth_attachment.is_some() {
                        log::error!("render pass \"{}\" has more than one depth stencil target", node.name);
                        continue;
                    }
                    info.depth_attachment = Some(attachment);
                }
            }

            if resolves.len() > info.color_attachments.len() {
                log::error!(
                    "render pass \"{}\" has {} resolve targets but only {} color targets",
                    node.name,
                    resolves.len(),
                    info.color_attachments.len()
                );
            }
            for (attachment, resolve) in info.color_attachments.iter_mut().zip(resolves) {
                attachment.resolve = Some(resolve);
            }

            let first = info.color_attachments.first().or(info.depth_attachment.as_ref());
            if let Some(texture_info) = first.and_then(|attachment| device.texture_info(attachment.texture.handle)) {
                info.render_area = vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: texture_info.extent_2d(),
                };
                info.samples = texture_info.samples;
            }

            self.rendering_infos[handle.index()] = info.has_attachments().then_some(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use truvis_render_interface::dummy_device::DummyDevice;
    use truvis_render_interface::queue::CommandCapability;
    use truvis_render_interface::rendering_info::{AttachmentLoad, AttachmentStore};
    use truvis_render_interface::resource_info::{BufferInfo, TextureInfo};

    use crate::builder::RenderGraphBuilder;
    use crate::config::RenderGraphConfig;
    use crate::dependent_info::DependentTextureInfo;
    use crate::node::Job;
    use crate::resource_version_registry::ResourceVersion;

    use super::*;

    fn noop_job() -> Job<()> {
        Box::new(|_, _, _| {})
    }

    fn swapchain_info(width: u32, height: u32) -> TextureInfo {
        TextureInfo::new_2d(
            "swapchain",
            vk::Format::B8G8R8A8_UNORM,
            vk::Extent2D { width, height },
            DeviceResourceState::COLOR_TARGET | DeviceResourceState::PRESENT_TEXTURE,
        )
    }

    /// 深度图与 swapchain 同样大小
    fn build_swapchain_graph(device: &mut DummyDevice) -> (RenderGraph<()>, ResourceVersion, ResourceVersion) {
        let mut builder = RenderGraphBuilder::<()>::new(RenderGraphConfig::named("swapchain"));
        let swapchain = builder.declare_import_texture(DeviceResourceState::UNDEFINED, DeviceResourceState::PRESENT_TEXTURE);
        let depth = builder.declare_transient_texture(
            DependentTextureInfo::new("depth", DeviceResourceState::DEPTH_STENCIL_TARGET)
                .format(vk::Format::D32_SFLOAT)
                .extent_of(swapchain)
                .samples_of(swapchain),
        );

        builder.begin_render_pass("forward", CommandCapability::GRAPHICS);
        builder.set_depth_stencil(depth, AttachmentLoad::Clear, AttachmentStore::Discard);
        builder.add_color_target(swapchain, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(noop_job());
        builder.end_render_pass();

        (builder.build(device).unwrap(), swapchain, depth)
    }

    #[test]
    fn test_compile_deferred_until_import_bound() {
        let mut device = DummyDevice::new();
        let (mut graph, swapchain, depth) = build_swapchain_graph(&mut device);

        assert!(!graph.is_compiled());
        assert!(graph.try_get_texture(depth).is_none());
        assert_eq!(device.texture_count(), 0);

        let texture = device.create_texture(&swapchain_info(1920, 1080));
        graph.reimport_texture(swapchain, TextureResource::new(texture, 0));
        assert!(graph.is_dirty());

        graph.compile(&mut device, true);
        assert!(graph.is_compiled());
        assert!(!graph.is_dirty());

        let depth_info = graph.transient_texture_info(depth).unwrap();
        assert_eq!(depth_info.extent.width, 1920);
        assert_eq!(depth_info.extent.height, 1080);
        assert_eq!(depth_info.format, vk::Format::D32_SFLOAT);

        let forward = graph.node_by_name("forward").unwrap();
        let rendering = graph.rendering_info(forward).unwrap();
        assert_eq!(rendering.extent(), vk::Extent2D {
            width: 1920,
            height: 1080
        });
        assert_eq!(rendering.color_attachments.len(), 1);
        assert_eq!(rendering.depth_attachment.as_ref().unwrap().store, AttachmentStore::Discard);

        // 深度图的 barrier 推断出 DEPTH aspect
        let barriers = graph.barriers_of(forward);
        let depth_id = graph.registry().resource_id(depth);
        let depth_barrier = barriers.in_images.iter().find(|b| b.resource == depth_id).unwrap();
        assert_eq!(depth_barrier.barrier.aspect, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_reimport_resized_texture_recreates_dependents() {
        let mut device = DummyDevice::new();
        let (mut graph, swapchain, depth) = build_swapchain_graph(&mut device);

        let small = device.create_texture(&swapchain_info(800, 600));
        graph.reimport_texture(swapchain, TextureResource::new(small, 0));
        graph.compile(&mut device, true);
        let first_depth = graph.get_texture(depth);

        // 相同大小的纹理不会导致重建
        let same_size = device.create_texture(&swapchain_info(800, 600));
        graph.reimport_texture(swapchain, TextureResource::new(same_size, 0));
        graph.compile(&mut device, true);
        assert_eq!(graph.get_texture(depth), first_depth);
        assert_eq!(device.wait_idle_count(), 0);

        let large = device.create_texture(&swapchain_info(1280, 720));
        graph.reimport_texture(swapchain, TextureResource::new(large, 0));
        graph.compile(&mut device, true);

        let second_depth = graph.get_texture(depth);
        assert_ne!(second_depth, first_depth);
        assert_eq!(graph.transient_texture_info(depth).unwrap().extent.width, 1280);
        assert_eq!(device.wait_idle_count(), 1);
        // 旧的深度图延迟销毁
        assert_eq!(device.pending_destroy_count(), 1);
    }

    #[test]
    #[should_panic]
    fn test_strict_compile_panics_on_unbound_import() {
        let mut device = DummyDevice::new();
        let (mut graph, _, _) = build_swapchain_graph(&mut device);
        graph.compile(&mut device, true);
    }

    #[test]
    fn test_update_transient_sizes_force_recreate() {
        let mut device = DummyDevice::new();
        let mut builder = RenderGraphBuilder::<()>::new(RenderGraphConfig::named("resize"));
        let color = builder.declare_transient_texture(
            DependentTextureInfo::new("msaa-color", DeviceResourceState::COLOR_TARGET).extent(vk::Extent2D {
                width: 16,
                height: 16,
            }),
        );
        let buffer = builder.declare_transient_buffer(BufferInfo::new("params", 64, DeviceResourceState::UNIFORM_BUFFER));

        builder.begin_render_pass("draw", CommandCapability::GRAPHICS);
        builder.read_buffer(buffer, DeviceResourceState::UNIFORM_BUFFER);
        builder.add_color_target(color, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(noop_job());
        builder.end_render_pass();

        // buffer 没有写入者，作为 transient 读取是错误的
        assert!(matches!(
            builder.build(&mut device),
            Err(crate::error::RgBuildError::ReadOfUnwrittenVersion { .. })
        ));

        let mut builder = RenderGraphBuilder::<()>::new(RenderGraphConfig::named("resize"));
        let color = builder.declare_transient_texture(
            DependentTextureInfo::new("msaa-color", DeviceResourceState::COLOR_TARGET).extent(vk::Extent2D {
                width: 16,
                height: 16,
            }),
        );
        let buffer = builder.declare_transient_buffer(BufferInfo::new("params", 64, DeviceResourceState::STORAGE_BUFFER));
        builder.begin_render_pass("draw", CommandCapability::GRAPHICS);
        builder.write_buffer(buffer, DeviceResourceState::STORAGE_BUFFER_WRITE);
        builder.add_color_target(color, AttachmentLoad::Clear, AttachmentStore::Store);
        builder.set_job(noop_job());
        builder.end_render_pass();
        let mut graph = builder.build(&mut device).unwrap();
        assert!(graph.is_compiled());

        let first_color = graph.get_texture(color);
        let first_buffer = graph.get_buffer(buffer);

        // 值不变时不重建
        graph.update_transient_buffer_size(buffer, 64);
        graph.update_transient_texture_samples(color, vk::SampleCountFlags::TYPE_1);
        assert!(!graph.is_dirty());

        graph.update_transient_buffer_size(buffer, 128);
        graph.update_transient_texture_samples(color, vk::SampleCountFlags::TYPE_4);
        assert!(graph.is_dirty());
        graph.compile(&mut device, true);

        assert_ne!(graph.get_texture(color), first_color);
        assert_ne!(graph.get_buffer(buffer), first_buffer);
        assert_eq!(graph.transient_texture_info(color).unwrap().samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(device.buffer_info(graph.get_buffer(buffer).handle).unwrap().size, 128);
        // 纹理与缓冲区一起重建，只等待一次
        assert_eq!(device.wait_idle_count(), 1);
    }

    #[test]
    fn test_buffer_resize_waits_idle_before_destroy() {
        let mut device = DummyDevice::new();
        let mut builder = RenderGraphBuilder::<()>::new(RenderGraphConfig::named("buffer-resize"));
        let buffer =
            builder.declare_transient_buffer(BufferInfo::new("particles", 256, DeviceResourceState::STORAGE_BUFFER));

        builder.begin_compute("simulate", false, CommandCapability::COMPUTE);
        builder.write_buffer(buffer, DeviceResourceState::STORAGE_BUFFER_WRITE);
        builder.set_job(noop_job());
        builder.end_compute();

        let mut graph = builder.build(&mut device).unwrap();
        graph.execute(&mut device, &mut (), None).unwrap();
        let first_buffer = graph.get_buffer(buffer);
        assert_eq!(device.wait_idle_count(), 0);

        graph.update_transient_buffer_size(buffer, 512);
        graph.execute(&mut device, &mut (), None).unwrap();

        assert_ne!(graph.get_buffer(buffer), first_buffer);
        assert_eq!(device.wait_idle_count(), 1);
        assert_eq!(device.pending_destroy_count(), 1);
    }
}
