//! 调试输出：执行计划与 graphviz

use std::fmt::Write as _;

use anyhow::Context;
use itertools::Itertools;
use truvis_crate_tools::resource::TruvisPath;
use truvis_render_interface::queue::JobType;
use truvis_render_interface::resource_state::{format_access_flags, format_pipeline_stage};

use crate::graph::{RenderGraph, RgImageBarrier};
use crate::resource_version_registry::{ResourceId, ResourceVersion, RgResourceKind};

impl<C> RenderGraph<C> {
    /// 资源的调试名称
    pub fn resource_name(&self, id: ResourceId) -> String {
        if let Some(transient) = self.transient_textures.iter().find(|t| t.id == id) {
            return transient.info.name.clone();
        }
        if let Some(transient) = self.transient_buffers.iter().find(|t| t.id == id) {
            return transient.info.name.clone();
        }
        if let Some(pack) = self.buffer_packs.get(&id) {
            return pack.name.clone();
        }
        format!("imported-{}#{}", self.resource_kind(id), id.0)
    }

    fn version_name(&self, version: ResourceVersion) -> String {
        format!("{}@{}", self.resource_name(self.registry.resource_id(version)), version)
    }

    fn log_image_barrier(&self, barrier: &RgImageBarrier) {
        let gfx = &barrier.barrier;
        let layout_change = if gfx.is_layout_transition() {
            format!("{:?} → {:?}", gfx.src.layout, gfx.dst.layout)
        } else {
            format!("{:?} (no layout change)", gfx.src.layout)
        };
        log::info!("│   🔒 Image \"{}\":", self.resource_name(barrier.resource));
        log::info!("│       Layout: {}", layout_change);
        log::info!("│       Stage:  {} → {}", format_pipeline_stage(gfx.src.stage), format_pipeline_stage(gfx.dst.stage));
        log::info!("│       Access: {} → {}", format_access_flags(gfx.src.access), format_access_flags(gfx.dst.access));
        if let Some((src, dst)) = gfx.queue_transfer {
            log::info!("│       Queue:  {} → {}", src, dst);
        }
    }

    /// 通过日志输出执行计划
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Graph: \"{}\"  |  Nodes: {}  |  Levels: {}  |  Queues: [{}]",
            self.config.name,
            self.nodes.len(),
            self.max_dependency_level + 1,
            self.queues.iter().join(", ")
        );
        log::info!(
            "║ Execution Order: [{}]",
            self.sorted_nodes.iter().map(|handle| self.nodes.node(*handle).name.as_str()).join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (queue_idx, queue) in self.queues.iter().enumerate() {
            for (submit_idx, submit) in self.submits[queue_idx].iter().enumerate() {
                log::info!("");
                log::info!("┌─────────────────────────────────────────────────────────────────┐");
                log::info!(
                    "│ Queue {} / Submit #{} (level {}), signal base {}",
                    queue,
                    submit_idx,
                    submit.dependency_level,
                    submit.signal_base_value
                );
                for (wait_queue, wait) in submit.waits.iter().enumerate().filter(|(_, wait)| wait.base_value > 0) {
                    log::info!(
                        "│   ⏳ wait {} base {} at {}",
                        self.queues[wait_queue],
                        wait.base_value,
                        format_pipeline_stage(wait.stages)
                    );
                }

                for &handle in &submit.nodes {
                    let node = self.nodes.node(handle);
                    let barriers = &self.node_barriers[handle.index()];

                    log::info!("├─────────────────────────────────────────────────────────────────┤");
                    log::info!(
                        "│ {} \"{}\" {} (level {})",
                        node.job_type,
                        node.name,
                        handle,
                        self.dependency_levels[handle.index()]
                    );
                    for read in &node.reads {
                        log::info!("│   📖 {} ({})", self.version_name(read.version), read.state.names());
                    }
                    for write in &node.writes {
                        log::info!("│   ✏️  {} ({})", self.version_name(write.version), write.state.names());
                    }

                    if !barriers.has_barriers() {
                        log::info!("│ No barriers required");
                        continue;
                    }
                    log::info!(
                        "│ Barriers: {} in, {} out",
                        barriers.in_barrier_count(),
                        barriers.out_barrier_count()
                    );
                    for barrier in barriers.in_images.iter().chain(barriers.out_images.iter()) {
                        self.log_image_barrier(barrier);
                    }
                    let buffer_barriers = barriers.in_buffers.iter().chain(barriers.out_buffers.iter()).map(|b| (b, "Buffer"));
                    let pack_barriers = barriers
                        .in_buffer_packs
                        .iter()
                        .chain(barriers.out_buffer_packs.iter())
                        .map(|b| (b, "Buffer Pack"));
                    for (barrier, kind) in buffer_barriers.chain(pack_barriers) {
                        let gfx = &barrier.barrier;
                        log::info!("│   🔒 {} \"{}\":", kind, self.resource_name(barrier.resource));
                        log::info!(
                            "│       Stage:  {} → {}",
                            format_pipeline_stage(gfx.src_stage),
                            format_pipeline_stage(gfx.dst_stage)
                        );
                        log::info!(
                            "│       Access: {} → {}",
                            format_access_flags(gfx.src_access),
                            format_access_flags(gfx.dst_access)
                        );
                    }
                }
                log::info!("└─────────────────────────────────────────────────────────────────┘");
            }
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    /// graphviz 描述，`detailed` 时同时输出资源版本节点
    pub fn to_graphviz(&self, detailed: bool) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph {{");
        let _ = writeln!(dot, "  labelloc=\"t\";");
        let _ = writeln!(dot, "  label=\"RenderGraph ({})\";", self.config.name);
        let _ = writeln!(dot, "  rankdir=LR;");
        let _ = writeln!(dot, "  node [style=filled, shape=box];");

        for level in 0..=self.max_dependency_level {
            let nodes = self
                .sorted_nodes
                .iter()
                .filter(|handle| self.dependency_levels[handle.index()] == level)
                .map(|handle| format!("N{}", handle.0))
                .join("; ");
            if !nodes.is_empty() {
                let _ = writeln!(dot, "  {{ rank=same; {}; }}", nodes);
            }
        }

        for (handle, node) in self.nodes.iter() {
            let color = match node.job_type {
                JobType::RenderPass => "goldenrod1",
                JobType::Compute => "chartreuse3",
                JobType::Transfer => "darkturquoise",
            };
            let _ = writeln!(
                dot,
                "  N{} [label=\"{}\\n{}\", fillcolor={}];",
                handle.0,
                node.name,
                self.queue_of(handle),
                color
            );
        }

        if detailed {
            let versions = self
                .nodes
                .iter()
                .flat_map(|(_, node)| {
                    node.reads.iter().map(|r| r.version).chain(node.writes.iter().map(|w| w.version))
                })
                .unique()
                .sorted()
                .collect_vec();
            for version in versions {
                let id = self.registry.resource_id(version);
                match self.resource_kind(id) {
                    RgResourceKind::BufferPack => {
                        let count = self.buffer_packs.get(&id).map_or(0, |pack| pack.len());
                        let _ = writeln!(
                            dot,
                            "  R{} [label=\"{}\\n[Buffer Pack] Buffers: {}\", shape=box, style=\"filled,dashed,rounded\", fillcolor=gainsboro];",
                            version.0,
                            self.version_name(version),
                            count
                        );
                    }
                    kind => {
                        let color = if kind == RgResourceKind::Buffer { "gainsboro" } else { "slategray1" };
                        let _ = writeln!(
                            dot,
                            "  R{} [label=\"{}\", shape=ellipse, fillcolor={}];",
                            version.0,
                            self.version_name(version),
                            color
                        );
                    }
                }
            }

            for (handle, node) in self.nodes.iter() {
                for read in &node.reads {
                    let _ = writeln!(dot, "  R{} -> N{} [color=gray];", read.version.0, handle.0);
                }
                for write in &node.writes {
                    let _ = writeln!(dot, "  N{} -> R{} [color=black];", handle.0, write.version.0);
                }
            }
        } else {
            for (handle, _) in self.nodes.iter() {
                for next in self.nodes.adjacency(handle) {
                    let _ = writeln!(dot, "  N{} -> N{};", handle.0, next.0);
                }
            }
        }

        dot.push_str("}\n");
        dot
    }

    /// 输出 graphviz 文件，相对路径位于 `target/debug-dump/` 下
    pub fn dump_graphviz(&self, filename: &str, detailed: bool) -> anyhow::Result<()> {
        let path = TruvisPath::debug_dump_path(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&path, self.to_graphviz(detailed))
            .with_context(|| format!("Failed to write graphviz file: {}", path.display()))?;

        log::info!("render graph \"{}\" dumped to {}", self.config.name, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use truvis_crate_tools::init_log::init_test_log;
    use truvis_render_interface::dummy_device::DummyDevice;
    use truvis_render_interface::queue::CommandCapability;
    use truvis_render_interface::resource_info::BufferInfo;
    use truvis_render_interface::resource_state::DeviceResourceState;

    use crate::builder::RenderGraphBuilder;
    use crate::config::RenderGraphConfig;
    use crate::dependent_info::DependentTextureInfo;

    use super::*;

    fn build_graph(device: &mut DummyDevice, config: RenderGraphConfig) -> RenderGraph<()> {
        let mut builder = RenderGraphBuilder::<()>::new(config);
        let buffer = builder.declare_transient_buffer(BufferInfo::new("particles", 1024, DeviceResourceState::STORAGE_BUFFER));
        let texture = builder.declare_transient_texture(
            DependentTextureInfo::new("particles-rt", DeviceResourceState::STORAGE_TEXTURE).extent(vk::Extent2D {
                width: 8,
                height: 8,
            }),
        );

        builder.begin_compute("simulate", false, CommandCapability::COMPUTE);
        builder.write_buffer(buffer, DeviceResourceState::STORAGE_BUFFER_WRITE);
        builder.set_job(Box::new(|_, _, _| {}));
        builder.end_compute();

        builder.begin_compute("splat", false, CommandCapability::COMPUTE);
        builder.read_buffer(buffer, DeviceResourceState::STORAGE_BUFFER_READ);
        builder.write_texture(texture);
        builder.set_job(Box::new(|_, _, _| {}));
        builder.end_compute();

        builder.build(device).unwrap()
    }

    #[test]
    fn test_graphviz_output() {
        let mut device = DummyDevice::new();
        let graph = build_graph(&mut device, RenderGraphConfig::named("particles"));

        let dot = graph.to_graphviz(false);
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("label=\"RenderGraph (particles)\""));
        assert!(dot.contains("N0 -> N1;"));
        assert!(dot.contains("fillcolor=chartreuse3"));

        let detailed = graph.to_graphviz(true);
        assert!(detailed.contains("fillcolor=gainsboro"));
        assert!(detailed.contains("fillcolor=slategray1"));
        assert!(detailed.contains("-> N1 [color=gray]"));
        assert!(detailed.contains("N0 -> R"));
    }

    #[test]
    fn test_dump_graphviz_to_file() {
        init_test_log();
        let mut device = DummyDevice::new();
        let path = std::env::temp_dir().join(format!("truvis-rg-{}.dot", std::process::id()));
        let config = RenderGraphConfig {
            print_execution_plan: true,
            graphviz_dump: Some(path.to_string_lossy().into_owned()),
            ..RenderGraphConfig::named("dump")
        };

        // build 时根据配置输出
        let graph = build_graph(&mut device, config);
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(content, graph.to_graphviz(false));
    }
}
