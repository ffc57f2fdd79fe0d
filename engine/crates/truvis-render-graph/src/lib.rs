//! 声明式渲染图
//!
//! 通过 `RenderGraphBuilder` 描述一帧中的所有 GPU 工作（render pass / compute / transfer），
//! 以及它们对资源版本的读写；`build()` 之后得到 `RenderGraph`，自动完成：
//!
//! - 依赖分析与按依赖层级的拓扑排序
//! - transient 资源的分配，描述可以依赖其他纹理（例如与 swapchain 同样大小）
//! - 多队列调度，跨队列依赖通过 timeline semaphore 同步
//! - image / buffer barrier 与队列所有权转移
//!
//! # 核心概念
//!
//! - **ResourceVersion**: 资源的某个版本，每次写入产生新版本，读取总是指向确定的版本
//! - **Node**: 一个 GPU 工作单元，由 `begin_*` / `end_*` 包围
//! - **Job**: 节点执行时调用的回调，负责录制实际的命令
//! - **Layer**: 多个功能模块共享的 job 集合
//!
//! # 使用示例
//!
//! ```ignore
//! let mut builder = RenderGraphBuilder::<FrameContext>::new(RenderGraphConfig::named("frame"));
//! let output = builder.import_texture(swapchain, DeviceResourceState::UNDEFINED, DeviceResourceState::PRESENT_TEXTURE);
//!
//! builder.begin_render_pass("ui", CommandCapability::GRAPHICS);
//! builder.add_color_target(output, AttachmentLoad::Clear, AttachmentStore::Store);
//! builder.set_job(layer_job(layers.get("ui").unwrap()));
//! builder.end_render_pass();
//!
//! let mut graph = builder.build(&mut device)?;
//! graph.execute(&mut device, &mut frame_ctx, Some(&external_sync))?;
//! ```

pub mod buffer_pack;
pub mod builder;
pub mod config;
pub mod dag;
pub mod dependent_info;
pub mod error;
pub mod graph;
pub mod layer;
pub mod node;
pub mod resource_version_registry;

pub use buffer_pack::RgBufferPack;
pub use builder::{ImportedResourceUsage, RenderGraphBuilder, SetupTask};
pub use config::RenderGraphConfig;
pub use error::RgBuildError;
pub use graph::{RenderGraph, RgExternalSync};
pub use layer::{Layer, LayerMap, SharedLayer, execute_layer, layer_job};
pub use node::Job;
pub use resource_version_registry::ResourceVersion;
