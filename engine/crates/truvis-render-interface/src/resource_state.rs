//! 资源状态定义
//!
//! `DeviceResourceState` 描述资源在某个节点中的用途，是 RenderGraph 声明读写时使用的状态。
//! barrier 需要的 pipeline stage、access mask 和 image layout 都由它结合节点类型推导出来。

use ash::vk;
use itertools::Itertools;

use crate::queue::JobType;

bitflags::bitflags! {
    /// 设备资源状态
    ///
    /// 可以组合使用，例如 `STORAGE_TEXTURE = STORAGE_TEXTURE_READ | STORAGE_TEXTURE_WRITE`。
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DeviceResourceState: u32 {
        // 通用
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;

        // 纹理
        const SHADER_SAMPLED = 1 << 2;
        const COLOR_TARGET = 1 << 3;
        const COLOR_MULTISAMPLE_RESOLVE = 1 << 4;
        const DEPTH_STENCIL_TARGET = 1 << 5;
        const DEPTH_STENCIL_READ = 1 << 6;
        const STORAGE_TEXTURE_READ = 1 << 7;
        const STORAGE_TEXTURE_WRITE = 1 << 8;
        const PRESENT_TEXTURE = 1 << 9;

        // 缓冲区
        const VERTEX_BUFFER = 1 << 10;
        const INDEX_BUFFER = 1 << 11;
        const INDIRECT_ARGUMENT = 1 << 12;
        const UNIFORM_BUFFER = 1 << 13;
        const STORAGE_BUFFER_READ = 1 << 14;
        const STORAGE_BUFFER_WRITE = 1 << 15;

        const STORAGE_TEXTURE = Self::STORAGE_TEXTURE_READ.bits() | Self::STORAGE_TEXTURE_WRITE.bits();
        const STORAGE_BUFFER = Self::STORAGE_BUFFER_READ.bits() | Self::STORAGE_BUFFER_WRITE.bits();
    }
}

impl DeviceResourceState {
    /// 未定义状态（初始状态或不关心内容）
    pub const UNDEFINED: Self = Self::empty();

    const WRITE_STATES: Self = Self::from_bits_truncate(
        Self::TRANSFER_DST.bits()
            | Self::COLOR_TARGET.bits()
            | Self::COLOR_MULTISAMPLE_RESOLVE.bits()
            | Self::DEPTH_STENCIL_TARGET.bits()
            | Self::STORAGE_TEXTURE_WRITE.bits()
            | Self::STORAGE_BUFFER_WRITE.bits(),
    );

    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.is_empty()
    }

    /// 检查是否包含写操作
    #[inline]
    pub fn is_write(&self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// 状态名称，用于日志与 graphviz
    pub fn names(&self) -> String {
        if self.is_empty() {
            return "UNDEFINED".to_string();
        }
        self.iter_names().map(|(name, _)| name).join(" | ")
    }
}

// vulkan 推导
impl DeviceResourceState {
    /// 对应的 access mask
    pub fn access_flags(&self) -> vk::AccessFlags2 {
        let mut access = vk::AccessFlags2::NONE;

        let mapping = [
            (Self::TRANSFER_SRC, vk::AccessFlags2::TRANSFER_READ),
            (Self::TRANSFER_DST, vk::AccessFlags2::TRANSFER_WRITE),
            (Self::SHADER_SAMPLED, vk::AccessFlags2::SHADER_SAMPLED_READ),
            (Self::COLOR_TARGET, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
            (Self::COLOR_MULTISAMPLE_RESOLVE, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
            (Self::DEPTH_STENCIL_TARGET, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE),
            (Self::DEPTH_STENCIL_READ, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ),
            (Self::STORAGE_TEXTURE_READ, vk::AccessFlags2::SHADER_STORAGE_READ),
            (Self::STORAGE_TEXTURE_WRITE, vk::AccessFlags2::SHADER_STORAGE_WRITE),
            (Self::VERTEX_BUFFER, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ),
            (Self::INDEX_BUFFER, vk::AccessFlags2::INDEX_READ),
            (Self::INDIRECT_ARGUMENT, vk::AccessFlags2::INDIRECT_COMMAND_READ),
            (Self::UNIFORM_BUFFER, vk::AccessFlags2::UNIFORM_READ),
            (Self::STORAGE_BUFFER_READ, vk::AccessFlags2::SHADER_STORAGE_READ),
            (Self::STORAGE_BUFFER_WRITE, vk::AccessFlags2::SHADER_STORAGE_WRITE),
        ];

        for (state, flags) in mapping {
            if self.contains(state) {
                access |= flags;
            }
        }

        // PRESENT_TEXTURE 不需要 access
        access
    }

    /// 对应的 image layout
    ///
    /// 同时包含多个纹理状态时，storage 优先（GENERAL）。
    pub fn image_layout(&self) -> vk::ImageLayout {
        if self.intersects(Self::STORAGE_TEXTURE) {
            vk::ImageLayout::GENERAL
        } else if self.intersects(Self::COLOR_TARGET | Self::COLOR_MULTISAMPLE_RESOLVE) {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else if self.contains(Self::DEPTH_STENCIL_TARGET) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else if self.contains(Self::DEPTH_STENCIL_READ) {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else if self.contains(Self::SHADER_SAMPLED) {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else if self.contains(Self::TRANSFER_SRC) {
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        } else if self.contains(Self::TRANSFER_DST) {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        } else if self.contains(Self::PRESENT_TEXTURE) {
            vk::ImageLayout::PRESENT_SRC_KHR
        } else {
            vk::ImageLayout::UNDEFINED
        }
    }

    /// 对应的 pipeline stage，依赖于使用该状态的节点类型
    pub fn pipeline_stages(&self, job_type: JobType) -> vk::PipelineStageFlags2 {
        let shader_stages = match job_type {
            JobType::RenderPass => vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            JobType::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            JobType::Transfer => vk::PipelineStageFlags2::TRANSFER,
        };

        let mut stages = vk::PipelineStageFlags2::NONE;

        if self.intersects(Self::TRANSFER_SRC | Self::TRANSFER_DST) {
            stages |= vk::PipelineStageFlags2::TRANSFER;
        }
        if self.intersects(
            Self::SHADER_SAMPLED | Self::STORAGE_TEXTURE | Self::UNIFORM_BUFFER | Self::STORAGE_BUFFER,
        ) {
            stages |= shader_stages;
        }
        if self.intersects(Self::COLOR_TARGET | Self::COLOR_MULTISAMPLE_RESOLVE) {
            stages |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        }
        if self.intersects(Self::DEPTH_STENCIL_TARGET | Self::DEPTH_STENCIL_READ) {
            stages |= vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
        }
        if self.contains(Self::VERTEX_BUFFER) {
            stages |= vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT;
        }
        if self.contains(Self::INDEX_BUFFER) {
            stages |= vk::PipelineStageFlags2::INDEX_INPUT;
        }
        if self.contains(Self::INDIRECT_ARGUMENT) {
            stages |= vk::PipelineStageFlags2::DRAW_INDIRECT;
        }
        if self.contains(Self::PRESENT_TEXTURE) {
            stages |= vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
        }

        if stages == vk::PipelineStageFlags2::NONE { vk::PipelineStageFlags2::TOP_OF_PIPE } else { stages }
    }

    /// 结合节点类型得到完整的图像状态
    #[inline]
    pub fn image_state(&self, job_type: JobType) -> GfxImageState {
        GfxImageState::new(self.pipeline_stages(job_type), self.access_flags(), self.image_layout())
    }
}

/// 图像状态：stage + access + layout
///
/// barrier 两端各是一个 `GfxImageState`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl Default for GfxImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl GfxImageState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);
}

/// 格式化 PipelineStageFlags2 为可读字符串
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    let known = [
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, "VERTEX_ATTRIBUTE_INPUT"),
        (vk::PipelineStageFlags2::INDEX_INPUT, "INDEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
    ];

    let stages = known.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }

    let known = [
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
    ];

    let flags = known.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if flags.is_empty() { format!("{:?}", access) } else { flags.join(" | ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_target_state() {
        let state = DeviceResourceState::COLOR_TARGET.image_state(JobType::RenderPass);
        assert_eq!(state.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(state.access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(state.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_sampled_stage_depends_on_job_type() {
        let sampled = DeviceResourceState::SHADER_SAMPLED;
        assert_eq!(sampled.pipeline_stages(JobType::Compute), vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert!(sampled.pipeline_stages(JobType::RenderPass).contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(sampled.image_layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_storage_texture_is_general_and_write() {
        let state = DeviceResourceState::STORAGE_TEXTURE;
        assert_eq!(state.image_layout(), vk::ImageLayout::GENERAL);
        assert!(state.is_write());
        assert!(!DeviceResourceState::STORAGE_TEXTURE_READ.is_write());
        assert!(!DeviceResourceState::SHADER_SAMPLED.is_write());
    }

    #[test]
    fn test_undefined_state() {
        let state = DeviceResourceState::UNDEFINED;
        assert!(state.is_undefined());
        assert_eq!(state.image_layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(state.access_flags(), vk::AccessFlags2::NONE);
        assert_eq!(state.pipeline_stages(JobType::Compute), vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(state.names(), "UNDEFINED");
    }

    #[test]
    fn test_state_names() {
        let names = (DeviceResourceState::TRANSFER_SRC | DeviceResourceState::SHADER_SAMPLED).names();
        assert_eq!(names, "TRANSFER_SRC | SHADER_SAMPLED");
    }
}
