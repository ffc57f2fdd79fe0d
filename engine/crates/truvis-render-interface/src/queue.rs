//! 队列与命令类型

use std::fmt;

bitflags::bitflags! {
    /// 命令缓冲区需要的队列能力
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CommandCapability: u8 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

/// RenderGraph 节点的工作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobType {
    RenderPass,
    Compute,
    Transfer,
}

impl JobType {
    /// 节点类型默认需要的队列能力
    #[inline]
    pub fn default_capability(self) -> CommandCapability {
        match self {
            JobType::RenderPass => CommandCapability::GRAPHICS,
            JobType::Compute => CommandCapability::COMPUTE,
            JobType::Transfer => CommandCapability::TRANSFER,
        }
    }

    /// debug label 的颜色
    pub fn label_color(self) -> [f32; 4] {
        match self {
            JobType::RenderPass => [1.0, 0.757, 0.145, 1.0],
            JobType::Compute => [0.4, 0.804, 0.0, 1.0],
            JobType::Transfer => [0.0, 0.808, 0.82, 1.0],
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobType::RenderPass => "RenderPass",
            JobType::Compute => "Compute",
            JobType::Transfer => "Transfer",
        };
        f.write_str(name)
    }
}

/// 硬件队列
///
/// `Main` 一定存在，支持 graphics + compute + transfer；
/// 另外两个是可选的专用队列。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Main,
    AsyncCompute,
    AsyncTransfer,
}

impl QueueKind {
    /// 最多支持的队列数量
    pub const MAX_QUEUES: usize = 3;

    #[inline]
    pub fn capability(self) -> CommandCapability {
        match self {
            QueueKind::Main => CommandCapability::all(),
            QueueKind::AsyncCompute => CommandCapability::COMPUTE | CommandCapability::TRANSFER,
            QueueKind::AsyncTransfer => CommandCapability::TRANSFER,
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueKind::Main => "main",
            QueueKind::AsyncCompute => "async-compute",
            QueueKind::AsyncTransfer => "async-transfer",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_queue_supports_everything() {
        for job_type in [JobType::RenderPass, JobType::Compute, JobType::Transfer] {
            assert!(QueueKind::Main.capability().contains(job_type.default_capability()));
        }
        assert!(!QueueKind::AsyncTransfer.capability().contains(CommandCapability::COMPUTE));
    }
}
