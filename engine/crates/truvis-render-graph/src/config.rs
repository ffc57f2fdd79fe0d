use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// RenderGraph 的配置，显式传给 `RenderGraphBuilder::new`
///
/// ```toml
/// name = "main-frame"
/// use_async_compute = true
/// use_async_transfer = false
/// print_execution_plan = true
/// graphviz_dump = "main-frame.dot"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderGraphConfig {
    /// 调试名称
    pub name: String,
    /// 设备有专用 compute 队列时，async compute 节点调度到该队列
    pub use_async_compute: bool,
    /// 设备有专用 transfer 队列时，async transfer 节点调度到该队列
    pub use_async_transfer: bool,
    /// build 之后通过日志输出执行计划
    pub print_execution_plan: bool,
    /// build 之后输出 graphviz 文件，相对路径位于 `target/debug-dump/`
    pub graphviz_dump: Option<String>,
    pub graphviz_detailed: bool,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            name: "render-graph".to_string(),
            use_async_compute: true,
            use_async_transfer: true,
            print_execution_plan: false,
            graphviz_dump: None,
            graphviz_detailed: false,
        }
    }
}

impl RenderGraphConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse render graph config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize render graph config")
    }
}
