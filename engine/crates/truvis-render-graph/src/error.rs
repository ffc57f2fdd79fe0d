use crate::dag::NodeHandle;

/// DAG 中存在环，`nodes` 为构成环的节点（DFS 栈中的一段）
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("dependency cycle through nodes {nodes:?}")]
pub struct DagCycle {
    pub nodes: Vec<NodeHandle>,
}

/// 构建 RenderGraph 时的结构性错误
///
/// builder 的接口本身不会失败，第一次误用会被记录下来，由 `build()` 返回。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RgBuildError {
    #[error("render graph contains a cycle: {}", nodes.join(" -> "))]
    Cycle { nodes: Vec<String> },

    #[error("node \"{node}\" reads version {version} which no node writes")]
    ReadOfUnwrittenVersion { node: String, version: u32 },

    #[error("\"{node}\" references invalid resource version {version}")]
    InvalidVersion { node: String, version: u32 },

    #[error("version {version} is written by both \"{first}\" and \"{second}\"")]
    MultipleWriters { version: u32, first: String, second: String },

    #[error("cannot begin node \"{requested}\" while \"{open}\" is still open")]
    NestedNode { open: String, requested: String },

    #[error("node \"{open}\" is a {expected} node but was closed with end_{found}")]
    MismatchedEnd { open: String, expected: String, found: String },

    #[error("end_{found} called without a matching begin")]
    EndWithoutBegin { found: String },

    #[error("{operation} called outside of any node")]
    AccessOutsideNode { operation: String },

    #[error("{operation} is not allowed in node \"{node}\"")]
    IncompatibleAccess { node: String, operation: String },

    #[error("node \"{node}\" has no job")]
    MissingJob { node: String },

    #[error("node \"{node}\" was never closed")]
    UnclosedNode { node: String },

    #[error("transient resources depend on each other: {}", resources.join(" -> "))]
    DependentResourceCycle { resources: Vec<String> },

    #[error("no node named \"{name}\"")]
    UnknownNode { name: String },

    #[error("no layer named \"{name}\"")]
    UnknownLayer { name: String },
}
