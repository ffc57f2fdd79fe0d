use std::path::{Path, PathBuf};

/// 统一路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
/// 避免使用硬编码相对路径，确保在不同构建环境下路径一致。
///
/// # 使用示例
/// ```ignore
/// let dot = TruvisPath::debug_dump_path("frame.dot"); // target/debug-dump/frame.dot
/// ```
pub struct TruvisPath {}
// 核心路径
impl TruvisPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // 从当前包的位置推导workspace目录
        Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap().to_path_buf()
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }
}
// target 目录下
impl TruvisPath {
    /// 调试输出（graphviz 等）的目录
    pub fn debug_dump_root() -> PathBuf {
        Self::target_path().join("debug-dump")
    }

    /// 相对路径放到 `target/debug-dump/` 下，绝对路径原样返回
    pub fn debug_dump_path(filename: &str) -> PathBuf {
        let path = Path::new(filename);
        if path.is_absolute() { path.to_path_buf() } else { Self::debug_dump_root().join(path) }
    }
}
