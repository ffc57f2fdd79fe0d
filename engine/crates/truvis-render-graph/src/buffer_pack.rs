//! Buffer pack
//!
//! 一组缓冲区作为一个资源参与依赖分析，例如所有 mesh 的 vertex buffer。
//! 包内缓冲区的数量与句柄可以每帧变化，barrier 在录制时按包内的缓冲区展开。

use truvis_render_interface::barrier::GfxBufferBarrier;
use truvis_render_interface::resource_info::BufferResource;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgBufferPack {
    pub name: String,
    pub buffers: Vec<BufferResource>,
}

impl RgBufferPack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffers: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// 把整个 pack 的 barrier 展开为包内每个缓冲区各一个，覆盖整个缓冲区
    pub fn expand_barrier<'a>(&'a self, barrier: &'a GfxBufferBarrier) -> impl Iterator<Item = GfxBufferBarrier> + 'a {
        self.buffers.iter().map(move |buffer| barrier.clone().buffer(buffer.handle))
    }
}
