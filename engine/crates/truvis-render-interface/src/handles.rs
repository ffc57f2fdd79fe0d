//! 设备侧资源句柄
//!
//! 句柄由设备分配，RenderGraph 只保存句柄本身，不持有资源对象。

slotmap::new_key_type! {
    /// 设备侧纹理句柄
    pub struct GfxTextureHandle;
    /// 设备侧缓冲区句柄
    pub struct GfxBufferHandle;
    /// timeline semaphore 句柄
    pub struct GfxSemaphoreHandle;
}
