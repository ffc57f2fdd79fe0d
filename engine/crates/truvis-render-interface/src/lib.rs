//! GPU 设备边界
//!
//! RenderGraph 只依赖这里定义的抽象，不依赖具体的图形 API 后端：
//!
//! - `handles`: 设备侧资源句柄（纹理、缓冲区、信号量）
//! - `resource_state`: `DeviceResourceState` 以及到 Vulkan stage/access/layout 的推导
//! - `resource_info`: 纹理、缓冲区的创建描述
//! - `queue`: 队列类型、命令能力、节点类型
//! - `barrier` / `rendering_info` / `submit_info`: 录制与提交时使用的描述结构
//! - `device`: `GfxDevice` 与 `GfxCommandRecorder` trait
//! - `dummy_device`: 只记录调用的设备实现，用于测试
//! - `frame_counter`: 帧序号

pub mod barrier;
pub mod device;
pub mod dummy_device;
pub mod frame_counter;
pub mod handles;
pub mod queue;
pub mod rendering_info;
pub mod resource_info;
pub mod resource_state;
pub mod submit_info;
