//! RenderGraph 节点

use truvis_render_interface::device::GfxCommandRecorder;
use truvis_render_interface::queue::{CommandCapability, JobType};
use truvis_render_interface::rendering_info::{AttachmentLoad, AttachmentStore};
use truvis_render_interface::resource_state::DeviceResourceState;

use crate::graph::RenderGraph;
use crate::resource_version_registry::ResourceVersion;

/// 节点执行时调用的回调，不能在调用之外持有 recorder
pub type Job<C> = Box<dyn Fn(&RenderGraph<C>, &mut C, &mut dyn GfxCommandRecorder)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceRead {
    pub version: ResourceVersion,
    pub state: DeviceResourceState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceWrite {
    pub version: ResourceVersion,
    pub state: DeviceResourceState,
    /// 仅对 attachment 有意义
    pub load: AttachmentLoad,
    pub store: AttachmentStore,
}

impl ResourceWrite {
    pub(crate) fn new(version: ResourceVersion, state: DeviceResourceState) -> Self {
        Self {
            version,
            state,
            load: AttachmentLoad::Load,
            store: AttachmentStore::Store,
        }
    }

    pub(crate) fn attachment(
        version: ResourceVersion,
        state: DeviceResourceState,
        load: AttachmentLoad,
        store: AttachmentStore,
    ) -> Self {
        Self {
            version,
            state,
            load,
            store,
        }
    }
}

/// 一个 GPU 工作单元，对应 builder 中的一对 begin/end
pub struct Node<C> {
    pub(crate) name: String,
    pub(crate) job_type: JobType,
    pub(crate) capabilities: CommandCapability,
    pub(crate) is_async: bool,
    pub(crate) reads: Vec<ResourceRead>,
    pub(crate) writes: Vec<ResourceWrite>,
    pub(crate) job: Option<Job<C>>,
}

impl<C> Node<C> {
    pub(crate) fn new(name: String, job_type: JobType, capabilities: CommandCapability, is_async: bool) -> Self {
        Self {
            name,
            job_type,
            capabilities,
            is_async,
            reads: Vec::new(),
            writes: Vec::new(),
            job: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    #[inline]
    pub fn capabilities(&self) -> CommandCapability {
        self.capabilities
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    #[inline]
    pub fn reads(&self) -> &[ResourceRead] {
        &self.reads
    }

    #[inline]
    pub fn writes(&self) -> &[ResourceWrite] {
        &self.writes
    }

    #[inline]
    pub fn has_job(&self) -> bool {
        self.job.is_some()
    }

    pub fn reads_version(&self, version: ResourceVersion) -> bool {
        self.reads.iter().any(|read| read.version == version)
    }

    pub fn writes_version(&self, version: ResourceVersion) -> bool {
        self.writes.iter().any(|write| write.version == version)
    }
}
