//! Layer：多个功能模块向同一个渲染阶段追加工作
//!
//! 例如 "opaque" layer 中，地形、植被、角色各自追加自己的绘制回调，
//! 彼此不需要知道对方。layer 内的执行顺序就是追加顺序，不做依赖分析。

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use truvis_render_interface::device::GfxCommandRecorder;

use crate::builder::{RenderGraphBuilder, SetupTask};
use crate::error::RgBuildError;
use crate::graph::RenderGraph;
use crate::node::Job;

pub struct Layer<C> {
    name: String,
    setup_tasks: Vec<SetupTask<C>>,
    jobs: Vec<Rc<Job<C>>>,
}

pub type SharedLayer<C> = Rc<RefCell<Layer<C>>>;

impl<C> Layer<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup_tasks: Vec::new(),
            jobs: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emplace_job(&mut self, job: Job<C>) {
        self.jobs.push(Rc::new(job));
    }

    pub fn emplace_setup_task(&mut self, task: SetupTask<C>) {
        self.setup_tasks.push(task);
    }

    /// 在构建 graph 时调用，让各个模块追加资源声明
    pub fn setup(&mut self, builder: &mut RenderGraphBuilder<C>) {
        for task in &mut self.setup_tasks {
            task(builder);
        }
    }

    /// 当前所有 job 的快照，按追加顺序
    pub fn jobs(&self) -> Vec<Rc<Job<C>>> {
        self.jobs.clone()
    }

    #[inline]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn setup_task_count(&self) -> usize {
        self.setup_tasks.len()
    }
}

/// 把 layer 作为节点的回调
pub fn layer_job<C: 'static>(layer: SharedLayer<C>) -> Job<C> {
    Box::new(move |graph, ctx, recorder| execute_layer(&layer, graph, ctx, recorder))
}

/// 按追加顺序调用 layer 中的所有 job
///
/// 调用前先取出 job 的快照并释放借用，job 执行时向同一个 layer 追加的 job 从下一帧开始生效
pub fn execute_layer<C>(
    layer: &SharedLayer<C>,
    graph: &RenderGraph<C>,
    ctx: &mut C,
    recorder: &mut dyn GfxCommandRecorder,
) {
    let jobs = layer.borrow().jobs();
    for job in jobs.iter().map(Rc::as_ref) {
        job(graph, ctx, &mut *recorder);
    }
}

/// 按名称共享的 layer 集合
pub struct LayerMap<C> {
    layers: IndexMap<String, SharedLayer<C>>,
}

impl<C> Default for LayerMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> LayerMap<C> {
    pub fn new() -> Self {
        Self { layers: IndexMap::new() }
    }

    /// 同名的 layer 会被替换
    pub fn insert(&mut self, layer: Layer<C>) -> SharedLayer<C> {
        let name = layer.name().to_string();
        let shared = Rc::new(RefCell::new(layer));
        if self.layers.insert(name.clone(), shared.clone()).is_some() {
            log::warn!("layer \"{}\" replaced", name);
        }
        shared
    }

    pub fn get(&self, name: &str) -> Option<SharedLayer<C>> {
        self.layers.get(name).cloned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn layer(&self, name: &str) -> Result<&SharedLayer<C>, RgBuildError> {
        self.layers.get(name).ok_or_else(|| RgBuildError::UnknownLayer { name: name.to_string() })
    }

    pub fn emplace_job(&self, name: &str, job: Job<C>) -> Result<(), RgBuildError> {
        self.layer(name)?.borrow_mut().emplace_job(job);
        Ok(())
    }

    pub fn emplace_setup_task(&self, name: &str, task: SetupTask<C>) -> Result<(), RgBuildError> {
        self.layer(name)?.borrow_mut().emplace_setup_task(task);
        Ok(())
    }

    /// 按 layer 插入的顺序调用所有 setup task
    pub fn setup_all(&self, builder: &mut RenderGraphBuilder<C>) {
        for layer in self.layers.values() {
            layer.borrow_mut().setup(builder);
        }
    }
}
