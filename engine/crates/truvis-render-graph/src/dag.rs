//! 有向无环图容器
//!
//! 节点保存在数组中，邻接表按节点句柄索引。提供拓扑排序以及按依赖层级（depth）排序，
//! RenderGraph 的节点调度与 transient 资源的解析顺序都基于它。

use std::fmt;

use crate::error::DagCycle;

/// 节点句柄：插入时分配的稳定下标，在 DAG 存在期间不会复用
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u32);

impl NodeHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 拓扑排序并计算依赖层级后的结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DagSchedule {
    /// 按 (depth, 拓扑序) 排序后的节点
    pub sorted: Vec<NodeHandle>,
    /// 以节点句柄为下标的 depth
    pub depth: Vec<u32>,
    pub max_depth: u32,
}

pub struct Dag<N> {
    nodes: Vec<N>,
    adjacency: Vec<Vec<NodeHandle>>,
}

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<N> Dag<N> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            adjacency: Vec::new(),
        }
    }

    pub fn emplace_node(&mut self, value: N) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(value);
        self.adjacency.push(Vec::new());
        handle
    }

    /// `from` 必须先于 `to` 执行
    ///
    /// 重复的边不会被去重
    pub fn add_edge(&mut self, from: NodeHandle, to: NodeHandle) {
        assert!(to.index() < self.nodes.len(), "edge target {to} out of range");
        self.adjacency[from.index()].push(to);
    }
}

impl Dag<()> {
    pub fn declare_node(&mut self) -> NodeHandle {
        self.emplace_node(())
    }

    pub fn with_nodes(count: usize) -> Self {
        let mut dag = Self::new();
        for _ in 0..count {
            dag.declare_node();
        }
        dag
    }
}

// getter & iter
impl<N> Dag<N> {
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, handle: NodeHandle) -> &N {
        &self.nodes[handle.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, handle: NodeHandle) -> &mut N {
        &mut self.nodes[handle.index()]
    }

    /// 直接后继
    #[inline]
    pub fn adjacency(&self, from: NodeHandle) -> &[NodeHandle] {
        &self.adjacency[from.index()]
    }

    /// 线性查找邻接表
    #[inline]
    pub fn edge_exists(&self, from: NodeHandle, to: NodeHandle) -> bool {
        self.adjacency[from.index()].contains(&to)
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + use<N> {
        (0..self.nodes.len() as u32).map(NodeHandle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &N)> {
        self.nodes.iter().enumerate().map(|(idx, node)| (NodeHandle(idx as u32), node))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeHandle, &mut N)> {
        self.nodes.iter_mut().enumerate().map(|(idx, node)| (NodeHandle(idx as u32), node))
    }

    /// 所有边反向后的图，用于查询前驱
    pub fn reverse(&self) -> Dag<()> {
        let mut reversed = Dag::with_nodes(self.nodes.len());
        for (from, successors) in self.adjacency.iter().enumerate() {
            for &to in successors {
                reversed.add_edge(to, NodeHandle(from as u32));
            }
        }
        reversed
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    OnStack,
    Done,
}

// 排序
impl<N> Dag<N> {
    /// 拓扑排序，依赖排在被依赖者之前
    ///
    /// 使用显式栈的 DFS，按句柄顺序依次从未访问的节点出发，结果为逆后序。
    /// 遇到指向栈中节点的边即为环。
    pub fn topological_sort(&self) -> Result<Vec<NodeHandle>, DagCycle> {
        let node_count = self.nodes.len();
        let mut states = vec![VisitState::Unvisited; node_count];
        let mut post_order = Vec::with_capacity(node_count);

        // (节点, 下一个要访问的后继下标)
        let mut stack: Vec<(NodeHandle, usize)> = Vec::new();

        for root in self.handles() {
            if states[root.index()] != VisitState::Unvisited {
                continue;
            }

            states[root.index()] = VisitState::OnStack;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let successors = &self.adjacency[node.index()];
                if top.1 < successors.len() {
                    let child = successors[top.1];
                    top.1 += 1;

                    match states[child.index()] {
                        VisitState::Unvisited => {
                            states[child.index()] = VisitState::OnStack;
                            stack.push((child, 0));
                        }
                        VisitState::OnStack => {
                            let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                            let nodes = stack[start..].iter().map(|(n, _)| *n).collect();
                            return Err(DagCycle { nodes });
                        }
                        VisitState::Done => {}
                    }
                } else {
                    states[node.index()] = VisitState::Done;
                    post_order.push(node);
                    stack.pop();
                }
            }
        }

        post_order.reverse();
        Ok(post_order)
    }

    /// 拓扑排序并计算每个节点的 depth（到任意源节点的最长路径）
    ///
    /// 结果按 depth 分组，同一 depth 内保持拓扑排序中的先后顺序。
    pub fn topological_sort_with_depth(&self) -> Result<DagSchedule, DagCycle> {
        let topo_order = self.topological_sort()?;

        let mut depth = vec![0u32; self.nodes.len()];
        let mut max_depth = 0;
        for &from in &topo_order {
            let from_depth = depth[from.index()];
            for &to in &self.adjacency[from.index()] {
                depth[to.index()] = depth[to.index()].max(from_depth + 1);
                max_depth = max_depth.max(depth[to.index()]);
            }
        }

        // 稳定排序，同 depth 的节点保持拓扑序
        let mut sorted = topo_order;
        sorted.sort_by_key(|handle| depth[handle.index()]);

        Ok(DagSchedule {
            sorted,
            depth,
            max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[NodeHandle], handle: NodeHandle) -> usize {
        order.iter().position(|h| *h == handle).unwrap()
    }

    /// a -> b -> d, a -> c -> d, e 独立
    fn diamond() -> (Dag<&'static str>, [NodeHandle; 5]) {
        let mut dag = Dag::new();
        let a = dag.emplace_node("a");
        let b = dag.emplace_node("b");
        let c = dag.emplace_node("c");
        let d = dag.emplace_node("d");
        let e = dag.emplace_node("e");
        dag.add_edge(a, b);
        dag.add_edge(a, c);
        dag.add_edge(b, d);
        dag.add_edge(c, d);
        (dag, [a, b, c, d, e])
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let (dag, _) = diamond();
        let order = dag.topological_sort().unwrap();
        assert_eq!(order.len(), dag.len());

        for from in dag.handles() {
            for &to in dag.adjacency(from) {
                assert!(position(&order, from) < position(&order, to));
            }
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let mut dag = Dag::<()>::new();
        let a = dag.declare_node();
        let b = dag.declare_node();
        dag.add_edge(a, b);
        dag.add_edge(b, a);

        let cycle = dag.topological_sort().unwrap_err();
        assert_eq!(cycle.nodes, vec![a, b]);
        assert!(dag.topological_sort_with_depth().is_err());
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let mut dag = Dag::<()>::new();
        let a = dag.declare_node();
        dag.add_edge(a, a);
        assert_eq!(dag.topological_sort().unwrap_err().nodes, vec![a]);
    }

    #[test]
    fn test_depth_monotonic() {
        let (dag, [a, b, c, d, e]) = diamond();
        let schedule = dag.topological_sort_with_depth().unwrap();

        assert_eq!(schedule.depth[a.index()], 0);
        assert_eq!(schedule.depth[b.index()], 1);
        assert_eq!(schedule.depth[c.index()], 1);
        assert_eq!(schedule.depth[d.index()], 2);
        assert_eq!(schedule.depth[e.index()], 0);
        assert_eq!(schedule.max_depth, 2);

        for from in dag.handles() {
            for &to in dag.adjacency(from) {
                assert!(schedule.depth[to.index()] > schedule.depth[from.index()]);
            }
        }

        // 按 depth 分组
        let depths = schedule.sorted.iter().map(|h| schedule.depth[h.index()]).collect::<Vec<_>>();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_depth_tie_keeps_topological_order() {
        let (dag, [_, b, c, _, _]) = diamond();
        let topo = dag.topological_sort().unwrap();
        let schedule = dag.topological_sort_with_depth().unwrap();

        assert_eq!(
            position(&topo, b) < position(&topo, c),
            position(&schedule.sorted, b) < position(&schedule.sorted, c)
        );

        // 重复排序结果不变
        assert_eq!(dag.topological_sort_with_depth().unwrap(), schedule);
    }

    #[test]
    fn test_longest_path_depth() {
        // a -> c 与 a -> b -> c 同时存在，c 的 depth 取最长路径
        let mut dag = Dag::<()>::new();
        let a = dag.declare_node();
        let b = dag.declare_node();
        let c = dag.declare_node();
        dag.add_edge(a, c);
        dag.add_edge(a, b);
        dag.add_edge(b, c);

        let schedule = dag.topological_sort_with_depth().unwrap();
        assert_eq!(schedule.depth[c.index()], 2);
        assert_eq!(schedule.sorted, vec![a, b, c]);
    }

    #[test]
    fn test_duplicate_edges_tolerated() {
        let mut dag = Dag::<()>::new();
        let a = dag.declare_node();
        let b = dag.declare_node();
        dag.add_edge(a, b);
        dag.add_edge(a, b);

        assert_eq!(dag.edge_count(), 2);
        assert!(dag.edge_exists(a, b));
        assert!(!dag.edge_exists(b, a));
        assert_eq!(dag.topological_sort().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_reverse() {
        let (dag, [a, b, c, d, _]) = diamond();
        let reversed = dag.reverse();

        assert_eq!(reversed.len(), dag.len());
        assert!(reversed.edge_exists(d, b));
        assert!(reversed.edge_exists(d, c));
        assert!(reversed.edge_exists(b, a));
        assert!(!reversed.edge_exists(a, b));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut dag = Dag::<()>::new();
        let mut prev = dag.declare_node();
        for _ in 0..100_000 {
            let next = dag.declare_node();
            dag.add_edge(prev, next);
            prev = next;
        }

        let schedule = dag.topological_sort_with_depth().unwrap();
        assert_eq!(schedule.max_depth, 100_000);
    }
}
