//! Pass 之间的依赖分析
//!
//! pass 按声明顺序执行，不做拓扑排序。依赖图只用于计算 submission level：
//! 没有任何依赖的 pass 位于 level 0，其他 pass 位于所有前驱的最大 level + 1。
//! 同一个 level 内的 pass 之间没有依赖，可以放进同一个 submit batch。

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use slotmap::SecondaryMap;

use crate::render_graph::handle::RgResourceHandle;
use crate::render_graph::pass::RgRenderPass;
use crate::render_graph::resource_registry::RgResourceRegistry;

/// 依赖图
///
/// 节点是 pass 索引，边上记录产生依赖的资源。
pub struct RgDependencyGraph {
    graph: DiGraph<usize, Vec<RgResourceHandle>>,
    node_indices: Vec<NodeIndex>,
    levels: Vec<usize>,
}

impl RgDependencyGraph {
    /// 分析资源依赖，构建依赖图
    ///
    /// 规则：
    /// - 写后读（RAW）：reader 依赖 writer
    /// - 读后写（WAR）：writer 依赖之前的所有 reader
    /// - 写后写（WAW）：后一个 writer 依赖前一个 writer
    ///
    /// # Panics
    /// 非 external 资源在它的第一个 writer 声明之前就被读取时 panic。
    pub fn analyze(passes: &[RgRenderPass], registry: &RgResourceRegistry) -> Self {
        let mut graph = DiGraph::with_capacity(passes.len(), passes.len() * 2);
        let node_indices: Vec<NodeIndex> = (0..passes.len()).map(|i| graph.add_node(i)).collect();
        let mut dep_graph = Self {
            graph,
            node_indices,
            levels: vec![0; passes.len()],
        };

        let mut first_writer: SecondaryMap<RgResourceHandle, usize> = SecondaryMap::new();
        for (pass_idx, pass) in passes.iter().enumerate() {
            for (handle, _) in pass.resource_states().filter(|(handle, _)| pass.writes(*handle)) {
                if !first_writer.contains_key(handle) {
                    first_writer.insert(handle, pass_idx);
                }
            }
        }

        // 跟踪每个资源的最后写入者，以及该次写入之后的读取者
        let mut last_writer: SecondaryMap<RgResourceHandle, usize> = SecondaryMap::new();
        let mut readers: SecondaryMap<RgResourceHandle, Vec<usize>> = SecondaryMap::new();

        for (pass_idx, pass) in passes.iter().enumerate() {
            for (handle, _) in pass.resource_states() {
                if pass.reads(handle) {
                    match last_writer.get(handle) {
                        Some(&writer) if writer != pass_idx => dep_graph.add_edge(writer, pass_idx, handle),
                        Some(_) => {}
                        None => {
                            // external 资源可以先读后写，其余资源必须先声明生产者
                            let produced_later = first_writer.get(handle).is_some_and(|writer| *writer > pass_idx);
                            let external = registry.get(handle).is_some_and(|resource| resource.is_external());
                            assert!(
                                !produced_later || external,
                                "RenderGraph: pass `{}` reads `{}` before its producer is declared",
                                pass.name(),
                                registry.name_of(handle)
                            );
                        }
                    }
                }

                if pass.writes(handle) {
                    if let Some(&prev_writer) = last_writer.get(handle)
                        && prev_writer != pass_idx
                    {
                        dep_graph.add_edge(prev_writer, pass_idx, handle);
                    }
                    if let Some(prev_readers) = readers.remove(handle) {
                        for reader in prev_readers.into_iter().filter(|reader| *reader != pass_idx) {
                            dep_graph.add_edge(reader, pass_idx, handle);
                        }
                    }
                    last_writer.insert(handle, pass_idx);
                }

                if pass.reads(handle) && !pass.writes(handle) {
                    match readers.get_mut(handle) {
                        Some(list) => list.push(pass_idx),
                        None => {
                            readers.insert(handle, vec![pass_idx]);
                        }
                    }
                }
            }
        }

        dep_graph.compute_levels();
        dep_graph
    }

    /// 添加依赖边，同一对 pass 之间的边会合并资源列表
    ///
    /// producer 总是先于 consumer 声明。
    fn add_edge(&mut self, producer: usize, consumer: usize, resource: RgResourceHandle) {
        let producer_node = self.node_indices[producer];
        let consumer_node = self.node_indices[consumer];

        if let Some(edge_idx) = self.graph.find_edge(producer_node, consumer_node) {
            if let Some(resources) = self.graph.edge_weight_mut(edge_idx)
                && !resources.contains(&resource)
            {
                resources.push(resource);
            }
        } else {
            self.graph.add_edge(producer_node, consumer_node, vec![resource]);
        }
    }

    /// 边总是从先声明的 pass 指向后声明的 pass，按声明顺序遍历即可
    fn compute_levels(&mut self) {
        for pass_idx in 0..self.node_indices.len() {
            let level = self
                .get_predecessors(pass_idx)
                .into_iter()
                .map(|pred| self.levels[pred] + 1)
                .max()
                .unwrap_or(0);
            self.levels[pass_idx] = level;
        }
    }
}

// getters
impl RgDependencyGraph {
    #[inline]
    pub fn level(&self, pass_index: usize) -> usize {
        self.levels[pass_index]
    }

    #[inline]
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    /// level 的数量，没有 pass 时为 0
    pub fn level_count(&self) -> usize {
        self.levels.iter().max().map(|max| max + 1).unwrap_or(0)
    }

    pub fn passes_at_level(&self, level: usize) -> Vec<usize> {
        self.levels.iter().enumerate().filter(|(_, l)| **l == level).map(|(idx, _)| idx).collect()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_edge(&self, producer: usize, consumer: usize) -> bool {
        self.graph.find_edge(self.node_indices[producer], self.node_indices[consumer]).is_some()
    }

    /// 产生 producer -> consumer 依赖的资源
    pub fn edge_resources(&self, producer: usize, consumer: usize) -> &[RgResourceHandle] {
        self.graph
            .find_edge(self.node_indices[producer], self.node_indices[consumer])
            .and_then(|edge| self.graph.edge_weight(edge))
            .map(|resources| resources.as_slice())
            .unwrap_or(&[])
    }

    /// 获取 Pass 的直接依赖（前驱）
    pub fn get_predecessors(&self, pass_index: usize) -> Vec<usize> {
        let node = self.node_indices[pass_index];
        self.graph.neighbors_directed(node, Direction::Incoming).map(|n| self.graph[n]).collect()
    }

    /// 获取 Pass 的直接后继
    pub fn get_successors(&self, pass_index: usize) -> Vec<usize> {
        let node = self.node_indices[pass_index];
        self.graph.neighbors_directed(node, Direction::Outgoing).map(|n| self.graph[n]).collect()
    }
}
