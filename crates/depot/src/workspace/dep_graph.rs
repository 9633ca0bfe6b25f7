use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

/// A directed graph of `T`, built by following a `deps_of` closure outward from a set of
/// roots until it stops discovering new nodes.
///
/// Used for two unrelated purposes in depot: the intra-workspace *package* dependency
/// graph and the inter-*command* graph (e.g. `build` depends on `init` having already
/// run). Both are "follow edges from a few roots, collect everything reachable, refuse a
/// cycle" problems, so they share this one implementation.
pub struct DepGraph<T> {
    nodes: Vec<T>,
    /// `edges[i]` holds the indices into `nodes` that node `i` depends on.
    edges: Vec<Vec<usize>>,
    index_of: HashMap<String, usize>,
}

impl<T> DepGraph<T> {
    pub fn build<FK, FD>(roots: Vec<T>, id_of: FK, deps_of: FD) -> Result<Self>
    where
        FK: Fn(&T) -> String,
        FD: Fn(&T) -> Vec<T>,
    {
        let mut nodes = Vec::new();
        let mut index_of = HashMap::new();
        let mut queue = Vec::new();

        for root in roots {
            let id = id_of(&root);
            if let std::collections::hash_map::Entry::Vacant(e) = index_of.entry(id) {
                let idx = nodes.len();
                e.insert(idx);
                queue.push(idx);
                nodes.push(root);
            }
        }

        let mut edges: Vec<Vec<usize>> = Vec::new();
        let mut cursor = 0;
        while cursor < nodes.len() {
            while edges.len() <= cursor {
                edges.push(Vec::new());
            }

            let deps = deps_of(&nodes[cursor]);
            for dep in deps {
                let id = id_of(&dep);
                let idx = match index_of.get(&id) {
                    Some(idx) => *idx,
                    None => {
                        let idx = nodes.len();
                        index_of.insert(id, idx);
                        nodes.push(dep);
                        idx
                    }
                };
                edges[cursor].push(idx);
            }

            cursor += 1;
        }
        while edges.len() < nodes.len() {
            edges.push(Vec::new());
        }

        let graph = DepGraph {
            nodes,
            edges,
            index_of,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        fn visit(
            graph: &[Vec<usize>],
            marks: &mut [Mark],
            node: usize,
        ) -> Result<()> {
            match marks[node] {
                Mark::Done => return Ok(()),
                Mark::Visiting => bail!("Dependency cycle detected in graph"),
                Mark::Unvisited => {}
            }
            marks[node] = Mark::Visiting;
            for &dep in &graph[node] {
                visit(graph, marks, dep)?;
            }
            marks[node] = Mark::Done;
            Ok(())
        }

        for idx in 0..self.nodes.len() {
            visit(&self.edges, &mut marks, idx)?;
        }
        Ok(())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }

    pub fn direct_deps(&self, id: &str) -> Option<&[usize]> {
        self.index_of.get(id).map(|idx| self.edges[*idx].as_slice())
    }

    pub fn get(&self, index: usize) -> &T {
        &self.nodes[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    /// Every node reachable from `id`, transitively, not including `id` itself.
    pub fn transitive_deps(&self, id: &str) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let Some(start) = self.index_of(id) else {
            return seen;
        };
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dep in &self.edges[node] {
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Node(&'static str, Vec<&'static str>);

    fn graph_of(nodes: &[(&'static str, Vec<&'static str>)]) -> DepGraph<Node> {
        let by_name: HashMap<_, _> = nodes.iter().cloned().collect();
        let roots = nodes
            .iter()
            .map(|(name, deps)| Node(name, deps.clone()))
            .collect();
        DepGraph::build(roots, |n| n.0.to_string(), move |n: &Node| {
            n.1.iter()
                .map(|dep| Node(dep, by_name.get(dep).cloned().unwrap_or_default()))
                .collect()
        })
        .unwrap()
    }

    #[test]
    fn transitive_closure_reaches_fixed_point() {
        let graph = graph_of(&[("a", vec!["b"]), ("b", vec!["c"]), ("c", vec![])]);
        let closure = graph.transitive_deps("a");
        let names: HashSet<_> = closure.into_iter().map(|i| graph.get(i).0).collect();
        assert_eq!(names, HashSet::from(["b", "c"]));
    }

    #[test]
    fn detects_cycles() {
        let nodes = [("a", vec!["b"]), ("b", vec!["a"])];
        let by_name: HashMap<_, _> = nodes.iter().cloned().collect();
        let roots: Vec<_> = nodes
            .iter()
            .map(|(name, deps)| Node(name, deps.clone()))
            .collect();
        let result = DepGraph::build(roots, |n| n.0.to_string(), move |n: &Node| {
            n.1.iter()
                .map(|dep| Node(dep, by_name.get(dep).cloned().unwrap_or_default()))
                .collect()
        });
        assert!(result.is_err());
    }
}
