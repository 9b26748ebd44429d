use std::{borrow::Cow, fmt::Debug, hash::Hash, marker::PhantomData, rc::Rc};

use crate::utils::index_set::{IndexMap, IndexSet, KeyIndex};

pub trait Graph {
    type Node: Copy
        + Clone
        + PartialEq
        + Eq
        + PartialOrd
        + Ord
        + Hash
        + Debug
        + From<usize>
        + Into<usize>
        + KeyIndex;

    fn num_nodes(&self) -> usize;
    fn node(&self, index: usize) -> Option<Self::Node>;
    fn node_index(&self, node: Self::Node) -> usize;
    fn root(&self) -> Self::Node;
    fn successors(&self, block: Self::Node) -> Cow<[Self::Node]>;
    fn predecessors(&self, block: Self::Node) -> Cow<[Self::Node]>;

    fn display(&self, block: Option<Self::Node>) -> String {
        if let Some(block) = block {
            format!("{:?}", block)
        } else {
            "null".to_owned()
        }
    }
}

/// Depth-first post-order of every node reachable from the root. Each stack entry remembers how
/// many successors it has already handed out, so a node is only finished once all of its
/// successors are.
pub fn graph_post_order<G: Graph>(graph: &G) -> Vec<G::Node> {
    let mut result = Vec::with_capacity(graph.num_nodes());
    if graph.num_nodes() == 0 {
        return result;
    }

    let mut seen = IndexSet::new();
    let mut stack = vec![(graph.root(), 0usize)];
    seen.insert(graph.root());

    while let Some((node, next)) = stack.last_mut() {
        let node = *node;
        let successors = graph.successors(node);

        if let Some(successor) = successors.get(*next).copied() {
            *next += 1;
            if seen.insert(successor) {
                stack.push((successor, 0));
            }
        } else {
            stack.pop();
            result.push(node);
        }
    }

    result
}

pub struct GraphNodeWorklist<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> {
    seen: IndexSet<Node>,
    stack: Vec<Node>,
}

impl<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> Default for GraphNodeWorklist<Node> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> GraphNodeWorklist<Node> {
    pub fn new() -> Self {
        Self {
            seen: IndexSet::new(),
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) -> bool {
        if self.seen.insert(node) {
            self.stack.push(node);
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn seen(&self) -> &IndexSet<Node> {
        &self.seen
    }

    pub fn pop(&mut self) -> Option<Node> {
        self.stack.pop()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum GraphVisitOrder {
    Pre,
    Post,
}

struct DomBlockData<G: Graph> {
    idom_kids: Vec<G::Node>,
    idom_parent: Option<G::Node>,
    pre_number: usize,
    post_number: usize,
}

impl<G: Graph> DomBlockData<G> {
    fn new() -> Self {
        Self {
            idom_kids: vec![],
            idom_parent: None,
            pre_number: usize::MAX,
            post_number: usize::MAX,
        }
    }
}

/// Immediate dominators are found with the iterative algorithm of Cooper, Harvey and Kennedy, "A
/// Simple, Fast Dominance Algorithm" (2001): nodes are visited in reverse post-order and each
/// node's dominator is the intersection of its processed predecessors' dominators, repeated until
/// nothing changes. Dominance queries then walk the dominator tree with pre and post numbers, so
/// `a` dominates `b` exactly when `b`'s interval nests inside `a`'s.
pub struct Dominators<G: Graph + 'static> {
    data: Rc<IndexMap<DomBlockData<G>, G::Node>>,
    marker: PhantomData<&'static G>,
}

impl<G: Graph + 'static> Clone for Dominators<G> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            marker: PhantomData,
        }
    }
}

impl<G: Graph> Dominators<G> {
    fn data(&self, node: G::Node) -> Option<&DomBlockData<G>> {
        self.data.get(&node)
    }

    pub fn new(graph: &G) -> Self {
        let post_order = graph_post_order(graph);

        // Position of each reachable node in post-order; the root has the largest one.
        let mut order = IndexMap::<usize, G::Node>::new();
        for (index, node) in post_order.iter().enumerate() {
            order.insert(*node, index);
        }

        let mut idom = IndexMap::<G::Node, G::Node>::new();
        if let Some(root) = post_order.last().copied() {
            idom.insert(root, root);
        }

        let intersect = |idom: &IndexMap<G::Node, G::Node>, mut a: G::Node, mut b: G::Node| {
            while a != b {
                while order.get(&a) < order.get(&b) {
                    a = idom.get(&a).copied().unwrap_or(a);
                }
                while order.get(&b) < order.get(&a) {
                    b = idom.get(&b).copied().unwrap_or(b);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;

            for node in post_order.iter().rev().skip(1).copied() {
                let mut new_idom = None;

                for pred in graph.predecessors(node).iter().copied() {
                    if !idom.contains(&pred) {
                        continue;
                    }

                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, pred, current),
                    });
                }

                if let Some(new_idom) = new_idom {
                    if idom.get(&node) != Some(&new_idom) {
                        idom.insert(node, new_idom);
                        changed = true;
                    }
                }
            }
        }

        let mut data = IndexMap::new();

        for node in post_order.iter().rev().copied() {
            data.get_or_insert_with(node, DomBlockData::new);

            let parent = idom.get(&node).copied().filter(|parent| *parent != node);
            if let Some(parent) = parent {
                data.get_or_insert_with(node, DomBlockData::new).idom_parent = Some(parent);
                data.get_or_insert_with(parent, DomBlockData::new)
                    .idom_kids
                    .push(node);
            }
        }

        let mut next_pre_number = 0;
        let mut next_post_number = 0;

        let mut worklist = Vec::<(G::Node, GraphVisitOrder)>::new();
        if let Some(root) = post_order.last().copied() {
            worklist.push((root, GraphVisitOrder::Pre));
        }

        while let Some((node, order)) = worklist.pop() {
            let entry = data.get_or_insert_with(node, DomBlockData::new);

            match order {
                GraphVisitOrder::Pre => {
                    entry.pre_number = next_pre_number;
                    next_pre_number += 1;

                    worklist.push((node, GraphVisitOrder::Post));
                    for kid in entry.idom_kids.iter().copied() {
                        worklist.push((kid, GraphVisitOrder::Pre));
                    }
                }

                GraphVisitOrder::Post => {
                    entry.post_number = next_post_number;
                    next_post_number += 1;
                }
            }
        }

        Self {
            data: Rc::new(data),
            marker: PhantomData,
        }
    }

    /// Unreachable nodes neither dominate nor are dominated.
    pub fn strictly_dominates(&self, from: G::Node, to: G::Node) -> bool {
        match (self.data(from), self.data(to)) {
            (Some(from), Some(to)) => {
                to.pre_number > from.pre_number && to.post_number < from.post_number
            }
            _ => false,
        }
    }

    pub fn dominates(&self, from: G::Node, to: G::Node) -> bool {
        from == to || self.strictly_dominates(from, to)
    }

    /// Returns the immediate dominator of this block. Returns `None` for the root block.
    pub fn idom(&self, block: G::Node) -> Option<G::Node> {
        self.data(block).and_then(|data| data.idom_parent)
    }

    pub fn is_reachable(&self, block: G::Node) -> bool {
        self.data(block).is_some()
    }

    pub fn for_all_strict_dominators_of<F>(&self, to: G::Node, mut f: F)
    where
        F: FnMut(G::Node),
    {
        let mut block = self.idom(to);

        while let Some(bb) = block {
            f(bb);
            block = self.idom(bb);
        }
    }

    pub fn strict_dominators_of(&self, to: G::Node) -> IndexSet<G::Node> {
        let mut result = IndexSet::new();

        self.for_all_strict_dominators_of(to, |node| {
            result.insert(node);
        });

        result
    }

    pub fn display<'a>(&'a self, graph: &'a G) -> DominatorsDisplay<'a, G> {
        DominatorsDisplay { dominators: self, graph }
    }
}

pub struct DominatorsDisplay<'a, G: Graph + 'static> {
    dominators: &'a Dominators<G>,
    graph: &'a G,
}

impl<'a, G: Graph> std::fmt::Display for DominatorsDisplay<'a, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for index in 0..self.graph.num_nodes() {
            let Some(node) = self.graph.node(index) else {
                continue;
            };

            if !self.dominators.is_reachable(node) {
                continue;
            }

            writeln!(
                f,
                "{}: idom = {}",
                self.graph.display(Some(node)),
                self.graph.display(self.dominators.idom(node))
            )?;
        }

        Ok(())
    }
}
