use indexmap::IndexMap;

use crate::dominators::{Dominators, Graph, GraphNodeWorklist};

#[derive(Debug)]
pub struct NaturalLoop<G: Graph> {
    header: G::Node,
    /// Sources of the back edges into `header`.
    footers: Vec<G::Node>,
    /// Header first, then every other block that reaches a footer without passing the header.
    body: Vec<G::Node>,
    outer_loop_index: Option<usize>,
    index: usize,
}

impl<G: Graph> NaturalLoop<G> {
    fn new(header: G::Node, index: usize) -> Self {
        Self {
            header,
            footers: vec![],
            body: vec![header],
            outer_loop_index: None,
            index,
        }
    }

    pub fn body(&self) -> &[G::Node] {
        &self.body
    }

    pub fn header(&self) -> G::Node {
        self.header
    }

    pub fn footers(&self) -> &[G::Node] {
        &self.footers
    }

    pub fn outer_loop_index(&self) -> Option<usize> {
        self.outer_loop_index
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn contains(&self, block: G::Node) -> bool {
        self.body.contains(&block)
    }

    pub fn is_outer_most_loop(&self) -> bool {
        self.outer_loop_index.is_none()
    }
}

/// Dominator-based natural loops. An edge A -> B where B dominates A makes B a loop header and A
/// one of its footers; every footer of a header contributes to the same loop.
#[derive(Debug)]
pub struct NaturalLoops<G: Graph> {
    loops: Vec<NaturalLoop<G>>,
    inner_most_loop_index: IndexMap<G::Node, usize>,
}

impl<G: Graph> NaturalLoops<G> {
    pub fn new(graph: &G, dominators: &Dominators<G>) -> Self {
        let mut loops: Vec<NaturalLoop<G>> = vec![];

        for block_index in 0..graph.num_nodes() {
            let Some(header) = graph.node(block_index) else {
                continue;
            };

            for footer in graph.predecessors(header).iter().copied() {
                if !dominators.dominates(header, footer) {
                    continue;
                }

                match loops.iter_mut().find(|l| l.header == header) {
                    Some(l) => l.footers.push(footer),
                    None => {
                        let mut l = NaturalLoop::new(header, loops.len());
                        l.footers.push(footer);
                        loops.push(l);
                    }
                }
            }
        }

        for l in loops.iter_mut() {
            let mut worklist = GraphNodeWorklist::new();
            worklist.push(l.header);

            for footer in l.footers.iter().copied() {
                if worklist.push(footer) {
                    l.body.push(footer);
                }
            }

            // The header was seeded as seen, so the walk stops there.
            let mut pending = l.footers.clone();
            while let Some(block) = pending.pop() {
                for predecessor in graph.predecessors(block).iter().copied() {
                    if worklist.push(predecessor) {
                        l.body.push(predecessor);
                        pending.push(predecessor);
                    }
                }
            }
        }

        // A block belongs to the smallest loop that contains it. Loops with the same number of
        // blocks cannot contain one another, so ties never matter.
        let mut inner_most_loop_index = IndexMap::new();
        for l in loops.iter() {
            for block in l.body.iter().copied() {
                let smaller = inner_most_loop_index
                    .get(&block)
                    .map_or(true, |current: &usize| l.body.len() < loops[*current].body.len());

                if smaller {
                    inner_most_loop_index.insert(block, l.index);
                }
            }
        }

        for index in 0..loops.len() {
            let header = loops[index].header;
            let size = loops[index].body.len();

            loops[index].outer_loop_index = loops
                .iter()
                .filter(|other| other.index != index)
                .filter(|other| other.body.len() > size && other.contains(header))
                .min_by_key(|other| other.body.len())
                .map(|other| other.index);
        }

        Self {
            loops,
            inner_most_loop_index,
        }
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn loop_(&self, index: usize) -> &NaturalLoop<G> {
        &self.loops[index]
    }

    pub fn loops(&self) -> impl Iterator<Item = &NaturalLoop<G>> + '_ {
        self.loops.iter()
    }

    pub fn inner_most_loop_of(&self, block: G::Node) -> Option<&NaturalLoop<G>> {
        self.inner_most_loop_index
            .get(&block)
            .map(|index| &self.loops[*index])
    }

    pub fn inner_most_outer_loop_of(&self, l: &NaturalLoop<G>) -> Option<&NaturalLoop<G>> {
        l.outer_loop_index.map(|index| &self.loops[index])
    }

    pub fn header_of(&self, block: G::Node) -> Option<&NaturalLoop<G>> {
        self.inner_most_loop_of(block).filter(|l| l.header == block)
    }

    pub fn loop_depth(&self, block: G::Node) -> usize {
        let mut l = self.inner_most_loop_of(block);
        let mut depth = 0;

        while let Some(l_) = l {
            depth += 1;
            l = self.inner_most_outer_loop_of(l_);
        }

        depth
    }
}

#[cfg(test)]
mod tests {
    use crate::{block::BasicBlockBuilder, block::BlockId, procedure::Procedure};

    /// entry -> outer -> inner -> inner_latch -> inner (back edge)
    ///                   inner -> outer_latch -> outer (back edge)
    ///          outer -> exit
    fn double_loop() -> (Procedure, [BlockId; 6]) {
        let mut proc = Procedure::new();
        let entry = proc.add_named_block("entry");
        let outer = proc.add_named_block("outer");
        let inner = proc.add_named_block("inner");
        let inner_latch = proc.add_named_block("inner.latch");
        let outer_latch = proc.add_named_block("outer.latch");
        let exit = proc.add_named_block("exit");

        let mut builder = BasicBlockBuilder::new(&mut proc, entry);
        builder.jump(Some(outer));
        builder.switch_to_block(outer);
        let c = builder.const32(1);
        builder.branch(c, inner, exit);
        builder.switch_to_block(inner);
        let c = builder.const32(1);
        builder.branch(c, inner_latch, outer_latch);
        builder.switch_to_block(inner_latch);
        builder.jump(Some(inner));
        builder.switch_to_block(outer_latch);
        builder.jump(Some(outer));
        builder.switch_to_block(exit);
        builder.return_(None);

        (proc, [entry, outer, inner, inner_latch, outer_latch, exit])
    }

    #[test]
    fn nested_loops() {
        let (mut proc, [entry, outer, inner, inner_latch, outer_latch, exit]) = double_loop();
        let loops = proc.natural_loops_or_compute();

        assert_eq!(loops.num_loops(), 2);

        let outer_loop = loops.header_of(outer).unwrap();
        let inner_loop = loops.header_of(inner).unwrap();

        assert_eq!(outer_loop.footers(), &[outer_latch]);
        assert_eq!(inner_loop.footers(), &[inner_latch]);
        assert_eq!(outer_loop.body().len(), 4);
        assert_eq!(inner_loop.body(), &[inner, inner_latch]);

        assert!(outer_loop.is_outer_most_loop());
        assert_eq!(inner_loop.outer_loop_index(), Some(outer_loop.index()));

        assert_eq!(loops.loop_depth(entry), 0);
        assert_eq!(loops.loop_depth(outer_latch), 1);
        assert_eq!(loops.loop_depth(inner_latch), 2);
        assert!(loops.inner_most_loop_of(exit).is_none());
        assert!(loops.header_of(inner_latch).is_none());
    }
}
