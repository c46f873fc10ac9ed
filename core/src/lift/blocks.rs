//! Basic-block partition, dominators and post-dominators.
//!
//! The partition is format-neutral: callers describe each instruction by
//! its offset and control flow, plus extra leader offsets for try ranges
//! and handler entries. Exception edges are not part of the graph; handler
//! chains are structured separately by the lifters.

use ahash::{AHashMap, AHashSet};

/// Control flow out of one instruction. Targets are instruction offsets.
#[derive(Debug, Clone)]
pub enum Flow {
    /// Falls through to the next instruction.
    Fall,
    /// Unconditional jump.
    Jump(usize),
    /// Conditional branch: falls through or jumps.
    Branch(usize),
    /// Multi-way dispatch; `fall` when the default case falls through.
    Switch { targets: Vec<usize>, fall: bool },
    /// return / throw
    Halt,
}

#[derive(Debug)]
pub struct Block {
    /// Instruction index range `[lo, hi)`.
    pub lo: usize,
    pub hi: usize,
    pub succs: Vec<usize>,
    pub preds: Vec<usize>,
}

#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<Block>,
    /// Leader offset → block id.
    pub block_at: AHashMap<usize, usize>,
    /// Reverse post-order over blocks reachable from entry.
    pub rpo: Vec<usize>,
    /// Immediate dominator per block; entry points at itself, unreachable
    /// blocks at themselves as well.
    pub idom: Vec<usize>,
    /// Immediate post-dominator; `None` marks the virtual exit.
    pub ipdom: Vec<Option<usize>>,
    /// (source, header) pairs where `header` dominates `source`.
    pub back_edges: Vec<(usize, usize)>,
}

impl Cfg {
    /// Partition `insns` (given as parallel offset/flow arrays) into basic
    /// blocks and compute the dominance structures.
    pub fn build(offsets: &[usize], flows: &[Flow], extra_leaders: &[usize]) -> Cfg {
        assert_eq!(offsets.len(), flows.len());
        if offsets.is_empty() {
            return Cfg {
                blocks: Vec::new(),
                block_at: AHashMap::new(),
                rpo: Vec::new(),
                idom: Vec::new(),
                ipdom: Vec::new(),
                back_edges: Vec::new(),
            };
        }

        let index_of: AHashMap<usize, usize> = offsets
            .iter()
            .enumerate()
            .map(|(i, &off)| (off, i))
            .collect();

        // leaders: first instruction, every target, everything after a
        // control transfer, and the extra offsets (tries, handlers)
        let mut leaders: AHashSet<usize> = AHashSet::new();
        leaders.insert(0);
        for (i, flow) in flows.iter().enumerate() {
            let mut mark_target = |off: usize, leaders: &mut AHashSet<usize>| {
                if let Some(&index) = index_of.get(&off) {
                    leaders.insert(index);
                }
            };
            match flow {
                Flow::Fall => {}
                Flow::Jump(t) | Flow::Branch(t) => {
                    mark_target(*t, &mut leaders);
                    if i + 1 < flows.len() {
                        leaders.insert(i + 1);
                    }
                }
                Flow::Switch { targets, .. } => {
                    for t in targets {
                        mark_target(*t, &mut leaders);
                    }
                    if i + 1 < flows.len() {
                        leaders.insert(i + 1);
                    }
                }
                Flow::Halt => {
                    if i + 1 < flows.len() {
                        leaders.insert(i + 1);
                    }
                }
            }
        }
        for off in extra_leaders {
            if let Some(&index) = index_of.get(off) {
                leaders.insert(index);
            }
        }

        let mut starts: Vec<usize> = leaders.into_iter().collect();
        starts.sort_unstable();

        let mut blocks: Vec<Block> = Vec::with_capacity(starts.len());
        let mut block_of_insn = vec![0usize; offsets.len()];
        for (b, window) in starts.windows(2).enumerate() {
            blocks.push(Block {
                lo: window[0],
                hi: window[1],
                succs: Vec::new(),
                preds: Vec::new(),
            });
            for insn in window[0]..window[1] {
                block_of_insn[insn] = b;
            }
        }
        let last_start = *starts.last().unwrap();
        blocks.push(Block {
            lo: last_start,
            hi: offsets.len(),
            succs: Vec::new(),
            preds: Vec::new(),
        });
        for insn in last_start..offsets.len() {
            block_of_insn[insn] = blocks.len() - 1;
        }

        let block_at: AHashMap<usize, usize> = blocks
            .iter()
            .enumerate()
            .map(|(b, block)| (offsets[block.lo], b))
            .collect();

        // successor edges from each block's final instruction
        for b in 0..blocks.len() {
            let last = blocks[b].hi - 1;
            let mut succs = Vec::new();
            let target_block =
                |off: usize| index_of.get(&off).map(|&index| block_of_insn[index]);
            match &flows[last] {
                Flow::Fall => {
                    if blocks[b].hi < offsets.len() {
                        succs.push(block_of_insn[blocks[b].hi]);
                    }
                }
                Flow::Jump(t) => succs.extend(target_block(*t)),
                Flow::Branch(t) => {
                    if blocks[b].hi < offsets.len() {
                        succs.push(block_of_insn[blocks[b].hi]);
                    }
                    succs.extend(target_block(*t));
                }
                Flow::Switch { targets, fall } => {
                    if *fall && blocks[b].hi < offsets.len() {
                        succs.push(block_of_insn[blocks[b].hi]);
                    }
                    for t in targets {
                        succs.extend(target_block(*t));
                    }
                }
                Flow::Halt => {}
            }
            succs.dedup();
            blocks[b].succs = succs;
        }
        for b in 0..blocks.len() {
            for s in blocks[b].succs.clone() {
                if !blocks[s].preds.contains(&b) {
                    blocks[s].preds.push(b);
                }
            }
        }

        let rpo = reverse_post_order(&blocks, 0);
        let idom = dominators(&blocks, &rpo);
        let ipdom = post_dominators(&blocks);

        let mut back_edges = Vec::new();
        for (b, block) in blocks.iter().enumerate() {
            for &s in &block.succs {
                if dominates_with(&idom, &rpo, s, b) {
                    back_edges.push((b, s));
                }
            }
        }

        Cfg {
            blocks,
            block_at,
            rpo,
            idom,
            ipdom,
            back_edges,
        }
    }

    /// True when `a` dominates `b`.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        dominates_with(&self.idom, &self.rpo, a, b)
    }

    /// True when `header` is the target of at least one back edge.
    pub fn is_loop_header(&self, header: usize) -> bool {
        self.back_edges.iter().any(|&(_, h)| h == header)
    }

    /// Body of the natural loop of `header`: every block that can reach a
    /// back-edge source without passing through the header.
    pub fn natural_loop(&self, header: usize) -> AHashSet<usize> {
        let mut body: AHashSet<usize> = AHashSet::new();
        body.insert(header);
        let mut stack: Vec<usize> = self
            .back_edges
            .iter()
            .filter(|&&(_, h)| h == header)
            .map(|&(src, _)| src)
            .collect();
        while let Some(b) = stack.pop() {
            if body.insert(b) {
                stack.extend(self.blocks[b].preds.iter().copied());
            }
        }
        body
    }
}

fn reverse_post_order(blocks: &[Block], entry: usize) -> Vec<usize> {
    let mut visited = vec![false; blocks.len()];
    let mut order = Vec::with_capacity(blocks.len());
    // iterative DFS with an explicit phase marker
    let mut stack = vec![(entry, 0usize)];
    visited[entry] = true;
    while let Some(&(b, i)) = stack.last() {
        if i < blocks[b].succs.len() {
            stack.last_mut().unwrap().1 += 1;
            let s = blocks[b].succs[i];
            if !visited[s] {
                visited[s] = true;
                stack.push((s, 0));
            }
        } else {
            order.push(b);
            stack.pop();
        }
    }
    order.reverse();
    order
}

/// Iterative dominator computation over the reverse post-order.
fn dominators(blocks: &[Block], rpo: &[usize]) -> Vec<usize> {
    let mut rpo_index = vec![usize::MAX; blocks.len()];
    for (i, &b) in rpo.iter().enumerate() {
        rpo_index[b] = i;
    }

    let mut idom = vec![usize::MAX; blocks.len()];
    if rpo.is_empty() {
        return idom;
    }
    idom[rpo[0]] = rpo[0];

    let intersect = |idom: &[usize], mut a: usize, mut b: usize| {
        while a != b {
            while rpo_index[a] > rpo_index[b] {
                a = idom[a];
            }
            while rpo_index[b] > rpo_index[a] {
                b = idom[b];
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let mut new_idom = usize::MAX;
            for &p in &blocks[b].preds {
                if idom[p] == usize::MAX {
                    continue;
                }
                new_idom = if new_idom == usize::MAX {
                    p
                } else {
                    intersect(&idom, new_idom, p)
                };
            }
            if new_idom != usize::MAX && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }

    // unreachable blocks dominate themselves so lookups terminate
    for b in 0..blocks.len() {
        if idom[b] == usize::MAX {
            idom[b] = b;
        }
    }
    idom
}

/// Post-dominators against a virtual exit joining every halt block.
fn post_dominators(blocks: &[Block]) -> Vec<Option<usize>> {
    let n = blocks.len();
    if n == 0 {
        return Vec::new();
    }
    let exit = n; // virtual

    // reversed graph: preds become succs, halts hang off the virtual exit
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
    for (b, block) in blocks.iter().enumerate() {
        if block.succs.is_empty() {
            succs[exit].push(b);
            preds[b].push(exit);
        }
        for &s in &block.succs {
            succs[s].push(b);
            preds[b].push(s);
        }
    }

    let virtual_blocks: Vec<Block> = succs
        .iter()
        .zip(&preds)
        .map(|(s, p)| Block {
            lo: 0,
            hi: 0,
            succs: s.clone(),
            preds: p.clone(),
        })
        .collect();

    let rpo = reverse_post_order(&virtual_blocks, exit);
    let idom = dominators(&virtual_blocks, &rpo);

    (0..n)
        .map(|b| {
            if idom[b] == exit || idom[b] == b {
                None
            } else {
                Some(idom[b])
            }
        })
        .collect()
}

fn dominates_with(idom: &[usize], _rpo: &[usize], a: usize, b: usize) -> bool {
    let mut cur = b;
    loop {
        if cur == a {
            return true;
        }
        let next = idom[cur];
        if next == cur {
            return cur == a;
        }
        cur = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// diamond: 0 -> {1, 2} -> 3
    fn diamond() -> Cfg {
        let offsets = [0, 1, 2, 3];
        let flows = [
            Flow::Branch(2),
            Flow::Jump(3),
            Flow::Fall,
            Flow::Halt,
        ];
        Cfg::build(&offsets, &flows, &[])
    }

    #[test]
    fn diamond_blocks_and_edges() {
        let cfg = diamond();
        assert_eq!(cfg.blocks.len(), 4);
        assert_eq!(cfg.blocks[0].succs, [1, 2]);
        assert_eq!(cfg.blocks[1].succs, [3]);
        assert_eq!(cfg.blocks[2].succs, [3]);
        assert_eq!(cfg.blocks[3].preds.len(), 2);
    }

    #[test]
    fn diamond_dominance() {
        let cfg = diamond();
        assert!(cfg.dominates(0, 3));
        assert!(!cfg.dominates(1, 3));
        assert_eq!(cfg.idom[3], 0);
        // both arms post-dominated by the join
        assert_eq!(cfg.ipdom[1], Some(3));
        assert_eq!(cfg.ipdom[2], Some(3));
        assert_eq!(cfg.ipdom[0], Some(3));
    }

    #[test]
    fn simple_loop_back_edge() {
        // 0: fall, 1: branch 3 (exit), 2: jump 1, 3: halt
        let offsets = [0, 1, 2, 3];
        let flows = [
            Flow::Fall,
            Flow::Branch(3),
            Flow::Jump(1),
            Flow::Halt,
        ];
        let cfg = Cfg::build(&offsets, &flows, &[]);
        assert_eq!(cfg.back_edges, [(2, 1)]);
        assert!(cfg.is_loop_header(1));
        let body = cfg.natural_loop(1);
        assert!(body.contains(&1) && body.contains(&2));
        assert!(!body.contains(&3));
    }

    #[test]
    fn handler_leaders_split_blocks() {
        let offsets = [0, 1, 2];
        let flows = [Flow::Fall, Flow::Fall, Flow::Halt];
        let cfg = Cfg::build(&offsets, &flows, &[1]);
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.block_at[&1], 1);
    }
}
