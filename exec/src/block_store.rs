use std::collections::HashMap;

use eerec_backend::{CodeBuffer, HostCodeGen};
use eerec_core::{BlockPhase, CodeBlock, BLOCK_HASH_SIZE};

/// Compiled blocks, their hash index and the jumps still waiting for a
/// target to be compiled.
///
/// Blocks are never removed individually; invalidation marks them dead
/// and unlinks them, and `flush` drops everything at once. Indices are
/// therefore stable until the next flush.
pub struct BlockStore {
    blocks: Vec<CodeBlock>,
    hash: Vec<Option<usize>>,
    /// `(source block, exit slot)` per target PC, in recording order.
    pending: HashMap<u32, Vec<(usize, usize)>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            hash: vec![None; BLOCK_HASH_SIZE],
            pending: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, idx: usize) -> &CodeBlock {
        &self.blocks[idx]
    }

    /// Sealed, valid block starting at `pc`.
    pub fn lookup(&self, pc: u32) -> Option<usize> {
        let mut cur = self.hash[CodeBlock::hash(pc)];
        while let Some(idx) = cur {
            let b = &self.blocks[idx];
            if !b.invalid && b.pc == pc && b.phase == BlockPhase::Sealed {
                return Some(idx);
            }
            cur = b.hash_next;
        }
        None
    }

    /// Add a freshly compiled block (prepended to its hash bucket). It
    /// stays invisible to `lookup` until sealed.
    pub fn insert(&mut self, mut block: CodeBlock) -> usize {
        assert_eq!(block.phase, BlockPhase::Linking, "only compiled blocks are stored");
        let idx = self.blocks.len();
        let bucket = CodeBlock::hash(block.pc);
        block.hash_next = self.hash[bucket];
        self.hash[bucket] = Some(idx);
        self.blocks.push(block);
        idx
    }

    /// Resolve the block's own exits, make it visible, then link every
    /// jump that was waiting for its PC.
    pub fn seal<B: HostCodeGen>(&mut self, idx: usize, buf: &mut CodeBuffer, backend: &B) {
        for slot in 0..self.blocks[idx].exits.len() {
            let target = self.blocks[idx].exits[slot].fixup.target;
            match self.lookup(target) {
                Some(dst) => self.link(idx, slot, dst, buf, backend),
                None => self.pending.entry(target).or_default().push((idx, slot)),
            }
        }
        self.blocks[idx].phase.advance(BlockPhase::Sealed);

        let pc = self.blocks[idx].pc;
        if let Some(waiting) = self.pending.remove(&pc) {
            for (src, slot) in waiting {
                self.link(src, slot, idx, buf, backend);
            }
        }
    }

    fn link<B: HostCodeGen>(
        &mut self,
        src: usize,
        slot: usize,
        dst: usize,
        buf: &mut CodeBuffer,
        backend: &B,
    ) {
        let jump = self.blocks[src].exits[slot].fixup.jump;
        backend.patch_jump(buf, jump, self.blocks[dst].host_offset);
        self.blocks[src].exits[slot].dest = Some(dst);
        self.blocks[dst].incoming.push((src, slot));
    }

    /// Mark a block dead: jumps into it fall back to their stubs and are
    /// queued again, its own links and pending entries are dropped, and
    /// it leaves the hash chain.
    pub fn invalidate<B: HostCodeGen>(&mut self, idx: usize, buf: &mut CodeBuffer, backend: &B) {
        if self.blocks[idx].invalid {
            return;
        }
        self.blocks[idx].invalid = true;

        for (src, slot) in std::mem::take(&mut self.blocks[idx].incoming) {
            let fixup = self.blocks[src].exits[slot].fixup;
            backend.patch_jump(buf, fixup.jump, fixup.stub);
            self.blocks[src].exits[slot].dest = None;
            if src != idx {
                self.pending.entry(fixup.target).or_default().push((src, slot));
            }
        }

        for slot in 0..self.blocks[idx].exits.len() {
            let exit = self.blocks[idx].exits[slot];
            match exit.dest {
                Some(dst) => self.blocks[dst].incoming.retain(|&e| e != (idx, slot)),
                None => {
                    if let Some(list) = self.pending.get_mut(&exit.fixup.target) {
                        list.retain(|&(s, _)| s != idx);
                    }
                }
            }
            self.blocks[idx].exits[slot].dest = None;
        }

        let bucket = CodeBlock::hash(self.blocks[idx].pc);
        let next = self.blocks[idx].hash_next.take();
        let mut prev: Option<usize> = None;
        let mut cur = self.hash[bucket];
        while let Some(i) = cur {
            if i == idx {
                match prev {
                    Some(p) => self.blocks[p].hash_next = next,
                    None => self.hash[bucket] = next,
                }
                return;
            }
            prev = cur;
            cur = self.blocks[i].hash_next;
        }
    }

    /// Valid blocks whose guest range covers `addr`.
    pub fn blocks_containing(&self, addr: u32) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.invalid && b.contains(addr))
            .map(|(i, _)| i)
            .collect()
    }

    /// Jumps still waiting for a block at `target`.
    pub fn pending_for(&self, target: u32) -> &[(usize, usize)] {
        self.pending.get(&target).map_or(&[], |v| v.as_slice())
    }

    /// Every exit of every valid block is either linked to a valid block
    /// or queued on its target.
    pub fn fixups_accounted(&self) -> bool {
        self.blocks.iter().enumerate().filter(|(_, b)| !b.invalid).all(|(i, b)| {
            b.exits.iter().enumerate().all(|(slot, e)| match e.dest {
                Some(dst) => {
                    !self.blocks[dst].invalid && self.blocks[dst].incoming.contains(&(i, slot))
                }
                None => self.pending_for(e.fixup.target).contains(&(i, slot)),
            })
        })
    }

    /// Forget every block and pending jump.
    pub fn flush(&mut self) {
        self.blocks.clear();
        self.hash.fill(None);
        self.pending.clear();
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}
