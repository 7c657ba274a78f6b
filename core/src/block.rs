/// Compilation lifecycle of a block.
///
/// Transitions are strictly forward; anything else is a compiler bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockPhase {
    /// Decoding the instruction at the cursor (and its delay slot).
    Scanning,
    /// Lowering decoded instructions to host code.
    Emitting,
    /// Resolving or queueing the block's outgoing fixups.
    Linking,
    /// Immutable; dispatch may enter it.
    Sealed,
}

impl BlockPhase {
    /// Move to `next`, panicking on a backwards or skipped step. The
    /// compiler alternates between `Scanning` and `Emitting` once per
    /// guest instruction.
    pub fn advance(&mut self, next: BlockPhase) {
        let ok = matches!(
            (*self, next),
            (BlockPhase::Scanning, BlockPhase::Emitting)
                | (BlockPhase::Emitting, BlockPhase::Scanning)
                | (BlockPhase::Emitting, BlockPhase::Linking)
                | (BlockPhase::Linking, BlockPhase::Sealed)
        );
        assert!(ok, "invalid block phase transition {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// A patchable direct jump to another block.
///
/// `jump` is the offset of a 5-byte `jmp rel32`; until linked it lands
/// on `stub`, which stores `target` into the guest PC and returns to the
/// dispatcher. Linking rewrites the displacement; unlinking restores the
/// stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    pub jump: usize,
    pub stub: usize,
    pub target: u32,
}

/// An outgoing edge of a sealed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExit {
    pub fixup: Fixup,
    /// Index of the block the jump currently lands in, if linked.
    pub dest: Option<usize>,
}

/// A compiled guest code block.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    /// Guest PC where this block starts.
    pub pc: u32,
    /// Guest bytes covered, including a trailing delay slot.
    pub size: u32,
    /// Guest instructions compiled (delay slots counted once).
    pub icount: u32,

    /// Offset into the code buffer where host code starts.
    pub host_offset: usize,
    /// Size of generated host code in bytes.
    pub host_size: usize,

    pub phase: BlockPhase,
    pub exits: Vec<BlockExit>,
    /// `(source block, exit slot)` pairs whose jumps land here.
    pub incoming: Vec<(usize, usize)>,

    /// Index of the next block in the same hash bucket, or `None`.
    pub hash_next: Option<usize>,
    pub invalid: bool,
}

impl CodeBlock {
    pub fn new(pc: u32) -> Self {
        Self {
            pc,
            size: 0,
            icount: 0,
            host_offset: 0,
            host_size: 0,
            phase: BlockPhase::Scanning,
            exits: Vec::new(),
            incoming: Vec::new(),
            hash_next: None,
            invalid: false,
        }
    }

    /// Hash bucket index for a guest PC.
    pub fn hash(pc: u32) -> usize {
        let h = (pc as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        ((h >> 32) as usize) & (BLOCK_HASH_SIZE - 1)
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr.wrapping_sub(self.pc) < self.size
    }
}

/// Number of buckets in the block hash table.
pub const BLOCK_HASH_SIZE: usize = 1 << 15;

/// Number of entries in the jump cache.
pub const JMP_CACHE_SIZE: usize = 1 << 12;

/// Direct-mapped PC → block cache in front of the hash table.
pub struct JumpCache {
    entries: Box<[Option<usize>; JMP_CACHE_SIZE]>,
}

impl JumpCache {
    pub fn new() -> Self {
        Self {
            entries: Box::new([None; JMP_CACHE_SIZE]),
        }
    }

    fn index(pc: u32) -> usize {
        (pc as usize >> 2) & (JMP_CACHE_SIZE - 1)
    }

    pub fn lookup(&self, pc: u32) -> Option<usize> {
        self.entries[Self::index(pc)]
    }

    pub fn insert(&mut self, pc: u32, idx: usize) {
        self.entries[Self::index(pc)] = Some(idx);
    }

    pub fn remove(&mut self, pc: u32) {
        self.entries[Self::index(pc)] = None;
    }

    pub fn invalidate(&mut self) {
        self.entries.fill(None);
    }
}

impl Default for JumpCache {
    fn default() -> Self {
        Self::new()
    }
}
