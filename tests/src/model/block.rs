use eerec_core::{BlockPhase, CodeBlock, JumpCache, BLOCK_HASH_SIZE, JMP_CACHE_SIZE};

#[test]
fn test_phase_cycle() {
    let mut phase = BlockPhase::Scanning;
    for _ in 0..3 {
        phase.advance(BlockPhase::Emitting);
        phase.advance(BlockPhase::Scanning);
    }
    phase.advance(BlockPhase::Emitting);
    phase.advance(BlockPhase::Linking);
    phase.advance(BlockPhase::Sealed);
    assert_eq!(phase, BlockPhase::Sealed);
}

#[test]
#[should_panic(expected = "invalid block phase transition")]
fn test_phase_cannot_skip_linking() {
    let mut phase = BlockPhase::Emitting;
    phase.advance(BlockPhase::Sealed);
}

#[test]
#[should_panic(expected = "invalid block phase transition")]
fn test_sealed_is_final() {
    let mut phase = BlockPhase::Linking;
    phase.advance(BlockPhase::Sealed);
    phase.advance(BlockPhase::Scanning);
}

#[test]
fn test_block_contains() {
    let mut b = CodeBlock::new(0x1000);
    assert!(!b.contains(0x1000));
    b.size = 8;
    assert!(b.contains(0x1000));
    assert!(b.contains(0x1004));
    assert!(!b.contains(0x1008));
    assert!(!b.contains(0x0ffc));
    assert_eq!(b.phase, BlockPhase::Scanning);
}

#[test]
fn test_hash_in_range() {
    for pc in (0..0x4_0000u32).step_by(4).chain([u32::MAX - 3]) {
        assert!(CodeBlock::hash(pc) < BLOCK_HASH_SIZE);
    }
    assert_eq!(CodeBlock::hash(0x1234), CodeBlock::hash(0x1234));
    assert_ne!(CodeBlock::hash(0x1000), CodeBlock::hash(0x1004));
}

#[test]
fn test_jump_cache() {
    let mut jc = JumpCache::new();
    assert_eq!(jc.lookup(0x1000), None);
    jc.insert(0x1000, 7);
    assert_eq!(jc.lookup(0x1000), Some(7));

    // Direct-mapped: an aliasing PC shares the slot.
    let alias = 0x1000 + 4 * JMP_CACHE_SIZE as u32;
    assert_eq!(jc.lookup(alias), Some(7));
    jc.insert(alias, 9);
    assert_eq!(jc.lookup(0x1000), Some(9));

    jc.remove(0x1000);
    assert_eq!(jc.lookup(alias), None);

    jc.insert(0x2000, 1);
    jc.insert(0x3000, 2);
    jc.invalidate();
    assert_eq!(jc.lookup(0x2000), None);
    assert_eq!(jc.lookup(0x3000), None);
}
