/// A branch target inside the block being compiled.
///
/// Branches may reference a label before it is placed; each such use is
/// recorded and back-patched when the label is bound.
#[derive(Debug, Clone, Default)]
pub struct Label {
    /// Bound offset in the code buffer.
    pub value: Option<usize>,
    /// Forward references waiting for `value`.
    pub uses: Vec<LabelUse>,
}

/// A forward reference to a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelUse {
    /// Offset of the displacement field to patch.
    pub offset: usize,
    pub kind: RelocKind,
}

/// Relocation types for label back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// 32-bit displacement relative to the end of the field.
    Rel32,
}

/// Index of a label within one block compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forward reference to this label.
    pub fn add_use(&mut self, offset: usize, kind: RelocKind) {
        self.uses.push(LabelUse { offset, kind });
    }

    /// Mark this label as placed; returns the uses that now need
    /// patching.
    pub fn bind(&mut self, offset: usize) -> Vec<LabelUse> {
        assert!(self.value.is_none(), "label bound twice");
        self.value = Some(offset);
        std::mem::take(&mut self.uses)
    }

    /// Whether there are unresolved forward references.
    pub fn has_pending_uses(&self) -> bool {
        !self.uses.is_empty() && self.value.is_none()
    }
}
