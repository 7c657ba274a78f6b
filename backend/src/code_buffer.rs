use std::io;
use std::ptr::{self, NonNull};

/// Executable memory for generated host code.
///
/// An append-only arena addressed by integer offsets. The only in-place
/// rewrites are the bounds-checked `patch_*` calls used to resolve
/// fixups. The mapping is either writable or executable, never both;
/// the dispatcher flips it around compilation.
pub struct CodeBuffer {
    base: NonNull<u8>,
    len: usize,
    cursor: usize,
}

// SAFETY: the mapping is owned exclusively and only reached through
// `&self`/`&mut self`.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Map `size` bytes, rounded up to whole pages.
    pub fn new(size: usize) -> io::Result<Self> {
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let len = size.max(1).next_multiple_of(page);

        // SAFETY: fresh anonymous mapping; nothing else aliases it.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(raw.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;
        Ok(Self { base, len, cursor: 0 })
    }

    /// Offset the next emitted byte lands at.
    #[inline]
    pub fn offset(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.len - self.cursor
    }

    /// `(used, capacity)` in bytes.
    #[inline]
    pub fn usage(&self) -> (usize, usize) {
        (self.cursor, self.len)
    }

    /// Host address of `offset`, for entering generated code.
    pub fn ptr_at(&self, offset: usize) -> *const u8 {
        assert!(offset <= self.len, "offset {offset:#x} past the code buffer");
        // SAFETY: in bounds of the mapping.
        unsafe { self.base.as_ptr().add(offset) }
    }

    /// Discard everything emitted after `offset`.
    pub fn reset_to(&mut self, offset: usize) {
        assert!(offset <= self.cursor, "reset_to may only move backwards");
        self.cursor = offset;
    }

    /// Append raw bytes. Exhaustion is a bug: callers reserve headroom
    /// before compiling.
    pub fn emit_bytes(&mut self, data: &[u8]) {
        let end = self.cursor + data.len();
        assert!(end <= self.len, "code buffer overflow");
        // SAFETY: `cursor..end` is inside the mapping and disjoint from `data`.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr().add(self.cursor), data.len());
        }
        self.cursor = end;
    }

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.emit_bytes(&[val]);
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.emit_bytes(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.emit_bytes(&val.to_le_bytes());
    }

    /// Overwrite four already-emitted bytes.
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        assert!(offset + 4 <= self.cursor, "patch outside emitted code");
        // SAFETY: checked against the emitted range.
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().write_unaligned(val.to_le()) };
    }

    /// Point the rel32 field at `field` to `target`.
    pub fn patch_rel32(&mut self, field: usize, target: usize) {
        let disp = i32::try_from(target as i64 - (field as i64 + 4))
            .unwrap_or_else(|_| panic!("rel32 from {field:#x} to {target:#x} out of range"));
        self.patch_u32(field, disp as u32);
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        let bytes = &self.as_slice()[offset..offset + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Absolute target of the rel32 field at `field`.
    pub fn rel32_target(&self, field: usize) -> usize {
        let disp = self.read_u32(field) as i32 as i64;
        (field as i64 + 4 + disp) as usize
    }

    /// Read + execute, no write.
    pub fn set_executable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_EXEC)
    }

    /// Read + write, no execute.
    pub fn set_writable(&self) -> io::Result<()> {
        self.protect(libc::PROT_READ | libc::PROT_WRITE)
    }

    fn protect(&self, prot: libc::c_int) -> io::Result<()> {
        // SAFETY: exactly the range returned by mmap.
        match unsafe { libc::mprotect(self.base.as_ptr().cast(), self.len, prot) } {
            0 => Ok(()),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Bytes emitted so far.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `0..cursor` has been written.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.cursor) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // SAFETY: unmapping our own mapping once.
        unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
    }
}
