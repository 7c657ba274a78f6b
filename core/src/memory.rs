use crate::error::{Error, Result};
use crate::types::Width;

/// Direct host mapping of guest memory: a guest address `a` lives at
/// `base + (a & mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostWindow {
    pub base: *mut u8,
    pub mask: u32,
}

/// Guest memory as seen by the recompiler.
///
/// Values are little-endian and passed in the low bits of a `u128`.
/// Implementations own their translation and fault policy.
pub trait GuestMemory {
    fn read(&mut self, width: Width, addr: u32) -> u128;

    fn write(&mut self, width: Width, addr: u32, value: u128);

    /// A flat mapping generated code may access inline. Returning `None`
    /// routes every compiled access through the runtime helpers.
    fn host_window(&mut self) -> Option<HostWindow> {
        None
    }

    fn read_u32(&mut self, addr: u32) -> u32 {
        self.read(Width::B32, addr) as u32
    }
}

/// Slack past the end of the image so an inline access at the last
/// masked address never leaves the allocation.
const TAIL_SLACK: usize = 16;

/// Flat little-endian RAM image whose size is a power of two. Addresses
/// wrap at the image size.
pub struct FlatMemory {
    bytes: Box<[u8]>,
    mask: u32,
}

impl FlatMemory {
    pub fn new(size: usize) -> Result<Self> {
        if !size.is_power_of_two() || size < 16 || size > 1 << 32 {
            return Err(Error::MemorySize(size));
        }
        Ok(Self {
            bytes: vec![0u8; size + TAIL_SLACK].into_boxed_slice(),
            mask: (size - 1) as u32,
        })
    }

    pub fn len(&self) -> usize {
        self.mask as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// Copy `data` into memory starting at `addr`.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            let a = (addr.wrapping_add(i as u32) & self.mask) as usize;
            self.bytes[a] = *b;
        }
    }

    /// Store guest instruction words starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            self.write(Width::B32, addr.wrapping_add(4 * i as u32), *w as u128);
        }
    }
}

impl GuestMemory for FlatMemory {
    fn read(&mut self, width: Width, addr: u32) -> u128 {
        let mut v = 0u128;
        for i in 0..width.size_bytes() {
            let a = (addr.wrapping_add(i) & self.mask) as usize;
            v |= (self.bytes[a] as u128) << (8 * i);
        }
        v
    }

    fn write(&mut self, width: Width, addr: u32, value: u128) {
        for i in 0..width.size_bytes() {
            let a = (addr.wrapping_add(i) & self.mask) as usize;
            self.bytes[a] = (value >> (8 * i)) as u8;
        }
    }

    fn host_window(&mut self) -> Option<HostWindow> {
        Some(HostWindow {
            base: self.bytes.as_mut_ptr(),
            mask: self.mask,
        })
    }
}
