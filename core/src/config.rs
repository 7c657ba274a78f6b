use crate::error::{Error, Result};

/// Recompiler tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecConfig {
    /// Bytes of executable memory reserved for generated code.
    pub code_buffer_size: usize,
    /// Free space that must remain before a new block is compiled;
    /// below it the whole buffer is invalidated.
    pub headroom: usize,
    /// Upper bound on guest instructions per block.
    pub max_block_insns: u32,
    /// Allow compiling a branch's delay slot ahead of the branch when
    /// the two are independent.
    pub swap_delay_slots: bool,
    /// Track compile-time-known GPR values.
    pub const_folding: bool,
}

impl Default for RecConfig {
    fn default() -> Self {
        Self {
            code_buffer_size: 16 * 1024 * 1024,
            headroom: 64 * 1024,
            max_block_insns: 128,
            swap_delay_slots: true,
            const_folding: true,
        }
    }
}

impl RecConfig {
    /// Defaults overridden by `EEREC_CODE_BUFFER`, `EEREC_HEADROOM`,
    /// `EEREC_BLOCK_INSNS`, `EEREC_SWAP_DELAY` and `EEREC_CONST_FOLD`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = parse_env::<usize>("EEREC_CODE_BUFFER")? {
            cfg.code_buffer_size = v;
        }
        if let Some(v) = parse_env::<usize>("EEREC_HEADROOM")? {
            cfg.headroom = v;
        }
        if let Some(v) = parse_env::<u32>("EEREC_BLOCK_INSNS")? {
            cfg.max_block_insns = v;
        }
        if let Some(v) = parse_env_bool("EEREC_SWAP_DELAY")? {
            cfg.swap_delay_slots = v;
        }
        if let Some(v) = parse_env_bool("EEREC_CONST_FOLD")? {
            cfg.const_folding = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_block_insns == 0 {
            return Err(Error::Config("max_block_insns must be non-zero".into()));
        }
        if self.headroom < MIN_HEADROOM_PER_INSN * self.max_block_insns as usize {
            return Err(Error::Config(format!(
                "headroom {:#x} too small for {} instructions per block",
                self.headroom, self.max_block_insns
            )));
        }
        if self.code_buffer_size < self.headroom * 2 {
            return Err(Error::Config(format!(
                "code buffer {:#x} smaller than twice the headroom {:#x}",
                self.code_buffer_size, self.headroom
            )));
        }
        Ok(())
    }
}

/// Worst-case host bytes for one guest instruction, including a
/// duplicated delay slot and the flushes around helper calls.
pub const MIN_HEADROOM_PER_INSN: usize = 384;

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => {
            let raw = raw.trim();
            let parsed = match raw.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16)
                    .ok()
                    .and_then(|v| v.to_string().parse().ok()),
                None => raw.parse().ok(),
            };
            parsed
                .map(Some)
                .ok_or_else(|| Error::Config(format!("{key}={raw} is not a valid number")))
        }
        Err(_) => Ok(None),
    }
}

fn parse_env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim() {
            "1" | "true" | "on" => Ok(Some(true)),
            "0" | "false" | "off" => Ok(Some(false)),
            other => Err(Error::Config(format!("{key}={other} is not a boolean"))),
        },
        Err(_) => Ok(None),
    }
}
