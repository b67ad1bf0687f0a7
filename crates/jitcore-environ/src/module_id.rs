use std::fmt;

/// Content hash of a Wasm module's bytes, used as the key into the code
/// catalog and the external cache.
///
/// Equality and hashing are byte-wise; `ModuleId` carries no notion of
/// "which hash function produced this" — that is the embedder's concern.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId([u8; 32]);

impl ModuleId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        ModuleId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleId(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("..)")
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_byte_wise() {
        let a = ModuleId::from_bytes([1; 32]);
        let b = ModuleId::from_bytes([1; 32]);
        let c = ModuleId::from_bytes([2; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_is_hex() {
        let id = ModuleId::from_bytes([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
    }
}
