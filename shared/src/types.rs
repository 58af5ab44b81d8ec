use std::fmt;

/// Size in bytes of one NTAG2xx page.
pub const BLOCK_SIZE: usize = 4;

/// First block available for payloads; 0-3 hold header, UID echo and lock bytes.
pub const USER_START_BLOCK: u8 = 4;

/// One page of tag memory.
pub type Block = [u8; BLOCK_SIZE];

/// Tag identifier as returned by detection (4 or 7 bytes in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uid(Vec<u8>);

impl Uid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex, the form shown to users and returned by the API.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Returns true when every byte of the block is zero.
pub fn is_zero_block(block: &[u8]) -> bool {
    block.iter().all(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_renders_uppercase_hex() {
        let uid = Uid::new(vec![0x04, 0xa2, 0x3b, 0xff]);
        assert_eq!(uid.to_hex(), "04A23BFF");
        assert_eq!(uid.to_string(), "04A23BFF");
        assert_eq!(uid.len(), 4);
    }

    #[test]
    fn zero_block_detection() {
        assert!(is_zero_block(&[0, 0, 0, 0]));
        assert!(!is_zero_block(&[0, 0, 1, 0]));
    }
}
