//! Reading index counters

/// Modulus used by the camera path, which cycles its index through 0..=99
pub const CAMERA_INDEX_MODULUS: u64 = 100;

/// Index assigned to each emitted reading
///
/// Starts at 0 and advances once per emitted reading. A wrapping counter
/// returns to 0 when it reaches its modulus, so it never reports the modulus
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCounter {
    current: u64,
    modulus: Option<u64>,
}

impl IndexCounter {
    /// Counter growing for the lifetime of the session
    pub fn unbounded() -> Self {
        Self {
            current: 0,
            modulus: None,
        }
    }

    /// Counter cycling through `0..modulus`
    ///
    /// A modulus of 0 would never produce a valid index and is treated as
    /// unbounded.
    pub fn wrapping(modulus: u64) -> Self {
        Self {
            current: 0,
            modulus: (modulus > 0).then_some(modulus),
        }
    }

    /// Index for the next emitted reading
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Move past the current index
    pub fn advance(&mut self) {
        let next = self.current.wrapping_add(1);
        self.current = match self.modulus {
            Some(modulus) if next >= modulus => 0,
            _ => next,
        };
    }
}

impl Default for IndexCounter {
    fn default() -> Self {
        Self::unbounded()
    }
}
