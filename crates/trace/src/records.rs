//! Canonical trace record identifiers shared across the workspace.

/// Scheduler related record identifiers.
pub mod sched {
    /// A thread was switched in: payload `[next id, previous id]` (LE u32 each).
    pub const NEXT: u8 = 50;
    /// No thread is ready: payload `[previous id]`.
    pub const IDLE: u8 = 51;
    /// A thread yielded: payload `[id, target id]`.
    pub const YIELD: u8 = 52;
    /// The timer preempted a thread: payload `[id]`.
    pub const PREEMPT: u8 = 53;
    /// Every thread has reached a terminal state.
    pub const HALT: u8 = 54;
}

/// Thread lifecycle record identifiers.
pub mod thread {
    /// Thread created: payload `[id, parent id]`.
    pub const CREATE: u8 = 70;
    /// Thread finished normally: payload `[id, exit code]`.
    pub const FINISH: u8 = 71;
    /// Thread cancelled: payload `[id, cancelled by]`.
    pub const CANCEL: u8 = 72;
    /// Thread blocked: payload `[id, state code]`.
    pub const BLOCK: u8 = 73;
    /// Thread made ready again: payload `[id]`.
    pub const WAKE: u8 = 74;
    /// Signal handler entered: payload `[id, signal]`.
    pub const SIGNAL: u8 = 75;
    /// Table slot reclaimed: payload `[old id]`.
    pub const RECLAIM: u8 = 76;
}

/// Dictionary records binding ids to human readable names.
pub mod dict {
    /// Thread name dictionary: payload `[id (LE u32), name bytes..., 0]`.
    pub const THREAD: u8 = 61;
}

/// Builds a payload made of little-endian 32-bit words.
pub fn words(values: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Produces the payload for a [`dict::THREAD`] record.
pub fn thread_dict_payload(id: u32, name: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.len() + 5);
    bytes.extend_from_slice(&id.to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    bytes
}
