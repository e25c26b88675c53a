//! Wire-level constants shared by the decoder and encoder
//!
//! ```text
//! ┌─────┬──────────────────────────────────────────────────────┐
//! │ tag │ fields (big-endian)                                  │
//! ├─────┼──────────────────────────────────────────────────────┤
//! │   3 │ ADJUST_TIME          ts0 [ts1]                       │
//! │   8 │ RESET                -                               │
//! │  12 │ SET_CURRENT_THREAD   thread:u16                      │
//! │  13 │ NEW_THREAD           thread:u16 name:lstr class:lstr │
//! │  17 │ PROFILEPOINT_HIT     point:u16 ts thread:u16         │
//! │  21 │ METHOD_ENTRY_MONITOR ts monitor:i32 owner:i32        │
//! │  22 │ METHOD_EXIT_MONITOR  ts monitor:i32                  │
//! │  35 │ NEW_MONITOR          monitor:i32 class:lstr          │
//! └─────┴──────────────────────────────────────────────────────┘
//! ts    = 7-byte wall-clock stamp, plus a 7-byte CPU stamp in
//!         two-timestamp mode
//! lstr  = u16 byte length + bytes in the session charset
//! ```

/// Bytes in one encoded timestamp
pub const TIMESTAMP_BYTES: usize = 7;

/// Largest value a 7-byte timestamp can carry
pub const TIMESTAMP_MAX: u64 = (1 << (TIMESTAMP_BYTES * 8)) - 1;

/// Frame tags understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventTag {
    AdjustTime = 3,
    Reset = 8,
    SetCurrentThread = 12,
    NewThread = 13,
    ProfilePointHit = 17,
    MonitorEntry = 21,
    MonitorExit = 22,
    NewMonitor = 35,
}

impl EventTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            3 => Some(EventTag::AdjustTime),
            8 => Some(EventTag::Reset),
            12 => Some(EventTag::SetCurrentThread),
            13 => Some(EventTag::NewThread),
            17 => Some(EventTag::ProfilePointHit),
            21 => Some(EventTag::MonitorEntry),
            22 => Some(EventTag::MonitorExit),
            35 => Some(EventTag::NewMonitor),
            _ => None,
        }
    }

    /// Name used in log and error messages
    pub fn name(self) -> &'static str {
        match self {
            EventTag::AdjustTime => "ADJUST_TIME",
            EventTag::Reset => "RESET",
            EventTag::SetCurrentThread => "SET_CURRENT_THREAD",
            EventTag::NewThread => "NEW_THREAD",
            EventTag::ProfilePointHit => "PROFILEPOINT_HIT",
            EventTag::MonitorEntry => "METHOD_ENTRY_MONITOR",
            EventTag::MonitorExit => "METHOD_EXIT_MONITOR",
            EventTag::NewMonitor => "NEW_MONITOR",
        }
    }
}

/// One event timestamp: wall clock, plus CPU time in two-timestamp mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamps {
    pub wall: u64,
    pub cpu: Option<u64>,
}

impl Timestamps {
    pub fn wall(wall: u64) -> Self {
        Self { wall, cpu: None }
    }

    pub fn with_cpu(wall: u64, cpu: u64) -> Self {
        Self {
            wall,
            cpu: Some(cpu),
        }
    }
}
