// ABOUTME: Sequence ID and message ID generators shared by the codec, fragmenter and server
// ABOUTME: Built once from configuration and passed by reference; no global state

use chrono::{Local, Timelike};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of 32-bit sequence IDs
pub trait SequenceGenerator: Send + Sync {
    fn next_val(&self) -> u32;
}

/// Source of 64-bit message IDs
pub trait MessageIdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Largest value handed out before the counter wraps back to 1
pub const CYCLE_MAX: u32 = 0x7FFF_FFFF;

/// Lock-free counter for frame sequence IDs; wraps and never yields 0
#[derive(Debug)]
pub struct CycleSequence {
    current: AtomicU32,
}

impl CycleSequence {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// The first value returned is `start + 1` (or 1 past the wrap point)
    pub fn starting_after(start: u32) -> Self {
        Self {
            current: AtomicU32::new(start),
        }
    }
}

impl Default for CycleSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator for CycleSequence {
    fn next_val(&self) -> u32 {
        let step = |current: u32| {
            if current >= CYCLE_MAX {
                Some(1)
            } else {
                Some(current + 1)
            }
        };
        match self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, step)
        {
            Ok(previous) | Err(previous) => step(previous).unwrap_or(1),
        }
    }
}

const SNOWFLAKE32_SEQUENCE_BITS: u32 = 9;
const SNOWFLAKE32_WORKER_BITS: u32 = 3;
const SNOWFLAKE32_DATACENTER_BITS: u32 = 2;
const SNOWFLAKE32_SEQUENCE_MASK: u32 = (1 << SNOWFLAKE32_SEQUENCE_BITS) - 1;
const SNOWFLAKE32_TIME_SHIFT: u32 =
    SNOWFLAKE32_SEQUENCE_BITS + SNOWFLAKE32_WORKER_BITS + SNOWFLAKE32_DATACENTER_BITS;

/// 32-bit ID: seconds since local midnight (17) | datacenter (2) | worker (3) | sequence (9).
///
/// Up to 512 IDs per second. Past that the generator moves on to the next
/// second ahead of the clock instead of waiting for it.
#[derive(Debug)]
pub struct Snowflake32 {
    datacenter_id: u32,
    worker_id: u32,
    state: Mutex<(u32, u32)>,
}

impl Snowflake32 {
    pub fn new(datacenter_id: u8, worker_id: u8) -> Self {
        Self {
            datacenter_id: u32::from(datacenter_id) & ((1 << SNOWFLAKE32_DATACENTER_BITS) - 1),
            worker_id: u32::from(worker_id) & ((1 << SNOWFLAKE32_WORKER_BITS) - 1),
            state: Mutex::new((u32::MAX, 0)),
        }
    }

    /// Seconds component of an ID produced by this generator
    pub fn seconds_of(id: u32) -> u32 {
        id >> SNOWFLAKE32_TIME_SHIFT
    }

    fn compose(&self, seconds: u32, sequence: u32) -> u32 {
        (seconds << SNOWFLAKE32_TIME_SHIFT)
            | (self.datacenter_id << (SNOWFLAKE32_SEQUENCE_BITS + SNOWFLAKE32_WORKER_BITS))
            | (self.worker_id << SNOWFLAKE32_SEQUENCE_BITS)
            | sequence
    }
}

fn seconds_of_day() -> u32 {
    Local::now().num_seconds_from_midnight()
}

/// How far behind the last issued second the clock may read before it is
/// taken as the midnight rollover
const SNOWFLAKE32_ROLLOVER_GAP: u32 = 3600;

impl Snowflake32 {
    fn next_at(&self, now: u32) -> u32 {
        let mut state = self.state.lock();
        let (last_second, sequence) = *state;

        let rolled_over = now < last_second && last_second - now > SNOWFLAKE32_ROLLOVER_GAP;
        let (second, next_sequence) = if now > last_second || rolled_over {
            (now, 0)
        } else {
            match (sequence + 1) & SNOWFLAKE32_SEQUENCE_MASK {
                0 => (last_second + 1, 0),
                next => (last_second, next),
            }
        };

        *state = (second, next_sequence);
        self.compose(second, next_sequence)
    }
}

impl SequenceGenerator for Snowflake32 {
    fn next_val(&self) -> u32 {
        self.next_at(seconds_of_day())
    }
}

/// 2020-01-01T00:00:00Z in milliseconds
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_577_836_800_000;

const SNOWFLAKE_SEQUENCE_BITS: u64 = 12;
const SNOWFLAKE_WORKER_BITS: u64 = 5;
const SNOWFLAKE_DATACENTER_BITS: u64 = 5;
const SNOWFLAKE_SEQUENCE_MASK: u64 = (1 << SNOWFLAKE_SEQUENCE_BITS) - 1;

/// 64-bit message ID: ms since epoch (41) | datacenter (5) | worker (5) | sequence (12)
#[derive(Debug)]
pub struct Snowflake {
    datacenter_id: u64,
    worker_id: u64,
    state: Mutex<(u64, u64)>,
}

impl Snowflake {
    pub fn new(datacenter_id: u8, worker_id: u8) -> Self {
        Self {
            datacenter_id: u64::from(datacenter_id) & ((1 << SNOWFLAKE_DATACENTER_BITS) - 1),
            worker_id: u64::from(worker_id) & ((1 << SNOWFLAKE_WORKER_BITS) - 1),
            state: Mutex::new((0, 0)),
        }
    }

    /// Split an ID into (timestamp ms since epoch, datacenter, worker, sequence)
    pub fn decompose(id: u64) -> (u64, u8, u8, u16) {
        let sequence = (id & SNOWFLAKE_SEQUENCE_MASK) as u16;
        let worker = ((id >> SNOWFLAKE_SEQUENCE_BITS) & ((1 << SNOWFLAKE_WORKER_BITS) - 1)) as u8;
        let datacenter = ((id >> (SNOWFLAKE_SEQUENCE_BITS + SNOWFLAKE_WORKER_BITS))
            & ((1 << SNOWFLAKE_DATACENTER_BITS) - 1)) as u8;
        let timestamp =
            id >> (SNOWFLAKE_SEQUENCE_BITS + SNOWFLAKE_WORKER_BITS + SNOWFLAKE_DATACENTER_BITS);
        (timestamp, datacenter, worker, sequence)
    }
}

fn millis_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(SNOWFLAKE_EPOCH_MS)
        .saturating_sub(SNOWFLAKE_EPOCH_MS)
}

impl MessageIdGenerator for Snowflake {
    fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        let (last_ms, sequence) = *state;
        // A clock that steps backwards keeps using the last timestamp
        let now = millis_since_epoch().max(last_ms);

        let (now, next_sequence) = if now == last_ms {
            match (sequence + 1) & SNOWFLAKE_SEQUENCE_MASK {
                // Sequence exhausted: borrow the next millisecond
                0 => (last_ms + 1, 0),
                next => (now, next),
            }
        } else {
            (now, 0)
        };

        *state = (now, next_sequence);
        (now << (SNOWFLAKE_SEQUENCE_BITS + SNOWFLAKE_WORKER_BITS + SNOWFLAKE_DATACENTER_BITS))
            | (self.datacenter_id << (SNOWFLAKE_SEQUENCE_BITS + SNOWFLAKE_WORKER_BITS))
            | (self.worker_id << SNOWFLAKE_SEQUENCE_BITS)
            | next_sequence
    }
}

/// Generator instances for one gateway process
#[derive(Debug)]
pub struct Sequences {
    /// Header sequence IDs of frames the gateway originates
    pub frames: CycleSequence,
    /// Msg_Id values returned in SubmitResp
    pub msg_ids: Snowflake,
    /// SMSC sequence numbers embedded in status reports
    pub reports: Snowflake32,
}

impl Sequences {
    pub fn new(datacenter_id: u8, worker_id: u8) -> Self {
        Self {
            frames: CycleSequence::new(),
            msg_ids: Snowflake::new(datacenter_id, worker_id),
            reports: Snowflake32::new(datacenter_id, worker_id),
        }
    }
}
