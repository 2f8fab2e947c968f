// ABOUTME: Long-message segmentation with the 6-byte concatenation header (05 00 03 group count index)
// ABOUTME: Also reassembles inbound fragments so the gateway can log complete messages

use crate::datatypes::MsgFormat;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Length of the concatenation user data header
pub const UDH_LEN: usize = 6;

/// Highest fragment count the one-byte header field can express
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

const UDH_PREFIX: [u8; 3] = [0x05, 0x00, 0x03];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("content needs {needed} fragments, at most {max} are possible")]
    TooManyFragments { needed: usize, max: usize },
}

/// Concatenation header of one fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcatHeader {
    pub group_id: u8,
    pub count: u8,
    /// 1-based
    pub index: u8,
}

impl ConcatHeader {
    pub fn to_bytes(&self) -> [u8; UDH_LEN] {
        [
            UDH_PREFIX[0],
            UDH_PREFIX[1],
            UDH_PREFIX[2],
            self.group_id,
            self.count,
            self.index,
        ]
    }

    /// Split a fragment into its header and body, if it starts with one
    pub fn parse(content: &[u8]) -> Option<(ConcatHeader, &[u8])> {
        if content.len() < UDH_LEN || content[..3] != UDH_PREFIX {
            return None;
        }
        let header = ConcatHeader {
            group_id: content[3],
            count: content[4],
            index: content[5],
        };
        Some((header, &content[UDH_LEN..]))
    }
}

/// Group ID for a new logical message, taken from the clock
pub fn group_id_now() -> u8 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u8)
        .unwrap_or(0)
}

/// Number of physical messages needed for `len` content bytes
pub fn fragment_count(format: MsgFormat, len: usize) -> usize {
    let cap = format.fragment_cap();
    if len <= cap {
        1
    } else {
        len.div_ceil(cap - UDH_LEN)
    }
}

/// Split content into protocol-sized fragments with a clock-derived group ID
pub fn fragment(format: MsgFormat, content: &[u8]) -> Result<Vec<Bytes>, FragmentError> {
    fragment_with_group(format, content, group_id_now())
}

/// Split content into protocol-sized fragments.
///
/// Content that fits the format's cap comes back unchanged as a single
/// fragment. Otherwise every fragment is `header ++ chunk` where chunks are
/// `cap - 6` bytes and the last one holds the remainder.
pub fn fragment_with_group(
    format: MsgFormat,
    content: &[u8],
    group_id: u8,
) -> Result<Vec<Bytes>, FragmentError> {
    let cap = format.fragment_cap();
    if content.len() <= cap {
        return Ok(vec![Bytes::copy_from_slice(content)]);
    }

    let count = fragment_count(format, content.len());
    if count > MAX_FRAGMENTS {
        return Err(FragmentError::TooManyFragments {
            needed: count,
            max: MAX_FRAGMENTS,
        });
    }

    let fragments = content
        .chunks(cap - UDH_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let header = ConcatHeader {
                group_id,
                count: count as u8,
                index: (i + 1) as u8,
            };
            let mut buf = BytesMut::with_capacity(UDH_LEN + chunk.len());
            buf.put_slice(&header.to_bytes());
            buf.put_slice(chunk);
            buf.freeze()
        })
        .collect();

    Ok(fragments)
}

struct PendingGroup {
    parts: Vec<Option<Bytes>>,
    received: usize,
    started: Instant,
}

/// Collects fragments of concatenated messages until every part arrived.
///
/// Groups are keyed by origin plus group ID and count; a group that stays
/// incomplete for longer than `ttl` is dropped on the next push.
pub struct Reassembler {
    pending: HashMap<(String, u8, u8), PendingGroup>,
    ttl: Duration,
}

impl Reassembler {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
        }
    }

    /// Add one fragment; returns the joined body once the group is complete
    pub fn push(&mut self, origin: &str, header: ConcatHeader, body: &[u8]) -> Option<Vec<u8>> {
        if header.index == 0 || header.index > header.count {
            return None;
        }

        let now = Instant::now();
        let ttl = self.ttl;
        self.pending
            .retain(|_, group| now.duration_since(group.started) < ttl);

        let key = (origin.to_string(), header.group_id, header.count);
        let group = self.pending.entry(key.clone()).or_insert_with(|| PendingGroup {
            parts: vec![None; header.count as usize],
            received: 0,
            started: now,
        });

        let slot = &mut group.parts[header.index as usize - 1];
        if slot.is_none() {
            group.received += 1;
        }
        *slot = Some(Bytes::copy_from_slice(body));

        if group.received < group.parts.len() {
            return None;
        }

        let group = self.pending.remove(&key)?;
        Some(group.parts.into_iter().flatten().flatten().collect())
    }

    /// Number of incomplete groups held
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
