// ABOUTME: Status report body carried inside a Deliver with registered_delivery = 1
// ABOUTME: Fixed 60-byte layout correlating a final delivery state to a submitted Msg_Id

use crate::codec::{CodecError, decode_fixed_str, decode_u32, decode_u64, encode_fixed_str};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::io::Cursor;

const STAT_LEN: usize = 7;
const TIME_LEN: usize = 10;
const DEST_TERMINAL_ID_LEN: usize = 21;

/// Final delivery state of a submitted message
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReportStat {
    /// DELIVRD
    Delivered,
    /// EXPIRED
    Expired,
    /// DELETED
    Deleted,
    /// UNDELIV
    Undeliverable,
    /// ACCEPTD
    Accepted,
    /// UNKNOWN
    Unknown,
    /// REJECTD
    Rejected,
    /// MA:0000
    MaError,
    /// MB:0000
    MbError,
    /// CA:0000
    CaError,
    /// CB:0000
    CbError,
    /// Any other SMSC-specific value, kept verbatim
    Other(String),
}

impl ReportStat {
    /// Every non-delivered state of the standard vocabulary
    pub const FAILURES: [ReportStat; 10] = [
        ReportStat::Expired,
        ReportStat::Deleted,
        ReportStat::Undeliverable,
        ReportStat::Accepted,
        ReportStat::Unknown,
        ReportStat::Rejected,
        ReportStat::MaError,
        ReportStat::MbError,
        ReportStat::CaError,
        ReportStat::CbError,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ReportStat::Delivered => "DELIVRD",
            ReportStat::Expired => "EXPIRED",
            ReportStat::Deleted => "DELETED",
            ReportStat::Undeliverable => "UNDELIV",
            ReportStat::Accepted => "ACCEPTD",
            ReportStat::Unknown => "UNKNOWN",
            ReportStat::Rejected => "REJECTD",
            ReportStat::MaError => "MA:0000",
            ReportStat::MbError => "MB:0000",
            ReportStat::CaError => "CA:0000",
            ReportStat::CbError => "CB:0000",
            ReportStat::Other(stat) => stat,
        }
    }

    pub fn is_delivered(&self) -> bool {
        *self == ReportStat::Delivered
    }
}

impl From<&str> for ReportStat {
    fn from(value: &str) -> Self {
        match value {
            "DELIVRD" => ReportStat::Delivered,
            "EXPIRED" => ReportStat::Expired,
            "DELETED" => ReportStat::Deleted,
            "UNDELIV" => ReportStat::Undeliverable,
            "ACCEPTD" => ReportStat::Accepted,
            "UNKNOWN" => ReportStat::Unknown,
            "REJECTD" => ReportStat::Rejected,
            "MA:0000" => ReportStat::MaError,
            "MB:0000" => ReportStat::MbError,
            "CA:0000" => ReportStat::CaError,
            "CB:0000" => ReportStat::CbError,
            other => ReportStat::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ReportStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// yyMMddHHmm, the time format of report submit/done times
pub fn report_time<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.format("%y%m%d%H%M").to_string()
}

/// Delivery status report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Msg_Id returned in the SubmitResp this report refers to
    pub msg_id: u64,
    pub stat: ReportStat,
    /// yyMMddHHmm
    pub submit_time: String,
    /// yyMMddHHmm
    pub done_time: String,
    pub dest_terminal_id: String,
    pub smsc_sequence: u32,
}

impl Report {
    pub const SIZE: usize = 60;

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u64(self.msg_id);
        encode_fixed_str(buf, self.stat.as_str(), STAT_LEN, "stat")?;
        encode_fixed_str(buf, &self.submit_time, TIME_LEN, "submit_time")?;
        encode_fixed_str(buf, &self.done_time, TIME_LEN, "done_time")?;
        encode_fixed_str(buf, &self.dest_terminal_id, DEST_TERMINAL_ID_LEN, "dest_terminal_id")?;
        buf.put_u32(self.smsc_sequence);
        Ok(())
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let msg_id = decode_u64(buf)?;
        let stat = ReportStat::from(decode_fixed_str(buf, STAT_LEN, "stat")?.as_str());
        let submit_time = decode_fixed_str(buf, TIME_LEN, "submit_time")?;
        let done_time = decode_fixed_str(buf, TIME_LEN, "done_time")?;
        let dest_terminal_id = decode_fixed_str(buf, DEST_TERMINAL_ID_LEN, "dest_terminal_id")?;
        let smsc_sequence = decode_u32(buf)?;

        Ok(Report {
            msg_id,
            stat,
            submit_time,
            done_time,
            dest_terminal_id,
            smsc_sequence,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf)?;
        Ok(buf.to_vec())
    }
}
