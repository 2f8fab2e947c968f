mod active_test;
mod command_id;
mod command_status;
mod connect;
mod deliver;
mod msg_format;
pub(crate) mod report;
mod submit;
mod terminate;
mod version;

pub use active_test::{ActiveTest, ActiveTestResp};
pub use command_id::CommandId;
pub use command_status::{ConnectStatus, DeliverResult, SubmitResult};
pub use connect::{
    AUTHENTICATOR_LEN, Authenticator, Connect, ConnectResp, SOURCE_ADDR_LEN,
    authenticator_ismg, authenticator_source, timestamp_now,
};
pub use deliver::{Deliver, DeliverContent, DeliverResp};
pub use msg_format::MsgFormat;
pub use report::{Report, ReportStat, report_time};
pub use submit::{
    MAX_CONTENT_LEN, MAX_DESTINATIONS, Submit, SubmitBuildError, SubmitBuilder, SubmitResp,
};
pub use terminate::{Terminate, TerminateResp};
pub use version::ProtocolVersion;
