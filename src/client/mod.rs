// ABOUTME: SP client module used by the load generator and the end-to-end tests
// ABOUTME: Exports the client and its error types

//! SP Client Module
//!
//! A small CMPP client for exercising the gateway:
//!
//! ```rust,no_run
//! use ismg::client::SpClient;
//! use ismg::config::SubmitDefaults;
//! use ismg::datatypes::ProtocolVersion;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SpClient::connect("127.0.0.1:7890", ProtocolVersion::V30, 512).await?;
//! client.login("901234", "123456").await?;
//! client
//!     .submit_text(&SubmitDefaults::default(), "13800138000", "Hello!")
//!     .await?;
//! while let Some(frame) = client.read_frame().await? {
//!     client.respond(&frame).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod sp;

pub use error::{ClientError, ClientResult};
pub use sp::SpClient;
