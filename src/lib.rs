#[macro_use]
mod macros;

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod datatypes;
pub mod fragment;
pub mod sequence;
pub mod server;

#[cfg(test)]
mod tests;

// Re-export codec types for direct access
pub use codec::{
    CodecError, Decodable, Encodable, Frame, Pdu, PduRegistry, RawFrame, Response,
};

pub use client::{ClientError, ClientResult, SpClient};
pub use config::Config;
pub use server::{Gateway, GatewayError, GatewayResult};

/// Error returned by the binaries and other top-level glue.
///
/// Library code uses the typed errors of each module ([`CodecError`],
/// [`ClientError`], [`GatewayError`]); this boxed form only collects them
/// where the cause no longer matters to the caller.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for top-level operations.
///
/// # Examples
///
/// ## Running a gateway
///
/// ```rust,no_run
/// use ismg::{Config, Gateway};
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() -> ismg::Result<()> {
///     let gateway = Gateway::new(Config::default())?;
///     let listener = TcpListener::bind("0.0.0.0:7890").await?;
///     gateway.serve(listener).await?;
///     Ok(())
/// }
/// ```
///
/// ## Sending a message as an SP
///
/// ```rust,no_run
/// use ismg::SpClient;
/// use ismg::config::SubmitDefaults;
/// use ismg::datatypes::ProtocolVersion;
///
/// #[tokio::main]
/// async fn main() -> ismg::Result<()> {
///     let mut client = SpClient::connect("127.0.0.1:7890", ProtocolVersion::V30, 512).await?;
///     client.login("901234", "123456").await?;
///
///     let defaults = SubmitDefaults::default();
///     let sequence_ids = client.submit_text(&defaults, "13800138000", "Hello, World!").await?;
///     println!("sent as {} fragment(s)", sequence_ids.len());
///
///     client.terminate().await?;
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
