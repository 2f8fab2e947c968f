// ABOUTME: Load generator that plays an SP against the gateway
// ABOUTME: Logs in, submits a batch of messages and counts responses and status reports

use argh::FromArgs;
use ismg::client::SpClient;
use ismg::codec::Frame;
use ismg::config::{Config, SubmitDefaults};
use ismg::datatypes::ProtocolVersion;
use std::collections::HashSet;
use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

/// SP-side load generator for the simulated gateway
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// gateway host (default: 127.0.0.1)
    #[argh(option, default = "String::from(\"127.0.0.1\")")]
    host: String,

    /// gateway port (default: 7890)
    #[argh(option, short = 'p', default = "7890")]
    port: u16,

    /// YAML file supplying credentials and submit defaults
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// speak CMPP 2.0 instead of 3.0
    #[argh(switch)]
    v2: bool,

    /// number of messages to submit (default: 10)
    #[argh(option, short = 'n', default = "10")]
    count: usize,

    /// destination terminal (default: 13800138000)
    #[argh(option, short = 't', default = "String::from(\"13800138000\")")]
    to: String,

    /// message text; long text is sent as several fragments
    #[argh(option, short = 'm', default = "String::from(\"Hello from the SP load generator\")")]
    message: String,

    /// seconds to keep waiting for reports after the last response (default: 5)
    #[argh(option, default = "5")]
    linger: u64,
}

#[derive(Debug, Default)]
struct Tally {
    sent: usize,
    responses: usize,
    accepted: usize,
    rejected: usize,
    reports: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli_args.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };
    let version = if cli_args.v2 {
        ProtocolVersion::V20
    } else {
        ProtocolVersion::V30
    };
    let gateway = &config.gateway;
    let defaults: &SubmitDefaults = &config.submit_defaults;

    let addr = format!("{}:{}", cli_args.host, cli_args.port);
    info!("Connecting to {addr} as {version}");
    let mut client = SpClient::connect(addr, version, gateway.max_frame_length).await?;
    client.login(&gateway.source_addr, &gateway.shared_secret).await?;
    info!("Logged in as {}", gateway.source_addr);

    let started = Instant::now();
    let mut tally = Tally::default();
    let mut outstanding = HashSet::new();

    for _ in 0..cli_args.count {
        let sequence_ids = client
            .submit_text(defaults, &cli_args.to, &cli_args.message)
            .await?;
        tally.sent += sequence_ids.len();
        outstanding.extend(sequence_ids);
    }
    info!("Submitted {} frames in {:?}", tally.sent, started.elapsed());

    let linger = Duration::from_secs(cli_args.linger);
    loop {
        let frame = match timeout(linger, client.read_frame()).await {
            Ok(frame) => frame?,
            Err(_) => {
                debug!("No traffic for {linger:?}, stopping");
                break;
            }
        };
        let Some(frame) = frame else {
            warn!("Gateway closed the connection");
            break;
        };

        match &frame {
            Frame::SubmitResp(resp) => {
                outstanding.remove(&resp.header.sequence_id);
                tally.responses += 1;
                if resp.result.is_ok() {
                    tally.accepted += 1;
                } else {
                    tally.rejected += 1;
                    debug!(
                        "Submit {} rejected: {}",
                        resp.header.sequence_id,
                        resp.result.description()
                    );
                }
            }
            Frame::Deliver(deliver) => {
                if let Some(report) = deliver.as_report() {
                    tally.reports += 1;
                    debug!("Report for {:#x}: {}", report.msg_id, report.stat.as_str());
                } else {
                    info!("MO from {}: {:?}", deliver.src_terminal_id, deliver.text());
                }
            }
            _ => {}
        }
        client.respond(&frame).await?;
    }

    info!(
        "Done in {:?}: sent {}, responses {} ({} accepted, {} rejected), reports {}, unanswered {}",
        started.elapsed(),
        tally.sent,
        tally.responses,
        tally.accepted,
        tally.rejected,
        tally.reports,
        outstanding.len()
    );

    client.terminate().await?;
    Ok(())
}
