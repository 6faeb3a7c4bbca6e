use clap::Parser;
use icap_scan::error::IcapResult;
use icap_scan::{ScannerConfig, display_name, encode_respmod_head};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(
    name = "rs-icap-scan",
    about = "Submit a file to an ICAP server and print its verdict",
    disable_version_flag = true,
    long_about = "Sends one RESPMOD request carrying the file to an ICAP antivirus / \
                  content-filtering gateway and reports whether it was left unmodified (204) \
                  or blocked (200)"
)]
struct Args {
    /// Full ICAP URI like icap://host[:port]/service
    #[arg(short = 'u', long, default_value = "icap://127.0.0.1:1344/RESPMOD")]
    uri: String,

    /// File to scan
    #[arg(short = 'f', long)]
    filename: PathBuf,

    /// Protocol version string of the request line
    #[arg(long = "icap-version", default_value = icap_scan::ICAP_VERSION)]
    icap_version: String,

    /// Payload bytes per outgoing chunk
    #[arg(long, default_value_t = icap_scan::DEFAULT_SEND_CHUNK_SIZE)]
    send_chunk_size: usize,

    /// Cap on bytes read while looking for a response terminator
    #[arg(long, default_value_t = icap_scan::DEFAULT_RECV_BUFFER_SIZE)]
    recv_buffer_size: usize,

    /// Connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Per-read timeout in seconds
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Debug level info to stdout
    #[arg(short = 'd', long)]
    debug_level: Option<u8>,

    /// Print the generated ICAP request head without sending it
    #[arg(long = "print-request", action = clap::ArgAction::SetTrue)]
    print_request: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let debug_level = args.debug_level.unwrap_or(0);
    if debug_level > 0 {
        tracing_subscriber::fmt()
            .with_max_level(match debug_level {
                1 => tracing::Level::ERROR,
                2 => tracing::Level::WARN,
                3 => tracing::Level::INFO,
                4 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            })
            .init();
    }

    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("ICAP scan failed: {}", e);
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the file came back clean.
async fn run(args: Args) -> IcapResult<bool> {
    let config = ScannerConfig::builder()
        .from_uri(&args.uri)?
        .version(&args.icap_version)
        .send_chunk_size(args.send_chunk_size)
        .recv_buffer_size(args.recv_buffer_size)
        .connect_timeout(args.connect_timeout.map(Duration::from_secs))
        .read_timeout(args.read_timeout.map(Duration::from_secs))
        .build()?;

    if args.print_request {
        let len = tokio::fs::metadata(&args.filename)
            .await
            .map_err(|source| icap_scan::IcapError::File {
                path: args.filename.clone(),
                source,
            })?
            .len();
        let name = display_name(&args.filename);
        let head = encode_respmod_head(config.target(), len, &name, &chrono::Local::now());
        print!("{}", String::from_utf8_lossy(head.as_bytes()));
        return Ok(true);
    }

    info!("Scanning {} via {}", args.filename.display(), config.icap_uri());
    let verdict = config.connect().await?.scan_file(&args.filename).await?;
    println!("{verdict}");
    Ok(verdict.success())
}
