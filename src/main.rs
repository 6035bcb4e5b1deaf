use clap::Parser;
use climalink_lib::config::AppConfig;
use climalink_lib::{logging, terminal};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port to use instead of picking one (COM3, /dev/ttyACM0 ...)
    #[arg(short, long)]
    port: Option<String>,
    /// Config file (defaults to <config dir>/climalink/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log filter, e.g. "debug" or "climalink_serial=trace"
    #[arg(short, long)]
    log_level: Option<String>,
    /// Talk to a simulated board instead of real hardware
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        config.serial.port_name = Some(port);
    }

    let level = args.log_level.unwrap_or_else(|| config.log_level.clone());
    if let Err(e) = logging::init_logging(&level) {
        eprintln!("{}", e);
    }

    match terminal::run(config, args.simulate).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "terminal stopped");
            ExitCode::FAILURE
        }
    }
}
