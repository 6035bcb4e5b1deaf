//! Terminal front end.
//!
//! A line-oriented REPL drives the [`LinkController`]; a renderer task
//! prints every display event on stdout.

use crate::config::AppConfig;
use climalink_serial::link::ports::scan_ports;
use climalink_serial::link::simulated::{SimulatedBackend, SimulatedPort};
use climalink_serial::link::system::{PortSelector, SystemBackend};
use climalink_serial::link::{
    ChannelSink, DisplayEvent, DisplayState, LinkController, LinkStatus, SendOutcome,
    SerialBackend, SerialPortInfo, SerialTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Name of the in-memory device used by `--simulate`.
pub const SIMULATED_PORT: &str = "SIM0";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Connect(Option<String>),
    Disconnect,
    Toggle,
    /// Raw token, or the token behind a control label.
    Send(String),
    Ports,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str, config: &AppConfig) -> ReplCommand {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return ReplCommand::Empty;
    };
    let arg = parts.next().map(str::to_string);
    match word.to_lowercase().as_str() {
        "connect" => ReplCommand::Connect(arg),
        "disconnect" => ReplCommand::Disconnect,
        "toggle" => ReplCommand::Toggle,
        "send" => match arg {
            Some(token) => ReplCommand::Send(token),
            None => ReplCommand::Unknown("send needs a token".to_string()),
        },
        "ports" => ReplCommand::Ports,
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => match config.control(word) {
            Some(control) => ReplCommand::Send(control.command.clone()),
            None => ReplCommand::Unknown(format!("unknown command '{}'", word)),
        },
    }
}

pub fn help_text(config: &AppConfig) -> String {
    let mut text = String::from(
        "commands:\n  \
         connect [PORT]   pick a device (or use PORT) and connect\n  \
         disconnect       close the connection\n  \
         toggle           connect or disconnect\n  \
         send TOKEN       send a raw command token\n  \
         ports            list serial ports\n  \
         status           show link state and counters\n  \
         help             show this text\n  \
         quit             disconnect and exit\n\
         controls:\n",
    );
    for control in &config.controls {
        text.push_str(&format!("  {:<16} sends {}\n", control.label, control.command));
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run one REPL command.  Link failures are already on the display, so
/// they only show up here in the log.
pub async fn execute(command: ReplCommand, controller: &LinkController, config: &AppConfig) -> Flow {
    match command {
        ReplCommand::Connect(port) => {
            let result = match port {
                Some(port) => controller.connect_to(&port).await,
                None => controller.connect().await,
            };
            if let Err(e) = result {
                tracing::debug!(error = %e, "connect failed");
            }
        }
        ReplCommand::Disconnect => {
            if let Err(e) = controller.disconnect().await {
                tracing::warn!(error = %e, "disconnect reported an error");
            }
        }
        ReplCommand::Toggle => {
            if let Err(e) = controller.toggle().await {
                tracing::debug!(error = %e, "toggle failed");
            }
        }
        ReplCommand::Send(token) => match controller.send_command(&token).await {
            Ok(SendOutcome::Sent(bytes)) => tracing::debug!(%token, bytes, "command sent"),
            Ok(SendOutcome::Rejected) => {}
            Err(e) => tracing::debug!(error = %e, "command failed"),
        },
        ReplCommand::Ports => match tokio::task::spawn_blocking(scan_ports).await {
            Ok(Ok(ports)) => println!("{}", format_ports(&ports)),
            Ok(Err(e)) => println!("cannot list ports: {}", e),
            Err(e) => tracing::error!(error = %e, "port scan task failed"),
        },
        ReplCommand::Status => {
            let info = controller.info().await;
            match info.status {
                LinkStatus::Connected => println!(
                    "connected to {} ({}), session {}, rx {} bytes / {} chunks, tx {} commands{}",
                    info.port_name.unwrap_or_default(),
                    info.config_shorthand,
                    info.session_id.unwrap_or_default(),
                    info.stats.bytes_rx,
                    info.stats.chunks_rx,
                    info.stats.commands_tx,
                    if info.reading { "" } else { ", reader stopped" },
                ),
                LinkStatus::Disconnected => println!("not connected ({})", info.config_shorthand),
            }
        }
        ReplCommand::Help => print!("{}", help_text(config)),
        ReplCommand::Quit => return Flow::Quit,
        ReplCommand::Empty => {}
        ReplCommand::Unknown(msg) => println!("{} (try 'help')", msg),
    }
    Flow::Continue
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn render_event(event: &DisplayEvent) -> String {
    match event {
        DisplayEvent::Status(status) => status.to_string(),
        DisplayEvent::Temperature(t) => format!("Temperature: {} °C", t),
        DisplayEvent::Humidity(h) => format!("Humidity: {} %", h),
        DisplayEvent::Controls { enabled: true } => "Controls enabled".to_string(),
        DisplayEvent::Controls { enabled: false } => "Controls disabled".to_string(),
    }
}

pub fn format_ports(ports: &[SerialPortInfo]) -> String {
    if ports.is_empty() {
        return "no serial ports found".to_string();
    }
    ports
        .iter()
        .map(|p| format!("  {:<10} {}", p.port_type.label(), p.display_name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print events until every sender is gone; returns the final state.
async fn render_events(mut events: mpsc::UnboundedReceiver<DisplayEvent>) -> DisplayState {
    let mut state = DisplayState::default();
    while let Some(event) = events.recv().await {
        state.apply(&event);
        println!("{}", render_event(&event));
    }
    state
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Device selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Picks the configured port, or the only port present.  With several
/// candidates it lists them and cancels so the user can `connect PORT`.
pub struct TerminalSelector {
    preferred: Option<String>,
}

impl TerminalSelector {
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }
}

impl PortSelector for TerminalSelector {
    fn select(&self, ports: &[SerialPortInfo]) -> Option<String> {
        if let Some(port) = &self.preferred {
            return Some(port.clone());
        }
        match ports {
            [] => None,
            [only] => Some(only.port_name.clone()),
            many => {
                println!("several ports found, use 'connect PORT':\n{}", format_ports(many));
                None
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated board
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Telemetry line the simulated board prints at `tick`.
pub fn simulated_line(tick: u64) -> String {
    let phase = tick as f64 / 6.0;
    let temperature = 24.0 + 2.5 * phase.sin();
    let humidity = 55.0 + 8.0 * (phase / 2.0).cos();
    format!("T{:.1} H{:.0}\n", temperature, humidity)
}

/// Feeds telemetry into the simulated port while it is open.
fn spawn_board(port: Arc<SimulatedPort>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            if port.is_open() {
                port.inject_rx(simulated_line(tick).as_bytes());
                tick += 1;
            }
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the REPL on stdin until `quit`, end of input, or Ctrl-C.
pub async fn run(config: AppConfig, simulate: bool) -> Result<(), String> {
    let (sink, events) = ChannelSink::new();
    let renderer = tokio::spawn(render_events(events));

    let mut board = None;
    let backend: Arc<dyn SerialBackend> = if simulate {
        let port = SimulatedPort::new(SIMULATED_PORT);
        board = Some(spawn_board(port.clone(), Duration::from_secs(2)));
        tracing::info!(port = SIMULATED_PORT, "using simulated board");
        Arc::new(SimulatedBackend::new(port))
    } else {
        Arc::new(SystemBackend::new(Arc::new(TerminalSelector::new(
            config.serial.port_name.clone(),
        ))))
    };

    let controller = LinkController::new(backend, Arc::new(sink), config.serial.clone());
    print!("{}", help_text(&config));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if execute(parse_line(&line, &config), &controller, &config).await == Flow::Quit {
            break;
        }
    }

    if controller.is_connected().await {
        if let Err(e) = controller.disconnect().await {
            tracing::warn!(error = %e, "disconnect on exit failed");
        }
    }
    if let Some(board) = board {
        board.abort();
    }
    drop(controller);
    renderer
        .await
        .map_err(|e| format!("renderer task failed: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use climalink_serial::link::{PortType, RecordingSink, SerialConfig, Status};

    fn port(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: PortType::Usb,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_parse_builtin_commands() {
        let cfg = AppConfig::default();
        assert_eq!(parse_line("connect", &cfg), ReplCommand::Connect(None));
        assert_eq!(
            parse_line("connect COM3", &cfg),
            ReplCommand::Connect(Some("COM3".into()))
        );
        assert_eq!(parse_line("  DISCONNECT ", &cfg), ReplCommand::Disconnect);
        assert_eq!(parse_line("send BUZZ", &cfg), ReplCommand::Send("BUZZ".into()));
        assert_eq!(parse_line("", &cfg), ReplCommand::Empty);
        assert!(matches!(parse_line("send", &cfg), ReplCommand::Unknown(_)));
        assert!(matches!(parse_line("dance", &cfg), ReplCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_control_label() {
        let cfg = AppConfig::default();
        assert_eq!(parse_line("led-on", &cfg), ReplCommand::Send("LED_ON".into()));
        assert_eq!(parse_line("Fan-Off", &cfg), ReplCommand::Send("FAN_OFF".into()));
    }

    #[test]
    fn test_help_lists_controls() {
        let text = help_text(&AppConfig::default());
        assert!(text.contains("led-on"));
        assert!(text.contains("sends FAN_OFF"));
    }

    #[test]
    fn test_render_event() {
        assert_eq!(
            render_event(&DisplayEvent::Temperature("25.5".into())),
            "Temperature: 25.5 °C"
        );
        assert_eq!(render_event(&DisplayEvent::Humidity("60".into())), "Humidity: 60 %");
        assert_eq!(
            render_event(&DisplayEvent::Status(Status::Rejected)),
            "Not connected to the board! Please connect first."
        );
    }

    #[test]
    fn test_selector() {
        let fixed = TerminalSelector::new(Some("COM9".into()));
        assert_eq!(fixed.select(&[]).as_deref(), Some("COM9"));

        let auto = TerminalSelector::new(None);
        assert!(auto.select(&[]).is_none());
        assert_eq!(auto.select(&[port("/dev/ttyACM0")]).as_deref(), Some("/dev/ttyACM0"));
        assert!(auto.select(&[port("COM3"), port("COM4")]).is_none());
    }

    #[test]
    fn test_simulated_line_parses() {
        for tick in 0..20 {
            let line = simulated_line(tick);
            let reading = climalink_serial::link::parser::parse_chunk(line.trim());
            assert!(reading.temperature.is_some(), "line {:?}", line);
            assert!(reading.humidity.is_some(), "line {:?}", line);
        }
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let cfg = AppConfig::default();
        let port = SimulatedPort::new(SIMULATED_PORT);
        let sink = Arc::new(RecordingSink::new());
        let controller = LinkController::new(
            Arc::new(SimulatedBackend::new(port.clone())),
            sink.clone(),
            SerialConfig::default(),
        );

        assert_eq!(execute(parse_line("led-on", &cfg), &controller, &cfg).await, Flow::Continue);
        assert!(port.writes().is_empty());

        execute(parse_line("connect", &cfg), &controller, &cfg).await;
        execute(parse_line("led-on", &cfg), &controller, &cfg).await;
        execute(parse_line("toggle", &cfg), &controller, &cfg).await;
        assert_eq!(port.writes(), vec![b"LED_ON\n".to_vec()]);
        assert!(!controller.is_connected().await);
        assert_eq!(execute(ReplCommand::Quit, &controller, &cfg).await, Flow::Quit);
    }
}
