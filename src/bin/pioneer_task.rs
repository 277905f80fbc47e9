use clap::{App, Arg};
use colored::*;
use pioneer_link::bus::{BusEvent, BusMessage, ChannelBus, EntityState};
use pioneer_link::config::{TaskConfig, DEFAULT_TASK};
use pioneer_link::registry::TaskRegistry;
use pioneer_link::runtime::StopFlag;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{info, warn, Level};

const STATE_REPORT_PERIOD_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("pioneer-task")
        .version("0.1.0")
        .author("Vehicle Systems Engineering Team")
        .about("🌊 Runs a vehicle-link task against an in-process bus")
        .long_about(
            "Runs a registered task. Bus commands are read from stdin, one JSON \
             message per line, e.g. {\"StartManeuver\":{\"Idle\":{\"duration\":30}}}. \
             Bus events are printed to stdout.",
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON task configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("task")
                .short("t")
                .long("task")
                .value_name("NAME")
                .help("Task type to run")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Vehicle address for TCP and UDP")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("tcp-port")
                .long("tcp-port")
                .value_name("PORT")
                .help("Vehicle TCP port")
                .takes_value(true)
                .validator(validate_port),
        )
        .arg(
            Arg::with_name("udp-listen")
                .long("udp-listen")
                .value_name("PORT")
                .help("Local UDP listen port")
                .takes_value(true)
                .validator(validate_port),
        )
        .arg(
            Arg::with_name("udp-port")
                .long("udp-port")
                .value_name("PORT")
                .help("Vehicle UDP port")
                .takes_value(true)
                .validator(validate_port),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Seconds without data before reporting missing data (1-60)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Event output format")
                .takes_value(true)
                .possible_values(&["json", "pretty"])
                .default_value("pretty"),
        )
        .arg(
            Arg::with_name("quiet-records")
                .long("quiet-records")
                .help("Do not print decoded telemetry records"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match matches.value_of("config") {
        Some(path) => TaskConfig::load(path)?,
        None => TaskConfig::default(),
    };
    if let Some(task) = matches.value_of("task") {
        config.task = task.to_string();
    }
    if let Some(host) = matches.value_of("host") {
        config.link.stream_addr = host.to_string();
        config.link.datagram_addr = host.to_string();
    }
    if let Some(port) = matches.value_of("tcp-port") {
        config.link.stream_port = port.parse()?;
    }
    if let Some(port) = matches.value_of("udp-listen") {
        config.link.datagram_listen_port = port.parse()?;
    }
    if let Some(port) = matches.value_of("udp-port") {
        config.link.datagram_port = port.parse()?;
    }
    if let Some(timeout) = matches.value_of("timeout") {
        config.comm_timeout_s = timeout.parse()?;
    }
    config.validate()?;

    let registry = TaskRegistry::with_builtin();
    let name = config.task.clone();
    let mut task = match registry.create(&name, config) {
        Ok(task) => task,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
            let known: Vec<&str> = registry.names().collect();
            eprintln!("   known task types: {}", known.join(", ").bright_white());
            if name != DEFAULT_TASK {
                eprintln!("   default: {}", DEFAULT_TASK.bright_white());
            }
            return Err(e.into());
        }
    };

    println!("{} {}", "🌊".bright_blue(), format!("Task {} starting", task.name()).bright_blue().bold());

    let (mut bus, handle) = ChannelBus::pair();
    let stop = StopFlag::new();

    let json_output = matches.value_of("format") == Some("json");
    let show_records = !matches.is_present("quiet-records");
    let printer = tokio::spawn(print_events(handle.events, json_output, show_records));
    let reader = tokio::spawn(read_commands(handle.commands.clone()));
    let ticker = tokio::spawn(state_reports(handle.commands));

    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            ctrl_c_stop.stop();
        }
    });

    task.run(&mut bus, &stop).await?;

    reader.abort();
    ticker.abort();
    printer.abort();
    println!("{} {}", "🛑".red(), "Task stopped".bright_white());
    Ok(())
}

fn validate_port(value: String) -> Result<(), String> {
    match value.parse::<u16>() {
        Ok(_) => Ok(()),
        Err(_) => Err("Port must be a number between 0 and 65535".into()),
    }
}

async fn read_commands(commands: mpsc::Sender<BusMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<BusMessage>(line) {
            Ok(message) => {
                if commands.send(message).await.is_err() {
                    break;
                }
            }
            Err(e) => eprintln!("{} bad command {}: {}", "❌".red(), line.bright_white(), e),
        }
    }
}

async fn state_reports(commands: mpsc::Sender<BusMessage>) {
    let mut interval = time::interval(Duration::from_millis(STATE_REPORT_PERIOD_MS));
    loop {
        interval.tick().await;
        if commands.send(BusMessage::StateReport).await.is_err() {
            break;
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<BusEvent>, json: bool, show_records: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("event printer lagged, {} events dropped", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !show_records && matches!(event, BusEvent::Record(_)) {
            continue;
        }

        if json {
            match serde_json::to_string(&event) {
                Ok(text) => println!("{}", text),
                Err(e) => warn!("cannot serialize event: {}", e),
            }
            continue;
        }

        match event {
            BusEvent::EntityState { state, code } => {
                let text = format!("{:?} ({})", state, code);
                let text = match state {
                    EntityState::Normal => text.bright_green(),
                    EntityState::Boot => text.bright_white(),
                    EntityState::Fault | EntityState::Error => text.yellow(),
                    EntityState::Failure => text.bright_red(),
                };
                println!("{} entity state {}", "🔧".bright_blue(), text);
            }
            BusEvent::Progress { eta: Some(eta) } => {
                println!("{} progress, {} s left", "⏳".bright_blue(), eta.to_string().bright_cyan());
            }
            BusEvent::Progress { eta: None } => println!("{} progress, no ETA", "⏳".bright_blue()),
            BusEvent::Completion => println!("{} {}", "✅".green(), "maneuver completed".bright_green()),
            BusEvent::Error { reason } => println!("{} {}", "❌".red(), reason.bright_red()),
            BusEvent::Record(record) => println!("{} {:?}", "📡".bright_blue(), record),
            BusEvent::Memento { kind, tuples } => {
                println!("{} saved {}: {}", "💾".bright_blue(), kind.to_string().bright_white(), tuples.bright_cyan());
            }
        }
    }
}
