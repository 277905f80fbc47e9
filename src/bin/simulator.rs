use clap::{App, Arg};
use pioneer_link::protocol::{CompassCalibration, Record, V1Telemetry, V2Telemetry};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{error, info, warn, Level};

const DEFAULT_TCP_PORT: &str = "2011";
const DEFAULT_UDP_TARGET: &str = "127.0.0.1:2010";
const DEFAULT_PERIOD_MS: &str = "200";
const FRAME_BROADCAST_BUFFER_SIZE: usize = 64;

/// Slowly varying vehicle state used to fill telemetry frames.
#[derive(Debug, Default)]
struct VehicleModel {
    tick: u32,
    calibrating: bool,
    calibration: u8,
}

impl VehicleModel {
    fn advance(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        if self.calibrating && self.calibration < 100 {
            self.calibration = (self.calibration + 2).min(100);
        }
    }

    fn wave(&self, period: u32, amplitude: i32) -> i32 {
        let phase = (self.tick % period) as i32;
        let half = (period / 2) as i32;
        let tri = if phase < half { phase } else { period as i32 - phase };
        (tri * 2 * amplitude) / period.max(1) as i32 - amplitude / 2
    }

    fn v1(&self) -> Record {
        Record::V1Telemetry(V1Telemetry {
            battery_level: 100 - (self.tick / 600 % 100) as u8,
            camera_tilt: self.wave(40, 60) as i8,
            pitch: self.wave(50, 200) as i16,
            roll: self.wave(70, 150) as i16,
            yaw: (self.tick * 7 % 36000) as u16,
            depth: (150 + self.wave(100, 100)) as u16,
            water_temp: 1250,
            health_counter: self.tick as u16,
        })
    }

    fn v2(&self) -> Record {
        Record::V2Telemetry(V2Telemetry {
            battery_level: 100 - (self.tick / 600 % 100) as u8,
            gps_status: 0,
            pitch: self.wave(50, 200) as i16,
            roll: self.wave(70, 150) as i16,
            yaw: (self.tick * 7 % 36000) as u16,
            depth: 1500 + self.wave(100, 1000),
            water_temp: 1250,
            drone_temp: 3100 + self.wave(300, 200) as i16,
            auto_heading: 0,
            auto_depth: 0,
            lights: 0,
            camera_tilt: self.wave(40, 60) as i8,
        })
    }

    fn compass(&self) -> Record {
        Record::CompassCalibration(CompassCalibration {
            progress_xy: self.calibration,
            progress_z: self.calibration.saturating_sub(4),
            progress_thruster: self.calibration,
            calibration_state: u8::from(self.calibrating),
            quality: u16::from(self.calibration) * 10,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("pioneer-simulator")
        .version("0.1.0")
        .author("Vehicle Systems Engineering Team")
        .about("🐟 Vehicle simulator streaming binary telemetry over TCP and UDP")
        .arg(
            Arg::with_name("tcp-port")
                .short("p")
                .long("tcp-port")
                .value_name("PORT")
                .help("TCP port to serve telemetry on")
                .takes_value(true)
                .default_value(DEFAULT_TCP_PORT),
        )
        .arg(
            Arg::with_name("udp-target")
                .short("u")
                .long("udp-target")
                .value_name("ADDR")
                .help("Where to send UDP telemetry")
                .takes_value(true)
                .default_value(DEFAULT_UDP_TARGET),
        )
        .arg(
            Arg::with_name("period")
                .long("period")
                .value_name("MS")
                .help("Frame period in milliseconds")
                .takes_value(true)
                .default_value(DEFAULT_PERIOD_MS),
        )
        .arg(
            Arg::with_name("calibrate")
                .long("calibrate")
                .help("Emit rising compass calibration progress"),
        )
        .arg(
            Arg::with_name("split")
                .long("split")
                .help("Split TCP frames across writes"),
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

    let tcp_port: u16 = matches.value_of("tcp-port").unwrap_or(DEFAULT_TCP_PORT).parse()?;
    let udp_target: SocketAddr = matches.value_of("udp-target").unwrap_or(DEFAULT_UDP_TARGET).parse()?;
    let period_ms: u64 = matches.value_of("period").unwrap_or(DEFAULT_PERIOD_MS).parse()?;
    let split = matches.is_present("split");

    println!("🐟 Pioneer Vehicle Simulator");
    println!("============================");

    let (frame_tx, _) = broadcast::channel::<Vec<u8>>(FRAME_BROADCAST_BUFFER_SIZE);

    let listener = TcpListener::bind(("127.0.0.1", tcp_port)).await?;
    info!("🌐 TCP telemetry on port {}", tcp_port);
    let tcp_frames = frame_tx.clone();
    let tcp_server = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("🔗 Client connected: {}", addr);
                    let frames = tcp_frames.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = stream_frames(stream, frames, split).await {
                            warn!("Client {} error: {}", addr, e);
                        }
                        info!("🔌 Client {} disconnected", addr);
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    });

    let udp = UdpSocket::bind("0.0.0.0:0").await?;
    info!("📡 UDP telemetry to {}", udp_target);

    let mut model = VehicleModel {
        calibrating: matches.is_present("calibrate"),
        ..VehicleModel::default()
    };
    let mut interval = time::interval(Duration::from_millis(period_ms.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        model.advance();

        let mut tcp_burst = Vec::new();
        tcp_burst.extend_from_slice(&model.v2().to_bytes());
        if model.calibrating {
            tcp_burst.extend_from_slice(&model.compass().to_bytes());
        }
        // No subscribers just means no client is connected yet.
        let _ = frame_tx.send(tcp_burst);

        if let Err(e) = udp.send_to(&model.v1().to_bytes(), udp_target).await {
            warn!("UDP send failed: {}", e);
        }
    }

    tcp_server.abort();
    println!("🛑 Vehicle simulator stopped");
    Ok(())
}

async fn stream_frames(
    mut stream: TcpStream,
    mut frames: broadcast::Receiver<Vec<u8>>,
    split: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    stream.set_nodelay(true)?;

    loop {
        let burst = match frames.recv().await {
            Ok(burst) => burst,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Client lagged, {} bursts dropped", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };

        if split && burst.len() > 1 {
            let (head, tail) = burst.split_at(burst.len() / 2 + 1);
            stream.write_all(head).await?;
            stream.flush().await?;
            time::sleep(Duration::from_millis(5)).await;
            stream.write_all(tail).await?;
        } else {
            stream.write_all(&burst).await?;
        }
    }
}
