use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use env_logger::Target;
use log::{error, info};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fs::OpenOptions;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::{io::Write, str::FromStr};

use datachannel::data_channel::RTCDataChannel;
use datachannel::data_channel::detached::DetachedDataChannel;
use datachannel::dtls_role::RTCDtlsRole;
use datachannel::sctp_transport::RTCSctpTransport;
use datachannel::setting_engine::SettingEngine;
use datachannel::transport::loopback::LoopbackTransport;

const MESSAGE_SIZE: usize = 15;
const SEND_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "data-channels-detach-create")]
#[command(author = "Rusty Rain <y@liu.mx>")]
#[command(version = "0.0.0")]
#[command(about = "An example of Data-Channels-Detach-Create", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(short, long, default_value_t = format!("INFO"))]
    log_level: String,
    #[arg(short, long, default_value_t = format!(""))]
    output_log_file: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output_log_file = cli.output_log_file;
    let log_level = log::LevelFilter::from_str(&cli.log_level)?;
    if cli.debug {
        env_logger::Builder::new()
            .target(if !output_log_file.is_empty() {
                Target::Pipe(Box::new(
                    OpenOptions::new()
                        .create(true)
                        .write(true)
                        .truncate(true)
                        .open(output_log_file)?,
                ))
            } else {
                Target::Stdout
            })
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }

    // Since this behavior diverges from the WebRTC API it has to be
    // enabled using the settings engine. Mixing both detached and the
    // on_message DataChannel API is not supported.
    let mut setting_engine = SettingEngine::default();
    setting_engine.detach_data_channels();
    let setting_engine = Arc::new(setting_engine);

    let (offer_transport, answer_transport) = LoopbackTransport::pair();
    let offer = Arc::new(RTCSctpTransport::new(
        offer_transport.clone(),
        Arc::clone(&setting_engine),
    ));
    offer.set_dtls_role(RTCDtlsRole::Client);
    let answer = Arc::new(RTCSctpTransport::new(
        answer_transport.clone(),
        setting_engine,
    ));
    answer.set_dtls_role(RTCDtlsRole::Server);

    // the stop channel disconnects on Ctrl-C, waking every loop at once
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        stop_tx.take();
    })?;
    println!("Press Ctrl-C to stop");

    // Register data channel creation handling on the answering side
    {
        let stop_rx = stop_rx.clone();
        answer.on_data_channel(Box::new(move |dc| {
            println!("New DataChannel {} {}", dc.label(), dc.id());
            on_open_detach(&dc, stop_rx.clone());
        }));
    }

    // Create a datachannel with label 'data'
    let data_channel = offer.create_data_channel("data", None)?;
    on_open_detach(&data_channel, stop_rx.clone());

    let pumps = vec![
        offer_transport.serve(Arc::clone(&offer))?,
        answer_transport.serve(Arc::clone(&answer))?,
    ];
    offer_transport.connect()?;

    // Block until Ctrl-C
    let _ = stop_rx.recv();
    println!("received ctrl-c signal!");

    if let Err(err) = offer.stop() {
        error!("offer stop: {err}");
    }
    if let Err(err) = answer.stop() {
        error!("answer stop: {err}");
    }
    for pump in pumps {
        let _ = pump.join();
    }

    Ok(())
}

/// Detaches the channel once it opens and runs its read and write loops.
fn on_open_detach(dc: &Arc<RTCDataChannel>, stop_rx: Receiver<()>) {
    let opened = Arc::clone(dc);
    dc.on_open(Box::new(move || {
        println!(
            "Data channel '{}'-'{}' open.",
            opened.label(),
            opened.id()
        );

        // Detach the data channel
        let detached = match opened.detach() {
            Ok(detached) => Arc::new(detached),
            Err(err) => {
                error!("data channel {} detach: {err}", opened.id());
                return;
            }
        };

        // Handle reading from the data channel
        let reader = Arc::clone(&detached);
        thread::spawn(move || read_loop(reader));

        // Handle writing to the data channel
        let stop_rx = stop_rx.clone();
        thread::spawn(move || write_loop(detached, stop_rx));
    }));
}

/// read_loop shows how to read from the datachannel directly
fn read_loop(detached: Arc<DetachedDataChannel>) {
    let mut buffer = vec![0u8; MESSAGE_SIZE];
    loop {
        let n = match detached.read_data_channel(&mut buffer) {
            Ok(0) => {
                info!("data channel {} closed", detached.stream_identifier());
                return;
            }
            Ok(n) => n,
            Err(err) => {
                println!("Datachannel closed; Exit the readloop: {err}");
                return;
            }
        };

        println!(
            "Message from DataChannel {}: {}",
            detached.stream_identifier(),
            String::from_utf8_lossy(&buffer[..n])
        );
    }
}

/// write_loop shows how to write to the datachannel directly
fn write_loop(detached: Arc<DetachedDataChannel>, stop_rx: Receiver<()>) {
    loop {
        match stop_rx.recv_timeout(SEND_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }

        let message: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(MESSAGE_SIZE)
            .map(char::from)
            .collect();
        println!(
            "Sending '{message}' on DataChannel {}",
            detached.stream_identifier()
        );

        if let Err(err) = detached.write_data_channel(&Bytes::from(message)) {
            println!("write data error: {err}");
            return;
        }
    }
}
