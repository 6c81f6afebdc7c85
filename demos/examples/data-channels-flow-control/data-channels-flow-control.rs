use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use env_logger::Target;
use log::{debug, error};
use std::fs::OpenOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use std::{io::Write, str::FromStr};

use datachannel::data_channel::init::RTCDataChannelInit;
use datachannel::dtls_role::RTCDtlsRole;
use datachannel::sctp_transport::RTCSctpTransport;
use datachannel::setting_engine::SettingEngine;
use datachannel::transport::loopback::LoopbackTransport;

const BUFFERED_AMOUNT_LOW_THRESHOLD: usize = 512 * 1024; // 512 KB
const MAX_BUFFERED_AMOUNT: usize = 1024 * 1024; // 1 MB
const CHUNK_SIZE: usize = 1024;

#[derive(Parser)]
#[command(name = "data-channels-flow-control")]
#[command(author = "Rusty Rain <y@liu.mx>")]
#[command(version = "0.0.0")]
#[command(about = "An example of Data-Channels-Flow-Control", long_about = None)]
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

    let setting_engine = Arc::new(SettingEngine::default());
    let (requester_transport, responder_transport) = LoopbackTransport::pair();
    let requester = Arc::new(RTCSctpTransport::new(
        requester_transport.clone(),
        Arc::clone(&setting_engine),
    ));
    requester.set_dtls_role(RTCDtlsRole::Client);
    let responder = Arc::new(RTCSctpTransport::new(
        responder_transport.clone(),
        setting_engine,
    ));
    responder.set_dtls_role(RTCDtlsRole::Server);

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        stop_tx.take();
    })?;
    println!("Press Ctrl-C to stop");

    // Responder: count what arrives
    let total_bytes_received = Arc::new(AtomicUsize::new(0));
    {
        let total_bytes_received = Arc::clone(&total_bytes_received);
        responder.on_data_channel(Box::new(move |dc| {
            println!("New DataChannel {} {}", dc.label(), dc.id());
            let total_bytes_received = Arc::clone(&total_bytes_received);
            dc.on_message(Box::new(move |msg| {
                total_bytes_received.fetch_add(msg.len(), Ordering::SeqCst);
            }));
        }));
    }

    // Requester: send as fast as the buffered amount allows
    let dc = requester.create_data_channel(
        "data",
        Some(RTCDataChannelInit {
            ordered: false,
            max_retransmits: Some(0),
            ..Default::default()
        }),
    )?;
    dc.set_buffered_amount_low_threshold(BUFFERED_AMOUNT_LOW_THRESHOLD);

    // Resume sending once the buffered amount drops below the threshold
    let (resume_tx, resume_rx) = crossbeam_channel::bounded::<()>(1);
    dc.on_buffered_amount_low(Box::new(move || {
        let _ = resume_tx.try_send(());
    }));

    {
        let sender = Arc::clone(&dc);
        let stop_rx = stop_rx.clone();
        dc.on_open(Box::new(move || {
            println!("Data channel '{}'-'{}' open.", sender.label(), sender.id());
            let sender = Arc::clone(&sender);
            let stop_rx = stop_rx.clone();
            let resume_rx = resume_rx.clone();
            thread::spawn(move || {
                let buf = Bytes::from(vec![0u8; CHUNK_SIZE]);
                loop {
                    if sender.buffered_amount() + CHUNK_SIZE > MAX_BUFFERED_AMOUNT {
                        debug!("buffered amount {} is high, pausing", sender.buffered_amount());
                        // Wait until the buffered amount drops
                        match resume_rx.recv_timeout(Duration::from_millis(100)) {
                            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    } else if let Err(err) = sender.send(&buf) {
                        error!("send: {err}");
                        return;
                    }

                    if !matches!(
                        stop_rx.try_recv(),
                        Err(crossbeam_channel::TryRecvError::Empty)
                    ) {
                        return;
                    }
                }
            });
        }));
    }

    let pumps = vec![
        requester_transport.serve(Arc::clone(&requester))?,
        responder_transport.serve(Arc::clone(&responder))?,
    ];
    requester_transport.connect()?;

    // Responder: print throughput every second
    let throughput_start = Instant::now();
    loop {
        match stop_rx.recv_timeout(Duration::from_secs(1)) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
        let total = total_bytes_received.load(Ordering::SeqCst);
        let elapsed = throughput_start.elapsed().as_secs_f64();
        let bps = (total * 8) as f64 / elapsed;
        println!(
            "Throughput: {:.03} Mbps, buffered amount: {}",
            bps / 1024f64 / 1024f64,
            dc.buffered_amount()
        );
    }
    println!("received ctrl-c signal!");

    if let Err(err) = requester.stop() {
        error!("requester stop: {err}");
    }
    if let Err(err) = responder.stop() {
        error!("responder stop: {err}");
    }
    for pump in pumps {
        let _ = pump.join();
    }

    Ok(())
}
