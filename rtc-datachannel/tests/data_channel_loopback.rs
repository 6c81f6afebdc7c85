use bytes::Bytes;
use rtc_datachannel::data_channel::RTCDataChannel;
use rtc_datachannel::data_channel::init::RTCDataChannelInit;
use rtc_datachannel::data_channel::state::RTCDataChannelState;
use rtc_datachannel::dtls_role::RTCDtlsRole;
use rtc_datachannel::sctp_transport::RTCSctpTransport;
use rtc_datachannel::setting_engine::SettingEngine;
use rtc_datachannel::transport::loopback::LoopbackTransport;
use shared::error::{Error, Result};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Two registries talking over a loopback transport, one pump thread each.
struct PeerPair {
    offer: Arc<RTCSctpTransport>,
    answer: Arc<RTCSctpTransport>,
    offer_transport: Arc<LoopbackTransport>,
    pumps: Vec<JoinHandle<()>>,
}

impl PeerPair {
    fn new(setting_engine: SettingEngine) -> Result<Self> {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .is_test(true)
            .try_init()
            .ok();

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

        let pumps = vec![
            offer_transport.serve(Arc::clone(&offer))?,
            answer_transport.serve(Arc::clone(&answer))?,
        ];

        Ok(Self {
            offer,
            answer,
            offer_transport,
            pumps,
        })
    }

    fn connect(&self) -> Result<()> {
        self.offer_transport.connect()
    }

    fn close(self) -> Result<()> {
        self.offer.stop()?;
        self.answer.stop()?;
        for pump in self.pumps {
            pump.join()
                .map_err(|_| Error::Other("pump thread panicked".to_owned()))?;
        }
        Ok(())
    }
}

fn signal() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel()
}

/// Polls until dc reaches state; the pump threads finish closing on their own.
fn wait_for_state(dc: &RTCDataChannel, state: RTCDataChannelState) -> Result<()> {
    let deadline = Instant::now() + TIMEOUT;
    while dc.ready_state() != state {
        if Instant::now() > deadline {
            return Err(Error::Other(format!(
                "data channel {} stuck in {}, expected {}",
                dc.id(),
                dc.ready_state(),
                state
            )));
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

#[test]
fn test_data_channel_eof_detach() -> Result<()> {
    let mut setting_engine = SettingEngine::default();
    setting_engine.detach_data_channels();
    let pair = PeerPair::new(setting_engine)?;

    let label = "test-channel";
    let test_data = Bytes::from_static(b"this is some test data");

    let (dcb_tx, dcb_rx) = mpsc::channel::<Arc<RTCDataChannel>>();
    pair.answer.on_data_channel(Box::new(move |dc| {
        if dc.label() != label {
            return;
        }
        let tx = dcb_tx.clone();
        let opened = Arc::clone(&dc);
        dc.on_open(Box::new(move || {
            let _ = tx.send(Arc::clone(&opened));
        }));
    }));

    let dca = pair.offer.create_data_channel(label, None)?;
    let (open_tx, open_rx) = signal();
    dca.on_open(Box::new(move || {
        let _ = open_tx.send(());
    }));

    pair.connect()?;

    let writer = {
        let dca = Arc::clone(&dca);
        let test_data = test_data.clone();
        thread::spawn(move || -> Result<Vec<u8>> {
            open_rx
                .recv_timeout(TIMEOUT)
                .map_err(|err| Error::Other(err.to_string()))?;
            let detached = dca.detach()?;
            detached.write_data_channel(&test_data)?;
            detached.close()?;

            // our own end of stream, nothing arrives after close
            let mut data = vec![];
            (&detached).read_to_end(&mut data)?;
            Ok(data)
        })
    };

    let dcb = dcb_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    let detached = dcb.detach()?;
    let mut data = vec![];
    (&detached).read_to_end(&mut data)?;
    assert_eq!(data, test_data.to_vec());
    detached.close()?;

    let own = writer
        .join()
        .map_err(|_| Error::Other("writer panicked".to_owned()))??;
    assert!(own.is_empty());
    wait_for_state(&dca, RTCDataChannelState::Closed)?;

    pair.close()
}

#[test]
fn test_data_channel_eof_no_detach() -> Result<()> {
    let pair = PeerPair::new(SettingEngine::default())?;

    let label = "test-channel";
    let test_data = Bytes::from_static(b"this is some test data");

    let (message_tx, message_rx) = mpsc::channel::<Bytes>();
    let (dcb_closed_tx, dcb_closed_rx) = signal();
    pair.answer.on_data_channel(Box::new(move |dc| {
        if dc.label() != label {
            return;
        }
        let message_tx = message_tx.clone();
        dc.on_message(Box::new(move |msg| {
            let _ = message_tx.send(msg.data);
        }));
        let dcb_closed_tx = dcb_closed_tx.clone();
        dc.on_close(Box::new(move || {
            let _ = dcb_closed_tx.send(());
        }));
    }));

    let dca = pair.offer.create_data_channel(label, None)?;
    {
        let dc = Arc::clone(&dca);
        let test_data = test_data.clone();
        dca.on_open(Box::new(move || {
            if let Err(err) = dc.send(&test_data) {
                log::error!("send: {err}");
            }
            if let Err(err) = dc.close() {
                log::error!("close: {err}");
            }
        }));
    }
    let (dca_closed_tx, dca_closed_rx) = signal();
    dca.on_close(Box::new(move || {
        let _ = dca_closed_tx.send(());
    }));

    pair.connect()?;

    dca_closed_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    dcb_closed_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;

    let received: Vec<Bytes> = message_rx.try_iter().collect();
    assert_eq!(received, vec![test_data]);
    assert_eq!(dca.ready_state(), RTCDataChannelState::Closed);

    pair.close()
}

fn run_buffered_amount_test(threshold_before_open: bool) -> Result<()> {
    const MESSAGES: usize = 10;
    const MESSAGE_SIZE: usize = 1000;
    const THRESHOLD: usize = 1500;

    let pair = PeerPair::new(SettingEngine::default())?;

    let (received_tx, received_rx) = signal();
    pair.answer.on_data_channel(Box::new(move |dc| {
        let received_tx = received_tx.clone();
        let mut n = 0;
        dc.on_message(Box::new(move |msg| {
            assert_eq!(msg.len(), MESSAGE_SIZE);
            n += 1;
            if n == MESSAGES {
                let _ = received_tx.send(());
            }
        }));
    }));

    let dca = pair.offer.create_data_channel("buffered", None)?;
    let low_count = Arc::new(AtomicUsize::new(0));
    let (low_tx, low_rx) = signal();
    let on_low = {
        let low_count = Arc::clone(&low_count);
        move || {
            low_count.fetch_add(1, Ordering::SeqCst);
            let _ = low_tx.send(());
        }
    };

    if threshold_before_open {
        dca.set_buffered_amount_low_threshold(THRESHOLD);
        dca.on_buffered_amount_low(Box::new(on_low));
        let dc = Arc::clone(&dca);
        dca.on_open(Box::new(move || {
            for _ in 0..MESSAGES {
                if let Err(err) = dc.send(&Bytes::from(vec![0u8; MESSAGE_SIZE])) {
                    log::error!("send: {err}");
                }
            }
        }));
    } else {
        let dc = Arc::clone(&dca);
        let mut on_low = Some(on_low);
        dca.on_open(Box::new(move || {
            dc.set_buffered_amount_low_threshold(THRESHOLD);
            if let Some(on_low) = on_low.take() {
                dc.on_buffered_amount_low(Box::new(on_low));
            }
            for _ in 0..MESSAGES {
                if let Err(err) = dc.send(&Bytes::from(vec![0u8; MESSAGE_SIZE])) {
                    log::error!("send: {err}");
                }
            }
        }));
    }

    pair.connect()?;

    received_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    low_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;

    assert_eq!(low_count.load(Ordering::SeqCst), 1);
    assert_eq!(dca.buffered_amount(), 0);
    assert_eq!(dca.messages_sent(), MESSAGES);
    assert_eq!(dca.bytes_sent(), MESSAGES * MESSAGE_SIZE);

    pair.close()
}

#[test]
fn test_data_channel_buffered_amount_threshold_set_before_open() -> Result<()> {
    run_buffered_amount_test(true)
}

#[test]
fn test_data_channel_buffered_amount_threshold_set_after_open() -> Result<()> {
    run_buffered_amount_test(false)
}

#[test]
fn test_negotiated_data_channel() -> Result<()> {
    let pair = PeerPair::new(SettingEngine::default())?;
    let announced = Arc::new(AtomicUsize::new(0));
    {
        let announced = Arc::clone(&announced);
        pair.answer.on_data_channel(Box::new(move |_| {
            announced.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let init = || RTCDataChannelInit {
        negotiated: Some(42),
        ..Default::default()
    };
    let dca = pair.offer.create_data_channel("negotiated", Some(init()))?;
    let dcb = pair.answer.create_data_channel("negotiated", Some(init()))?;

    let (message_tx, message_rx) = mpsc::channel::<String>();
    dcb.on_message(Box::new(move |msg| {
        let _ = message_tx.send(String::from_utf8_lossy(&msg.data).into_owned());
    }));
    let (open_tx, open_rx) = signal();
    dcb.on_open(Box::new(move || {
        let _ = open_tx.send(());
    }));
    {
        let dc = Arc::clone(&dca);
        dca.on_open(Box::new(move || {
            if let Err(err) = dc.send_text("ping") {
                log::error!("send: {err}");
            }
        }));
    }

    pair.connect()?;

    open_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    let message = message_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    assert_eq!(message, "ping");
    assert_eq!(dca.id(), 42);
    assert_eq!(dcb.id(), 42);
    assert_eq!(announced.load(Ordering::SeqCst), 0);

    pair.close()
}

#[test]
fn test_stop_closes_remote_channels() -> Result<()> {
    let pair = PeerPair::new(SettingEngine::default())?;

    let (dcb_closed_tx, dcb_closed_rx) = signal();
    pair.answer.on_data_channel(Box::new(move |dc| {
        let dcb_closed_tx = dcb_closed_tx.clone();
        dc.on_close(Box::new(move || {
            let _ = dcb_closed_tx.send(());
        }));
    }));

    let dca = pair.offer.create_data_channel("short-lived", None)?;
    let (open_tx, open_rx) = signal();
    dca.on_open(Box::new(move || {
        let _ = open_tx.send(());
    }));
    pair.connect()?;
    open_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;

    pair.offer.stop()?;
    dcb_closed_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    assert_eq!(dca.ready_state(), RTCDataChannelState::Closed);

    pair.close()
}

#[test]
fn test_closed_identifier_is_reused_after_release() -> Result<()> {
    let pair = PeerPair::new(SettingEngine::default())?;

    let (remote_tx, remote_rx) = mpsc::channel::<Arc<RTCDataChannel>>();
    pair.answer.on_data_channel(Box::new(move |dc| {
        let _ = remote_tx.send(dc);
    }));

    let first = pair.offer.create_data_channel("first", None)?;
    let (open_tx, open_rx) = signal();
    first.on_open(Box::new(move || {
        let _ = open_tx.send(());
    }));
    let (closed_tx, closed_rx) = signal();
    first.on_close(Box::new(move || {
        let _ = closed_tx.send(());
    }));

    pair.connect()?;
    open_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    let remote_first = remote_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;

    first.close()?;
    closed_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    wait_for_state(&remote_first, RTCDataChannelState::Closed)?;

    let second = pair.offer.create_data_channel("second", None)?;
    assert_eq!(second.id(), first.id());
    wait_for_state(&second, RTCDataChannelState::Open)?;
    let remote_second = remote_rx
        .recv_timeout(TIMEOUT)
        .map_err(|err| Error::Other(err.to_string()))?;
    assert_eq!(remote_second.label(), "second");

    // nothing left over from the first channel reaches the second
    thread::sleep(Duration::from_millis(100));
    assert_eq!(second.ready_state(), RTCDataChannelState::Open);
    assert_eq!(remote_second.ready_state(), RTCDataChannelState::Open);
    assert_eq!(pair.offer.data_channels_len(), 1);
    assert_eq!(pair.answer.data_channels_len(), 1);

    pair.close()
}
