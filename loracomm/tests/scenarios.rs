use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

use loracomm::device::frame::{FrameCodec, FrameFlags, FrameHeader, MAX_PACKET_SIZE};
use loracomm::device::memory::{Ether, MemoryTransport};
use loracomm::device::{InboundMessage, Transport, TxClient};
use loracomm::{CommConfig, LoRaComm, RadioId, ReceiveError, Received, SeqId};

const PHRASE: u8 = 0x5a;

#[derive(Debug, PartialEq)]
enum Event {
    Done(SeqId),
    Successful(RadioId, SeqId),
    Failed(RadioId, SeqId, u8, Vec<u8>),
}

struct Recorder(Sender<Event>);

impl TxClient for Recorder {
    fn transmission_done(&mut self, seq_id: SeqId) {
        let _ = self.0.send(Event::Done(seq_id));
    }

    fn transmission_successful(&mut self, radio_id: RadioId, seq_id: SeqId) {
        let _ = self.0.send(Event::Successful(radio_id, seq_id));
    }

    fn transmission_failed(&mut self, radio_id: RadioId, seq_id: SeqId, tag: u8, payload: &[u8]) {
        let _ = self.0.send(Event::Failed(radio_id, seq_id, tag, payload.to_vec()));
    }
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recorder(comm: &mut LoRaComm<MemoryTransport>) -> Receiver<Event> {
    let (sender, receiver) = channel();
    comm.set_transmit_client(Box::new(Recorder(sender)));
    receiver
}

fn inbox(comm: &mut LoRaComm<MemoryTransport>, tag: u8) -> Receiver<(RadioId, SeqId, Vec<u8>)> {
    let (sender, receiver) = channel();
    comm.register_handler(tag, move |msg: &InboundMessage<'_>| {
        let _ = sender.send((msg.radio_id, msg.seq_id, msg.payload.to_vec()));
    })
    .unwrap();
    receiver
}

fn drain(transport: &mut MemoryTransport) -> Vec<Vec<u8>> {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let mut packets = Vec::new();
    while let Some(info) = transport.receive(&mut buf).unwrap() {
        packets.push(buf[..info.size].to_vec());
    }
    packets
}

#[test]
fn test_acknowledged_exchange() {
    init();
    let ether = Ether::new();
    let mut gateway = LoRaComm::new(ether.attach(-65, 7.25), CommConfig::gateway().with_phrase(PHRASE));
    let mut terminal = LoRaComm::new(ether.attach(-90, 2.5), CommConfig::terminal(42).with_phrase(PHRASE));
    let events = recorder(&mut gateway);
    let messages = inbox(&mut terminal, 5);
    let now = Instant::now();

    let seq_id = gateway.send(42, 5, true, &[0x01, 0x02, 0x03], now).unwrap();
    assert_eq!(gateway.pending(), 1);
    gateway.maintain(now).unwrap();
    assert_eq!(events.try_recv(), Ok(Event::Done(seq_id)));

    terminal.maintain(now).unwrap();
    assert_eq!(messages.try_recv(), Ok((42, seq_id, vec![0x01, 0x02, 0x03])));
    assert!(messages.try_recv().is_err());
    // The ACK reply went on air within the same call.
    assert_eq!(terminal.pending(), 0);
    assert_eq!(terminal.statistics().packets_sent, 1);

    gateway.maintain(now).unwrap();
    assert_eq!(gateway.pending(), 0);
    assert_eq!(events.try_recv(), Ok(Event::Successful(42, seq_id)));
    let quality = gateway.signal_quality(42).unwrap();
    assert_eq!(quality.rssi, -65);
    assert_eq!(quality.snr, 7.25);

    // Nothing left to retransmit.
    gateway.maintain(now + Duration::from_secs(60)).unwrap();
    assert_eq!(gateway.statistics().packets_sent, 1);
}

#[test]
fn test_terminal_to_gateway_message() {
    init();
    let ether = Ether::new();
    let mut gateway = LoRaComm::new(ether.attach(-70, 5.0), CommConfig::gateway());
    let mut terminal = LoRaComm::new(ether.attach(-70, 5.0), CommConfig::terminal(0xdead_beef));
    let messages = inbox(&mut gateway, 9);
    let now = Instant::now();

    terminal.send(0xdead_beef, 9, false, b"temperature=21", now).unwrap();
    terminal.maintain(now).unwrap();
    assert_eq!(terminal.pending(), 0);
    gateway.maintain(now).unwrap();

    let (radio_id, _, payload) = messages.try_recv().unwrap();
    assert_eq!(radio_id, 0xdead_beef);
    assert_eq!(payload, b"temperature=21");
    // No ACK requested, nothing queued in return.
    assert_eq!(gateway.pending(), 0);
}

#[test]
fn test_malformed_packet_is_counted_and_dropped() {
    init();
    let ether = Ether::new();
    let mut comm = LoRaComm::new(ether.attach(0, 0.0), CommConfig::terminal(42));
    let messages = inbox(&mut comm, 1);

    comm.transport_mut().inject(&[0u8; 10], -100, -5.0);
    comm.maintain(Instant::now()).unwrap();

    assert!(messages.try_recv().is_err());
    let stats = comm.statistics();
    assert_eq!(stats.packets_received, 1);
    assert_eq!(stats.bytes_received, 10);
    assert_eq!(stats.packets_valid, 0);
    assert_eq!(comm.pending(), 0);
}

#[test]
fn test_terminals_ignore_each_other() {
    init();
    let ether = Ether::new();
    let mut alice = LoRaComm::new(ether.attach(-50, 9.0), CommConfig::terminal(1));
    let mut bob = LoRaComm::new(ether.attach(-50, 9.0), CommConfig::terminal(1));
    let messages = inbox(&mut bob, 3);
    let now = Instant::now();

    alice.send(1, 3, true, b"hello", now).unwrap();
    alice.maintain(now).unwrap();
    bob.maintain(now).unwrap();

    assert!(messages.try_recv().is_err());
    assert_eq!(bob.pending(), 0);
    assert_eq!(bob.statistics().packets_valid, 1);
    assert_eq!(bob.statistics().packets_sent, 0);
}

#[test]
fn test_retry_exhaustion() {
    init();
    let ether = Ether::new();
    let interval = Duration::from_secs(3);
    let config = CommConfig::gateway()
        .with_retry_max(3)
        .with_retry_interval(interval);
    let mut gateway = LoRaComm::new(ether.attach(0, 0.0), config);
    let mut sniffer = ether.attach(0, 0.0);
    let events = recorder(&mut gateway);
    let start = Instant::now();

    let seq_id = gateway.send(42, 7, true, b"anyone?", start).unwrap();
    for step in 0..10u32 {
        gateway.maintain(start + interval * step).unwrap();
    }

    let transmissions = drain(&mut sniffer);
    assert_eq!(transmissions.len(), 1 + 3);
    assert!(transmissions.iter().all(|packet| packet == &transmissions[0]));
    assert_eq!(gateway.pending(), 0);

    let events: Vec<Event> = events.try_iter().collect();
    assert_eq!(events.iter().filter(|event| **event == Event::Done(seq_id)).count(), 4);
    assert_eq!(
        events.last(),
        Some(&Event::Failed(42, seq_id, 7, b"anyone?".to_vec()))
    );
}

#[test]
fn test_retransmissions_wait_for_the_interval() {
    init();
    let ether = Ether::new();
    let interval = Duration::from_millis(1500);
    let config = CommConfig::gateway().with_retry_interval(interval);
    let mut gateway = LoRaComm::new(ether.attach(0, 0.0), config);
    let mut sniffer = ether.attach(0, 0.0);
    let start = Instant::now();

    gateway.send(42, 7, true, b"x", start).unwrap();
    let mut sent_at = Vec::new();
    for ms in (0..6000u64).step_by(100) {
        let now = start + Duration::from_millis(ms);
        gateway.maintain(now).unwrap();
        if !drain(&mut sniffer).is_empty() {
            sent_at.push(now);
        }
    }

    assert_eq!(sent_at.len(), 4);
    for pair in sent_at.windows(2) {
        assert!(pair[1] - pair[0] >= interval);
    }
}

#[test]
fn test_ack_clears_only_its_entry() {
    init();
    let ether = Ether::new();
    let mut gateway = LoRaComm::new(ether.attach(0, 0.0), CommConfig::gateway().with_phrase(PHRASE));
    let events = recorder(&mut gateway);
    let now = Instant::now();

    let first = gateway.send(42, 1, true, b"one", now).unwrap();
    let second = gateway.send(43, 1, true, b"two", now).unwrap();
    let third = gateway.send(44, 1, true, b"three", now).unwrap();
    assert_eq!(gateway.pending(), 3);

    let codec = FrameCodec::new(PHRASE);
    let acknowledged = FrameHeader::new(FrameFlags::REQUIRES_ACK, 1, second, 43);
    let checksum = codec.frame_checksum(&acknowledged, b"two").to_le_bytes();
    let header = FrameHeader::new(FrameFlags::TERMINAL | FrameFlags::ACK, 1, second, 43);
    let ack = codec.encode(&header, &checksum).unwrap();
    assert_eq!(
        gateway.handle_packet(&ack, -80, 1.0, now),
        Ok(Received::Acked { seq_id: second })
    );
    assert_eq!(gateway.pending(), 2);
    assert_eq!(events.try_recv(), Ok(Event::Successful(43, second)));

    // Duplicate ACK.
    assert_eq!(
        gateway.handle_packet(&ack, -80, 1.0, now),
        Ok(Received::UnmatchedAck { seq_id: second })
    );
    assert_eq!(gateway.pending(), 2);

    assert!(gateway.cancel(first));
    assert!(gateway.cancel(third));
    assert!(!gateway.cancel(third));
    assert_eq!(gateway.pending(), 0);
}

#[test]
fn test_any_bit_flip_is_rejected() {
    init();
    let ether = Ether::new();
    let mut terminal = LoRaComm::new(ether.attach(0, 0.0), CommConfig::terminal(42).with_phrase(PHRASE));
    let messages = inbox(&mut terminal, 5);
    let codec = FrameCodec::new(PHRASE);
    let frame = codec
        .encode(&FrameHeader::new(FrameFlags::empty(), 5, 1, 42), b"payload")
        .unwrap();
    let now = Instant::now();

    for byte in 0..frame.len() {
        for bit in 0..8 {
            let mut corrupted = frame.clone();
            corrupted[byte] ^= 1 << bit;
            // Reserved flag bits included.
            assert!(matches!(
                terminal.handle_packet(&corrupted, 0, 0.0, now),
                Err(ReceiveError::Frame(_))
            ));
        }
    }
    assert!(messages.try_recv().is_err());

    assert_eq!(terminal.handle_packet(&frame, 0, 0.0, now), Ok(Received::Delivered { tag: 5 }));
    assert_eq!(messages.try_recv().unwrap().2, b"payload");
}

#[test]
fn test_wrong_phrase_is_rejected() {
    init();
    let ether = Ether::new();
    let mut gateway = LoRaComm::new(ether.attach(0, 0.0), CommConfig::gateway().with_phrase(1));
    let mut terminal = LoRaComm::new(ether.attach(0, 0.0), CommConfig::terminal(42).with_phrase(2));
    let messages = inbox(&mut terminal, 5);
    let now = Instant::now();

    gateway.send(42, 5, false, b"secret", now).unwrap();
    gateway.maintain(now).unwrap();
    terminal.maintain(now).unwrap();

    assert!(messages.try_recv().is_err());
    assert_eq!(terminal.statistics().packets_received, 1);
    assert_eq!(terminal.statistics().packets_valid, 0);
}

#[test]
fn test_full_queue_pushes_back() {
    init();
    let ether = Ether::new();
    let mut gateway = LoRaComm::new(ether.attach(0, 0.0), CommConfig::gateway());
    let now = Instant::now();

    for i in 0..8u8 {
        gateway.send(42, 1, true, &[i], now).unwrap();
    }
    assert!(gateway.send(42, 1, true, b"overflow", now).is_err());

    // Fire-and-forget frames leave the queue once on air.
    let mut other = LoRaComm::new(ether.attach(0, 0.0), CommConfig::gateway());
    for i in 0..8u8 {
        other.send(42, 1, false, &[i], now).unwrap();
    }
    other.maintain(now).unwrap();
    assert_eq!(other.pending(), 7);
    assert!(other.send(42, 1, false, b"room", now).is_ok());
}
