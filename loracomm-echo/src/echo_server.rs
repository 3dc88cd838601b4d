use anyhow::anyhow;
use log::warn;
use loracomm::device::{InboundMessage, RxClient, Transport, TxClient};
use loracomm::{LoRaComm, RadioId, SeqId};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::time::Instant;

/// A basic echo server, sending back every message it receives.
pub struct EchoServer<T: Transport> {
    pub comm: LoRaComm<T>,
    tag: u8,
    receiver: Receiver<ProtocolMessage>,
}

impl<T: Transport> EchoServer<T> {
    pub fn new(mut comm: LoRaComm<T>, tag: u8) -> anyhow::Result<Self> {
        let (sender, receiver) = sync_channel(30);
        let handler = ProtocolHandler { sender };
        comm.set_transmit_client(Box::new(handler.clone()));
        comm.register_handler(tag, handler)?;
        Ok(Self {
            comm,
            tag,
            receiver,
        })
    }

    fn echo(&mut self, radio_id: RadioId, payload: &[u8], now: Instant) {
        if let Err(err) = self.comm.send(radio_id, self.tag, true, payload, now) {
            warn!("Echo dropped: {}", err);
        }
    }

    pub fn poll(&mut self, now: Instant) -> anyhow::Result<()> {
        self.comm
            .maintain(now)
            .map_err(|err| anyhow!("Radio error!\ncause: {:?}", err))?;

        while let Ok(msg) = self.receiver.try_recv() {
            match msg {
                ProtocolMessage::TransmissionDone(seq_id) => {
                    log::debug!("Frame {} on air.", seq_id)
                }
                ProtocolMessage::ReceivedMessage(radio_id, payload, seq_id) => {
                    let text = String::from_utf8_lossy(&payload);
                    println!("Received payload (seqId: {}) for {:x}: {}", seq_id, radio_id, text);
                    self.echo(radio_id, &payload, now);
                }
                ProtocolMessage::TransmissionSuccessful(radio_id, seq_id) => {
                    println!("Echo {} acknowledged by {:x}.", seq_id, radio_id)
                }
                ProtocolMessage::TransmissionFailed(radio_id, seq_id, payload) => {
                    println!("Echo {} was not acknowledged! Rescheduling it...", seq_id);
                    self.echo(radio_id, &payload, now);
                }
            }
        }
        Ok(())
    }
}

enum ProtocolMessage {
    TransmissionDone(SeqId),
    TransmissionSuccessful(RadioId, SeqId),
    TransmissionFailed(RadioId, SeqId, Vec<u8>),
    ReceivedMessage(RadioId, Vec<u8>, SeqId),
}

#[derive(Clone)]
struct ProtocolHandler {
    sender: SyncSender<ProtocolMessage>,
}

impl TxClient for ProtocolHandler {
    fn transmission_done(&mut self, seq_id: SeqId) {
        let _ = self.sender.try_send(ProtocolMessage::TransmissionDone(seq_id));
    }

    fn transmission_successful(&mut self, radio_id: RadioId, seq_id: SeqId) {
        let _ = self
            .sender
            .try_send(ProtocolMessage::TransmissionSuccessful(radio_id, seq_id));
    }

    fn transmission_failed(&mut self, radio_id: RadioId, seq_id: SeqId, _tag: u8, payload: &[u8]) {
        let _ = self.sender.try_send(ProtocolMessage::TransmissionFailed(
            radio_id,
            seq_id,
            payload.to_vec(),
        ));
    }
}

impl RxClient for ProtocolHandler {
    fn receive(&mut self, message: &InboundMessage<'_>) {
        let _ = self.sender.try_send(ProtocolMessage::ReceivedMessage(
            message.radio_id,
            message.payload.to_vec(),
            message.seq_id,
        ));
    }
}
