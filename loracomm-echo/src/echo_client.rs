use anyhow::anyhow;
use log::warn;
use loracomm::device::{InboundMessage, RxClient, Transport, TxClient};
use loracomm::send_queue::QueueError;
use loracomm::{LoRaComm, RadioId, SeqId};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::time::{Duration, Instant};

const SEND_PERIOD: Duration = Duration::from_secs(10);

/// A basic echo client, sending its messages to one Terminal and waiting for them back.
pub struct EchoClient<T: Transport> {
    pub comm: LoRaComm<T>,
    pub messages: Vec<Vec<u8>>,
    recipient: RadioId,
    tag: u8,
    awaiting: usize,
    last_send: Option<Instant>,
    receiver: Receiver<ProtocolMessage>,
}

impl<T: Transport> EchoClient<T> {
    pub fn new(
        mut comm: LoRaComm<T>,
        recipient: RadioId,
        tag: u8,
        msgs: Vec<Vec<u8>>,
    ) -> anyhow::Result<Self> {
        let (sender, receiver) = sync_channel(30);
        let handler = ProtocolHandler { sender };
        comm.set_transmit_client(Box::new(handler.clone()));
        comm.register_handler(tag, handler)?;
        Ok(Self {
            comm,
            messages: msgs,
            recipient,
            tag,
            awaiting: 0,
            last_send: None,
            receiver,
        })
    }

    /// Every message has been sent and echoed (or lost).
    pub fn is_done(&self) -> bool {
        self.messages.is_empty() && self.awaiting == 0 && self.comm.pending() == 0
    }

    pub fn poll(&mut self, now: Instant) -> anyhow::Result<()> {
        let due = self
            .last_send
            .map_or(true, |at| now.duration_since(at) >= SEND_PERIOD);
        if due {
            if let Some(msg) = self.messages.pop() {
                self.last_send = Some(now);
                match self.comm.send(self.recipient, self.tag, true, &msg, now) {
                    Ok(seq_id) => {
                        self.awaiting += 1;
                        let txt = String::from_utf8_lossy(&msg);
                        println!("Sending message (seqId: {}): {}", seq_id, txt);
                    }
                    Err(QueueError::QueueFull) => {
                        warn!("Queue full, message postponed.");
                        self.messages.push(msg);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        self.comm
            .maintain(now)
            .map_err(|err| anyhow!("Radio error!\ncause: {:?}", err))?;

        while let Ok(msg) = self.receiver.try_recv() {
            match msg {
                ProtocolMessage::TransmissionDone(seq_id) => {
                    log::debug!("Frame {} on air.", seq_id)
                }
                ProtocolMessage::TransmissionSuccessful(recipient, seq_id) => println!(
                    "Recipient {:x} successfully received our message (seqId: {})!",
                    recipient, seq_id
                ),
                ProtocolMessage::TransmissionFailed(recipient, seq_id) => {
                    println!(
                        "Recipient {:x} did not receive our message (seqId: {}), giving up.",
                        recipient, seq_id
                    );
                    self.awaiting = self.awaiting.saturating_sub(1);
                }
                ProtocolMessage::ReceivedMessage(sender, payload, seq_id) => {
                    let text = String::from_utf8_lossy(&payload);
                    println!("Received echo (seqId: {}) from {:x}: {}", seq_id, sender, text);
                    self.awaiting = self.awaiting.saturating_sub(1);
                }
            }
        }
        Ok(())
    }
}

enum ProtocolMessage {
    TransmissionDone(SeqId),
    TransmissionSuccessful(RadioId, SeqId),
    TransmissionFailed(RadioId, SeqId),
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

    fn transmission_successful(&mut self, recipient: RadioId, seq_id: SeqId) {
        let _ = self
            .sender
            .try_send(ProtocolMessage::TransmissionSuccessful(recipient, seq_id));
    }

    fn transmission_failed(&mut self, recipient: RadioId, seq_id: SeqId, _tag: u8, _payload: &[u8]) {
        let _ = self
            .sender
            .try_send(ProtocolMessage::TransmissionFailed(recipient, seq_id));
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
