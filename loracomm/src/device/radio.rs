use radio::{RadioState, Receive, ReceiveInfo, State, Transmit};
use std::fmt::Debug;
use std::marker::PhantomData;

use log::{debug, trace};

use super::device::{PacketInfo, Transport};
use super::frame::MAX_PACKET_SIZE;

/// Radio physical device representation.
///
/// Any driver implementing the radio-hal traits can be used, the adapter only needs to
/// start transmissions, poll for received packets and switch between idle and sleep.
pub trait Radio<E>: Transmit<Error = E> + Receive<Error = E> + State<Error = E> {}

impl<E, T> Radio<E> for T where T: Transmit<Error = E> + Receive<Error = E> + State<Error = E> {}

/// Extracts the signal to noise ratio of a received packet.
///
/// radio-hal only exposes the RSSI, drivers with richer packet info can provide their own.
pub type SnrExtractor<T> = fn(&<T as Receive>::Info) -> f32;

fn no_snr<I>(_info: &I) -> f32 {
    0.0
}

/// [Transport] implementation on top of a radio-hal driver.
///
/// It never blocks: a send starts the transmission and returns, the following polls check
/// the end of the transmission and put the radio back in reception.
pub struct RadioTransport<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    radio: T,
    snr: SnrExtractor<T>,
    enabled: bool,
    transmitting: bool,
    phantom: PhantomData<E>,
}

impl<T, E> RadioTransport<T, E>
where
    T: Radio<E>,
    <T as Receive>::Info: ReceiveInfo,
    E: Debug,
{
    /// Wraps a driver, reporting a SNR of 0 dB for every packet.
    pub fn new(radio: T) -> Result<Self, RadioError<E>> {
        Self::with_snr(radio, no_snr::<<T as Receive>::Info>)
    }

    /// Wraps a driver, using `snr` to read the SNR from its packet info.
    ///
    /// The radio is enabled and listening once built.
    pub fn with_snr(radio: T, snr: SnrExtractor<T>) -> Result<Self, RadioError<E>> {
        let mut transport = Self {
            radio,
            snr,
            enabled: false,
            transmitting: false,
            phantom: PhantomData,
        };
        transport.enable()?;
        Ok(transport)
    }

    /// Releases the underlying driver.
    pub fn free(self) -> T {
        self.radio
    }

    /// Returns true once the pending transmission (if any) is over and the radio listens again.
    fn finish_transmission(&mut self) -> Result<bool, RadioError<E>> {
        if !self.transmitting {
            return Ok(true);
        }
        if !self
            .radio
            .check_transmit()
            .map_err(RadioError::InternalRadioError)?
        {
            return Ok(false);
        }
        trace!("Transmission done, back to reception.");
        self.transmitting = false;
        self.radio
            .start_receive()
            .map_err(RadioError::InternalRadioError)?;
        Ok(true)
    }
}

impl<T, E> Transport for RadioTransport<T, E>
where
    T: Radio<E>,
    <T as Receive>::Info: ReceiveInfo,
    E: Debug,
{
    type Error = RadioError<E>;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        if !self.enabled {
            return Err(RadioError::Disabled);
        }
        if !self.finish_transmission()? {
            return Err(RadioError::BusyDevice);
        }
        let len = packet.len().min(MAX_PACKET_SIZE);
        self.radio
            .start_transmit(&packet[..len])
            .map_err(RadioError::InternalRadioError)?;
        self.transmitting = true;
        trace!("Transmission of {} bytes started.", len);
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, Self::Error> {
        Ok(self.enabled && !self.finish_transmission()?)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<PacketInfo>, Self::Error> {
        if !self.enabled || !self.finish_transmission()? {
            return Ok(None);
        }
        if !self
            .radio
            .check_receive(true)
            .map_err(RadioError::InternalRadioError)?
        {
            return Ok(None);
        }
        let (size, info) = self
            .radio
            .get_received(buf)
            .map_err(RadioError::InternalRadioError)?;
        if size == 0 {
            trace!("Packet ignored: size == 0");
            return Ok(None);
        }
        Ok(Some(PacketInfo {
            size: size.min(buf.len()),
            rssi: info.rssi(),
            snr: (self.snr)(&info),
        }))
    }

    fn enable(&mut self) -> Result<(), Self::Error> {
        self.radio
            .set_state(<<T as State>::State as RadioState>::idle())
            .map_err(RadioError::InternalRadioError)?;
        self.radio
            .start_receive()
            .map_err(RadioError::InternalRadioError)?;
        self.enabled = true;
        self.transmitting = false;
        debug!("Radio enabled.");
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.radio
            .set_state(<<T as State>::State as RadioState>::sleep())
            .map_err(RadioError::InternalRadioError)?;
        self.enabled = false;
        self.transmitting = false;
        debug!("Radio asleep.");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RadioError<R>
where
    R: Debug,
{
    #[error("Busy device, previous transmission still on air.")]
    BusyDevice,

    #[error("Radio is asleep.")]
    Disabled,

    #[error("Internal radio error: {:?}", .0)]
    InternalRadioError(R),
}
