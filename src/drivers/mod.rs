//! Drivers for KNX TP1 transceivers attached over a UART.
//!
//! Both supported chips speak a similar byte protocol: services are single
//! command bytes, telegrams are sent byte by byte with an index in the
//! command, and received telegrams arrive unframed, delimited only by an
//! idle gap on the line. The shared pieces live here:
//!
//! - [`SerialPort`] abstracts the UART (and the optional SAVE line)
//! - [`TelegramAssembler`] frames received bytes into telegrams
//! - `Link` turns port activity into device events for `NetDev`
//!
//! Byte timing (the end-of-telegram gap, response timeouts) is owned by
//! the `SerialPort` implementation.

pub mod ncn5120;
pub mod tpuart;

pub use ncn5120::Ncn5120;
pub use tpuart::Tpuart;

use crate::addressing::IndividualAddress;
use crate::error::Result;
use crate::netdev::{knx, NetDev, NetDevEvent};
use crate::netopt::{NetOpt, NetOptEnable};
use crate::telegram::{TelegramType, TELEGRAM_MAX_LEN};

/// Something observed on the receive side of a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortEvent {
    /// One received byte
    Byte(u8),
    /// The line was quiet for the end-of-telegram gap
    Idle,
    /// The SAVE line signalled a bus power failure
    Save,
}

/// UART connected to a KNX transceiver (19200 baud, 8E1).
#[allow(async_fn_in_trait, reason = "futures run on a single-threaded executor")]
pub trait SerialPort {
    /// Write all bytes.
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Wait for the next receive-side event.
    ///
    /// Must be cancel-safe. `Idle` is reported once per quiet period
    /// following at least one byte.
    async fn read(&mut self) -> PortEvent;

    /// Fill `buf` with the next received bytes.
    ///
    /// # Errors
    ///
    /// Returns a timeout error if the transceiver stops answering.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// `(byte & pattern) == pattern`
#[inline]
pub(crate) const fn matches(byte: u8, pattern: u8) -> bool {
    byte & pattern == pattern
}

/// Control byte of a state indication.
const STATE_INDICATION: u8 = 0x07;

const L_DATA_CONFIRM: u8 = 0x0B;
const CONFIRM_ACK: u8 = 0x80;

/// Consume the echo of a sent telegram and evaluate the `L_Data.con`
/// byte that follows it.
///
/// # Errors
///
/// Returns a timeout if the echo is cut short, a bad-response error if the
/// last byte is not a confirmation and a NACK error if the bus did not
/// acknowledge.
pub(crate) async fn await_confirmation<P: SerialPort>(
    port: &mut P,
    len: usize,
    crc: bool,
) -> Result<usize> {
    let expected = len + if crc { 2 } else { 0 } + 1;
    let mut last = [0u8; 1];
    for _ in 0..expected {
        port.read_exact(&mut last).await?;
    }

    let confirm = last[0];
    if confirm & !CONFIRM_ACK != L_DATA_CONFIRM {
        return Err(crate::NetError::bad_response());
    }
    if confirm & CONFIRM_ACK == 0 {
        return Err(crate::NetError::nack());
    }
    Ok(len)
}

/// CRC-16/AUG-CCITT initial value.
pub(crate) const CRC_INIT: u16 = 0x1D0F;

/// CRC-16/CCITT update (polynomial 0x1021, MSB first).
pub(crate) fn crc16_update(mut crc: u16, byte: u8) -> u16 {
    crc ^= u16::from(byte) << 8;
    for _ in 0..8 {
        crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Receiving,
    Completed,
}

/// Frames received bytes into telegrams.
///
/// A telegram starts with a recognised control byte and ends at the idle
/// gap. With CRC mode on, the two trailing CRC bytes are checked and
/// stripped, and a telegram can complete before the gap is seen. Bytes
/// that continue a completed telegram reopen it.
#[derive(Debug)]
pub struct TelegramAssembler {
    buf: heapless::Vec<u8, { TELEGRAM_MAX_LEN + 2 }>,
    state: RxState,
    min_len: usize,
    max_len: usize,
    crc_enabled: bool,
    crc: u16,
    crc_ready: bool,
    telegram_len: usize,
}

impl Default for TelegramAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramAssembler {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            state: RxState::Idle,
            min_len: 0,
            max_len: 0,
            crc_enabled: false,
            crc: CRC_INIT,
            crc_ready: false,
            telegram_len: 0,
        }
    }

    /// Forget any partial or pending telegram.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = RxState::Idle;
        self.telegram_len = 0;
    }

    /// Expect two CRC bytes after every telegram.
    pub fn set_crc(&mut self, enabled: bool) {
        self.crc_enabled = enabled;
    }

    /// Process one received byte.
    pub fn feed(&mut self, byte: u8) -> Option<NetDevEvent> {
        match self.state {
            RxState::Idle => {
                if let Some(kind) = TelegramType::from_control(byte) {
                    self.start(kind);
                    self.push(byte)
                } else if matches(byte, STATE_INDICATION) {
                    Some(NetDevEvent::State(byte))
                } else {
                    knx_log!(debug, "unexpected control byte {}", byte);
                    None
                }
            }
            RxState::Receiving => self.push(byte),
            RxState::Completed => {
                self.state = RxState::Receiving;
                self.push(byte)
            }
        }
    }

    /// Process the end-of-telegram gap.
    pub fn idle(&mut self) -> Option<NetDevEvent> {
        let event = match self.state {
            RxState::Receiving => Some(self.complete(self.buf.len())),
            RxState::Idle | RxState::Completed => None,
        };
        self.state = RxState::Idle;
        event
    }

    /// Length of the telegram waiting to be read, 0 if none.
    pub fn pending(&self) -> usize {
        self.telegram_len
    }

    /// Copy the waiting telegram into `out` and consume it.
    ///
    /// # Errors
    ///
    /// Returns buffer-too-small (and drops the telegram) if `out` is short.
    pub fn take(&mut self, out: &mut [u8]) -> Result<usize> {
        let len = core::mem::take(&mut self.telegram_len);
        let dst = out.get_mut(..len).ok_or_else(crate::NetError::buffer_too_small)?;
        dst.copy_from_slice(&self.buf[..len]);
        Ok(len)
    }

    pub fn drop_pending(&mut self) {
        self.telegram_len = 0;
    }

    fn start(&mut self, kind: TelegramType) {
        let (min, max) = kind.length_bounds();
        self.state = RxState::Receiving;
        self.buf.clear();
        self.min_len = min;
        self.max_len = max;
        self.crc = CRC_INIT;
        self.crc_ready = false;
        self.telegram_len = 0;
    }

    fn push(&mut self, byte: u8) -> Option<NetDevEvent> {
        if self.buf.push(byte).is_err() {
            knx_log!(debug, "receive buffer full, dropping byte");
            return None;
        }
        if !self.crc_enabled {
            return None;
        }

        // The CRC trails the telegram, so it covers everything but the
        // last two bytes received so far.
        let len = self.buf.len();
        if len > 2 {
            self.crc = crc16_update(self.crc, self.buf[len - 3]);
        }
        if len >= self.min_len + 2 {
            let received = u16::from_be_bytes([self.buf[len - 2], self.buf[len - 1]]);
            self.crc_ready = received == self.crc;
            if self.crc_ready {
                return Some(self.complete(len - 2));
            }
        }
        None
    }

    fn complete(&mut self, len: usize) -> NetDevEvent {
        self.state = RxState::Completed;
        if len < self.min_len || len > self.max_len || (self.crc_enabled && !self.crc_ready) {
            self.telegram_len = 0;
            return NetDevEvent::RxIncomplete;
        }
        self.telegram_len = len;
        NetDevEvent::RxComplete
    }
}

/// Receive side of a transceiver plus the outcome of its last send.
#[derive(Debug, Default)]
pub(crate) struct Link {
    pub(crate) rx: TelegramAssembler,
    tx_event: Option<NetDevEvent>,
}

impl Link {
    pub(crate) const fn new() -> Self {
        Self { rx: TelegramAssembler::new(), tx_event: None }
    }

    /// Note how a send ended; the next `wait_event` reports it.
    pub(crate) fn sent(&mut self, result: Result<usize>) -> Result<usize> {
        self.tx_event = Some(if result.is_ok() {
            NetDevEvent::TxComplete
        } else {
            NetDevEvent::TxTimeout
        });
        result
    }

    /// Cancel-safe as long as `port.read` is.
    pub(crate) async fn wait_event<P: SerialPort>(&mut self, port: &mut P) -> NetDevEvent {
        if let Some(event) = self.tx_event.take() {
            return event;
        }
        loop {
            let event = match port.read().await {
                PortEvent::Byte(byte) => self.rx.feed(byte),
                PortEvent::Idle => self.rx.idle(),
                PortEvent::Save => Some(NetDevEvent::Save),
            };
            if let Some(event) = event {
                return event;
            }
        }
    }
}

/// Options a transceiver answers from its cached state, the rest go to
/// the class fallback.
pub(crate) fn get_cached<D: NetDev>(
    dev: &D,
    opt: NetOpt,
    value: &mut [u8],
    address: IndividualAddress,
    busy: bool,
    crc: bool,
) -> Result<usize> {
    match opt {
        NetOpt::Address => address.encode(value),
        NetOpt::PhyBusy => NetOptEnable::from(busy).encode(value),
        NetOpt::Checksum => NetOptEnable::from(crc).encode(value),
        _ => knx::get(dev, opt, value),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::update_checksum;

    fn group_write() -> [u8; 9] {
        let mut t = [0xBC, 0x11, 0x05, 0x0A, 0x03, 0xE1, 0x00, 0x81, 0x00];
        update_checksum(&mut t);
        t
    }

    fn feed_all(rx: &mut TelegramAssembler, bytes: &[u8]) -> Vec<NetDevEvent> {
        bytes.iter().filter_map(|&b| rx.feed(b)).collect()
    }

    #[test]
    fn test_crc_check_value() {
        let crc = b"123456789".iter().fold(CRC_INIT, |crc, &b| crc16_update(crc, b));
        assert_eq!(crc, 0xE5CC);
    }

    #[test]
    fn test_completes_on_idle() {
        let mut rx = TelegramAssembler::new();
        let telegram = group_write();
        assert!(feed_all(&mut rx, &telegram).is_empty());
        assert_eq!(rx.pending(), 0);

        assert_eq!(rx.idle(), Some(NetDevEvent::RxComplete));
        assert_eq!(rx.pending(), telegram.len());

        let mut out = [0u8; 32];
        assert_eq!(rx.take(&mut out).unwrap(), telegram.len());
        assert_eq!(&out[..telegram.len()], &telegram);
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn test_short_telegram_is_incomplete() {
        let mut rx = TelegramAssembler::new();
        feed_all(&mut rx, &[0xBC, 0x11, 0x05]);
        assert_eq!(rx.idle(), Some(NetDevEvent::RxIncomplete));
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn test_state_indication_and_noise() {
        let mut rx = TelegramAssembler::new();
        assert_eq!(rx.feed(0x07), Some(NetDevEvent::State(0x07)));
        assert_eq!(rx.feed(0x0B), None);
        assert_eq!(rx.idle(), None);
    }

    #[test]
    fn test_crc_mode_completes_early_and_strips_crc() {
        let mut rx = TelegramAssembler::new();
        rx.set_crc(true);

        let telegram = group_write();
        let crc = telegram.iter().fold(CRC_INIT, |crc, &b| crc16_update(crc, b));
        let mut wire = telegram.to_vec();
        wire.extend_from_slice(&crc.to_be_bytes());

        let events = feed_all(&mut rx, &wire);
        assert_eq!(events.last(), Some(&NetDevEvent::RxComplete));
        assert_eq!(rx.pending(), telegram.len());
        assert_eq!(rx.idle(), None);
    }

    #[test]
    fn test_crc_mode_bad_crc_is_incomplete() {
        let mut rx = TelegramAssembler::new();
        rx.set_crc(true);

        let mut wire = group_write().to_vec();
        wire.extend_from_slice(&[0x00, 0x00]);
        feed_all(&mut rx, &wire);
        assert_eq!(rx.idle(), Some(NetDevEvent::RxIncomplete));
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn test_link_reports_send_outcome_first() {
        let mut link = Link::new();
        let mut port = test_port::ScriptedPort::default();
        port.receive(&group_write());

        assert_eq!(link.sent(Ok(9)).unwrap(), 9);
        let event = embassy_futures::block_on(link.wait_event(&mut port));
        assert_eq!(event, NetDevEvent::TxComplete);
        let event = embassy_futures::block_on(link.wait_event(&mut port));
        assert_eq!(event, NetDevEvent::RxComplete);
        assert_eq!(link.rx.pending(), 9);

        assert!(link.sent(Err(crate::NetError::nack())).is_err());
        let event = embassy_futures::block_on(link.wait_event(&mut port));
        assert_eq!(event, NetDevEvent::TxTimeout);
    }

    #[test]
    fn test_take_too_small_drops() {
        let mut rx = TelegramAssembler::new();
        feed_all(&mut rx, &group_write());
        rx.idle();

        let mut small = [0u8; 4];
        assert!(rx.take(&mut small).is_err());
        assert_eq!(rx.pending(), 0);
    }
}
