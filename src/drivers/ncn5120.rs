//! onsemi NCN5120 transceiver.
//!
//! Byte protocol close to the TPUART, with three differences that matter
//! here: every service request answers with an indication, telegrams up to
//! 263 bytes are supported by prefixing `U_L_DataOffset` whenever bits 6..8
//! of the byte index change, and CRC mode is part of the configuration and
//! can be switched off again.

use crate::addressing::IndividualAddress;
use crate::drivers::{await_confirmation, get_cached, matches, Link, SerialPort};
use crate::error::{NetError, Result};
use crate::netdev::{knx, NetDev, NetDevEvent};
use crate::netopt::{NetOpt, NetOptEnable};
use crate::telegram::TELEGRAM_MAX_LEN;

const U_RESET_REQUEST: u8 = 0x01;
const U_RESET_INDICATION: u8 = 0x03;
const U_STATE_REQUEST: u8 = 0x02;
const U_STATE_INDICATION: u8 = 0x07;
const U_QUIT_BUSY_REQUEST: u8 = 0x04;
const U_BUSMON_REQUEST: u8 = 0x05;
const U_SYSTEM_STATE_REQUEST: u8 = 0x0D;
const U_SYSTEM_STATE_INDICATION: u8 = 0x4B;
const U_STOP_MODE_REQUEST: u8 = 0x0E;
const U_STOP_MODE_INDICATION: u8 = 0x2B;
const U_EXIT_STOP_MODE_REQUEST: u8 = 0x0F;
const U_CONFIGURE_REQUEST: u8 = 0x18;
const U_CONFIGURE_INDICATION: u8 = 0x01;
const U_SET_BUSY_REQUEST: u8 = 0x21;
const U_INT_REG_WR_REQUEST: u8 = 0x28;
const U_INT_REG_RD_REQUEST: u8 = 0x38;
const U_SET_ADDRESS_REQUEST: u8 = 0xF1;
const U_SET_REPETITION_REQUEST: u8 = 0xF2;
const U_L_DATA_OFFSET: u8 = 0x08;
const U_L_DATA_CONTINUE: u8 = 0x80;
const U_L_DATA_END: u8 = 0x40;

/// Configuration bits for [`Ncn5120::configure`].
pub mod configure {
    pub const NONE: u8 = 0x00;
    pub const FRAME_END_MARKER: u8 = 0x01;
    pub const CRC_CCITT: u8 = 0x02;
    pub const AUTO_POLLING: u8 = 0x04;
}

/// Internal register addresses.
pub mod register {
    pub const EXT_WATCHDOG_CTRL: u8 = 0x00;
    pub const ANA_CTRL0: u8 = 0x01;
    pub const ANA_CTRL1: u8 = 0x02;
    pub const ANA_STAT: u8 = 0x03;
}

/// NCN5120 driver over a [`SerialPort`].
#[derive(Debug)]
pub struct Ncn5120<P> {
    port: P,
    link: Link,
    address: IndividualAddress,
    crc: bool,
    monitoring: bool,
    busy: bool,
    stopped: bool,
}

impl<P: SerialPort> Ncn5120<P> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            link: Link::new(),
            address: IndividualAddress::from_raw(0),
            crc: false,
            monitoring: false,
            busy: false,
            stopped: false,
        }
    }

    async fn request(&mut self, out: &[u8], response: &mut [u8]) -> Result<()> {
        self.port.write(out).await?;
        if !response.is_empty() {
            self.port.read_exact(response).await?;
        }
        Ok(())
    }

    /// Write a one-byte request and check the indication it answers with.
    async fn command(&mut self, service: u8, indication: u8) -> Result<u8> {
        let mut response = [0u8; 1];
        self.request(&[service], &mut response).await?;
        if !matches(response[0], indication) {
            return Err(NetError::bad_response());
        }
        Ok(response[0])
    }

    /// Reset the transceiver and forget all mode state.
    pub async fn reset(&mut self) -> Result<()> {
        self.command(U_RESET_REQUEST, U_RESET_INDICATION).await?;
        self.address = IndividualAddress::from_raw(0);
        self.crc = false;
        self.monitoring = false;
        self.busy = false;
        self.stopped = false;
        self.link.rx.reset();
        self.link.rx.set_crc(false);
        Ok(())
    }

    pub async fn state(&mut self) -> Result<u8> {
        self.command(U_STATE_REQUEST, U_STATE_INDICATION).await
    }

    pub async fn system_state(&mut self) -> Result<u8> {
        let mut response = [0u8; 2];
        self.request(&[U_SYSTEM_STATE_REQUEST], &mut response).await?;
        if response[0] != U_SYSTEM_STATE_INDICATION {
            return Err(NetError::bad_response());
        }
        Ok(response[1])
    }

    /// Apply [`configure`] bits (at most 0x07).
    pub async fn configure(&mut self, opts: u8) -> Result<()> {
        if opts > 0x07 {
            return Err(NetError::invalid_value());
        }
        self.command(U_CONFIGURE_REQUEST | opts, U_CONFIGURE_INDICATION).await?;
        self.crc = opts & configure::CRC_CCITT != 0;
        self.link.rx.set_crc(self.crc);
        Ok(())
    }

    pub async fn set_address(&mut self, address: IndividualAddress) -> Result<()> {
        let [hi, lo] = address.to_bytes();
        let mut response = [0u8; 1];
        self.request(&[U_SET_ADDRESS_REQUEST, hi, lo, 0x00], &mut response).await?;
        if !matches(response[0], U_CONFIGURE_INDICATION) {
            return Err(NetError::bad_response());
        }
        self.address = address;
        Ok(())
    }

    pub async fn set_busy_mode(&mut self, busy: bool) -> Result<()> {
        let service = if busy { U_SET_BUSY_REQUEST } else { U_QUIT_BUSY_REQUEST };
        self.request(&[service], &mut []).await?;
        self.busy = busy;
        Ok(())
    }

    pub async fn busmon(&mut self) -> Result<()> {
        self.request(&[U_BUSMON_REQUEST], &mut []).await?;
        self.monitoring = true;
        Ok(())
    }

    /// Stop talking to the bus until [`exit_stop_mode`](Self::exit_stop_mode).
    pub async fn stop_mode(&mut self) -> Result<()> {
        self.command(U_STOP_MODE_REQUEST, U_STOP_MODE_INDICATION).await?;
        self.stopped = true;
        Ok(())
    }

    pub async fn exit_stop_mode(&mut self) -> Result<()> {
        self.command(U_EXIT_STOP_MODE_REQUEST, U_RESET_INDICATION).await?;
        self.stopped = false;
        Ok(())
    }

    /// Set the repetition counts after BUSY and NACK (0-7 each).
    pub async fn set_repetition(&mut self, busy_count: u8, nack_count: u8) -> Result<()> {
        if busy_count > 7 || nack_count > 7 {
            return Err(NetError::invalid_value());
        }
        let counts = (busy_count << 5) | nack_count;
        self.request(&[U_SET_REPETITION_REQUEST, counts, 0x00, 0x00], &mut []).await
    }

    /// Write one of the [`register`]s.
    pub async fn reg_write(&mut self, addr: u8, value: u8) -> Result<()> {
        if addr > register::ANA_STAT {
            return Err(NetError::invalid_value());
        }
        self.request(&[U_INT_REG_WR_REQUEST | addr, value], &mut []).await
    }

    pub async fn reg_read(&mut self, addr: u8) -> Result<u8> {
        if addr > register::ANA_STAT {
            return Err(NetError::invalid_value());
        }
        let mut response = [0u8; 1];
        self.request(&[U_INT_REG_RD_REQUEST | addr], &mut response).await?;
        Ok(response[0])
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    async fn transmit(&mut self, telegram: &[u8]) -> Result<usize> {
        if telegram.is_empty() || telegram.len() > TELEGRAM_MAX_LEN {
            return Err(NetError::invalid_length());
        }

        let mut offset = 0u8;
        let last = telegram.len() - 1;
        for (i, &byte) in telegram.iter().enumerate() {
            let block = ((i >> 6) & 0x07) as u8;
            if block != offset {
                offset = block;
                self.port.write(&[U_L_DATA_OFFSET | offset]).await?;
            }
            let service = if i == last { U_L_DATA_END } else { U_L_DATA_CONTINUE };
            self.port.write(&[service | (i & 0x3F) as u8, byte]).await?;
        }

        await_confirmation(&mut self.port, telegram.len(), self.crc).await
    }
}

impl<P: SerialPort> NetDev for Ncn5120<P> {
    const CLASS: &'static str = "ncn5120";

    async fn init(&mut self) -> Result<()> {
        self.reset().await
    }

    async fn send(&mut self, telegram: &[u8]) -> Result<usize> {
        let result = self.transmit(telegram).await;
        self.link.sent(result)
    }

    async fn wait_event(&mut self) -> NetDevEvent {
        self.link.wait_event(&mut self.port).await
    }

    fn pending(&self) -> usize {
        self.link.rx.pending()
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.link.rx.take(buf)
    }

    fn drop_pending(&mut self) {
        self.link.rx.drop_pending();
    }

    async fn get(&mut self, opt: NetOpt, value: &mut [u8]) -> Result<usize> {
        get_cached(&*self, opt, value, self.address, self.busy, self.crc)
    }

    async fn set(&mut self, opt: NetOpt, value: &[u8]) -> Result<usize> {
        match opt {
            NetOpt::Address => {
                let address = IndividualAddress::from_option(value)?;
                self.set_address(address).await?;
                Ok(IndividualAddress::LEN)
            }
            NetOpt::PhyBusy => {
                let busy = NetOptEnable::from_option(value)?;
                self.set_busy_mode(busy.is_enabled()).await?;
                Ok(NetOptEnable::LEN)
            }
            NetOpt::Checksum => {
                let opts = match NetOptEnable::from_option(value)? {
                    NetOptEnable::Enable => configure::CRC_CCITT,
                    NetOptEnable::Disable => configure::NONE,
                };
                self.configure(opts).await?;
                Ok(NetOptEnable::LEN)
            }
            _ => knx::set(&*self, opt, value),
        }
    }
}
