//! Siemens TPUART / TPUART2 transceiver.
//!
//! Telegrams of at most 64 bytes are sent as `U_L_DataContinue` /
//! `U_L_DataEnd` pairs. The TPUART echoes the telegram back and then sends
//! an `L_Data.con` byte whose top bit is the bus acknowledgement.

use crate::addressing::IndividualAddress;
use crate::drivers::{await_confirmation, get_cached, matches, Link, SerialPort};
use crate::error::{NetError, Result};
use crate::netdev::{knx, NetDev, NetDevEvent};
use crate::netopt::{NetOpt, NetOptEnable};

const U_RESET_REQUEST: u8 = 0x01;
const U_RESET_RESPONSE: u8 = 0x03;
const U_STATE_REQUEST: u8 = 0x02;
const U_STATE_RESPONSE: u8 = 0x07;
const U_ACTIVATE_BUSMON: u8 = 0x05;
const U_PRODUCT_ID_REQUEST: u8 = 0x20;
const U_ACTIVATE_BUSY_MODE: u8 = 0x21;
const U_RESET_BUSY_MODE: u8 = 0x22;
const U_MX_RST_CNT: u8 = 0x24;
const U_ACTIVATE_CRC: u8 = 0x25;
const U_SET_ADDRESS: u8 = 0x28;
const U_L_DATA_CONTINUE: u8 = 0x80;
const U_L_DATA_END: u8 = 0x40;

/// Largest telegram the TPUART accepts for sending.
pub const SEND_MAX_LEN: usize = 64;

/// TPUART driver over a [`SerialPort`].
#[derive(Debug)]
pub struct Tpuart<P> {
    port: P,
    link: Link,
    address: IndividualAddress,
    crc: bool,
    monitoring: bool,
    busy: bool,
}

impl<P: SerialPort> Tpuart<P> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            link: Link::new(),
            address: IndividualAddress::from_raw(0),
            crc: false,
            monitoring: false,
            busy: false,
        }
    }

    /// Write a request and read `response.len()` bytes back.
    async fn request(&mut self, out: &[u8], response: &mut [u8]) -> Result<()> {
        self.port.write(out).await?;
        if !response.is_empty() {
            self.port.read_exact(response).await?;
        }
        Ok(())
    }

    /// Reset the transceiver and forget all mode state.
    pub async fn reset(&mut self) -> Result<()> {
        let mut response = [0u8; 1];
        self.request(&[U_RESET_REQUEST], &mut response).await?;
        if !matches(response[0], U_RESET_RESPONSE) {
            return Err(NetError::bad_response());
        }

        self.address = IndividualAddress::from_raw(0);
        self.crc = false;
        self.monitoring = false;
        self.busy = false;
        self.link.rx.reset();
        self.link.rx.set_crc(false);
        Ok(())
    }

    /// Read the state indication byte.
    pub async fn state(&mut self) -> Result<u8> {
        let mut response = [0u8; 1];
        self.request(&[U_STATE_REQUEST], &mut response).await?;
        if !matches(response[0], U_STATE_RESPONSE) {
            return Err(NetError::bad_response());
        }
        Ok(response[0])
    }

    pub async fn product_id(&mut self) -> Result<u8> {
        let mut response = [0u8; 1];
        self.request(&[U_PRODUCT_ID_REQUEST], &mut response).await?;
        Ok(response[0])
    }

    /// Program the individual address the TPUART acknowledges.
    pub async fn set_address(&mut self, address: IndividualAddress) -> Result<()> {
        let [hi, lo] = address.to_bytes();
        self.request(&[U_SET_ADDRESS, hi, lo], &mut []).await?;
        self.address = address;
        Ok(())
    }

    /// Append a CRC to every received telegram. Only a reset turns it off.
    pub async fn activate_crc(&mut self) -> Result<()> {
        self.request(&[U_ACTIVATE_CRC], &mut []).await?;
        self.crc = true;
        self.link.rx.set_crc(true);
        Ok(())
    }

    pub async fn activate_busmon(&mut self) -> Result<()> {
        self.request(&[U_ACTIVATE_BUSMON], &mut []).await?;
        self.monitoring = true;
        Ok(())
    }

    /// Enter or leave busy mode (no acknowledgement of addressed telegrams).
    pub async fn set_busy_mode(&mut self, busy: bool) -> Result<()> {
        let service = if busy { U_ACTIVATE_BUSY_MODE } else { U_RESET_BUSY_MODE };
        self.request(&[service], &mut []).await?;
        self.busy = busy;
        Ok(())
    }

    /// Set the repetition counts after BUSY and NACK (0-7 each).
    pub async fn set_resend_count(&mut self, busy_count: u8, nack_count: u8) -> Result<()> {
        if busy_count > 7 || nack_count > 7 {
            return Err(NetError::invalid_value());
        }
        self.request(&[U_MX_RST_CNT, (busy_count << 5) | nack_count], &mut []).await
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    async fn transmit(&mut self, telegram: &[u8]) -> Result<usize> {
        if telegram.is_empty() || telegram.len() > SEND_MAX_LEN {
            return Err(NetError::invalid_length());
        }

        let mut frame: heapless::Vec<u8, { 2 * SEND_MAX_LEN }> = heapless::Vec::new();
        let last = telegram.len() - 1;
        for (i, &byte) in telegram.iter().enumerate() {
            let service = if i == last { U_L_DATA_END } else { U_L_DATA_CONTINUE };
            frame
                .extend_from_slice(&[service | i as u8, byte])
                .map_err(|_| NetError::invalid_length())?;
        }
        self.port.write(&frame).await?;

        await_confirmation(&mut self.port, telegram.len(), self.crc).await
    }
}

impl<P: SerialPort> NetDev for Tpuart<P> {
    const CLASS: &'static str = "tpuart";

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
            NetOpt::Checksum => match NetOptEnable::from_option(value)? {
                NetOptEnable::Enable => {
                    self.activate_crc().await?;
                    Ok(NetOptEnable::LEN)
                }
                // Activate-only
                NetOptEnable::Disable => Err(NetError::unsupported()),
            },
            _ => knx::set(&*self, opt, value),
        }
    }
}
