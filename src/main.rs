#![no_std]
#![no_main]

use core::ops::RangeInclusive;
use core::sync::atomic::{AtomicUsize, Ordering};

use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::UART1;
use embassy_rp::uart::{self, BufferedInterruptHandler, BufferedUart};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{with_timeout, Duration, Timer};
use embedded_io_async::{Read, Write};
use panic_persist as _;
use static_cell::StaticCell;

use knx_netif::drivers::{PortEvent, SerialPort, Tpuart};
use knx_netif::netdev::DeviceSlot;
use knx_netif::netif::knx::{TaskId, TaskSpawner, TaskSpec};
use knx_netif::netif::{InterfaceTask, NetIfTable};
use knx_netif::{auto_init, knx_log, NetError};

// Program metadata for `picotool info`
#[unsafe(link_section = ".bi_entries")]
#[used]
pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
    embassy_rp::binary_info::rp_program_name!(c"KNX-NETIF"),
    embassy_rp::binary_info::rp_program_description!(
        c"KNX TP interface on a TPUART for Raspberry Pico 2"
    ),
    embassy_rp::binary_info::rp_cargo_version!(),
    embassy_rp::binary_info::rp_program_build_attribute!(),
];

bind_interrupts!(struct Irqs {
    UART1_IRQ => BufferedInterruptHandler<UART1>;
});

#[cfg(feature = "usb-logger")]
bind_interrupts!(struct UsbIrqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<embassy_rp::peripherals::USB>;
});

/// TP-UART line speed (8E1)
const BAUDRATE: u32 = 19_200;
/// Silence that ends a telegram
const IDLE_GAP: Duration = Duration::from_millis(2);
/// Longest wait for a service response
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);
/// Interface tasks the executor can hold
const NETIF_TASKS: usize = 1;

type Netif = InterfaceTask<CriticalSectionRawMutex, Tpuart<UartPort>, NETIF_TASKS>;

static NETIFS: NetIfTable<CriticalSectionRawMutex, NETIF_TASKS> = NetIfTable::new();

/// Interface tasks currently occupying the pool
static LIVE_TASKS: AtomicUsize = AtomicUsize::new(0);

/// Buffered UART seen as a TP-UART serial link.
struct UartPort {
    uart: BufferedUart,
}

impl SerialPort for UartPort {
    async fn write(&mut self, bytes: &[u8]) -> knx_netif::Result<()> {
        self.uart.write_all(bytes).await.map_err(|_| NetError::io())
    }

    async fn read(&mut self) -> PortEvent {
        let mut byte = [0u8; 1];
        match with_timeout(IDLE_GAP, self.uart.read(&mut byte)).await {
            Ok(Ok(1)) => PortEvent::Byte(byte[0]),
            _ => PortEvent::Idle,
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> knx_netif::Result<()> {
        with_timeout(RESPONSE_TIMEOUT, self.uart.read_exact(buf))
            .await
            .map_err(|_| NetError::timeout())?
            .map_err(|_| NetError::io())
    }
}

/// Spawns interface tasks on the embassy executor.
///
/// Embassy allocates task storage statically, so `spec.stack` only
/// reserves the memory and the executor has no priorities to honour.
struct EmbassySpawner {
    spawner: Spawner,
    next_id: u16,
}

impl TaskSpawner<Netif> for EmbassySpawner {
    fn priority_range(&self) -> RangeInclusive<u8> {
        0..=7
    }

    fn spawn(&mut self, spec: TaskSpec, task: Netif) -> Result<TaskId, Netif> {
        // A full pool would drop the task, so refuse before spawning
        let claimed = LIVE_TASKS.fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
            (live < NETIF_TASKS).then_some(live + 1)
        });
        if claimed.is_err() {
            return Err(task);
        }
        if self.spawner.spawn(netif_task(task)).is_err() {
            // The pool holds NETIF_TASKS and LIVE_TASKS counts its occupants
            defmt::panic!("executor refused task {}", spec.name.as_str());
        }
        self.next_id = self.next_id.wrapping_add(1);
        Ok(TaskId(self.next_id))
    }
}

#[embassy_executor::task(pool_size = NETIF_TASKS)]
async fn netif_task(task: Netif) {
    task.run().await;
    LIVE_TASKS.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(feature = "usb-logger")]
#[embassy_executor::task]
async fn logger_task(driver: embassy_rp::usb::Driver<'static, embassy_rp::peripherals::USB>) {
    embassy_usb_logger::run!(1024, log::LevelFilter::Info, driver);
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    #[cfg(feature = "usb-logger")]
    spawner.must_spawn(logger_task(embassy_rp::usb::Driver::new(p.USB, UsbIrqs)));

    if let Some(panic_message) = panic_persist::get_panic_message_utf8() {
        defmt::error!("{}", panic_message);
        loop {
            Timer::after_secs(5).await;
        }
    }

    let mut config = uart::Config::default();
    config.baudrate = BAUDRATE;
    config.parity = uart::Parity::ParityEven;

    static TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static RX_BUF: StaticCell<[u8; 512]> = StaticCell::new();
    let uart = BufferedUart::new(
        p.UART1,
        p.PIN_4,
        p.PIN_5,
        Irqs,
        TX_BUF.init([0; 64]),
        RX_BUF.init([0; 512]),
        config,
    );

    static DEVICES: StaticCell<[DeviceSlot<CriticalSectionRawMutex, Tpuart<UartPort>>; 1]> =
        StaticCell::new();
    let devices = DEVICES.init([DeviceSlot::new(Tpuart::new(UartPort { uart }))]);

    static STACK: StaticCell<[u8; 2048]> = StaticCell::new();
    let stack: &'static mut [u8] = STACK.init([0; 2048]);

    let mut netif_spawner = EmbassySpawner { spawner, next_id: 0 };
    let created = auto_init::tpuart(&NETIFS, &mut netif_spawner, [stack], devices).await;

    let Some(&id) = created.first() else {
        knx_log!(error, "no KNX interface came up");
        loop {
            Timer::after_secs(5).await;
        }
    };

    // Bus monitor: report every telegram the interface accepts
    loop {
        match NETIFS.recv(id).await {
            Ok(frame) => {
                knx_log!(info, "{} -> {} bytes", frame.src, frame.telegram.len());
            }
            Err(e) => {
                knx_log!(error, "recv failed: {}", e);
                Timer::after_secs(1).await;
            }
        }
    }
}
