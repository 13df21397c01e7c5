#![no_std]
#![no_main]

use defmt::{info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{UART1, USB};
use embassy_rp::uart::{Async, Config as UartConfig, Error as UartError, Uart, UartRx};
use embassy_rp::usb::Driver;
use embassy_rp::watchdog::Watchdog;
use embassy_rp::Peri;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Instant, Timer};
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig, UsbDevice};
use keybridge_core::{diag_info, diag_warn, Config, Heartbeat, LogChannel, Supervisor};
use keybridge_proto::{HidInterface, BAUDRATE};
use keybridge_rp2040::config::{
    LOG_FLUSH_MS, SERVICE_TICK_MS, SUPERVISOR_PERIOD_MS, USB_MANUFACTURER, USB_PID, USB_PRODUCT,
    USB_SERIAL_NUMBER, USB_VID,
};
use keybridge_rp2040::usb_output::{ReportWriter, UsbDriver};
use keybridge_rp2040::{
    configure_usb_hid, hid_writer, mark_link_down, mark_link_ready, HardwareWatchdog, UartLogLink,
    UsbHid, UsbStateHandler, WIRE_FORMAT,
};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART1_IRQ => embassy_rp::uart::InterruptHandler<UART1>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// Diagnostic lines bound for the serial link.
static LOG: LogChannel<CriticalSectionRawMutex> = LogChannel::new();

/// Timing tunables shared by every task.
static CONFIG: Config = Config::DEFAULT;

static INGRESS_HEARTBEAT: Heartbeat = Heartbeat::new("ingress");

#[cfg(feature = "dual-core")]
static EMITTER_HEARTBEAT: Heartbeat = Heartbeat::new("emitter");

#[cfg(not(feature = "dual-core"))]
static SUPERVISED: [&Heartbeat; 1] = [&INGRESS_HEARTBEAT];
#[cfg(feature = "dual-core")]
static SUPERVISED: [&Heartbeat; 2] = [&INGRESS_HEARTBEAT, &EMITTER_HEARTBEAT];

/// USB device configuration buffers.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static USB_HANDLER: StaticCell<UsbStateHandler> = StaticCell::new();

/// HID state, one per interface.
static KEYBOARD_STATE: StaticCell<State> = StaticCell::new();
static AUX_STATE: StaticCell<State> = StaticCell::new();

static QUEUE: StaticCell<keybridge_core::EventQueue<{ keybridge_core::QUEUE_SLOTS }>> =
    StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("keybridge starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    #[cfg(feature = "quiet")]
    LOG.set_level(keybridge_core::Level::Info);

    // --- Watchdog ---
    let watchdog = HardwareWatchdog::new(Watchdog::new(p.WATCHDOG));
    if watchdog.caused_last_reset() {
        warn!("watchdog triggered reboot");
        diag_warn!(&LOG, "watchdog triggered reboot");
    }

    // --- UART Setup ---
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = BAUDRATE;

    let uart = Uart::new(
        p.UART1,
        p.PIN_8, // TX
        p.PIN_9, // RX
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        uart_config,
    );
    let (tx, rx) = uart.split();
    let log_link = UartLogLink::new(tx);

    let queue = QUEUE.init(keybridge_core::EventQueue::new());

    #[cfg(not(feature = "dual-core"))]
    {
        let (usb_device, hid) = build_usb(p.USB);
        spawner.spawn(usb_task(usb_device).unwrap());
        spawn_writers(&spawner, hid);
        spawner.spawn(bridge_task(rx, queue).unwrap());
    }

    #[cfg(feature = "dual-core")]
    {
        core1::start(p.CORE1, p.USB);
        spawner.spawn(ingress_task(rx, queue).unwrap());
    }

    spawner.spawn(log_task(log_link).unwrap());
    spawner.spawn(supervisor_task(watchdog).unwrap());

    #[cfg(feature = "dual-core")]
    core1::await_ready().await;

    diag_info!(&LOG, "keybridge ready, {:?} packets", WIRE_FORMAT);
    info!("keybridge initialized, waiting for data...");
}

/// Build the USB device with both HID interfaces.
fn build_usb(usb: Peri<'static, USB>) -> (UsbDevice<'static, UsbDriver>, UsbHid) {
    let usb_driver = Driver::new(usb, Irqs);

    let mut usb_config = UsbConfig::new(USB_VID, USB_PID);
    usb_config.manufacturer = Some(USB_MANUFACTURER);
    usb_config.product = Some(USB_PRODUCT);
    usb_config.serial_number = Some(USB_SERIAL_NUMBER);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );
    builder.handler(USB_HANDLER.init(UsbStateHandler));

    let hid = configure_usb_hid(
        &mut builder,
        KEYBOARD_STATE.init(State::new()),
        AUX_STATE.init(State::new()),
    );

    (builder.build(), hid)
}

fn spawn_writers(spawner: &Spawner, hid: UsbHid) {
    spawner.spawn(writer_task(hid.keyboard, HidInterface::Keyboard).unwrap());
    spawner.spawn(writer_task(hid.aux, HidInterface::Auxiliary).unwrap());
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) {
    device.run().await;
}

/// Endpoint writer for one HID interface.
#[embassy_executor::task(pool_size = 2)]
async fn writer_task(writer: ReportWriter, interface: HidInterface) {
    hid_writer(writer, interface).await
}

/// Outcome of one bounded wait on the RX line.
enum Rx {
    Byte(u8),
    Idle,
    /// Line held low: the peer went away.
    Break,
}

/// Wait for one byte, giving up after a service tick.
async fn read_byte(rx: &mut UartRx<'static, Async>) -> Rx {
    let mut byte = [0u8; 1];
    match select(rx.read(&mut byte), Timer::after_millis(SERVICE_TICK_MS)).await {
        Either::First(Ok(())) => Rx::Byte(byte[0]),
        Either::First(Err(UartError::Break)) => Rx::Break,
        Either::First(Err(e)) => {
            warn!("UART RX error: {}", e);
            Rx::Idle
        }
        Either::Second(()) => Rx::Idle,
    }
}

/// Single-core pipeline: UART bytes in, HID reports out.
#[cfg(not(feature = "dual-core"))]
#[embassy_executor::task]
async fn bridge_task(
    mut rx: UartRx<'static, Async>,
    queue: &'static mut keybridge_core::EventQueue<{ keybridge_core::QUEUE_SLOTS }>,
) {
    use keybridge_core::KeyBridge;
    use keybridge_rp2040::UsbReportSink;

    let mut bridge = KeyBridge::new(queue, WIRE_FORMAT, UsbReportSink, &CONFIG, &LOG)
        .with_heartbeat(&INGRESS_HEARTBEAT);

    loop {
        // Leave bytes in the UART while the queue cannot take another packet
        if bridge.read_budget() > 0 {
            match read_byte(&mut rx).await {
                Rx::Byte(byte) => {
                    if !bridge.ingress().link_up() {
                        mark_link_ready();
                        bridge.set_link_state(true);
                    }
                    bridge.ingest(&[byte], Instant::now());
                }
                Rx::Break if bridge.ingress().link_up() => {
                    mark_link_down();
                    bridge.set_link_state(false);
                }
                Rx::Break | Rx::Idle => {}
            }
        } else {
            Timer::after_millis(SERVICE_TICK_MS).await;
        }

        bridge.service(Instant::now());
    }
}

/// Core 0 half of the dual-core pipeline: UART bytes in, event words out.
#[cfg(feature = "dual-core")]
#[embassy_executor::task]
async fn ingress_task(
    mut rx: UartRx<'static, Async>,
    queue: &'static mut keybridge_core::EventQueue<{ keybridge_core::QUEUE_SLOTS }>,
) {
    use keybridge_core::{split, CrossContextSender, Ingress};
    use keybridge_rp2040::CoreFifoTx;

    let (producer, mut events) = split(queue);
    let mut ingress = Ingress::new(WIRE_FORMAT, producer, &CONFIG, &LOG);
    let mut sender = CrossContextSender::new(&CONFIG, &LOG);
    let mut fifo = CoreFifoTx;

    loop {
        if ingress.read_budget() > 0 {
            match read_byte(&mut rx).await {
                Rx::Byte(byte) => {
                    if !ingress.link_up() {
                        mark_link_ready();
                        ingress.set_link_state(true);
                    }
                    ingress.receive(&[byte], Instant::now());
                }
                Rx::Break if ingress.link_up() => {
                    mark_link_down();
                    ingress.set_link_state(false);
                }
                Rx::Break | Rx::Idle => {}
            }
        } else {
            Timer::after_millis(SERVICE_TICK_MS).await;
        }

        let now = Instant::now();
        INGRESS_HEARTBEAT.beat(now);
        ingress.poll_timeout(now);
        sender.poll(&mut events, &mut fifo, now);
    }
}

/// Drain the diagnostic ring to the UART.
#[embassy_executor::task]
async fn log_task(mut link: UartLogLink) {
    loop {
        Timer::after_millis(LOG_FLUSH_MS).await;
        loop {
            LOG.flush(&mut link);
            if !link.has_staged() {
                break;
            }
            link.drain().await;
        }
    }
}

/// Pet the hardware watchdog while every supervised context is alive.
#[embassy_executor::task]
async fn supervisor_task(watchdog: HardwareWatchdog) {
    let mut supervisor = Supervisor::new(watchdog, &SUPERVISED, &CONFIG, Instant::now(), &LOG);
    loop {
        supervisor.poll(Instant::now());
        Timer::after_millis(SUPERVISOR_PERIOD_MS).await;
    }
}

#[cfg(feature = "dual-core")]
mod core1 {
    use embassy_executor::Executor;
    use embassy_rp::multicore::{spawn_core1, Stack};
    use embassy_rp::peripherals::{CORE1, USB};
    use embassy_rp::Peri;
    use embassy_time::{with_timeout, Duration, Instant, Timer};
    use keybridge_core::{diag_error, Emitter, FifoEventSource};
    use keybridge_rp2040::config::{CORE1_BOOT_WAIT_MS, SERVICE_TICK_MS};
    use keybridge_rp2040::{CoreFifoRx, UsbReportSink};
    use portable_atomic::{AtomicBool, Ordering};
    use static_cell::StaticCell;

    use super::{build_usb, spawn_writers, usb_task, CONFIG, EMITTER_HEARTBEAT, LOG};

    static mut CORE1_STACK: Stack<4096> = Stack::new();
    static EXECUTOR1: StaticCell<Executor> = StaticCell::new();
    static CORE1_READY: AtomicBool = AtomicBool::new(false);

    /// Launch USB and report emission on core 1.
    pub fn start(core: Peri<'static, CORE1>, usb: Peri<'static, USB>) {
        spawn_core1(
            core,
            unsafe { &mut *core::ptr::addr_of_mut!(CORE1_STACK) },
            move || {
                let executor1 = EXECUTOR1.init(Executor::new());
                executor1.run(|spawner| {
                    let (usb_device, hid) = build_usb(usb);
                    spawner.spawn(usb_task(usb_device).unwrap());
                    spawn_writers(&spawner, hid);
                    spawner.spawn(emitter_task().unwrap());
                })
            },
        );
    }

    /// Give core 1 a bounded time to come up.
    pub async fn await_ready() {
        let ready = with_timeout(Duration::from_millis(CORE1_BOOT_WAIT_MS), async {
            while !CORE1_READY.load(Ordering::Acquire) {
                Timer::after_millis(1).await;
            }
        })
        .await;
        if ready.is_err() {
            defmt::error!("emitter init timeout");
            diag_error!(&LOG, "emitter init timeout");
        }
    }

    #[embassy_executor::task]
    async fn emitter_task() {
        let mut source = FifoEventSource::new(CoreFifoRx);
        let mut emitter = Emitter::new(&CONFIG);
        let mut sink = UsbReportSink;

        CORE1_READY.store(true, Ordering::Release);
        defmt::info!("core 1 emitter running");

        loop {
            let now = Instant::now();
            EMITTER_HEARTBEAT.beat(now);
            emitter.poll(&mut source, &mut sink, now);
            Timer::after_millis(SERVICE_TICK_MS).await;
        }
    }
}
