//! USB HID composite output: boot keyboard plus an auxiliary
//! consumer/vendor interface.
//!
//! The emitter is polled and must never block, while HID writes are async.
//! The two meet in a one-slot channel per interface: [`UsbReportSink`]
//! drops a report into the slot when it is free, and [`hid_writer`] waits on
//! the slot and performs the actual endpoint write.

use defmt::{info, warn};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::class::hid::{Config as HidConfig, HidBootProtocol, HidSubclass, HidWriter, State};
use embassy_usb::Builder;
use keybridge_core::{OutputError, ReportSink};
use keybridge_proto::report::MAX_REPORT_SIZE;
use keybridge_proto::{HidInterface, Report};
use portable_atomic::{AtomicBool, Ordering};
use usbd_hid::descriptor::{KeyboardReport, SerializedDescriptor};

use crate::config::USB_HID_POLL_MS;

/// USB driver type for this board.
pub type UsbDriver = Driver<'static, USB>;

/// HID writer for either interface.
pub type ReportWriter = HidWriter<'static, UsbDriver, 8>;

/// One in-flight report per interface.
pub type ReportSlot = Channel<CriticalSectionRawMutex, Report, 1>;

static KEYBOARD_SLOT: ReportSlot = Channel::new();
static AUX_SLOT: ReportSlot = Channel::new();

/// Set while the host has the device configured.
static USB_CONFIGURED: AtomicBool = AtomicBool::new(false);

/// Auxiliary interface report descriptor.
///
/// - Report 1: one 16-bit consumer control usage
/// - Report 2: one 16-bit vendor-defined usage (page 0xFF00)
pub const AUX_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x0C, // Usage Page (Consumer)
    0x09, 0x01, // Usage (Consumer Control)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x01, //   Report ID (1)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x03, //   Logical Maximum (1023)
    0x19, 0x00, //   Usage Minimum (0)
    0x2A, 0xFF, 0x03, //   Usage Maximum (1023)
    0x75, 0x10, //   Report Size (16)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x00, //   Input (Data, Array, Absolute)
    0xC0, // End Collection
    //
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, // Usage (Vendor Usage 1)
    0xA1, 0x01, // Collection (Application)
    0x85, 0x02, //   Report ID (2)
    0x15, 0x00, //   Logical Minimum (0)
    0x27, 0xFF, 0xFF, 0x00, 0x00, //   Logical Maximum (65535)
    0x19, 0x00, //   Usage Minimum (0)
    0x2A, 0xFF, 0xFF, //   Usage Maximum (65535)
    0x75, 0x10, //   Report Size (16)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x00, //   Input (Data, Array, Absolute)
    0xC0, // End Collection
];

fn slot(interface: HidInterface) -> &'static ReportSlot {
    match interface {
        HidInterface::Keyboard => &KEYBOARD_SLOT,
        HidInterface::Auxiliary => &AUX_SLOT,
    }
}

/// Tracks whether the host has configured the device.
pub struct UsbStateHandler;

impl embassy_usb::Handler for UsbStateHandler {
    fn reset(&mut self) {
        USB_CONFIGURED.store(false, Ordering::Release);
    }

    fn configured(&mut self, configured: bool) {
        USB_CONFIGURED.store(configured, Ordering::Release);
        if configured {
            info!("USB configured");
        } else {
            warn!("USB unconfigured");
        }
    }

    fn suspended(&mut self, suspended: bool) {
        if suspended {
            USB_CONFIGURED.store(false, Ordering::Release);
        }
    }
}

/// Non-blocking report sink backed by the per-interface slots.
pub struct UsbReportSink;

impl ReportSink for UsbReportSink {
    fn is_ready(&self, interface: HidInterface) -> bool {
        USB_CONFIGURED.load(Ordering::Acquire) && slot(interface).is_empty()
    }

    fn try_send(&mut self, report: &Report) -> Result<(), OutputError> {
        if !USB_CONFIGURED.load(Ordering::Acquire) {
            return Err(OutputError::NotReady);
        }
        slot(report.interface())
            .try_send(*report)
            .map_err(|_| OutputError::Busy)
    }
}

/// HID writers for both interfaces.
pub struct UsbHid {
    pub keyboard: ReportWriter,
    pub aux: ReportWriter,
}

/// Configure both HID interfaces in the USB builder.
pub fn configure_usb_hid(
    builder: &mut Builder<'static, UsbDriver>,
    keyboard_state: &'static mut State<'static>,
    aux_state: &'static mut State<'static>,
) -> UsbHid {
    let keyboard_config = HidConfig {
        report_descriptor: KeyboardReport::desc(),
        request_handler: None,
        poll_ms: USB_HID_POLL_MS,
        max_packet_size: 8,
        hid_subclass: HidSubclass::Boot,
        hid_boot_protocol: HidBootProtocol::Keyboard,
    };
    let keyboard = HidWriter::new(builder, keyboard_state, keyboard_config);

    let aux_config = HidConfig {
        report_descriptor: AUX_REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: USB_HID_POLL_MS,
        max_packet_size: 8,
        hid_subclass: HidSubclass::No,
        hid_boot_protocol: HidBootProtocol::None,
    };
    let aux = HidWriter::new(builder, aux_state, aux_config);

    UsbHid { keyboard, aux }
}

/// Forward reports from the interface's slot to its endpoint, forever.
pub async fn hid_writer(mut writer: ReportWriter, interface: HidInterface) -> ! {
    let reports = slot(interface);
    let mut buf = [0u8; MAX_REPORT_SIZE];

    writer.ready().await;
    info!("HID {} endpoint ready", interface);

    loop {
        let report = reports.receive().await;
        let n = report.write_to(&mut buf);
        if let Err(e) = writer.write(&buf[..n]).await {
            warn!("HID {} write failed: {}", interface, e);
        }
    }
}
