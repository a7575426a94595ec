#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_executor::Spawner;
use embassy_time::{Duration, Ticker, Timer};
use esp_hal::Async;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Io, Output};
use esp_hal::handler;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::UartTx;
use geiger_core::aggregator::WindowSubscriber;
use geiger_core::serial::{STARTUP_LINE, window_line};
use geiger_firmware::app_state::{
    CPU_HZ, MeterError, PulseCounter, SENSOR_SUM, SensorLine, SharedReadings, SpinDelay,
    SupplyAdc, VoltageRegulator, WindowAggregator, WindowChannel, WindowPhase, check_wiring,
    init_serial, load_config, pump_drive, write_line,
};
use log::{debug, error, info, warn};

type Regulator = VoltageRegulator<SupplyAdc, Output<'static>, SpinDelay>;

/// How often the main task logs a status snapshot.
const STATUS_PERIOD: Duration = Duration::from_secs(10);

static PULSES: PulseCounter = PulseCounter::new();
static READINGS: SharedReadings = SharedReadings::new();
static WINDOWS: WindowChannel = WindowChannel::new();
static SENSOR: Mutex<RefCell<Option<SensorLine>>> = Mutex::new(RefCell::new(None));

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[handler]
fn on_sensor_edge() {
    critical_section::with(|cs| {
        if let Some(line) = SENSOR.borrow_ref_mut(cs).as_mut()
            && line.is_pending()
        {
            PULSES.on_edge(line);
        }
    });
}

#[embassy_executor::task]
async fn pump_task(mut regulator: Regulator, period: Duration) {
    let mut ticker = Ticker::every(period);
    loop {
        if let Err(e) = regulator.tick(&READINGS) {
            warn!("Pump tick skipped: {}", e);
        }
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn window_task(mut aggregator: WindowAggregator<'static, SENSOR_SUM>, period: Duration) {
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        if let WindowPhase::Finalized(report) = aggregator.tick(&PULSES, &READINGS) {
            debug!(
                "Window {}: {} edges, sample {} uR/h",
                report.windows_completed, report.edges, report.sample
            );
        }
    }
}

#[embassy_executor::task]
async fn serial_task(mut tx: UartTx<'static, Async>, mut reports: WindowSubscriber<'static>) {
    if let Err(e) = write_line(&mut tx, STARTUP_LINE).await {
        warn!("Serial startup line failed: {:?}", e);
    }

    loop {
        let report = reports.next_message_pure().await;
        let line = window_line(&report);
        if let Err(e) = write_line(&mut tx, line.as_str()).await {
            warn!(
                "Serial report for window {} failed: {:?}",
                report.windows_completed, e
            );
        }
    }
}

/// Park forever after a bring-up failure; the pump output is already low.
async fn halt(reason: MeterError) -> ! {
    loop {
        error!("Meter halted: {}", reason);
        Timer::after(Duration::from_secs(60)).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::_240MHz);
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(size: 16 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized");

    let config = load_config();
    check_wiring(&config);

    // Count edges from boot; the first window starts now
    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(on_sensor_edge);
    let line = SensorLine::new(peripherals.GPIO5);
    critical_section::with(|cs| SENSOR.borrow_ref_mut(cs).replace(line));

    let regulator = match VoltageRegulator::new(
        SupplyAdc::new(peripherals.ADC1, peripherals.GPIO1),
        pump_drive(peripherals.GPIO4),
        SpinDelay::new(CPU_HZ),
        &config.pump,
    ) {
        Ok(regulator) => regulator,
        Err(e) => halt(e.into()).await,
    };

    let aggregator = match WindowAggregator::<SENSOR_SUM>::new(&config.sensor, &WINDOWS) {
        Ok(aggregator) => aggregator,
        Err(e) => halt(e).await,
    };

    let reports = match WINDOWS.subscriber() {
        Ok(reports) => reports,
        Err(_) => halt(MeterError::ChannelExhausted).await,
    };

    match init_serial(peripherals.UART0, peripherals.GPIO43, peripherals.GPIO44) {
        Ok(tx) => match serial_task(tx, reports) {
            Ok(token) => spawner.spawn(token),
            Err(e) => error!("Could not spawn serial task: {:?}", e),
        },
        Err(e) => error!("Serial unavailable, reporting over RTT only: {:?}", e),
    }

    match pump_task(regulator, config.pump_period()) {
        Ok(token) => spawner.spawn(token),
        Err(e) => error!("Could not spawn pump task: {:?}", e),
    }

    match window_task(aggregator, config.aggregation_period()) {
        Ok(token) => spawner.spawn(token),
        Err(e) => error!("Could not spawn window task: {:?}", e),
    }

    info!(
        "Metering started: profile {}, {} tube(s), {} s windows",
        config.sensor.tube_profile, config.sensor.tube_count, config.sensor.window_secs
    );

    let mut ticker = Ticker::every(STATUS_PERIOD);
    loop {
        ticker.next().await;
        let status = READINGS.status(&PULSES);
        match status.dose_rate {
            Some(dose) => info!(
                "{} V | {} pulses | {} uR/h ({}%)",
                status.supply_voltage, status.pulses, dose, status.accuracy_percent
            ),
            None => info!(
                "{} V | {} pulses | N/A",
                status.supply_voltage, status.pulses
            ),
        }
    }
}
