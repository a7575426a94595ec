//! Peripheral adapters for the meter board
//!
//! The board wiring is fixed: the pump transistor on GPIO4, the tube output
//! on GPIO5, the HV divider on GPIO1 (ADC1 channel 0) and the report UART on
//! UART0 (GPIO43/GPIO44).

use esp_hal::Async;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::gpio::{Event, Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::peripherals::{ADC1, GPIO1, GPIO4, GPIO5, GPIO43, GPIO44, UART0};
use esp_hal::uart::{Config as UartConfig, ConfigError as UartConfigError, TxError, Uart, UartTx};
use geiger_core::serial::SERIAL_BAUD;
use geiger_core::{EdgeAck, MeterConfig, SupplySense};
use log::{info, warn};

/// GPIO the pump transistor is soldered to.
pub const PUMP_GPIO: u8 = 4;

/// GPIO the tube output is soldered to.
pub const SENSOR_GPIO: u8 = 5;

/// ADC1 on the S3 returns 12-bit counts; the divider is calibrated in 10-bit
/// counts (`adc_full_scale` = 1024).
const ADC_NATIVE_SHIFT: u32 = 2;

/// CPU frequency selected in `main`, used to size the pump pulse spin.
pub const CPU_HZ: u32 = 240_000_000;

/// Warn when the configured pins disagree with the soldered ones. esp-hal
/// peripherals are typed per pin, so the wiring cannot follow the config.
pub fn check_wiring(config: &MeterConfig) {
    if config.pump.pin != PUMP_GPIO {
        warn!(
            "Pump pin override {} ignored, board drives GPIO{}",
            config.pump.pin, PUMP_GPIO
        );
    }
    if config.sensor.pin != SENSOR_GPIO {
        warn!(
            "Sensor pin override {} ignored, board reads GPIO{}",
            config.sensor.pin, SENSOR_GPIO
        );
    }
}

/// High-voltage divider sampled through ADC1.
pub struct SupplyAdc {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    pin: AdcPin<GPIO1<'static>, ADC1<'static>>,
}

impl SupplyAdc {
    pub fn new(adc1: ADC1<'static>, divider: GPIO1<'static>) -> Self {
        let mut adc_config = AdcConfig::new();
        let pin = adc_config.enable_pin(divider, Attenuation::_11dB);
        let adc = Adc::new(adc1, adc_config);

        Self { adc, pin }
    }
}

impl SupplySense for SupplyAdc {
    type Error = ();

    fn read_raw(&mut self) -> Result<u16, ()> {
        let raw = nb::block!(self.adc.read_oneshot(&mut self.pin))?;
        Ok(raw >> ADC_NATIVE_SHIFT)
    }
}

/// Pump transistor drive, parked low until the regulator takes it.
pub fn pump_drive(pin: GPIO4<'static>) -> Output<'static> {
    Output::new(pin, Level::Low, OutputConfig::default())
}

/// Tube pulse input, interrupting on both edges.
pub struct SensorLine(Input<'static>);

impl SensorLine {
    pub fn new(pin: GPIO5<'static>) -> Self {
        let mut input = Input::new(pin, InputConfig::default().with_pull(Pull::None));
        // Each tube pulse produces a rising and a falling edge; the aggregator
        // halves the count accordingly.
        input.listen(Event::AnyEdge);
        info!("Tube input listening on GPIO{}", SENSOR_GPIO);
        Self(input)
    }

    /// Whether this line raised the current GPIO interrupt.
    pub fn is_pending(&self) -> bool {
        self.0.is_interrupt_set()
    }
}

impl EdgeAck for SensorLine {
    fn acknowledge(&mut self) {
        self.0.clear_interrupt();
    }
}

/// Report UART at [`SERIAL_BAUD`]. Only the transmit half is used.
pub fn init_serial(
    uart0: UART0<'static>,
    tx: GPIO43<'static>,
    rx: GPIO44<'static>,
) -> Result<UartTx<'static, Async>, UartConfigError> {
    let uart = Uart::new(uart0, UartConfig::default().with_baudrate(SERIAL_BAUD))?
        .with_tx(tx)
        .with_rx(rx)
        .into_async();
    let (_rx, tx) = uart.split();

    info!("Serial ready at {} baud", SERIAL_BAUD);
    Ok(tx)
}

/// Write a whole line, retrying short writes.
pub async fn write_line(tx: &mut UartTx<'static, Async>, line: &str) -> Result<(), TxError> {
    let mut bytes = line.as_bytes();
    while !bytes.is_empty() {
        let written = tx.write_async(bytes).await?;
        bytes = &bytes[written..];
    }
    tx.flush_async().await
}
