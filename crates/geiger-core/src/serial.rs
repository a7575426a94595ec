//! Serial line format
//!
//! The UART carries one short ASCII line per closed window, preceded by a
//! blank line at boot. Line endings are `\n\r`, matching what existing
//! terminal loggers for this meter expect.

use core::fmt::Write;

use heapless::String;

use crate::aggregator::WindowReport;

/// Longest line is `"130000 uR/h:100%\n\r"` (18 bytes).
pub const SERIAL_LINE_CAPACITY: usize = 32;

/// Emitted once when the meter starts.
pub const STARTUP_LINE: &str = "\n\r";

/// Baud rate of the reporting UART.
pub const SERIAL_BAUD: u32 = 9600;

pub type SerialLine = String<SERIAL_LINE_CAPACITY>;

/// `"<dose> uR/h:<accuracy>%\n\r"`
pub fn window_line(report: &WindowReport) -> SerialLine {
    let mut line = SerialLine::new();
    // Cannot overflow: u32 and u8 fields fit well inside the capacity
    let _ = write!(
        line,
        "{} uR/h:{}%\n\r",
        report.dose_rate, report.accuracy_percent
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(dose_rate: u32, accuracy_percent: u8) -> WindowReport {
        WindowReport {
            windows_completed: 1,
            edges: 0,
            sample: dose_rate,
            dose_rate,
            accuracy_percent,
        }
    }

    #[test]
    fn test_window_line_format() {
        assert_eq!(window_line(&report(360, 10)).as_str(), "360 uR/h:10%\n\r");
        assert_eq!(window_line(&report(0, 0)).as_str(), "0 uR/h:0%\n\r");
    }

    #[test]
    fn test_widest_line_fits() {
        let line = window_line(&report(u32::MAX, u8::MAX));
        assert_eq!(line.as_str(), "4294967295 uR/h:255%\n\r");
    }
}
