//! The window boundary must neither drop nor double-count an edge that races
//! with the aggregator's read-and-reset.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use geiger_core::aggregator::{WindowChannel, WindowPhase};
use geiger_core::{
    EdgeAck, MeterConfig, PulseCounter, SENSOR_SUM, SharedReadings, WindowAggregator,
};

struct NullLine;

impl EdgeAck for NullLine {
    fn acknowledge(&mut self) {}
}

#[test]
fn edge_arriving_at_finalize_lands_in_next_window_once() {
    let channel = WindowChannel::new();
    let counter = PulseCounter::new();
    let readings = SharedReadings::new();
    let mut aggregator =
        WindowAggregator::<SENSOR_SUM>::new(&MeterConfig::DEFAULT.sensor, &channel).unwrap();

    for _ in 0..720 {
        counter.record_edge();
    }
    for _ in 0..35 {
        aggregator.tick(&counter, &readings);
    }

    // The closing tick takes the count; the racing edge follows it
    let WindowPhase::Finalized(first) = aggregator.tick(&counter, &readings) else {
        panic!("window did not close on the 36th tick");
    };
    counter.on_edge(&mut NullLine);
    counter.on_edge(&mut NullLine);

    assert_eq!(first.edges, 720);
    assert_eq!(counter.peek(), 2);

    for _ in 0..35 {
        aggregator.tick(&counter, &readings);
    }
    let WindowPhase::Finalized(second) = aggregator.tick(&counter, &readings) else {
        panic!("second window did not close");
    };
    assert_eq!(second.edges, 2);
    assert_eq!(counter.peek(), 0);
}

#[test]
fn concurrent_edges_are_conserved_across_windows() {
    const EDGES: u32 = 300_000;

    let mut sensor = MeterConfig::DEFAULT.sensor;
    sensor.window_secs = 1;

    let channel = WindowChannel::new();
    let readings = SharedReadings::new();
    let counter = Arc::new(PulseCounter::new());
    let done = Arc::new(AtomicBool::new(false));
    let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&sensor, &channel).unwrap();

    let producer = {
        let counter = Arc::clone(&counter);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut line = NullLine;
            for _ in 0..EDGES {
                counter.on_edge(&mut line);
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut counted: u64 = 0;
    let close = |aggregator: &mut WindowAggregator<'_, SENSOR_SUM>| match aggregator
        .tick(&counter, &readings)
    {
        WindowPhase::Finalized(report) => u64::from(report.edges),
        WindowPhase::Accumulating { .. } => panic!("a one second window closes every tick"),
    };

    while !done.load(Ordering::Acquire) {
        counted += close(&mut aggregator);
        thread::yield_now();
    }
    producer.join().unwrap();
    counted += close(&mut aggregator);

    assert_eq!(
        counted,
        u64::from(EDGES),
        "over {} windows",
        aggregator.windows_completed()
    );
    assert_eq!(counter.peek(), 0);
    assert_eq!(readings.get().windows_completed, aggregator.windows_completed());
}
