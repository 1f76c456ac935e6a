/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::time::Duration;

#[cfg(windows)]
use cpu_time::ThreadTime;

/// platform independent threadtime measurement
pub struct CpuTimeMeasure {
    #[cfg(windows)]
    start: ThreadTime,
    #[cfg(not(windows))]
    start: std::time::SystemTime,
}

impl CpuTimeMeasure {
    pub fn new() -> Self {
        Self {
            #[cfg(windows)]
            start: ThreadTime::now(),
            #[cfg(not(windows))]
            start: std::time::SystemTime::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        #[cfg(windows)]
        {
            self.start.elapsed()
        }
        #[cfg(not(windows))]
        {
            // the clock can go backwards, report nothing in that case
            self.start.elapsed().unwrap_or_default()
        }
    }
}

/// Counters collected while decoding an image
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    mcus: u64,
    blocks: u64,
    dc_only_blocks: u64,
    restart_intervals: u64,
    bytes_consumed: u64,
    cpu_time: Duration,
}

impl Metrics {
    pub fn record_mcu(&mut self, blocks: usize, dc_only_blocks: u32) {
        self.mcus += 1;
        self.blocks += blocks as u64;
        self.dc_only_blocks += u64::from(dc_only_blocks);
    }

    pub fn record_restart(&mut self) {
        self.restart_intervals += 1;
    }

    pub fn record_bytes_consumed(&mut self, bytes: u64) {
        self.bytes_consumed += bytes;
    }

    pub fn record_cpu_time(&mut self, duration: Duration) {
        self.cpu_time += duration;
    }

    /// number of MCUs that were decoded
    pub fn mcus(&self) -> u64 {
        self.mcus
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// blocks without AC coefficients, which skip most of the inverse DCT
    pub fn dc_only_blocks(&self) -> u64 {
        self.dc_only_blocks
    }

    /// number of restart markers the scan went through
    pub fn restart_intervals(&self) -> u64 {
        self.restart_intervals
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    pub fn merge_from(&mut self, source_metrics: &Metrics) {
        self.mcus += source_metrics.mcus;
        self.blocks += source_metrics.blocks;
        self.dc_only_blocks += source_metrics.dc_only_blocks;
        self.restart_intervals += source_metrics.restart_intervals;
        self.bytes_consumed += source_metrics.bytes_consumed;
        self.cpu_time += source_metrics.cpu_time;
    }

    pub fn print_metrics(&self) {
        let dc_ratio = if self.blocks == 0 {
            0f64
        } else {
            (self.dc_only_blocks as f64) * 100f64 / (self.blocks as f64)
        };

        println!(
            "mcus={0} blocks={1} dc_only={2} ({3:0.1}%) restarts={4}",
            self.mcus, self.blocks, self.dc_only_blocks, dc_ratio, self.restart_intervals
        );
        println!(
            "bytes_consumed={0} cpu={1}ms",
            self.bytes_consumed,
            self.cpu_time.as_millis()
        );
    }
}

#[test]
fn merge_adds_counters() {
    let mut a = Metrics::default();
    a.record_mcu(6, 2);
    a.record_restart();

    let mut b = Metrics::default();
    b.record_mcu(6, 6);
    b.record_bytes_consumed(100);
    b.record_cpu_time(Duration::from_millis(3));

    a.merge_from(&b);
    assert_eq!(a.mcus(), 2);
    assert_eq!(a.blocks(), 12);
    assert_eq!(a.dc_only_blocks(), 8);
    assert_eq!(a.restart_intervals(), 1);
    assert_eq!(a.bytes_consumed(), 100);
    assert_eq!(a.cpu_time(), Duration::from_millis(3));
}
