//! Console-backed implementation of the `log` facade.
//!
//! Kernel code logs through the standard `log` macros; this module routes
//! those records to the system console. Call [`init`] once during boot,
//! after the console device is registered.

use log::{LevelFilter, Log, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = alloc::format!("[{}] {}: {}\n", record.level(), record.target(), record.args());
        crate::teletype::putbuf(line.as_bytes());
    }

    fn flush(&self) {}
}

/// Installs the console logger at the given level. Effective once.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use crate::teletype::{self, Teletype};
    use crate::KernelError;
    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<u8>> = Mutex::new(Vec::new());

    struct CaptureTty;

    impl Teletype for CaptureTty {
        fn write(&mut self, data: &[u8]) -> Result<usize, KernelError> {
            CAPTURED.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn read(&mut self, _data: &mut [u8]) -> Result<usize, KernelError> {
            Ok(0)
        }
    }

    #[test]
    fn records_reach_the_console() {
        teletype::register(Box::new(CaptureTty));
        super::init(log::LevelFilter::Info);
        log::info!("hello from the logger");
        let captured = String::from_utf8(CAPTURED.lock().unwrap().clone()).unwrap();
        assert!(
            captured.contains("hello from the logger"),
            "log output missing from console: {captured:?}"
        );
    }
}
