//! Kernel logging behind the `log` facade.
//!
//! Subsystems log through the ordinary `log::info!`-family macros with a
//! `[SUBSYS]`-tagged message. Records at `Info` and above are mirrored to
//! the VGA console; the full stream goes to COM1 when the `serial-log`
//! feature is on. Both sinks take their own interrupt-safe locks, so
//! logging is safe from any context that is allowed to print.

use log::{LevelFilter, Log, Metadata, Record};
use spin::Once;

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;
static INIT: Once<()> = Once::new();

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if record.level() <= log::Level::Info {
            println!("[{:<5}] {}", record.level(), record.args());
        }

        #[cfg(feature = "serial-log")]
        serial_println!(
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Installs the kernel logger. Safe to call more than once; only the
/// first call takes effect.
pub fn init(level: LevelFilter) {
    INIT.call_once(|| {
        // A racing `set_logger` from a parallel host test harness is not
        // an error worth dying over.
        log::set_logger(&LOGGER).ok();
        log::set_max_level(level);
    });
}
