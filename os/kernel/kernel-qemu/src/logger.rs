use core::fmt;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// [`Log`] implementation writing to the QEMU debug port.
pub struct QemuLogger {
    max_level: LevelFilter,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Register as the global logger. Call once during early init.
    ///
    /// # Errors
    /// If another logger was installed first.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

/// `"[LEVEL] target: message\n"`
///
/// # Errors
/// Propagates errors from `out`.
pub fn format_record<W: fmt::Write + ?Sized>(out: &mut W, record: &Record) -> fmt::Result {
    writeln!(out, "[{}] {}: {}", record.level(), record.target(), record.args())
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::qemu_trace!("{}", Formatted(record));
    }

    fn flush(&self) {}
}

struct Formatted<'a, 'r>(&'a Record<'r>);

impl fmt::Display for Formatted<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_record(f, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn formats_level_target_and_message() {
        let mut out = String::new();
        format_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .target("kernel_alloc::vmm")
                .args(format_args!("additional loader code region {}", 2))
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[WARN] kernel_alloc::vmm: additional loader code region 2\n");
    }

    #[test]
    fn filters_by_max_level() {
        let logger = QemuLogger::new(LevelFilter::Info);
        let info = Metadata::builder().level(Level::Info).build();
        let trace = Metadata::builder().level(Level::Trace).build();
        assert!(logger.enabled(&info));
        assert!(!logger.enabled(&trace));
    }
}
