/// Default name of the control device.
pub const DEFAULT_DEVICE_NAME: &str = "irq_eventfd";

/// Default upper bound on the number of events a single device may expose.
pub const DEFAULT_MAX_EVENTS: usize = 1024;

/// Configuration of an [`IrqFdRegistry`](crate::IrqFdRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqFdConfig {
    /// Name of the control device, used as the log prefix.
    pub name: &'static str,
    /// Log every control request at `info` level instead of `trace`.
    pub verbose: bool,
    /// Largest event count accepted by `register`.
    pub max_events: usize,
}

/// The implemention for IrqFdConfig
impl IrqFdConfig {
    /// The new function for IrqFdConfig
    pub const fn new(name: &'static str, verbose: bool, max_events: usize) -> Self {
        Self {
            name,
            verbose,
            max_events,
        }
    }

    /// Enables or disables verbose request logging.
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the per-device event limit.
    pub const fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }
}

impl Default for IrqFdConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_NAME, false, DEFAULT_MAX_EVENTS)
    }
}
