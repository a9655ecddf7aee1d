// crates/knxproj-rs-xml/src/log.rs

/// Trait for structs that provide metadata for logging
pub(crate) trait LogMetadata {
    fn meta(&self) -> String;
}

/// Identifies the resolution pass and the document it is working on.
pub(crate) struct LogContext<'a> {
    pub component: &'static str,
    pub document: &'a str,
}

impl<'a> LogContext<'a> {
    pub(crate) fn new(component: &'static str, document: &'a str) -> Self {
        Self {
            component,
            document,
        }
    }
}

impl LogMetadata for LogContext<'_> {
    fn meta(&self) -> String {
        format!("component={}, document={}", self.component, self.document)
    }
}

// =============================================
// Logging Macros (namespaced under crate::log)
// =============================================

// ===== ctx_info! =====
macro_rules! ctx_info {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::info!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

// ===== ctx_warn! =====
macro_rules! ctx_warn {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::warn!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

// ===== ctx_debug! =====
macro_rules! ctx_debug {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::debug!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

// ===== ctx_trace! =====
macro_rules! ctx_trace {
    ($ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        ::log::trace!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

// Re-export macros for use in other files
pub(crate) use ctx_debug;
pub(crate) use ctx_info;
pub(crate) use ctx_trace;
pub(crate) use ctx_warn;
