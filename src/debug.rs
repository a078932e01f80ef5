//! Debug report callback bridge.
//!
//! Messages from the validation layers arrive through
//! [`report_callback`] (or [`report_callback_with_alert`]) and are written as
//! a single tagged line, `[SEVERITY][layer] message`, to stdout, or to
//! stderr for errors.
use crate::alert;
use crate::driver::Driver;
use ash::vk;
use std::{
    borrow::Cow,
    ffi::{c_void, CStr},
    fmt,
    io::{self, Write},
    os::raw::c_char,
};

/// Severity of a debug report, in classification priority order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Severity {
    /// `VK_DEBUG_REPORT_ERROR_BIT_EXT`.
    Error,
    /// `VK_DEBUG_REPORT_WARNING_BIT_EXT`.
    Warning,
    /// `VK_DEBUG_REPORT_PERFORMANCE_WARNING_BIT_EXT`.
    PerformanceWarning,
    /// `VK_DEBUG_REPORT_DEBUG_BIT_EXT`.
    Debug,
    /// `VK_DEBUG_REPORT_INFORMATION_BIT_EXT`.
    Information,
}

impl Severity {
    const PRIORITY: [(vk::DebugReportFlagsEXT, Severity); 5] = [
        (vk::DebugReportFlagsEXT::ERROR, Severity::Error),
        (vk::DebugReportFlagsEXT::WARNING, Severity::Warning),
        (
            vk::DebugReportFlagsEXT::PERFORMANCE_WARNING,
            Severity::PerformanceWarning,
        ),
        (vk::DebugReportFlagsEXT::DEBUG, Severity::Debug),
        (vk::DebugReportFlagsEXT::INFORMATION, Severity::Information),
    ];

    /// Picks the single most severe tag present in `flags`.
    pub fn classify(flags: vk::DebugReportFlagsEXT) -> Option<Severity> {
        Self::PRIORITY
            .iter()
            .find(|(bit, _)| flags.contains(*bit))
            .map(|&(_, severity)| severity)
    }

    /// Tag printed between the first pair of brackets.
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::PerformanceWarning => "PERF",
            Severity::Debug => "DEBUG",
            Severity::Information => "INFO",
        }
    }

    /// Errors go to stderr, everything else to stdout.
    #[inline]
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Formats one report line, without the trailing newline.
pub fn format_report(severity: Severity, layer: &str, message: &str) -> String {
    format!("[{}][{}] {}", severity, layer, message)
}

/// Writes the report for `flags` to `out`, or to `err` if it classifies as
/// an error. Reports with no recognized severity bit are dropped.
pub fn dispatch_report<'a>(
    flags: vk::DebugReportFlagsEXT,
    layer: &str,
    message: &str,
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
) -> io::Result<Option<Severity>> {
    let severity = match Severity::classify(flags) {
        Some(severity) => severity,
        None => return Ok(None),
    };

    let stream = if severity.is_error() { err } else { out };
    writeln!(stream, "{}", format_report(severity, layer, message))?;
    Ok(Some(severity))
}

unsafe fn lossy<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Classifies, hands the line to `write`, then raises `alert` for errors.
/// A failed write does not suppress the alert.
fn deliver(
    flags: vk::DebugReportFlagsEXT,
    layer: &str,
    message: &str,
    alert_on_error: bool,
    write: impl FnOnce(Severity, &str) -> io::Result<()>,
    alert: impl FnOnce(&str, &str),
) -> Option<Severity> {
    let severity = Severity::classify(flags)?;
    // Nowhere left to report a broken stdout or stderr.
    let _ = write(severity, &format_report(severity, layer, message));

    if alert_on_error && severity.is_error() {
        alert(layer, message);
    }

    Some(severity)
}

fn write_line(severity: Severity, line: &str) -> io::Result<()> {
    if severity.is_error() {
        writeln!(io::stderr().lock(), "{}", line)
    } else {
        writeln!(io::stdout().lock(), "{}", line)
    }
}

unsafe fn bridge(
    flags: vk::DebugReportFlagsEXT,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
    alert_on_error: bool,
) -> vk::Bool32 {
    let layer = lossy(p_layer_prefix);
    let message = lossy(p_message);
    deliver(
        flags,
        &layer,
        &message,
        alert_on_error,
        write_line,
        alert::show_error,
    );

    vk::FALSE
}

/// Debug report callback printing tagged lines. Never aborts the call that
/// triggered it.
pub unsafe extern "system" fn report_callback(
    flags: vk::DebugReportFlagsEXT,
    _object_type: vk::DebugReportObjectTypeEXT,
    _object: u64,
    _location: usize,
    _message_code: i32,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    bridge(flags, p_layer_prefix, p_message, false)
}

/// Same as [`report_callback`], but additionally raises a modal alert for
/// errors on platforms that have one.
pub unsafe extern "system" fn report_callback_with_alert(
    flags: vk::DebugReportFlagsEXT,
    _object_type: vk::DebugReportObjectTypeEXT,
    _object: u64,
    _location: usize,
    _message_code: i32,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    bridge(flags, p_layer_prefix, p_message, true)
}

/// Which reports to receive and how errors are surfaced.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DebugReportDescriptor {
    /// Report categories the callback is invoked for.
    pub flags: vk::DebugReportFlagsEXT,
    /// Raise an OS alert for error reports.
    pub alert_on_error: bool,
}

impl DebugReportDescriptor {
    /// Every report category.
    #[inline]
    pub fn all() -> DebugReportDescriptor {
        DebugReportDescriptor {
            flags: vk::DebugReportFlagsEXT::ERROR
                | vk::DebugReportFlagsEXT::WARNING
                | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING
                | vk::DebugReportFlagsEXT::INFORMATION
                | vk::DebugReportFlagsEXT::DEBUG,
            alert_on_error: true,
        }
    }

    /// Toggle the error alert.
    #[inline]
    pub fn alert_on_error(mut self, alert_on_error: bool) -> DebugReportDescriptor {
        self.alert_on_error = alert_on_error;
        self
    }

    /// Replace the report categories.
    #[inline]
    pub fn flags(mut self, flags: vk::DebugReportFlagsEXT) -> DebugReportDescriptor {
        self.flags = flags;
        self
    }

    /// The callback this descriptor installs.
    pub fn callback(&self) -> vk::PFN_vkDebugReportCallbackEXT {
        if self.alert_on_error {
            Some(report_callback_with_alert)
        } else {
            Some(report_callback)
        }
    }

    /// Create-info usable both for instance chaining and registration.
    pub fn create_info(&self) -> vk::DebugReportCallbackCreateInfoEXT {
        vk::DebugReportCallbackCreateInfoEXT::builder()
            .flags(self.flags)
            .pfn_callback(self.callback())
            .build()
    }
}

impl Default for DebugReportDescriptor {
    fn default() -> Self {
        Self::all()
    }
}

/// Registration state of the debug report callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DebugReporter {
    /// No callback installed.
    #[default]
    Unregistered,
    /// A callback is installed on `instance`.
    Registered {
        /// Instance the callback belongs to.
        instance: vk::Instance,
        /// The callback handle.
        callback: vk::DebugReportCallbackEXT,
    },
}

impl DebugReporter {
    /// Installs the callback on `instance`. The instance must have been
    /// created with the debug report extension enabled.
    pub fn register(
        &mut self,
        driver: &mut impl Driver,
        instance: vk::Instance,
        descriptor: &DebugReportDescriptor,
    ) -> Result<(), vk::Result> {
        if self.is_registered() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }

        let callback = driver.create_debug_report_callback(instance, &descriptor.create_info())?;
        *self = DebugReporter::Registered { instance, callback };
        Ok(())
    }

    /// Removes the callback. Does nothing if none is registered.
    pub fn unregister(&mut self, driver: &mut impl Driver) {
        if let DebugReporter::Registered { instance, callback } = std::mem::take(self) {
            driver.destroy_debug_report_callback(instance, callback);
        }
    }

    /// Whether a callback is currently installed.
    #[inline]
    pub fn is_registered(&self) -> bool {
        matches!(self, DebugReporter::Registered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_priority() {
        use vk::DebugReportFlagsEXT as F;

        assert_eq!(Severity::classify(F::ERROR | F::WARNING), Some(Severity::Error));
        assert_eq!(
            Severity::classify(F::WARNING | F::PERFORMANCE_WARNING | F::DEBUG),
            Some(Severity::Warning)
        );
        assert_eq!(
            Severity::classify(F::PERFORMANCE_WARNING | F::INFORMATION),
            Some(Severity::PerformanceWarning)
        );
        assert_eq!(Severity::classify(F::DEBUG | F::INFORMATION), Some(Severity::Debug));
        assert_eq!(Severity::classify(F::INFORMATION), Some(Severity::Information));
        assert_eq!(Severity::classify(F::empty()), None);
    }

    #[test]
    fn error_and_warning_is_one_error_line_on_stderr() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let severity = dispatch_report(
            vk::DebugReportFlagsEXT::ERROR | vk::DebugReportFlagsEXT::WARNING,
            "Validation",
            "bad handle",
            &mut out,
            &mut err,
        )
        .unwrap();

        assert_eq!(severity, Some(Severity::Error));
        assert!(out.is_empty());
        assert_eq!(String::from_utf8(err).unwrap(), "[ERROR][Validation] bad handle\n");
    }

    #[test]
    fn non_errors_go_to_stdout() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        dispatch_report(
            vk::DebugReportFlagsEXT::PERFORMANCE_WARNING,
            "DS",
            "slow path",
            &mut out,
            &mut err,
        )
        .unwrap();

        assert!(err.is_empty());
        assert_eq!(String::from_utf8(out).unwrap(), "[PERF][DS] slow path\n");
    }

    #[test]
    fn unknown_flags_are_dropped() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let severity = dispatch_report(
            vk::DebugReportFlagsEXT::empty(),
            "x",
            "y",
            &mut out,
            &mut err,
        )
        .unwrap();

        assert_eq!(severity, None);
        assert!(out.is_empty() && err.is_empty());
    }

    #[test]
    fn alert_survives_a_failed_write() {
        let mut alerts = Vec::new();
        let severity = deliver(
            vk::DebugReportFlagsEXT::ERROR,
            "Validation",
            "bad handle",
            true,
            |_, _| Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
            |title, text| alerts.push((title.to_owned(), text.to_owned())),
        );

        assert_eq!(severity, Some(Severity::Error));
        assert_eq!(
            alerts,
            vec![("Validation".to_owned(), "bad handle".to_owned())]
        );
    }

    #[test]
    fn only_errors_raise_alerts() {
        let mut alerts = 0;
        let mut lines = Vec::new();
        for flags in [
            vk::DebugReportFlagsEXT::WARNING,
            vk::DebugReportFlagsEXT::INFORMATION,
        ] {
            deliver(
                flags,
                "Loader",
                "note",
                true,
                |severity, line| {
                    lines.push((severity, line.to_owned()));
                    Ok(())
                },
                |_, _| alerts += 1,
            );
        }
        deliver(
            vk::DebugReportFlagsEXT::ERROR,
            "Loader",
            "quiet",
            false,
            |_, _| Ok(()),
            |_, _| alerts += 1,
        );

        assert_eq!(alerts, 0);
        assert_eq!(
            lines,
            vec![
                (Severity::Warning, "[WARN][Loader] note".to_owned()),
                (Severity::Information, "[INFO][Loader] note".to_owned()),
            ]
        );
    }

    #[test]
    fn callback_never_aborts() {
        let layer = b"Loader\0";
        let message = b"hello\0";
        let result = unsafe {
            report_callback(
                vk::DebugReportFlagsEXT::INFORMATION,
                vk::DebugReportObjectTypeEXT::UNKNOWN,
                0,
                0,
                0,
                layer.as_ptr() as *const c_char,
                message.as_ptr() as *const c_char,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }

    #[test]
    fn descriptor_picks_callback() {
        let quiet = DebugReportDescriptor::all().alert_on_error(false);
        assert_eq!(quiet.create_info().flags, DebugReportDescriptor::all().flags);
        assert!(quiet.create_info().pfn_callback.is_some());
        assert!(DebugReportDescriptor::default().alert_on_error);
    }
}
