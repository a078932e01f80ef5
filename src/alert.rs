//! Blocking OS alert for error reports.

/// Shows a modal error dialog and blocks until it is dismissed. No-op on
/// platforms without a native message box.
#[cfg(target_os = "windows")]
pub fn show_error(title: &str, text: &str) {
    use std::ffi::c_void;

    const MB_OK: u32 = 0x0000_0000;
    const MB_ICONERROR: u32 = 0x0000_0010;

    #[link(name = "user32")]
    extern "system" {
        fn MessageBoxW(hwnd: *mut c_void, text: *const u16, caption: *const u16, kind: u32)
            -> i32;
    }

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    let text = wide(text);
    let title = wide(title);
    unsafe {
        MessageBoxW(
            std::ptr::null_mut(),
            text.as_ptr(),
            title.as_ptr(),
            MB_OK | MB_ICONERROR,
        );
    }
}

/// Shows a modal error dialog and blocks until it is dismissed. No-op on
/// platforms without a native message box.
#[cfg(not(target_os = "windows"))]
#[inline]
pub fn show_error(_title: &str, _text: &str) {}
