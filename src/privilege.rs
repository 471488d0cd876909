use tracing::{error, warn};

#[cfg(target_os = "windows")]
pub fn is_elevated() -> bool {
    use std::ffi::c_void;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    let mut token = HANDLE::default();
    // SAFETY: the pseudo handle from GetCurrentProcess needs no closing and
    // `token` is a valid out pointer.
    if let Err(err) = unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) } {
        warn!(error = %err, "не удалось открыть токен процесса");
        return false;
    }

    let mut elevation = TOKEN_ELEVATION::default();
    let mut returned = 0u32;
    // SAFETY: the buffer is a TOKEN_ELEVATION of the advertised size and the
    // token was opened with TOKEN_QUERY above.
    let result = unsafe {
        GetTokenInformation(
            token,
            TokenElevation,
            Some(std::ptr::addr_of_mut!(elevation).cast::<c_void>()),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        )
    };
    // SAFETY: `token` is an open handle owned by this function.
    let _ = unsafe { CloseHandle(token) };

    match result {
        Ok(()) => elevation.TokenIsElevated != 0,
        Err(err) => {
            warn!(error = %err, "не удалось проверить права администратора");
            false
        }
    }
}

#[cfg(unix)]
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(any(unix, target_os = "windows")))]
pub fn is_elevated() -> bool {
    false
}

pub trait Notifier: Send {
    fn alert(&self, title: &str, message: &str);
    fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn alert(&self, title: &str, message: &str) {
        error!(title, "{message}");
        show_message_box(title, message);
    }

    fn notify(&self, title: &str, message: &str) {
        warn!(title, "{message}");
        let (title, message) = (title.to_string(), message.to_string());
        let spawned = std::thread::Builder::new()
            .name("smartie-notify".to_string())
            .spawn(move || show_message_box(&title, &message));
        if let Err(err) = spawned {
            warn!(error = %err, "не удалось показать окно сообщения");
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, title: &str, message: &str) {
        error!(title, "{message}");
    }

    fn notify(&self, title: &str, message: &str) {
        warn!(title, "{message}");
    }
}

#[cfg(target_os = "windows")]
fn show_message_box(title: &str, message: &str) {
    use windows::core::HSTRING;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK};

    // SAFETY: both strings outlive the call and no owner window is passed.
    unsafe {
        MessageBoxW(
            HWND::default(),
            &HSTRING::from(message),
            &HSTRING::from(title),
            MB_OK | MB_ICONERROR,
        );
    }
}

#[cfg(not(target_os = "windows"))]
fn show_message_box(_title: &str, _message: &str) {}
