use crate::config::{Config, MIN_REFRESH_INTERVAL_MS};
use crate::privilege::DesktopNotifier;
use crate::state::Telemetry;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use tracing::error;
use tracing_subscriber::EnvFilter;

struct Plugin {
    telemetry: Telemetry,
    cpu_out: CString,
    gpu_out: CString,
}

impl Plugin {
    fn new() -> Self {
        init_tracing();
        Self {
            telemetry: Telemetry::from_config(&Config::default(), Box::new(DesktopNotifier)),
            cpu_out: CString::default(),
            gpu_out: CString::default(),
        }
    }
}

const EMPTY: &[u8] = b"\0";

static PLUGIN: Mutex<Option<Plugin>> = Mutex::new(None);

fn lock_plugin() -> MutexGuard<'static, Option<Plugin>> {
    PLUGIN.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_plugin<R>(f: impl FnOnce(&mut Plugin) -> R) -> R {
    let mut guard = lock_plugin();
    let plugin = guard.get_or_insert_with(Plugin::new);
    f(plugin)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn to_host_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| *c != '\0')
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn param(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_bytes().iter().map(|&b| char::from(b)).collect()
}

fn store(slot: &mut CString, text: &str) -> *const c_char {
    *slot = CString::new(to_host_bytes(text)).unwrap_or_default();
    slot.as_ptr()
}

#[no_mangle]
pub extern "system" fn SmartieInit() {
    let result = catch_unwind(|| with_plugin(|p| p.telemetry.startup()));
    if result.is_err() {
        error!("паника при инициализации плагина");
    }
}

#[no_mangle]
pub extern "system" fn SmartieFini() {
    let result = catch_unwind(|| {
        if let Some(plugin) = lock_plugin().as_mut() {
            plugin.telemetry.teardown();
        }
    });
    if result.is_err() {
        error!("паника при завершении плагина");
    }
}

#[no_mangle]
pub extern "system" fn GetMinRefreshInterval() -> c_int {
    MIN_REFRESH_INTERVAL_MS as c_int
}

/// # Safety
/// Both parameters must be null or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "system" fn function1(param1: *const c_char, param2: *const c_char) -> *const c_char {
    let metric = param(param1);
    let units = param(param2);
    let result = catch_unwind(AssertUnwindSafe(|| {
        with_plugin(|p| {
            let text = p.telemetry.query_cpu(&metric, &units);
            store(&mut p.cpu_out, &text)
        })
    }));
    result.unwrap_or_else(|_| {
        error!(metric = %metric, "паника при чтении CPU");
        EMPTY.as_ptr().cast()
    })
}

/// # Safety
/// Both parameters must be null or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "system" fn function2(param1: *const c_char, param2: *const c_char) -> *const c_char {
    let metric = param(param1);
    let units = param(param2);
    let result = catch_unwind(AssertUnwindSafe(|| {
        with_plugin(|p| {
            let text = p.telemetry.query_gpu(&metric, &units);
            store(&mut p.gpu_out, &text)
        })
    }));
    result.unwrap_or_else(|_| {
        error!(metric = %metric, "паника при чтении GPU");
        EMPTY.as_ptr().cast()
    })
}
