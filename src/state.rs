use crate::collectors::gpu::{GpuBackend, NvmlBackend};
use crate::collectors::lhm::LhmBackend;
use crate::collectors::system::SystemBackend;
use crate::collectors::{AutoBackend, HardwareBackend, HardwareMonitor, HardwareNode};
use crate::config::{BackendKind, Config, MIN_REFRESH_INTERVAL_MS};
use crate::metrics::{self, FanSettings};
use crate::privilege::{self, Notifier};
use tracing::{debug, info};

const PRIVILEGE_TITLE: &str = "Error";
const PRIVILEGE_MESSAGE: &str = "Administrative privileges required for this plugin";
const NVML_INIT_TITLE: &str = "NVML Init Failed";
const HARDWARE_INIT_TITLE: &str = "Initialization Error";

pub struct Telemetry {
    fan: FanSettings,
    hardware: HardwareMonitor,
    gpu: Box<dyn GpuBackend>,
    gpu_initialized: bool,
    notifier: Box<dyn Notifier>,
    privilege_check: fn() -> bool,
}

impl Telemetry {
    pub fn new(
        config: &Config,
        hardware: Box<dyn HardwareBackend>,
        gpu: Box<dyn GpuBackend>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            fan: FanSettings {
                index: config.fan_index,
                max_rpm: config.fan_max_rpm,
            },
            hardware: HardwareMonitor::new(hardware),
            gpu,
            gpu_initialized: false,
            notifier,
            privilege_check: privilege::is_elevated,
        }
    }

    pub fn from_config(config: &Config, notifier: Box<dyn Notifier>) -> Self {
        let hardware: Box<dyn HardwareBackend> = match config.backend {
            BackendKind::Lhm => Box::new(LhmBackend::new()),
            BackendKind::Sysinfo => Box::new(SystemBackend::new()),
            BackendKind::Auto if cfg!(target_os = "windows") => Box::new(AutoBackend::new()),
            BackendKind::Auto => Box::new(SystemBackend::new()),
        };
        Self::new(config, hardware, Box::new(NvmlBackend::new()), notifier)
    }

    pub fn with_privilege_check(mut self, check: fn() -> bool) -> Self {
        self.privilege_check = check;
        self
    }

    pub fn startup(&mut self) {
        if !(self.privilege_check)() {
            self.notifier.alert(PRIVILEGE_TITLE, PRIVILEGE_MESSAGE);
        }

        if !self.gpu_initialized {
            match self.gpu.init() {
                Ok(()) => self.gpu_initialized = true,
                Err(err) => self.notifier.notify(NVML_INIT_TITLE, &err.to_string()),
            }
        }

        if let Err(err) = self.hardware.open() {
            self.notifier.notify(HARDWARE_INIT_TITLE, &err.to_string());
        }

        info!(
            gpu = self.gpu_initialized,
            hardware = self.hardware.is_open(),
            backend = self.hardware.backend_name(),
            "инициализация завершена"
        );
    }

    pub fn teardown(&mut self) {
        if self.gpu_initialized {
            self.gpu.shutdown();
            self.gpu_initialized = false;
        }
        self.hardware.close();
        debug!("ресурсы освобождены");
    }

    pub const fn minimum_refresh_interval(&self) -> u32 {
        MIN_REFRESH_INTERVAL_MS
    }

    pub fn is_gpu_initialized(&self) -> bool {
        self.gpu_initialized
    }

    pub fn is_hardware_open(&self) -> bool {
        self.hardware.is_open()
    }

    pub fn query_cpu(&mut self, metric: &str, show_units_flag: &str) -> String {
        metrics::format_cpu(&mut self.hardware, self.fan, metric, show_units(show_units_flag))
    }

    pub fn query_gpu(&mut self, metric: &str, show_units_flag: &str) -> String {
        metrics::format_gpu(
            self.gpu.as_ref(),
            self.gpu_initialized,
            metric,
            show_units(show_units_flag),
        )
    }

    pub fn sensor_tree(&mut self) -> Vec<HardwareNode> {
        self.hardware.snapshot()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub fn show_units(flag: &str) -> bool {
    flag == "1"
}
