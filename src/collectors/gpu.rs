use nvml_wrapper::enum_wrappers::device::{Clock, ClockId, TemperatureSensor};
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("NVML not initialized")]
    NotInitialized,
    #[error("{0}")]
    Nvml(#[from] NvmlError),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDomain {
    Graphics,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub used: u64,
    pub total: u64,
}

pub trait GpuDevice {
    fn temperature(&self) -> Result<u32, GpuError>;
    fn throttle_reasons(&self) -> Result<u64, GpuError>;
    fn fan_speed(&self) -> Result<u32, GpuError>;
    fn power_usage(&self) -> Result<u32, GpuError>;
    fn clock(&self, domain: ClockDomain) -> Result<u32, GpuError>;
    fn memory_info(&self) -> Result<MemoryInfo, GpuError>;
    fn utilization(&self) -> Result<u32, GpuError>;
}

pub trait GpuBackend: Send {
    fn init(&mut self) -> Result<(), GpuError>;
    fn shutdown(&mut self);
    fn device(&self, index: u32) -> Result<Box<dyn GpuDevice + '_>, GpuError>;
}

#[derive(Default)]
pub struct NvmlBackend {
    nvml: Option<Nvml>,
}

impl NvmlBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpuBackend for NvmlBackend {
    fn init(&mut self) -> Result<(), GpuError> {
        if self.nvml.is_some() {
            return Ok(());
        }
        let nvml = Nvml::init()?;
        match nvml.sys_driver_version() {
            Ok(version) => info!(driver = %version, "NVML инициализирована"),
            Err(_) => info!("NVML инициализирована"),
        }
        self.nvml = Some(nvml);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(nvml) = self.nvml.take() {
            if let Err(err) = nvml.shutdown() {
                warn!(error = %err, "ошибка при завершении NVML");
            }
        }
    }

    fn device(&self, index: u32) -> Result<Box<dyn GpuDevice + '_>, GpuError> {
        let nvml = self.nvml.as_ref().ok_or(GpuError::NotInitialized)?;
        let device = nvml.device_by_index(index)?;
        Ok(Box::new(NvmlDevice { device }))
    }
}

struct NvmlDevice<'nvml> {
    device: Device<'nvml>,
}

impl GpuDevice for NvmlDevice<'_> {
    fn temperature(&self) -> Result<u32, GpuError> {
        Ok(self.device.temperature(TemperatureSensor::Gpu)?)
    }

    fn throttle_reasons(&self) -> Result<u64, GpuError> {
        Ok(self.device.current_throttle_reasons()?.bits())
    }

    fn fan_speed(&self) -> Result<u32, GpuError> {
        Ok(self.device.fan_speed(0)?)
    }

    fn power_usage(&self) -> Result<u32, GpuError> {
        Ok(self.device.power_usage()?)
    }

    fn clock(&self, domain: ClockDomain) -> Result<u32, GpuError> {
        let clock = match domain {
            ClockDomain::Graphics => Clock::Graphics,
            ClockDomain::Memory => Clock::Memory,
        };
        Ok(self.device.clock(clock, ClockId::Current)?)
    }

    fn memory_info(&self) -> Result<MemoryInfo, GpuError> {
        let info = self.device.memory_info()?;
        Ok(MemoryInfo {
            used: info.used,
            total: info.total,
        })
    }

    fn utilization(&self) -> Result<u32, GpuError> {
        Ok(self.device.utilization_rates()?.gpu)
    }
}
