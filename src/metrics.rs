use crate::collectors::gpu::{ClockDomain, GpuBackend, GpuDevice, GpuError};
use crate::collectors::{HardwareKind, HardwareMonitor, SensorKind};
use crate::resolver::{NamePredicate, SensorQuery};
use serde::Serialize;
use tracing::debug;

pub const MAX_OUTPUT_LEN: usize = 255;
pub const INVALID_PARAMETER: &str = "Invalid parameter";
pub const RELIABILITY_THROTTLE_BIT: u64 = 0x0000_0000_0000_0004;
const GPU_INDEX: u32 = 0;
const GIB: f32 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Reading {
    Integer(i64),
    Decimal { value: f64, precision: usize },
    Flag(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryResult {
    pub reading: Reading,
    pub unit: Option<&'static str>,
}

impl QueryResult {
    pub fn render(&self, show_units: bool) -> String {
        let mut out = match self.reading {
            Reading::Integer(v) => v.to_string(),
            Reading::Decimal { value, precision } => format!("{value:.precision$}"),
            Reading::Flag(true) => "!".to_string(),
            Reading::Flag(false) => " ".to_string(),
        };
        if show_units {
            if let Some(unit) = self.unit {
                out.push_str(unit);
            }
        }
        bounded(out)
    }
}

pub fn bounded(mut text: String) -> String {
    if text.len() > MAX_OUTPUT_LEN {
        let mut end = MAX_OUTPUT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Truncate,
    Rounded { divisor: f32 },
    Scaled { divisor: f32, precision: usize },
    FanPercent,
}

impl Transform {
    pub fn apply(self, value: f64, fan_max_rpm: u32) -> Reading {
        match self {
            Transform::Truncate => Reading::Integer(value as i64),
            Transform::Rounded { divisor } => {
                Reading::Integer((value / f64::from(divisor) + 0.5).floor() as i64)
            }
            Transform::Scaled { divisor, precision } => Reading::Decimal {
                value: f64::from(value as f32 / divisor),
                precision,
            },
            Transform::FanPercent => {
                if value == 0.0 || fan_max_rpm == 0 {
                    return Reading::Integer(0);
                }
                let ratio = value as f32 / fan_max_rpm as f32;
                Reading::Integer((ratio * 100.0) as i64)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CpuMetric {
    Load,
    Power,
    Temp,
    FanRpm,
    Fan,
    Clock,
}

pub struct CpuEntry {
    pub metric: CpuMetric,
    pub name: &'static str,
    pub transform: Transform,
    pub unit: &'static str,
    pub error: &'static str,
}

pub static CPU_METRICS: [CpuEntry; 6] = [
    CpuEntry {
        metric: CpuMetric::Load,
        name: "Load",
        transform: Transform::Truncate,
        unit: "%",
        error: "Error reading CPU Load",
    },
    CpuEntry {
        metric: CpuMetric::Power,
        name: "Power",
        transform: Transform::Truncate,
        unit: "W",
        error: "Error reading CPU Power",
    },
    CpuEntry {
        metric: CpuMetric::Temp,
        name: "Temp",
        transform: Transform::Truncate,
        unit: "°C",
        error: "Error reading CPU Temp",
    },
    CpuEntry {
        metric: CpuMetric::FanRpm,
        name: "Fan_RPM",
        transform: Transform::Truncate,
        unit: "RPM",
        error: "Error reading Fan Speed",
    },
    CpuEntry {
        metric: CpuMetric::Fan,
        name: "Fan",
        transform: Transform::FanPercent,
        unit: "%",
        error: "Error reading Fan Speed",
    },
    CpuEntry {
        metric: CpuMetric::Clock,
        name: "Clock",
        transform: Transform::Scaled {
            divisor: 1000.0,
            precision: 2,
        },
        unit: "GHz",
        error: "Error reading CPU clock",
    },
];

impl CpuMetric {
    pub fn parse(name: &str) -> Option<Self> {
        CPU_METRICS.iter().find(|e| e.name == name).map(|e| e.metric)
    }

    pub fn entry(self) -> &'static CpuEntry {
        &CPU_METRICS[self as usize]
    }

    pub fn query(self, fan_index: usize) -> SensorQuery {
        match self {
            CpuMetric::Load => SensorQuery::top_level(
                HardwareKind::Cpu,
                SensorKind::Load,
                NamePredicate::Exact("CPU Total"),
            ),
            CpuMetric::Power => SensorQuery::top_level(
                HardwareKind::Cpu,
                SensorKind::Power,
                NamePredicate::Contains("Package"),
            ),
            CpuMetric::Temp => SensorQuery::top_level(
                HardwareKind::Cpu,
                SensorKind::Temperature,
                NamePredicate::Exact("CPU Package"),
            ),
            CpuMetric::FanRpm | CpuMetric::Fan => SensorQuery::fan(fan_index),
            CpuMetric::Clock => SensorQuery::top_level(
                HardwareKind::Cpu,
                SensorKind::Clock,
                NamePredicate::Exact("CPU Core #1"),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanSettings {
    pub index: usize,
    pub max_rpm: u32,
}

pub fn read_cpu(
    monitor: &mut HardwareMonitor,
    fan: FanSettings,
    metric: CpuMetric,
) -> Option<QueryResult> {
    let entry = metric.entry();
    let value = monitor.find_sensor(&metric.query(fan.index))?;
    Some(QueryResult {
        reading: entry.transform.apply(value, fan.max_rpm),
        unit: Some(entry.unit),
    })
}

pub fn format_cpu(
    monitor: &mut HardwareMonitor,
    fan: FanSettings,
    metric: &str,
    show_units: bool,
) -> String {
    let Some(metric) = CpuMetric::parse(metric) else {
        return INVALID_PARAMETER.to_string();
    };
    match read_cpu(monitor, fan, metric) {
        Some(result) => result.render(show_units),
        None => {
            debug!(metric = metric.entry().name, "датчик CPU не найден");
            metric.entry().error.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GpuMetric {
    Temp,
    Limit,
    Fan,
    Power,
    Clock,
    MemClock,
    MemAlloc,
    MemUsage,
    Load,
}

pub struct GpuEntry {
    pub metric: GpuMetric,
    pub name: &'static str,
    pub read: fn(&dyn GpuDevice) -> Result<Reading, GpuError>,
    pub unit: Option<&'static str>,
    pub error: &'static str,
}

pub static GPU_METRICS: [GpuEntry; 9] = [
    GpuEntry {
        metric: GpuMetric::Temp,
        name: "Temp",
        read: read_temperature,
        unit: Some("°C"),
        error: "Error getting temp",
    },
    GpuEntry {
        metric: GpuMetric::Limit,
        name: "Limit",
        read: read_limit,
        unit: None,
        error: "Error getting throttle reasons",
    },
    GpuEntry {
        metric: GpuMetric::Fan,
        name: "Fan",
        read: read_fan,
        unit: Some("%"),
        error: "Error getting fan speed",
    },
    GpuEntry {
        metric: GpuMetric::Power,
        name: "Power",
        read: read_power,
        unit: Some("W"),
        error: "Error getting power usage",
    },
    GpuEntry {
        metric: GpuMetric::Clock,
        name: "Clock",
        read: read_graphics_clock,
        unit: Some("GHz"),
        error: "Error getting GPU clock",
    },
    GpuEntry {
        metric: GpuMetric::MemClock,
        name: "Mem_Clock",
        read: read_memory_clock,
        unit: Some("GHz"),
        error: "Error getting Memory clock",
    },
    GpuEntry {
        metric: GpuMetric::MemAlloc,
        name: "Mem_Alloc",
        read: read_memory_alloc,
        unit: Some("Gb"),
        error: "Error getting memory usage",
    },
    GpuEntry {
        metric: GpuMetric::MemUsage,
        name: "Mem_Usage",
        read: read_memory_usage,
        unit: Some("%"),
        error: "Error getting memory usage",
    },
    GpuEntry {
        metric: GpuMetric::Load,
        name: "Load",
        read: read_load,
        unit: Some("%"),
        error: "Error getting GPU load",
    },
];

const GHZ: Transform = Transform::Scaled {
    divisor: 1000.0,
    precision: 2,
};

fn read_temperature(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    Ok(Reading::Integer(i64::from(device.temperature()?)))
}

fn read_limit(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    let reasons = device.throttle_reasons()?;
    Ok(Reading::Flag(reasons & RELIABILITY_THROTTLE_BIT != 0))
}

fn read_fan(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    Ok(Reading::Integer(i64::from(device.fan_speed()?)))
}

fn read_power(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    let milliwatts = device.power_usage()?;
    Ok(Transform::Rounded { divisor: 1000.0 }.apply(f64::from(milliwatts), 0))
}

fn read_graphics_clock(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    Ok(GHZ.apply(f64::from(device.clock(ClockDomain::Graphics)?), 0))
}

fn read_memory_clock(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    Ok(GHZ.apply(f64::from(device.clock(ClockDomain::Memory)?), 0))
}

fn read_memory_alloc(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    let info = device.memory_info()?;
    Ok(Reading::Decimal {
        value: f64::from(info.used as f32 / GIB),
        precision: 1,
    })
}

fn read_memory_usage(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    let info = device.memory_info()?;
    if info.total == 0 {
        return Ok(Reading::Integer(0));
    }
    let percent = u128::from(info.used) * 100 / u128::from(info.total);
    Ok(Reading::Integer(percent as i64))
}

fn read_load(device: &dyn GpuDevice) -> Result<Reading, GpuError> {
    Ok(Reading::Integer(i64::from(device.utilization()?)))
}

impl GpuMetric {
    pub fn parse(name: &str) -> Option<Self> {
        GPU_METRICS.iter().find(|e| e.name == name).map(|e| e.metric)
    }

    pub fn entry(self) -> &'static GpuEntry {
        &GPU_METRICS[self as usize]
    }
}

pub fn format_gpu(gpu: &dyn GpuBackend, initialized: bool, metric: &str, show_units: bool) -> String {
    if !initialized {
        return GpuError::NotInitialized.to_string();
    }
    let device = match gpu.device(GPU_INDEX) {
        Ok(device) => device,
        Err(err) => return bounded(format!("GPU handle error: {err}")),
    };
    let Some(metric) = GpuMetric::parse(metric) else {
        return INVALID_PARAMETER.to_string();
    };

    let entry = metric.entry();
    match (entry.read)(device.as_ref()) {
        Ok(reading) => QueryResult {
            reading,
            unit: entry.unit,
        }
        .render(show_units),
        Err(err) => {
            debug!(metric = entry.name, error = %err, "ошибка чтения GPU");
            bounded(format!("{}: {err}", entry.error))
        }
    }
}
