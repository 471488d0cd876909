use crate::collectors::{CollectError, HardwareBackend, HardwareKind, HardwareNode, Sensor, SensorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use sysinfo::{ComponentExt, CpuExt, System, SystemExt};
use tracing::debug;

const CPU_ID: &str = "/cpu/0";
const BOARD_ID: &str = "/motherboard";
const HWMON_PREFIX: &str = "/hwmon/";
const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";
const DEFAULT_RAPL_ENERGY: &str = "/sys/class/powercap/intel-rapl:0/energy_uj";
const DMI_BOARD_NAME: &str = "/sys/class/dmi/id/board_name";

pub struct SystemBackend {
    system: System,
    hwmon_root: PathBuf,
    rapl_energy: PathBuf,
    last_energy: Option<(u64, Instant)>,
}

impl Default for SystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBackend {
    pub fn new() -> Self {
        Self::with_paths(DEFAULT_HWMON_ROOT, DEFAULT_RAPL_ENERGY)
    }

    pub fn with_paths(hwmon_root: impl Into<PathBuf>, rapl_energy: impl Into<PathBuf>) -> Self {
        Self {
            system: System::new(),
            hwmon_root: hwmon_root.into(),
            rapl_energy: rapl_energy.into(),
            last_energy: None,
        }
    }

    fn refresh_cpu_node(&mut self, node: &mut HardwareNode) {
        self.system.refresh_cpu();
        self.system.refresh_components();

        let mut sensors = cpu_sensors(&self.system);
        if let Some(watts) = self.sample_package_power() {
            sensors.push(Sensor {
                kind: SensorKind::Power,
                name: "CPU Package".to_string(),
                identifier: format!("{CPU_ID}/power/0"),
                value: watts,
            });
        }
        node.sensors = sensors;
    }

    // None: RAPL unreadable. Some(None): first sample.
    fn sample_package_power(&mut self) -> Option<Option<f64>> {
        let raw = fs::read_to_string(&self.rapl_energy).ok()?;
        let energy_uj = raw.trim().parse::<u64>().ok()?;
        let now = Instant::now();
        let watts = self.last_energy.and_then(|(prev_uj, prev_at)| {
            package_power_watts(prev_uj, energy_uj, now.duration_since(prev_at).as_secs_f64())
        });
        self.last_energy = Some((energy_uj, now));
        Some(watts)
    }
}

impl HardwareBackend for SystemBackend {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn open(&mut self) -> Result<Vec<HardwareNode>, CollectError> {
        self.system.refresh_cpu();
        self.system.refresh_components_list();

        let brand = self
            .system
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "CPU".to_string());
        let mut cpu = HardwareNode::new(HardwareKind::Cpu, brand, CPU_ID);
        self.refresh_cpu_node(&mut cpu);

        let board_name = fs::read_to_string(DMI_BOARD_NAME)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Motherboard".to_string());
        let mut board = HardwareNode::new(HardwareKind::Motherboard, board_name, BOARD_ID);
        board.sub_hardware = scan_fan_chips(&self.hwmon_root);

        debug!(
            cpus = self.system.cpus().len(),
            components = self.system.components().len(),
            fan_chips = board.sub_hardware.len(),
            "дерево sysinfo построено"
        );

        Ok(vec![cpu, board])
    }

    fn update(&mut self, node: &mut HardwareNode) -> Result<(), CollectError> {
        if node.identifier == CPU_ID {
            self.refresh_cpu_node(node);
            return Ok(());
        }
        if let Some(chip) = node.identifier.strip_prefix(HWMON_PREFIX) {
            let dir = self.hwmon_root.join(chip);
            node.sensors = read_fan_sensors(&dir, &node.identifier)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.last_energy = None;
    }
}

fn cpu_sensors(system: &System) -> Vec<Sensor> {
    let mut out = vec![Sensor {
        kind: SensorKind::Load,
        name: "CPU Total".to_string(),
        identifier: format!("{CPU_ID}/load/0"),
        value: Some(f64::from(system.global_cpu_info().cpu_usage())),
    }];

    for (i, c) in system.cpus().iter().enumerate() {
        out.push(Sensor {
            kind: SensorKind::Load,
            name: format!("CPU Core #{}", i + 1),
            identifier: format!("{CPU_ID}/load/{}", i + 1),
            value: Some(f64::from(c.cpu_usage())),
        });
    }
    for (i, c) in system.cpus().iter().enumerate() {
        let mhz = c.frequency();
        out.push(Sensor {
            kind: SensorKind::Clock,
            name: format!("CPU Core #{}", i + 1),
            identifier: format!("{CPU_ID}/clock/{}", i + 1),
            value: (mhz > 0).then_some(mhz as f64),
        });
    }

    let mut has_package = false;
    for (i, c) in system.components().iter().enumerate() {
        let Some(name) = cpu_temperature_name(c.label()) else {
            continue;
        };
        if name == "CPU Package" {
            if has_package {
                continue;
            }
            has_package = true;
        }
        let celsius = c.temperature();
        out.push(Sensor {
            kind: SensorKind::Temperature,
            name,
            identifier: format!("{CPU_ID}/temperature/{i}"),
            value: (celsius.is_finite() && celsius > 0.0).then_some(f64::from(celsius)),
        });
    }

    out
}

fn cpu_temperature_name(label: &str) -> Option<String> {
    let lc = label.to_ascii_lowercase();
    let has_gpu_marker = ["gpu", "nvidia", "amdgpu", "radeon", "nvme", "acpitz"]
        .iter()
        .any(|m| lc.contains(m));
    if has_gpu_marker {
        return None;
    }

    if ["package", "tctl", "tdie", "cpu temperature"]
        .iter()
        .any(|m| lc.contains(m))
    {
        return Some("CPU Package".to_string());
    }

    let idx = lc.find("core ")?;
    let core: usize = lc[idx + "core ".len()..]
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()?;
    Some(format!("CPU Core #{}", core + 1))
}

fn package_power_watts(prev_uj: u64, cur_uj: u64, elapsed_secs: f64) -> Option<f64> {
    if cur_uj < prev_uj || elapsed_secs <= 0.0 {
        return None;
    }
    Some((cur_uj - prev_uj) as f64 / 1_000_000.0 / elapsed_secs)
}

fn scan_fan_chips(root: &Path) -> Vec<HardwareNode> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut chips: Vec<(u32, String)> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            let index = name.strip_prefix("hwmon")?.parse::<u32>().ok()?;
            Some((index, name))
        })
        .collect();
    chips.sort();

    let mut out = Vec::new();
    for (_, dir_name) in chips {
        let dir = root.join(&dir_name);
        let identifier = format!("{HWMON_PREFIX}{dir_name}");
        let Ok(sensors) = read_fan_sensors(&dir, &identifier) else {
            continue;
        };
        if sensors.is_empty() {
            continue;
        }
        let chip_name = fs::read_to_string(dir.join("name"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| dir_name.clone());
        let mut node = HardwareNode::new(HardwareKind::SuperIo, chip_name, identifier);
        node.sensors = sensors;
        out.push(node);
    }
    out
}

fn read_fan_sensors(dir: &Path, identifier: &str) -> Result<Vec<Sensor>, CollectError> {
    let entries = fs::read_dir(dir).map_err(|source| CollectError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut fans: Vec<u32> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            name.strip_prefix("fan")?
                .strip_suffix("_input")?
                .parse::<u32>()
                .ok()
        })
        .collect();
    fans.sort_unstable();

    Ok(fans
        .into_iter()
        .map(|n| {
            let value = fs::read_to_string(dir.join(format!("fan{n}_input")))
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok());
            Sensor {
                kind: SensorKind::Fan,
                name: format!("Fan #{n}"),
                identifier: format!("{identifier}/fan/{n}"),
                value,
            }
        })
        .collect())
}
