use crate::collectors::{CollectError, HardwareBackend, HardwareKind, HardwareNode, Sensor, SensorKind};
use serde::Deserialize;
use tracing::debug;

const NAMESPACES: [&str; 2] = ["ROOT\\LibreHardwareMonitor", "ROOT\\OpenHardwareMonitor"];

#[derive(Default)]
pub struct LhmBackend {
    namespace: Option<&'static str>,
}

impl LhmBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HardwareBackend for LhmBackend {
    fn name(&self) -> &'static str {
        "lhm"
    }

    fn open(&mut self) -> Result<Vec<HardwareNode>, CollectError> {
        let mut last_err = None;
        for ns in NAMESPACES {
            match wmi_source::hardware(ns) {
                Ok(rows) => {
                    let tree = build_tree(rows.into_iter().filter_map(HardwareRow::into_line));
                    if tree.is_empty() {
                        last_err = Some(CollectError::EmptyNamespace(ns.to_string()));
                        continue;
                    }
                    debug!(namespace = ns, hardware = tree.len(), "найдено пространство WMI");
                    self.namespace = Some(ns);
                    return Ok(tree);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| CollectError::EmptyNamespace(NAMESPACES[0].to_string())))
    }

    fn update(&mut self, node: &mut HardwareNode) -> Result<(), CollectError> {
        let ns = self.namespace.ok_or(CollectError::EmptyNamespace(String::new()))?;
        node.sensors = sensors_from_rows(wmi_source::sensors(ns, &node.identifier)?);
        Ok(())
    }

    fn close(&mut self) {
        self.namespace = None;
        wmi_source::close();
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HardwareRow {
    hardware_type: String,
    name: String,
    identifier: String,
    parent: Option<String>,
}

impl HardwareRow {
    fn into_line(self) -> Option<HardwareLine> {
        let identifier = self.identifier.trim().to_string();
        if identifier.is_empty() {
            return None;
        }
        Some(HardwareLine {
            kind: hardware_kind(self.hardware_type.trim()),
            name: self.name.trim().to_string(),
            identifier,
            parent: self.parent.map(|p| p.trim().to_string()).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SensorRow {
    sensor_type: String,
    name: String,
    value: Option<f32>,
    identifier: String,
    index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
struct HardwareLine {
    kind: HardwareKind,
    name: String,
    identifier: String,
    parent: String,
}

fn hardware_kind(raw: &str) -> HardwareKind {
    match raw.to_ascii_lowercase().as_str() {
        "cpu" => HardwareKind::Cpu,
        "motherboard" | "mainboard" => HardwareKind::Motherboard,
        "superio" => HardwareKind::SuperIo,
        "gpunvidia" | "gpuamd" | "gpuati" | "gpuintel" => HardwareKind::Gpu,
        "memory" | "ram" => HardwareKind::Memory,
        "storage" | "hdd" => HardwareKind::Storage,
        _ => HardwareKind::Other,
    }
}

fn sensor_kind(raw: &str) -> SensorKind {
    match raw.to_ascii_lowercase().as_str() {
        "load" => SensorKind::Load,
        "power" => SensorKind::Power,
        "temperature" => SensorKind::Temperature,
        "fan" => SensorKind::Fan,
        "clock" => SensorKind::Clock,
        _ => SensorKind::Other,
    }
}

fn build_tree(lines: impl IntoIterator<Item = HardwareLine>) -> Vec<HardwareNode> {
    let mut pending: Vec<HardwareLine> = lines.into_iter().collect();
    let known: Vec<String> = pending.iter().map(|l| l.identifier.clone()).collect();
    let mut roots: Vec<HardwareNode> = Vec::new();

    pending.retain(|l| {
        if l.parent.is_empty() || !known.contains(&l.parent) {
            roots.push(HardwareNode::new(l.kind, l.name.clone(), l.identifier.clone()));
            false
        } else {
            true
        }
    });

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|l| match find_node_mut(&mut roots, &l.parent) {
            Some(parent) => {
                parent
                    .sub_hardware
                    .push(HardwareNode::new(l.kind, l.name.clone(), l.identifier.clone()));
                false
            }
            None => true,
        });
        if pending.len() == before {
            // Parent cycle; keep what is left reachable.
            for l in pending.drain(..) {
                roots.push(HardwareNode::new(l.kind, l.name, l.identifier));
            }
        }
    }

    roots
}

fn find_node_mut<'a>(nodes: &'a mut [HardwareNode], identifier: &str) -> Option<&'a mut HardwareNode> {
    for node in nodes.iter_mut() {
        if node.identifier == identifier {
            return Some(node);
        }
        if let Some(found) = find_node_mut(&mut node.sub_hardware, identifier) {
            return Some(found);
        }
    }
    None
}

fn sensors_from_rows(rows: Vec<SensorRow>) -> Vec<Sensor> {
    let mut indexed: Vec<(i32, Sensor)> = rows
        .into_iter()
        .map(|row| {
            (
                row.index.unwrap_or(i32::MAX),
                Sensor {
                    kind: sensor_kind(row.sensor_type.trim()),
                    name: row.name.trim().to_string(),
                    identifier: row.identifier,
                    value: row.value.map(f64::from).filter(|v| v.is_finite()),
                },
            )
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, s)| s).collect()
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn wql_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(target_os = "windows")]
mod wmi_source {
    use super::{wql_quote, HardwareRow, SensorRow};
    use crate::collectors::CollectError;
    use std::cell::RefCell;
    use wmi::{COMLibrary, WMIConnection};

    // COM objects belong to the thread that created them.
    thread_local! {
        static CONNECTION: RefCell<Option<(&'static str, WMIConnection)>> = const { RefCell::new(None) };
    }

    fn with_connection<T>(
        ns: &'static str,
        f: impl FnOnce(&WMIConnection) -> Result<T, CollectError>,
    ) -> Result<T, CollectError> {
        CONNECTION.with(|cell| {
            let mut slot = cell.borrow_mut();
            if !matches!(slot.as_ref(), Some((open, _)) if *open == ns) {
                let com = COMLibrary::without_security()?;
                *slot = Some((ns, WMIConnection::with_namespace_path(ns, com)?));
            }
            match slot.as_ref() {
                Some((_, con)) => f(con),
                None => Err(CollectError::EmptyNamespace(ns.to_string())),
            }
        })
    }

    pub(super) fn hardware(ns: &'static str) -> Result<Vec<HardwareRow>, CollectError> {
        with_connection(ns, |con| {
            Ok(con.raw_query("SELECT HardwareType, Name, Identifier, Parent FROM Hardware")?)
        })
    }

    pub(super) fn sensors(ns: &'static str, parent: &str) -> Result<Vec<SensorRow>, CollectError> {
        let query = format!(
            "SELECT SensorType, Name, Value, Identifier, Index FROM Sensor WHERE Parent = '{}'",
            wql_quote(parent)
        );
        with_connection(ns, |con| Ok(con.raw_query(&query)?))
    }

    pub(super) fn close() {
        CONNECTION.with(|cell| cell.borrow_mut().take());
    }
}

#[cfg(not(target_os = "windows"))]
mod wmi_source {
    use super::{HardwareRow, SensorRow};
    use crate::collectors::CollectError;

    pub(super) fn hardware(_ns: &'static str) -> Result<Vec<HardwareRow>, CollectError> {
        Err(CollectError::Unsupported("WMI"))
    }

    pub(super) fn sensors(_ns: &'static str, _parent: &str) -> Result<Vec<SensorRow>, CollectError> {
        Err(CollectError::Unsupported("WMI"))
    }

    pub(super) fn close() {}
}
