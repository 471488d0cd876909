use crate::collectors::{refresh_node, HardwareKind, HardwareMonitor, HardwareNode, SensorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePredicate {
    Exact(&'static str),
    Contains(&'static str),
    // Counted across all sub-hardware in enumeration order.
    Ordinal(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorQuery {
    pub hardware: Option<HardwareKind>,
    pub sensor: SensorKind,
    pub name: NamePredicate,
    pub search_subhardware: bool,
}

impl SensorQuery {
    pub const fn top_level(hardware: HardwareKind, sensor: SensorKind, name: NamePredicate) -> Self {
        Self {
            hardware: Some(hardware),
            sensor,
            name,
            search_subhardware: false,
        }
    }

    pub const fn fan(index: usize) -> Self {
        Self {
            hardware: None,
            sensor: SensorKind::Fan,
            name: NamePredicate::Ordinal(index),
            search_subhardware: true,
        }
    }
}

impl HardwareMonitor {
    pub fn find_sensor(&mut self, query: &SensorQuery) -> Option<f64> {
        let (backend, tree) = self.walk_parts()?;
        let mut ordinal = 0usize;

        for node in tree.iter_mut() {
            if let Some(kind) = query.hardware {
                if node.kind != kind {
                    continue;
                }
            }
            refresh_node(backend, node);

            // A node whose refresh failed keeps its last values so fan
            // ordinals of later chips do not shift.
            if query.search_subhardware {
                for sub in node.sub_hardware.iter_mut() {
                    refresh_node(backend, sub);
                    if let Some(v) = match_sensors(sub, query, &mut ordinal) {
                        return Some(v);
                    }
                }
            } else if let Some(v) = match_sensors(node, query, &mut ordinal) {
                return Some(v);
            }
        }

        None
    }
}

fn match_sensors(node: &HardwareNode, query: &SensorQuery, ordinal: &mut usize) -> Option<f64> {
    for sensor in node.sensors.iter().filter(|s| s.kind == query.sensor) {
        let hit = match query.name {
            NamePredicate::Exact(name) => sensor.name == name,
            NamePredicate::Contains(part) => sensor.name.contains(part),
            NamePredicate::Ordinal(index) => {
                let hit = *ordinal == index;
                *ordinal += 1;
                hit
            }
        };
        if hit {
            return Some(sensor.value.unwrap_or(0.0));
        }
    }
    None
}
