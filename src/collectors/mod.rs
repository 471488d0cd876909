pub mod gpu;
pub mod lhm;
pub mod system;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HardwareKind {
    Cpu,
    Motherboard,
    SuperIo,
    Gpu,
    Memory,
    Storage,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorKind {
    Load,
    Power,
    Temperature,
    Fan,
    Clock,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sensor {
    pub kind: SensorKind,
    pub name: String,
    pub identifier: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HardwareNode {
    pub kind: HardwareKind,
    pub name: String,
    pub identifier: String,
    pub sensors: Vec<Sensor>,
    pub sub_hardware: Vec<HardwareNode>,
}

impl HardwareNode {
    pub fn new(kind: HardwareKind, name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            identifier: identifier.into(),
            sensors: Vec::new(),
            sub_hardware: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("ошибка ввода-вывода при чтении {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[cfg(target_os = "windows")]
    #[error("ошибка WMI: {0}")]
    Wmi(#[from] wmi::WMIError),
    #[error("источник {0} недоступен на этой платформе")]
    Unsupported(&'static str),
    #[error("пространство WMI {0} не содержит данных")]
    EmptyNamespace(String),
}

pub trait HardwareBackend: Send {
    fn name(&self) -> &'static str;
    fn open(&mut self) -> Result<Vec<HardwareNode>, CollectError>;
    fn update(&mut self, node: &mut HardwareNode) -> Result<(), CollectError>;
    fn close(&mut self);
}

pub struct AutoBackend {
    lhm: lhm::LhmBackend,
    system: system::SystemBackend,
    use_lhm: bool,
}

impl Default for AutoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoBackend {
    pub fn new() -> Self {
        Self {
            lhm: lhm::LhmBackend::new(),
            system: system::SystemBackend::new(),
            use_lhm: false,
        }
    }

    fn active(&mut self) -> &mut dyn HardwareBackend {
        if self.use_lhm {
            &mut self.lhm
        } else {
            &mut self.system
        }
    }
}

impl HardwareBackend for AutoBackend {
    fn name(&self) -> &'static str {
        if self.use_lhm {
            self.lhm.name()
        } else {
            self.system.name()
        }
    }

    fn open(&mut self) -> Result<Vec<HardwareNode>, CollectError> {
        match self.lhm.open() {
            Ok(tree) => {
                self.use_lhm = true;
                Ok(tree)
            }
            Err(err) => {
                debug!(error = %err, "LibreHardwareMonitor недоступен, используется sysinfo");
                self.use_lhm = false;
                self.system.open()
            }
        }
    }

    fn update(&mut self, node: &mut HardwareNode) -> Result<(), CollectError> {
        self.active().update(node)
    }

    fn close(&mut self) {
        self.active().close();
    }
}

pub struct HardwareMonitor {
    backend: Box<dyn HardwareBackend>,
    tree: Option<Vec<HardwareNode>>,
}

impl HardwareMonitor {
    pub fn new(backend: Box<dyn HardwareBackend>) -> Self {
        Self {
            backend,
            tree: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.tree.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn open(&mut self) -> Result<(), CollectError> {
        if self.tree.is_some() {
            return Ok(());
        }
        let nodes = self.backend.open()?;
        info!(
            backend = self.backend.name(),
            hardware = nodes.len(),
            "источник датчиков открыт"
        );
        self.tree = Some(nodes);
        Ok(())
    }

    pub fn close(&mut self) {
        if self.tree.take().is_some() {
            self.backend.close();
            debug!(backend = self.backend.name(), "источник датчиков закрыт");
        }
    }

    pub(crate) fn walk_parts(
        &mut self,
    ) -> Option<(&mut dyn HardwareBackend, &mut Vec<HardwareNode>)> {
        if self.tree.is_none() {
            if let Err(err) = self.open() {
                warn!(error = %err, "не удалось открыть источник датчиков");
                return None;
            }
        }
        let tree = self.tree.as_mut()?;
        Some((self.backend.as_mut(), tree))
    }

    pub fn snapshot(&mut self) -> Vec<HardwareNode> {
        let Some((backend, tree)) = self.walk_parts() else {
            return Vec::new();
        };
        for node in tree.iter_mut() {
            refresh_node(backend, node);
            for sub in node.sub_hardware.iter_mut() {
                refresh_node(backend, sub);
            }
        }
        tree.clone()
    }
}

impl Drop for HardwareMonitor {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn refresh_node(backend: &mut dyn HardwareBackend, node: &mut HardwareNode) {
    if let Err(err) = backend.update(node) {
        debug!(
            backend = backend.name(),
            hardware = %node.identifier,
            error = %err,
            "не удалось обновить датчики"
        );
    }
}
