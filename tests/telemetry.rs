use smartie_sensors::collectors::gpu::{ClockDomain, GpuBackend, GpuDevice, GpuError, MemoryInfo};
use smartie_sensors::collectors::{
    CollectError, HardwareBackend, HardwareKind, HardwareNode, Sensor, SensorKind,
};
use smartie_sensors::privilege::Notifier;
use smartie_sensors::{Config, Telemetry};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Counters {
    gpu_init: Arc<Mutex<u32>>,
    gpu_shutdown: Arc<Mutex<u32>>,
    hw_open: Arc<Mutex<u32>>,
    hw_close: Arc<Mutex<u32>>,
    hw_update: Arc<Mutex<u32>>,
    messages: Arc<Mutex<Vec<(String, String, bool)>>>,
}

fn bump(counter: &Arc<Mutex<u32>>) {
    *counter.lock().unwrap() += 1;
}

fn read(counter: &Arc<Mutex<u32>>) -> u32 {
    *counter.lock().unwrap()
}

fn sensor(kind: SensorKind, name: &str, value: Option<f64>) -> Sensor {
    Sensor {
        kind,
        name: name.to_string(),
        identifier: format!("/test/{name}"),
        value,
    }
}

fn desktop_tree() -> Vec<HardwareNode> {
    let mut cpu = HardwareNode::new(HardwareKind::Cpu, "Test CPU", "/cpu/0");
    cpu.sensors = vec![
        sensor(SensorKind::Load, "CPU Core #1", Some(80.0)),
        sensor(SensorKind::Load, "CPU Total", Some(37.9)),
        sensor(SensorKind::Power, "CPU Package", Some(65.4)),
        sensor(SensorKind::Temperature, "CPU Core #1", Some(70.0)),
        sensor(SensorKind::Temperature, "CPU Package", Some(54.6)),
        sensor(SensorKind::Clock, "Bus Speed", Some(100.0)),
        sensor(SensorKind::Clock, "CPU Core #1", Some(2450.0)),
    ];

    let mut board = HardwareNode::new(HardwareKind::Motherboard, "Board", "/motherboard");
    let mut chip = HardwareNode::new(HardwareKind::SuperIo, "Nuvoton", "/lpc/nct");
    chip.sensors = vec![
        sensor(SensorKind::Fan, "Fan #1", Some(0.0)),
        sensor(SensorKind::Fan, "Fan #2", Some(1200.0)),
        sensor(SensorKind::Fan, "Fan #3", Some(900.0)),
    ];
    board.sub_hardware = vec![chip];

    vec![cpu, board]
}

struct FakeHardware {
    tree: Vec<HardwareNode>,
    fail_open: bool,
    counters: Counters,
}

impl HardwareBackend for FakeHardware {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open(&mut self) -> Result<Vec<HardwareNode>, CollectError> {
        bump(&self.counters.hw_open);
        if self.fail_open {
            return Err(CollectError::Unsupported("fake"));
        }
        Ok(self.tree.clone())
    }

    fn update(&mut self, _node: &mut HardwareNode) -> Result<(), CollectError> {
        bump(&self.counters.hw_update);
        Ok(())
    }

    fn close(&mut self) {
        bump(&self.counters.hw_close);
    }
}

#[derive(Clone, Copy)]
struct FakeReadings {
    throttle: u64,
    fan: Result<u32, &'static str>,
    memory: MemoryInfo,
}

impl Default for FakeReadings {
    fn default() -> Self {
        Self {
            throttle: 0,
            fan: Ok(42),
            memory: MemoryInfo {
                used: 1 << 30,
                total: 8 << 30,
            },
        }
    }
}

struct FakeGpu {
    init_error: Option<&'static str>,
    handle_error: Option<&'static str>,
    readings: FakeReadings,
    counters: Counters,
}

struct FakeDevice(FakeReadings);

impl GpuDevice for FakeDevice {
    fn temperature(&self) -> Result<u32, GpuError> {
        Ok(61)
    }
    fn throttle_reasons(&self) -> Result<u64, GpuError> {
        Ok(self.0.throttle)
    }
    fn fan_speed(&self) -> Result<u32, GpuError> {
        self.0.fan.map_err(|e| GpuError::Unavailable(e.to_string()))
    }
    fn power_usage(&self) -> Result<u32, GpuError> {
        Ok(120_600)
    }
    fn clock(&self, domain: ClockDomain) -> Result<u32, GpuError> {
        Ok(match domain {
            ClockDomain::Graphics => 2450,
            ClockDomain::Memory => 10501,
        })
    }
    fn memory_info(&self) -> Result<MemoryInfo, GpuError> {
        Ok(self.0.memory)
    }
    fn utilization(&self) -> Result<u32, GpuError> {
        Ok(97)
    }
}

impl GpuBackend for FakeGpu {
    fn init(&mut self) -> Result<(), GpuError> {
        bump(&self.counters.gpu_init);
        match self.init_error {
            Some(text) => Err(GpuError::Unavailable(text.to_string())),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        bump(&self.counters.gpu_shutdown);
    }

    fn device(&self, _index: u32) -> Result<Box<dyn GpuDevice + '_>, GpuError> {
        match self.handle_error {
            Some(text) => Err(GpuError::Unavailable(text.to_string())),
            None => Ok(Box::new(FakeDevice(self.readings))),
        }
    }
}

struct RecordingNotifier(Counters);

impl Notifier for RecordingNotifier {
    fn alert(&self, title: &str, message: &str) {
        self.0
            .messages
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string(), true));
    }

    fn notify(&self, title: &str, message: &str) {
        self.0
            .messages
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string(), false));
    }
}

struct Fixture {
    tree: Vec<HardwareNode>,
    fail_open: bool,
    init_error: Option<&'static str>,
    handle_error: Option<&'static str>,
    readings: FakeReadings,
    elevated: bool,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            tree: desktop_tree(),
            fail_open: false,
            init_error: None,
            handle_error: None,
            readings: FakeReadings::default(),
            elevated: true,
        }
    }
}

impl Fixture {
    fn build(self) -> (Telemetry, Counters) {
        let counters = Counters::default();
        let hardware = FakeHardware {
            tree: self.tree,
            fail_open: self.fail_open,
            counters: counters.clone(),
        };
        let gpu = FakeGpu {
            init_error: self.init_error,
            handle_error: self.handle_error,
            readings: self.readings,
            counters: counters.clone(),
        };
        let telemetry = Telemetry::new(
            &Config::default(),
            Box::new(hardware),
            Box::new(gpu),
            Box::new(RecordingNotifier(counters.clone())),
        );
        let telemetry = if self.elevated {
            telemetry.with_privilege_check(|| true)
        } else {
            telemetry.with_privilege_check(|| false)
        };
        (telemetry, counters)
    }

    fn started(self) -> (Telemetry, Counters) {
        let (mut telemetry, counters) = self.build();
        telemetry.startup();
        (telemetry, counters)
    }
}

#[test]
fn unknown_metrics_are_invalid_parameters() {
    let (mut t, _) = Fixture::default().started();
    assert_eq!(t.query_cpu("Voltage", "1"), "Invalid parameter");
    assert_eq!(t.query_cpu("load", "0"), "Invalid parameter");
    assert_eq!(t.query_cpu("", ""), "Invalid parameter");
    assert_eq!(t.query_gpu("Fan_RPM", "1"), "Invalid parameter");
    assert_eq!(t.query_gpu("", "1"), "Invalid parameter");
}

#[test]
fn gpu_reports_not_initialized_before_startup_and_after_teardown() {
    let (mut t, counters) = Fixture::default().build();
    assert_eq!(t.query_gpu("Temp", "1"), "NVML not initialized");
    assert_eq!(t.query_gpu("Bogus", "1"), "NVML not initialized");

    t.startup();
    assert_eq!(t.query_gpu("Temp", "1"), "61°C");

    t.teardown();
    assert_eq!(t.query_gpu("Temp", "1"), "NVML not initialized");
    assert_eq!(read(&counters.gpu_shutdown), 1);
    assert_eq!(read(&counters.hw_close), 1);
}

#[test]
fn repeated_startup_initializes_gpu_once() {
    let (mut t, counters) = Fixture::default().build();
    t.startup();
    t.startup();
    t.startup();
    assert_eq!(read(&counters.gpu_init), 1);
    assert_eq!(read(&counters.hw_open), 1);
    assert!(t.is_gpu_initialized());
    assert!(t.is_hardware_open());
    assert!(counters.messages.lock().unwrap().is_empty());
}

#[test]
fn failed_gpu_init_is_reported_and_queries_degrade() {
    let (mut t, counters) = Fixture {
        init_error: Some("Driver Not Loaded"),
        ..Fixture::default()
    }
    .started();

    let messages = counters.messages.lock().unwrap().clone();
    assert_eq!(
        messages,
        [(
            "NVML Init Failed".to_string(),
            "Driver Not Loaded".to_string(),
            false
        )]
    );
    assert!(!t.is_gpu_initialized());
    assert_eq!(t.query_gpu("Load", "1"), "NVML not initialized");
    assert_eq!(t.query_cpu("Load", "1"), "37%");

    // Teardown still closes the hardware tree.
    t.teardown();
    assert_eq!(read(&counters.gpu_shutdown), 0);
    assert_eq!(read(&counters.hw_close), 1);
}

#[test]
fn missing_privileges_raise_blocking_alert() {
    let (_t, counters) = Fixture {
        elevated: false,
        ..Fixture::default()
    }
    .started();
    let messages = counters.messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "Error");
    assert_eq!(
        messages[0].1,
        "Administrative privileges required for this plugin"
    );
    assert!(messages[0].2);
}

#[test]
fn hardware_open_failure_is_reported() {
    let (mut t, counters) = Fixture {
        fail_open: true,
        ..Fixture::default()
    }
    .started();
    let messages = counters.messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "Initialization Error");
    assert!(!t.is_hardware_open());
    assert_eq!(t.query_cpu("Temp", "1"), "Error reading CPU Temp");
}

#[test]
fn cpu_metrics_with_and_without_units() {
    let (mut t, _) = Fixture::default().started();
    let cases = [
        ("Load", "37%", "37"),
        ("Power", "65W", "65"),
        ("Temp", "54°C", "54"),
        ("Fan_RPM", "900RPM", "900"),
        ("Fan", "50%", "50"),
        ("Clock", "2.45GHz", "2.45"),
    ];
    for (metric, with_units, bare) in cases {
        assert_eq!(t.query_cpu(metric, "1"), with_units, "{metric}");
        assert_eq!(t.query_cpu(metric, "0"), bare, "{metric}");
        assert_eq!(t.query_cpu(metric, "yes"), bare, "{metric}");
    }
}

#[test]
fn cpu_queries_open_hardware_lazily() {
    let (mut t, counters) = Fixture::default().build();
    assert!(!t.is_hardware_open());
    assert_eq!(t.query_cpu("Load", "0"), "37");
    assert!(t.is_hardware_open());
    assert_eq!(read(&counters.hw_open), 1);
}

#[test]
fn every_cpu_query_refreshes_sensors() {
    let (mut t, counters) = Fixture::default().started();
    let before = read(&counters.hw_update);
    t.query_cpu("Temp", "0");
    let after_one = read(&counters.hw_update);
    t.query_cpu("Temp", "0");
    assert!(after_one > before);
    assert!(read(&counters.hw_update) > after_one);
}

#[test]
fn missing_cpu_sensors_report_metric_errors() {
    let (mut t, _) = Fixture {
        tree: vec![HardwareNode::new(HardwareKind::Cpu, "Bare", "/cpu/0")],
        ..Fixture::default()
    }
    .started();
    assert_eq!(t.query_cpu("Load", "1"), "Error reading CPU Load");
    assert_eq!(t.query_cpu("Power", "1"), "Error reading CPU Power");
    assert_eq!(t.query_cpu("Temp", "1"), "Error reading CPU Temp");
    assert_eq!(t.query_cpu("Fan_RPM", "1"), "Error reading Fan Speed");
    assert_eq!(t.query_cpu("Fan", "1"), "Error reading Fan Speed");
    assert_eq!(t.query_cpu("Clock", "1"), "Error reading CPU clock");
}

#[test]
fn stopped_fan_reads_zero_percent() {
    let mut tree = desktop_tree();
    tree[1].sub_hardware[0].sensors[2].value = Some(0.0);
    let (mut t, _) = Fixture {
        tree,
        ..Fixture::default()
    }
    .started();
    assert_eq!(t.query_cpu("Fan", "1"), "0%");
    assert_eq!(t.query_cpu("Fan_RPM", "1"), "0RPM");
}

#[test]
fn gpu_metrics_with_and_without_units() {
    let (mut t, _) = Fixture::default().started();
    let cases = [
        ("Temp", "61°C", "61"),
        ("Fan", "42%", "42"),
        ("Power", "121W", "121"),
        ("Clock", "2.45GHz", "2.45"),
        ("Mem_Clock", "10.50GHz", "10.50"),
        ("Mem_Alloc", "1.0Gb", "1.0"),
        ("Mem_Usage", "12%", "12"),
        ("Load", "97%", "97"),
    ];
    for (metric, with_units, bare) in cases {
        assert_eq!(t.query_gpu(metric, "1"), with_units, "{metric}");
        assert_eq!(t.query_gpu(metric, "0"), bare, "{metric}");
    }
}

#[test]
fn limit_flag_follows_reliability_bit() {
    let (mut t, _) = Fixture::default().started();
    assert_eq!(t.query_gpu("Limit", "1"), " ");

    let (mut t, _) = Fixture {
        readings: FakeReadings {
            throttle: 0x4 | 0x1,
            ..FakeReadings::default()
        },
        ..Fixture::default()
    }
    .started();
    assert_eq!(t.query_gpu("Limit", "1"), "!");
    assert_eq!(t.query_gpu("Limit", "0"), "!");
}

#[test]
fn gpu_read_failure_embeds_backend_text() {
    let (mut t, _) = Fixture {
        readings: FakeReadings {
            fan: Err("Not Supported"),
            ..FakeReadings::default()
        },
        ..Fixture::default()
    }
    .started();
    assert_eq!(t.query_gpu("Fan", "1"), "Error getting fan speed: Not Supported");
}

#[test]
fn gpu_handle_error_precedes_metric_validation() {
    let (mut t, _) = Fixture {
        handle_error: Some("GPU is lost"),
        ..Fixture::default()
    }
    .started();
    assert_eq!(t.query_gpu("Temp", "1"), "GPU handle error: GPU is lost");
    assert_eq!(t.query_gpu("Nope", "1"), "GPU handle error: GPU is lost");
}

#[test]
fn sensor_tree_snapshot_contains_sub_hardware() {
    let (mut t, _) = Fixture::default().started();
    let tree = t.sensor_tree();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[1].sub_hardware[0].sensors.len(), 3);
    assert_eq!(t.minimum_refresh_interval(), 300);
}
