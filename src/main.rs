use clap::{Parser, Subcommand};
use smartie_sensors::collectors::{HardwareNode, SensorKind};
use smartie_sensors::config::{Config, MIN_REFRESH_INTERVAL_MS};
use smartie_sensors::privilege::LogNotifier;
use smartie_sensors::Telemetry;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smartie-sensors")]
#[command(version)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Query one CPU metric (Load, Power, Temp, Fan_RPM, Fan, Clock).")]
    Cpu {
        metric: String,
        #[arg(long)]
        units: bool,
    },
    #[command(about = "Query one GPU metric (Temp, Limit, Fan, Power, Clock, Mem_Clock, Mem_Alloc, Mem_Usage, Load).")]
    Gpu {
        metric: String,
        #[arg(long)]
        units: bool,
    },
    #[command(about = "Print metrics repeatedly, e.g. watch cpu:Load gpu:Temp.")]
    Watch {
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        interval: Duration,
        #[arg(long)]
        units: bool,
        #[arg(required = true)]
        metrics: Vec<String>,
    },
    #[command(about = "List the hardware tree with fan ordinals.")]
    Sensors {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Cpu,
    Gpu,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "не удалось загрузить конфигурацию");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let Some(command) = cli.command else {
        error!("не указана команда, см. --help");
        std::process::exit(2);
    };

    let mut telemetry = Telemetry::from_config(&cfg, Box::new(LogNotifier));
    telemetry.startup();

    match command {
        Command::Cpu { metric, units } => println!("{}", telemetry.query_cpu(&metric, flag(units))),
        Command::Gpu { metric, units } => println!("{}", telemetry.query_gpu(&metric, flag(units))),
        Command::Watch {
            interval,
            units,
            metrics,
        } => {
            let targets = match parse_targets(&metrics) {
                Ok(t) => t,
                Err(bad) => {
                    error!(value = %bad, "ожидается cpu:<Metric> или gpu:<Metric>");
                    std::process::exit(2);
                }
            };
            watch(&mut telemetry, &targets, interval, units).await;
        }
        Command::Sensors { json } => {
            let tree = telemetry.sensor_tree();
            if json {
                match serde_json::to_string_pretty(&tree) {
                    Ok(text) => println!("{text}"),
                    Err(err) => error!(error = %err, "не удалось сериализовать дерево датчиков"),
                }
            } else {
                print!("{}", render_tree(&tree));
            }
        }
    }

    telemetry.teardown();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn flag(units: bool) -> &'static str {
    if units {
        "1"
    } else {
        "0"
    }
}

fn parse_targets(raw: &[String]) -> Result<Vec<(Domain, String)>, String> {
    raw.iter()
        .map(|t| match t.split_once(':') {
            Some(("cpu", m)) if !m.is_empty() => Ok((Domain::Cpu, m.to_string())),
            Some(("gpu", m)) if !m.is_empty() => Ok((Domain::Gpu, m.to_string())),
            _ => Err(t.clone()),
        })
        .collect()
}

async fn watch(telemetry: &mut Telemetry, targets: &[(Domain, String)], interval: Duration, units: bool) {
    let min = Duration::from_millis(u64::from(MIN_REFRESH_INTERVAL_MS));
    let period = interval.max(min);
    info!(interval = %humantime::format_duration(period), "опрос датчиков запущен");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("получен Ctrl+C, опрос остановлен");
                break;
            }
            _ = ticker.tick() => {
                let line: Vec<String> = targets
                    .iter()
                    .map(|(domain, metric)| {
                        let value = match domain {
                            Domain::Cpu => telemetry.query_cpu(metric, flag(units)),
                            Domain::Gpu => telemetry.query_gpu(metric, flag(units)),
                        };
                        format!("{metric}={value}")
                    })
                    .collect();
                println!("{}", line.join("  "));
            }
        }
    }
}

fn render_tree(tree: &[HardwareNode]) -> String {
    let mut out = String::new();
    let mut fan_ordinal = 0usize;
    for node in tree {
        render_node(&mut out, node, 0, None);
        for sub in &node.sub_hardware {
            render_node(&mut out, sub, 1, Some(&mut fan_ordinal));
        }
    }
    out
}

fn render_node(out: &mut String, node: &HardwareNode, depth: usize, mut fans: Option<&mut usize>) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!("{pad}{:?} {} [{}]\n", node.kind, node.name, node.identifier));
    for s in &node.sensors {
        let value = s
            .value
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "-".to_string());
        let ordinal = match (s.kind, fans.as_deref_mut()) {
            (SensorKind::Fan, Some(n)) => {
                let tag = format!("  (fan index {n})");
                *n += 1;
                tag
            }
            _ => String::new(),
        };
        out.push_str(&format!("{pad}  {:?} {} = {value}{ordinal}\n", s.kind, s.name));
    }
}
