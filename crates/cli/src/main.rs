use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use lookout_api::{ConsoleApi, DashboardTab, InProcApi, NavEntry, NavTree};
use lookout_core::{ConsoleConfig, ExtensionKind, FlagState, SubsystemHealth};
use lookout_health::HealthReport;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "lookoutctl", version, about = "Lookout console core CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace used for namespaced nav links
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// Override a flag after probing, e.g. --flag SHOW_PIPELINE=true (repeatable)
    #[arg(long = "flag", global = true, value_parser = parse_flag_override)]
    flags: Vec<(String, FlagState)>,

    /// Skip capability discovery against the cluster
    #[arg(long = "no-probe", global = true, action = ArgAction::SetTrue)]
    no_probe: bool,

    /// API server base URL for platform and URL health probes
    #[arg(long = "api-url", global = true, env = "LOOKOUT_API_URL")]
    api_url: Option<String>,

    /// Prometheus base URL for metric health and alerts
    #[arg(long = "prometheus-url", global = true, env = "LOOKOUT_PROMETHEUS_URL")]
    prometheus_url: Option<String>,

    /// Seconds between health polls
    #[arg(long = "poll-secs", global = true, env = "LOOKOUT_POLL_SECS")]
    poll_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List extensions visible under the current flags
    Extensions {
        /// Only this kind, e.g. "NavItem/Href" or "Dashboards/Card"
        #[arg(long = "kind")]
        kind: Option<String>,
    },
    /// List perspectives and their landing pages
    Perspectives,
    /// Show the navigation of a perspective (default perspective if omitted)
    Nav { perspective: Option<String> },
    /// List route pages of a perspective, or resolve one path
    Routes {
        perspective: String,
        #[arg(long = "path")]
        path: Option<String>,
    },
    /// Show dashboard tabs and card placement
    Dashboards,
    /// Show resolved feature flags
    Flags,
    /// Aggregate cluster health
    Health {
        /// Keep printing reports until Ctrl-C
        #[arg(long = "watch", action = ArgAction::SetTrue)]
        watch: bool,
    },
}

fn parse_flag_override(s: &str) -> Result<(String, FlagState), String> {
    let (name, state) = s.split_once('=').ok_or_else(|| format!("expected NAME=STATE, got {}", s))?;
    Ok((name.trim().to_string(), FlagState::from_str(state.trim())?))
}

fn init_tracing() {
    let env = std::env::var("LOOKOUT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("LOOKOUT_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid LOOKOUT_METRICS_ADDR; expected host:port");
        }
    }
}

fn print_structured<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
        Output::Human => {}
    }
    Ok(())
}

fn flag_str(state: FlagState) -> &'static str {
    match state {
        FlagState::True => "true",
        FlagState::False => "false",
        FlagState::Pending => "pending",
    }
}

fn health_line(label: &str, h: &SubsystemHealth) -> String {
    let mut line = format!("{:<14} {:<8} {}", label, h.state.as_str(), h.message.as_deref().unwrap_or(""));
    if let Some(d) = &h.details {
        line.push_str(&format!(" ({})", d));
    }
    line
}

fn print_nav(tree: &NavTree) {
    for entry in &tree.entries {
        match entry {
            NavEntry::Link(l) => println!("{:<24} {}", l.name, l.href),
            NavEntry::Section { name, items } => {
                println!("{}", name);
                for l in items {
                    println!("  {:<22} {}", l.name, l.href);
                }
            }
        }
    }
}

fn print_dashboards(tabs: &[DashboardTab]) {
    for tab in tabs {
        println!("[{}] {}", tab.id, tab.title);
        for (slot, cards) in [("left", &tab.left), ("main", &tab.main), ("right", &tab.right)] {
            for c in cards {
                let span = c.span.map(|s| format!(" span={}", s)).unwrap_or_default();
                println!("  {:<5} {}{}", slot, c.component, span);
            }
        }
    }
}

fn print_health(r: &HealthReport) {
    if r.loading {
        println!("(platform detection pending)");
    }
    println!("{}", health_line("Cluster", &r.cluster));
    println!("{}", health_line(&r.platform.title, &r.platform.health));
    for s in &r.subsystems {
        println!("{}", health_line(&s.title, &s.health));
    }
    for a in &r.alerts {
        println!("! {} [{}] {}", a.name, a.severity.as_deref().unwrap_or("none"), a.message.as_deref().unwrap_or(""));
    }
}

/// A report is settled once the platform and every subsystem have left LOADING.
fn settled(r: &HealthReport) -> bool {
    r.platform.health.state != lookout_core::HealthState::Loading
        && r.subsystems.iter().all(|s| s.health.state != lookout_core::HealthState::Loading)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let mut config = ConsoleConfig::from_env();
    if let Some(u) = cli.api_url.clone() { config.api_url = u; }
    if let Some(u) = cli.prometheus_url.clone() { config.prometheus_url = u; }
    if let Some(p) = cli.poll_secs.filter(|p| *p > 0) { config.poll_secs = p; }
    let wait = config.http_timeout() + Duration::from_secs(2);
    let api = InProcApi::new(config)?;

    if !cli.no_probe {
        match api.probe().await {
            Ok(n) => info!(changed = n, "flags probed"),
            Err(e) => warn!(error = %e, "capability probe failed; flags stay pending"),
        }
    }
    for (name, state) in &cli.flags {
        api.set_flag(name, *state).await?;
    }

    match cli.command {
        Commands::Extensions { kind } => {
            let kind = kind.map(|k| ExtensionKind::from_str(&k)).transpose().map_err(|e| anyhow!(e))?;
            let list = api.extensions(kind).await?;
            match cli.output {
                Output::Human => {
                    for e in &list {
                        let req = e.required.as_deref().map(|r| format!(" [{}]", r)).unwrap_or_default();
                        println!("{:<12} {:<38} {}{}", e.plugin, e.kind, e.summary, req);
                    }
                }
                other => print_structured(other, &list)?,
            }
        }
        Commands::Perspectives => {
            let ps = api.perspectives().await?;
            match cli.output {
                Output::Human => {
                    for p in &ps {
                        let d = if p.default { "*" } else { " " };
                        println!("{} {:<8} {:<16} {}", d, p.id, p.name, p.landing_url);
                    }
                }
                other => print_structured(other, &ps)?,
            }
        }
        Commands::Nav { perspective } => {
            let id = match perspective {
                Some(p) => p,
                None => api
                    .perspectives()
                    .await?
                    .into_iter()
                    .find(|p| p.default)
                    .map(|p| p.id)
                    .context("no perspective registered")?,
            };
            let tree = api.nav(&id, cli.namespace.as_deref()).await?;
            match cli.output {
                Output::Human => print_nav(&tree),
                other => print_structured(other, &tree)?,
            }
        }
        Commands::Routes { perspective, path } => {
            let routes = match path {
                Some(p) => vec![api.resolve_route(&perspective, &p).await?],
                None => api.routes(&perspective).await?,
            };
            match cli.output {
                Output::Human => {
                    for r in &routes {
                        let exact = if r.exact { " (exact)" } else { "" };
                        println!("{:<20} {}{}", r.component, r.paths.join(" "), exact);
                    }
                }
                other => print_structured(other, &routes)?,
            }
        }
        Commands::Dashboards => {
            let tabs = api.dashboards().await?;
            match cli.output {
                Output::Human => print_dashboards(&tabs),
                other => print_structured(other, &tabs)?,
            }
        }
        Commands::Flags => {
            let flags = api.flags().await?;
            match cli.output {
                Output::Human => {
                    for (name, state) in &flags {
                        println!("{:<20} {}", name, flag_str(*state));
                    }
                }
                other => {
                    let map: std::collections::BTreeMap<_, _> = flags.into_iter().collect();
                    print_structured(other, &map)?
                }
            }
        }
        Commands::Health { watch } => {
            let mut handle = api.health().await?;
            if watch {
                loop {
                    tokio::select! {
                        changed = handle.rx.changed() => {
                            if changed.is_err() {
                                warn!("health stream closed; exiting watch loop");
                                break;
                            }
                            let report = handle.rx.borrow_and_update().clone();
                            match cli.output {
                                Output::Human => { print_health(&report); println!(); }
                                other => print_structured(other, &report)?,
                            }
                        }
                        _ = signal::ctrl_c() => {
                            info!("Ctrl-C received; stopping health watch");
                            break;
                        }
                    }
                }
            } else {
                let deadline = tokio::time::Instant::now() + wait;
                loop {
                    if settled(&handle.rx.borrow_and_update()) {
                        break;
                    }
                    match tokio::time::timeout_at(deadline, handle.rx.changed()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) | Err(_) => {
                            warn!("health did not settle in time; printing partial report");
                            break;
                        }
                    }
                }
                let report = handle.rx.borrow().clone();
                match cli.output {
                    Output::Human => print_health(&report),
                    other => print_structured(other, &report)?,
                }
            }
            handle.cancel.cancel().await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_parse() {
        assert_eq!(parse_flag_override("SHOW_PIPELINE=true").unwrap(), ("SHOW_PIPELINE".to_string(), FlagState::True));
        assert_eq!(parse_flag_override("CEPH = off").unwrap(), ("CEPH".to_string(), FlagState::False));
        assert!(parse_flag_override("CEPH").is_err());
        assert!(parse_flag_override("CEPH=maybe").is_err());
    }

    #[test]
    fn cli_accepts_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lookoutctl", "nav", "dev", "--ns", "demo", "--flag", "OPENSHIFT=true", "-o", "yaml"]).unwrap();
        assert_eq!(cli.output, Output::Yaml);
        assert_eq!(cli.namespace.as_deref(), Some("demo"));
        assert_eq!(cli.flags, vec![("OPENSHIFT".to_string(), FlagState::True)]);
        assert!(matches!(cli.command, Commands::Nav { perspective: Some(ref p) } if p == "dev"));
    }
}
