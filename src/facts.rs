// SPDX-License-Identifier: MIT
//! Cluster Facts Provider.
//!
//! Thin adapter over the ScoutAM/ScoutFS command-line tools. All subprocess
//! invocation and output scraping lives here, behind the [`FactsSource`]
//! trait; checks only ever see typed facts. Every query runs with a bounded
//! timeout — a timeout is a failed query, never retried.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::CheckError;

/// ScoutFS filesystem tool.
pub const SCOUTFS_CMD: &str = "/usr/sbin/scoutfs";
/// ScoutAM mount monitor.
pub const SCOUTAM_MONITOR_CMD: &str = "/usr/sbin/scoutam-monitor";
/// ScoutAM admin CLI.
pub const SAMCLI_CMD: &str = "/usr/bin/samcli";

/// Upper bound on any single collaborator query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Typed facts ──────────────────────────────────────────────────────────────

/// One mounted ScoutFS filesystem as reported by the mount monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub path: String,
    /// Whether the local node leads this filesystem's quorum.
    pub is_leader: bool,
    pub device: String,
    pub fsid: String,
}

/// Capacity figures for one filesystem, in whole percent.
///
/// Watermarks are the cluster-configured defaults used when no explicit
/// thresholds were supplied; they may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub meta_used_pct: u64,
    pub data_used_pct: u64,
    pub high_watermark_pct: Option<u64>,
    pub low_watermark_pct: Option<u64>,
}

/// The three logical scheduler queues, in fixed enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Scheduler,
    Archiving,
    Staging,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Scheduler, QueueKind::Archiving, QueueKind::Staging];

    pub fn label(self) -> &'static str {
        match self {
            QueueKind::Scheduler => "scheduler",
            QueueKind::Archiving => "archiving",
            QueueKind::Staging => "staging",
        }
    }
}

/// The two S3 gateway flavors, each with its own unit template and conf dir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFlavor {
    Scoutgw,
    Versitygw,
}

impl GatewayFlavor {
    pub fn label(self) -> &'static str {
        match self {
            GatewayFlavor::Scoutgw => "ScoutGW",
            GatewayFlavor::Versitygw => "VersityGW",
        }
    }

    pub fn binary(self) -> &'static str {
        match self {
            GatewayFlavor::Scoutgw => "scoutgw",
            GatewayFlavor::Versitygw => "versitygw",
        }
    }

    pub fn conf_dir(self) -> &'static str {
        match self {
            GatewayFlavor::Scoutgw => "/etc/scoutgw.d",
            GatewayFlavor::Versitygw => "/etc/versitygw.d",
        }
    }

    pub fn unit_prefix(self) -> &'static str {
        match self {
            GatewayFlavor::Scoutgw => "scoutgw@",
            GatewayFlavor::Versitygw => "versitygw@",
        }
    }
}

/// One configured gateway instance and whether its unit is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUnit {
    pub name: String,
    pub running: bool,
}

/// Gateway discovery result for one flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayFacts {
    /// The gateway binary is not on PATH; the flavor is not deployed here.
    NotInstalled,
    /// Configured instances in conf-dir discovery order.
    Units(Vec<GatewayUnit>),
}

/// Arfind/stfind restart state for one kind on one filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    NotBlocked,
    /// Restart is blocked on a specific inode pending an operation.
    Blocked { inode: u64, reason: String },
}

/// Per-filesystem blocking diagnostics from `samcli debug seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDiag {
    pub mount: String,
    pub fsid: String,
    pub arfind: BlockState,
    pub stfind: BlockState,
}

// ─── FactsSource seam ─────────────────────────────────────────────────────────

/// Read-only view of the cluster, queried at most once per fact group per
/// invocation. Checks depend on this trait; tests substitute a fixture.
#[async_trait]
pub trait FactsSource: Send + Sync {
    /// Locally mounted ScoutFS filesystems, in monitor output order.
    async fn mounts(&self) -> Result<Vec<Mount>, CheckError>;

    /// Capacity figures for one mount (leader-only data, cluster-wide view).
    async fn usage(&self, mount: &str) -> Result<FsUsage, CheckError>;

    /// Whether a process-manager unit is active.
    async fn service_active(&self, unit: &str) -> Result<bool, CheckError>;

    /// Scheduler queues currently idled, in [`QueueKind::ALL`] order.
    async fn idle_queues(&self) -> Result<Vec<QueueKind>, CheckError>;

    /// Configured gateway instances for one flavor.
    async fn gateways(&self, flavor: GatewayFlavor) -> Result<GatewayFacts, CheckError>;

    /// Address of the current scheduler/leader node.
    async fn scheduler_address(&self) -> Result<String, CheckError>;

    /// Arfind/stfind blocking diagnostics, one entry per filesystem.
    async fn sequence_diagnostics(&self) -> Result<Vec<SequenceDiag>, CheckError>;

    /// Short hostname of the local node.
    fn local_hostname(&self) -> Result<String, CheckError>;
}

// ─── Live implementation ──────────────────────────────────────────────────────

/// Facts provider backed by the real cluster tools.
pub struct LiveFacts {
    mounts: OnceCell<Vec<Mount>>,
    scheduler_address: OnceCell<String>,
}

impl LiveFacts {
    pub fn new() -> Self {
        Self {
            mounts: OnceCell::new(),
            scheduler_address: OnceCell::new(),
        }
    }

    /// Verify the cluster tool binaries exist before any check runs.
    pub fn required_tools_present() -> Result<(), CheckError> {
        for tool in [SCOUTFS_CMD, SCOUTAM_MONITOR_CMD, SAMCLI_CMD] {
            if !Path::new(tool).is_file() {
                return Err(CheckError::ToolMissing(tool.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for LiveFacts {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a cluster tool with a bounded timeout and return its stdout.
async fn run_tool(program: &str, args: &[&str]) -> Result<String, CheckError> {
    debug!(program, ?args, "running cluster tool");
    let output = tokio::time::timeout(
        QUERY_TIMEOUT,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await
    .map_err(|_| {
        CheckError::query(
            program,
            format!("timed out after {}s", QUERY_TIMEOUT.as_secs()),
        )
    })?
    .map_err(|e| CheckError::query(program, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CheckError::query(
            program,
            format!(
                "exit {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    trace!(program, bytes = stdout.len(), "cluster tool output");
    Ok(stdout)
}

/// Run a tool where a non-zero exit is an answer, not a failure.
/// Returns true when the tool exited 0. Timeouts still fail the query.
async fn run_tool_status(program: &str, args: &[&str]) -> Result<bool, CheckError> {
    debug!(program, ?args, "querying tool status");
    let output = tokio::time::timeout(
        QUERY_TIMEOUT,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await
    .map_err(|_| {
        CheckError::query(
            program,
            format!("timed out after {}s", QUERY_TIMEOUT.as_secs()),
        )
    })?
    .map_err(|e| CheckError::query(program, e.to_string()))?;
    Ok(output.status.success())
}

/// Minimal `which`-equivalent: returns `Some(path)` if the binary is on PATH.
fn which_bin(name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|path_var| {
        std::env::split_paths(&path_var).find_map(|dir| {
            let candidate = dir.join(name);
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        })
    })
}

#[async_trait]
impl FactsSource for LiveFacts {
    async fn mounts(&self) -> Result<Vec<Mount>, CheckError> {
        self.mounts
            .get_or_try_init(|| async {
                let out = run_tool(SCOUTAM_MONITOR_CMD, &["-print"]).await?;
                Ok(parse_mounts(&out))
            })
            .await
            .map(|mounts| mounts.clone())
    }

    async fn usage(&self, mount: &str) -> Result<FsUsage, CheckError> {
        let df = run_tool(SCOUTFS_CMD, &["df", "--path", mount]).await?;
        let stat = run_tool(SAMCLI_CMD, &["fs", "stat", "-m", mount]).await?;
        parse_usage(&df, &stat)
    }

    async fn service_active(&self, unit: &str) -> Result<bool, CheckError> {
        run_tool_status("systemctl", &["is-active", "--quiet", unit]).await
    }

    async fn idle_queues(&self) -> Result<Vec<QueueKind>, CheckError> {
        let out = run_tool(SAMCLI_CMD, &["scheduler"]).await?;
        Ok(parse_idle_queues(&out))
    }

    async fn gateways(&self, flavor: GatewayFlavor) -> Result<GatewayFacts, CheckError> {
        if which_bin(flavor.binary()).is_none() {
            return Ok(GatewayFacts::NotInstalled);
        }
        let conf_dir = Path::new(flavor.conf_dir());
        if !conf_dir.is_dir() {
            return Ok(GatewayFacts::Units(Vec::new()));
        }
        let names = list_gateway_configs(conf_dir)
            .map_err(|e| CheckError::query(flavor.conf_dir(), e.to_string()))?;

        let mut units = Vec::with_capacity(names.len());
        for name in names {
            let unit = format!("{}{}", flavor.unit_prefix(), name);
            let running = self.service_active(&unit).await?;
            units.push(GatewayUnit { name, running });
        }
        Ok(GatewayFacts::Units(units))
    }

    async fn scheduler_address(&self) -> Result<String, CheckError> {
        self.scheduler_address
            .get_or_try_init(|| async {
                let out = run_tool(SAMCLI_CMD, &["system"]).await?;
                parse_scheduler_name(&out).ok_or_else(|| {
                    CheckError::query(SAMCLI_CMD, "scheduler name not found in system output")
                })
            })
            .await
            .map(|addr| addr.clone())
    }

    async fn sequence_diagnostics(&self) -> Result<Vec<SequenceDiag>, CheckError> {
        let out = run_tool(SAMCLI_CMD, &["debug", "seq", "-c"]).await?;
        Ok(parse_sequence_diagnostics(&out))
    }

    fn local_hostname(&self) -> Result<String, CheckError> {
        sysinfo::System::host_name()
            .ok_or_else(|| CheckError::query("hostname", "local hostname unavailable"))
    }
}

/// Configured gateway instance names: `<name>.conf` entries in discovery
/// order, skipping the shipped example config.
fn list_gateway_configs(conf_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(conf_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(base) = file_name.strip_suffix(".conf") {
            if base == "example" {
                continue;
            }
            names.push(base.to_string());
        }
    }
    Ok(names)
}

// ─── Output parsers ───────────────────────────────────────────────────────────

static MOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"MountPoint: \(string\) \(len=\d+\) "(?P<mount>[^"]+)",\s*IsLeader: \(bool\) (?P<leader>\w+),\s*Device: \(string\) \(len=\d+\) "(?P<device>[^"]+)",\s*Fsid: \(fs\.FSID\) (?P<fsid>[a-zA-Z0-9]+)"#,
    )
    .expect("mount regex")
});

fn parse_mounts(output: &str) -> Vec<Mount> {
    MOUNT_RE
        .captures_iter(output)
        .map(|cap| Mount {
            path: cap["mount"].to_string(),
            is_leader: &cap["leader"] == "true",
            device: cap["device"].to_string(),
            fsid: cap["fsid"].to_string(),
        })
        .collect()
}

static USAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(MetaData|Data)\s+\S+\s+\d+\s+\d+\s+\d+\s+(\d+)\s*$").expect("usage regex")
});
static HWM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*High Watermark:\D*(\d+)%").expect("hwm regex"));
static LWM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Low Watermark:\D*(\d+)%").expect("lwm regex"));

fn parse_usage(df_output: &str, stat_output: &str) -> Result<FsUsage, CheckError> {
    let mut meta = None;
    let mut data = None;
    for cap in USAGE_RE.captures_iter(df_output) {
        let pct: u64 = cap[2]
            .parse()
            .map_err(|_| CheckError::query(SCOUTFS_CMD, "unparseable usage percentage"))?;
        match &cap[1] {
            "MetaData" => meta = Some(pct),
            "Data" => data = Some(pct),
            _ => {}
        }
    }
    let (meta_used_pct, data_used_pct) = match (meta, data) {
        (Some(m), Some(d)) => (m, d),
        _ => {
            return Err(CheckError::query(
                SCOUTFS_CMD,
                "MetaData/Data rows not found in df output",
            ))
        }
    };

    let pct_capture = |re: &Regex| {
        re.captures(stat_output)
            .and_then(|c| c[1].parse::<u64>().ok())
    };

    Ok(FsUsage {
        meta_used_pct,
        data_used_pct,
        high_watermark_pct: pct_capture(&HWM_RE),
        low_watermark_pct: pct_capture(&LWM_RE),
    })
}

static SCHEDULER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^scheduler name\s*:\s*(.+)$").expect("scheduler name regex"));

fn parse_scheduler_name(output: &str) -> Option<String> {
    SCHEDULER_NAME_RE
        .captures(output)
        .map(|c| c[1].trim().to_string())
}

fn parse_idle_queues(output: &str) -> Vec<QueueKind> {
    let mut idle = Vec::new();
    for (marker, kind) in [
        ("SCHEDULER IS IDLED", QueueKind::Scheduler),
        ("ARCHIVING IS IDLED", QueueKind::Archiving),
        ("STAGING IS IDLED", QueueKind::Staging),
    ] {
        if output.lines().any(|l| l.trim() == marker) {
            idle.push(kind);
        }
    }
    idle
}

static FS_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<fsid>[a-zA-Z0-9]+)\s+Mount:\s*(?P<mount>[^\n]+)").expect("fs header regex")
});
static ARFIND_BLOCKED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Arfind Restart Blocked:\s*(\d+):\s*(.+)").expect("arfind regex"));
static STFIND_BLOCKED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Stfind Restart Blocked:\s*(\d+):\s*(.+)").expect("stfind regex"));

fn parse_block_state(content: &str, blocked_re: &Regex) -> BlockState {
    match blocked_re.captures(content) {
        Some(cap) => match cap[1].parse::<u64>() {
            Ok(inode) => BlockState::Blocked {
                inode,
                reason: cap[2].trim().to_string(),
            },
            Err(_) => BlockState::NotBlocked,
        },
        None => BlockState::NotBlocked,
    }
}

fn parse_sequence_diagnostics(output: &str) -> Vec<SequenceDiag> {
    // One block per filesystem, each introduced by a "### FSID:" header.
    output
        .split("### FSID:")
        .skip(1)
        .filter_map(|block| {
            let cap = FS_HEADER_RE.captures(block)?;
            Some(SequenceDiag {
                mount: cap["mount"].trim().to_string(),
                fsid: cap["fsid"].to_string(),
                arfind: parse_block_state(block, &ARFIND_BLOCKED_RE),
                stfind: parse_block_state(block, &STFIND_BLOCKED_RE),
            })
        })
        .collect()
}

/// In-memory [`FactsSource`] fixture for tests.
#[doc(hidden)]
pub mod tests_support {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// Canned cluster facts. Each field mirrors one fact group; names listed
    /// in `failing` make the matching query return a [`CheckError::Query`].
    #[derive(Debug, Clone, Default)]
    pub struct StaticFacts {
        pub mounts: Vec<Mount>,
        pub usage: HashMap<String, FsUsage>,
        pub active_units: HashSet<String>,
        pub idle_queues: Vec<QueueKind>,
        pub scoutgw: Option<GatewayFacts>,
        pub versitygw: Option<GatewayFacts>,
        pub scheduler_address: String,
        pub hostname: String,
        pub sequence_diags: Vec<SequenceDiag>,
        pub failing: HashSet<&'static str>,
    }

    impl StaticFacts {
        /// A single-filesystem leader node with everything healthy.
        pub fn healthy() -> Self {
            let mut facts = Self {
                mounts: vec![Mount {
                    path: "/mnt/fs1".into(),
                    is_leader: true,
                    device: "/dev/sdb1".into(),
                    fsid: "a1b2c3d4".into(),
                }],
                scheduler_address: "node-a.example.com".into(),
                hostname: "node-a".into(),
                sequence_diags: vec![SequenceDiag {
                    mount: "/mnt/fs1".into(),
                    fsid: "a1b2c3d4".into(),
                    arfind: BlockState::NotBlocked,
                    stfind: BlockState::NotBlocked,
                }],
                ..Self::default()
            };
            facts.usage.insert(
                "/mnt/fs1".into(),
                FsUsage {
                    meta_used_pct: 10,
                    data_used_pct: 20,
                    high_watermark_pct: Some(90),
                    low_watermark_pct: Some(70),
                },
            );
            facts.active_units.insert("scoutam".into());
            facts.active_units.insert("scoutfs-fenced".into());
            facts
        }

        fn check_failing(&self, group: &'static str) -> Result<(), CheckError> {
            if self.failing.contains(group) {
                return Err(CheckError::query(group, "simulated query failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FactsSource for StaticFacts {
        async fn mounts(&self) -> Result<Vec<Mount>, CheckError> {
            self.check_failing("mounts")?;
            Ok(self.mounts.clone())
        }

        async fn usage(&self, mount: &str) -> Result<FsUsage, CheckError> {
            self.check_failing("usage")?;
            self.usage
                .get(mount)
                .copied()
                .ok_or_else(|| CheckError::query("usage", format!("no usage for {mount}")))
        }

        async fn service_active(&self, unit: &str) -> Result<bool, CheckError> {
            self.check_failing("service")?;
            Ok(self.active_units.contains(unit))
        }

        async fn idle_queues(&self) -> Result<Vec<QueueKind>, CheckError> {
            self.check_failing("queues")?;
            let idle: Vec<QueueKind> = QueueKind::ALL
                .iter()
                .copied()
                .filter(|k| self.idle_queues.contains(k))
                .collect();
            Ok(idle)
        }

        async fn gateways(&self, flavor: GatewayFlavor) -> Result<GatewayFacts, CheckError> {
            self.check_failing("gateways")?;
            let configured = match flavor {
                GatewayFlavor::Scoutgw => &self.scoutgw,
                GatewayFlavor::Versitygw => &self.versitygw,
            };
            Ok(configured.clone().unwrap_or(GatewayFacts::NotInstalled))
        }

        async fn scheduler_address(&self) -> Result<String, CheckError> {
            self.check_failing("scheduler_address")?;
            Ok(self.scheduler_address.clone())
        }

        async fn sequence_diagnostics(&self) -> Result<Vec<SequenceDiag>, CheckError> {
            self.check_failing("sequences")?;
            Ok(self.sequence_diags.clone())
        }

        fn local_hostname(&self) -> Result<String, CheckError> {
            self.check_failing("hostname")?;
            Ok(self.hostname.clone())
        }
    }
}
