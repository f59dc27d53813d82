//! systemd unit definitions for the two clients. Units are always rendered in
//! full from [`NodeSettings`]; nothing edits an existing unit file.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config::NodeSettings;
use crate::constants::supervision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSpec {
    pub description: String,
    pub after: Vec<String>,
    pub user: String,
    pub working_directory: Option<PathBuf>,
    pub exec_start: Vec<String>,
    pub environment: Vec<(String, String)>,
    pub restart: String,
    pub restart_sec: u64,
    pub limit_nofile: u64,
}

impl UnitSpec {
    pub fn new(description: &str, user: &str, exec_start: Vec<String>) -> Self {
        Self {
            description: description.to_string(),
            after: vec!["network-online.target".to_string()],
            user: user.to_string(),
            working_directory: None,
            exec_start,
            environment: Vec::new(),
            restart: "on-failure".to_string(),
            restart_sec: supervision::DEFAULT_RESTART_SEC,
            limit_nofile: supervision::DEFAULT_LIMIT_NOFILE,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("[Unit]\n");
        let _ = writeln!(out, "Description={}", self.description);
        if !self.after.is_empty() {
            let _ = writeln!(out, "After={}", self.after.join(" "));
            let _ = writeln!(out, "Wants={}", self.after.join(" "));
        }

        out.push_str("\n[Service]\n");
        let _ = writeln!(out, "User={}", self.user);
        if let Some(dir) = &self.working_directory {
            let _ = writeln!(out, "WorkingDirectory={}", dir.display());
        }
        for (key, value) in &self.environment {
            let _ = writeln!(out, "Environment=\"{}={}\"", key, value);
        }
        let exec = self
            .exec_start
            .iter()
            .map(|arg| quote_arg(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "ExecStart={}", exec);
        let _ = writeln!(out, "Restart={}", self.restart);
        let _ = writeln!(out, "RestartSec={}", self.restart_sec);
        let _ = writeln!(out, "LimitNOFILE={}", self.limit_nofile);

        out.push_str("\n[Install]\nWantedBy=multi-user.target\n");
        out
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

pub fn consensus_unit(settings: &NodeSettings) -> UnitSpec {
    let exec_start = vec![
        settings.binaries.story.display().to_string(),
        "run".to_string(),
        "--home".to_string(),
        settings.story_home().display().to_string(),
    ];

    let mut unit = UnitSpec::new("Story consensus client", &settings.user, exec_start);
    unit.after.push(format!("{}.service", settings.services.execution));
    unit.working_directory = Some(settings.story_home());
    unit
}

pub fn execution_unit(settings: &NodeSettings) -> UnitSpec {
    let ports = &settings.ports;
    let mut exec_start = vec![
        settings.binaries.geth.display().to_string(),
        format!("--{}", settings.network),
        "--datadir".to_string(),
        settings.geth_network_dir().display().to_string(),
        "--syncmode".to_string(),
        "full".to_string(),
        "--port".to_string(),
        ports.execution_p2p.to_string(),
        "--http".to_string(),
        "--http.addr".to_string(),
        "127.0.0.1".to_string(),
        "--http.port".to_string(),
        ports.execution_http.to_string(),
        "--http.api".to_string(),
        "eth,net,web3,engine".to_string(),
        "--http.vhosts".to_string(),
        "*".to_string(),
        "--authrpc.port".to_string(),
        ports.execution_auth.to_string(),
        "--ws".to_string(),
        "--ws.addr".to_string(),
        "127.0.0.1".to_string(),
        "--ws.port".to_string(),
        ports.execution_ws.to_string(),
        "--ws.api".to_string(),
        "eth,web3,net,txpool".to_string(),
    ];

    if settings.telemetry.execution_metrics {
        exec_start.extend([
            "--metrics".to_string(),
            "--metrics.addr".to_string(),
            "127.0.0.1".to_string(),
            "--metrics.port".to_string(),
            ports.execution_metrics.to_string(),
        ]);
    }

    let mut unit = UnitSpec::new("Story execution client", &settings.user, exec_start);
    unit.working_directory = Some(settings.geth_home());
    unit
}
