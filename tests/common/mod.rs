#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};
use wifi_setup::{
    command::{CommandLine, CommandRunner},
    error::CommandError,
    network_probe::WpaCliProbe,
    platform::{Platform, PlatformKind},
    services::{
        connectivity::{ConnectivitySettings, ConnectivityStateMachine, RetryBudget},
        next_stage::CommandNextStage,
        shutdown::ShutdownSignal,
    },
};

pub const SCAN_OUTPUT: &str = r#"wlan0     Scan completed :
          Cell 01 - Address: 00:11:22:33:44:55
                    Quality=41/70  Signal level=-69 dBm
                    ESSID:"NetB"
          Cell 02 - Address: 00:11:22:33:44:56
                    Quality=70/70  Signal level=-30 dBm
                    ESSID:"NetA"
          Cell 03 - Address: 00:11:22:33:44:57
                    Quality=55/70  Signal level=-55 dBm
                    ESSID:""
"#;

pub type Machine =
    ConnectivityStateMachine<WpaCliProbe<ScriptedRunner>, CommandNextStage<ScriptedRunner>>;

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Result<String, CommandError>>>,
    issued: Vec<String>,
}

/// Answers commands from a script and records every command line it sees
///
/// Replies are queued per rendered command line; the last queued reply for a
/// command keeps being returned. Unscripted commands succeed without output.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    pub fn reply(&self, command: &str, output: &str) -> &Self {
        self.push(command, Ok(output.to_string()))
    }

    pub fn fail(&self, command: &str, reason: &str) -> &Self {
        self.push(
            command,
            Err(CommandError::Execution {
                command: command.to_string(),
                reason: reason.to_string(),
            }),
        )
    }

    fn push(&self, command: &str, reply: Result<String, CommandError>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.script.lock().unwrap().issued.clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine) -> Result<String, CommandError> {
        let line = command.to_string();
        let mut script = self.script.lock().unwrap();
        script.issued.push(line.clone());

        match script.replies.get_mut(&line) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(String::new())),
            None => Ok(String::new()),
        }
    }
}

pub fn settings(max_attempts: u32) -> ConnectivitySettings {
    ConnectivitySettings {
        retry_budget: RetryBudget::new(max_attempts, Duration::from_secs(3)).unwrap(),
        scan_retries: 2,
        response_grace: Duration::from_secs(2),
        teardown_grace: Duration::from_secs(5),
    }
}

/// Machine for a default platform on `wlan0` that runs `systemctl start app`
/// once connected
pub fn machine(runner: &ScriptedRunner, max_attempts: u32) -> Machine {
    let platform = Platform::new(PlatformKind::Default, "wlan0", "10.0.0.1".parse().unwrap());
    let next_stage = CommandNextStage::new(
        runner.clone(),
        Some(CommandLine::parse("systemctl start app").unwrap()),
    );
    let (_trigger, shutdown) = ShutdownSignal::channel();

    ConnectivityStateMachine::new(
        WpaCliProbe::new(runner.clone(), platform),
        next_stage,
        settings(max_attempts),
        shutdown,
    )
}

/// Replies for a successful `define_network` of id 0
pub fn script_define_network(runner: &ScriptedRunner, ssid: &str) {
    runner
        .reply("wpa_cli -iwlan0 add_network", "0\n")
        .reply(&format!("wpa_cli -iwlan0 set_network 0 ssid \"{ssid}\""), "OK\n")
        .reply("wpa_cli -iwlan0 set_network 0 psk ***", "OK\n")
        .reply("wpa_cli -iwlan0 set_network 0 key_mgmt NONE", "OK\n")
        .reply("wpa_cli -iwlan0 enable_network 0", "OK\n")
        .reply("wpa_cli -iwlan0 save_config", "OK\n");
}
