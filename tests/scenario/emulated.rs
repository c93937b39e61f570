use std::{path::PathBuf, sync::Arc};

use serde_json::json;

use dojo_models::{
    config::Config,
    environment::Environment,
    model::{CrytonModel, InMemoryExploitStore},
    scenario::{Scenario, ScenarioFile},
    types::{Content, Status, StatusOrigin, StatusValue},
};

use crate::support::{ScriptedOrchestrator, report};

const HISTORY: &str = "mysqldump -u user -h 192.168.3.11 --password=pass --no-tablespaces table";

fn repo_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(name)
}

#[tokio::test]
async fn emulated_scenario_chains_sessions_and_output() {
    let mut listener = report("ok", "[*] Started reverse TCP handler on 0.0.0.0:4444\n");
    listener.serialized_output = json!({"session_id": 5});
    let orchestrator = ScriptedOrchestrator::answering(vec![
        Ok(listener),
        Ok(report("ok", "[*] Meterpreter session 6 opened (192.168.1.100:4433 -> 192.168.2.12:50112)\n")),
        Ok(report("OK", "[+] Route added to subnet 192.168.3.0/255.255.255.0 from host's routing table.\n")),
        Ok(report(
            "OK",
            "[*] Performing ping sweep...\n[+] \t192.168.2.10 host found\n[+] \t192.168.2.12 host found\n",
        )),
        Ok(report("OK", "[+] 192.168.2.10:       - 192.168.2.10:22 - TCP OPEN\n")),
        Ok(report(
            "OK",
            "[+] 192.168.2.10:22 - Success: 'user:pass' 'uid=1000(user)'\n[*] SSH session 7 opened (192.168.1.100:40211 -> 192.168.2.10:22)\n",
        )),
        Ok(report("OK", "/home/user/\n/home/user/.bash_history\n")),
        Ok(report("OK", "root:x:0:0:root:/root:/bin/bash\n")),
        Ok(report("OK", &format!("{HISTORY}\n"))),
        Ok(report("OK", "-- MySQL dump 10.13\n")),
    ]);

    let config = Config::load(&repo_file("dojo.jsonc")).expect("sample config should load");
    let model = CrytonModel::new(config.model.namespace.clone(), orchestrator.clone());
    let environment = Environment::new(Arc::new(model), None).expect("actions should register");
    let scenario = Scenario::new(
        environment,
        config.scenario.clone(),
        InMemoryExploitStore::from_config(&config.simulation.exploits),
    );
    let file = ScenarioFile::load(&repo_file("scenarios/emulated.json5"))
        .expect("emulated scenario should parse");

    let responses = scenario
        .run(&file, &mut std::io::sink())
        .await
        .expect("every step should be accepted");

    let statuses: Vec<Status> = responses.iter().map(|response| response.status).collect();
    let service = Status::new(StatusOrigin::Service, StatusValue::Success);
    let network = Status::new(StatusOrigin::Network, StatusValue::Success);
    assert_eq!(
        statuses,
        vec![
            service, service, network, network, network, service, service, service, service,
            service,
        ]
    );

    let session_ids: Vec<Option<u64>> = responses
        .iter()
        .map(|response| response.session.as_ref().map(|session| session.id))
        .collect();
    assert_eq!(
        session_ids,
        vec![Some(5), Some(6), Some(6), Some(6), Some(6), Some(7), Some(7), Some(7), Some(7), Some(7)]
    );
    let foothold = responses[5].session.as_ref().expect("ssh login opens a session");
    assert_eq!(foothold.parent.as_ref().map(|parent| parent.id), Some(6));

    assert_eq!(
        responses[2].content,
        Content::Subnets(vec!["192.168.3.0/24".parse().expect("subnet")])
    );
    assert_eq!(responses[8].content.as_text(), Some(HISTORY));
    assert_eq!(responses[9].content.as_text(), Some("-- MySQL dump 10.13"));

    let step_kinds: Vec<String> = orchestrator
        .submitted_names()
        .iter()
        .map(|name| name.rsplit_once('-').map(|(kind, _)| kind.to_string()).unwrap_or_default())
        .collect();
    assert_eq!(
        step_kinds,
        vec![
            "session-listener",
            "upgrade-session",
            "update-routing",
            "scan-network",
            "find-services",
            "exploit-server",
            "find-data",
            "exfiltrate-data",
            "exfiltrate-data",
            "execute-command",
        ]
    );
    assert_eq!(orchestrator.provisioned.load(std::sync::atomic::Ordering::SeqCst), 1);

    let last = orchestrator.last_template();
    assert_eq!(last.module_arguments()["cmd"], json!(HISTORY));
    assert_eq!(last.module_arguments()["session_id"], json!(7));
}
