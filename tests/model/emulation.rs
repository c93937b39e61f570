use std::{
    net::Ipv4Addr,
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use serde_json::json;

use dojo_models::{
    actions::{ActionDescription, ActionKind, ExecutionEnvironment},
    environment::Environment,
    model::{CompositeActionManager, CrytonModel, ModelErrorKind},
    orchestrator::OrchestratorError,
    templates::SuccessSentinels,
    types::{ActionRequest, Content, Status, StatusOrigin, StatusValue},
};

use crate::support::{ScriptedOrchestrator, report, request, session, with_context};

const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 2, 12);
const DEVELOPER: Ipv4Addr = Ipv4Addr::new(192, 168, 2, 10);

fn emulated(orchestrator: &Arc<ScriptedOrchestrator>) -> Environment {
    Environment::new(Arc::new(CrytonModel::new("dojo", orchestrator.clone())), None)
        .expect("actions should register")
}

#[tokio::test]
async fn ping_sweep_becomes_network_success_with_hosts() {
    let orchestrator = ScriptedOrchestrator::answering(vec![Ok(report(
        "OK",
        "[*] Performing ping sweep...\n[+] \t192.168.2.10 host found\n[*] Post module execution completed",
    ))]);
    let environment = emulated(&orchestrator);

    let scan = with_context(
        request(&environment, "dojo:scan_network", DEVELOPER, "", &[("to_network", "192.168.2.0/24")]),
        session(1),
        None,
    );
    let scan_id = scan.id;
    let outcome = environment.execute(scan).await.expect("dispatch should succeed");

    assert_eq!(
        outcome.response.status,
        Status::new(StatusOrigin::Network, StatusValue::Success)
    );
    assert_eq!(outcome.response.content, Content::Hosts(vec![DEVELOPER]));
    assert_eq!(outcome.response.session, session(1));
    assert_eq!(outcome.elapsed, Duration::from_secs(3));
    assert_eq!(environment.now(), Duration::from_secs(3));
    assert_eq!(orchestrator.submitted_names(), vec![format!("scan-network-{scan_id}")]);
    assert_eq!(
        orchestrator.last_template().module_arguments()["module_options"]["RHOSTS"],
        json!("192.168.2.0/24")
    );
}

#[tokio::test]
async fn one_agent_serves_every_action_of_an_actor() {
    let orchestrator = ScriptedOrchestrator::answering(vec![
        Ok(report("OK", "developer\n")),
        Ok(report("OK", "root:x:0:0:root:/root:/bin/bash\n")),
    ]);
    let environment = emulated(&orchestrator);

    let whoami = with_context(
        request(
            &environment,
            "dojo:execute_command",
            DEVELOPER,
            "ssh",
            &[("to_host", "192.168.2.10"), ("command", "whoami")],
        ),
        session(2),
        None,
    );
    let passwd = with_context(
        request(
            &environment,
            "dojo:exfiltrate_data",
            DEVELOPER,
            "ssh",
            &[("to_host", "192.168.2.10"), ("data", "/etc/passwd")],
        ),
        session(2),
        None,
    );
    let passwd_id = passwd.id;

    let first = environment.execute(whoami).await.expect("dispatch should succeed");
    let second = environment.execute(passwd).await.expect("dispatch should succeed");

    assert_eq!(first.response.content.as_text(), Some("developer"));
    assert_eq!(
        second.response.content.as_text(),
        Some("root:x:0:0:root:/root:/bin/bash")
    );
    assert_eq!(orchestrator.provisioned.load(Ordering::SeqCst), 1);
    assert!(
        orchestrator
            .submitted_names()
            .contains(&format!("exfiltrate-data-{passwd_id}"))
    );
    let labels: Vec<String> = orchestrator
        .submitted
        .lock()
        .expect("submitted lock")
        .iter()
        .map(|(label, _)| label.clone())
        .collect();
    assert_eq!(labels, vec!["dojo-agent-1", "dojo-agent-1"]);
}

#[tokio::test]
async fn failed_step_is_a_failure_response_with_raw_output() {
    let orchestrator = ScriptedOrchestrator::answering(vec![Ok(report(
        "FAIL",
        "find: '/root': Permission denied\n",
    ))]);
    let environment = emulated(&orchestrator);

    let listing = with_context(
        request(
            &environment,
            "dojo:find_data",
            DEVELOPER,
            "ssh",
            &[("to_host", "192.168.2.10"), ("directory", "/root")],
        ),
        session(2),
        None,
    );
    let outcome = environment.execute(listing).await.expect("failure is not an error");

    assert_eq!(
        outcome.response.status,
        Status::new(StatusOrigin::Service, StatusValue::Failure)
    );
    assert_eq!(
        outcome.response.content,
        Content::Text("find: '/root': Permission denied\n".to_string())
    );
    assert_eq!(outcome.response.session, session(2));
}

#[tokio::test]
async fn listener_session_comes_from_the_report() {
    let mut listener_report = report("ok", "[*] Started reverse TCP handler on 0.0.0.0:4444\n");
    listener_report.serialized_output = json!({"session_id": 5});
    let orchestrator = ScriptedOrchestrator::answering(vec![
        Ok(listener_report),
        Ok(report("ok", "[*] Meterpreter session 6 opened (192.168.1.100:4433 -> 192.168.2.12:50112)\n")),
    ]);
    let environment = emulated(&orchestrator);

    let wait = request(&environment, "dojo:wait_for_session", CLIENT, "bash", &[]);
    let waited = environment.execute(wait).await.expect("dispatch should succeed");
    let shell = waited.response.session.clone().expect("listener should open a session");
    assert_eq!(shell.id, 5);
    assert_eq!(shell.owner, "scripted_attacker");
    assert!(shell.parent.is_none());

    let upgrade = with_context(
        request(&environment, "dojo:upgrade_session", CLIENT, "bash", &[]),
        Some(shell.clone()),
        None,
    );
    let upgraded = environment.execute(upgrade).await.expect("dispatch should succeed");
    let meterpreter = upgraded.response.session.expect("upgrade should open a session");
    assert_eq!(meterpreter.id, 6);
    assert_eq!(meterpreter.parent.as_deref(), Some(&shell));
    assert_eq!(
        orchestrator.last_template().module_arguments()["datastore"]["LHOST"],
        json!("192.168.1.100")
    );
}

#[tokio::test]
async fn configured_sentinels_override_builder_defaults() {
    let orchestrator = ScriptedOrchestrator::answering(vec![Ok(report(
        "FINISHED",
        "[+] Route added to subnet 192.168.3.0/255.255.255.0\n",
    ))]);
    let model = CrytonModel::new("dojo", orchestrator.clone())
        .with_success_sentinels(Some(SuccessSentinels::new(["FINISHED"])));
    let environment = Environment::new(Arc::new(model), None).expect("actions should register");

    let routing = with_context(
        request(&environment, "dojo:update_routing", CLIENT, "", &[]),
        session(6),
        None,
    );
    let outcome = environment.execute(routing).await.expect("dispatch should succeed");

    assert_eq!(
        outcome.response.status,
        Status::new(StatusOrigin::Network, StatusValue::Success)
    );
    assert_eq!(
        outcome.response.content,
        Content::Subnets(vec!["192.168.3.0/24".parse().expect("subnet")])
    );
}

#[tokio::test]
async fn unknown_intent_is_answered_without_a_step() {
    let orchestrator = ScriptedOrchestrator::answering(vec![]);
    let environment = emulated(&orchestrator);

    let teleport = ActionDescription::new(
        "dojo:teleport",
        ActionKind::Direct,
        "Not offered by any backend",
        vec![],
        vec![ExecutionEnvironment::emulation()],
    )
    .instantiate();
    let mut unknown = request(&environment, "dojo:wait_for_session", CLIENT, "", &[]);
    unknown.action = teleport;
    unknown.session = session(3);

    let outcome = environment.execute(unknown).await.expect("unknown intent is not an error");

    assert_eq!(
        outcome.response.status,
        Status::new(StatusOrigin::System, StatusValue::Error)
    );
    assert_eq!(outcome.response.session, session(3));
    assert!(orchestrator.submitted_names().is_empty());
    assert_eq!(orchestrator.provisioned.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn caller_mistakes_are_errors_not_responses() {
    let orchestrator = ScriptedOrchestrator::answering(vec![]);
    let environment = emulated(&orchestrator);

    let unbound = with_context(
        request(&environment, "dojo:scan_network", DEVELOPER, "", &[]),
        session(1),
        None,
    );
    let err = environment.execute(unbound).await.expect_err("to_network is unbound");
    assert_eq!(err.kind, ModelErrorKind::MissingParameter);
    assert!(err.message.contains("to_network"));

    let sessionless: ActionRequest = request(
        &environment,
        "dojo:find_data",
        DEVELOPER,
        "ssh",
        &[("to_host", "192.168.2.10"), ("directory", "~/")],
    );
    let err = environment.execute(sessionless).await.expect_err("no session");
    assert_eq!(err.kind, ModelErrorKind::MissingSession);
    assert!(err.is_caller_error());

    let err = environment
        .action("dojo:teleport")
        .expect_err("teleport is not registered");
    assert_eq!(err.kind, ModelErrorKind::MissingAction);

    assert!(orchestrator.submitted_names().is_empty());
}

#[tokio::test]
async fn backend_failure_propagates_unchanged() {
    let orchestrator = ScriptedOrchestrator::answering(vec![Err(OrchestratorError::new(
        "http://127.0.0.1:8001/api/steps/",
        "request failed: connection refused",
    ))]);
    let environment = emulated(&orchestrator);

    let command = with_context(
        request(
            &environment,
            "dojo:execute_command",
            DEVELOPER,
            "ssh",
            &[("to_host", "192.168.2.10"), ("command", "id")],
        ),
        session(2),
        None,
    );
    let err = environment.execute(command).await.expect_err("backend is down");

    assert_eq!(err.kind, ModelErrorKind::Backend);
    assert!(!err.is_caller_error());
    assert_eq!(
        err.backend.map(|backend| backend.endpoint),
        Some("http://127.0.0.1:8001/api/steps/".to_string())
    );
    assert_eq!(environment.now(), Duration::ZERO);
}

#[tokio::test]
async fn failed_session_intents_return_no_session() {
    let orchestrator = ScriptedOrchestrator::answering(vec![
        Ok(report("fail", "[-] Handler failed to bind to 0.0.0.0:4444\n")),
        Ok(report("fail", "[-] Shells on the target platform are not supported\n")),
    ]);
    let environment = emulated(&orchestrator);

    let wait = with_context(
        request(&environment, "dojo:wait_for_session", CLIENT, "bash", &[]),
        session(3),
        None,
    );
    let waited = environment.execute(wait).await.expect("dispatch should succeed");
    assert_eq!(
        waited.response.status,
        Status::new(StatusOrigin::Service, StatusValue::Failure)
    );
    assert!(waited.response.session.is_none());

    let upgrade = with_context(
        request(&environment, "dojo:upgrade_session", CLIENT, "bash", &[]),
        session(3),
        None,
    );
    let upgraded = environment.execute(upgrade).await.expect("dispatch should succeed");
    assert_eq!(
        upgraded.response.status,
        Status::new(StatusOrigin::Service, StatusValue::Failure)
    );
    assert!(upgraded.response.session.is_none());
    assert_eq!(
        upgraded.response.content.as_text(),
        Some("[-] Shells on the target platform are not supported\n")
    );
}
