use std::{net::Ipv4Addr, path::PathBuf, sync::Arc};

use dojo_models::{
    config::Config,
    environment::{Environment, NodeDirectory},
    model::{InMemoryExploitStore, SimulationModel},
    scenario::{ActionCall, Scenario, ScenarioFile},
    types::{AccessLevel, Content, Status, StatusOrigin, StatusValue},
};

fn repo_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(name)
}

fn simulated_scenario() -> Scenario<InMemoryExploitStore> {
    let config = Config::load(&repo_file("dojo.jsonc")).expect("sample config should load");
    let model = SimulationModel::from_config(&config.simulation, config.model.namespace.clone());
    let environment = Environment::new(
        Arc::new(model),
        Some(NodeDirectory::from_config(&config.simulation)),
    )
    .expect("actions should register");

    Scenario::new(
        environment,
        config.scenario.clone(),
        InMemoryExploitStore::from_config(&config.simulation.exploits),
    )
}

#[tokio::test]
async fn sample_scenario_reaches_the_database() {
    let scenario = simulated_scenario();
    let file = ScenarioFile::load(&repo_file("scenarios/simulated.json5"))
        .expect("sample scenario should parse");
    let mut transcript = Vec::new();

    let responses = scenario
        .run(&file, &mut transcript)
        .await
        .expect("every step should be accepted");

    assert_eq!(responses.len(), file.steps.len());
    assert_eq!(
        responses[1].content,
        Content::Hosts(vec![Ipv4Addr::new(192, 168, 2, 10), Ipv4Addr::new(192, 168, 2, 12)])
    );

    let foothold = responses[3].auth.as_ref().expect("brute force grants access");
    assert_eq!(foothold.access_level, AccessLevel::Elevated);
    assert_eq!(
        responses[7].content.as_text(),
        Some("mysqldump -u user -h 192.168.3.11 --password=pass --no-tablespaces table")
    );

    let dump = responses
        .last()
        .and_then(|response| response.content.as_text())
        .expect("dump should produce text");
    assert!(dump.contains("INSERT INTO `table`"));

    let transcript = String::from_utf8(transcript).expect("transcript is utf-8");
    assert!(transcript.starts_with("Scenario: dojo simulated demo"));
    assert!(transcript.trim_end().ends_with("Scenario finished!"));
    assert!(scenario.environment().now() > std::time::Duration::ZERO);
}

#[tokio::test]
async fn unexpected_status_aborts_the_step() {
    let scenario = simulated_scenario();

    let unarmed = ActionCall::new(
        "dojo:exploit_server",
        Ipv4Addr::new(192, 168, 2, 10),
        vec![Status::new(StatusOrigin::Service, StatusValue::Success)],
    )
    .service("ssh");
    let err = scenario
        .execute_action(unarmed)
        .await
        .expect_err("failure is not accepted");

    let message = err.to_string();
    assert!(message.contains("dojo:exploit_server"), "{message}");
    assert!(message.contains("Service/Failure"), "{message}");
}

#[tokio::test]
async fn accepted_failure_is_returned_to_the_caller() {
    let scenario = simulated_scenario();

    let unreachable = ActionCall::new(
        "dojo:direct:scan_host",
        Ipv4Addr::new(10, 0, 0, 1),
        vec![Status::new(StatusOrigin::Network, StatusValue::Failure)],
    );
    let response = scenario
        .execute_action(unreachable)
        .await
        .expect("network failure was accepted");

    assert_eq!(response.src_ip, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(response.content, Content::Empty);
}

#[tokio::test]
async fn chained_content_needs_text() {
    let scenario = simulated_scenario();
    let file: ScenarioFile = json5::from_str(
        r#"{
            steps: [
                { action: "dojo:phishing", target: "192.168.2.12", service: "bash" },
                { action: "dojo:execute_command", target: "192.168.2.12", previous_content_as: "command" },
            ],
        }"#,
    )
    .expect("scenario should parse");

    let err = scenario
        .run(&file, &mut std::io::sink())
        .await
        .expect_err("subnets cannot become a command");
    assert!(err.to_string().contains("step 2"), "{err}");
}

#[test]
fn action_listing_names_every_parameter() {
    let scenario = simulated_scenario();
    let mut listing = Vec::new();

    scenario
        .display_actions(&mut listing)
        .expect("listing should be written");

    let listing = String::from_utf8(listing).expect("listing is utf-8");
    assert!(listing.starts_with("Available actions"));
    assert!(listing.contains("dojo:find_services"));
    assert!(listing.contains("[\"to_network\", \"services\"]"));
    assert!(listing.contains("dojo:direct:exfiltrate_data"));
}
