use std::{io, sync::Arc};

use anyhow::{Context, Result};
use dojo_models::{
    cli::args_from_env,
    config::{Config, ModelBackend},
    environment::{Environment, NodeDirectory},
    logging::init_tracing,
    model::{BehavioralModel, CrytonModel, InMemoryExploitStore, SimulationModel},
    orchestrator::{CrytonClient, OrchestratorPort},
    scenario::{Scenario, ScenarioFile},
    templates::SuccessSentinels,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = args_from_env()?;
    let mut config = Config::load(&args.config_path)
        .with_context(|| format!("failed to load config from {}", args.config_path.display()))?;
    if let Some(backend) = args.backend {
        config.model.backend = backend;
    }
    let logging = init_tracing(&config.logging)?;

    let (model, nodes): (Arc<dyn BehavioralModel>, Option<NodeDirectory>) =
        match config.model.backend {
            ModelBackend::Emulation => {
                let client = CrytonClient::new(&config.orchestrator)
                    .context("failed to build the Cryton client")?;
                if args.scenario_path.is_some() {
                    client.check_connection().await.with_context(|| {
                        format!("Cryton API at {} is not reachable", client.api_root())
                    })?;
                }
                let sentinels = config
                    .orchestrator
                    .success_sentinels
                    .clone()
                    .map(SuccessSentinels::new);
                let model = CrytonModel::new(config.model.namespace.clone(), Arc::new(client))
                    .with_success_sentinels(sentinels);
                (Arc::new(model), None)
            }
            ModelBackend::Simulation => (
                Arc::new(SimulationModel::from_config(
                    &config.simulation,
                    config.model.namespace.clone(),
                )),
                Some(NodeDirectory::from_config(&config.simulation)),
            ),
        };

    let environment =
        Environment::new(model, nodes).context("failed to register the model's actions")?;
    let scenario = Scenario::new(
        environment,
        config.scenario.clone(),
        InMemoryExploitStore::from_config(&config.simulation.exploits),
    );

    let mut stdout = io::stdout().lock();
    if args.list_actions {
        scenario.display_actions(&mut stdout)?;
    }
    if let Some(path) = &args.scenario_path {
        let file = ScenarioFile::load(path)?;
        tracing::info!(
            target: "scenario",
            run_id = %logging.run_id(),
            path = %path.display(),
            steps = file.steps.len(),
            backend = ?config.model.backend,
            "scenario_started"
        );
        scenario.run(&file, &mut stdout).await?;
        tracing::info!(
            target: "scenario",
            virtual_clock_ms = scenario.environment().now().as_millis() as u64,
            "scenario_finished"
        );
    }

    Ok(())
}
