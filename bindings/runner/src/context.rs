use anyhow::Context;
use checkin_client_instrumented::prelude::CheckinClient;
use stampede_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct CheckinAgentContext {
    pub(crate) client: Option<CheckinClient>,
}

impl UserValuesConstraint for CheckinAgentContext {}

impl CheckinAgentContext {
    /// The agent's HTTP client, available after [crate::prelude::connect_client] has run in the agent setup hook.
    pub fn client(&self) -> anyhow::Result<&CheckinClient> {
        self.client
            .as_ref()
            .context("No client for this agent, call 'connect_client' in the scenario 'agent_setup'")
    }
}
