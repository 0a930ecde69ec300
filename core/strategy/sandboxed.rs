use super::outputs::collect_outputs;
use super::spawn::{run_command, CommandRun};
use super::*;
use crate::sandbox::SandboxManager;
use std::time::Instant;
use tracing::*;

/// Runs every action in its own fresh sandbox, with only its declared inputs and environment.
///
#[derive(Debug)]
pub struct SandboxedStrategy {
    manager: SandboxManager,
}

impl SandboxedStrategy {
    pub const NAME: &'static str = "sandboxed";
    pub const ALIAS: &'static str = "processwrapper-sandbox";

    pub fn new(manager: SandboxManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ExecutionStrategy for SandboxedStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn is_available(&self) -> bool {
        true
    }

    #[tracing::instrument(name = "SandboxedStrategy::execute", skip(self, spawn, ctx), fields(kiln.owner = %spawn.owner))]
    async fn execute(
        &self,
        spawn: &Spawn,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let sandbox = self.manager.create(spawn).await?;

        let run = CommandRun {
            executable: spawn.command.executable(),
            args: &spawn.command.args,
            cwd: sandbox.execroot(),
            env: sandbox.env(&spawn.command.env),
            stdout: sandbox.stdout_log(),
            stderr: sandbox.stderr_log(),
            timeout: spawn.timeout,
            abort: &ctx.abort,
        };

        let result = match run_command(run).await {
            Ok(exit_code) => collect_outputs(sandbox.execroot(), &spawn.outputs, &ctx.output_root)
                .await
                .map(|outputs| ExecutionResult {
                    exit_code,
                    outputs,
                    wall_time: started.elapsed(),
                }),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            debug!("{} failed in {:?}: {}", spawn.owner, sandbox.root(), err);
        }

        sandbox.remove().await;
        result
    }
}
