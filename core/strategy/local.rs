use super::outputs::collect_outputs;
use super::spawn::{run_command, CommandRun};
use super::*;
use crate::util::fs::remove_path;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::fs;

/// Runs actions directly in a shared exec root, with the host environment. Inputs are symlinked
/// into place, nothing stops an action from seeing or touching anything else.
///
#[derive(Debug, Default)]
pub struct LocalStrategy;

impl LocalStrategy {
    pub const NAME: &'static str = "local";
    pub const ALIAS: &'static str = "standalone";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionStrategy for LocalStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn is_available(&self) -> bool {
        true
    }

    #[tracing::instrument(name = "LocalStrategy::execute", skip(self, spawn, ctx), fields(kiln.owner = %spawn.owner))]
    async fn execute(
        &self,
        spawn: &Spawn,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let workdir = &ctx.exec_root;
        prepare(workdir, fs::create_dir_all(workdir).await)?;

        for input in &spawn.inputs {
            if input.kind == ArtifactKind::Middleman {
                continue;
            }
            link_input(&input.location, &workdir.join(&input.path)).await?;
        }

        for output in &spawn.outputs {
            let dst = workdir.join(&output.path);
            prepare(&dst, remove_path(&dst).await)?;
            let parent = match output.kind {
                ArtifactKind::Tree => Some(dst.as_path()),
                _ => dst.parent(),
            };
            if let Some(parent) = parent {
                prepare(parent, fs::create_dir_all(parent).await)?;
            }
        }

        let mut env: HashMap<String, String> = (*ctx.host_env).clone();
        env.extend(
            spawn
                .command
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let run = CommandRun {
            executable: spawn.command.executable(),
            args: &spawn.command.args,
            cwd: workdir,
            env,
            stdout: ctx.log_root.join(format!("{}.stdout.log", spawn.key)),
            stderr: ctx.log_root.join(format!("{}.stderr.log", spawn.key)),
            timeout: spawn.timeout,
            abort: &ctx.abort,
        };
        let exit_code = run_command(run).await?;

        let outputs = collect_outputs(workdir, &spawn.outputs, &ctx.output_root).await?;

        Ok(ExecutionResult {
            exit_code,
            outputs,
            wall_time: started.elapsed(),
        })
    }
}

fn prepare(path: &Path, result: std::io::Result<()>) -> Result<(), ExecutionError> {
    result.map_err(|err| ExecutionError::CouldNotPrepare {
        path: path.to_path_buf(),
        err,
    })
}

/// Symlink `location` into `dst`. Concurrent actions may link the same input, so an existing link
/// to the same place is fine.
async fn link_input(location: &Path, dst: &Path) -> Result<(), ExecutionError> {
    if let Ok(existing) = fs::read_link(dst).await {
        if existing == location {
            return Ok(());
        }
    }

    prepare(dst, remove_path(dst).await)?;
    if let Some(parent) = dst.parent() {
        prepare(parent, fs::create_dir_all(parent).await)?;
    }

    #[cfg(unix)]
    let link_result = fs::symlink(location, dst).await;

    #[cfg(windows)]
    let link_result = fs::symlink_file(location, dst).await;

    match link_result {
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        result => prepare(dst, result),
    }
}
