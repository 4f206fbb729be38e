//! Subprocess execution primitive.
//!
//! The scheduler hands a fully built argv to [`exec`] and blocks until the
//! child returns. Output streams are inherited so tool diagnostics reach
//! the user unaltered.

use crate::error::BuildError;
use camino::Utf8Path;
use std::collections::HashMap;
use std::process::{Command, Stdio};

/// Run `argv` to completion and return its exit code.
///
/// The child inherits the executor's stdout and stderr. `env`, when
/// provided, extends the parent environment rather than replacing it.
/// Termination by signal is reported as exit code `-1`.
///
/// # Errors
///
/// Returns [`BuildError::SubprocessSpawnFailed`] when `argv` is empty or
/// the OS refuses to launch the child.
pub fn exec(
    argv: &[String],
    working_dir: Option<&Utf8Path>,
    env: Option<&HashMap<String, String>>,
) -> Result<i32, BuildError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(BuildError::SubprocessSpawnFailed(
            "cannot execute empty command".to_owned(),
        ));
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = working_dir {
        command.current_dir(dir.as_std_path());
    }
    if let Some(extra) = env {
        command.envs(extra);
    }

    let status = command
        .status()
        .map_err(|err| BuildError::SubprocessSpawnFailed(format!("{program}: {err}")))?;
    Ok(status.code().unwrap_or(-1))
}
