use log::info;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("file does not exist: {0}")]
    Missing(String),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts `program args... path` without waiting for it to exit.
pub fn open_with<S: AsRef<str>>(
    program: &str,
    args: &[S],
    path: &Path,
) -> Result<u32, LaunchError> {
    if !path.exists() {
        return Err(LaunchError::Missing(path.to_string_lossy().into_owned()));
    }

    let child = Command::new(program)
        .args(args.iter().map(|arg| arg.as_ref()))
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.to_string(),
            source,
        })?;

    info!("launched {program} for {} (pid {})", path.to_string_lossy(), child.id());
    Ok(child.id())
}

/// Opens `path` with the desktop's default handler.
pub fn open_default(path: &Path) -> Result<(), LaunchError> {
    if !path.exists() {
        return Err(LaunchError::Missing(path.to_string_lossy().into_owned()));
    }
    open::that_detached(path).map_err(|source| LaunchError::Spawn {
        program: "default handler".into(),
        source,
    })
}
