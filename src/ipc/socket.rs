//! Locating the Discord IPC endpoint.

use tokio::io::{AsyncRead, AsyncWrite};

/// Discord exposes up to ten endpoints, one per running client instance.
const MAX_PIPES: u8 = 10;

pub trait IpcStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> IpcStream for T {}

#[cfg(unix)]
pub use unix::{candidate_paths, connect};
#[cfg(windows)]
pub use windows::connect;

#[cfg(unix)]
mod unix {
    use std::path::PathBuf;

    use tokio::net::UnixStream;

    use super::{IpcStream, MAX_PIPES};
    use crate::rpc::RpcError;

    const RUNTIME_DIR_VARS: [&str; 4] = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"];
    /// Sandboxed installs put the socket in a subdirectory.
    const SANDBOX_SUBDIRS: [&str; 3] = ["", "app/com.discordapp.Discord", "snap.discord"];

    /// Socket paths to try, in order.
    pub fn candidate_paths(var: impl Fn(&str) -> Option<String>) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = Vec::new();
        for dir in RUNTIME_DIR_VARS
            .iter()
            .filter_map(|v| var(v))
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .chain(std::iter::once(PathBuf::from("/tmp")))
        {
            if !bases.contains(&dir) {
                bases.push(dir);
            }
        }

        bases
            .iter()
            .flat_map(|base| {
                SANDBOX_SUBDIRS.iter().flat_map(move |sub| {
                    (0..MAX_PIPES).map(move |i| base.join(sub).join(format!("discord-ipc-{i}")))
                })
            })
            .collect()
    }

    pub async fn connect() -> Result<Box<dyn IpcStream>, RpcError> {
        for path in candidate_paths(|v| std::env::var(v).ok()) {
            match UnixStream::connect(&path).await {
                Ok(stream) => {
                    tracing::debug!(path = %path.display(), "Connected to Discord IPC socket");
                    return Ok(Box::new(stream));
                }
                Err(e) => tracing::trace!(path = %path.display(), %e, "IPC socket unavailable"),
            }
        }
        Err(RpcError::NoSocket)
    }
}

#[cfg(windows)]
mod windows {
    use tokio::net::windows::named_pipe::ClientOptions;

    use super::{IpcStream, MAX_PIPES};
    use crate::rpc::RpcError;

    pub async fn connect() -> Result<Box<dyn IpcStream>, RpcError> {
        for i in 0..MAX_PIPES {
            let name = format!(r"\\?\pipe\discord-ipc-{i}");
            match ClientOptions::new().open(&name) {
                Ok(pipe) => {
                    tracing::debug!(%name, "Connected to Discord IPC pipe");
                    return Ok(Box::new(pipe));
                }
                Err(e) => tracing::trace!(%name, %e, "IPC pipe unavailable"),
            }
        }
        Err(RpcError::NoSocket)
    }
}

/// Fail early on platforms without a known endpoint.
#[cfg(not(any(unix, windows)))]
pub async fn connect() -> Result<Box<dyn IpcStream>, crate::rpc::RpcError> {
    Err(crate::rpc::RpcError::NoSocket)
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn runtime_dir_first_and_deduplicated() {
        let paths = candidate_paths(|v| match v {
            "XDG_RUNTIME_DIR" => Some("/run/user/1000".to_owned()),
            "TMPDIR" => Some("/tmp".to_owned()),
            "TMP" => Some(String::new()),
            _ => None,
        });
        assert_eq!(paths.len(), 2 * 3 * 10);
        assert_eq!(paths[0], PathBuf::from("/run/user/1000/discord-ipc-0"));
        assert_eq!(paths[9], PathBuf::from("/run/user/1000/discord-ipc-9"));
        assert_eq!(
            paths[10],
            PathBuf::from("/run/user/1000/app/com.discordapp.Discord/discord-ipc-0")
        );
        assert_eq!(
            paths[20],
            PathBuf::from("/run/user/1000/snap.discord/discord-ipc-0")
        );
        assert_eq!(paths[30], PathBuf::from("/tmp/discord-ipc-0"));
    }

    #[test]
    fn falls_back_to_tmp() {
        let paths = candidate_paths(|_| None);
        assert_eq!(paths.first(), Some(&PathBuf::from("/tmp/discord-ipc-0")));
    }
}
