//! `actors.json` loading and watching (spec §4.7, §6.5).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Layer 2: Third-party crate imports
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

// Layer 3: Internal module imports
use crate::actor::config::ActorConfig;

/// Parse `name -> config` from a single file. Unknown top-level keys and
/// unknown fields inside a config are ignored (spec §6.5), which falls
/// out of `serde`'s `#[serde(default)]` fields on [`ActorConfig`].
pub fn load_file(path: &Path) -> Result<HashMap<String, ActorConfig>, std::io::Error> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Loads the primary file and overlays a secondary file on top of it;
/// secondary wins on key collision (spec §4.12).
pub fn load_overlaid(primary: &Path, secondary: Option<&Path>) -> HashMap<String, ActorConfig> {
    let mut merged = load_file(primary).unwrap_or_else(|e| {
        warn!(path = %primary.display(), error = %e, "could not load primary configuration file");
        HashMap::new()
    });
    if let Some(secondary) = secondary {
        match load_file(secondary) {
            Ok(overlay) => merged.extend(overlay),
            Err(e) => warn!(path = %secondary.display(), error = %e, "could not load overlay configuration file"),
        }
    }
    merged
}

/// A debounced filesystem watcher over one or two configuration files.
/// Emits the freshly merged `name -> config` map on its receiver
/// whenever either file changes, collapsing bursts of rapid writes
/// (editors often write a file several times in quick succession) into
/// a single reload.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    pub changes: mpsc::UnboundedReceiver<HashMap<String, ActorConfig>>,
}

const DEBOUNCE: Duration = Duration::from_millis(200);

impl ConfigWatcher {
    pub fn watch(primary: PathBuf, secondary: Option<PathBuf>) -> Result<Self, notify::Error> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })?;

        watcher.watch(&primary, RecursiveMode::NonRecursive)?;
        if let Some(secondary) = &secondary {
            if secondary.exists() {
                watcher.watch(secondary, RecursiveMode::NonRecursive)?;
            }
        }

        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Some(_first) = raw_rx.recv().await else { break };
                // Drain anything else that arrives within the debounce window.
                tokio::time::sleep(DEBOUNCE).await;
                while raw_rx.try_recv().is_ok() {}

                let merged = load_overlaid(&primary, secondary.as_deref());
                info!(actors = merged.len(), "configuration file changed, reloading");
                if changes_tx.send(merged).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            changes: changes_rx,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn load_file_ignores_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actors.json");
        std::fs::write(&path, r#"{"greeter": {"mode": "forked", "somethingElse": true}}"#).unwrap();

        let configs = load_file(&path).unwrap();
        assert_eq!(configs["greeter"].mode, crate::actor::state::ActorMode::Forked);
    }

    #[test]
    fn overlay_wins_on_key_collision() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("actors.json");
        let secondary = dir.path().join("actors.local.json");
        std::fs::write(&primary, r#"{"greeter": {"mode": "inMemory"}}"#).unwrap();
        std::fs::write(&secondary, r#"{"greeter": {"mode": "forked"}}"#).unwrap();

        let merged = load_overlaid(&primary, Some(&secondary));
        assert_eq!(merged["greeter"].mode, crate::actor::state::ActorMode::Forked);
    }
}
