//! Background resource loader
//!
//! Requests go to a worker thread that reads and parses the asset. Finished
//! loads come back over a channel and are installed by [`ResourceLoader::drain`]
//! on the frame thread during `BeginFrame`. Ids are handed out immediately
//! and stay pending until then; a partially built resource is never visible.

use super::source::AssetSource;
use super::LoadError;
use crate::render::{MaterialData, MaterialId, MeshData, MeshId, ResourceRegistry};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use slotmap::SlotMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

slotmap::new_key_type! {
    /// Handle to a script source requested from the loader
    pub struct ScriptSourceId;
}

enum Request {
    Mesh(MeshId, String),
    Material(MaterialId, String),
    Script(ScriptSourceId, String),
}

enum Completion {
    Mesh(MeshId, String, Result<MeshData, LoadError>),
    Material(MaterialId, String, Result<MaterialData, LoadError>),
    Script(ScriptSourceId, String, Result<String, LoadError>),
}

/// State of a requested script source
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptSource {
    /// Still loading
    Pending,
    /// Source text
    Ready {
        /// Path it was loaded from
        path: String,
        /// Lua source
        source: String,
    },
    /// The load failed
    Failed(LoadError),
}

/// Completions installed by one [`ResourceLoader::drain`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Resources now ready
    pub installed: usize,
    /// Loads that failed
    pub failed: usize,
}

impl DrainReport {
    /// Completions processed
    pub fn total(&self) -> usize {
        self.installed + self.failed
    }
}

/// Loads meshes, materials and script sources off the frame thread
pub struct ResourceLoader {
    requests: Option<Sender<Request>>,
    completions: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
    scripts: SlotMap<ScriptSourceId, ScriptSource>,
    outstanding: usize,
    worker_lost: bool,
}

impl ResourceLoader {
    /// Start a worker reading from `source`
    pub fn new(source: impl AssetSource) -> Result<Self, LoadError> {
        let (request_tx, request_rx) = unbounded::<Request>();
        let (completion_tx, completion_rx) = unbounded::<Completion>();

        log::info!("Resource loader reading from {}", source.describe());
        let worker = thread::Builder::new()
            .name("resource-loader".into())
            .spawn(move || worker_loop(&source, &request_rx, &completion_tx))
            .map_err(|e| LoadError::Io {
                path: String::new(),
                reason: format!("failed to start loader thread: {e}"),
            })?;

        Ok(Self {
            requests: Some(request_tx),
            completions: completion_rx,
            worker: Some(worker),
            scripts: SlotMap::with_key(),
            outstanding: 0,
            worker_lost: false,
        })
    }

    /// Request a RON mesh; the id is pending until drained
    pub fn load_mesh(&mut self, registry: &mut ResourceRegistry, path: &str) -> MeshId {
        if let Some(id) = registry.mesh_id(path) {
            return id;
        }
        let id = registry.reserve_mesh(path);
        if let Err(e) = self.send(Request::Mesh(id, path.to_string())) {
            registry.fail_mesh(id, e.to_string());
        }
        id
    }

    /// Request a RON material; the id is pending until drained
    pub fn load_material(&mut self, registry: &mut ResourceRegistry, path: &str) -> MaterialId {
        if let Some(id) = registry.material_id(path) {
            return id;
        }
        let id = registry.reserve_material(path);
        if let Err(e) = self.send(Request::Material(id, path.to_string())) {
            registry.fail_material(id, e.to_string());
        }
        id
    }

    /// Request a Lua script source
    pub fn load_script(&mut self, path: &str) -> ScriptSourceId {
        let id = self.scripts.insert(ScriptSource::Pending);
        if let Err(e) = self.send(Request::Script(id, path.to_string())) {
            self.scripts[id] = ScriptSource::Failed(e);
        }
        id
    }

    /// Current state of a requested script
    pub fn script(&self, id: ScriptSourceId) -> Option<&ScriptSource> {
        self.scripts.get(id)
    }

    /// Remove a finished script source and return its text
    pub fn take_script(&mut self, id: ScriptSourceId) -> Option<Result<(String, String), LoadError>> {
        if matches!(self.scripts.get(id)?, ScriptSource::Pending) {
            return None;
        }
        match self.scripts.remove(id)? {
            ScriptSource::Ready { path, source } => Some(Ok((path, source))),
            ScriptSource::Failed(e) => Some(Err(e)),
            ScriptSource::Pending => None,
        }
    }

    /// Requests not yet drained
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Install up to `limit` completed loads
    pub fn drain(&mut self, registry: &mut ResourceRegistry, limit: usize) -> DrainReport {
        let mut report = DrainReport::default();
        while report.total() < limit {
            match self.completions.try_recv() {
                Ok(completion) => self.install(registry, completion, &mut report),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.note_worker_lost();
                    break;
                }
            }
        }
        if report.total() > 0 {
            log::debug!(
                "Installed {} resources ({} failed), {} outstanding",
                report.installed,
                report.failed,
                self.outstanding
            );
        }
        report
    }

    /// Drain until nothing is outstanding or `timeout` passes
    pub fn finish_pending(&mut self, registry: &mut ResourceRegistry, timeout: Duration) -> DrainReport {
        let deadline = Instant::now() + timeout;
        let mut report = DrainReport::default();
        while self.outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completions.recv_timeout(remaining) {
                Ok(completion) => self.install(registry, completion, &mut report),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("{} loads still outstanding after {timeout:?}", self.outstanding);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.note_worker_lost();
                    break;
                }
            }
        }
        report
    }

    fn send(&mut self, request: Request) -> Result<(), LoadError> {
        let sent = self
            .requests
            .as_ref()
            .is_some_and(|requests| requests.send(request).is_ok());
        if sent {
            self.outstanding += 1;
            Ok(())
        } else {
            self.note_worker_lost();
            Err(LoadError::WorkerUnavailable)
        }
    }

    fn install(&mut self, registry: &mut ResourceRegistry, completion: Completion, report: &mut DrainReport) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let (path, outcome) = match completion {
            Completion::Mesh(id, path, Ok(mesh)) => (path, registry.install_mesh(id, mesh).then_some(Ok(()))),
            Completion::Mesh(id, path, Err(e)) => (path, registry.fail_mesh(id, e.to_string()).then_some(Err(e))),
            Completion::Material(id, path, Ok(material)) => {
                (path, registry.install_material(id, material).then_some(Ok(())))
            }
            Completion::Material(id, path, Err(e)) => {
                (path, registry.fail_material(id, e.to_string()).then_some(Err(e)))
            }
            Completion::Script(id, path, result) => {
                let outcome = self.scripts.get_mut(id).map(|slot| match result {
                    Ok(source) => {
                        *slot = ScriptSource::Ready {
                            path: path.clone(),
                            source,
                        };
                        Ok(())
                    }
                    Err(e) => {
                        *slot = ScriptSource::Failed(e.clone());
                        Err(e)
                    }
                });
                (path, outcome)
            }
        };

        match outcome {
            Some(Ok(())) => report.installed += 1,
            Some(Err(e)) => {
                log::warn!("Failed to load '{path}': {e}");
                report.failed += 1;
            }
            None => log::debug!("Dropped load of '{path}': its handle was released"),
        }
    }

    fn note_worker_lost(&mut self) {
        if !self.worker_lost {
            log::error!("Resource loader worker is gone; {} loads will never finish", self.outstanding);
            self.worker_lost = true;
        }
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Resource loader worker panicked");
            }
        }
    }
}

fn worker_loop(source: &dyn AssetSource, requests: &Receiver<Request>, completions: &Sender<Completion>) {
    for request in requests.iter() {
        let completion = match request {
            Request::Mesh(id, path) => {
                let result = read_ron::<MeshData>(source, &path).and_then(|mesh| {
                    mesh.validate().map_err(|reason| LoadError::Invalid {
                        path: path.clone(),
                        reason,
                    })?;
                    Ok(mesh)
                });
                Completion::Mesh(id, path, result)
            }
            Request::Material(id, path) => {
                let result = read_ron::<MaterialData>(source, &path);
                Completion::Material(id, path, result)
            }
            Request::Script(id, path) => {
                let result = read_text(source, &path);
                Completion::Script(id, path, result)
            }
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
    log::debug!("Resource loader worker exiting");
}

fn read_text(source: &dyn AssetSource, path: &str) -> Result<String, LoadError> {
    let bytes = source.read(path)?;
    String::from_utf8(bytes).map_err(|e| LoadError::Parse {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn read_ron<T: serde::de::DeserializeOwned>(source: &dyn AssetSource, path: &str) -> Result<T, LoadError> {
    let text = read_text(source, path)?;
    ron::from_str(&text).map_err(|e| LoadError::Parse {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
