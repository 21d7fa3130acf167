use crate::config::Config;
use crate::store::{IdentityStore, StoreError};
use likeness_core::{
    best_match, score_all, CollaboratorError, Comparison, Detector, DynamicImage, FeatureVector,
    IdentityRecord, Person, Renderer, TrainError, Training, Vectorizer,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Render written by `compare` for inspection.
const COMPARE_RENDER_NAME: &str = "face_temp.png";

/// Crop name prefix for an in-memory probe image.
const PROBE_LABEL: &str = "probe";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("training failed: {0}")]
    Train(#[from] TrainError),
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// The detector, vectorizer, and renderer the engine drives.
pub struct Collaborators {
    pub detector: Box<dyn Detector>,
    pub vectorizer: Box<dyn Vectorizer>,
    pub renderer: Box<dyn Renderer>,
}

/// Result of adding a record to the store.
#[derive(Debug, Clone)]
pub struct AddResult {
    pub key: String,
    /// False when the snapshot could not be written; the record is still
    /// held in memory.
    pub persisted: bool,
}

/// Result of an enrollment.
#[derive(Debug, Clone)]
pub struct EnrollResult {
    pub key: String,
    /// Face crops detected across all source images.
    pub faces_found: usize,
    pub training: Training,
    pub persisted: bool,
}

/// The identity a recognition settled on.
#[derive(Debug, Clone)]
pub struct MatchedIdentity {
    pub key: String,
    pub record: IdentityRecord,
    pub score: f64,
}

/// Result of a recognition. `matched` is `None` when no probe/identity
/// pair scored under the acceptance threshold.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub matched: Option<MatchedIdentity>,
    /// Every usable vector detected in the probe image.
    pub probe_vectors: Vec<FeatureVector>,
}

impl Recognition {
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Scores of one face crop against every trained identity.
#[derive(Debug, Clone)]
pub struct CompareResult {
    pub comparisons: Vec<Comparison>,
    /// Lowest score, regardless of the acceptance threshold.
    pub closest: Option<Comparison>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub identities: usize,
    pub trained: usize,
    pub data_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

/// An image to run detection on, either a file or already decoded.
enum ImageSource {
    Path(PathBuf),
    Memory { label: String, image: DynamicImage },
}

impl ImageSource {
    fn detect(
        &self,
        detector: &dyn Detector,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, CollaboratorError> {
        match self {
            ImageSource::Path(path) => detector.detect(path, out_dir),
            ImageSource::Memory { label, image } => detector.detect_image(image, label, out_dir),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "{}", path.display()),
            ImageSource::Memory { label, image } => {
                write!(f, "<{label}: {}x{}>", image.width(), image.height())
            }
        }
    }
}

/// Messages sent from handles to the engine thread.
enum EngineRequest {
    Identities {
        reply: oneshot::Sender<Vec<IdentityRecord>>,
    },
    AddIdentity {
        record: IdentityRecord,
        reply: oneshot::Sender<AddResult>,
    },
    Enroll {
        person: Person,
        sources: Vec<ImageSource>,
        reply: oneshot::Sender<Result<EnrollResult, EngineError>>,
    },
    Recognize {
        source: ImageSource,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
    Compare {
        face: PathBuf,
        reply: oneshot::Sender<Result<CompareResult, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    recognize_timeout: Duration,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// A copy of every stored record, in key order.
    pub async fn identities(&self) -> Result<Vec<IdentityRecord>, EngineError> {
        self.request(|reply| EngineRequest::Identities { reply }).await
    }

    /// Insert or overwrite a record under its composite key.
    pub async fn add_identity(&self, record: IdentityRecord) -> Result<AddResult, EngineError> {
        self.request(|reply| EngineRequest::AddIdentity { record, reply })
            .await
    }

    /// Detect faces in each image, train on the crops, and store the result.
    pub async fn enroll(
        &self,
        person: Person,
        images: Vec<PathBuf>,
    ) -> Result<EnrollResult, EngineError> {
        let sources = images.into_iter().map(ImageSource::Path).collect();
        self.enroll_sources(person, sources).await
    }

    /// [`EngineHandle::enroll`] for images already decoded in memory. Crops
    /// are named `image_<n>` after each image's position.
    pub async fn enroll_images(
        &self,
        person: Person,
        images: Vec<DynamicImage>,
    ) -> Result<EnrollResult, EngineError> {
        let sources = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| ImageSource::Memory {
                label: format!("image_{i}"),
                image,
            })
            .collect();
        self.enroll_sources(person, sources).await
    }

    async fn enroll_sources(
        &self,
        person: Person,
        sources: Vec<ImageSource>,
    ) -> Result<EnrollResult, EngineError> {
        self.request(|reply| EngineRequest::Enroll {
            person,
            sources,
            reply,
        })
        .await?
    }

    /// Detect faces in `image` and match them against the store.
    pub async fn recognize(&self, image: impl Into<PathBuf>) -> Result<Recognition, EngineError> {
        self.recognize_source(ImageSource::Path(image.into())).await
    }

    /// [`EngineHandle::recognize`] for an image already decoded in memory.
    pub async fn recognize_image(&self, image: DynamicImage) -> Result<Recognition, EngineError> {
        self.recognize_source(ImageSource::Memory {
            label: PROBE_LABEL.to_string(),
            image,
        })
        .await
    }

    async fn recognize_source(&self, source: ImageSource) -> Result<Recognition, EngineError> {
        let pending = self.request(|reply| EngineRequest::Recognize { source, reply });
        tokio::time::timeout(self.recognize_timeout, pending)
            .await
            .map_err(|_| EngineError::Timeout(self.recognize_timeout))??
    }

    /// Score a pre-cropped face against every trained identity.
    pub async fn compare(&self, face: impl Into<PathBuf>) -> Result<CompareResult, EngineError> {
        let face = face.into();
        self.request(|reply| EngineRequest::Compare { face, reply })
            .await?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Creates the data directory and loads the snapshot before returning. A
/// missing or unreadable snapshot is logged and the engine starts empty.
pub fn spawn_engine(
    config: &Config,
    collaborators: Collaborators,
) -> Result<EngineHandle, EngineError> {
    let mut store = IdentityStore::new(&config.data_dir);
    if let Err(e) = store.ensure_data_dir() {
        tracing::warn!(error = %e, "cannot create data directory; continuing in memory");
    }
    match store.load() {
        Ok(count) => tracing::info!(
            path = %store.snapshot_path().display(),
            identities = count,
            "snapshot loaded"
        ),
        Err(e) if e.is_not_found() => {
            tracing::info!(path = %store.snapshot_path().display(), "no snapshot yet, starting empty")
        }
        Err(e) => tracing::warn!(error = %e, "snapshot unreadable, starting empty"),
    }

    let mut engine = Engine {
        store,
        scratch_dir: config.scratch_dir.clone(),
        detector: collaborators.detector,
        vectorizer: collaborators.vectorizer,
        renderer: collaborators.renderer,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("likeness-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        recognize_timeout: config.recognize_timeout(),
    })
}

/// Snapshot failures never fail a request: the in-memory store stays
/// authoritative. Returns whether the write succeeded.
fn snapshot_written(result: Result<(), StoreError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "snapshot not written; continuing in memory");
            false
        }
    }
}

/// State owned by the engine thread. Every store read and write happens
/// here, one request at a time.
struct Engine {
    store: IdentityStore,
    scratch_dir: PathBuf,
    detector: Box<dyn Detector>,
    vectorizer: Box<dyn Vectorizer>,
    renderer: Box<dyn Renderer>,
}

impl Engine {
    fn handle(&mut self, req: EngineRequest) {
        // Every access rewrites the snapshot, not only mutations.
        snapshot_written(self.store.save());

        match req {
            EngineRequest::Identities { reply } => {
                let _ = reply.send(self.store.identities().values().cloned().collect());
            }
            EngineRequest::AddIdentity { record, reply } => {
                let key = record.key();
                let persisted = snapshot_written(self.store.add_identity(record));
                tracing::info!(key = %key, persisted, "identity added");
                let _ = reply.send(AddResult { key, persisted });
            }
            EngineRequest::Enroll {
                person,
                sources,
                reply,
            } => {
                let _ = reply.send(self.enroll(person, &sources));
            }
            EngineRequest::Recognize { source, reply } => {
                let _ = reply.send(self.recognize(&source));
            }
            EngineRequest::Compare { face, reply } => {
                let _ = reply.send(self.compare(&face));
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    identities: self.store.len(),
                    trained: self.store.trained_count(),
                    data_dir: self.store.data_dir().to_path_buf(),
                    scratch_dir: self.scratch_dir.clone(),
                });
            }
        }
    }

    fn ensure_dir(dir: &Path) -> Result<(), EngineError> {
        std::fs::create_dir_all(dir).map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn enroll(
        &mut self,
        person: Person,
        sources: &[ImageSource],
    ) -> Result<EnrollResult, EngineError> {
        let dir = self.store.record_dir(&person);
        Self::ensure_dir(&dir)?;

        let mut record = IdentityRecord::new(person);
        for source in sources {
            let crops = source.detect(self.detector.as_ref(), &dir)?;
            tracing::debug!(source = %source, crops = crops.len(), "enroll: detected faces");
            record.attach_training_images(crops);
        }

        let key = record.key();
        let faces_found = record.training_images.len();
        tracing::info!(key = %key, faces_found, "enroll: detection finished");

        let training = record.train(self.vectorizer.as_ref(), self.renderer.as_ref(), &dir)?;
        let persisted = snapshot_written(self.store.add_identity(record));

        Ok(EnrollResult {
            key,
            faces_found,
            training,
            persisted,
        })
    }

    fn recognize(&self, source: &ImageSource) -> Result<Recognition, EngineError> {
        Self::ensure_dir(&self.scratch_dir)?;

        let crops = source.detect(self.detector.as_ref(), &self.scratch_dir)?;

        let mut probe_vectors = Vec::with_capacity(crops.len());
        for crop in &crops {
            match self.vectorizer.vectorize(crop) {
                Ok(v) if v.has_area() => probe_vectors.push(v),
                Ok(_) => {
                    tracing::debug!(crop = %crop.display(), "zero-sized crop, skipping")
                }
                Err(e) => tracing::warn!(error = %e, "crop not vectorized, skipping"),
            }
        }

        let best = best_match(&probe_vectors, self.store.identities());
        let matched = best.and_then(|b| {
            let record = self.store.get(&b.key)?.clone();
            Some(MatchedIdentity {
                key: b.key,
                record,
                score: b.score,
            })
        });

        match &matched {
            Some(m) => tracing::info!(
                source = %source,
                key = %m.key,
                score = m.score,
                "recognize: identity matched"
            ),
            None => tracing::info!(
                source = %source,
                probes = probe_vectors.len(),
                "recognize: no identity matched"
            ),
        }

        Ok(Recognition {
            matched,
            probe_vectors,
        })
    }

    fn compare(&self, face: &Path) -> Result<CompareResult, EngineError> {
        let probe = self.vectorizer.vectorize(face)?;

        Self::ensure_dir(&self.scratch_dir)?;
        let render_path = self.scratch_dir.join(COMPARE_RENDER_NAME);
        if let Err(e) = self.renderer.render(&probe, &render_path) {
            tracing::warn!(error = %e, "compare: render failed; continuing");
        }

        let comparisons = score_all(&probe, self.store.identities());
        let closest = comparisons
            .iter()
            .fold(None::<&Comparison>, |best, c| match best {
                Some(b) if b.score <= c.score => Some(b),
                _ => Some(c),
            })
            .cloned();

        Ok(CompareResult {
            comparisons,
            closest,
        })
    }
}
