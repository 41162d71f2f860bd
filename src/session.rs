use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::config::Config;
use crate::detector::Detector;
use crate::error::Error;
use crate::notify::{Notifier, NotifiedSet};
use crate::owner::OwnerResolver;
use crate::pipeline::{FrameLoop, FrameProcessor};
use crate::plate::TextReader;
use crate::record::{RecordTable, ReportEntry};
use crate::source::{self, MediaSource};
use crate::tracker::TrackManager;

/// State belonging to one selected source. Dropped as a whole when another
/// source is selected.
pub struct Session {
    id: u64,
    source: MediaSource,
    tracker: Mutex<TrackManager>,
    records: RecordTable,
    notified: NotifiedSet,
}

impl Session {
    fn new(id: u64, source: MediaSource, config: &Config) -> Self {
        Self {
            id,
            source,
            tracker: Mutex::new(TrackManager::new(config.tracker.clone())),
            records: RecordTable::new(),
            notified: NotifiedSet::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    #[inline]
    pub fn records(&self) -> &RecordTable {
        &self.records
    }

    #[inline]
    pub fn notified(&self) -> &NotifiedSet {
        &self.notified
    }

    pub(crate) fn tracker(&self) -> MutexGuard<'_, TrackManager> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// External capabilities the pipeline calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn Detector>,
    pub reader: Arc<dyn TextReader>,
    pub owners: Arc<dyn OwnerResolver>,
    pub notifier: Arc<dyn Notifier>,
}

/// Owns the current session and hands out frame loops for it.
///
/// `generation` always equals the id of the current session (0 before the
/// first selection). A frame loop stays live while the two match.
pub struct Engine {
    config: Config,
    processor: Arc<FrameProcessor>,
    current: RwLock<Option<Arc<Session>>>,
    generation: Arc<AtomicU64>,
}

impl Engine {
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self, Error> {
        config.validate()?;
        let processor = FrameProcessor::new(&config, collaborators)?;

        Ok(Self {
            config,
            processor: Arc::new(processor),
            current: RwLock::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the current session with a fresh one for `source`. Tracks,
    /// records and the notified set start empty and identities restart at 1.
    /// Loops streaming the previous session stop before their next frame.
    pub fn select_source(&self, source: MediaSource) -> Arc<Session> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let id = self.generation.load(Ordering::SeqCst) + 1;
        let session = Arc::new(Session::new(id, source, &self.config));
        *current = Some(session.clone());
        self.generation.store(id, Ordering::SeqCst);

        log::info!("session {} selected {}", id, session.source());
        session
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[inline]
    pub fn is_current(&self, session_id: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == session_id
    }

    /// Opens the current session's source and returns the loop producing its
    /// annotated multipart parts.
    pub fn stream(&self) -> Result<FrameLoop, Error> {
        let session = self.current().ok_or_else(|| Error::SourceOpen {
            source_ref: "<none>".into(),
            reason: "no source selected".into(),
        })?;

        let frames = source::open(session.source(), self.config.pipeline.fps).map_err(|err| {
            log::error!("session {}: {}", session.id(), err);
            err
        })?;

        Ok(FrameLoop::new(
            session,
            frames,
            self.processor.clone(),
            self.generation.clone(),
            self.config.pipeline.frame_stride,
        ))
    }

    /// Current session's records in first-seen order. Empty without a session.
    pub fn report(&self) -> Vec<ReportEntry> {
        self.current()
            .map(|session| session.records().report())
            .unwrap_or_default()
    }

    /// Identities notified in the current session, sorted.
    pub fn notified(&self) -> Vec<u32> {
        self.current()
            .map(|session| session.notified().snapshot())
            .unwrap_or_default()
    }
}
