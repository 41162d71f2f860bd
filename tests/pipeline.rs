use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;

use speedtrack::{
    BoxError, Collaborators, Config, Detection, Detector, Engine, Frame, MediaSource, Notifier,
    Owner, OwnerRegistry, TextReader,
};

/// Detections as a function of the frame index.
struct ScriptedDetector<F>(F);

impl<F> Detector for ScriptedDetector<F>
where
    F: Fn(u64) -> Result<Vec<Detection>, BoxError> + Send + Sync,
{
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, BoxError> {
        (self.0)(frame.index)
    }
}

fn scripted<F>(script: F) -> Arc<dyn Detector>
where
    F: Fn(u64) -> Result<Vec<Detection>, BoxError> + Send + Sync + 'static,
{
    Arc::new(ScriptedDetector(script))
}

/// Returns the scripted candidates in order, repeating the last one.
struct ScriptedReader {
    candidates: Vec<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedReader {
    fn new(candidates: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            candidates,
            calls: AtomicUsize::new(0),
        })
    }
}

impl TextReader for ScriptedReader {
    fn read(&self, _region: &RgbImage) -> Result<Option<String>, BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.candidates.len().saturating_sub(1));
        Ok(self.candidates.get(idx).map(|s| s.to_string()))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send_message(&self, destination: &str, _subject: &str, _body: &str) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push(destination.to_string());
        Ok(())
    }

    fn send_alert(&self, destination: &str, _body: &str) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push(destination.to_string());
        Ok(())
    }
}

fn config(stride: u32) -> Config {
    let mut config = Config::default();
    config.pipeline.frame_stride = stride;
    config.pipeline.fps = 25.0;
    config.tracker.detection_line_y = 20.0;
    config
}

fn registry() -> Arc<OwnerRegistry> {
    let mut registry = OwnerRegistry::new();
    registry.insert(
        "MH12AB1234",
        Owner {
            name: "A. Driver".into(),
            contact: "+911234567890".into(),
            email: "driver@example.com".into(),
        },
    );
    Arc::new(registry)
}

/// A 20x20 car moving right by `step` pixels per source frame.
fn moving_car(step: f32) -> impl Fn(u64) -> Result<Vec<Detection>, BoxError> + Send + Sync {
    move |index| {
        let x = 14.0 + step * (index - 1) as f32;
        Ok(vec![Detection {
            x,
            y: 40.0,
            w: 20.0,
            h: 20.0,
            confidence: 0.9,
            class: 2,
        }])
    }
}

fn engine_with(
    config: Config,
    detector: Arc<dyn Detector>,
    reader: Arc<dyn TextReader>,
    notifier: Arc<dyn Notifier>,
) -> Engine {
    Engine::new(
        config,
        Collaborators {
            detector,
            reader,
            owners: registry(),
            notifier,
        },
    )
    .unwrap()
}

fn source(frames: u64) -> MediaSource {
    MediaSource::parse(&format!("stub://96x64/{}", frames)).unwrap()
}

#[test]
fn emits_every_kth_frame() {
    for (frames, stride) in [(10, 3), (9, 3), (2, 3), (7, 1), (0, 2)] {
        let engine = engine_with(
            config(stride),
            scripted(|_| Ok(Vec::new())),
            ScriptedReader::new(Vec::new()),
            Arc::new(RecordingNotifier::default()),
        );
        engine.select_source(MediaSource::Synthetic {
            width: 32,
            height: 32,
            frames: Some(frames),
        });

        let emitted = engine.stream().unwrap().count() as u64;
        assert_eq!(emitted, frames / stride as u64, "{} frames / {}", frames, stride);
    }
}

#[test]
fn cold_start_then_calibrated_speed() {
    let engine = engine_with(
        config(1),
        scripted(moving_car(2.0)),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(6));

    let mut frames = engine.stream().unwrap();
    assert!(frames.next().is_some());

    let report = engine.report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].speed, "0.00 km/h");
    assert_eq!(report[0].violation, "None");

    assert_eq!(frames.count(), 5);

    // 2 px per 1/25 s, times the default factor of 5.6
    let report = engine.report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].id, 1);
    assert_eq!(report[0].speed, "280.00 km/h");
    assert_eq!(report[0].violation, "Over Speed");
}

#[test]
fn skipped_frames_stretch_the_time_step() {
    let engine = engine_with(
        config(3),
        scripted(moving_car(2.0)),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(9));

    assert_eq!(engine.stream().unwrap().count(), 3);

    // 6 px per 3/25 s is the same 50 px/s
    assert_eq!(engine.report()[0].speed, "280.00 km/h");
}

#[test]
fn vehicles_above_the_line_are_ignored() {
    let detector = |index: u64| -> Result<Vec<Detection>, BoxError> {
        Ok(vec![Detection {
            x: 40.0,
            y: 5.0 * index as f32,
            w: 20.0,
            h: 10.0,
            confidence: 0.8,
            class: 7,
        }])
    };
    let engine = engine_with(
        config(1),
        scripted(detector),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(4));

    let mut frames = engine.stream().unwrap();
    for _ in 0..3 {
        assert!(frames.next().is_some());
        assert!(engine.report().is_empty());
    }

    assert!(frames.next().is_some());
    let report = engine.report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].speed, "0.00 km/h");
}

#[test]
fn non_vehicle_classes_are_ignored() {
    let detector = |_: u64| -> Result<Vec<Detection>, BoxError> {
        Ok(vec![Detection {
            x: 40.0,
            y: 40.0,
            w: 10.0,
            h: 20.0,
            confidence: 0.99,
            class: 0,
        }])
    };
    let engine = engine_with(
        config(1),
        scripted(detector),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(3));

    assert_eq!(engine.stream().unwrap().count(), 3);
    assert!(engine.report().is_empty());
}

#[test]
fn separate_vehicles_get_separate_identities() {
    let detector = |index: u64| -> Result<Vec<Detection>, BoxError> {
        let dx = index as f32;
        Ok(vec![
            Detection::from_ltrb(2.0 + dx, 30.0, 22.0 + dx, 50.0, 0.7, 2),
            Detection::from_ltrb(60.0 - dx, 30.0, 80.0 - dx, 50.0, 0.9, 3),
        ])
    };
    let engine = engine_with(
        config(1),
        scripted(detector),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(5));

    assert_eq!(engine.stream().unwrap().count(), 5);

    let ids: Vec<u32> = engine.report().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn detector_failure_skips_only_that_frame() {
    let detector = |index: u64| -> Result<Vec<Detection>, BoxError> {
        if index == 2 {
            return Err("inference timeout".into());
        }
        Ok(Vec::new())
    };
    let engine = engine_with(
        config(1),
        scripted(detector),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(4));

    assert_eq!(engine.stream().unwrap().count(), 3);
}

#[test]
fn detector_outage_does_not_inflate_speed() {
    let car = moving_car(2.0);
    let detector = move |index: u64| -> Result<Vec<Detection>, BoxError> {
        if index == 2 {
            return Err("inference timeout".into());
        }
        car(index)
    };
    let engine = engine_with(
        config(1),
        scripted(detector),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(3));

    assert_eq!(engine.stream().unwrap().count(), 2);

    // 4 px over the 2/25 s since the last good frame is still 50 px/s
    let report = engine.report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].speed, "280.00 km/h");
    assert_eq!(report[0].violation, "Over Speed");
}

#[test]
fn undecodable_frame_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(96, 64).save(dir.path().join("001.png")).unwrap();
    std::fs::write(dir.path().join("002.png"), b"not a png").unwrap();
    RgbImage::new(96, 64).save(dir.path().join("003.png")).unwrap();

    let engine = engine_with(
        config(1),
        scripted(|_: u64| Ok(Vec::new())),
        ScriptedReader::new(Vec::new()),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(MediaSource::File(dir.path().to_path_buf()));

    let mut frames = engine.stream().unwrap();
    assert_eq!(frames.by_ref().count(), 2);
    assert_eq!(frames.frames_read(), 3);
}

#[test]
fn violation_is_notified_once() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        config(1),
        scripted(moving_car(2.0)),
        ScriptedReader::new(vec!["MH12AB1234"]),
        notifier.clone(),
    );
    engine.select_source(source(10));

    assert_eq!(engine.stream().unwrap().count(), 10);

    assert_eq!(
        notifier.sent(),
        vec!["driver@example.com".to_string(), "+911234567890".to_string()]
    );
    assert_eq!(engine.notified(), vec![1]);

    let report = engine.report();
    assert_eq!(report[0].plate, "MH12AB1234");
    assert_eq!(report[0].violation, "Over Speed");
}

#[test]
fn slow_vehicle_is_never_notified() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        config(1),
        // 0.2 px per frame: 28 km/h
        scripted(moving_car(0.2)),
        ScriptedReader::new(vec!["MH12AB1234"]),
        notifier.clone(),
    );
    engine.select_source(source(8));

    assert_eq!(engine.stream().unwrap().count(), 8);
    assert!(notifier.sent().is_empty());
    assert!(engine.notified().is_empty());
    assert_eq!(engine.report()[0].violation, "None");
}

#[test]
fn resolved_plate_never_changes() {
    let reader = ScriptedReader::new(vec!["mh12 ab1234", "KA01CD5678"]);
    let engine = engine_with(
        config(1),
        scripted(moving_car(1.0)),
        reader.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(5));

    assert_eq!(engine.stream().unwrap().count(), 5);

    assert_eq!(engine.report()[0].plate, "MH12AB1234");
    assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn invalid_plate_is_retried() {
    let reader = ScriptedReader::new(vec!["12AB1234", "", "KA01CD5678"]);
    let engine = engine_with(
        config(1),
        scripted(moving_car(1.0)),
        reader.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    engine.select_source(source(4));

    let mut frames = engine.stream().unwrap();
    for _ in 0..2 {
        assert!(frames.next().is_some());
        assert_eq!(engine.report()[0].plate, "Not Detected");
    }

    assert_eq!(frames.count(), 2);
    assert_eq!(engine.report()[0].plate, "KA01CD5678");
    assert_eq!(reader.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn selecting_a_source_resets_everything() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine_with(
        config(1),
        scripted(moving_car(2.0)),
        ScriptedReader::new(vec!["MH12AB1234"]),
        notifier.clone(),
    );
    engine.select_source(source(100));

    let mut old = engine.stream().unwrap();
    assert!(old.next().is_some());
    assert!(old.next().is_some());
    assert_eq!(engine.notified(), vec![1]);
    assert_eq!(notifier.sent().len(), 2);

    engine.select_source(source(3));
    assert!(engine.report().is_empty());
    assert!(engine.notified().is_empty());

    assert!(old.next().is_none());
    assert_eq!(old.frames_read(), 2);
    assert_eq!(notifier.sent().len(), 2);

    let mut fresh = engine.stream().unwrap();
    assert!(fresh.next().is_some());
    let report = engine.report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].id, 1);
    assert_eq!(report[0].speed, "0.00 km/h");
}

#[test]
fn reports_are_consistent_while_streaming() {
    let detector = |index: u64| -> Result<Vec<Detection>, BoxError> {
        let dx = (index % 40) as f32;
        Ok(vec![
            Detection::from_ltrb(dx, 22.0, 20.0 + dx, 42.0, 0.9, 2),
            Detection::from_ltrb(70.0 - dx, 40.0, 90.0 - dx, 60.0, 0.8, 5),
        ])
    };
    let engine = Arc::new(engine_with(
        config(1),
        scripted(detector),
        ScriptedReader::new(vec!["", "MH12AB1234"]),
        Arc::new(RecordingNotifier::default()),
    ));
    engine.select_source(source(60));

    let done = AtomicBool::new(false);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    for entry in engine.report() {
                        assert!(entry.id >= 1);
                        assert!(entry.speed.ends_with(" km/h"));
                        let value: f64 = entry
                            .speed
                            .trim_end_matches(" km/h")
                            .parse()
                            .unwrap_or_else(|_| panic!("bad speed {:?}", entry.speed));
                        assert!(entry.violation == "None" || entry.violation == "Over Speed");
                        assert_eq!(
                            entry.violation == "Over Speed",
                            value > 80.0,
                            "{:?}",
                            entry
                        );
                        assert!(entry.plate == "Not Detected" || entry.plate == "MH12AB1234");
                    }
                }
            });
        }

        let emitted = engine.stream().unwrap().count();
        done.store(true, Ordering::SeqCst);
        assert_eq!(emitted, 60);
    });

    assert!(!engine.report().is_empty());
}
