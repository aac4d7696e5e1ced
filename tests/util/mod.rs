use interfaces_of_power::bus::ViewId;
use interfaces_of_power::config::EngineConfig;
use interfaces_of_power::model::{AdRecord, Party, RemovalRecord, RequestRecord, StateSpendRecord};
use interfaces_of_power::session::Session;
use interfaces_of_power::store::DatasetBundle;
use interfaces_of_power::views::{RenderFrame, ViewAdapter, ViewError};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Install a debug-level subscriber for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<std::ffi::OsStr>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

/// Every frame an adapter was asked to draw, shared with the test body.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingAdapter {
    frames: Rc<RefCell<Vec<RenderFrame>>>,
}

#[allow(dead_code)]
impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn last(&self) -> RenderFrame {
        self.frames.borrow().last().cloned().expect("no frame rendered")
    }
}

impl ViewAdapter for RecordingAdapter {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), ViewError> {
        self.frames.borrow_mut().push(frame.clone());
        Ok(())
    }
}

/// Renders the mount frame, then fails (or panics) on every later frame.
#[allow(dead_code)]
pub struct FailingAdapter {
    rendered: usize,
    panic: bool,
}

#[allow(dead_code)]
impl FailingAdapter {
    pub fn erroring() -> Self {
        Self {
            rendered: 0,
            panic: false,
        }
    }

    pub fn panicking() -> Self {
        Self {
            rendered: 0,
            panic: true,
        }
    }
}

impl ViewAdapter for FailingAdapter {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), ViewError> {
        self.rendered += 1;
        if self.rendered == 1 {
            return Ok(());
        }
        if self.panic {
            panic!("adapter for {} exploded", frame.view);
        }
        Err(ViewError::render(&frame.view, "canvas detached"))
    }
}

fn date(s: &str) -> chrono::NaiveDate {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("fixture date")
}

/// A small bundle covering all four datasets.
///
/// - ads: three weeks of January 2020, all three parties
/// - requests: half-yearly reports 2013..=2019
/// - removals: yearly reports 2015..=2017, four reasons
/// - state_spend: four states
#[allow(dead_code)]
pub fn sample_bundle() -> DatasetBundle {
    let ads = [
        ("2020-01-06", Party::Democratic, 100.0),
        ("2020-01-06", Party::Republican, 50.0),
        ("2020-01-08", Party::Other, 5.0),
        ("2020-01-13", Party::Democratic, 120.0),
        ("2020-01-13", Party::Republican, 80.0),
        ("2020-01-20", Party::Republican, 90.0),
    ]
    .into_iter()
    .map(|(d, party, spend)| AdRecord {
        date: date(d),
        party,
        spend,
    })
    .collect();

    let requests = [
        ("2013-06-30", 11.0, 20.0, 79.0),
        ("2013-12-31", 12.0, 21.0, 81.0),
        ("2016-06-30", 30.0, 41.0, 83.0),
        ("2019-12-31", 64.0, 95.0, 88.0),
    ]
    .into_iter()
    .map(|(d, requests, accounts, disclosure_rate)| RequestRecord {
        date: date(d),
        requests,
        accounts,
        disclosure_rate,
    })
    .collect();

    let removals = [
        ("2015-12-31", "Defamation", 40.0),
        ("2015-12-31", "Privacy", 10.0),
        ("2016-12-31", "Defamation", 30.0),
        ("2016-12-31", "Copyright", 25.0),
        ("2017-12-31", "Spam", 1.0),
    ]
    .into_iter()
    .map(|(d, reason, total)| RemovalRecord {
        date: date(d),
        reason: reason.to_string(),
        total,
    })
    .collect();

    let state_spend = [("Ohio", 300.0), ("Texas", 500.0), ("Utah", 20.0), ("Iowa", 90.0)]
        .into_iter()
        .map(|(state, spend)| StateSpendRecord {
            state: state.to_string(),
            spend,
        })
        .collect();

    DatasetBundle {
        ads,
        requests,
        removals,
        state_spend,
    }
}

/// A ready session over [`sample_bundle`] with the default config.
#[allow(dead_code)]
pub fn sample_session() -> Session {
    futures::executor::block_on(Session::init(
        &EngineConfig::default(),
        sample_bundle().into_loads(),
    ))
    .expect("session init")
}

#[allow(dead_code)]
pub fn view(id: &str) -> ViewId {
    ViewId::from(id)
}

#[allow(dead_code)]
pub struct TempFixtureDir {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempFixtureDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write `bundle` as JSON and return its path.
    pub fn write_bundle(&self, bundle: &DatasetBundle) -> PathBuf {
        let path = self.dir.path().join("bundle.json");
        let json = serde_json::to_string_pretty(bundle).expect("serialize bundle");
        std::fs::write(&path, json).expect("write bundle");
        path
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }
}
