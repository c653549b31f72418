//! Scriptable in-memory indexing backend

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use symbol_indexer::{IndexingBackend, PackageIdentity, StoreConfig, SymbolIndexError};

/// Longest a `Script::Hang` blocks before giving up on its own
const HANG_LIMIT: Duration = Duration::from_secs(30);

/// What the backend does with a package
#[derive(Debug, Clone)]
pub enum Script {
    /// Publish a marker pdb and source file, then succeed
    Succeed,
    /// Fail with the given message
    Fail(String),
    /// Block until `FakeBackend::release` is called
    Hang,
    /// Panic with the given message
    Panic(String),
}

/// `IndexingBackend` whose behaviour is scripted per package file name
pub struct FakeBackend {
    default: Script,
    overrides: Mutex<HashMap<String, Script>>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    processed: Mutex<Vec<PathBuf>>,
    released: Mutex<bool>,
    release_signal: Condvar,
}

impl FakeBackend {
    pub fn new(default: Script) -> Arc<Self> {
        Self::with_delay(default, Duration::ZERO)
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Script::Succeed)
    }

    /// Backend that spends `delay` on every package
    pub fn with_delay(default: Script, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            default,
            overrides: Mutex::new(HashMap::new()),
            delay,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            processed: Mutex::new(Vec::new()),
            released: Mutex::new(false),
            release_signal: Condvar::new(),
        })
    }

    /// Script the behaviour for one package file name
    pub fn script(&self, file_name: &str, script: Script) -> &Self {
        self.overrides.lock().insert(file_name.to_string(), script);
        self
    }

    /// Unblock every hanging package
    pub fn release(&self) {
        *self.released.lock() = true;
        self.release_signal.notify_all();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of packages processed at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> Vec<PathBuf> {
        self.processed.lock().clone()
    }

    fn script_for(&self, package: &Path) -> Script {
        let name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.overrides
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn hang(&self) {
        let deadline = Instant::now() + HANG_LIMIT;
        let mut released = self.released.lock();
        while !*released {
            if self
                .release_signal
                .wait_until(&mut released, deadline)
                .timed_out()
            {
                break;
            }
        }
    }

    fn publish(package: &Path, stores: &StoreConfig) -> std::io::Result<()> {
        let identity =
            PackageIdentity::from_file_name(package).unwrap_or_else(PackageIdentity::unknown);

        let symbols = stores.symbols_dir.join(format!("{}.pdb", identity.id));
        fs::create_dir_all(&symbols)?;
        fs::write(symbols.join("index.txt"), &identity.version)?;

        let sources = stores.sources_dir.join(&identity.id).join(&identity.version);
        fs::create_dir_all(&sources)?;
        fs::write(sources.join("Program.cs"), "class Program {}")
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl IndexingBackend for FakeBackend {
    fn load_identity(&self, _package: &Path) -> Option<PackageIdentity> {
        None
    }

    fn process(
        &self,
        package: &Path,
        unpack_dir: &Path,
        stores: &StoreConfig,
    ) -> symbol_indexer::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.processed.lock().push(package.to_path_buf());

        fs::write(unpack_dir.join("unpacked.pdb"), "pdb")
            .map_err(|e| SymbolIndexError::io(unpack_dir, e))?;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        match self.script_for(package) {
            Script::Succeed => {
                Self::publish(package, stores).map_err(|e| SymbolIndexError::io(package, e))
            }
            Script::Fail(message) => Err(SymbolIndexError::ToolError {
                tool: "symstore".to_string(),
                message,
            }),
            Script::Hang => {
                self.hang();
                Ok(())
            }
            Script::Panic(message) => panic!("{}", message),
        }
    }
}
