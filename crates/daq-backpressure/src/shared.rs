//! Memory-mapped admission counters shared between processes.
//!
//! The controlling process and the job-worker process each map the same small
//! file. All fields of the header are atomics, so both sides mutate it through
//! shared references; no in-process mutex is ever involved.
//!
//! # Memory Layout
//! ```text
//! [64-byte header] (the whole region)
//!
//!   magic: u64            (0xDA_DA_F1_0C_00_00_00_01)
//!   version: u32          (layout version)
//!   capacity_signal: u32  (0 = clear, 1 = set)
//!   jobs_lock: u32        (spin lock guarding pending_jobs)
//!   pending_jobs: i32
//!   bytes_lock: u32       (spin lock guarding pending_bytes)
//!   reserved: u32
//!   pending_bytes: i64
//!   padding: [u8; 24]
//! ```
//!
//! # Lock Ordering
//!
//! Each counter has its own lock word. Whenever both are held, `jobs_lock` is
//! taken before `bytes_lock`. Every method in this module honours that order;
//! a job worker written against this layout must do the same.
//!
//! # Lifecycle
//!
//! - [`SharedAdmissionState::create`] / [`create_at`](SharedAdmissionState::create_at)
//!   make a new region and own its backing file, which is unlinked on drop.
//! - [`SharedAdmissionState::open`] attaches to an existing region (worker side).
//! - [`SharedAdmissionState::anonymous`] is process-local, for tests.
//!
//! In-process sharing goes through `Arc<SharedAdmissionState>`; the mapping is
//! released deterministically when the last handle drops.

use daq_core::error::{FlowError, FlowResult};
use daq_core::limits::{LOCK_SPIN_LIMIT, SIGNAL_POLL_SLICE};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Magic number for header validation
const MAGIC: u64 = 0xDA_DA_F1_0C_00_00_00_01;

/// Bumped whenever the header layout changes
const LAYOUT_VERSION: u32 = 1;

/// Size of the shared region in bytes (one cache line)
pub const REGION_SIZE: usize = 64;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Shared header. `#[repr(C)]` keeps the layout identical for any process
/// (or language) mapping the file.
#[repr(C)]
struct AdmissionHeader {
    magic: AtomicU64,
    version: AtomicU32,
    capacity_signal: AtomicU32,
    jobs_lock: AtomicU32,
    pending_jobs: AtomicI32,
    bytes_lock: AtomicU32,
    _reserved: AtomicU32,
    pending_bytes: AtomicI64,
    _padding: [u8; 24],
}

const _: () = assert!(std::mem::size_of::<AdmissionHeader>() == REGION_SIZE);

/// Consistent reading of both counters, taken with both locks held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmissionSnapshot {
    /// Jobs accepted but not yet completed.
    pub pending_jobs: i64,
    /// Bytes belonging to those jobs.
    pub pending_bytes: i64,
}

/// Handle to a shared admission region.
///
/// # Safety
/// The header pointer targets the start of `mmap`, which is page aligned and
/// at least [`REGION_SIZE`] bytes, and lives exactly as long as this struct.
/// Every header field is an atomic, so shared access from any number of
/// threads or processes is sound.
pub struct SharedAdmissionState {
    /// Keeps the mapping alive; never read directly.
    _mmap: MmapMut,
    header: NonNull<AdmissionHeader>,
    path: Option<PathBuf>,
    owns_file: bool,
}

// SAFETY: the header is only accessed through atomics, and the mapping it
// points into is owned by (and dropped with) this struct.
unsafe impl Send for SharedAdmissionState {}
// SAFETY: see above; no method hands out non-atomic interior access.
unsafe impl Sync for SharedAdmissionState {}

impl SharedAdmissionState {
    /// Create a new region in a uniquely named file.
    ///
    /// Uses `/dev/shm` when present so the counters never touch a disk,
    /// otherwise the OS temp directory. The file is removed when this handle
    /// drops.
    pub fn create() -> FlowResult<Self> {
        Self::create_at(default_region_path())
    }

    /// Create a new region at `path`, replacing any existing file.
    ///
    /// The returned handle owns the file and removes it on drop.
    pub fn create_at(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(REGION_SIZE as u64)?;

        // SAFETY: we just created and sized the file; other processes only
        // ever touch it through the atomic header.
        let mmap = unsafe { MmapOptions::new().len(REGION_SIZE).map_mut(&file)? };

        let state = Self::from_mmap(mmap, Some(path.to_path_buf()), true);
        state.initialize();
        debug!(path = %path.display(), "Created shared admission state");
        Ok(state)
    }

    /// Attach to a region created by another handle, possibly in another process.
    ///
    /// Validates size, magic number and layout version. The file is never
    /// removed by this handle.
    pub fn open(path: impl AsRef<Path>) -> FlowResult<Self> {
        let path = path.as_ref();
        let invalid = |reason: String| FlowError::InvalidSharedState {
            path: path.to_path_buf(),
            reason,
        };

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len < REGION_SIZE as u64 {
            return Err(invalid(format!(
                "region is {len} bytes, expected at least {REGION_SIZE}"
            )));
        }

        // SAFETY: size checked above; access is through atomics only.
        let mmap = unsafe { MmapOptions::new().len(REGION_SIZE).map_mut(&file)? };
        let state = Self::from_mmap(mmap, Some(path.to_path_buf()), false);

        let magic = state.header().magic.load(Ordering::Acquire);
        if magic != MAGIC {
            return Err(invalid(format!(
                "bad magic number: expected 0x{MAGIC:016X}, got 0x{magic:016X}"
            )));
        }
        let version = state.header().version.load(Ordering::Acquire);
        if version != LAYOUT_VERSION {
            return Err(invalid(format!(
                "unsupported layout version {version} (expected {LAYOUT_VERSION})"
            )));
        }

        debug!(path = %path.display(), "Attached to shared admission state");
        Ok(state)
    }

    /// Process-local region backed by anonymous memory.
    pub fn anonymous() -> FlowResult<Self> {
        let mmap = MmapOptions::new().len(REGION_SIZE).map_anon()?;
        let state = Self::from_mmap(mmap, None, false);
        state.initialize();
        Ok(state)
    }

    fn from_mmap(mut mmap: MmapMut, path: Option<PathBuf>, owns_file: bool) -> Self {
        // SAFETY: a successful mapping is never null.
        let header = unsafe { NonNull::new_unchecked(mmap.as_mut_ptr().cast::<AdmissionHeader>()) };
        Self {
            _mmap: mmap,
            header,
            path,
            owns_file,
        }
    }

    /// Fresh mappings are zero-filled; publish version then magic so a
    /// concurrent `open` never validates a half-written header.
    fn initialize(&self) {
        let header = self.header();
        header.version.store(LAYOUT_VERSION, Ordering::Relaxed);
        header.magic.store(MAGIC, Ordering::Release);
    }

    fn header(&self) -> &AdmissionHeader {
        // SAFETY: see the struct-level invariant.
        unsafe { self.header.as_ref() }
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True if this handle created the backing file and will remove it.
    #[must_use]
    pub fn owns_file(&self) -> bool {
        self.owns_file
    }

    /// Jobs in flight.
    #[must_use]
    pub fn pending_jobs(&self) -> i64 {
        let header = self.header();
        let _guard = SpinGuard::lock(&header.jobs_lock);
        i64::from(header.pending_jobs.load(Ordering::Relaxed))
    }

    /// Bytes in flight.
    #[must_use]
    pub fn pending_bytes(&self) -> i64 {
        let header = self.header();
        let _guard = SpinGuard::lock(&header.bytes_lock);
        header.pending_bytes.load(Ordering::Relaxed)
    }

    /// Both counters, mutually consistent.
    #[must_use]
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let header = self.header();
        let _jobs = SpinGuard::lock(&header.jobs_lock);
        let _bytes = SpinGuard::lock(&header.bytes_lock);
        AdmissionSnapshot {
            pending_jobs: i64::from(header.pending_jobs.load(Ordering::Relaxed)),
            pending_bytes: header.pending_bytes.load(Ordering::Relaxed),
        }
    }

    /// Account for one newly accepted job of `bytes`.
    pub fn record_dispatch(&self, bytes: u64) {
        self.adjust(1, clamp_bytes(bytes));
    }

    /// Account for one finished job of `bytes` and wake any throttled waiter.
    pub fn record_completion(&self, bytes: u64) {
        self.adjust(-1, -clamp_bytes(bytes));
        self.capacity_signal().set();
    }

    fn adjust(&self, jobs: i32, bytes: i64) {
        let header = self.header();
        let _jobs = SpinGuard::lock(&header.jobs_lock);
        let _bytes = SpinGuard::lock(&header.bytes_lock);
        let current_jobs = header.pending_jobs.load(Ordering::Relaxed);
        header
            .pending_jobs
            .store(current_jobs.wrapping_add(jobs), Ordering::Relaxed);
        let current_bytes = header.pending_bytes.load(Ordering::Relaxed);
        header
            .pending_bytes
            .store(current_bytes.wrapping_add(bytes), Ordering::Relaxed);
    }

    /// Zero both counters, returning what they held.
    pub fn reset_counters(&self) -> AdmissionSnapshot {
        let header = self.header();
        let _jobs = SpinGuard::lock(&header.jobs_lock);
        let _bytes = SpinGuard::lock(&header.bytes_lock);
        AdmissionSnapshot {
            pending_jobs: i64::from(header.pending_jobs.swap(0, Ordering::Relaxed)),
            pending_bytes: header.pending_bytes.swap(0, Ordering::Relaxed),
        }
    }

    /// The cross-process wake signal.
    #[must_use]
    pub fn capacity_signal(&self) -> CapacitySignal<'_> {
        CapacitySignal {
            flag: &self.header().capacity_signal,
        }
    }
}

impl std::fmt::Debug for SharedAdmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAdmissionState")
            .field("path", &self.path)
            .field("owns_file", &self.owns_file)
            .field("counters", &self.snapshot())
            .finish()
    }
}

impl Drop for SharedAdmissionState {
    fn drop(&mut self) {
        if !self.owns_file {
            return;
        }
        if let Some(path) = &self.path {
            // Peers that still map the file keep their mapping after unlink.
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "Could not remove admission state file");
                }
            }
        }
    }
}

/// Binary set/clear/wait event stored in shared memory.
///
/// Waiting polls the flag every [`SIGNAL_POLL_SLICE`], which works between
/// processes without any OS-specific wait primitive.
#[derive(Clone, Copy)]
pub struct CapacitySignal<'a> {
    flag: &'a AtomicU32,
}

impl CapacitySignal<'_> {
    /// Raise the signal.
    pub fn set(&self) {
        self.flag.store(1, Ordering::Release);
    }

    /// Lower the signal.
    pub fn clear(&self) {
        self.flag.store(0, Ordering::Release);
    }

    /// Whether the signal is raised.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire) != 0
    }

    /// Block until the signal is raised or `timeout` elapses.
    ///
    /// Returns `true` if the signal was observed set. Does not clear it.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SIGNAL_POLL_SLICE.min(deadline - now));
        }
    }
}

/// RAII guard for a lock word in shared memory.
struct SpinGuard<'a> {
    word: &'a AtomicU32,
}

impl<'a> SpinGuard<'a> {
    fn lock(word: &'a AtomicU32) -> Self {
        let mut spins = 0u32;
        while word
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            if spins < LOCK_SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        Self { word }
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }
}

fn clamp_bytes(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

fn default_region_path() -> PathBuf {
    let shm = Path::new("/dev/shm");
    let dir = if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    };
    dir.join(format!("daq-flow-admission-{}.shm", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn anonymous_region_starts_empty() {
        let state = SharedAdmissionState::anonymous().unwrap();
        assert_eq!(state.snapshot(), AdmissionSnapshot::default());
        assert!(!state.capacity_signal().is_set());
        assert!(state.path().is_none());
    }

    #[test]
    fn dispatch_and_completion_balance() {
        let state = SharedAdmissionState::anonymous().unwrap();
        state.record_dispatch(1024);
        state.record_dispatch(2048);
        assert_eq!(state.pending_jobs(), 2);
        assert_eq!(state.pending_bytes(), 3072);

        state.record_completion(1024);
        let snap = state.snapshot();
        assert_eq!(snap.pending_jobs, 1);
        assert_eq!(snap.pending_bytes, 2048);
        assert!(state.capacity_signal().is_set(), "completion must wake waiters");
    }

    #[test]
    fn reset_returns_previous_values() {
        let state = SharedAdmissionState::anonymous().unwrap();
        state.record_dispatch(10);
        let previous = state.reset_counters();
        assert_eq!(previous.pending_jobs, 1);
        assert_eq!(previous.pending_bytes, 10);
        assert_eq!(state.snapshot(), AdmissionSnapshot::default());
    }

    #[test]
    fn reset_then_late_completion_goes_negative() {
        let state = SharedAdmissionState::anonymous().unwrap();
        state.record_dispatch(100);
        state.reset_counters();
        state.record_completion(100);
        assert_eq!(state.pending_jobs(), -1);
        assert_eq!(state.pending_bytes(), -100);
    }

    #[test]
    fn file_region_is_shared_between_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admission.shm");

        let owner = SharedAdmissionState::create_at(&path).unwrap();
        let peer = SharedAdmissionState::open(&path).unwrap();

        owner.record_dispatch(4096);
        assert_eq!(peer.snapshot().pending_jobs, 1);

        peer.record_completion(4096);
        assert_eq!(owner.snapshot(), AdmissionSnapshot::default());
        assert!(owner.capacity_signal().is_set());
    }

    #[test]
    fn owner_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admission.shm");

        let owner = SharedAdmissionState::create_at(&path).unwrap();
        let peer = SharedAdmissionState::open(&path).unwrap();
        drop(peer);
        assert!(path.exists(), "peer must not unlink the owner's file");
        drop(owner);
        assert!(!path.exists());
    }

    #[test]
    fn open_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-region");
        std::fs::write(&path, [0xAB; REGION_SIZE]).unwrap();

        let err = SharedAdmissionState::open(&path).unwrap_err();
        assert!(matches!(err, FlowError::InvalidSharedState { .. }));
    }

    #[test]
    fn open_rejects_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, [0u8; 8]).unwrap();

        let err = SharedAdmissionState::open(&path).unwrap_err();
        assert!(err.to_string().contains("expected at least"));
    }

    #[test]
    fn default_path_is_unique() {
        let a = SharedAdmissionState::create().unwrap();
        let b = SharedAdmissionState::create().unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.owns_file());
    }

    #[test]
    fn signal_wait_times_out_when_clear() {
        let state = SharedAdmissionState::anonymous().unwrap();
        let started = Instant::now();
        assert!(!state.capacity_signal().wait(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn signal_wait_sees_set_from_other_thread() {
        let state = Arc::new(SharedAdmissionState::anonymous().unwrap());
        let setter = Arc::clone(&state);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            setter.capacity_signal().set();
        });
        assert!(state.capacity_signal().wait(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let state = SharedAdmissionState::anonymous().unwrap();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        state.record_dispatch(3);
                    }
                });
            }
        });
        assert_eq!(
            state.snapshot(),
            AdmissionSnapshot {
                pending_jobs: 8000,
                pending_bytes: 24_000,
            }
        );
    }
}
