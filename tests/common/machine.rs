//! A booted kernel with running harts

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pcore_kernel::{Kernel, KernelConfig, Platform};

use super::platform::{FsHandle, SimFs, SimVm, arena};
use super::user::{Program, SimUser, panic_message};

/// Physical pages per machine.
const ARENA_PAGES: usize = 512;
/// `ecall`, never executed on the host.
const INITCODE: [u8; 4] = [0x73, 0x00, 0x00, 0x00];

const RUN_TIMEOUT: Duration = Duration::from_secs(20);
const HALT_TIMEOUT: Duration = Duration::from_secs(2);

/// A platform whose first process does nothing, for boots that never start
/// a hart.
pub fn idle_platform() -> Platform {
    Platform {
        vm: Box::new(SimVm),
        fs: Box::new(FsHandle(SimFs::new())),
        user: Box::new(SimUser {
            init: Arc::new(|_: &'static Kernel| {}),
            failures: Arc::new(Mutex::new(Vec::new())),
        }),
    }
}

pub struct Machine {
    pub kernel: &'static Kernel,
    pub fs: Arc<SimFs>,
    harts: Vec<JoinHandle<()>>,
}

impl Machine {
    /// Boots a kernel whose first process runs `body`, and returns what
    /// `body` returns. Panics if `body` or any user program panics, or if
    /// `body` does not finish in time.
    pub fn run<T, F>(config: KernelConfig, body: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&'static Kernel) -> T + Send + 'static,
    {
        Self::run_with_fs(config, SimFs::new(), body)
    }

    pub fn run_with_fs<T, F>(config: KernelConfig, fs: Arc<SimFs>, body: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&'static Kernel) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let body = Mutex::new(Some(body));
        let init: Program = Arc::new(move |k: &'static Kernel| {
            let body = body.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(body) = body {
                let result = panic::catch_unwind(AssertUnwindSafe(|| body(k))).map_err(panic_message);
                let _ = tx.send(result);
            }
        });

        let failures = Arc::new(Mutex::new(Vec::new()));
        let machine = Self::boot(config, fs, init, failures.clone());
        let result = rx.recv_timeout(RUN_TIMEOUT);
        machine.shutdown();

        let failures = failures.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if !failures.is_empty() {
            panic!("user program failed: {}", failures.join("; "));
        }
        match result {
            Ok(Ok(value)) => value,
            Ok(Err(msg)) => panic!("first process panicked: {}", msg),
            Err(e) => panic!("first process did not finish: {}", e),
        }
    }

    fn boot(config: KernelConfig, fs: Arc<SimFs>, init: Program, failures: Arc<Mutex<Vec<String>>>) -> Self {
        let platform = Platform {
            vm: Box::new(SimVm),
            fs: Box::new(FsHandle(fs.clone())),
            user: Box::new(SimUser { init, failures }),
        };
        let kernel = match Kernel::boot(config, arena(ARENA_PAGES), platform, &INITCODE) {
            Ok(kernel) => kernel,
            Err(e) => panic!("boot failed: {}", e),
        };

        let harts = (0..config.ncpu)
            .map(|id| {
                thread::Builder::new()
                    .name(format!("hart{}", id))
                    .spawn(move || kernel.start_hart(id))
                    .unwrap_or_else(|e| panic!("cannot start hart {}: {}", id, e))
            })
            .collect();

        Self { kernel, fs, harts }
    }

    /// Stops the dispatch loops. Harts still inside a process that never
    /// gives up the CPU are abandoned.
    fn shutdown(self) {
        self.kernel.halt();
        let deadline = Instant::now() + HALT_TIMEOUT;
        for hart in self.harts {
            while !hart.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if hart.is_finished() {
                let _ = hart.join();
            }
        }
    }
}
