use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Environment variable consulted when no explicit thread count is given.
pub const CPU_THREADS_ENV: &str = "KCP_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon thread pool used by CPU-parallel routines.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `KCP_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Only the first call configures the pool; later calls return the first
/// outcome.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> crate::Result<()> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let configured_threads = match num_threads {
            Some(n) => Some(n),
            None => read_cpu_threads_from_env()?,
        };

        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = configured_threads {
            if n == 0 {
                return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
            }
            builder = builder.num_threads(n);
        }

        builder.build_global().map_err(|e| e.to_string())
    });
    res.clone().map_err(crate::Error::RuntimeError)
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn read_cpu_threads_from_env() -> std::result::Result<Option<usize>, String> {
    match env::var(CPU_THREADS_ENV) {
        Ok(raw) => parse_cpu_threads(&raw).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("failed to read {CPU_THREADS_ENV}: {e}")),
    }
}

fn parse_cpu_threads(raw: &str) -> std::result::Result<usize, String> {
    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"))?;
    if parsed == 0 {
        return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
    }
    Ok(parsed)
}
