//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall; mlockall elsewhere).

use crate::cli::{RtArgs, RtLock};
use std::sync::OnceLock;

static RT_ONCE: OnceLock<()> = OnceLock::new();

/// Apply the requested real-time settings once per process. Failures are
/// logged and the process keeps running with normal scheduling.
pub fn setup_rt_once(args: &RtArgs) {
    if !args.rt {
        return;
    }
    let lock = args.rt_lock.unwrap_or_else(RtLock::os_default);
    RT_ONCE.get_or_init(|| {
        match lock_memory(lock) {
            Ok(()) => tracing::info!(mode = ?lock, "RT memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "mlockall failed"),
        }
        apply_scheduling(args.rt_prio, args.rt_cpu);
    });
}

#[cfg(unix)]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    // SAFETY: mlockall takes plain flags and has no memory-safety preconditions.
    if unsafe { mlockall(flags) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    let retryable = matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    // Locking future pages is the first thing to go under a tight memlock limit.
    if matches!(lock, RtLock::All) && retryable && unsafe { mlockall(MCL_CURRENT) } == 0 {
        tracing::warn!(error = %err, "mlockall(current|future) failed; locked current pages only");
        return Ok(());
    }
    let mut msg = format!("mlockall({lock:?}) failed: {err}");
    if retryable {
        msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(not(unix))]
fn lock_memory(_lock: RtLock) -> eyre::Result<()> {
    eyre::bail!("memory locking is not supported on this OS")
}

#[cfg(target_os = "linux")]
fn apply_scheduling(prio: Option<i32>, cpu: Option<usize>) {
    if let Err(err) = set_fifo_priority(prio) {
        tracing::warn!(error = %err, "SCHED_FIFO not applied");
    }
    if let Err(err) = pin_to_cpu(cpu.unwrap_or(0)) {
        tracing::warn!(error = %err, "CPU affinity not applied");
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_scheduling(_prio: Option<i32>, _cpu: Option<usize>) {
    tracing::warn!("SCHED_FIFO and CPU affinity are Linux-only; only mlockall applied");
}

#[cfg(target_os = "linux")]
fn set_fifo_priority(prio: Option<i32>) -> eyre::Result<()> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    // SAFETY: plain queries of the scheduler's priority range.
    let (min, max) = unsafe {
        (
            sched_get_priority_min(SCHED_FIFO),
            sched_get_priority_max(SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let param = sched_param {
        sched_priority: prio.unwrap_or(max).clamp(min, max),
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling process.
    if unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
        let err = std::io::Error::last_os_error();
        eyre::bail!(
            "sched_setscheduler(SCHED_FIFO, {}) failed: {err}; hint: needs CAP_SYS_NICE or root",
            param.sched_priority
        );
    }
    tracing::info!(priority = param.sched_priority, "RT SCHED_FIFO applied");
    Ok(())
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(cpu: usize) -> eyre::Result<()> {
    let capacity = std::mem::size_of::<libc::cpu_set_t>() * 8;
    if cpu >= capacity {
        eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {capacity}");
    }
    // SAFETY: cpu_set_t is plain data; all-zero is the empty set.
    let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    // SAFETY: `allowed` is a valid, writable cpu_set_t of the size passed.
    let rc = unsafe {
        libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut allowed)
    };
    // SAFETY: `cpu` was bounds-checked against the set's capacity above.
    if rc == 0 && !unsafe { libc::CPU_ISSET(cpu, &allowed) } {
        eyre::bail!("CPU {cpu} not permitted by the current affinity mask");
    }
    // SAFETY: as above; `desired` is a zeroed cpu_set_t.
    let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { libc::CPU_SET(cpu, &mut desired) };
    // SAFETY: `desired` is valid for the size passed.
    let rc =
        unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &desired) };
    if rc != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    tracing::info!(cpu, "RT CPU affinity applied");
    Ok(())
}
