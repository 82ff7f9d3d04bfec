//! Real-time scheduling for the processing thread

use std::io;

/// Move the calling thread to `SCHED_FIFO` at `priority`
#[cfg(target_os = "linux")]
pub fn promote_current_thread(priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pthread_self is always a valid handle for the calling thread
    let result = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if result != 0 {
        return Err(io::Error::from_raw_os_error(result));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn promote_current_thread(_priority: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "real-time scheduling is only implemented on Linux",
    ))
}

/// Try to promote the calling thread, logging a warning on failure
pub fn try_promote_current_thread(priority: Option<i32>) {
    let Some(priority) = priority else {
        return;
    };
    match promote_current_thread(priority) {
        Ok(()) => log::info!("[RT] Processing thread running SCHED_FIFO at priority {}", priority),
        Err(e) => log::warn!(
            "[RT] Could not set real-time priority {} ({}); continuing with normal scheduling",
            priority,
            e
        ),
    }
}
