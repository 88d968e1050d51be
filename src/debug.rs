//! Debug logging.
//!
//! Provides a macro for writing debug output to whatever serial surface the
//! platform attaches. Output is non-blocking and will be dropped if no
//! writer is attached or a newer message arrives first; logging must never
//! perturb the duty cycle.

use core::cell::RefCell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use heapless::String;

/// Maximum length of a single debug message
const MAX_DEBUG_MSG_LEN: usize = 160;

/// Signal to indicate debug output is available
pub static DEBUG_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Buffer for the pending debug message (protected by critical section mutex)
static DEBUG_BUFFER: Mutex<CriticalSectionRawMutex, RefCell<Option<String<MAX_DEBUG_MSG_LEN>>>> =
    Mutex::new(RefCell::new(None));

/// Initialise the debug output system.
///
/// Must be called once during startup before using the debug macro.
pub fn init() {
    DEBUG_BUFFER.lock(|cell| {
        cell.replace(Some(String::new()));
    });
}

/// Write a debug message to the buffer.
///
/// Non-blocking; truncates long messages and keeps only the latest one.
/// Returns true if the message was queued, false if debug is not initialised.
pub fn write_debug(msg: &str) -> bool {
    DEBUG_BUFFER.lock(|cell| {
        let mut borrowed = cell.borrow_mut();
        if let Some(ref mut buffer) = *borrowed {
            buffer.clear();
            let _ = buffer.push_str(msg);
            DEBUG_SIGNAL.signal(());
            true
        } else {
            false
        }
    })
}

/// Take the current debug message from the buffer.
///
/// Returns None if no message is available.
pub fn take_debug_message() -> Option<String<MAX_DEBUG_MSG_LEN>> {
    DEBUG_BUFFER.lock(|cell| {
        let mut borrowed = cell.borrow_mut();
        if let Some(ref mut buffer) = *borrowed {
            if buffer.is_empty() {
                None
            } else {
                let msg = buffer.clone();
                buffer.clear();
                Some(msg)
            }
        } else {
            None
        }
    })
}

/// Format and write a debug message.
///
/// This is the implementation behind the debug! macro.
pub fn debug_print(args: core::fmt::Arguments) {
    let mut s: String<MAX_DEBUG_MSG_LEN> = String::new();
    let _ = s.write_fmt(args);
    write_debug(&s);
}

/// Print a debug message to the attached debug writer.
///
/// Usage: `debug!("rx kind=0x{:02X}", kind);`
///
/// Messages are non-blocking and will be dropped if no writer drains the
/// buffer in time.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::debug::debug_print(format_args!($($arg)*))
    };
}

/// Debug writer task that ships buffered messages to a serial writer.
///
/// Spawn once with whatever the board exposes as its console.
#[cfg(feature = "embedded")]
pub async fn debug_writer_task<W: embedded_io_async::Write>(mut writer: W) {
    loop {
        DEBUG_SIGNAL.wait().await;

        if let Some(msg) = take_debug_message() {
            // Ignore errors; the console may not be connected
            let _ = writer.write_all(msg.as_bytes()).await;
            let _ = writer.write_all(b"\r\n").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test because the buffer is process-global
    #[test]
    fn test_buffer_keeps_latest_message() {
        init();
        assert!(write_debug("hello"));
        assert_eq!(take_debug_message().as_deref(), Some("hello"));
        assert!(take_debug_message().is_none());

        write_debug("first");
        write_debug("second");
        assert_eq!(take_debug_message().as_deref(), Some("second"));
    }
}
