use std::sync::OnceLock;
use tokio::sync::Mutex;

/// Global mutex to serialize Ledger/HID access.
///
/// Connecting and signing each open the device; two overlapping opens fail
/// with HIDAPI errors such as "Overlapped I/O operation is in progress".
static LEDGER_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn ledger_lock() -> &'static Mutex<()> {
    LEDGER_LOCK.get_or_init(|| Mutex::new(()))
}
