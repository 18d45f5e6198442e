//! Entry point called by GoldSim.
//!
//! GoldSim calls a single exported function with a method id, a status pointer and two arrays
//! of doubles. Errors with a message are reported by packing the address of a NUL-terminated
//! string into the first output slot. The string is owned by the bridge and stays valid until
//! the next failing call.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::engine::{Engine, Swmm5};
use crate::error::Error;
use crate::logging;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};

/// Methods GoldSim may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodId {
    Initialize = 0,
    Calculate = 1,
    ReportVersion = 2,
    ReportArguments = 3,
    Cleanup = 99,
}

impl TryFrom<c_int> for MethodId {
    type Error = c_int;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Initialize),
            1 => Ok(Self::Calculate),
            2 => Ok(Self::ReportVersion),
            3 => Ok(Self::ReportArguments),
            99 => Ok(Self::Cleanup),
            other => Err(other),
        }
    }
}

/// Status codes returned to GoldSim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    Failure = 1,
    /// Failure whose message address is in the first output slot.
    FailureWithMessage = -1,
}

impl Status {
    #[inline]
    pub fn code(self) -> c_int {
        self as c_int
    }
}

const PANIC_MESSAGE: &[u8] = b"Error: Internal bridge failure\nContext: The bridge panicked while handling the request\nSuggestion: Check bridge_debug.log and report the problem\0";

/// Owner of the last error message handed to the host.
#[derive(Debug, Default)]
pub struct MessageSlot(Option<CString>);

impl MessageSlot {
    /// Stores `message`, replacing the previous one, and returns its address.
    pub fn store(&mut self, message: &str) -> *const c_char {
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        self.0.insert(message).as_ptr()
    }

    /// Returns the stored message, if any.
    pub fn message(&self) -> Option<&CStr> {
        self.0.as_deref()
    }
}

/// Writes the address of a message into the first output slot.
///
/// # Safety
///
/// `outargs` must be null or valid for writing one double.
unsafe fn pack_message(outargs: *mut f64, message: *const c_char) {
    if !outargs.is_null() {
        outargs.cast::<usize>().write_unaligned(message as usize);
    }
}

/// A bridge together with the storage of its error messages.
#[derive(Debug)]
pub struct Host<E: Engine> {
    bridge: Bridge<E>,
    slot: MessageSlot,
}

impl<E: Engine> Host<E> {
    pub fn new(bridge: Bridge<E>) -> Self {
        Self {
            bridge,
            slot: MessageSlot::default(),
        }
    }

    #[inline]
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    #[inline]
    pub fn bridge_mut(&mut self) -> &mut Bridge<E> {
        &mut self.bridge
    }

    /// Returns the last error message handed to the host.
    #[inline]
    pub fn last_message(&self) -> Option<&CStr> {
        self.slot.message()
    }

    /// Handles one call from the host.
    ///
    /// # Safety
    ///
    /// `status` must be null or valid for writing. For `Calculate`, `inargs` must hold at least
    /// as many doubles as the interface has inputs. `outargs` must hold at least as many doubles
    /// as the interface has outputs, and at least two for `ReportArguments`.
    pub unsafe fn dispatch(
        &mut self,
        method_id: c_int,
        status: *mut c_int,
        inargs: *const f64,
        outargs: *mut f64,
    ) {
        tracing::debug!("method {method_id} called");
        let result = match MethodId::try_from(method_id) {
            Err(id) => {
                tracing::error!("unknown method id {id}");
                Err(None)
            }
            Ok(method) => self.run(method, inargs, outargs).map_err(Some),
        };
        let code = match result {
            Ok(()) => Status::Success,
            Err(Some(e)) if e.has_message() => {
                tracing::error!("method {method_id} failed: {e}");
                let message = self.slot.store(&e.to_string());
                pack_message(outargs, message);
                Status::FailureWithMessage
            }
            Err(e) => {
                if let Some(e) = e {
                    tracing::warn!("method {method_id} failed: {e}");
                }
                Status::Failure
            }
        };
        if !status.is_null() {
            status.write(code.code());
        }
        tracing::debug!("method {method_id} complete with status {}", code.code());
    }

    unsafe fn run(
        &mut self,
        method: MethodId,
        inargs: *const f64,
        outargs: *mut f64,
    ) -> Result<(), Error> {
        match method {
            MethodId::Initialize => self.bridge.initialize(),
            MethodId::Calculate => {
                let (n_in, n_out) = self
                    .bridge
                    .interface()
                    .map_or((0, 0), |i| (i.inputs().len(), i.outputs().len()));
                let inputs: &[f64] = if inargs.is_null() || n_in == 0 {
                    &[]
                } else {
                    std::slice::from_raw_parts(inargs, n_in)
                };
                let outputs: &mut [f64] = if outargs.is_null() || n_out == 0 {
                    &mut []
                } else {
                    std::slice::from_raw_parts_mut(outargs, n_out)
                };
                self.bridge.calculate(inputs, outputs).map(|_| ())
            }
            MethodId::ReportVersion => {
                if !outargs.is_null() {
                    outargs.write(self.bridge.report_version());
                }
                Ok(())
            }
            MethodId::ReportArguments => {
                let (n_in, n_out) = self.bridge.report_arguments()?;
                if !outargs.is_null() {
                    outargs.write(n_in as f64);
                    outargs.add(1).write(n_out as f64);
                }
                Ok(())
            }
            MethodId::Cleanup => self.bridge.cleanup(),
        }
    }
}

static HOST: Mutex<Option<Host<Swmm5>>> = Mutex::new(None);

/// Entry point exported to GoldSim.
///
/// The bridge is created on the first call, with the default file names in the working
/// directory of the host process.
///
/// # Safety
///
/// See [`Host::dispatch`].
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn SwmmGoldSimBridge(
    method_id: c_int,
    status: *mut c_int,
    inargs: *mut f64,
    outargs: *mut f64,
) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut guard = HOST.lock().unwrap_or_else(PoisonError::into_inner);
        let host = guard.get_or_insert_with(|| {
            let config = BridgeConfig::default();
            logging::init(&config.log_path);
            let engine = Swmm5::new(config.engine_library.clone());
            Host::new(Bridge::new(config, engine))
        });
        host.dispatch(method_id, status, inargs, outargs);
    }));
    if outcome.is_err() {
        tracing::error!("panic while handling method {method_id}");
        if !status.is_null() {
            status.write(Status::FailureWithMessage.code());
        }
        pack_message(outargs, PANIC_MESSAGE.as_ptr().cast::<c_char>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_ids() {
        assert_eq!(Ok(MethodId::Initialize), MethodId::try_from(0));
        assert_eq!(Ok(MethodId::Cleanup), MethodId::try_from(99));
        assert_eq!(Err(4), MethodId::try_from(4));
        assert_eq!(-1, Status::FailureWithMessage.code());
    }

    #[test]
    fn test_message_slot() {
        let mut slot = MessageSlot::default();
        assert!(slot.message().is_none());
        let first = slot.store("Error: a\0b");
        let text = unsafe { CStr::from_ptr(first) };
        assert_eq!("Error: a b", text.to_str().unwrap());
        slot.store("Error: second");
        assert_eq!("Error: second", slot.message().unwrap().to_str().unwrap());
    }

    #[test]
    fn test_panic_message() {
        let text = CStr::from_bytes_with_nul(PANIC_MESSAGE).unwrap();
        assert_eq!(3, text.to_str().unwrap().lines().count());
    }
}
