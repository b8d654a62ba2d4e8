/// Deferred per-lane callbacks.
/// An atomic read-modify-write is resolved by the memory system long after
/// the instruction issued; each lane's functional effect is parked here and
/// delivered exactly once when the warp instruction completes.
use crate::inst::ScalarInstruction;

/// A unit of work to run once a lane's memory operation completes.
/// The closure captures whatever execution context it needs.
pub struct DeferredCallback {
    function: Box<dyn FnOnce(&ScalarInstruction) + Send>,
}

impl DeferredCallback {
    pub fn new<F>(function: F) -> Self
    where
        F: FnOnce(&ScalarInstruction) + Send + 'static,
    {
        DeferredCallback {
            function: Box::new(function),
        }
    }

    /// Run the callback, consuming it.
    pub fn invoke(self, inst: &ScalarInstruction) {
        (self.function)(inst)
    }
}

impl std::fmt::Debug for DeferredCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeferredCallback")
    }
}
