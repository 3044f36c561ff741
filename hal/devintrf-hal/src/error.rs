//! Transaction errors

/// Reasons a transaction bracket could not be opened
///
/// Neither variant is fatal. In both cases the busy flag is left exactly as
/// it was before the call, so the handle stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionError<E> {
    /// Another bracket is already open on this handle
    Busy,
    /// The transport refused to start (bad address, chip select failure, ...)
    Start(E),
}

impl<E> TransactionError<E> {
    /// Check if the failure was caused by contention
    pub fn is_busy(&self) -> bool {
        matches!(self, TransactionError::Busy)
    }

    /// Map the transport error type
    pub fn map_start<F, O>(self, op: O) -> TransactionError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            TransactionError::Busy => TransactionError::Busy,
            TransactionError::Start(e) => TransactionError::Start(op(e)),
        }
    }
}
