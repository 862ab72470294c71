use thiserror::Error;

use crate::sdo::AbortReason;

/// An error raised while reading or writing an object dictionary entry.
///
/// Every variant has a direct mapping onto an SDO [`AbortReason`], via
/// [`OdError::abort_reason`], so the SDO server can turn a failed object
/// dictionary access straight into an abort frame.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum OdError {
    #[error("index 0x{index:04X} does not exist")]
    IndexNotPresent { index: u16 },

    #[error("subindex {subindex} of index 0x{index:04X} does not exist")]
    SubindexNotPresent { index: u16, subindex: u8 },

    #[error("index 0x{index:04X}:{subindex} does not support SDO read access")]
    ReadNotSupported { index: u16, subindex: u8 },

    #[error("index 0x{index:04X}:{subindex} does not support SDO write access")]
    WriteNotSupported { index: u16, subindex: u8 },

    #[error("data too long for index 0x{index:04X}:{subindex}: expected at most {expected}, got {actual}")]
    DataTooLong { index: u16, subindex: u8, expected: usize, actual: usize },

    #[error("data too short for index 0x{index:04X}:{subindex}: expected {expected}, got {actual}")]
    DataTooShort { index: u16, subindex: u8, expected: usize, actual: usize },

    #[error("value out of range for index 0x{index:04X}:{subindex}")]
    ValueOutOfRange { index: u16, subindex: u8 },

    #[error("general object dictionary error at index 0x{index:04X}:{subindex}")]
    General { index: u16, subindex: u8 },
}

impl OdError {
    /// The SDO abort code that corresponds to this error.
    pub fn abort_reason(&self) -> AbortReason {
        match self {
            Self::IndexNotPresent { .. } => AbortReason::ObjectDoesNotExist,
            Self::SubindexNotPresent { .. } => AbortReason::SubIndexDoesNotExist,
            Self::ReadNotSupported { .. } => AbortReason::ReadFromWriteOnlyObject,
            Self::WriteNotSupported { .. } => AbortReason::WriteToReadOnlyObject,
            Self::DataTooLong { .. } => AbortReason::LengthTooHigh,
            Self::DataTooShort { .. } => AbortReason::LengthTooLow,
            Self::ValueOutOfRange { .. } => AbortReason::ObjectValueInvalid,
            Self::General { .. } => AbortReason::GeneralError,
        }
    }
}

impl From<OdError> for AbortReason {
    fn from(error: OdError) -> Self {
        error.abort_reason()
    }
}
