use crate::sdo::SdoError;

/// An error that can occur when reading or writing a PDO configuration.
#[derive(Debug)]
#[derive(thiserror::Error)]
#[error("{0}")]
pub enum PdoConfigError {
	/// The PDO ordinal is not valid.
	InvalidPdoNumber(#[from] InvalidPdoNumber),

	/// An error occured when trying to access the configuration over SDO.
	SdoError(#[from] SdoError),

	/// The device does not support setting an inhibit time for this PDO.
	#[error("device does not support an inhibit time for this PDO")]
	InhibitTimeNotSupported,

	/// The device does not support setting a deadline timer for this RPDO.
	#[error("device does not support a deadline timer for this PDO")]
	DeadlineTimerNotSupported,

	/// The device does not support setting an event timer for this TPDO.
	#[error("device does not support an event timer for this PDO")]
	EventTimerNotSupported,

	/// The device does not support the `start_sync` parameter for this TPDO.
	#[error("device does not support the start_sync parameter for this PDO")]
	StartSyncNotSupported,
}

/// The PDO ordinal is not valid.
#[derive(Debug, Clone)]
#[derive(thiserror::Error)]
#[error("invalid PDO number: value must be between 0 and 511 (inclusive), but got {value}")]
pub struct InvalidPdoNumber {
	pub(super) value: u16,
}

/// The value for a cyclic-sync transmission type is invalid.
#[derive(Debug, Clone)]
#[derive(thiserror::Error)]
#[error("invalid value for synchronous cyclic transmission type: value must be between 1 and 240 (inclusive), but got {value}")]
pub struct InvalidSyncInterval {
	pub(super) value: u8,
}

impl From<crate::sdo::UploadError<std::convert::Infallible>> for PdoConfigError {
	fn from(value: crate::sdo::UploadError<std::convert::Infallible>) -> Self {
		match value {
			crate::sdo::UploadError::UploadFailed(e) => e.into(),
			crate::sdo::UploadError::ParseFailed(_) => unreachable!(),
		}
	}
}
