use std::cmp::Ordering;
use std::fmt;

use crate::error::ModelError;

/// Lifecycle status of a scan.
///
/// Codes are spaced so intermediate states can be added later without
/// renumbering. Everything at or above [`ScanStatus::ERROR_FLOOR`] is an
/// error and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    Created,
    Uploading,
    Launched,
    Cancelling,
    Cancelled,
    Processed,
    Finished,
    Flushed,
    Error,
    /// Probe list missing from the request (201).
    ProbeMissing,
    /// Requested probe(s) not available (202).
    ProbeUnavailable,
    /// Transfer to remote storage failed (210).
    UploadFailed,
    /// Any other code in the error range.
    OtherError(u16),
}

impl ScanStatus {
    pub const ERROR_FLOOR: u16 = 200;

    pub const fn code(self) -> u16 {
        match self {
            ScanStatus::Created => 0,
            ScanStatus::Uploading => 5,
            ScanStatus::Launched => 10,
            ScanStatus::Cancelling => 20,
            ScanStatus::Cancelled => 21,
            ScanStatus::Processed => 30,
            ScanStatus::Finished => 50,
            ScanStatus::Flushed => 100,
            ScanStatus::Error => 200,
            ScanStatus::ProbeMissing => 201,
            ScanStatus::ProbeUnavailable => 202,
            ScanStatus::UploadFailed => 210,
            ScanStatus::OtherError(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Result<Self, ModelError> {
        let status = match code {
            0 => ScanStatus::Created,
            5 => ScanStatus::Uploading,
            10 => ScanStatus::Launched,
            20 => ScanStatus::Cancelling,
            21 => ScanStatus::Cancelled,
            30 => ScanStatus::Processed,
            50 => ScanStatus::Finished,
            100 => ScanStatus::Flushed,
            200 => ScanStatus::Error,
            201 => ScanStatus::ProbeMissing,
            202 => ScanStatus::ProbeUnavailable,
            210 => ScanStatus::UploadFailed,
            other if other >= Self::ERROR_FLOOR => ScanStatus::OtherError(other),
            other => return Err(ModelError::UnknownStatus(other)),
        };
        Ok(status)
    }

    pub fn label(self) -> &'static str {
        match self {
            ScanStatus::Created => "created",
            ScanStatus::Uploading => "uploading",
            ScanStatus::Launched => "launched",
            ScanStatus::Cancelling => "cancelling",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Processed => "processed",
            ScanStatus::Finished => "finished",
            ScanStatus::Flushed => "flushed",
            ScanStatus::Error | ScanStatus::OtherError(_) => "error",
            ScanStatus::ProbeMissing => "probelist missing",
            ScanStatus::ProbeUnavailable => "probe(s) not available",
            ScanStatus::UploadFailed => "ftp upload error",
        }
    }

    pub const fn is_error(self) -> bool {
        self.code() >= Self::ERROR_FLOOR
    }

    /// Probe error sub-range 201..=209.
    pub const fn is_probe_error(self) -> bool {
        let code = self.code();
        code > Self::ERROR_FLOOR && code < 210
    }

    /// Transfer error sub-range 210..=219.
    pub const fn is_transfer_error(self) -> bool {
        let code = self.code();
        code >= 210 && code < 220
    }

    /// States with no outgoing edge other than into the error range.
    pub fn is_terminal(self) -> bool {
        self.is_error() || matches!(self, ScanStatus::Cancelled | ScanStatus::Flushed)
    }

    /// Directed edges of the scan lifecycle.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        if self.is_error() {
            return false;
        }
        if next.is_error() {
            return true;
        }
        matches!(
            (self, next),
            (ScanStatus::Created, ScanStatus::Uploading)
                | (ScanStatus::Uploading, ScanStatus::Launched)
                | (ScanStatus::Launched, ScanStatus::Cancelling)
                | (ScanStatus::Launched, ScanStatus::Processed)
                | (ScanStatus::Cancelling, ScanStatus::Cancelled)
                | (ScanStatus::Processed, ScanStatus::Finished)
                | (ScanStatus::Finished, ScanStatus::Flushed)
        )
    }
}

impl PartialOrd for ScanStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScanStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code().cmp(&other.code())
    }
}

impl TryFrom<u16> for ScanStatus {
    type Error = ModelError;

    fn try_from(code: u16) -> Result<Self, ModelError> {
        ScanStatus::from_code(code)
    }
}

impl From<ScanStatus> for u16 {
    fn from(status: ScanStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ScanStatus {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ScanStatus {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let code = <u16 as serde::Deserialize>::deserialize(deserializer)?;
        ScanStatus::from_code(code).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_ordered_with_gaps() {
        assert!(ScanStatus::Created < ScanStatus::Uploading);
        assert!(ScanStatus::Uploading < ScanStatus::Launched);
        assert!(ScanStatus::Cancelled < ScanStatus::Processed);
        assert!(ScanStatus::Flushed < ScanStatus::Error);
        assert_eq!(ScanStatus::Cancelled.code(), 21);
    }

    #[test]
    fn every_code_from_200_is_an_error() {
        assert!(!ScanStatus::Flushed.is_error());
        assert!(ScanStatus::Error.is_error());
        assert!(ScanStatus::from_code(217).unwrap().is_error());
        assert!(ScanStatus::ProbeMissing.is_probe_error());
        assert!(!ScanStatus::Error.is_probe_error());
        assert!(ScanStatus::UploadFailed.is_transfer_error());
        assert!(ScanStatus::from_code(219).unwrap().is_transfer_error());
    }

    #[test]
    fn unknown_codes_below_error_floor_are_rejected() {
        assert_eq!(
            ScanStatus::from_code(7),
            Err(ModelError::UnknownStatus(7))
        );
        assert_eq!(ScanStatus::from_code(202), Ok(ScanStatus::ProbeUnavailable));
    }

    #[test]
    fn converts_to_and_from_wire_codes() {
        assert_eq!(ScanStatus::try_from(10u16), Ok(ScanStatus::Launched));
        assert_eq!(ScanStatus::try_from(200u16), Ok(ScanStatus::Error));
        assert_eq!(
            ScanStatus::try_from(7u16),
            Err(ModelError::UnknownStatus(7))
        );
        assert_eq!(u16::from(ScanStatus::Cancelled), 21);
    }

    #[test]
    fn lifecycle_edges_only_move_forward() {
        use ScanStatus::*;
        assert!(Launched.can_transition_to(Cancelling));
        assert!(Launched.can_transition_to(Processed));
        assert!(Cancelling.can_transition_to(Cancelled));
        assert!(Processed.can_transition_to(Finished));
        assert!(Finished.can_transition_to(Flushed));

        assert!(!Launched.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Launched));
        assert!(!Processed.can_transition_to(Launched));
        assert!(!Created.can_transition_to(Launched));
    }

    #[test]
    fn error_states_are_terminal() {
        assert!(ScanStatus::Launched.can_transition_to(ScanStatus::ProbeUnavailable));
        assert!(!ScanStatus::Error.can_transition_to(ScanStatus::Launched));
        assert!(!ScanStatus::Error.can_transition_to(ScanStatus::UploadFailed));
        assert!(ScanStatus::UploadFailed.is_terminal());
    }

    #[test]
    fn labels_match_wire_vocabulary() {
        assert_eq!(ScanStatus::ProbeMissing.label(), "probelist missing");
        assert_eq!(ScanStatus::UploadFailed.to_string(), "ftp upload error");
    }
}
