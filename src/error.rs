use thiserror::Error;

/// Errors from the image-to-track pipeline.
///
/// Every stage failure aborts the whole conversion with no partial result;
/// the variant identifies the failing stage and, where it helps, carries a
/// remediation hint. The core never retries internally — rerunning with a
/// different configuration is the caller's call.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("invalid input image: {reason}")]
    InputValidation { reason: String },

    #[error(
        "path tracing produced only {points} points (need at least 8); \
         adjust threshold or invert"
    )]
    TraceFailed { points: usize },

    #[error(
        "quantized grid has only {cells} cells (need at least 24); \
         increase target length or image detail"
    )]
    GridTooShort { cells: usize },

    #[error("no share-code codec bound; call TrackConverter::bind_codec first")]
    EncoderUnbound,

    #[error("share code decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("invariant violated: {what}")]
    InvariantViolation { what: String },
}

/// Errors from decoding an untrusted share code.
///
/// Decode is also used defensively to validate user-supplied strings, so it
/// must always return one of these rather than panic.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing \"PolyTrack1\" prefix")]
    BadPrefix,

    #[error("character {ch:?} at position {pos} is not in the share-code alphabet")]
    BadSymbol { ch: char, pos: usize },

    #[error("bitstream truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("inflate failed: {0}")]
    Inflate(String),

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_remediation_hints() {
        let msg = format!("{}", ConvertError::TraceFailed { points: 3 });
        assert!(msg.contains("adjust threshold or invert"), "got: {msg}");

        let msg = format!("{}", ConvertError::GridTooShort { cells: 10 });
        assert!(msg.contains("at least 24"), "got: {msg}");
    }

    #[test]
    fn decode_error_converts_into_convert_error() {
        let err: ConvertError = DecodeError::BadPrefix.into();
        assert!(matches!(err, ConvertError::Decode(DecodeError::BadPrefix)));
    }
}
