//! # Record Envelope
//!
//! Every stored value is framed as:
//!
//! ```text
//! +--------+---------+------------------+
//! | "ACPT" | version | postcard payload |
//! | 4 B    | 1 B     | variable         |
//! +--------+---------+------------------+
//! ```
//!
//! Unknown versions are refused rather than guessed at.

use crate::error::{AcceptanceError, AcceptanceResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Leading magic bytes of every record.
pub const RECORD_MAGIC: [u8; 4] = *b"ACPT";

/// Current record format version.
pub const RECORD_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = RECORD_MAGIC.len() + 1;

/// Encode a record with its envelope header.
pub fn encode_record<T: Serialize>(record: &T) -> AcceptanceResult<Vec<u8>> {
    let body = postcard::to_allocvec(record)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&RECORD_MAGIC);
    out.push(RECORD_FORMAT_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a record, validating the envelope header.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> AcceptanceResult<T> {
    if bytes.len() < HEADER_LEN {
        return Err(AcceptanceError::Format(format!(
            "record too short: {} bytes",
            bytes.len()
        )));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if header[..RECORD_MAGIC.len()] != RECORD_MAGIC {
        return Err(AcceptanceError::Format("bad record magic".to_string()));
    }
    let version = header[RECORD_MAGIC.len()];
    if version != RECORD_FORMAT_VERSION {
        return Err(AcceptanceError::Format(format!(
            "unsupported record format version {}",
            version
        )));
    }
    Ok(postcard::from_bytes(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::ClientRiskAssessment;
    use crate::types::EngagementId;

    #[test]
    fn envelope_starts_with_magic_and_version() {
        let assessment = ClientRiskAssessment::new(EngagementId::new("e"));
        let bytes = encode_record(&assessment).unwrap_or_default();
        assert_eq!(&bytes[..4], b"ACPT");
        assert_eq!(bytes[4], RECORD_FORMAT_VERSION);

        let decoded: AcceptanceResult<ClientRiskAssessment> = decode_record(&bytes);
        assert_eq!(decoded, Ok(assessment));
    }

    #[test]
    fn rejects_truncated_and_foreign_bytes() {
        assert!(decode_record::<ClientRiskAssessment>(b"AC").is_err());
        assert!(decode_record::<ClientRiskAssessment>(b"XXXX\x01\x00").is_err());
    }

    #[test]
    fn rejects_future_versions() {
        let assessment = ClientRiskAssessment::new(EngagementId::new("e"));
        let mut bytes = encode_record(&assessment).unwrap_or_default();
        bytes[4] = RECORD_FORMAT_VERSION + 1;
        assert!(matches!(
            decode_record::<ClientRiskAssessment>(&bytes),
            Err(AcceptanceError::Format(_))
        ));
    }
}
