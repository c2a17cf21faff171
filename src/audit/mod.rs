//! Audit module
//!
//! Hash chain verification for an aggregate's event log. Each stored
//! own_hash is recomputed from the payload and the predecessor's digest;
//! the first mismatch marks where tampering or corruption begins.

mod merkle;

pub use merkle::merkle_root;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateRecord;
use crate::cancel::CancelToken;
use crate::domain::{chain_hash, Digest};
use crate::error::{StoreError, StoreResult};
use crate::event_store::{EventLog, EventQuery};

// =========================================================================
// VerificationReport
// =========================================================================

/// Outcome of a chain walk. A broken chain is data, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub valid: bool,
    pub first_break_sequence: Option<u64>,
    pub events_checked: u64,
    pub expected_hash: Option<Digest>,
    pub actual_hash: Option<Digest>,
    /// Present only for a valid chain
    pub merkle_root: Option<Digest>,
}

impl VerificationReport {
    fn valid(events_checked: u64, leaves: &[Digest]) -> Self {
        Self {
            valid: true,
            first_break_sequence: None,
            events_checked,
            expected_hash: None,
            actual_hash: None,
            merkle_root: Some(merkle_root(leaves)),
        }
    }

    fn broken(
        sequence: u64,
        events_checked: u64,
        expected_hash: Option<Digest>,
        actual_hash: Option<Digest>,
    ) -> Self {
        Self {
            valid: false,
            first_break_sequence: Some(sequence),
            events_checked,
            expected_hash,
            actual_hash,
            merkle_root: None,
        }
    }

    /// Turn a broken report into `StoreError::Integrity` for callers that
    /// must not proceed on a damaged chain
    pub fn into_result(self) -> StoreResult<Self> {
        match self.first_break_sequence {
            Some(first_break_sequence) if !self.valid => {
                Err(StoreError::Integrity { first_break_sequence })
            }
            _ => Ok(self),
        }
    }
}

// =========================================================================
// Verifier
// =========================================================================

#[derive(Debug, Clone)]
pub struct Verifier {
    log: EventLog,
}

impl Verifier {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }

    /// Walk the chain up to the record's current version.
    ///
    /// Breaks are: a sequence gap or duplicate, a prior_hash that does not
    /// link to the predecessor, a recomputed own_hash that differs from the
    /// stored one, and a last digest that differs from the record's head.
    pub fn verify(
        &self,
        record: &AggregateRecord,
        cancel: Option<CancelToken>,
    ) -> StoreResult<VerificationReport> {
        let key = record.key();
        let current_version = record.current_version;

        let mut previous = Digest::GENESIS;
        let mut leaves = Vec::with_capacity(current_version.min(4096) as usize);
        let mut checked = 0u64;

        let stream = self
            .log
            .stream(&key, &EventQuery::default(), current_version, cancel);

        for event in stream {
            let event = event?;
            let expected_sequence = checked + 1;

            if event.sequence_number != expected_sequence {
                return Ok(self.report_break(
                    record,
                    VerificationReport::broken(expected_sequence, checked, None, None),
                ));
            }

            if event.prior_hash != previous {
                return Ok(self.report_break(
                    record,
                    VerificationReport::broken(
                        expected_sequence,
                        checked,
                        Some(previous),
                        Some(event.prior_hash),
                    ),
                ));
            }

            let recomputed = chain_hash(&previous, &event.payload, event.sequence_number);
            if recomputed != event.own_hash {
                return Ok(self.report_break(
                    record,
                    VerificationReport::broken(
                        expected_sequence,
                        checked,
                        Some(recomputed),
                        Some(event.own_hash),
                    ),
                ));
            }

            previous = event.own_hash;
            leaves.push(event.own_hash);
            checked += 1;
        }

        // Truncated log: fewer events than the index claims
        if checked < current_version {
            return Ok(self.report_break(
                record,
                VerificationReport::broken(checked + 1, checked, None, None),
            ));
        }

        if current_version > 0 && previous != record.head_hash {
            return Ok(self.report_break(
                record,
                VerificationReport::broken(
                    current_version,
                    checked,
                    Some(record.head_hash),
                    Some(previous),
                ),
            ));
        }

        tracing::debug!(aggregate = %key, events_checked = checked, "Hash chain verified");
        Ok(VerificationReport::valid(checked, &leaves))
    }

    fn report_break(&self, record: &AggregateRecord, report: VerificationReport) -> VerificationReport {
        tracing::warn!(
            aggregate = %record.key(),
            first_break_sequence = report.first_break_sequence,
            events_checked = report.events_checked,
            "Hash chain verification failed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, NewEvent};
    use crate::event_store::{EventStorage, InMemoryStorage};
    use serde_json::json;
    use std::sync::Arc;

    fn chain(count: u64) -> (Verifier, AggregateRecord) {
        let storage: Arc<dyn EventStorage> = Arc::new(InMemoryStorage::new());
        let log = EventLog::new(storage, 4);
        let key = crate::domain::AggregateKey::new("order", "A1").unwrap();

        let mut record: Option<AggregateRecord> = None;
        for n in 1..=count {
            let kind = if n == 1 { EventKind::Create } else { EventKind::Append };
            let event = log
                .append(&key, NewEvent::new("Changed", kind, json!({ "n": n })).unwrap())
                .unwrap();
            record = Some(match record {
                Some(mut r) => {
                    r.advance(&event);
                    r
                }
                None => AggregateRecord::from_first_event(&event),
            });
        }
        (Verifier::new(log), record.unwrap())
    }

    #[test]
    fn test_valid_chain() {
        let (verifier, record) = chain(10);
        let report = verifier.verify(&record, None).unwrap();
        assert!(report.valid);
        assert_eq!(report.events_checked, 10);
        assert!(report.first_break_sequence.is_none());
        assert!(report.merkle_root.is_some());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_head_mismatch_is_break() {
        let (verifier, mut record) = chain(3);
        record.head_hash = Digest::GENESIS;

        let report = verifier.verify(&record, None).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_break_sequence, Some(3));
        assert!(matches!(
            report.into_result(),
            Err(StoreError::Integrity { first_break_sequence: 3 })
        ));
    }

    #[test]
    fn test_truncated_log_is_break() {
        let (verifier, mut record) = chain(3);
        record.current_version = 5;

        let report = verifier.verify(&record, None).unwrap();
        assert_eq!(report.first_break_sequence, Some(4));
        assert_eq!(report.events_checked, 3);
    }

    #[test]
    fn test_cancelled_verification() {
        let (verifier, record) = chain(10);
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            verifier.verify(&record, Some(token)),
            Err(StoreError::Cancelled)
        ));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let (verifier, record) = chain(1);
        let value = serde_json::to_value(verifier.verify(&record, None).unwrap()).unwrap();
        assert_eq!(value["valid"], json!(true));
        assert_eq!(value["eventsChecked"], json!(1));
        assert!(value["merkleRoot"].is_string());
        assert!(value["firstBreakSequence"].is_null());
    }
}
