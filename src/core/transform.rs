use crate::domain::model::{ClaimRecord, PayorLookup, TransformedClaim};
use crate::utils::error::{Result, SyncError};

pub const CLAIM_ID_FIELD: &str = "ClaimID";

const DATE_FIELDS: [(&str, &str); 4] = [
    ("DOS__c", "StatementCoversFromDate"),
    ("DOS_End__c", "StatementCoversToDate"),
    ("Claim_Submitted_Date__c", "ClaimDateEntered"),
    ("Paid_Date__c", "PaymentReceived"),
];

const DECIMAL_FIELDS: [(&str, &str); 3] = [
    ("Charged_Amount__c", "ClaimTotalAmount"),
    ("Paid_Amount__c", "ClaimAmountPaid"),
    ("Total_BDP__c", "ClaimBalance"),
];

const STRING_FIELDS: [(&str, &str); 4] = [
    ("EFT_or_Paper_Check__c", "PaymentCheck"),
    ("Insurance_Authorization_Number__c", "PrimaryAuth"),
    ("Payer__c", "PayerID"),
    ("MR_Number__c", "PatientReference"),
];

/// Maps CollaborateMD report rows onto the Salesforce claim object.
/// Holds the payor lookup for one run.
#[derive(Debug, Clone, Default)]
pub struct ClaimTransformer {
    payors: PayorLookup,
    external_id_field: String,
}

impl ClaimTransformer {
    pub fn new(payors: PayorLookup, external_id_field: impl Into<String>) -> Self {
        Self {
            payors,
            external_id_field: external_id_field.into(),
        }
    }

    /// Transforms every record, dropping (and logging) the ones that fail.
    pub fn transform_claims(&self, claims: &[ClaimRecord]) -> Vec<TransformedClaim> {
        tracing::info!("Transforming {} claims", claims.len());

        let transformed: Vec<TransformedClaim> = claims
            .iter()
            .enumerate()
            .filter_map(|(index, claim)| match self.transform_claim(claim) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping claim at position {}: {}", index, e);
                    None
                }
            })
            .collect();

        tracing::info!(
            "Successfully transformed {}/{} claims",
            transformed.len(),
            claims.len()
        );
        transformed
    }

    pub fn transform_claim(&self, claim: &ClaimRecord) -> Result<TransformedClaim> {
        let claim_id = claim
            .get_string(CLAIM_ID_FIELD)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::ProcessingError {
                message: format!("Claim missing {}", CLAIM_ID_FIELD),
            })?;

        let mut record = TransformedClaim::default();
        record.set(&self.external_id_field, claim_id.as_str());
        record.set(
            "Name",
            claim.get_string("PateintNameID").unwrap_or_else(|| claim_id.clone()),
        );

        for (target, source) in DATE_FIELDS {
            record.set_opt(target, claim.get_date(source));
        }
        for (target, source) in DECIMAL_FIELDS {
            record.set_opt(target, claim.get_decimal(source));
        }
        for (target, source) in STRING_FIELDS {
            record.set_opt(target, claim.get_string(source));
        }

        let paid = if claim.has_value("PaymentReceived") { "Yes" } else { "No" };
        record.set("Paid_Y_or_N__c", paid);

        if let Some(payor_name) = claim.get_string("ClaimPrimaryPayerName") {
            let payer_id = claim.get_string("PayerID");
            match self.payors.resolve(&payor_name, payer_id.as_deref()) {
                Some(payor) => record.set("Claim_Payor__c", payor),
                None => tracing::debug!(
                    "No payor match for '{}' on claim {}",
                    payor_name,
                    claim_id
                ),
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn transformer() -> ClaimTransformer {
        let payors = PayorLookup::new(HashMap::from([
            ("Acme (ID1)".to_string(), "sfid1".to_string()),
            ("Acme".to_string(), "sfid2".to_string()),
        ]));
        ClaimTransformer::new(payors, "Claim_Number__c")
    }

    fn record(value: serde_json::Value) -> ClaimRecord {
        ClaimRecord::from_value(value)
    }

    #[test]
    fn test_full_record_mapping() {
        let claim = record(json!({
            "ClaimID": "CLM-1",
            "PateintNameID": "Doe, Jane",
            "StatementCoversFromDate": "01/15/2024",
            "StatementCoversToDate": "2024-01-16",
            "ClaimDateEntered": "2024-01-20T08:15:00Z",
            "PaymentReceived": "02/01/2024",
            "ClaimTotalAmount": "123.45",
            "ClaimAmountPaid": 100,
            "ClaimBalance": "",
            "PaymentCheck": "EFT",
            "PrimaryAuth": 998877,
            "PayerID": "ID1",
            "PatientReference": "MR-5",
            "ClaimPrimaryPayerName": "Acme",
            "Unmapped": "ignored"
        }));

        let out = transformer().transform_claim(&claim).unwrap();

        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "Claim_Number__c": "CLM-1",
                "Name": "Doe, Jane",
                "DOS__c": "2024-01-15",
                "DOS_End__c": "2024-01-16",
                "Claim_Submitted_Date__c": "2024-01-20",
                "Paid_Date__c": "2024-02-01",
                "Charged_Amount__c": 123.45,
                "Paid_Amount__c": 100.0,
                "EFT_or_Paper_Check__c": "EFT",
                "Insurance_Authorization_Number__c": "998877",
                "Payer__c": "ID1",
                "MR_Number__c": "MR-5",
                "Paid_Y_or_N__c": "Yes",
                "Claim_Payor__c": "sfid1"
            })
        );
    }

    #[test]
    fn test_minimal_record_omits_absent_fields() {
        let claim = record(json!({"ClaimID": 42, "ClaimTotalAmount": "abc"}));
        let out = transformer().transform_claim(&claim).unwrap();

        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "Claim_Number__c": "42",
                "Name": "42",
                "Paid_Y_or_N__c": "No"
            })
        );
    }

    #[test]
    fn test_payor_falls_back_to_bare_name() {
        let claim = record(json!({
            "ClaimID": "C",
            "ClaimPrimaryPayerName": "Acme",
            "PayerID": "OTHER"
        }));
        let out = transformer().transform_claim(&claim).unwrap();
        assert_eq!(out.get_str("Claim_Payor__c"), Some("sfid2"));

        let unknown = record(json!({"ClaimID": "C", "ClaimPrimaryPayerName": "Nobody"}));
        let out = transformer().transform_claim(&unknown).unwrap();
        assert_eq!(out.get_str("Claim_Payor__c"), None);
    }

    #[test]
    fn test_unrecognized_date_is_dropped() {
        let claim = record(json!({"ClaimID": "C", "StatementCoversFromDate": "garbage"}));
        let out = transformer().transform_claim(&claim).unwrap();
        assert_eq!(out.get_str("DOS__c"), None);
    }

    #[test]
    fn test_batch_drops_invalid_records() {
        let claims = vec![
            record(json!({"ClaimID": "A"})),
            record(json!({"PateintNameID": "no id"})),
            record(json!({"ClaimID": "   "})),
            record(json!(["not", "an", "object"])),
            record(json!({"ClaimID": "B"})),
        ];

        let out = transformer().transform_claims(&claims);

        assert_eq!(out.len(), 2);
        assert!(out.len() <= claims.len());
        assert_eq!(out[0].get_str("Claim_Number__c"), Some("A"));
        assert_eq!(out[1].get_str("Claim_Number__c"), Some("B"));
    }

    #[test]
    fn test_missing_id_is_processing_error() {
        let err = transformer()
            .transform_claim(&record(json!({})))
            .unwrap_err();
        assert!(matches!(err, SyncError::ProcessingError { .. }));
    }
}
