/// Verifier response enriched with local revocation status
use crate::{error::VerifyLogResult, revocation::RevocationStatus};
use serde::Serialize;
use serde_json::{Map, Value};

/// Verification result as recorded in the event log
///
/// Known fields are lifted out of the verifier response when they have the
/// expected type; everything else is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Value>,
    /// "revoked" or "good"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerificationOutcome {
    pub fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };

        let verified = take_if(&mut fields, "verified", Value::is_boolean).and_then(|v| v.as_bool());
        let revoked = take_if(&mut fields, "revoked", Value::is_boolean).and_then(|v| v.as_bool());
        let status = take_string(&mut fields, "status");
        let message = take_string(&mut fields, "message");
        let checked_at = take_string(&mut fields, "checkedAt");
        let revocation_status = take_string(&mut fields, "revocationStatus");
        let revocation_reason = take_string(&mut fields, "revocationReason");
        let issuer = take_if(&mut fields, "issuer", |v| !v.is_null());
        let subject = take_if(&mut fields, "subject", |v| !v.is_null());
        let credential = take_if(&mut fields, "credential", Value::is_object);

        Self {
            verified,
            revoked,
            status,
            message,
            checked_at,
            issuer,
            subject,
            credential,
            revocation_status,
            revocation_reason,
            extra: fields,
        }
    }

    /// Credential identifier used for revocation lookups
    ///
    /// `credential.id`, then `credential.credentialSubject.id`, then a string
    /// `subject`.
    pub fn credential_id(&self) -> Option<String> {
        let from_credential = self.credential.as_ref().and_then(|credential| {
            ["/id", "/credentialSubject/id"]
                .iter()
                .filter_map(|path| credential.pointer(path))
                .filter_map(Value::as_str)
                .find(|id| !id.is_empty())
        });

        from_credential
            .or_else(|| self.subject.as_ref().and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    pub fn apply_revocation(&mut self, status: &RevocationStatus) {
        self.extra.remove("revocationStatus");
        self.extra.remove("revocationReason");
        self.revocation_status = Some(status.label().to_string());
        self.revocation_reason = match status {
            RevocationStatus::Revoked { reason } => reason.clone(),
            RevocationStatus::NotKnownRevoked => None,
        };
    }

    /// Revoked according to the local snapshot or the verifier itself
    pub fn is_revoked(&self) -> bool {
        self.revocation_status.as_deref() == Some("revoked") || self.revoked == Some(true)
    }

    /// Verifier reported success and the credential is not known to be revoked
    pub fn is_verified(&self) -> bool {
        let success = self.verified == Some(true) || self.status.as_deref() == Some("success");
        success && !self.is_revoked()
    }

    /// Issuer for display: a string, or the `id`/`name` of an issuer object
    pub fn issuer_label(&self) -> Option<String> {
        match self.issuer.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("id")
                .or_else(|| obj.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    pub fn to_value(&self) -> VerifyLogResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn take_if(fields: &mut Map<String, Value>, key: &str, accept: impl Fn(&Value) -> bool) -> Option<Value> {
    if fields.get(key).is_some_and(|v| accept(v)) {
        fields.remove(key)
    } else {
        None
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    take_if(fields, key, Value::is_string).and_then(|v| v.as_str().map(str::to_string))
}
