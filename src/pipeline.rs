// src/pipeline.rs
// Per-endpoint composition of the guard stages: rate limit, CSRF verify,
// validate, (contact only) spam heuristic, sanitize. The HTTP layer maps
// an Outcome onto status codes and headers; nothing here writes responses.

use std::collections::BTreeMap;

use serde_json::Value;
use time::{Date, OffsetDateTime};

use crate::config::Endpoint;
use crate::csrf::{CsrfGuard, CsrfRejection, IssuedToken};
use crate::rate::{self, RateDecision};
use crate::sanitize::{self, SanitizeKind, SanitizeRule};
use crate::spam::{self, SpamReport};
use crate::store::KeyValueStore;
use crate::validate::{self, FieldKind, FieldOptions, FieldSpec, MAX_BOOKING_DAYS};

/// Routing hint attached to accepted submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

/// Final verdict for one submission. `SpamAccepted` must be rendered to
/// the submitter exactly like `Accepted`; only the server-side ticket
/// prefix and the retained report differ.
#[derive(Debug)]
pub enum Outcome {
    Accepted {
        payload: BTreeMap<String, String>,
        ticket: Option<String>,
        priority: Priority,
        csrf: IssuedToken,
    },
    SpamAccepted {
        ticket: String,
        report: SpamReport,
        csrf: IssuedToken,
    },
    Invalid {
        errors: BTreeMap<String, String>,
    },
    RateLimited(RateDecision),
    CsrfRejected(CsrfRejection),
}

/// Everything the HTTP layer hands over for one request.
pub struct Submission<'a> {
    pub body: &'a Value,
    pub client_key: &'a str,
    pub cookie_token: Option<&'a str>,
    pub submitted_token: Option<&'a str>,
}

const BASE: FieldOptions = FieldOptions {
    field_name: "field",
    required: true,
    min_length: None,
    max_length: None,
    not_past: false,
    not_future: false,
    max_days: None,
    max_urls: 2,
};

static CONTACT_SCHEMA: [FieldSpec; 5] = [
    FieldSpec {
        field: "name",
        kind: FieldKind::Name,
        options: FieldOptions {
            field_name: "name",
            min_length: Some(3),
            max_length: Some(50),
            ..BASE
        },
    },
    FieldSpec {
        field: "email",
        kind: FieldKind::Email,
        options: FieldOptions {
            field_name: "email",
            ..BASE
        },
    },
    FieldSpec {
        field: "phone",
        kind: FieldKind::Phone,
        options: FieldOptions {
            field_name: "phone",
            required: false,
            ..BASE
        },
    },
    FieldSpec {
        field: "subject",
        kind: FieldKind::Message,
        options: FieldOptions {
            field_name: "subject",
            required: false,
            min_length: Some(3),
            max_length: Some(200),
            ..BASE
        },
    },
    FieldSpec {
        field: "message",
        kind: FieldKind::Message,
        options: FieldOptions {
            field_name: "message",
            ..BASE
        },
    },
];

static CONTACT_SANITIZE: [SanitizeRule; 5] = [
    SanitizeRule {
        field: "name",
        kind: SanitizeKind::Name,
        max_length: None,
    },
    SanitizeRule {
        field: "email",
        kind: SanitizeKind::Email,
        max_length: None,
    },
    SanitizeRule {
        field: "phone",
        kind: SanitizeKind::Phone,
        max_length: None,
    },
    SanitizeRule {
        field: "subject",
        kind: SanitizeKind::Text,
        max_length: Some(200),
    },
    SanitizeRule {
        field: "message",
        kind: SanitizeKind::Text,
        max_length: Some(2_000),
    },
];

static APPOINTMENT_SCHEMA: [FieldSpec; 8] = [
    FieldSpec {
        field: "patientInfo.firstName",
        kind: FieldKind::Name,
        options: FieldOptions {
            field_name: "first name",
            ..BASE
        },
    },
    FieldSpec {
        field: "patientInfo.lastName",
        kind: FieldKind::Name,
        options: FieldOptions {
            field_name: "last name",
            ..BASE
        },
    },
    FieldSpec {
        field: "patientInfo.email",
        kind: FieldKind::Email,
        options: FieldOptions {
            field_name: "email",
            ..BASE
        },
    },
    FieldSpec {
        field: "patientInfo.phone",
        kind: FieldKind::Phone,
        options: FieldOptions {
            field_name: "phone",
            ..BASE
        },
    },
    FieldSpec {
        field: "appointmentType",
        kind: FieldKind::AppointmentType,
        options: FieldOptions {
            field_name: "appointment type",
            ..BASE
        },
    },
    FieldSpec {
        field: "preferredDate",
        kind: FieldKind::Date,
        options: FieldOptions {
            field_name: "preferred date",
            not_past: true,
            max_days: Some(MAX_BOOKING_DAYS),
            ..BASE
        },
    },
    FieldSpec {
        field: "preferredTime",
        kind: FieldKind::Time,
        options: FieldOptions {
            field_name: "preferred time",
            ..BASE
        },
    },
    FieldSpec {
        field: "notes",
        kind: FieldKind::Message,
        options: FieldOptions {
            field_name: "notes",
            required: false,
            min_length: Some(1),
            max_length: Some(1_000),
            ..BASE
        },
    },
];

static APPOINTMENT_SANITIZE: [SanitizeRule; 8] = [
    SanitizeRule {
        field: "patientInfo.firstName",
        kind: SanitizeKind::Name,
        max_length: None,
    },
    SanitizeRule {
        field: "patientInfo.lastName",
        kind: SanitizeKind::Name,
        max_length: None,
    },
    SanitizeRule {
        field: "patientInfo.email",
        kind: SanitizeKind::Email,
        max_length: None,
    },
    SanitizeRule {
        field: "patientInfo.phone",
        kind: SanitizeKind::Phone,
        max_length: None,
    },
    SanitizeRule {
        field: "appointmentType",
        kind: SanitizeKind::Text,
        max_length: Some(50),
    },
    SanitizeRule {
        field: "preferredDate",
        kind: SanitizeKind::Text,
        max_length: Some(10),
    },
    SanitizeRule {
        field: "preferredTime",
        kind: SanitizeKind::Text,
        max_length: Some(5),
    },
    SanitizeRule {
        field: "notes",
        kind: SanitizeKind::Text,
        max_length: Some(1_000),
    },
];

/// Flatten a JSON object into dot-path keys. Scalars are stringified;
/// arrays and nulls are opaque to form schemas and stay out of the map.
pub fn flatten_json(value: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, nested, out);
            }
        }
        Value::String(text) => {
            out.insert(prefix.to_string(), text.clone());
        }
        Value::Number(_) | Value::Bool(_) => {
            out.insert(prefix.to_string(), value.to_string());
        }
        Value::Null | Value::Array(_) => {}
    }
}

/// `prefix` + the trailing 8 digits of the millisecond clock.
fn ticket_id(prefix: &str, now_ms: u64) -> String {
    let digits = now_ms.to_string();
    let start = digits.len().saturating_sub(8);
    format!("{}{}", prefix, &digits[start..])
}

fn priority_of(fields: &BTreeMap<String, String>) -> Priority {
    let urgent = fields.get("urgency").map(String::as_str) == Some("urgent")
        || fields.get("formType").map(String::as_str) == Some("emergency")
        || fields.get("appointmentType").map(String::as_str) == Some("emergency");
    if urgent {
        Priority::High
    } else {
        Priority::Normal
    }
}

/// Rate limit and CSRF, in that order. Returns the rotated token on
/// success so the caller can forward its cookie.
fn guard_request<S: KeyValueStore>(
    store: &S,
    guard: &CsrfGuard,
    sub: &Submission,
    endpoint: Endpoint,
    now_ms: u64,
) -> Result<IssuedToken, Outcome> {
    let policy = endpoint.policy();
    let decision = rate::admit_at(
        store,
        sub.client_key,
        &policy,
        now_ms,
        crate::config::fail_open(),
    );
    if !decision.allowed {
        return Err(Outcome::RateLimited(decision));
    }
    guard
        .verify_at(sub.cookie_token, sub.submitted_token, now_ms)
        .map_err(Outcome::CsrfRejected)
}

pub fn submit_contact<S: KeyValueStore>(
    store: &S,
    guard: &CsrfGuard,
    sub: &Submission,
) -> Outcome {
    submit_contact_at(store, guard, sub, crate::now_ms(), OffsetDateTime::now_utc().date())
}

pub fn submit_contact_at<S: KeyValueStore>(
    store: &S,
    guard: &CsrfGuard,
    sub: &Submission,
    now_ms: u64,
    today: Date,
) -> Outcome {
    let csrf = match guard_request(store, guard, sub, Endpoint::Contact, now_ms) {
        Ok(csrf) => csrf,
        Err(outcome) => return outcome,
    };
    let fields = flatten_json(sub.body);
    let report = validate::validate_form_at(&fields, &CONTACT_SCHEMA, today);
    if !report.valid {
        return Outcome::Invalid {
            errors: report.errors,
        };
    }

    let message = report.values.get("message").cloned().unwrap_or_default();
    let email = report.values.get("email").cloned().unwrap_or_default();
    let spam_report = spam::detect_spam(&message, &email);
    if spam_report.spam {
        eprintln!(
            "[pipeline] contact submission quarantined as spam (score {})",
            spam_report.score
        );
        return Outcome::SpamAccepted {
            ticket: ticket_id("SPAM", now_ms),
            report: spam_report,
            csrf,
        };
    }

    Outcome::Accepted {
        payload: sanitize::sanitize_object(&report.values, &CONTACT_SANITIZE),
        ticket: Some(ticket_id("TKT", now_ms)),
        priority: priority_of(&fields),
        csrf,
    }
}

pub fn submit_appointment<S: KeyValueStore>(
    store: &S,
    guard: &CsrfGuard,
    sub: &Submission,
) -> Outcome {
    submit_appointment_at(store, guard, sub, crate::now_ms(), OffsetDateTime::now_utc().date())
}

pub fn submit_appointment_at<S: KeyValueStore>(
    store: &S,
    guard: &CsrfGuard,
    sub: &Submission,
    now_ms: u64,
    today: Date,
) -> Outcome {
    let csrf = match guard_request(store, guard, sub, Endpoint::Appointment, now_ms) {
        Ok(csrf) => csrf,
        Err(outcome) => return outcome,
    };
    let fields = flatten_json(sub.body);
    let report = validate::validate_form_at(&fields, &APPOINTMENT_SCHEMA, today);
    let mut errors = report.errors;

    // Insurance is only validated when the submitter claims to have it.
    let mut insurance: Option<(String, String)> = None;
    if fields.get("hasInsurance").map(String::as_str) == Some("true") {
        let provider = fields
            .get("insurance.provider")
            .map(String::as_str)
            .unwrap_or("");
        let member_id = fields
            .get("insurance.memberId")
            .map(String::as_str)
            .unwrap_or("");
        let result = validate::validate_insurance(provider, member_id);
        if result.valid {
            insurance = Some((provider.trim().to_string(), member_id.trim().to_uppercase()));
        } else {
            errors.insert("insurance".to_string(), result.errors.join("; "));
        }
    }

    if !errors.is_empty() {
        return Outcome::Invalid { errors };
    }

    let mut payload = sanitize::sanitize_object(&report.values, &APPOINTMENT_SANITIZE);
    if let Some((provider, member_id)) = insurance {
        payload.insert(
            "insurance.provider".to_string(),
            sanitize::sanitize_text(&provider, 50),
        );
        payload.insert("insurance.memberId".to_string(), member_id);
    }

    Outcome::Accepted {
        payload,
        ticket: Some(ticket_id("MDC", now_ms)),
        priority: priority_of(&fields),
        csrf,
    }
}

pub fn submit_quiz<S: KeyValueStore>(store: &S, guard: &CsrfGuard, sub: &Submission) -> Outcome {
    submit_quiz_at(store, guard, sub, crate::now_ms())
}

/// Quiz result submission: a score and a health profile rather than a form
/// schema. No ticket; the payload carries the follow-up recommendation.
pub fn submit_quiz_at<S: KeyValueStore>(
    store: &S,
    guard: &CsrfGuard,
    sub: &Submission,
    now_ms: u64,
) -> Outcome {
    let csrf = match guard_request(store, guard, sub, Endpoint::Quiz, now_ms) {
        Ok(csrf) => csrf,
        Err(outcome) => return outcome,
    };

    let score = sub.body.get("score").and_then(Value::as_i64).unwrap_or(-1);
    let profile = sub
        .body
        .get("profile")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (score, profile) = match crate::quiz::validate_quiz_submission(score, profile) {
        Ok(parsed) => parsed,
        Err(message) => {
            let mut errors = BTreeMap::new();
            errors.insert("quiz".to_string(), message.to_string());
            return Outcome::Invalid { errors };
        }
    };

    let recommendation = profile.recommendation();
    let mut payload = BTreeMap::new();
    payload.insert("score".to_string(), score.to_string());
    payload.insert("profile".to_string(), profile.id().to_string());
    payload.insert(
        "recommendation.message".to_string(),
        recommendation.message.to_string(),
    );
    payload.insert(
        "recommendation.services".to_string(),
        recommendation.services.join(","),
    );
    payload.insert(
        "recommendation.priority".to_string(),
        recommendation.priority.to_string(),
    );
    if let Some(consent) = sub.body.get("marketingConsent").and_then(Value::as_bool) {
        payload.insert("marketingConsent".to_string(), consent.to_string());
    }

    Outcome::Accepted {
        payload,
        ticket: None,
        priority: Priority::Normal,
        csrf,
    }
}
