// src/validate.rs
// Field validation: accept/reject decisions with user-facing messages.
// Validators never mutate beyond trim/case normalization; destructive
// cleanup belongs to the sanitizer.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, Duration, Month, OffsetDateTime};

/// Furthest-out date, in days, an appointment may be booked for.
pub const MAX_BOOKING_DAYS: i64 = 180;

/// First bookable hour of the day.
pub const BUSINESS_OPEN_HOUR: u8 = 8;
/// Last bookable slot is exactly on the hour: 17:00 is valid, 17:01 is not.
pub const BUSINESS_CLOSE_HOUR: u8 = 17;

// Labeled-domain form: every label 1..=63 chars, no leading/trailing
// hyphen, and at least one dot so bare hostnames are rejected.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .unwrap()
});
static MEMBER_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9-]{5,20}$").unwrap());
static ALPHANUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9 ]+$").unwrap());
static URL_IN_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://").unwrap());

/// Addresses that signal a throwaway or placeholder submitter.
const THROWAWAY_EMAILS: [&str; 3] = ["test@test.com", "test@example.com", "spam@spam.com"];

/// Appointment types the scheduling backend understands.
pub const APPOINTMENT_TYPES: [&str; 11] = [
    "general-checkup",
    "cleaning",
    "filling",
    "crown",
    "root-canal",
    "extraction",
    "whitening",
    "orthodontics",
    "emergency",
    "consultation",
    "other",
];

/// Outcome of validating one field. `value` carries the normalized form on
/// success; `errors` carries every failure for multi-check validators while
/// `error` keeps the first one for single-message call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub value: Option<String>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn ok(value: impl Into<String>) -> Self {
        ValidationResult {
            valid: true,
            value: Some(value.into()),
            error: None,
            errors: Vec::new(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        let message = message.into();
        ValidationResult {
            valid: false,
            value: None,
            error: Some(message.clone()),
            errors: vec![message],
        }
    }

    fn fail_all(messages: Vec<String>) -> Self {
        ValidationResult {
            valid: false,
            value: None,
            error: messages.first().cloned(),
            errors: messages,
        }
    }
}

/// Which validator runs over a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Email,
    Phone,
    Name,
    Date,
    Time,
    Message,
    AppointmentType,
    Alphanumeric,
    Numeric,
    Url,
    Path,
    Sql,
    Json,
}

/// Per-field tuning knobs. `field_name` is what error messages call the
/// field; validators that a knob does not apply to ignore it.
#[derive(Debug, Clone, Copy)]
pub struct FieldOptions {
    pub field_name: &'static str,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub not_past: bool,
    pub not_future: bool,
    pub max_days: Option<i64>,
    pub max_urls: usize,
}

impl Default for FieldOptions {
    fn default() -> Self {
        FieldOptions {
            field_name: "field",
            required: true,
            min_length: None,
            max_length: None,
            not_past: false,
            not_future: false,
            max_days: None,
            max_urls: 2,
        }
    }
}

/// One entry of a form schema, keyed by dot-path into the flattened body.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: &'static str,
    pub kind: FieldKind,
    pub options: FieldOptions,
}

pub fn validate_email(email: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = email.trim().to_lowercase();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let len = trimmed.chars().count();
    if !(5..=100).contains(&len) {
        return ValidationResult::fail(format!(
            "{} must be between 5 and 100 characters",
            opts.field_name
        ));
    }
    if !EMAIL_RE.is_match(&trimmed) {
        return ValidationResult::fail(format!("{} is not a valid email address", opts.field_name));
    }
    if THROWAWAY_EMAILS.contains(&trimmed.as_str()) {
        return ValidationResult::fail(format!(
            "{} looks like a placeholder address",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_phone(phone: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    let allowed = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '+' | '.'));
    if !allowed || !(10..=20).contains(&digits.len()) {
        return ValidationResult::fail(format!("{} is not a valid phone number", opts.field_name));
    }
    let normalized = if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else {
        digits
    };
    ValidationResult::ok(normalized)
}

fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut count = 0usize;
    let mut last: Option<char> = None;
    for ch in text.chars() {
        if Some(ch) == last {
            count += 1;
            if count >= run {
                return true;
            }
        } else {
            last = Some(ch);
            count = 1;
        }
    }
    false
}

pub fn validate_name(name: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let len = trimmed.chars().count();
    let min = opts.min_length.unwrap_or(2);
    let max = opts.max_length.unwrap_or(50);
    if len < min || len > max {
        return ValidationResult::fail(format!(
            "{} must be between {} and {} characters",
            opts.field_name, min, max
        ));
    }
    let allowed = trimmed
        .chars()
        .all(|c| c.is_alphabetic() || matches!(c, ' ' | '-' | '\'' | '.'));
    if !allowed {
        return ValidationResult::fail(format!(
            "{} contains invalid characters",
            opts.field_name
        ));
    }
    // "aaaaa" style keyboard mashing.
    if has_repeated_run(trimmed, 5) {
        return ValidationResult::fail(format!("{} does not look like a real name", opts.field_name));
    }
    ValidationResult::ok(trimmed)
}

fn parse_iso_date(text: &str) -> Option<Date> {
    let mut parts = text.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month_num: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let month = Month::try_from(month_num).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

pub fn validate_date(value: &str, opts: &FieldOptions) -> ValidationResult {
    validate_date_at(value, opts, OffsetDateTime::now_utc().date())
}

/// Date validation against an explicit "today", so the window checks are
/// deterministic under test.
pub fn validate_date_at(value: &str, opts: &FieldOptions, today: Date) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let date = match parse_iso_date(trimmed) {
        Some(date) => date,
        None => {
            return ValidationResult::fail(format!(
                "{} must be a valid date in YYYY-MM-DD format",
                opts.field_name
            ))
        }
    };
    if opts.not_past && date < today {
        return ValidationResult::fail(format!("{} cannot be in the past", opts.field_name));
    }
    if opts.not_future && date > today {
        return ValidationResult::fail(format!("{} cannot be in the future", opts.field_name));
    }
    if let Some(max_days) = opts.max_days {
        if date > today + Duration::days(max_days) {
            return ValidationResult::fail(format!(
                "{} cannot be more than {} days ahead",
                opts.field_name, max_days
            ));
        }
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_time(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let parsed = (|| {
        let (h, m) = trimmed.split_once(':')?;
        let hour: u8 = h.parse().ok()?;
        let minute: u8 = m.parse().ok()?;
        if h.len() != 2 || m.len() != 2 || hour > 23 || minute > 59 {
            return None;
        }
        Some((hour, minute))
    })();
    let (hour, minute) = match parsed {
        Some(pair) => pair,
        None => {
            return ValidationResult::fail(format!(
                "{} must be a valid time in HH:MM format",
                opts.field_name
            ))
        }
    };
    if hour < BUSINESS_OPEN_HOUR
        || hour > BUSINESS_CLOSE_HOUR
        || (hour == BUSINESS_CLOSE_HOUR && minute > 0)
    {
        return ValidationResult::fail(format!(
            "{} must be within business hours (08:00-17:00)",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_message(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let len = trimmed.chars().count();
    let min = opts.min_length.unwrap_or(10);
    let max = opts.max_length.unwrap_or(2_000);
    if len < min || len > max {
        return ValidationResult::fail(format!(
            "{} must be between {} and {} characters",
            opts.field_name, min, max
        ));
    }
    // Raw angle brackets are rejected outright; the sanitizer runs after
    // validation, so nothing upstream has stripped markup yet.
    if trimmed.contains('<') || trimmed.contains('>') {
        return ValidationResult::fail(format!(
            "{} must not contain HTML markup",
            opts.field_name
        ));
    }
    let url_count = URL_IN_TEXT_RE.find_iter(trimmed).count();
    if url_count > opts.max_urls {
        return ValidationResult::fail(format!(
            "{} contains too many links",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_appointment_type(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    if !APPOINTMENT_TYPES.contains(&trimmed.as_str()) {
        return ValidationResult::fail(format!(
            "{} is not a recognized appointment type",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_alphanumeric(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    let len = trimmed.chars().count();
    if let Some(min) = opts.min_length {
        if len < min {
            return ValidationResult::fail(format!(
                "{} must be at least {} characters",
                opts.field_name, min
            ));
        }
    }
    if let Some(max) = opts.max_length {
        if len > max {
            return ValidationResult::fail(format!(
                "{} must be at most {} characters",
                opts.field_name, max
            ));
        }
    }
    if !ALPHANUMERIC_RE.is_match(trimmed) {
        return ValidationResult::fail(format!(
            "{} may only contain letters, digits, and spaces",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_numeric(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => ValidationResult::ok(trimmed),
        _ => ValidationResult::fail(format!("{} must be a number", opts.field_name)),
    }
}

pub fn validate_url(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
            ValidationResult::ok(trimmed)
        }
        _ => ValidationResult::fail(format!("{} is not a valid http(s) URL", opts.field_name)),
    }
}

pub fn validate_path(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    if trimmed != crate::sanitize::sanitize_path(trimmed) {
        return ValidationResult::fail(format!(
            "{} contains path traversal or forbidden characters",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_sql(value: &str, opts: &FieldOptions) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ValidationResult::fail(format!("{} is required", opts.field_name));
    }
    // Valid iff the escaper would leave it untouched.
    if trimmed != crate::sanitize::escape_sql(trimmed) {
        return ValidationResult::fail(format!(
            "{} contains disallowed SQL characters",
            opts.field_name
        ));
    }
    ValidationResult::ok(trimmed)
}

pub fn validate_json(value: &str, opts: &FieldOptions) -> ValidationResult {
    if serde_json::from_str::<serde_json::Value>(value).is_ok() {
        ValidationResult::ok(value)
    } else {
        ValidationResult::fail(format!("{} is not valid JSON", opts.field_name))
    }
}

/// Insurance details validated together so the caller sees every problem at
/// once. The member id is uppercased before the shape check.
pub fn validate_insurance(provider: &str, member_id: &str) -> ValidationResult {
    let provider = provider.trim();
    let member_id = member_id.trim().to_uppercase();
    let mut messages = Vec::new();
    let provider_len = provider.chars().count();
    if !(2..=50).contains(&provider_len) {
        messages.push("insurance provider must be between 2 and 50 characters".to_string());
    }
    if !MEMBER_ID_RE.is_match(&member_id) {
        messages.push(
            "insurance member id must be 5-20 characters of letters, digits, and hyphens"
                .to_string(),
        );
    }
    if messages.is_empty() {
        ValidationResult::ok(format!("{}|{}", provider, member_id))
    } else {
        ValidationResult::fail_all(messages)
    }
}

pub fn validate_field(value: &str, kind: FieldKind, opts: &FieldOptions) -> ValidationResult {
    match kind {
        FieldKind::Email => validate_email(value, opts),
        FieldKind::Phone => validate_phone(value, opts),
        FieldKind::Name => validate_name(value, opts),
        FieldKind::Date => validate_date(value, opts),
        FieldKind::Time => validate_time(value, opts),
        FieldKind::Message => validate_message(value, opts),
        FieldKind::AppointmentType => validate_appointment_type(value, opts),
        FieldKind::Alphanumeric => validate_alphanumeric(value, opts),
        FieldKind::Numeric => validate_numeric(value, opts),
        FieldKind::Url => validate_url(value, opts),
        FieldKind::Path => validate_path(value, opts),
        FieldKind::Sql => validate_sql(value, opts),
        FieldKind::Json => validate_json(value, opts),
    }
}

/// Result of running a whole schema: one message per failing field plus the
/// normalized values for the ones that passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormReport {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
    pub values: BTreeMap<String, String>,
}

/// Run every field of the schema; never short-circuits, so one bad field
/// does not hide the others. Missing optional fields are skipped, missing
/// required fields get a "required" message.
pub fn validate_form(values: &BTreeMap<String, String>, schema: &[FieldSpec]) -> FormReport {
    validate_form_at(values, schema, OffsetDateTime::now_utc().date())
}

pub fn validate_form_at(
    values: &BTreeMap<String, String>,
    schema: &[FieldSpec],
    today: Date,
) -> FormReport {
    let mut errors = BTreeMap::new();
    let mut clean = BTreeMap::new();
    for spec in schema {
        let raw = values.get(spec.field).map(String::as_str).unwrap_or("");
        if raw.trim().is_empty() {
            if spec.options.required {
                errors.insert(
                    spec.field.to_string(),
                    format!("{} is required", spec.options.field_name),
                );
            }
            continue;
        }
        let result = match spec.kind {
            FieldKind::Date => validate_date_at(raw, &spec.options, today),
            kind => validate_field(raw, kind, &spec.options),
        };
        if result.valid {
            if let Some(value) = result.value {
                clean.insert(spec.field.to_string(), value);
            }
        } else if let Some(message) = result.error {
            errors.insert(spec.field.to_string(), message);
        }
    }
    FormReport {
        valid: errors.is_empty(),
        errors,
        values: clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn opts(name: &'static str) -> FieldOptions {
        FieldOptions {
            field_name: name,
            ..FieldOptions::default()
        }
    }

    #[test]
    fn email_accepts_normal_addresses() {
        let result = validate_email(" Jane.Doe+tag@Example.co.uk ", &opts("email"));
        assert!(result.valid);
        assert_eq!(result.value.unwrap(), "jane.doe+tag@example.co.uk");
    }

    #[test]
    fn email_requires_dotted_domain() {
        assert!(!validate_email("ab@cd", &opts("email")).valid);
        assert!(!validate_email("a@-bad-.com", &opts("email")).valid);
        assert!(!validate_email("spaces in@example.com", &opts("email")).valid);
    }

    #[test]
    fn validator_and_sanitizer_agree_on_canonical_email() {
        for raw in [
            "jane@example.com",
            " First.Last+tag@Mail.Example.co.uk ",
            "x_9%y@SUB-DOMAIN.example.org",
        ] {
            let result = validate_email(raw, &opts("email"));
            assert!(result.valid, "{}", raw);
            assert_eq!(
                crate::sanitize::sanitize_email(raw),
                result.value.unwrap(),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn email_rejects_placeholder_addresses() {
        for addr in ["test@test.com", "TEST@example.com", "spam@spam.com"] {
            assert!(!validate_email(addr, &opts("email")).valid, "{}", addr);
        }
    }

    #[test]
    fn phone_digit_window() {
        assert!(validate_phone("+1 (555) 123-4567", &opts("phone")).valid);
        assert!(!validate_phone("12345", &opts("phone")).valid);
        assert!(!validate_phone("555-CALL-NOW", &opts("phone")).valid);
        let normalized = validate_phone("+1 (555) 123-4567", &opts("phone"))
            .value
            .unwrap();
        assert_eq!(normalized, "+15551234567");
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("José O'Brien-Smith Jr.", &opts("name")).valid);
        assert!(!validate_name("J", &opts("name")).valid);
        assert!(!validate_name("Bob <Tables>", &opts("name")).valid);
        assert!(!validate_name("aaaaabcd", &opts("name")).valid);
        // Four repeats are still fine.
        assert!(validate_name("Aaaab Smith", &opts("name")).valid);
    }

    #[test]
    fn date_window_checks() {
        let today = date!(2026 - 03 - 10);
        let forward = FieldOptions {
            not_past: true,
            max_days: Some(MAX_BOOKING_DAYS),
            ..opts("preferred date")
        };
        assert!(validate_date_at("2026-03-10", &forward, today).valid);
        assert!(validate_date_at("2026-09-06", &forward, today).valid); // day 180
        assert!(!validate_date_at("2026-09-07", &forward, today).valid); // day 181
        assert!(!validate_date_at("2026-03-09", &forward, today).valid);
        assert!(!validate_date_at("2026-02-30", &forward, today).valid);
        assert!(!validate_date_at("03/10/2026", &forward, today).valid);

        let backward = FieldOptions {
            not_future: true,
            ..opts("date of birth")
        };
        assert!(validate_date_at("1990-01-01", &backward, today).valid);
        assert!(!validate_date_at("2026-03-11", &backward, today).valid);
    }

    #[test]
    fn time_business_hours() {
        assert!(validate_time("08:00", &opts("time")).valid);
        assert!(validate_time("17:00", &opts("time")).valid);
        assert!(!validate_time("17:01", &opts("time")).valid);
        assert!(!validate_time("07:59", &opts("time")).valid);
        assert!(!validate_time("25:00", &opts("time")).valid);
        assert!(!validate_time("9:00", &opts("time")).valid);
    }

    #[test]
    fn message_length_and_link_budget() {
        assert!(!validate_message("short", &opts("message")).valid);
        assert!(!validate_message(&"x".repeat(2_001), &opts("message")).valid);
        let two_links = "please see http://a.example and https://b.example for details";
        assert!(validate_message(two_links, &opts("message")).valid);
        let three_links =
            "see http://a.example https://b.example http://c.example right now please";
        assert!(!validate_message(three_links, &opts("message")).valid);
        assert!(!validate_message("hello <b>world</b>, long enough", &opts("message")).valid);
    }

    #[test]
    fn path_and_sql_field_kinds() {
        assert!(validate_path("uploads/scan.png", &opts("path")).valid);
        assert!(!validate_path("../secret", &opts("path")).valid);
        assert!(validate_sql("plain search terms", &opts("query")).valid);
        assert!(!validate_sql("x' OR '1'='1", &opts("query")).valid);
    }

    #[test]
    fn appointment_type_closed_set() {
        assert!(validate_appointment_type(" Cleaning ", &opts("type")).valid);
        assert!(!validate_appointment_type("teeth-stuff", &opts("type")).valid);
    }

    #[test]
    fn insurance_reports_every_failure() {
        let result = validate_insurance("A", "x!");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);

        let result = validate_insurance("Delta Dental", "abc-12345");
        assert!(result.valid);
        assert_eq!(result.value.unwrap(), "Delta Dental|ABC-12345");
    }

    #[test]
    fn form_reports_all_failing_fields() {
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), "Jo".to_string());
        values.insert("email".to_string(), "bad-email".to_string());
        values.insert("message".to_string(), "hi".to_string());

        let schema = [
            FieldSpec {
                field: "name",
                kind: FieldKind::Name,
                options: opts("name"),
            },
            FieldSpec {
                field: "email",
                kind: FieldKind::Email,
                options: opts("email"),
            },
            FieldSpec {
                field: "phone",
                kind: FieldKind::Phone,
                options: FieldOptions {
                    required: false,
                    ..opts("phone")
                },
            },
            FieldSpec {
                field: "message",
                kind: FieldKind::Message,
                options: opts("message"),
            },
        ];

        let report = validate_form(&values, &schema);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.contains_key("email"));
        assert!(report.errors.contains_key("message"));
        assert_eq!(report.values.get("name").unwrap(), "Jo");
    }

    #[test]
    fn form_required_vs_optional_missing_fields() {
        let values = BTreeMap::new();
        let schema = [
            FieldSpec {
                field: "email",
                kind: FieldKind::Email,
                options: opts("email"),
            },
            FieldSpec {
                field: "notes",
                kind: FieldKind::Message,
                options: FieldOptions {
                    required: false,
                    ..opts("notes")
                },
            },
        ];
        let report = validate_form(&values, &schema);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors.contains_key("email"));
    }
}
