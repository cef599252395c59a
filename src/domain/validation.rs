use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::draft::{ContactDetails, FlightDetails, GuestDetails, PassengerDetails};

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\s'-]+$").expect("name pattern compiles"));
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));
static DIGITS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("digits pattern compiles"));

const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    FirstName,
    LastName,
    Email,
    Phone,
    GuestFirstName,
    GuestLastName,
    GuestEmail,
    GuestPhone,
    FlightNumber,
}

/// One message per failing field. Empty means the form is valid.
pub type ErrorMap = BTreeMap<FormField, String>;

/// Raw passenger step input, exactly as the form submits it.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PassengerForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub is_booking_for_someone_else: bool,
    pub guest_first_name: String,
    pub guest_last_name: String,
    pub guest_email: String,
    pub guest_phone: String,
    pub is_airport_pickup: bool,
    pub flight_number: String,
    pub airline: String,
    pub special_instructions: String,
}

impl PassengerForm {
    /// Splits a form into the draft records it commits. Only meaningful
    /// once `validate` has returned an empty map.
    #[must_use]
    pub fn into_details(self) -> (PassengerDetails, Option<FlightDetails>, String) {
        let guest = self.is_booking_for_someone_else.then(|| GuestDetails {
            first_name: self.guest_first_name.trim().to_string(),
            last_name: self.guest_last_name.trim().to_string(),
            email: self.guest_email.trim().to_string(),
            phone: non_empty(&self.guest_phone),
        });
        let flight = self.is_airport_pickup.then(|| FlightDetails {
            flight_number: self.flight_number.trim().to_string(),
            airline: non_empty(&self.airline),
        });
        let passenger = PassengerDetails {
            contact: ContactDetails {
                first_name: self.first_name.trim().to_string(),
                last_name: self.last_name.trim().to_string(),
                email: self.email.trim().to_string(),
                phone: self.phone.trim().to_string(),
            },
            guest,
        };
        (passenger, flight, self.special_instructions)
    }

    /// Rebuilds the form from committed draft records so an "Edit" round trip
    /// shows exactly what was entered.
    #[must_use]
    pub fn from_details(
        passenger: &PassengerDetails,
        flight: Option<&FlightDetails>,
        special_instructions: &str,
    ) -> Self {
        let guest = passenger.guest.clone().unwrap_or_default();
        Self {
            first_name: passenger.contact.first_name.clone(),
            last_name: passenger.contact.last_name.clone(),
            email: passenger.contact.email.clone(),
            phone: passenger.contact.phone.clone(),
            is_booking_for_someone_else: passenger.is_booking_for_someone_else(),
            guest_first_name: guest.first_name,
            guest_last_name: guest.last_name,
            guest_email: guest.email,
            guest_phone: guest.phone.unwrap_or_default(),
            is_airport_pickup: flight.is_some(),
            flight_number: flight.map(|f| f.flight_number.clone()).unwrap_or_default(),
            airline: flight.and_then(|f| f.airline.clone()).unwrap_or_default(),
            special_instructions: special_instructions.to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn check_name(value: &str, label: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        Some(format!("{label} is required"))
    } else if !NAME_PATTERN.is_match(value) {
        Some(format!(
            "{label} can only contain letters, spaces, hyphens and apostrophes"
        ))
    } else {
        None
    }
}

fn check_email(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        Some("Email is required".to_string())
    } else if !EMAIL_PATTERN.is_match(value) {
        Some("Please enter a valid email address".to_string())
    } else {
        None
    }
}

fn check_phone(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        Some("Phone number is required".to_string())
    } else if !DIGITS_PATTERN.is_match(value) {
        Some("Phone number can only contain digits".to_string())
    } else if value.len() < MIN_PHONE_DIGITS {
        Some(format!("Phone number must be at least {MIN_PHONE_DIGITS} digits"))
    } else {
        None
    }
}

/// Validates the passenger step. At most one message per field; the first
/// failing rule wins.
#[must_use]
pub fn validate(form: &PassengerForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    let mut record = |field: FormField, failure: Option<String>| {
        if let Some(message) = failure {
            errors.insert(field, message);
        }
    };

    record(FormField::FirstName, check_name(&form.first_name, "First name"));
    record(FormField::LastName, check_name(&form.last_name, "Last name"));
    record(FormField::Email, check_email(&form.email));
    record(FormField::Phone, check_phone(&form.phone));

    if form.is_booking_for_someone_else {
        record(
            FormField::GuestFirstName,
            check_name(&form.guest_first_name, "Guest first name"),
        );
        record(
            FormField::GuestLastName,
            check_name(&form.guest_last_name, "Guest last name"),
        );
        record(FormField::GuestEmail, check_email(&form.guest_email));

        let guest_phone = form.guest_phone.trim();
        if !guest_phone.is_empty() && !DIGITS_PATTERN.is_match(guest_phone) {
            record(
                FormField::GuestPhone,
                Some("Phone number can only contain digits".to_string()),
            );
        }
    }

    if form.is_airport_pickup && form.flight_number.trim().is_empty() {
        record(
            FormField::FlightNumber,
            Some("Flight number is required".to_string()),
        );
    }

    errors
}
