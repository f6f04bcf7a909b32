//! Patient context and conversation model.
//!
//! Every type here is validated on construction, so a value that exists is complete enough to
//! render a prompt. Values are owned by a single request and never shared between requests.

use crate::error::{ValidationError, ValidationResult};

/// A string that contains at least one non-whitespace character.
///
/// The input is stored exactly as given, surrounding whitespace included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a `NonEmptyText`, returning `None` if the input is empty or only whitespace.
    pub fn new(input: impl Into<String>) -> Option<Self> {
        let input = input.into();
        if input.trim().is_empty() {
            return None;
        }
        Some(Self(input))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Structured patient attributes used to parameterise the diagnosis prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientContext {
    name: NonEmptyText,
    age: u32,
    gender: NonEmptyText,
    weight_kg: f32,
    height_cm: f32,
}

impl PatientContext {
    /// Validates and builds a patient context.
    ///
    /// # Arguments
    ///
    /// * `name` - Patient name, must not be blank.
    /// * `age` - Age in years, must not be negative.
    /// * `gender` - Patient gender as entered, must not be blank.
    /// * `weight_kg` - Weight in kilograms, must be finite and greater than zero.
    /// * `height_cm` - Height in centimetres, must be finite and greater than zero.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found, checking fields in the order above.
    pub fn new(
        name: impl Into<String>,
        age: i32,
        gender: impl Into<String>,
        weight_kg: f32,
        height_cm: f32,
    ) -> ValidationResult<Self> {
        let name = NonEmptyText::new(name).ok_or(ValidationError::MissingField("name"))?;
        let age = u32::try_from(age).map_err(|_| ValidationError::NegativeAge(age))?;
        let gender = NonEmptyText::new(gender).ok_or(ValidationError::MissingField("gender"))?;
        let weight_kg = positive("weight", weight_kg)?;
        let height_cm = positive("height", height_cm)?;

        Ok(Self {
            name,
            age,
            gender,
            weight_kg,
            height_cm,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn gender(&self) -> &str {
        self.gender.as_str()
    }

    pub fn weight_kg(&self) -> f32 {
        self.weight_kg
    }

    pub fn height_cm(&self) -> f32 {
        self.height_cm
    }
}

// A zero on the wire is indistinguishable from an unset proto3 field.
fn positive(field: &'static str, value: f32) -> ValidationResult<f32> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::NonPositive { field, value })
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Parses a wire role name. Matching ignores ASCII case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("user") {
            Some(Self::User)
        } else if value.eq_ignore_ascii_case("assistant") {
            Some(Self::Assistant)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of the dialogue history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Validates one wire-level message at position `index`.
    ///
    /// Content is kept verbatim; it is only rejected when it has no visible characters.
    pub fn parse(index: usize, role: &str, content: String) -> ValidationResult<Self> {
        let role = Role::parse(role).ok_or_else(|| ValidationError::UnsupportedRole {
            index,
            role: role.to_owned(),
        })?;
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent { index });
        }
        Ok(Self::new(role, content))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A patient context plus the ordered conversation to diagnose.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisRequest {
    patient: PatientContext,
    turns: Vec<ConversationTurn>,
}

impl DiagnosisRequest {
    pub fn new(patient: PatientContext, turns: Vec<ConversationTurn>) -> Self {
        Self { patient, turns }
    }

    pub fn patient(&self) -> &PatientContext {
        &self.patient
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_context_keeps_text_fields_verbatim() {
        let patient = PatientContext::new("  Maria Silva ", 34, " feminino", 61.5, 165.0).unwrap();
        assert_eq!(patient.name(), "  Maria Silva ");
        assert_eq!(patient.gender(), " feminino");
        assert_eq!(patient.age(), 34);
    }

    #[test]
    fn test_patient_context_rejects_blank_name() {
        let err = PatientContext::new("   ", 34, "feminino", 61.5, 165.0).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("name"));
    }

    #[test]
    fn test_patient_context_rejects_blank_gender() {
        let err = PatientContext::new("Maria", 34, "", 61.5, 165.0).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("gender"));
    }

    #[test]
    fn test_patient_context_rejects_negative_age() {
        let err = PatientContext::new("Maria", -1, "feminino", 61.5, 165.0).unwrap_err();
        assert_eq!(err, ValidationError::NegativeAge(-1));
    }

    #[test]
    fn test_patient_context_allows_newborn() {
        assert!(PatientContext::new("Bebê", 0, "masculino", 3.2, 49.0).is_ok());
    }

    #[test]
    fn test_patient_context_rejects_unset_measurements() {
        let err = PatientContext::new("Maria", 34, "feminino", 0.0, 165.0).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NonPositive {
                field: "weight",
                ..
            }
        ));

        let err = PatientContext::new("Maria", 34, "feminino", 61.5, f32::NAN).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NonPositive {
                field: "height",
                ..
            }
        ));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse(" Assistant "), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_turn_parse_keeps_content_verbatim() {
        let turn = ConversationTurn::parse(0, "user", "  dor de cabeça\n".into()).unwrap();
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.content(), "  dor de cabeça\n");
    }

    #[test]
    fn test_turn_parse_rejects_bad_role_and_blank_content() {
        let err = ConversationTurn::parse(2, "system", "oi".into()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedRole {
                index: 2,
                role: "system".into()
            }
        );

        let err = ConversationTurn::parse(1, "user", " \t".into()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyContent { index: 1 });
    }
}
