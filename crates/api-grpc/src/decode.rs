//! Wire-to-domain decoding for `Diagnose` requests.

use api_shared::pb;
use diagnosis_core::{ConversationTurn, DiagnosisRequest, PatientContext, ValidationError};

/// Decode and validate a wire request.
///
/// The patient block and at least one message are required. Message order is preserved.
///
/// # Errors
///
/// Returns the first `ValidationError` found; patient fields are checked before messages.
pub fn decode_request(request: pb::DiagnoseRequest) -> Result<DiagnosisRequest, ValidationError> {
    let info = request
        .patient_info
        .ok_or(ValidationError::MissingPatientInfo)?;
    let patient = PatientContext::new(info.name, info.age, info.gender, info.weight, info.height)?;

    if request.messages.is_empty() {
        return Err(ValidationError::NoMessages);
    }

    let turns = request
        .messages
        .into_iter()
        .enumerate()
        .map(|(index, message)| ConversationTurn::parse(index, &message.role, message.content))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DiagnosisRequest::new(patient, turns))
}
