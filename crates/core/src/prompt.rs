//! Diagnosis instruction template and provider payload assembly.

use crate::constants::{DIAGNOSIS_MODEL, DIAGNOSIS_TEMPERATURE};
use crate::patient::{DiagnosisRequest, PatientContext};
use crate::provider::{ChatMessage, CompletionRequest};

/// Fixed instructions given to the model ahead of the patient block.
pub const INSTRUCTION_PREAMBLE: &str = "\
Você é um médico que recebe informações de um paciente e os atuais sintomas que ele está apresentando.

Você deve retornar um diagnóstico baseado nas informações recebidas.

Suas respostas devem ser sempre em português brasileiro, em texto simples, sem formatação HTML ou Markdown.

Não alucine, apenas use as informações recebidas para retornar um diagnóstico. Caso não seja possível retornar um diagnóstico, responda que não há como determinar o diagnóstico.";

/// Renders the system instructions for one patient.
///
/// Each of the five patient fields is substituted verbatim into its placeholder; nothing else in
/// the template depends on the request.
pub fn render_instructions(patient: &PatientContext) -> String {
    format!(
        "{INSTRUCTION_PREAMBLE}\n\nInformações do paciente:\n\
         Nome: {name}\n\
         Idade: {age}\n\
         Sexo: {gender}\n\
         Peso: {weight}kg\n\
         Altura: {height}cm",
        name = patient.name(),
        age = patient.age(),
        gender = patient.gender(),
        weight = patient.weight_kg(),
        height = patient.height_cm(),
    )
}

/// Builds the completion payload: rendered instructions first, then the conversation in order.
pub fn build_completion_request(request: &DiagnosisRequest) -> CompletionRequest {
    let mut messages = Vec::with_capacity(request.turns().len() + 1);
    messages.push(ChatMessage::system(render_instructions(request.patient())));
    messages.extend(request.turns().iter().map(ChatMessage::from));

    CompletionRequest {
        model: DIAGNOSIS_MODEL.to_owned(),
        temperature: DIAGNOSIS_TEMPERATURE,
        messages,
    }
}
