/// Keys the model is asked to return. Kept in one place so the prompt and
/// the reconciler can't drift apart.
pub const RESULT_KEYS: [&str; 3] = ["diagnosis", "next_steps", "recommendations"];

pub fn build_prompt(report_type: &str) -> String {
    format!(
        "Analyze the following medical report image of type '{}'. \
         Provide a possible diagnosis, the suggested next steps for the patient, \
         and general recommendations.\n\
         Respond strictly in JSON with exactly these keys: \"{}\", \"{}\", \"{}\". \
         Each value must be a plain string. \
         Do not use markdown, code fences, or any text outside the JSON object.",
        report_type.trim(),
        RESULT_KEYS[0],
        RESULT_KEYS[1],
        RESULT_KEYS[2],
    )
}
