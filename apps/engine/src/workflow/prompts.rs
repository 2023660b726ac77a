// Prompt constants for the cover letter workflow.
// The component order — initial instruction, resume block, source block — and
// the fence delimiters are a stable contract the model's behavior depends on.

use crate::settings::Settings;

/// Generation prompt template. Replace `{initial_prompt}`, `{resume}`, and
/// `{source_text}` before sending.
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"{initial_prompt}
Here is the resume:
```
{resume}
```
Here is the webpage content:
```
{source_text}
```"#;

/// Follow-up input that asks the model for a refreshed letter after a chat
/// exchange.
pub const REGENERATE_REQUEST: &str = "Please generate an updated cover letter.";

/// Assembles the generation prompt in the fixed instruction, resume,
/// source-content order.
pub fn build_generation_prompt(settings: &Settings, source_text: &str) -> String {
    GENERATION_PROMPT_TEMPLATE
        .replace("{initial_prompt}", &settings.initial_prompt)
        .replace("{resume}", &settings.resume)
        .replace("{source_text}", source_text)
}
