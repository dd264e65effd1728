// Extraction instructions handed to the Extraction Collaborator, one per category.
// The field names match `Category::schema_keys` so replies need no renaming.

use crate::models::Category;

pub const EXTRACTOR_SYSTEM: &str =
    "You are a data extraction bot. You answer STRICTLY in JSON without citations.";

const EXPERIENCES_INSTRUCTION: &str = r#"From the 'professional experiences' section only, extract all information and return it as a payload.

EXTRACTION RULES:
- Extract information EXACTLY as written in the source text
- If a field is genuinely absent from this section, use 'not found'
- Do NOT infer, reformulate, or merge information from different parts
- "company" is the organization name only; departments belong to "job_title"

OUTPUT FORMAT:
{
  "experiences": [
    {"company": "...", "job_title": "...", "description": "...", "location": "...", "dates": "..."}
  ]
}"#;

const STUDIES_INSTRUCTION: &str = r#"From the 'education' section only, extract every degree and return it as a payload.

EXTRACTION RULES:
- Copy degree names verbatim ("Bachelor of Commerce", not "Bachelor")
- If a field is genuinely absent from this section, use 'not found'
- Do NOT infer, reformulate, or merge information from different parts

OUTPUT FORMAT:
{
  "studies": [
    {"university": "...", "level_of_degree": "...", "field": "...", "location": "...", "dates": "..."}
  ]
}"#;

const INTERESTS_INSTRUCTION: &str = r#"Extract the candidate's personal interests.
Output strictly valid JSON format like: {"interests": ["Running", "Chess"]}.
Do not add any other text."#;

pub fn instruction_for(category: Category) -> &'static str {
    match category {
        Category::Experiences => EXPERIENCES_INSTRUCTION,
        Category::Studies => STUDIES_INSTRUCTION,
        Category::Interests => INTERESTS_INSTRUCTION,
    }
}
