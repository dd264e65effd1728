// Shared prompt constants.
// Each component that calls the model keeps its own prompts.rs alongside it;
// this file holds the cross-cutting fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You audit CV extractions and answer in JSON. \
    Respond with exactly one valid JSON object and nothing else: \
    no prose before or after it, no markdown code fences.";

/// Appended to every prompt that compares two extractions.
pub const GROUND_TRUTH_INSTRUCTION: &str = "\
    The 'Original' payload is the ground truth. Judge the other payload against it, \
    never the reverse. Compare meaning, not exact wording.";
