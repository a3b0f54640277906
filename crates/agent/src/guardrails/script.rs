use tellr_core::domain::{script_share, Language, Script};

/// A reply is consistent when a non-Latin target language's script makes up at least `floor`
/// of its letters. Latin-script targets and letterless replies always pass.
pub fn is_consistent(text: &str, language: Language, floor: f32) -> bool {
    let script = language.script();
    if script == Script::Latin {
        return true;
    }
    script_share(text, script).map_or(true, |share| share >= floor)
}
