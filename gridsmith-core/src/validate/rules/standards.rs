use crate::validate::validator::Findings;

// Suggestions only; a chunk is never held back for presentation.
pub(crate) fn check(f: &mut Findings) {
    let writes = !f.script.bulk_assignments().is_empty();
    if writes && !f.script.mentions_member("format") {
        f.push_suggestion("Add styling (fill colour, font) so the output reads as a finished model");
    }
    if writes && !f.script.mentions_member("numberFormat") {
        f.push_suggestion("Set numberFormat on numeric and currency ranges");
    }
    if writes && !f.script.mentions_member("bold") {
        f.push_suggestion("Mark section headers with a bold font");
    }
    if f.script.comment_count() == 0 {
        f.push_suggestion("Add a short comment describing what this chunk builds");
    }
    if !f.script.has_try() {
        f.push_suggestion("Wrap the body in try/catch so failures carry context");
    }
}
