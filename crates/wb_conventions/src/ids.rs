// Identifier helpers
//
// Device and control ids are free text on the bus. Discovery unique ids must
// only contain `[a-z0-9_]`.

/// Normalize an identifier for use in discovery topics and unique ids
///
/// Lowercases the input and replaces every character outside `[a-z0-9_]`
/// with `_`.
pub fn normalize_id(id: &str) -> String {
    id.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Human-readable name derived from a control id
///
/// Underscores become spaces and every word is capitalized with the rest of
/// the word lowercased (`"k1_power_on"` -> `"K1 Power On"`).
pub fn humanize_id(id: &str) -> String {
    let spaced = id.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut word_start = true;

    for c in spaced.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }

    out
}
